//! Test doubles: a shared RSA key, a scripted mDNS browser and an in-process
//! ADB daemon listening on loopback.

use std::io::Write;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;

use crate::auth::adb_key::{AdbKey, KEY_BITS};
use crate::discovery::ServiceBrowser;
use crate::error::AdbError;
use crate::protocol::message::{
    Message, A_AUTH, A_CLSE, A_CNXN, A_OKAY, A_OPEN, A_STLS, AUTH_RSAPUBLICKEY, AUTH_SIGNATURE, AUTH_TOKEN,
};
use crate::protocol::shell_v2::{encode_packet, ID_EXIT, ID_STDOUT};

/// One 2048-bit key shared by every test; generating it is slow.
pub fn test_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, KEY_BITS).unwrap())
}

pub fn test_adb_key() -> AdbKey {
    AdbKey::from_private_key(test_key().clone(), "test@host").unwrap()
}

/// Poll `cond` until it holds or five seconds pass.
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

// --- Browser ---

/// Emits a fixed list of ports, then idles until stopped.
pub struct FakeBrowser {
    ports: Vec<u16>,
    active: AtomicUsize,
    browsed: Mutex<Vec<String>>,
}

impl FakeBrowser {
    pub fn new(ports: Vec<u16>) -> Self {
        Self {
            ports,
            active: AtomicUsize::new(0),
            browsed: Mutex::new(Vec::new()),
        }
    }

    pub fn active_browses(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Service types passed to `browse`, in order.
    pub fn browsed(&self) -> Vec<String> {
        self.browsed.lock().clone()
    }
}

impl ServiceBrowser for FakeBrowser {
    fn browse(&self, service_type: &str, stop: &AtomicBool, on_port: &mut dyn FnMut(u16)) -> Result<(), AdbError> {
        self.browsed.lock().push(service_type.to_string());
        self.active.fetch_add(1, Ordering::SeqCst);
        for port in &self.ports {
            on_port(*port);
        }
        while !stop.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(5));
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

// --- Daemon ---

/// How the fake daemon treats a client.
#[derive(Debug, Clone)]
pub struct DaemonBehavior {
    /// Accept the first signature (the key is already in `adb_keys`).
    pub trust_key: bool,
    /// Accept a presented public key (the user taps "Allow").
    pub accept_public_key: bool,
    /// Reply at all to a presented public key.
    pub answer_public_key: bool,
    pub require_tls: bool,
    pub shell_v2: bool,
    /// Answer every OPEN with CLSE.
    pub reset_streams: bool,
    /// Send packets for a stream the client never opened.
    pub stray_packets: bool,
    /// Drop each connection after this many commands.
    pub drop_after: Option<usize>,
}

impl Default for DaemonBehavior {
    fn default() -> Self {
        Self {
            trust_key: true,
            accept_public_key: true,
            answer_public_key: true,
            require_tls: false,
            shell_v2: true,
            reset_streams: false,
            stray_packets: false,
            drop_after: None,
        }
    }
}

#[derive(Default)]
struct DaemonState {
    responses: Mutex<Vec<(String, String, u8)>>,
    services: Mutex<Vec<String>>,
    public_keys: Mutex<Vec<Vec<u8>>>,
    connections: AtomicUsize,
    stop: AtomicBool,
}

/// An `adbd` stand-in serving one client at a time.
pub struct FakeDaemon {
    port: u16,
    state: Arc<DaemonState>,
    thread: Option<thread::JoinHandle<()>>,
}

impl FakeDaemon {
    pub fn start(behavior: DaemonBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(DaemonState::default());

        let thread_state = Arc::clone(&state);
        let thread = thread::spawn(move || {
            for stream in listener.incoming() {
                if thread_state.stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                thread_state.connections.fetch_add(1, Ordering::SeqCst);
                // Errors just end the session, like a real daemon dropping a client.
                let _ = serve(stream, &behavior, &thread_state);
            }
        });

        Self {
            port,
            state,
            thread: Some(thread),
        }
    }

    /// A loopback port with nothing listening on it.
    pub fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Answer shell commands starting with `prefix`.
    pub fn respond(&self, prefix: &str, output: &str, exit_code: u8) {
        self.state
            .responses
            .lock()
            .push((prefix.to_string(), output.to_string(), exit_code));
    }

    /// Services opened so far, e.g. `shell,v2,raw:id`.
    pub fn services(&self) -> Vec<String> {
        self.state.services.lock().clone()
    }

    pub fn received_public_keys(&self) -> Vec<Vec<u8>> {
        self.state.public_keys.lock().clone()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.state.stop.store(true, Ordering::SeqCst);
        // Wake the accept loop.
        let _ = TcpStream::connect(("127.0.0.1", self.port));
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

const MAX_PAYLOAD: u32 = 256 * 1024;
const TOKEN: [u8; 20] = [0x5a; 20];

fn send(stream: &mut TcpStream, msg: Message) -> Result<(), AdbError> {
    stream.write_all(&msg.encode())?;
    Ok(())
}

fn recv(stream: &mut TcpStream) -> Result<Message, AdbError> {
    Message::read_from(stream, MAX_PAYLOAD)
}

fn serve(mut stream: TcpStream, behavior: &DaemonBehavior, state: &DaemonState) -> Result<(), AdbError> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;

    let hello = recv(&mut stream)?;
    assert_eq!(hello.command, A_CNXN);

    if behavior.require_tls {
        send(&mut stream, Message::new(A_STLS, 0x0100_0000, 0, Vec::new()))?;
        return Ok(());
    }

    send(&mut stream, Message::auth(AUTH_TOKEN, TOKEN.to_vec()))?;
    let reply = recv(&mut stream)?;
    assert_eq!((reply.command, reply.arg0), (A_AUTH, AUTH_SIGNATURE));
    let verified = test_key()
        .to_public_key()
        .verify(Pkcs1v15Sign::new::<Sha1>(), &TOKEN, &reply.payload)
        .is_ok();

    if !(verified && behavior.trust_key) {
        send(&mut stream, Message::auth(AUTH_TOKEN, TOKEN.to_vec()))?;
        let reply = recv(&mut stream)?;
        assert_eq!((reply.command, reply.arg0), (A_AUTH, AUTH_RSAPUBLICKEY));
        state.public_keys.lock().push(reply.payload);

        if !behavior.answer_public_key {
            // Hold the socket open without replying until the client gives up.
            let _ = recv(&mut stream);
            return Ok(());
        }
        if !behavior.accept_public_key {
            send(&mut stream, Message::auth(AUTH_TOKEN, TOKEN.to_vec()))?;
            let _ = recv(&mut stream);
            return Ok(());
        }
    }

    let features = if behavior.shell_v2 { "cmd,shell_v2,stat_v2" } else { "cmd" };
    let banner = format!("device::ro.product.name=fake;ro.product.model=Fake;features={features}\0");
    send(&mut stream, Message::new(A_CNXN, 0x0100_0001, MAX_PAYLOAD, banner.into_bytes()))?;

    let mut next_remote = 100;
    let mut served = 0;
    loop {
        if behavior.drop_after.is_some_and(|n| served >= n) {
            stream.shutdown(Shutdown::Both)?;
            return Ok(());
        }

        let open = recv(&mut stream)?;
        if open.command != A_OPEN {
            continue;
        }
        let local = open.arg0;
        let service = String::from_utf8_lossy(&open.payload).trim_end_matches('\0').to_string();
        state.services.lock().push(service.clone());
        served += 1;

        if behavior.reset_streams {
            send(&mut stream, Message::close(0, local))?;
            continue;
        }

        let remote = next_remote;
        next_remote += 1;

        if behavior.stray_packets {
            send(&mut stream, Message::write(remote, local + 1000, b"noise".to_vec()))?;
        }
        send(&mut stream, Message::okay(remote, local))?;

        let (shell_v2, command) = match service.split_once(':') {
            Some((kind, command)) => (kind.contains("v2"), command.to_string()),
            None => (false, String::new()),
        };
        let (output, exit_code) = state
            .responses
            .lock()
            .iter()
            .find(|(prefix, _, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output, code)| (output.clone(), *code))
            .unwrap_or_default();

        let payload = if shell_v2 {
            let mut payload = encode_packet(ID_STDOUT, output.as_bytes());
            payload.extend(encode_packet(ID_EXIT, &[exit_code]));
            payload
        } else {
            output.into_bytes()
        };
        if !payload.is_empty() {
            send(&mut stream, Message::write(remote, local, payload))?;
            let ack = recv(&mut stream)?;
            assert_eq!((ack.command, ack.arg0, ack.arg1), (A_OKAY, local, remote));
        }

        send(&mut stream, Message::close(remote, local))?;
        let close = recv(&mut stream)?;
        assert_eq!(close.command, A_CLSE);
    }
}
