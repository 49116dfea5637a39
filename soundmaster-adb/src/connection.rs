use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::auth::adb_key::AdbKey;
use crate::config::AdbConfig;
use crate::error::AdbError;
use crate::protocol::message::{
    command_name, Banner, Message, A_AUTH, A_CLSE, A_CNXN, A_OKAY, A_STLS, A_WRTE, AUTH_RSAPUBLICKEY,
    AUTH_SIGNATURE, AUTH_TOKEN,
};
use crate::protocol::shell_v2::{CommandOutput, ShellV2Decoder};

/// Features we announce in our CNXN banner.
const HOST_FEATURES: &str = "shell_v2,cmd";

/// An authenticated ADB transport to one daemon.
///
/// Streams are opened one at a time. Once a transport or protocol error
/// occurs the connection is closed for good.
#[derive(Debug)]
pub struct AdbConnection {
    stream: TcpStream,
    banner: Banner,
    /// Largest payload we accept on reads (what we advertised).
    read_limit: u32,
    /// Negotiated maximum for our writes.
    max_payload: u32,
    use_shell_v2: bool,
    next_local_id: u32,
    closed: bool,
}

impl AdbConnection {
    /// Open a TCP connection to `host:port` and authenticate with `key`.
    ///
    /// Fails with `Connect` when the daemon cannot be reached and with `Auth`
    /// when the handshake does not complete.
    pub fn connect(host: &str, port: u16, key: &AdbKey, config: &AdbConfig) -> Result<Self, AdbError> {
        let address = (host, port)
            .to_socket_addrs()
            .map_err(|e| AdbError::Connect(format!("cannot resolve {}:{}: {}", host, port, e)))?
            .next()
            .ok_or_else(|| AdbError::Connect(format!("no address for {}:{}", host, port)))?;

        log::debug!("Connecting to adbd at {}", address);
        let stream = TcpStream::connect_timeout(&address, config.connect_timeout())
            .map_err(|e| AdbError::Connect(format!("{}: {}", address, e)))?;
        stream
            .set_nodelay(true)
            .and_then(|_| stream.set_read_timeout(Some(config.io_timeout())))
            .and_then(|_| stream.set_write_timeout(Some(config.io_timeout())))
            .map_err(|e| AdbError::Connect(e.to_string()))?;

        let mut connection = Self {
            stream,
            banner: Banner::default(),
            read_limit: config.max_payload,
            max_payload: config.max_payload,
            use_shell_v2: false,
            next_local_id: 1,
            closed: false,
        };
        connection.handshake(key, config)?;
        connection.use_shell_v2 = config.prefer_shell_v2 && connection.banner.has_feature("shell_v2");
        log::info!(
            "Connected to adbd at {} (features: {})",
            address,
            connection.banner.features.join(",")
        );
        Ok(connection)
    }

    pub fn is_connected(&self) -> bool {
        !self.closed
    }

    pub fn banner(&self) -> &Banner {
        &self.banner
    }

    pub fn max_payload(&self) -> u32 {
        self.max_payload
    }

    pub fn uses_shell_v2(&self) -> bool {
        self.use_shell_v2
    }

    /// Run `command` on a fresh shell stream and collect its output.
    ///
    /// A non-zero exit status is returned in the output, not as an error;
    /// see [`CommandOutput::into_result`].
    pub fn run_command(&mut self, command: &str) -> Result<CommandOutput, AdbError> {
        if self.closed {
            return Err(AdbError::Closed);
        }
        let result = self.run_stream(command);
        if let Err(ref e) = result {
            if e.is_transport() {
                log::warn!("Closing ADB connection after failure: {}", e);
                self.close();
            }
        }
        result
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.shutdown(std::net::Shutdown::Both) {
            log::debug!("Socket shutdown: {}", e);
        }
    }

    // --- Internal helpers ---

    fn handshake(&mut self, key: &AdbKey, config: &AdbConfig) -> Result<(), AdbError> {
        self.send(&Message::connect(config.max_payload, &format!("host::features={HOST_FEATURES}")))
            .map_err(|e| AdbError::Connect(e.to_string()))?;

        let mut tokens = 0;
        loop {
            let msg = match Message::read_from(&mut self.stream, self.read_limit) {
                Ok(msg) => msg,
                Err(AdbError::Closed) => {
                    return Err(AdbError::Auth("daemon closed the connection during authentication".into()))
                }
                Err(AdbError::Io(e)) if tokens >= 2 => {
                    return Err(AdbError::Auth(format!("key was not accepted on the device: {}", e)))
                }
                Err(e) => return Err(AdbError::Connect(e.to_string())),
            };

            match msg.command {
                A_CNXN => {
                    self.banner = Banner::parse(&msg.payload);
                    self.max_payload = config.max_payload.min(msg.arg1.max(1));
                    self.stream
                        .set_read_timeout(Some(config.io_timeout()))
                        .map_err(|e| AdbError::Connect(e.to_string()))?;
                    return Ok(());
                }
                A_AUTH if msg.arg0 == AUTH_TOKEN => {
                    tokens += 1;
                    match tokens {
                        1 => {
                            log::debug!("Signing auth token");
                            let signature = key.sign(&msg.payload)?;
                            self.send(&Message::auth(AUTH_SIGNATURE, signature))?;
                        }
                        2 => {
                            log::info!("Key not yet trusted; waiting for approval on the device");
                            self.send(&Message::auth(AUTH_RSAPUBLICKEY, key.public_key_payload()))?;
                            self.stream
                                .set_read_timeout(Some(wait_at_least(config.auth_timeout())))
                                .map_err(|e| AdbError::Connect(e.to_string()))?;
                        }
                        _ => return Err(AdbError::Auth("daemon rejected our public key".into())),
                    }
                }
                A_STLS => {
                    return Err(AdbError::Auth("daemon requires TLS, which is not supported".into()));
                }
                other => {
                    return Err(AdbError::Auth(format!(
                        "unexpected {} during handshake",
                        command_name(other)
                    )));
                }
            }
        }
    }

    fn run_stream(&mut self, command: &str) -> Result<CommandOutput, AdbError> {
        let local_id = self.next_local_id;
        self.next_local_id = self.next_local_id.wrapping_add(1).max(1);

        let service = if self.use_shell_v2 {
            format!("shell,v2,raw:{command}")
        } else {
            format!("shell:{command}")
        };
        log::debug!("OPEN {} as stream {}", service, local_id);
        self.send(&Message::open(local_id, &service))?;

        let mut remote_id: Option<u32> = None;
        let mut decoder = ShellV2Decoder::new();
        let mut raw = Vec::new();

        loop {
            let msg = self.recv()?;
            if msg.arg1 != local_id {
                log::debug!("Ignoring {:?} for unknown stream", msg);
                continue;
            }
            match msg.command {
                A_OKAY => {
                    remote_id.get_or_insert(msg.arg0);
                }
                A_WRTE => {
                    remote_id.get_or_insert(msg.arg0);
                    self.send(&Message::okay(local_id, msg.arg0))?;
                    if self.use_shell_v2 {
                        decoder.feed(&msg.payload)?;
                    } else {
                        raw.extend_from_slice(&msg.payload);
                    }
                }
                A_CLSE => {
                    let Some(remote) = remote_id else {
                        return Err(AdbError::Command(format!("stream for {:?} was reset by the daemon", command)));
                    };
                    self.send(&Message::close(local_id, remote))?;
                    break;
                }
                other => {
                    return Err(AdbError::Protocol(format!(
                        "unexpected {} on shell stream",
                        command_name(other)
                    )));
                }
            }
        }

        if self.use_shell_v2 {
            if decoder.has_partial_packet() {
                log::warn!("Shell stream for {:?} ended mid-packet", command);
            }
            Ok(decoder.finish())
        } else {
            Ok(CommandOutput {
                output: String::from_utf8_lossy(&raw).into_owned(),
                exit_code: None,
            })
        }
    }

    fn send(&mut self, msg: &Message) -> Result<(), AdbError> {
        msg.write_to(&mut self.stream)
    }

    fn recv(&mut self) -> Result<Message, AdbError> {
        Message::read_from(&mut self.stream, self.read_limit)
    }
}

impl Drop for AdbConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Socket timeouts of zero mean "block forever"; never pass one.
fn wait_at_least(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}
