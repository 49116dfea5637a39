//! Finding the ADB daemon's port.
//!
//! A daemon switched to plain TCP (`adb tcpip`) announces its port over mDNS
//! as `_adb._tcp`. Wireless-debugging services (`_adb-tls-connect._tcp`)
//! demand TLS and are not browsed by default. The last port that worked is
//! cached and persisted so a restart can try it before the browse produces
//! anything.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use parking_lot::Mutex;

use soundmaster_core::PreferenceStore;

use crate::error::AdbError;

/// Preference key holding the last daemon port.
pub const LAST_PORT_PREF: &str = "last_port";

/// Source of daemon ports for one service type.
pub trait ServiceBrowser: Send + Sync {
    /// Browse until `stop` is set, calling `on_port` for every resolved
    /// instance.
    fn browse(&self, service_type: &str, stop: &AtomicBool, on_port: &mut dyn FnMut(u16)) -> Result<(), AdbError>;
}

/// [`ServiceBrowser`] backed by a multicast DNS daemon.
#[derive(Debug, Clone)]
pub struct MdnsBrowser {
    poll_interval: Duration,
}

impl MdnsBrowser {
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl Default for MdnsBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBrowser for MdnsBrowser {
    fn browse(&self, service_type: &str, stop: &AtomicBool, on_port: &mut dyn FnMut(u16)) -> Result<(), AdbError> {
        let daemon = ServiceDaemon::new().map_err(|e| AdbError::Discovery(format!("mDNS daemon: {}", e)))?;
        let receiver = daemon
            .browse(service_type)
            .map_err(|e| AdbError::Discovery(format!("browse {}: {}", service_type, e)))?;
        log::debug!("Browsing {}", service_type);

        while !stop.load(Ordering::SeqCst) {
            match receiver.recv_timeout(self.poll_interval) {
                Ok(ServiceEvent::ServiceResolved(info)) => {
                    let port = info.get_port();
                    log::info!("Resolved {} on port {}", info.get_fullname(), port);
                    if port > 0 {
                        on_port(port);
                    }
                }
                Ok(event) => log::trace!("mDNS event: {:?}", event),
                Err(_) if receiver.is_disconnected() => {
                    log::warn!("mDNS browse for {} ended unexpectedly", service_type);
                    break;
                }
                Err(_) => {}
            }
        }

        if let Err(e) = daemon.stop_browse(service_type) {
            log::debug!("stop_browse: {}", e);
        }
        if let Err(e) = daemon.shutdown() {
            log::debug!("mDNS shutdown: {}", e);
        }
        Ok(())
    }
}

/// Discovers daemon ports and remembers the last good one.
pub struct DaemonDiscovery {
    browser: Arc<dyn ServiceBrowser>,
    prefs: Arc<dyn PreferenceStore>,
    service_type: String,
    cached_port: Arc<AtomicU16>,
    active: Mutex<Option<Arc<AtomicBool>>>,
}

impl DaemonDiscovery {
    pub fn new(browser: Arc<dyn ServiceBrowser>, prefs: Arc<dyn PreferenceStore>, service_type: &str) -> Self {
        let cached = prefs
            .get_int(LAST_PORT_PREF)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(0);
        Self {
            browser,
            prefs,
            service_type: service_type.to_string(),
            cached_port: Arc::new(AtomicU16::new(cached)),
            active: Mutex::new(None),
        }
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Last known daemon port, if any.
    pub fn cached_port(&self) -> Option<u16> {
        match self.cached_port.load(Ordering::SeqCst) {
            0 => None,
            port => Some(port),
        }
    }

    /// Cache and persist `port`.
    pub fn remember_port(&self, port: u16) {
        remember(&self.cached_port, self.prefs.as_ref(), port);
    }

    pub fn forget_port(&self) {
        self.cached_port.store(0, Ordering::SeqCst);
        if let Err(e) = self.prefs.remove(LAST_PORT_PREF) {
            log::warn!("Failed to clear cached port: {}", e);
        }
    }

    /// Report candidate ports to `callback` until the returned handle is
    /// stopped or dropped, or until `discover` is called again.
    ///
    /// The cached port, if any, is reported synchronously before this
    /// returns. Every port the browse resolves is cached and persisted.
    pub fn discover<F>(&self, callback: F) -> Result<DiscoveryHandle, AdbError>
    where
        F: Fn(u16) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        if let Some(previous) = self.active.lock().replace(Arc::clone(&stop)) {
            log::debug!("Superseding previous discovery");
            previous.store(true, Ordering::SeqCst);
        }

        if let Some(port) = self.cached_port() {
            log::debug!("Trying cached port {}", port);
            callback(port);
        }

        let browser = Arc::clone(&self.browser);
        let prefs = Arc::clone(&self.prefs);
        let cached_port = Arc::clone(&self.cached_port);
        let service_type = self.service_type.clone();
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("adb-discovery".into())
            .spawn(move || {
                let mut on_port = |port: u16| {
                    if thread_stop.load(Ordering::SeqCst) {
                        return;
                    }
                    remember(&cached_port, prefs.as_ref(), port);
                    callback(port);
                };
                if let Err(e) = browser.browse(&service_type, &thread_stop, &mut on_port) {
                    log::error!("Discovery failed: {}", e);
                }
            })
            .map_err(|e| AdbError::Discovery(format!("failed to spawn discovery thread: {}", e)))?;

        Ok(DiscoveryHandle {
            stop,
            thread: Some(handle),
        })
    }
}

fn remember(cached_port: &AtomicU16, prefs: &dyn PreferenceStore, port: u16) {
    cached_port.store(port, Ordering::SeqCst);
    if let Err(e) = prefs.set_int(LAST_PORT_PREF, i64::from(port)) {
        log::warn!("Failed to persist port {}: {}", port, e);
    }
}

/// A running discovery. Dropping it stops the browse.
pub struct DiscoveryHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl DiscoveryHandle {
    /// Whether the browse is still running (not stopped nor superseded).
    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::SeqCst) && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("Discovery thread panicked");
            }
        }
    }
}

impl Drop for DiscoveryHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
