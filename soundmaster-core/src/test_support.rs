//! Test doubles shared by the unit tests in this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::{
    Application, ApplicationId, AudioUsage, DeviceKind, OutputDevice, OutputKey, StreamFormat,
};
use crate::models::error::{ControlError, RoutingError};
use crate::models::report::LatencyReport;
use crate::models::shell::VolumeDirection;
use crate::models::state::SessionState;
use crate::traits::audio_backend::{AudioBackend, Catalog, CaptureStream, OutputStream};
use crate::traits::control_plane::{CommandHandle, CommandResult, ControlPlane};
use crate::traits::status_reporter::StatusReporter;
use crate::traits::system_mixer::SystemMixer;

pub fn pcm_frame(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

pub fn device(id: i32, kind: DeviceKind) -> OutputDevice {
    OutputDevice {
        id,
        display_name: format!("device {id}"),
        kind,
    }
}

/// Poll `cond` until it holds or five seconds pass.
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

// --- Capture ---

#[derive(Default)]
struct CaptureInner {
    queue: VecDeque<Vec<u8>>,
    looping: Option<Vec<u8>>,
    error: Option<RoutingError>,
    closed: bool,
}

/// Capture stream fed by the test. A `looping` frame is returned forever.
#[derive(Default)]
pub struct MockCaptureStream {
    inner: Mutex<CaptureInner>,
    ready: Condvar,
    close_count: AtomicUsize,
}

impl MockCaptureStream {
    pub fn push(&self, frame: Vec<u8>) {
        self.inner.lock().queue.push_back(frame);
        self.ready.notify_all();
    }

    pub fn set_looping(&self, frame: Vec<u8>) {
        self.inner.lock().looping = Some(frame);
        self.ready.notify_all();
    }

    pub fn fail(&self, error: RoutingError) {
        self.inner.lock().error = Some(error);
        self.ready.notify_all();
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl CaptureStream for MockCaptureStream {
    fn read(&self, buf: &mut [u8]) -> Result<usize, RoutingError> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return Ok(0);
            }
            if let Some(error) = inner.error.take() {
                return Err(error);
            }
            if let Some(frame) = inner.queue.pop_front() {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                return Ok(n);
            }
            if let Some(frame) = inner.looping.clone() {
                drop(inner);
                std::thread::sleep(Duration::from_millis(1));
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                return Ok(n);
            }
            self.ready.wait(&mut inner);
        }
    }

    fn close(&self) -> Result<(), RoutingError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.inner.lock().closed = true;
        self.ready.notify_all();
        Ok(())
    }
}

// --- Output ---

/// What one opened output stream received.
#[derive(Default)]
pub struct OutputRecord {
    written: Mutex<Vec<Vec<u8>>>,
    close_count: AtomicUsize,
}

impl OutputRecord {
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.written.lock().len()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

struct MockOutputStream {
    record: Arc<OutputRecord>,
    fail_writes: bool,
}

impl OutputStream for MockOutputStream {
    fn write(&mut self, pcm: &[u8]) -> Result<(), RoutingError> {
        if self.fail_writes {
            return Err(RoutingError::OutputStream("device gone".into()));
        }
        self.record.written.lock().push(pcm.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<(), RoutingError> {
        self.record.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend recording every stream it opens.
#[derive(Default)]
pub struct MockBackend {
    captures: Mutex<HashMap<String, Arc<MockCaptureStream>>>,
    outputs: Mutex<HashMap<OutputKey, Arc<OutputRecord>>>,
    opened_usages: Mutex<Vec<AudioUsage>>,
    fail_capture: AtomicBool,
    failing_outputs: Mutex<Vec<OutputKey>>,
    devices: Mutex<Vec<OutputDevice>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<OutputDevice>) -> Self {
        let backend = Self::default();
        *backend.devices.lock() = devices;
        backend
    }

    /// Capture stream the next `open_capture_stream` for `app` returns.
    pub fn capture(&self, app: &str) -> Arc<MockCaptureStream> {
        Arc::clone(self.captures.lock().entry(app.to_string()).or_default())
    }

    /// Record for the most recent output stream opened on `key`.
    pub fn output(&self, key: OutputKey) -> Arc<OutputRecord> {
        Arc::clone(self.outputs.lock().entry(key).or_default())
    }

    pub fn opened_usages(&self) -> Vec<AudioUsage> {
        self.opened_usages.lock().clone()
    }

    pub fn fail_capture(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes_on(&self, key: OutputKey) {
        self.failing_outputs.lock().push(key);
    }
}

impl AudioBackend for MockBackend {
    fn open_capture_stream(
        &self,
        app: &ApplicationId,
        usages: &[AudioUsage],
        _format: &StreamFormat,
    ) -> Result<Arc<dyn CaptureStream>, RoutingError> {
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(RoutingError::CaptureStream(format!("{app} is not capturable")));
        }
        *self.opened_usages.lock() = usages.to_vec();
        Ok(self.capture(app.as_str()))
    }

    fn open_output_stream(
        &self,
        device: Option<&OutputDevice>,
        _format: &StreamFormat,
    ) -> Result<Box<dyn OutputStream>, RoutingError> {
        let key = OutputKey::for_device(device);
        let record = Arc::new(OutputRecord::default());
        self.outputs.lock().insert(key, Arc::clone(&record));
        Ok(Box::new(MockOutputStream {
            record,
            fail_writes: self.failing_outputs.lock().contains(&key),
        }))
    }
}

impl Catalog for MockBackend {
    fn list_applications(&self) -> Result<Vec<Application>, RoutingError> {
        Ok(self
            .captures
            .lock()
            .keys()
            .map(|id| Application {
                id: id.clone(),
                display_name: id.clone(),
            })
            .collect())
    }

    fn list_output_devices(&self) -> Result<Vec<OutputDevice>, RoutingError> {
        Ok(self.devices.lock().clone())
    }
}

// --- Control plane ---

/// Control plane that records commands and answers them, immediately unless
/// a delay is set for the command's prefix.
pub struct MockControlPlane {
    commands: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, CommandResult)>>,
    delays: Mutex<Vec<(String, Duration)>>,
    connected: AtomicBool,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
            delays: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Answer commands starting with `prefix` with `result`.
    pub fn respond(&self, prefix: &str, result: CommandResult) {
        self.responses.lock().push((prefix.to_string(), result));
    }

    /// Answer commands starting with `prefix` only after `delay`.
    pub fn delay(&self, prefix: &str, delay: Duration) {
        self.delays.lock().push((prefix.to_string(), delay));
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Commands recorded for `app`, e.g. `["appops set <app> PLAY_AUDIO deny"]`.
    pub fn commands_for(&self, app: &str) -> Vec<String> {
        let needle = format!(" {app} ");
        self.commands().into_iter().filter(|c| c.contains(&needle)).collect()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl ControlPlane for MockControlPlane {
    fn submit(&self, command: &str) -> CommandHandle {
        self.commands.lock().push(command.to_string());
        if !self.connected.load(Ordering::SeqCst) {
            return CommandHandle::ready(Err(ControlError::NotConnected));
        }
        let result = self
            .responses
            .lock()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| Ok(String::new()));

        let delay = self
            .delays
            .lock()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, delay)| *delay);
        match delay {
            Some(delay) => {
                let (reply, handle) = CommandHandle::channel();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    reply.send(result);
                });
                handle
            }
            None => CommandHandle::ready(result),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// --- Reporter and mixer ---

#[derive(Default)]
pub struct RecordingReporter {
    states: Mutex<Vec<(String, SessionState)>>,
    reports: Mutex<Vec<LatencyReport>>,
    errors: Mutex<Vec<(String, RoutingError)>>,
}

impl RecordingReporter {
    pub fn states(&self) -> Vec<(String, SessionState)> {
        self.states.lock().clone()
    }

    pub fn state_names(&self, app: &str) -> Vec<&'static str> {
        self.states
            .lock()
            .iter()
            .filter(|(id, _)| id == app)
            .map(|(_, state)| state.name())
            .collect()
    }

    pub fn reports(&self) -> Vec<LatencyReport> {
        self.reports.lock().clone()
    }

    pub fn errors(&self) -> Vec<(String, RoutingError)> {
        self.errors.lock().clone()
    }
}

impl StatusReporter for RecordingReporter {
    fn on_session_state(&self, application_id: &str, state: &SessionState) {
        self.states.lock().push((application_id.to_string(), state.clone()));
    }

    fn on_latency(&self, report: &LatencyReport) {
        self.reports.lock().push(report.clone());
    }

    fn on_error(&self, application_id: &str, error: &RoutingError) {
        self.errors.lock().push((application_id.to_string(), error.clone()));
    }
}

pub struct MockMixer {
    volume: Mutex<u32>,
}

impl MockMixer {
    pub fn new(volume: u32) -> Self {
        Self {
            volume: Mutex::new(volume),
        }
    }
}

impl SystemMixer for MockMixer {
    fn max_volume(&self) -> u32 {
        15
    }

    fn volume(&self) -> u32 {
        *self.volume.lock()
    }

    fn adjust_volume(&self, direction: VolumeDirection) -> u32 {
        let mut volume = self.volume.lock();
        *volume = match direction {
            VolumeDirection::Lower => volume.saturating_sub(1),
            VolumeDirection::Same => *volume,
            VolumeDirection::Raise => (*volume + 1).min(self.max_volume()),
        };
        *volume
    }
}
