use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::audio_models::{ApplicationId, AudioLevels, OutputDevice, OutputKey};
use crate::models::config::RoutingConfig;
use crate::models::error::{ControlError, RoutingError};
use crate::models::report::{latency_ms, SessionSample};
use crate::models::shell;
use crate::models::state::SessionState;
use crate::processing::pcm;
use crate::session::output_sink::{OutputSink, SinkSettings};
use crate::traits::audio_backend::{AudioBackend, CaptureStream};
use crate::traits::control_plane::{CommandHandle, ControlPlane};
use crate::traits::status_reporter::StatusReporter;

type SharedSink = Arc<Mutex<OutputSink>>;

/// Captures one application's audio and fans it out to a set of outputs.
///
/// While the session runs, the application's direct playback is denied over
/// the control plane so the only audible copy is the one routed here.
///
/// ```text
/// [CaptureStream] → frame → ┬→ [OutputSink: EQ → gain] → device A
///                           └→ [OutputSink: EQ → gain] → device B
/// ```
///
/// The sink map is ordered and guarded by an `RwLock`; the capture thread
/// clones the sink list once per cycle. Each sink has its own lock, and a
/// detached sink is stopped under that lock, so a stale snapshot can only
/// write to a live sink or to a stopped one that ignores the frame.
pub struct CaptureSession {
    id: Uuid,
    app: ApplicationId,
    config: RoutingConfig,
    backend: Arc<dyn AudioBackend>,
    control: Arc<dyn ControlPlane>,
    reporter: Option<Arc<dyn StatusReporter>>,

    state: Mutex<SessionState>,
    sinks: RwLock<IndexMap<OutputKey, SharedSink>>,
    capture: Mutex<Option<Arc<dyn CaptureStream>>>,
    levels: Mutex<AudioLevels>,
    cycles: AtomicU64,

    running: AtomicBool,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CaptureSession {
    pub fn new(
        app: ApplicationId,
        config: RoutingConfig,
        backend: Arc<dyn AudioBackend>,
        control: Arc<dyn ControlPlane>,
        reporter: Option<Arc<dyn StatusReporter>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            app,
            config,
            backend,
            control,
            reporter,
            state: Mutex::new(SessionState::Idle),
            sinks: RwLock::new(IndexMap::new()),
            capture: Mutex::new(None),
            levels: Mutex::new(AudioLevels::default()),
            cycles: AtomicU64::new(0),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.app
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn levels(&self) -> AudioLevels {
        *self.levels.lock()
    }

    /// Deny direct playback, open the capture stream and start the capture
    /// thread. Transitions: idle → starting → running, or → failed.
    ///
    /// At least one output must be attached first.
    pub fn start(self: &Arc<Self>) -> Result<(), RoutingError> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, SessionState::Idle) {
                return Err(RoutingError::InvalidState(format!(
                    "cannot start {} session for {}",
                    state.name(),
                    self.app
                )));
            }
            if self.sinks.read().is_empty() {
                return Err(RoutingError::NoOutputs);
            }
            *state = SessionState::Starting;
        }
        self.notify_state(&SessionState::Starting);
        log::info!("Starting capture session {} for {}", self.id, self.app);

        let deny = self.control.submit(&shell::set_play_audio(&self.app, false));

        let capture = match self.backend.open_capture_stream(
            &self.app,
            &self.config.usages,
            &self.config.stream_format(),
        ) {
            Ok(capture) => capture,
            Err(e) => {
                log::error!("Failed to open capture stream for {}: {}", self.app, e);
                self.abort_start(e.clone());
                return Err(e);
            }
        };

        *self.capture.lock() = Some(Arc::clone(&capture));
        self.running.store(true, Ordering::SeqCst);
        self.set_state(SessionState::Running);

        let session = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("capture-{}", self.app))
            .spawn(move || session.capture_loop(capture, deny));

        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                let error = RoutingError::CaptureStream(format!("failed to spawn capture thread: {}", e));
                log::error!("{}", error);
                self.running.store(false, Ordering::SeqCst);
                if let Some(capture) = self.capture.lock().take() {
                    if let Err(e) = capture.close() {
                        log::warn!("Failed to close capture stream for {}: {}", self.app, e);
                    }
                }
                self.abort_start(error.clone());
                Err(error)
            }
        }
    }

    /// Stop capturing and hand direct playback back to the application.
    /// Transitions: running → stopping → stopped. Idempotent.
    pub fn stop(&self) -> Result<(), RoutingError> {
        self.teardown(SessionState::Stopped)
    }

    /// Attach an output on `device` (or the default output).
    ///
    /// Fails with `DuplicateOutput` if that output is already attached; the
    /// existing sink is left untouched.
    pub fn attach(&self, device: Option<&OutputDevice>, settings: SinkSettings) -> Result<(), RoutingError> {
        let key = OutputKey::for_device(device);
        self.ensure_accepting(key)?;
        if self.sinks.read().contains_key(&key) {
            return Err(RoutingError::DuplicateOutput(key.to_string()));
        }

        let sink = self.open_sink(device, &settings)?;

        let mut sinks = self.sinks.write();
        if sinks.contains_key(&key) {
            drop(sinks);
            Self::stop_sink(key, &sink);
            return Err(RoutingError::DuplicateOutput(key.to_string()));
        }
        sinks.insert(key, sink);
        log::debug!("Attached {} to {}", key, self.app);
        Ok(())
    }

    /// Detach an output and return its last settings.
    ///
    /// Removing the last output stops the session.
    pub fn detach(&self, key: OutputKey) -> Option<SinkSettings> {
        let (sink, now_empty) = {
            let mut sinks = self.sinks.write();
            let sink = sinks.shift_remove(&key)?;
            (sink, sinks.is_empty())
        };

        let settings = sink.lock().settings();
        Self::stop_sink(key, &sink);
        log::debug!("Detached {} from {}", key, self.app);

        if now_empty && !self.state.lock().is_winding_down() {
            log::info!("Last output removed from {}, stopping", self.app);
            if let Err(e) = self.stop() {
                log::warn!("Stopping {} after last detach: {}", self.app, e);
            }
        }
        Some(settings)
    }

    /// Move the output at `old` to `new_device`, keeping its volume, balance
    /// and bands. The swap happens under one write lock, so the capture loop
    /// sees either the old sink or the new one.
    pub fn switch_device(&self, old: OutputKey, new_device: Option<&OutputDevice>) -> Result<(), RoutingError> {
        let new_key = OutputKey::for_device(new_device);
        self.ensure_accepting(new_key)?;

        let settings = {
            let sinks = self.sinks.read();
            if sinks.contains_key(&new_key) {
                return Err(RoutingError::DuplicateOutput(new_key.to_string()));
            }
            match sinks.get(&old) {
                Some(sink) => sink.lock().settings(),
                None => {
                    return Err(RoutingError::InvalidState(format!(
                        "output {} is not attached to {}",
                        old, self.app
                    )))
                }
            }
        };

        let new_sink = self.open_sink(new_device, &settings)?;

        let old_sink = {
            let mut sinks = self.sinks.write();
            if sinks.contains_key(&new_key) {
                drop(sinks);
                Self::stop_sink(new_key, &new_sink);
                return Err(RoutingError::DuplicateOutput(new_key.to_string()));
            }
            let Some((index, _, old_sink)) = sinks.shift_remove_full(&old) else {
                drop(sinks);
                Self::stop_sink(new_key, &new_sink);
                return Err(RoutingError::InvalidState(format!(
                    "output {} was detached from {}",
                    old, self.app
                )));
            };
            sinks.shift_insert(index, new_key, new_sink);
            old_sink
        };

        Self::stop_sink(old, &old_sink);
        log::info!("Switched {} output {} -> {}", self.app, old, new_key);
        Ok(())
    }

    pub fn set_volume(&self, key: OutputKey, volume: f32) {
        if let Some(sink) = self.sink(key) {
            sink.lock().set_volume(volume);
        }
    }

    pub fn set_balance(&self, key: OutputKey, balance: f32) {
        if let Some(sink) = self.sink(key) {
            sink.lock().set_balance(balance);
        }
    }

    pub fn set_band(&self, key: OutputKey, band: usize, gain_db: f32) {
        if let Some(sink) = self.sink(key) {
            if !sink.lock().set_band(band, gain_db) {
                log::debug!("Ignoring unknown band {} on {}", band, key);
            }
        }
    }

    pub fn volume(&self, key: OutputKey) -> Option<f32> {
        self.sink(key).map(|s| s.lock().volume())
    }

    pub fn balance(&self, key: OutputKey) -> Option<f32> {
        self.sink(key).map(|s| s.lock().balance())
    }

    pub fn band(&self, key: OutputKey, band: usize) -> Option<f32> {
        self.sink(key).and_then(|s| s.lock().band(band))
    }

    pub fn bands(&self, key: OutputKey) -> Option<Vec<f32>> {
        self.sink(key).map(|s| s.lock().bands())
    }

    /// Attached outputs in attach order.
    pub fn output_keys(&self) -> Vec<OutputKey> {
        self.sinks.read().keys().copied().collect()
    }

    pub fn has_output(&self, key: OutputKey) -> bool {
        self.sinks.read().contains_key(&key)
    }

    /// Average time per frame cycle over `interval`, resetting the counter.
    pub fn take_latency(&self, interval: Duration) -> f64 {
        self.take_sample(interval).latency_ms
    }

    /// Read and reset the cycle counter, with current levels and outputs.
    pub fn take_sample(&self, interval: Duration) -> SessionSample {
        let cycles = self.cycles.swap(0, Ordering::SeqCst);
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        SessionSample {
            application_id: self.app.to_string(),
            latency_ms: latency_ms(interval_ms, cycles),
            cycles,
            levels: self.levels(),
            outputs: self.sinks.read().len(),
        }
    }

    /// Ask the device whether the app's direct playback is currently denied.
    pub fn is_muted_at_source(&self) -> Result<bool, ControlError> {
        let output = self
            .control
            .submit(&shell::get_play_audio(&self.app))
            .wait_timeout(self.config.control_timeout())?;
        Ok(shell::reports_denied(&output))
    }

    /// Deny direct playback again if the session is still running.
    ///
    /// The command is queued under the state lock, so it always precedes the
    /// `allow` that `stop` queues after leaving `Running`.
    pub fn redeny_direct_playback(&self) -> Option<CommandHandle> {
        let state = self.state.lock();
        if !state.is_running() {
            log::debug!("Not re-denying {}: session is {}", self.app, state.name());
            return None;
        }
        Some(self.control.submit(&shell::set_play_audio(&self.app, false)))
    }

    // --- Internal helpers ---

    fn sink(&self, key: OutputKey) -> Option<SharedSink> {
        self.sinks.read().get(&key).cloned()
    }

    fn open_sink(&self, device: Option<&OutputDevice>, settings: &SinkSettings) -> Result<SharedSink, RoutingError> {
        let sink = OutputSink::open(
            self.backend.as_ref(),
            device,
            &self.config.stream_format(),
            &self.config.band_centers_hz,
            settings,
        )?;
        Ok(Arc::new(Mutex::new(sink)))
    }

    fn ensure_accepting(&self, key: OutputKey) -> Result<(), RoutingError> {
        let state = self.state.lock();
        if state.is_winding_down() {
            return Err(RoutingError::InvalidState(format!(
                "cannot attach {} to {} session",
                key,
                state.name()
            )));
        }
        Ok(())
    }

    fn stop_sink(key: OutputKey, sink: &SharedSink) {
        if let Err(e) = sink.lock().stop() {
            log::warn!("Failed to stop output {}: {}", key, e);
        }
    }

    fn stop_all_sinks(&self) {
        let drained: Vec<(OutputKey, SharedSink)> = self.sinks.write().drain(..).collect();
        for (key, sink) in &drained {
            Self::stop_sink(*key, sink);
        }
    }

    fn set_state(&self, new_state: SessionState) {
        *self.state.lock() = new_state.clone();
        self.notify_state(&new_state);
    }

    fn notify_state(&self, state: &SessionState) {
        log::debug!("Session {} ({}) -> {}", self.id, self.app, state.name());
        if let Some(ref reporter) = self.reporter {
            reporter.on_session_state(self.app.as_str(), state);
        }
    }

    fn report_error(&self, error: &RoutingError) {
        if let Some(ref reporter) = self.reporter {
            reporter.on_error(self.app.as_str(), error);
        }
    }

    fn allow_direct_playback(&self) -> CommandHandle {
        self.control.submit(&shell::set_play_audio(&self.app, true))
    }

    /// Undo a failed start: re-allow the app, release sinks, mark failed.
    fn abort_start(&self, error: RoutingError) {
        let allow = self.allow_direct_playback();
        self.stop_all_sinks();
        if let Err(e) = allow.wait_timeout(self.config.control_timeout()) {
            log::warn!("Failed to re-allow direct playback for {}: {}", self.app, e);
        }
        self.report_error(&error);
        self.set_state(SessionState::Failed(error));
    }

    fn teardown(&self, outcome: SessionState) -> Result<(), RoutingError> {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.clone();
            if matches!(previous, SessionState::Starting | SessionState::Running) {
                *state = SessionState::Stopping;
            }
            previous
        };
        match previous {
            SessionState::Starting | SessionState::Running => {}
            SessionState::Idle => {
                self.stop_all_sinks();
                return Ok(());
            }
            _ => return Ok(()),
        }
        self.notify_state(&SessionState::Stopping);
        log::info!("Stopping capture session {} for {}", self.id, self.app);

        self.running.store(false, Ordering::SeqCst);
        let allow = self.allow_direct_playback();

        let mut first_error = None;
        if let Some(capture) = self.capture.lock().take() {
            if let Err(e) = capture.close() {
                log::warn!("Failed to close capture stream for {}: {}", self.app, e);
                first_error = Some(e);
            }
        }

        self.stop_all_sinks();

        if let Some(handle) = self.worker.lock().take() {
            // The capture thread stops itself on stream end; it cannot join itself.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("Capture thread for {} panicked", self.app);
            }
        }

        if let Err(e) = allow.wait_timeout(self.config.control_timeout()) {
            log::warn!("Failed to re-allow direct playback for {}: {}", self.app, e);
        }

        self.set_state(outcome);
        log::info!("Capture session {} for {} stopped", self.id, self.app);
        first_error.map_or(Ok(()), Err)
    }

    fn capture_loop(self: Arc<Self>, capture: Arc<dyn CaptureStream>, deny: CommandHandle) {
        let mut deny = Some(deny);
        let mut frame = vec![0u8; self.config.frame_bytes];

        while self.running.load(Ordering::SeqCst) {
            if let Some(result) = deny.as_ref().and_then(CommandHandle::try_result) {
                match result {
                    Ok(_) => log::debug!("Direct playback denied for {}", self.app),
                    Err(e) => log::warn!("Failed to deny direct playback for {}: {}", self.app, e),
                }
                deny = None;
            }

            let n = match capture.read(&mut frame) {
                Ok(0) => {
                    if self.running.load(Ordering::SeqCst) {
                        log::info!("Capture stream for {} ended", self.app);
                        if let Err(e) = self.stop() {
                            log::warn!("Stopping {} after stream end: {}", self.app, e);
                        }
                    }
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        log::error!("Capture read failed for {}: {}", self.app, e);
                        self.report_error(&e);
                        if let Err(close_err) = self.teardown(SessionState::Failed(e)) {
                            log::warn!("Tearing down {}: {}", self.app, close_err);
                        }
                    }
                    break;
                }
            };
            let data = &frame[..n];

            let snapshot: Vec<(OutputKey, SharedSink)> = self
                .sinks
                .read()
                .iter()
                .map(|(key, sink)| (*key, Arc::clone(sink)))
                .collect();

            let mut failed = Vec::new();
            for (key, sink) in &snapshot {
                if let Err(e) = sink.lock().write(data) {
                    log::warn!("Output {} for {} failed: {}", key, self.app, e);
                    self.report_error(&e);
                    failed.push(*key);
                }
            }

            self.cycles.fetch_add(1, Ordering::SeqCst);
            *self.levels.lock() = AudioLevels {
                rms: pcm::rms_level(data),
                peak: pcm::peak_level(data),
            };

            for key in failed {
                self.detach(key);
            }
        }
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("app", &self.app)
            .field("state", &self.state())
            .field("outputs", &self.output_keys())
            .finish()
    }
}
