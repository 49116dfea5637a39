use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread;

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::models::audio_models::{Application, ApplicationId, OutputDevice};
use crate::models::config::RoutingConfig;
use crate::models::error::RoutingError;
use crate::models::report::LatencyReport;
use crate::models::shell::{self, MediaKey, VolumeDirection};
use crate::session::capture_session::CaptureSession;
use crate::session::output_sink::SinkSettings;
use crate::traits::audio_backend::{AudioBackend, Catalog};
use crate::traits::control_plane::{CommandHandle, ControlPlane};
use crate::traits::status_reporter::StatusReporter;
use crate::traits::system_mixer::SystemMixer;

struct Shared {
    config: RoutingConfig,
    backend: Arc<dyn AudioBackend>,
    catalog: Arc<dyn Catalog>,
    control: Arc<dyn ControlPlane>,
    mixer: Arc<dyn SystemMixer>,
    reporter: Option<Arc<dyn StatusReporter>>,
    sessions: Mutex<IndexMap<ApplicationId, Arc<CaptureSession>>>,
    /// Apps whose session is being started; locked after `sessions`.
    starting: Mutex<HashSet<ApplicationId>>,
}

impl Shared {
    fn sample_latency(&self) -> LatencyReport {
        let interval = self.config.sample_interval();
        let samples = {
            let mut sessions = self.sessions.lock();
            sessions.retain(|app, session| {
                let keep = !session.state().is_terminal();
                if !keep {
                    log::debug!("Pruning finished session for {}", app);
                }
                keep
            });
            sessions.values().map(|s| s.take_sample(interval)).collect()
        };

        let report = LatencyReport {
            sampled_at: Utc::now(),
            sessions: samples,
        };
        if let Some(ref reporter) = self.reporter {
            reporter.on_latency(&report);
        }
        report
    }

    fn running_sessions(&self) -> Vec<Arc<CaptureSession>> {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.state().is_running())
            .cloned()
            .collect()
    }
}

/// Owns every active capture session, keyed by application.
///
/// Replaces a process-wide registry: create one manager per host and share
/// it. Dropping the manager stops the sampler and every session.
pub struct RoutingManager {
    shared: Arc<Shared>,
    sampler: Mutex<Option<(mpsc::Sender<()>, thread::JoinHandle<()>)>>,
}

impl RoutingManager {
    pub fn new(
        config: RoutingConfig,
        backend: Arc<dyn AudioBackend>,
        catalog: Arc<dyn Catalog>,
        control: Arc<dyn ControlPlane>,
        mixer: Arc<dyn SystemMixer>,
        reporter: Option<Arc<dyn StatusReporter>>,
    ) -> Result<Self, RoutingError> {
        config.validate().map_err(RoutingError::Configuration)?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                backend,
                catalog,
                control,
                mixer,
                reporter,
                sessions: Mutex::new(IndexMap::new()),
                starting: Mutex::new(HashSet::new()),
            }),
            sampler: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.shared.config
    }

    /// Start routing `app` to `device` (or the default output).
    ///
    /// Refuses with `AlreadyRouting` when the app already has a live session.
    pub fn start(
        &self,
        app: &str,
        device: Option<&OutputDevice>,
        volume: f32,
    ) -> Result<Arc<CaptureSession>, RoutingError> {
        let app = ApplicationId::parse(app)?;
        {
            let sessions = self.shared.sessions.lock();
            let live = sessions.get(&app).is_some_and(|s| !s.state().is_terminal());
            if live || !self.shared.starting.lock().insert(app.clone()) {
                log::warn!("Ignoring start for {}: already routing", app);
                return Err(RoutingError::AlreadyRouting(app.to_string()));
            }
        }

        let result = self.launch(&app, device, volume);

        let mut sessions = self.shared.sessions.lock();
        self.shared.starting.lock().remove(&app);
        let session = result?;
        sessions.insert(app, Arc::clone(&session));
        Ok(session)
    }

    fn launch(
        &self,
        app: &ApplicationId,
        device: Option<&OutputDevice>,
        volume: f32,
    ) -> Result<Arc<CaptureSession>, RoutingError> {
        let session = CaptureSession::new(
            app.clone(),
            self.shared.config.clone(),
            Arc::clone(&self.shared.backend),
            Arc::clone(&self.shared.control),
            self.shared.reporter.clone(),
        );
        session.attach(device, SinkSettings::new(volume))?;
        session.start()?;
        Ok(session)
    }

    pub fn stop(&self, app: &str) -> Result<(), RoutingError> {
        let session = ApplicationId::parse(app)
            .ok()
            .and_then(|id| self.shared.sessions.lock().shift_remove(&id))
            .ok_or_else(|| RoutingError::NotRouting(app.to_string()))?;
        session.stop()
    }

    /// Stop every session, logging failures.
    pub fn stop_all(&self) {
        let sessions: Vec<_> = self.shared.sessions.lock().drain(..).collect();
        for (app, session) in sessions {
            if let Err(e) = session.stop() {
                log::error!("Failed to stop session for {}: {}", app, e);
            }
        }
    }

    pub fn session(&self, app: &str) -> Option<Arc<CaptureSession>> {
        let id = ApplicationId::parse(app).ok()?;
        self.shared.sessions.lock().get(&id).cloned()
    }

    /// Applications with a session that has not finished.
    pub fn active_apps(&self) -> Vec<String> {
        self.shared
            .sessions
            .lock()
            .iter()
            .filter(|(_, s)| !s.state().is_terminal())
            .map(|(app, _)| app.to_string())
            .collect()
    }

    pub fn is_active(&self) -> bool {
        self.shared
            .sessions
            .lock()
            .values()
            .any(|s| s.state().is_running())
    }

    /// Read and reset every session's cycle counter, prune finished
    /// sessions and publish the result to the reporter.
    pub fn sample_latency(&self) -> LatencyReport {
        self.shared.sample_latency()
    }

    /// Start the periodic sampling thread. No-op if already running.
    pub fn start_sampler(&self) -> Result<(), RoutingError> {
        let mut sampler = self.sampler.lock();
        if sampler.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let interval = self.shared.config.sample_interval();

        let handle = thread::Builder::new()
            .name("latency-sampler".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let report = shared.sample_latency();
                log::debug!("{}", report.summary());
            })
            .map_err(|e| RoutingError::InvalidState(format!("failed to spawn sampler: {}", e)))?;

        *sampler = Some((stop_tx, handle));
        Ok(())
    }

    pub fn stop_sampler(&self) {
        if let Some((stop_tx, handle)) = self.sampler.lock().take() {
            drop(stop_tx);
            if handle.join().is_err() {
                log::error!("Latency sampler panicked");
            }
        }
    }

    /// Forward a media key to the device.
    ///
    /// `Play` needs the apps' direct output back for the key to take effect,
    /// so every routed app is allowed first and denied again after
    /// `replay_redeny_delay`.
    pub fn handle_media_key(&self, key: MediaKey) -> CommandHandle {
        if key != MediaKey::Play {
            return self.shared.control.submit(&key.command());
        }

        let sessions = self.shared.running_sessions();
        let allows: Vec<(ApplicationId, CommandHandle)> = sessions
            .iter()
            .map(|s| {
                let app = s.application_id().clone();
                let allow = self.shared.control.submit(&shell::set_play_audio(&app, true));
                (app, allow)
            })
            .collect();
        let handle = self.shared.control.submit(&key.command());

        if !sessions.is_empty() {
            let delay = self.shared.config.replay_redeny_delay();
            let timeout = self.shared.config.control_timeout();
            let spawned = thread::Builder::new()
                .name("replay-redeny".into())
                .spawn(move || {
                    thread::sleep(delay);
                    let denies: Vec<(ApplicationId, CommandHandle)> = sessions
                        .iter()
                        .filter_map(|s| s.redeny_direct_playback().map(|h| (s.application_id().clone(), h)))
                        .collect();

                    for (app, allow) in allows {
                        if let Err(e) = allow.wait_timeout(timeout) {
                            log::warn!("Failed to allow direct playback for {} before play: {}", app, e);
                        }
                    }
                    for (app, deny) in denies {
                        if let Err(e) = deny.wait_timeout(timeout) {
                            log::warn!("Failed to re-deny direct playback for {}: {}", app, e);
                        }
                    }
                });
            if let Err(e) = spawned {
                log::error!("Failed to schedule re-deny after play: {}", e);
            }
        }
        handle
    }

    /// Step the system music volume; returns the new level.
    pub fn adjust_system_volume(&self, direction: VolumeDirection) -> u32 {
        self.shared.mixer.adjust_volume(direction)
    }

    pub fn applications(&self) -> Result<Vec<Application>, RoutingError> {
        self.shared.catalog.list_applications()
    }

    /// Output devices captured audio may be routed to.
    pub fn routable_output_devices(&self) -> Result<Vec<OutputDevice>, RoutingError> {
        Ok(self
            .shared
            .catalog
            .list_output_devices()?
            .into_iter()
            .filter(|d| d.kind.is_routable())
            .collect())
    }
}

impl Drop for RoutingManager {
    fn drop(&mut self) {
        self.stop_sampler();
        self.stop_all();
    }
}
