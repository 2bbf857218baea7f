//! Connection state machine and polling session
//!
//! Owns the connection lifecycle (scan, connect, service resolution,
//! initialization handshake, steady-state polling) and every piece of
//! session state: the command queue, the receive buffer, the latest
//! samples, and the recorder. Everything runs on one task consuming one
//! serialized event stream, so none of that state needs locking.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::sched::{Scheduler, TimerFire, TimerPurpose};
use crate::telemetry::{
    LatestSamples, PidReading, SessionRecorder, SpeedSource, TelemetrySnapshot,
};
use crate::uplink::{
    SampleResponse, SessionPayload, SessionResponse, SingleSamplePayload, UplinkClient,
    UplinkError,
};

use super::adapter::AdapterProfile;
use super::error::ObdError;
use super::frame::{ecu_not_ready, tokenize, ReceiveBuffer};
use super::pid::{extract, Pid, LIVE_DATA_MODE, SUPPORTED_PIDS_PROBE};
use super::queue::CommandQueue;
use super::transport::BleTransport;
use super::{
    COMMAND_TIMEOUT, ECU_RETRY_DELAY, NOTIFY_SETTLE_DELAY, POLL_INTERVAL, SCAN_TIMEOUT,
    UPLOAD_DEBOUNCE,
};

/// PIDs that must have a reading before a single-sample upload fires.
const UPLOAD_REQUIRED_PIDS: [Pid; 3] = [
    Pid::EngineRpm,
    Pid::EngineLoad,
    Pid::IntakeManifoldPressure,
];

/// Connection lifecycle state.
///
/// There is no automatic transition out of `Failed` or `Connected`;
/// reconnection means running a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Nothing started yet.
    Idle,
    /// Scanning for a peripheral with a matching name.
    Scanning,
    /// Matching peripheral found, transport-level connect in progress.
    Connecting,
    /// Connected with a resolved UART channel.
    Connected,
    /// Scan timed out or the connect sequence failed.
    Failed,
}

/// Control operations the presentation layer can send into a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Enable or disable the continuous polling loop.
    SetContinuousPolling(bool),
    /// Enable or disable debounced single-sample uploads.
    SetAutoUpload(bool),
    /// Set or clear a manually entered speed (km/h).
    SetManualSpeed(Option<f64>),
    /// Begin recording a collection session.
    StartRecording,
    /// Stop recording and upload the aligned session.
    StopRecording,
    /// Terminate the session task.
    Shutdown,
}

/// Result of a spawned upload, routed back onto the session's stream.
#[derive(Debug)]
enum UploadOutcome {
    Sample(Result<SampleResponse, UplinkError>),
    Session(Result<SessionResponse, UplinkError>),
}

/// Handle held by consumers of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<TelemetrySnapshot>,
}

impl SessionHandle {
    /// Send a control command. Returns false when the session has ended.
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to the change-notification stream.
    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshot.clone()
    }
}

/// One BLE OBD session: at most one adapter, one connection attempt.
pub struct ObdSession<T: BleTransport> {
    transport: T,
    profile: AdapterProfile,
    uplink: UplinkClient,

    queue: CommandQueue,
    buffer: ReceiveBuffer,
    samples: LatestSamples,
    recorder: SessionRecorder,
    snapshot: TelemetrySnapshot,

    sched: Scheduler,
    timer_rx: mpsc::UnboundedReceiver<TimerFire>,
    snapshot_tx: watch::Sender<TelemetrySnapshot>,
    command_rx: mpsc::Receiver<SessionCommand>,
    notifications: Option<mpsc::Receiver<Vec<u8>>>,
    upload_tx: mpsc::UnboundedSender<UploadOutcome>,
    upload_rx: mpsc::UnboundedReceiver<UploadOutcome>,

    /// Initialization must run exactly once per connection even if the
    /// notify-enabled path fires more than once.
    initialized: bool,
    continuous_polling: bool,
    auto_upload: bool,
    manual_speed: Option<f64>,
}

impl<T: BleTransport> ObdSession<T> {
    /// Create a session and the handle its consumers keep.
    pub fn new(
        transport: T,
        profile: AdapterProfile,
        uplink: UplinkClient,
    ) -> (Self, SessionHandle) {
        let (sched, timer_rx) = Scheduler::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(TelemetrySnapshot::default());
        let (command_tx, command_rx) = mpsc::channel(16);
        let (upload_tx, upload_rx) = mpsc::unbounded_channel();

        let session = Self {
            transport,
            profile,
            uplink,
            queue: CommandQueue::new(),
            buffer: ReceiveBuffer::new(),
            samples: LatestSamples::new(),
            recorder: SessionRecorder::new(),
            snapshot: TelemetrySnapshot::default(),
            sched,
            timer_rx,
            snapshot_tx,
            command_rx,
            notifications: None,
            upload_tx,
            upload_rx,
            initialized: false,
            continuous_polling: true,
            auto_upload: true,
            manual_speed: None,
        };
        let handle = SessionHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
        };
        (session, handle)
    }

    /// Run the session to completion: connect, initialize, then process
    /// events until shutdown or transport loss.
    pub async fn run(mut self) {
        if let Err(e) = self.establish().await {
            warn!(error = %e, "connection attempt failed");
            self.set_state(ConnectionState::Failed);
            return;
        }
        self.event_loop().await;
    }

    /// Scan, connect, and resolve the UART channel.
    async fn establish(&mut self) -> Result<(), ObdError> {
        self.reset_session_state();
        self.set_state(ConnectionState::Scanning);

        let scanned = tokio::time::timeout(
            SCAN_TIMEOUT,
            self.transport.find_adapter(&self.profile.name_fragment),
        )
        .await;
        match scanned {
            Err(_) => {
                warn!(
                    timeout_s = SCAN_TIMEOUT.as_secs(),
                    "scan window elapsed with no matching peripheral"
                );
                // The dropped scan future never reached its own stop
                // path; stop the central explicitly.
                if let Err(e) = self.transport.stop_scan().await {
                    warn!(error = %e, "failed to stop scan after timeout");
                }
                return Err(ObdError::ScanTimeout);
            }
            Ok(result) => result?,
        }

        self.set_state(ConnectionState::Connecting);
        self.transport.connect().await?;

        let notifications = self
            .transport
            .open_channel(&self.profile.uart_candidates)
            .await?;
        self.notifications = Some(notifications);
        self.set_state(ConnectionState::Connected);

        // Let the adapter settle after notify-enable before talking.
        self.sched
            .schedule(TimerPurpose::InitSettle, NOTIFY_SETTLE_DELAY);
        Ok(())
    }

    /// A new connection attempt starts from a clean slate; nothing from
    /// a previous session's queue or buffers may leak in.
    fn reset_session_state(&mut self) {
        self.queue.clear();
        self.buffer.clear();
        self.samples.clear();
        self.recorder = SessionRecorder::new();
        self.snapshot = TelemetrySnapshot::default();
        self.initialized = false;
        self.manual_speed = None;
        for purpose in [
            TimerPurpose::CommandTimeout,
            TimerPurpose::InitSettle,
            TimerPurpose::EcuRetry,
            TimerPurpose::PollTick,
            TimerPurpose::UploadDebounce,
        ] {
            self.sched.cancel(purpose);
        }
        self.publish();
    }

    async fn event_loop(&mut self) {
        let mut notifications = match self.notifications.take() {
            Some(rx) => rx,
            None => return,
        };

        loop {
            tokio::select! {
                maybe = notifications.recv() => match maybe {
                    Some(payload) => self.on_notification(&payload).await,
                    None => {
                        warn!("notification channel closed, ending session");
                        self.set_state(ConnectionState::Failed);
                        return;
                    }
                },
                Some(fire) = self.timer_rx.recv() => self.on_timer(fire).await,
                Some(outcome) = self.upload_rx.recv() => self.on_upload_outcome(outcome),
                maybe = self.command_rx.recv() => match maybe {
                    Some(SessionCommand::Shutdown) | None => {
                        info!("session shutting down");
                        return;
                    }
                    Some(command) => self.on_command(command).await,
                },
            }
        }
    }

    async fn on_command(&mut self, command: SessionCommand) {
        debug!(?command, "control command");
        match command {
            SessionCommand::SetContinuousPolling(enabled) => {
                self.continuous_polling = enabled;
                if !enabled {
                    self.sched.cancel(TimerPurpose::PollTick);
                } else if self.snapshot.state == ConnectionState::Connected
                    && self.initialized
                    && self.queue.is_idle()
                {
                    self.enqueue_poll_batch().await;
                }
            }
            SessionCommand::SetAutoUpload(enabled) => {
                self.auto_upload = enabled;
                if !enabled {
                    self.sched.cancel(TimerPurpose::UploadDebounce);
                } else {
                    self.maybe_schedule_upload();
                }
            }
            SessionCommand::SetManualSpeed(speed) => {
                self.manual_speed = speed;
                let (speed_kmh, source) = self.current_speed();
                self.snapshot.speed_kmh = Some(speed_kmh);
                self.snapshot.speed_source = source;
                self.publish();
                if self.auto_upload {
                    self.maybe_schedule_upload();
                }
            }
            SessionCommand::StartRecording => {
                self.recorder.start();
                self.snapshot.recorded_samples = 0;
                self.publish();
            }
            SessionCommand::StopRecording => {
                match self.recorder.stop() {
                    Some(aligned) => self.upload_session(SessionPayload::from(aligned)),
                    None => info!("recording stopped with no aligned samples"),
                }
                self.publish();
            }
            SessionCommand::Shutdown => unreachable!("handled by the event loop"),
        }
    }

    async fn on_timer(&mut self, fire: TimerFire) {
        if !self.sched.is_current(fire) {
            return; // superseded by a reschedule or cancel
        }
        match fire.purpose {
            TimerPurpose::InitSettle => self.start_initialization().await,
            TimerPurpose::CommandTimeout => {
                if let Some(command) = self.queue.timed_out() {
                    warn!(%command, "no terminator within timeout, advancing queue");
                }
                self.pump().await;
            }
            TimerPurpose::EcuRetry => {
                info!("re-issuing supported-PIDs probe");
                self.queue.enqueue([SUPPORTED_PIDS_PROBE]);
                self.pump().await;
            }
            TimerPurpose::PollTick => {
                if self.continuous_polling {
                    self.enqueue_poll_batch().await;
                }
            }
            TimerPurpose::UploadDebounce => self.upload_latest_sample(),
        }
    }

    /// Run the fixed AT handshake followed by the supported-PIDs probe.
    /// Guarded so duplicate notify-enabled callbacks cannot re-run it.
    async fn start_initialization(&mut self) {
        if self.initialized {
            debug!("initialization already performed for this connection");
            return;
        }
        self.initialized = true;
        info!("starting adapter initialization");
        let commands: Vec<String> = self
            .profile
            .init_commands
            .iter()
            .cloned()
            .chain([SUPPORTED_PIDS_PROBE.to_string()])
            .collect();
        self.queue.enqueue(commands);
        self.pump().await;
    }

    async fn enqueue_poll_batch(&mut self) {
        self.queue.enqueue(self.profile.pid_requests());
        self.pump().await;
    }

    /// Transmit the next queued command if nothing is in flight.
    async fn pump(&mut self) {
        if let Some(command) = self.queue.advance() {
            self.transmit(command).await;
        }
    }

    async fn transmit(&mut self, command: String) {
        debug!(%command, "sending command");
        let line = format!("{command}\r");
        if let Err(e) = self.transport.send(line.as_bytes()).await {
            // Not fatal: the command timeout will advance the queue.
            warn!(%command, error = %e, "write failed");
        }
        self.sched
            .schedule(TimerPurpose::CommandTimeout, COMMAND_TIMEOUT);
    }

    async fn on_notification(&mut self, payload: &[u8]) {
        let text = String::from_utf8_lossy(payload);
        debug!(chunk = %text.escape_debug(), "notification");
        let frames = self.buffer.push(&text);
        for frame in frames {
            self.handle_frame(&frame).await;
        }
    }

    /// Process one complete (prompt-terminated) frame, attribute it to
    /// the in-flight command, and advance the queue in the same pass.
    async fn handle_frame(&mut self, frame: &str) {
        self.sched.cancel(TimerPurpose::CommandTimeout);

        let completed = match self.queue.complete() {
            Some(command) => command,
            None => {
                debug!(%frame, "frame with no command in flight, dropping");
                self.pump().await;
                return;
            }
        };

        if ecu_not_ready(frame) {
            warn!(command = %completed, %frame, "ECU not ready, will re-probe");
            self.sched.schedule(TimerPurpose::EcuRetry, ECU_RETRY_DELAY);
        } else if completed == SUPPORTED_PIDS_PROBE {
            // A retried probe can complete while batch commands are
            // still queued; don't stack a second batch on top of them.
            if self.queue.is_idle() {
                info!("supported-PIDs probe answered, starting PID polling");
                self.queue.enqueue(self.profile.pid_requests());
            } else {
                debug!("probe answered with commands still queued");
            }
        } else if let Some(pid) = Pid::from_request(&completed) {
            self.handle_pid_reply(pid, frame);
        } else {
            // AT command echo/OK; nothing to decode.
            debug!(command = %completed, %frame, "adapter response");
        }

        self.pump().await;
    }

    fn handle_pid_reply(&mut self, pid: Pid, frame: &str) {
        let tokens = tokenize(frame);
        let Some(matched) = extract(&tokens, LIVE_DATA_MODE, pid) else {
            // Malformed or missing match: log and let the queue advance.
            warn!(?pid, %frame, "no PID match in frame");
            return;
        };
        let hex = matched.join(" ");
        let Some(value) = pid.decode(&matched[2..]) else {
            warn!(?pid, %hex, "undecodable data bytes");
            return;
        };

        let at = chrono::Utc::now();
        self.recorder.record(pid, &hex, at);
        self.samples.insert(
            pid,
            PidReading {
                hex,
                value,
                at,
            },
        );
        info!(pid = pid.label(), value, unit = pid.unit(), "sample decoded");

        match pid {
            Pid::EngineRpm => self.snapshot.rpm = Some(value),
            Pid::EngineLoad => self.snapshot.engine_load = Some(value),
            Pid::IntakeManifoldPressure => self.snapshot.intake_manifold = Some(value),
            Pid::VehicleSpeed => {
                let (speed_kmh, source) = self.current_speed();
                self.snapshot.speed_kmh = Some(speed_kmh);
                self.snapshot.speed_source = source;
            }
            _ => {}
        }
        self.snapshot.recorded_samples = self.recorder.sample_count();
        self.publish();
        self.maybe_schedule_upload();

        // The last PID of the batch closes one poll cycle.
        if self.profile.pids.last() == Some(&pid) && self.continuous_polling {
            self.sched.schedule(TimerPurpose::PollTick, POLL_INTERVAL);
        }
    }

    /// Arm (or re-arm) the upload debounce once every required PID has
    /// at least one reading; a burst of updates collapses into one fire.
    fn maybe_schedule_upload(&mut self) {
        if self.auto_upload && self.samples.has_all(&UPLOAD_REQUIRED_PIDS) {
            self.sched
                .schedule(TimerPurpose::UploadDebounce, UPLOAD_DEBOUNCE);
        }
    }

    fn current_speed(&self) -> (f64, SpeedSource) {
        match self.manual_speed {
            Some(speed) => (speed, SpeedSource::Manual),
            None => (
                self.samples.value(Pid::VehicleSpeed).unwrap_or(0.0),
                SpeedSource::Calculated,
            ),
        }
    }

    fn upload_latest_sample(&mut self) {
        let (speed_kmh, source) = self.current_speed();
        let Some(payload) = SingleSamplePayload::from_samples(&self.samples, speed_kmh, source)
        else {
            return;
        };
        let client = self.uplink.clone();
        let tx = self.upload_tx.clone();
        tokio::spawn(async move {
            let result = client.post_sample(&payload).await;
            let _ = tx.send(UploadOutcome::Sample(result));
        });
    }

    fn upload_session(&mut self, payload: SessionPayload) {
        info!(
            sample_count = payload.session_data.sample_count,
            "uploading recorded session"
        );
        let client = self.uplink.clone();
        let tx = self.upload_tx.clone();
        tokio::spawn(async move {
            let result = client.post_session(&payload).await;
            let _ = tx.send(UploadOutcome::Session(result));
        });
    }

    /// Route backend-computed fields into the observable snapshot. An
    /// uplink failure is logged and dropped; the BLE session continues.
    fn on_upload_outcome(&mut self, outcome: UploadOutcome) {
        match outcome {
            UploadOutcome::Sample(Ok(response)) => {
                if let Some(parsed) = response.parsed {
                    if let Some(rpm) = parsed.rpm {
                        self.snapshot.rpm = Some(rpm.value);
                    }
                    if let Some(load) = parsed.engine_load {
                        self.snapshot.engine_load = Some(load.value);
                    }
                    if let Some(manifold) = parsed.intake_manifold {
                        self.snapshot.intake_manifold = Some(manifold.value);
                    }
                }
                if let Some(emissions) = response.emissions {
                    // Each report supersedes the previous one wholesale.
                    self.snapshot.fuel_lph = emissions.fuel_lph;
                    self.snapshot.co2_kg_per_hr = emissions.co2_kg_per_hr;
                }
                self.publish();
            }
            UploadOutcome::Session(Ok(response)) => {
                if let Some(averages) = response.averages {
                    info!(?averages, "session averages received");
                }
                if let Some(emissions) = response.emissions {
                    self.snapshot.fuel_lph = emissions.fuel_lph;
                    self.snapshot.co2_kg_per_hr = emissions.co2_kg_per_hr;
                }
                self.publish();
            }
            UploadOutcome::Sample(Err(e)) | UploadOutcome::Session(Err(e)) => {
                warn!(error = %e, "upload failed");
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.snapshot.state != state {
            info!(?state, "connection state changed");
            self.snapshot.state = state;
            self.publish();
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot.clone());
    }
}
