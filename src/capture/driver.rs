//! Async driver for a capture session.
//!
//! One task owns the `CaptureSession` and is the only writer of its frame
//! collection. It multiplexes three event sources:
//! - user commands sent through a `CaptureHandle`
//! - timer ticks, armed only while timer mode is recording
//! - the video source's termination signal
//!
//! The timer lives in the loop itself. Turning recording off drops it
//! before the next `select!`, so a tick can never land after the session
//! has left `Active`.

use super::session::{CaptureOutcome, CaptureSession, CaptureStatus, ModeKind};
use super::source::{SourceProvider, StreamConstraints};
use super::CaptureError;
use crate::config::SnapConfig;
use crate::frame::FrameId;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Commands queued per handle before senders start waiting.
const COMMAND_BUFFER: usize = 16;

type Reply<T> = oneshot::Sender<Result<T, CaptureError>>;

enum Command {
    Trigger(Reply<Option<FrameId>>),
    SetMode(ModeKind, Reply<()>),
    SetRecording(bool, Reply<()>),
    ToggleRecording(Reply<bool>),
    Finish(Reply<()>),
    Cancel(oneshot::Sender<()>),
}

/// Settings for a new capture session.
#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    pub mode: ModeKind,
    pub timer_period: Duration,
    pub constraints: StreamConstraints,
}

impl CaptureOptions {
    pub fn new(mode: ModeKind) -> Self {
        Self {
            mode,
            ..Self::from_config(&SnapConfig::default())
        }
    }

    pub fn from_config(config: &SnapConfig) -> Self {
        Self {
            mode: ModeKind::Single,
            timer_period: config.timer_period(),
            constraints: config.constraints(),
        }
    }

    pub fn with_mode(mut self, mode: ModeKind) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timer_period(mut self, period: Duration) -> Self {
        self.timer_period = period;
        self
    }
}

/// Caller's side of a running session. Cheap to clone.
///
/// When the last handle is dropped the session is cancelled.
#[derive(Clone)]
pub struct CaptureHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<CaptureStatus>,
}

impl CaptureHandle {
    /// Capture one frame now.
    pub async fn trigger(&self) -> Result<Option<FrameId>, CaptureError> {
        self.request(Command::Trigger).await
    }

    pub async fn set_mode(&self, mode: ModeKind) -> Result<(), CaptureError> {
        self.request(|reply| Command::SetMode(mode, reply)).await
    }

    pub async fn set_recording(&self, on: bool) -> Result<(), CaptureError> {
        self.request(|reply| Command::SetRecording(on, reply)).await
    }

    /// Flip timer recording. Returns the new value.
    pub async fn toggle_recording(&self) -> Result<bool, CaptureError> {
        self.request(Command::ToggleRecording).await
    }

    /// Finish and hand over the frames. Needs at least one frame.
    pub async fn finish(&self) -> Result<(), CaptureError> {
        self.request(Command::Finish).await
    }

    /// Cancel the session.
    ///
    /// Returns once the source is released and the timer disarmed. Calling
    /// this on an already-ended session is a no-op.
    pub async fn cancel(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Cancel(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Latest session snapshot.
    pub fn status(&self) -> CaptureStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<CaptureStatus> {
        self.status.clone()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, CaptureError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| CaptureError::NotActive)?;
        rx.await.map_err(|_| CaptureError::NotActive)?
    }
}

/// Resolves to the session's outcome.
pub struct CaptureCompletion {
    outcome: oneshot::Receiver<CaptureOutcome>,
}

impl CaptureCompletion {
    pub async fn wait(self) -> Result<CaptureOutcome, CaptureError> {
        self.outcome.await.map_err(|_| CaptureError::DriverGone)
    }
}

/// Acquire a stream and start a capture session on it.
///
/// Suspends until the provider grants or denies the stream. A denial is
/// returned as-is; nothing is left running. Must be called from within a
/// tokio runtime.
pub async fn start_capture<P: SourceProvider>(
    provider: &P,
    options: CaptureOptions,
) -> Result<(CaptureHandle, CaptureCompletion), CaptureError> {
    if options.timer_period.is_zero() {
        return Err(CaptureError::InvalidTimerPeriod);
    }

    log::info!("[CAPTURE] Requesting display stream ({:?} mode)", options.mode);
    let source = match provider.acquire(options.constraints).await {
        Ok(source) => source,
        Err(e) => {
            log::error!("[CAPTURE] Stream acquisition failed: {}", e);
            return Err(e);
        }
    };

    let session = CaptureSession::new(source, options.mode);
    if *session.termination().borrow() {
        // Dropping the session releases the source.
        log::warn!("[CAPTURE] Stream ended before capture started");
        return Err(CaptureError::SourceUnavailable);
    }

    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (status_tx, status_rx) = watch::channel(session.status());
    let (outcome_tx, outcome_rx) = oneshot::channel();

    tokio::spawn(drive(
        session,
        command_rx,
        status_tx,
        outcome_tx,
        options.timer_period,
    ));

    Ok((
        CaptureHandle {
            commands: command_tx,
            status: status_rx,
        },
        CaptureCompletion {
            outcome: outcome_rx,
        },
    ))
}

async fn drive(
    mut session: CaptureSession,
    mut commands: mpsc::Receiver<Command>,
    status: watch::Sender<CaptureStatus>,
    outcome: oneshot::Sender<CaptureOutcome>,
    period: Duration,
) {
    let mut termination = session.termination();
    let mut timer: Option<Interval> = None;

    loop {
        sync_timer(&session, &mut timer, period);

        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply(&mut session, command, &status),
                None => {
                    log::info!("[CAPTURE] All handles dropped, cancelling");
                    session.cancel();
                }
            },
            _ = next_tick(&mut timer) => {
                if off_worker(|| session.tick()).is_some() {
                    status.send_replace(session.status());
                }
            }
            changed = termination.changed() => {
                if changed.is_err() || *termination.borrow() {
                    session.source_ended();
                }
            }
        }

        status.send_replace(session.status());
        if let Some(result) = session.take_outcome() {
            let _ = outcome.send(result);
            break;
        }
    }

    debug_assert!(session.source_released());
}

/// Arms the timer on entering recording and drops it on leaving.
fn sync_timer(session: &CaptureSession, timer: &mut Option<Interval>, period: Duration) {
    match (session.is_recording(), timer.is_some()) {
        (true, false) => {
            // First sample one full period after recording starts.
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *timer = Some(interval);
            log::debug!("[CAPTURE] Timer armed ({}ms)", period.as_millis());
        }
        (false, true) => {
            *timer = None;
            log::debug!("[CAPTURE] Timer disarmed");
        }
        _ => {}
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Run a capture without stalling the worker's other tasks.
///
/// A screenshot plus full-screen PNG encode is slow. On a multi-thread
/// runtime the worker hands its queue to another thread first. A
/// current-thread runtime has no other thread, so there it runs inline.
fn off_worker<T>(capture: impl FnOnce() -> T) -> T {
    match Handle::current().runtime_flavor() {
        RuntimeFlavor::MultiThread => tokio::task::block_in_place(capture),
        _ => capture(),
    }
}

fn apply(session: &mut CaptureSession, command: Command, status: &watch::Sender<CaptureStatus>) {
    // Publish the new status before acknowledging so callers that await a
    // command and then read `status()` see its effect.
    match command {
        Command::Trigger(reply) => {
            let result = off_worker(|| session.trigger());
            status.send_replace(session.status());
            let _ = reply.send(result);
        }
        Command::SetMode(kind, reply) => {
            let result = session.set_mode(kind);
            status.send_replace(session.status());
            let _ = reply.send(result);
        }
        Command::SetRecording(on, reply) => {
            let result = session.set_recording(on);
            status.send_replace(session.status());
            let _ = reply.send(result);
        }
        Command::ToggleRecording(reply) => {
            let result = session.toggle_recording();
            status.send_replace(session.status());
            let _ = reply.send(result);
        }
        Command::Finish(reply) => {
            let result = session.finish();
            status.send_replace(session.status());
            let _ = reply.send(result);
        }
        Command::Cancel(reply) => {
            session.cancel();
            status.send_replace(session.status());
            let _ = reply.send(());
        }
    }
}
