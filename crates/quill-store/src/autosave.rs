//! Periodic background saving of a [`BookSession`].
//!
//! One tokio task per session. On each tick it saves only if the session has
//! edits newer than the last successful save; at most one save is in flight,
//! and a tick that lands while one is running is reported and dropped.
//! Every outcome is sent as an [`AutoSaveEvent`]; failures do not stop the loop.
//! The loop never waits on the event channel: `Skipped` events are dropped
//! when the channel is full, and a save's own events give way to shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use quill_core::config::AutoSaveConfig;
use quill_core::{QuillError, QuillResult};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::session::BookSession;
use crate::worker::AsyncStore;

pub type SharedSession = Arc<Mutex<BookSession>>;

#[derive(Debug, Clone, Copy)]
pub struct AutoSaveOptions {
    pub interval: Duration,
    /// A tick is deferred while the last edit is younger than this.
    pub quiet_period: Duration,
}

impl Default for AutoSaveOptions {
    fn default() -> Self {
        Self::from(&AutoSaveConfig::default())
    }
}

impl AutoSaveOptions {
    pub fn validate(&self) -> QuillResult<()> {
        if self.interval.is_zero() {
            return Err(QuillError::Config(
                "auto-save interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl From<&AutoSaveConfig> for AutoSaveOptions {
    fn from(config: &AutoSaveConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            quiet_period: Duration::from_secs(config.quiet_period_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing changed since the last save.
    Clean,
    /// A previous save has not finished.
    InFlight,
    /// Edits are still arriving.
    QuietPeriod,
}

#[derive(Debug)]
pub enum AutoSaveEvent {
    SaveRequested { revision: u64 },
    SaveCompleted { revision: u64 },
    SaveFailed { revision: u64, error: QuillError },
    Skipped { reason: SkipReason },
}

/// Control handle for a running scheduler.
#[derive(Debug)]
pub struct AutoSaveHandle {
    trigger: mpsc::Sender<()>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AutoSaveHandle {
    /// Request a save now, through the same single-flight path as a tick.
    /// The dirty check still applies.
    pub async fn save_now(&self) {
        let _ = self.trigger.send(()).await;
    }

    /// Stop ticking and wait for an in-flight save to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "auto-save task ended abnormally");
        }
    }
}

/// Start the scheduler on the current tokio runtime. A zero interval is
/// rejected with [`QuillError::Config`].
pub fn spawn(
    session: SharedSession,
    store: AsyncStore,
    opts: AutoSaveOptions,
    events: mpsc::Sender<AutoSaveEvent>,
) -> QuillResult<AutoSaveHandle> {
    opts.validate()?;
    let (trigger, trigger_rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(
        session,
        store,
        opts,
        events,
        trigger_rx,
        cancel.clone(),
    ));
    Ok(AutoSaveHandle {
        trigger,
        cancel,
        task,
    })
}

async fn run(
    session: SharedSession,
    store: AsyncStore,
    opts: AutoSaveOptions,
    events: mpsc::Sender<AutoSaveEvent>,
    mut trigger: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + opts.interval, opts.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight: Option<JoinHandle<()>> = None;

    info!(interval_secs = opts.interval.as_secs(), "auto-save started");

    loop {
        let manual = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(()) = trigger.recv() => true,
            _ = ticker.tick() => false,
        };

        if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("auto-save tick while a save is running");
            skipped(&events, SkipReason::InFlight);
            continue;
        }

        let decision = {
            let guard = session.lock().unwrap_or_else(|e| e.into_inner());
            if !guard.is_dirty() {
                Err(SkipReason::Clean)
            } else if !manual
                && !opts.quiet_period.is_zero()
                && guard.last_edit().elapsed() < opts.quiet_period
            {
                Err(SkipReason::QuietPeriod)
            } else {
                Ok(guard.snapshot())
            }
        };

        let snapshot = match decision {
            Ok(snapshot) => snapshot,
            Err(reason) => {
                skipped(&events, reason);
                continue;
            }
        };

        let revision = snapshot.revision;
        let session = session.clone();
        let store = store.clone();
        let events = events.clone();
        let cancel = cancel.clone();
        in_flight = Some(tokio::spawn(async move {
            emit(&events, &cancel, AutoSaveEvent::SaveRequested { revision }).await;
            let result = store
                .save(snapshot.path, snapshot.document, snapshot.password)
                .await;
            let event = match result {
                Ok(saved) => {
                    record_saved(&session, revision, saved.modified);
                    debug!(revision, "auto-save completed");
                    AutoSaveEvent::SaveCompleted { revision }
                }
                Err(error) => {
                    error!(revision, kind = error.kind(), error = %error, "auto-save failed");
                    AutoSaveEvent::SaveFailed { revision, error }
                }
            };
            emit(&events, &cancel, event).await;
        }));
    }

    if let Some(handle) = in_flight {
        let _ = handle.await;
    }
    info!("auto-save stopped");
}

fn record_saved(session: &SharedSession, revision: u64, modified: DateTime<Utc>) {
    let mut guard = session.lock().unwrap_or_else(|e| e.into_inner());
    guard.record_save(revision, modified);
}

fn skipped(events: &mpsc::Sender<AutoSaveEvent>, reason: SkipReason) {
    match events.try_send(AutoSaveEvent::Skipped { reason }) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(_)) => debug!(?reason, "event channel full, skip not reported"),
    }
}

/// Waits for channel capacity until shutdown; a closed receiver is ignored.
async fn emit(
    events: &mpsc::Sender<AutoSaveEvent>,
    cancel: &CancellationToken,
    event: AutoSaveEvent,
) {
    tokio::select! {
        biased;
        _ = events.send(event) => {}
        _ = cancel.cancelled() => warn!("auto-save event dropped at shutdown"),
    }
}
