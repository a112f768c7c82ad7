mod admission;
mod capacity;
mod error;
mod ledger;
mod state;
mod waiting;
mod watermark;

pub use admission::{place, Decision, DeferReason};
pub use capacity::{capacity_at, Capacity};
pub use error::EngineError;
pub use ledger::{BookingLedger, StageBook};
pub use state::{Commit, Outcome, SchedulerState, Submission};
pub use waiting::WaitingList;
pub use watermark::Watermark;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info};

use crate::domain::DomainConfig;
use crate::limits::{DEFAULT_HORIZON_MINUTES, DEFAULT_SEARCH_WINDOW_MINUTES};
use crate::model::*;
use crate::notify::{deliver_all, Notifier};
use crate::observability;
use crate::send_home::{SendHomePolicy, TrafficSnapshot};
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        records: Vec<LedgerRecord>,
        response: oneshot::Sender<io::Result<()>>,
    },
}

type Pending = (Vec<LedgerRecord>, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain all immediately available Appends (the batch window).
/// 3. Single flush_sync for the whole batch.
/// 4. Respond to all senders with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(WalCommand::Append { records, response }) = rx.recv().await {
        let mut batch = vec![(records, response)];
        while let Ok(WalCommand::Append { records, response }) = rx.try_recv() {
            batch.push((records, response));
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);
    }
    debug!(path = %wal.path().display(), appends = wal.appends(), "ledger writer stopped");
}

fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    'outer: for (records, _) in batch {
        for record in records {
            if let Err(e) = wal.append_buffered(record) {
                append_err = Some(e);
                break 'outer;
            }
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: Vec<Pending>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

// ── Scheduler ────────────────────────────────────────────

/// Tunables that are not part of the stage topology.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Requests arriving after this instant are rejected.
    pub horizon: Minutes,
    /// How far past its arrival placement may look for a slot.
    pub search_window: Minutes,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON_MINUTES,
            search_window: DEFAULT_SEARCH_WINDOW_MINUTES,
        }
    }
}

/// An inbound stage request as it comes off the wire.
#[derive(Debug, Clone)]
pub struct NewRequest {
    /// Caller-supplied entity id; absent or non-positive means "assign one".
    pub entity: Option<i64>,
    pub stage: String,
    pub arrival: Minutes,
    pub duration: Minutes,
    pub metadata: Metadata,
    pub callback: Option<String>,
}

/// Synchronous answer to a submitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted(Reply),
    /// Parked; the reply is delivered to the callback once admitted.
    Deferred(DeferReason),
}

/// The admission controller: one lock around all scheduling state, a
/// group-commit ledger writer, and a notifier for deferred replies.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    wal_tx: mpsc::Sender<WalCommand>,
    notifier: Arc<dyn Notifier>,
}

impl Scheduler {
    pub fn new(
        wal_path: PathBuf,
        domain: DomainConfig,
        settings: SchedulerSettings,
        notifier: Arc<dyn Notifier>,
        send_home: Arc<dyn SendHomePolicy>,
    ) -> Result<Self, EngineError> {
        domain.validate()?;
        let records = Wal::replay(&wal_path).map_err(|e| EngineError::WalError(e.to_string()))?;
        let wal = Wal::open(&wal_path).map_err(|e| EngineError::WalError(e.to_string()))?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut state =
            SchedulerState::new(domain, settings.horizon, settings.search_window, send_home);
        for record in &records {
            state.restore(record);
        }
        if !records.is_empty() {
            info!(
                records = records.len(),
                watermark = ?state.watermark(),
                "replayed booking ledger"
            );
        }

        Ok(Self {
            state: Mutex::new(state),
            wal_tx,
            notifier,
        })
    }

    /// Send committed records to the background group-commit writer.
    async fn wal_append(&self, records: Vec<LedgerRecord>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                records,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Persist commits. In-memory state is authoritative: a failed append is
    /// logged and counted, never rolled back.
    async fn persist(&self, commits: &[&Commit]) {
        if commits.is_empty() {
            return;
        }
        metrics::counter!(observability::COMMITS_TOTAL).increment(commits.len() as u64);
        let records = commits.iter().map(|c| c.record()).collect();
        if let Err(e) = self.wal_append(records).await {
            metrics::counter!(observability::LEDGER_FAILURES_TOTAL).increment(1);
            error!(commits = commits.len(), "ledger append failed: {e}");
        }
    }

    /// Hand side commits to the notifier without holding up the caller.
    fn dispatch(&self, commits: Vec<Commit>) {
        if commits.iter().all(|c| c.callback.is_none()) {
            return;
        }
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            deliver_all(notifier.as_ref(), &commits).await;
        });
    }

    fn record_gauges(state: &SchedulerState) {
        metrics::gauge!(observability::WAITING_REQUESTS).set(state.waiting().len() as f64);
        metrics::gauge!(observability::REPLANNED_REQUESTS)
            .set(state.waiting().replanned_len() as f64);
        if let Some(w) = state.watermark() {
            metrics::gauge!(observability::WATERMARK_MINUTES).set(w as f64);
        }
    }

    /// Decide a request: commit it now, or park it for a later callback.
    pub async fn submit(&self, new: NewRequest) -> Result<Admission, EngineError> {
        let mut state = self.state.lock().await;
        let entity = state.assign_entity(new.entity);
        let mut request = Request::new(entity, new.stage, new.arrival, new.duration, new.metadata);
        request.callback = new.callback;

        let stage = request.stage.clone();
        let submission = match state.submit(request) {
            Ok(s) => s,
            Err(e) => {
                metrics::counter!(observability::DECISIONS_TOTAL, "outcome" => "rejected")
                    .increment(1);
                return Err(e);
            }
        };

        let admission = match &submission.outcome {
            Outcome::Admitted(commit) => {
                metrics::counter!(observability::DECISIONS_TOTAL, "outcome" => "admitted")
                    .increment(1);
                debug!(entity, stage = %stage, start = commit.booking.start, "admitted");
                Admission::Admitted(commit.reply.clone())
            }
            Outcome::Deferred(reason) => {
                metrics::counter!(
                    observability::DECISIONS_TOTAL,
                    "outcome" => "deferred",
                    "reason" => reason.label()
                )
                .increment(1);
                debug!(entity, stage = %stage, reason = reason.label(), "deferred");
                Admission::Deferred(*reason)
            }
        };

        // Side commits happened before the request's own commit.
        let mut ordered: Vec<&Commit> = submission.side_commits.iter().collect();
        if let Outcome::Admitted(commit) = &submission.outcome {
            ordered.push(commit);
        }
        self.persist(&ordered).await;
        Self::record_gauges(&state);
        drop(state);

        self.dispatch(submission.side_commits);
        Ok(admission)
    }

    /// Re-examine every waiting request once; deliver the replies of those
    /// that got admitted. Returns how many were committed.
    pub async fn reconcile_pass(&self) -> usize {
        let mut state = self.state.lock().await;
        let commits = state.reconcile();
        let refs: Vec<&Commit> = commits.iter().collect();
        self.persist(&refs).await;
        Self::record_gauges(&state);
        drop(state);

        let committed = commits.len();
        if committed > 0 {
            debug!(committed, "reconcile pass admitted waiting requests");
            deliver_all(self.notifier.as_ref(), &commits).await;
        }
        committed
    }

    pub async fn status(&self) -> StatusInfo {
        self.state.lock().await.status()
    }

    /// Every booking ever committed at `stage`, in commit order.
    pub async fn stage_bookings(&self, stage: &str) -> Result<Vec<Booking>, EngineError> {
        let state = self.state.lock().await;
        state
            .ledger()
            .stage(stage)
            .map(|book| book.bookings().to_vec())
            .ok_or_else(|| EngineError::UnknownStage(stage.to_string()))
    }

    pub async fn traffic_at(&self, t: Minutes) -> TrafficSnapshot {
        self.state.lock().await.traffic_at(t)
    }

    pub async fn domain(&self) -> DomainConfig {
        self.state.lock().await.domain().clone()
    }
}
