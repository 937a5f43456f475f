//! Async facade over the stores, miner, predictor, and feedback loop.
//!
//! Storage calls run on the blocking pool and are bounded by `storage.timeout_ms`;
//! an expired call surfaces as [`Error::StorageUnavailable`]. Ingestion returns as
//! soon as the event is durable. Mining, feedback and rebuilds run afterwards on a
//! single background learner task, in ingestion order.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{ExocortexConfig, PatternConfig};
use crate::db::Db;
use crate::error::{Error, Result};
use crate::events::sqlite::SqliteEventStore;
use crate::events::{query, EventFilter, EventInput, EventStats, EventStore, Recorded, StoredEvent, TimeRange};
use crate::feedback::{ActivePredictions, FeedbackLoop, FeedbackReport};
use crate::mining::{PatternMiner, RebuildReport};
use crate::patterns::sqlite::SqlitePatternStore;
use crate::patterns::{DecayReport, Pattern, PatternKind, PatternStats, PatternStore};
use crate::predict::{PredictionContext, PredictionSet, Predictor};

/// Window for the "recent activity" block of [`ServiceStats`].
const RECENT_STATS_DAYS: i64 = 7;

enum LearnerMsg {
    Event(Box<StoredEvent>),
    Rebuild(oneshot::Sender<Result<RebuildReport>>),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub events: EventStats,
    pub recent_events: EventStats,
    pub patterns: PatternStats,
    pub active_predictions: usize,
    pub cached_contexts: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    pub decay: DecayReport,
    pub feedback: FeedbackReport,
}

/// Everything the learner needs; cloned into the background task.
#[derive(Clone)]
struct Learner {
    events: Arc<dyn EventStore>,
    patterns: Arc<dyn PatternStore>,
    miner: Arc<PatternMiner>,
    feedback: Arc<FeedbackLoop>,
}

impl Learner {
    fn learn(&self, stored: &StoredEvent, mine: bool) {
        if mine {
            if let Err(e) = self.miner.learn(&*self.events, &*self.patterns, stored) {
                tracing::warn!(id = %stored.id, path = %stored.event.file_path, error = %e, "mining failed; event skipped");
            }
        }
        if let Err(e) = self.feedback.observe(&*self.patterns, &stored.event) {
            tracing::warn!(id = %stored.id, error = %e, "feedback failed for event");
        }
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<LearnerMsg>) {
        // Events at or below this sequence were already mined by a rebuild replay.
        let mut replayed_through: Option<i64> = None;

        while let Some(msg) = rx.recv().await {
            match msg {
                LearnerMsg::Event(stored) => {
                    let mine = replayed_through.map_or(true, |seq| stored.seq > seq);
                    if !mine {
                        tracing::debug!(id = %stored.id, "event already replayed by rebuild");
                    }
                    let learner = self.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || learner.learn(&stored, mine)).await {
                        tracing::error!(error = %e, "learner task panicked");
                    }
                }
                LearnerMsg::Rebuild(done) => {
                    let learner = self.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        learner.miner.rebuild(&*learner.events, &*learner.patterns)
                    })
                    .await
                    .unwrap_or_else(|e| Err(Error::StorageUnavailable(format!("rebuild failed: {e}"))));
                    if let Ok(report) = &result {
                        replayed_through = replayed_through.max(report.replayed_through);
                    }
                    let _ = done.send(result);
                }
                LearnerMsg::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::debug!("learner stopped");
    }
}

struct Inner {
    learner: Learner,
    predictor: Arc<Predictor>,
    model: PatternConfig,
    config: ExocortexConfig,
    queue: mpsc::UnboundedSender<LearnerMsg>,
}

impl Inner {
    fn enqueue(&self, stored: StoredEvent) {
        let id = stored.id.clone();
        if self.queue.send(LearnerMsg::Event(Box::new(stored))).is_err() {
            tracing::warn!(id = %id, "learner unavailable; event stored but not mined");
        }
    }
}

#[derive(Clone)]
pub struct PredictionService {
    inner: Arc<Inner>,
}

impl PredictionService {
    /// Build the service and start its learner. Must be called inside a Tokio runtime.
    pub fn new(
        events: Arc<dyn EventStore>,
        patterns: Arc<dyn PatternStore>,
        config: ExocortexConfig,
    ) -> Self {
        let model = config.patterns.clone();
        let active = Arc::new(ActivePredictions::new());
        let learner = Learner {
            events,
            patterns,
            miner: Arc::new(PatternMiner::new(config.mining.clone(), model.clone())),
            feedback: Arc::new(FeedbackLoop::new(Arc::clone(&active), model.clone())),
        };
        let predictor = Arc::new(Predictor::new(config.prediction.clone(), model.clone(), active));

        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(learner.clone().run(rx));

        Self {
            inner: Arc::new(Inner {
                learner,
                predictor,
                model,
                config,
                queue,
            }),
        }
    }

    /// SQLite-backed stores sharing one connection.
    pub fn from_database(db: Db, config: ExocortexConfig) -> Self {
        Self::new(
            Arc::new(SqliteEventStore::new(db.clone())),
            Arc::new(SqlitePatternStore::new(db)),
            config,
        )
    }

    pub fn config(&self) -> &ExocortexConfig {
        &self.inner.config
    }

    /// Run `f` on the blocking pool, bounded by the storage timeout.
    async fn blocking<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let timeout = self.inner.config.storage.timeout();
        let task = tokio::task::spawn_blocking(move || f(&inner));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::StorageUnavailable(format!("{operation} failed: {e}"))),
            Err(_) => {
                tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "storage call timed out");
                Err(Error::StorageUnavailable(format!(
                    "{operation} timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    /// Validate and durably store an event, then queue it for learning.
    ///
    /// The event is queued by the storage call itself, so a write that lands after
    /// the timeout is still learned and a retry that reports a duplicate loses nothing.
    pub async fn record(&self, input: EventInput) -> Result<Recorded> {
        let event = input.validate(Utc::now())?;
        self.blocking("record", move |inner| {
            let recorded = inner.learner.events.record(&event)?;
            if !recorded.duplicate {
                inner.enqueue(StoredEvent {
                    id: recorded.id.clone(),
                    seq: recorded.seq,
                    event,
                });
            }
            Ok(recorded)
        })
        .await
    }

    /// Wait until every event queued so far has been mined and observed.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.inner.queue.send(LearnerMsg::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    pub async fn predict(
        &self,
        context: PredictionContext,
        max_results: Option<usize>,
    ) -> Result<PredictionSet> {
        let max_results = max_results.unwrap_or(self.inner.config.prediction.default_max_results);
        let ranking = self
            .blocking("predict", move |inner| {
                inner
                    .predictor
                    .rank(&*inner.learner.patterns, &context, max_results, Utc::now())
            })
            .await?;
        // Served only when the ranking arrived within the timeout.
        self.inner.predictor.commit(ranking)
    }

    /// Up to `limit` events matching `filter` in `range`, oldest first.
    pub async fn query(
        &self,
        filter: EventFilter,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<StoredEvent>> {
        self.blocking("query", move |inner| {
            query(&*inner.learner.events, filter, range)
                .page_size(limit.clamp(1, crate::events::DEFAULT_PAGE_SIZE))
                .take(limit)
                .collect()
        })
        .await
    }

    /// Decay every pattern as of `now` and drop cached rankings built on old confidences.
    pub async fn decay(&self, now: DateTime<Utc>) -> Result<DecayReport> {
        self.blocking("decay", move |inner| {
            let report = inner.learner.patterns.decay(now, &inner.model)?;
            inner.predictor.cache().clear()?;
            Ok(report)
        })
        .await
    }

    /// Settle predictions that expired without being confirmed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<FeedbackReport> {
        self.blocking("sweep", move |inner| {
            inner.predictor.cache().purge_expired(now)?;
            inner.learner.feedback.sweep(&*inner.learner.patterns, now)
        })
        .await
    }

    pub async fn stats(&self) -> Result<ServiceStats> {
        self.blocking("stats", |inner| {
            let since = Utc::now() - Duration::days(RECENT_STATS_DAYS);
            Ok(ServiceStats {
                events: inner.learner.events.stats(None)?,
                recent_events: inner.learner.events.stats(Some(since))?,
                patterns: inner.learner.patterns.stats()?,
                active_predictions: inner.learner.feedback.active().len(),
                cached_contexts: inner.predictor.cache().len(),
            })
        })
        .await
    }

    /// The strongest active patterns, optionally of one kind.
    pub async fn patterns(
        &self,
        kind: Option<PatternKind>,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<Pattern>> {
        self.blocking("list patterns", move |inner| {
            let mut patterns = inner.learner.patterns.list(kind, min_confidence)?;
            patterns.truncate(limit);
            Ok(patterns)
        })
        .await
    }

    /// Clear all patterns and replay the event log on the learner task.
    ///
    /// Events queued before the call are learned first. Events recorded while the
    /// replay runs are mined once, by the learner, after it. Runs without the
    /// storage timeout: replay time grows with the log.
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let (done, wait) = oneshot::channel();
        self.inner
            .queue
            .send(LearnerMsg::Rebuild(done))
            .map_err(|_| Error::StorageUnavailable("learner stopped; rebuild not started".into()))?;
        let report = wait
            .await
            .map_err(|_| Error::StorageUnavailable("learner stopped during rebuild".into()))??;
        self.inner.predictor.cache().clear()?;
        Ok(report)
    }

    /// One maintenance pass: decay, then settle expired predictions.
    pub async fn maintain(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        Ok(MaintenanceReport {
            decay: self.decay(now).await?,
            feedback: self.sweep(now).await?,
        })
    }

    /// Spawn the periodic maintenance loop when `maintenance.enabled` is set.
    /// Failures are logged and retried on the next tick.
    pub fn spawn_maintenance(&self) -> Option<JoinHandle<()>> {
        let maintenance = &self.inner.config.maintenance;
        if !maintenance.enabled {
            return None;
        }
        let period = std::time::Duration::from_secs(maintenance.interval_hours.max(1) * 3600);
        let service = self.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately; skip it so startup stays fast.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match service.maintain(Utc::now()).await {
                    Ok(report) => tracing::info!(
                        decayed = report.decay.decayed,
                        retired = report.decay.retired,
                        misses = report.feedback.misses,
                        "scheduled maintenance complete"
                    ),
                    Err(e) => tracing::warn!(error = %e, "scheduled maintenance failed; retrying next interval"),
                }
            }
        }))
    }
}
