use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    client::{LedgerClient, RevenueSource, ShopifyRevenue, WhopLedger},
    competitions::Competitions,
    config::Config,
    crypto::TokenCipher,
    error::Error,
    lifecycle::{AdvanceSummary, LifecycleScheduler, SweepSummary},
    model::CompetitionStatus,
    settlement::SettlementEngine,
    store::{CompetitionStore, StatusCounts},
    sync::{RevenueSyncEngine, SyncSummary},
    Result,
};

/// Everything one background-job run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobsReport {
    /// Time the run was invoked with.
    pub run_at: Option<DateTime<Utc>>,
    /// Status-advance tally.
    pub lifecycle: AdvanceSummary,
    /// Start-reminder tally.
    pub upcoming_reminders: SweepSummary,
    /// End-reminder tally.
    pub ending_reminders: SweepSummary,
    /// Revenue-sync tally.
    pub revenue: SyncSummary,
    /// Task-level failures that prevented a whole task from running.
    pub errors: Vec<String>,
    /// Whether every task ran and nothing failed.
    pub success: bool,
}

impl JobsReport {
    fn record_error(&mut self, task: &str, err: Error) {
        tracing::error!("background task {task} failed: {err}");
        self.errors.push(format!("{task}: {err}"));
    }

    fn finish(mut self) -> Self {
        self.success = self.errors.is_empty()
            && self.lifecycle.success()
            && self.upcoming_reminders.success()
            && self.ending_reminders.success()
            && self.revenue.success();
        self
    }
}

/// One active competition in a status report.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveOverview {
    /// Competition id.
    pub id: Uuid,
    /// Competition title.
    pub title: String,
    /// Scheduled start time.
    pub start_at: DateTime<Utc>,
    /// Scheduled end time.
    pub end_at: DateTime<Utc>,
    /// Number of enrolled stores.
    pub participants: usize,
}

/// One soon-starting competition in a status report.
#[derive(Debug, Clone, Serialize)]
pub struct UpcomingOverview {
    /// Competition id.
    pub id: Uuid,
    /// Competition title.
    pub title: String,
    /// Scheduled start time.
    pub start_at: DateTime<Utc>,
    /// Number of enrolled stores.
    pub participants: usize,
}

/// Operational snapshot for the job runner.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    /// Time the snapshot was taken.
    pub generated_at: DateTime<Utc>,
    /// Competition counts per lifecycle status.
    pub counts: StatusCounts,
    /// Currently active competitions.
    pub active: Vec<ActiveOverview>,
    /// Competitions starting within the reminder lead.
    pub starting_soon: Vec<UpcomingOverview>,
}

/// The assembled application: store, clients and engines wired together.
pub struct App<L, R> {
    config: Config,
    store: CompetitionStore,
    ledger: Arc<L>,
    revenue: Arc<R>,
    competitions: Competitions<L>,
    lifecycle: LifecycleScheduler<L>,
    sync: RevenueSyncEngine<R>,
    settlement: SettlementEngine<L>,
}

impl App<WhopLedger, ShopifyRevenue> {
    /// Open the store and connect the production clients.
    pub fn open(config: Config) -> Result<Self> {
        let store = CompetitionStore::open(&config.store_path)?;
        let ledger = WhopLedger::new(&config.ledger)?;
        let revenue = ShopifyRevenue::new(&config.revenue)?;
        Self::with_clients(config, store, ledger, revenue)
    }
}

impl<L: LedgerClient, R: RevenueSource> App<L, R> {
    /// Assemble an application over the given store and clients.
    pub fn with_clients(
        config: Config,
        store: CompetitionStore,
        ledger: L,
        revenue: R,
    ) -> Result<Self> {
        config.validate()?;
        let cipher = TokenCipher::from_hex(&config.encryption_key)?;
        let ledger = Arc::new(ledger);
        let revenue = Arc::new(revenue);
        let settlement = SettlementEngine::new(store.clone(), ledger.clone());
        Ok(Self {
            competitions: Competitions::new(store.clone(), ledger.clone(), cipher.clone()),
            lifecycle: LifecycleScheduler::new(
                store.clone(),
                ledger.clone(),
                settlement.clone(),
                config.jobs.clone(),
            ),
            sync: RevenueSyncEngine::new(
                store.clone(),
                revenue.clone(),
                cipher,
                config.jobs.resync_interval(),
            ),
            settlement,
            ledger,
            revenue,
            store,
            config,
        })
    }

    /// Competition operations.
    pub fn competitions(&self) -> &Competitions<L> {
        &self.competitions
    }

    /// Lifecycle scheduler.
    pub fn lifecycle(&self) -> &LifecycleScheduler<L> {
        &self.lifecycle
    }

    /// Revenue-sync engine.
    pub fn sync(&self) -> &RevenueSyncEngine<R> {
        &self.sync
    }

    /// Settlement engine.
    pub fn settlement(&self) -> &SettlementEngine<L> {
        &self.settlement
    }

    /// The underlying store.
    pub fn store(&self) -> &CompetitionStore {
        &self.store
    }

    /// The ledger client.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The revenue source.
    pub fn revenue(&self) -> &R {
        &self.revenue
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run all background tasks once: advance statuses, send reminders, sync
    /// revenue.
    ///
    /// Task failures are folded into the report instead of propagating, so a
    /// broken task never starves the others.
    pub async fn run_jobs(&self, now: DateTime<Utc>) -> JobsReport {
        let mut report = JobsReport {
            run_at: Some(now),
            ..Default::default()
        };
        match self.lifecycle.advance_statuses(now).await {
            Ok(summary) => report.lifecycle = summary,
            Err(err) => report.record_error("advance_statuses", err),
        }
        match self.lifecycle.notify_upcoming_starts(now).await {
            Ok(summary) => report.upcoming_reminders = summary,
            Err(err) => report.record_error("notify_upcoming_starts", err),
        }
        match self.lifecycle.notify_ending_soon(now).await {
            Ok(summary) => report.ending_reminders = summary,
            Err(err) => report.record_error("notify_ending_soon", err),
        }
        match self.sync.sync_all_active(now).await {
            Ok(summary) => report.revenue = summary,
            Err(err) => report.record_error("sync_all_active", err),
        }
        report.finish()
    }

    /// Operational snapshot: counts, active competitions, upcoming starts.
    pub fn job_status(&self, now: DateTime<Utc>) -> Result<JobStatus> {
        let counts = self.store.status_counts()?;
        let mut active = Vec::new();
        for competition in self
            .store
            .competitions_with_status(CompetitionStatus::Active)?
        {
            active.push(ActiveOverview {
                participants: self.store.participants_of(&competition.id)?.len(),
                id: competition.id,
                title: competition.title,
                start_at: competition.start_at,
                end_at: competition.end_at,
            });
        }
        let (_, to) = self.config.jobs.reminder_window(now);
        let mut starting_soon = Vec::new();
        for competition in self.store.starting_within(now, to)? {
            starting_soon.push(UpcomingOverview {
                participants: self.store.participants_of(&competition.id)?.len(),
                id: competition.id,
                title: competition.title,
                start_at: competition.start_at,
            });
        }
        Ok(JobStatus {
            generated_at: now,
            counts,
            active,
            starting_soon,
        })
    }
}
