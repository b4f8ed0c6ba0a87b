use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;

use crate::{
    client::LedgerClient,
    config::JobsConfig,
    model::{Competition, CompetitionStatus, Participant},
    notify::{broadcast, Notification},
    settlement::SettlementEngine,
    store::CompetitionStore,
    Result,
};

/// Tally of one status-advance pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AdvanceSummary {
    /// Competitions moved to `Active`.
    pub started: usize,
    /// Competitions moved to `Completed`.
    pub ended: usize,
    /// Settlements that produced a winner.
    pub settled: usize,
    /// Competitions whose transition or settlement failed.
    pub failed: usize,
}

impl AdvanceSummary {
    /// Whether the pass completed without failures.
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Tally of one reminder sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepSummary {
    /// Competitions whose participants were notified.
    pub notified: usize,
    /// Competitions the sweep could not process.
    pub failed: usize,
}

impl SweepSummary {
    /// Whether the sweep completed without failures.
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

enum StartOutcome {
    Activated,
    /// Start time reached but escrow never landed. Left `Upcoming`.
    Unfunded,
    Failed,
}

enum EndOutcome {
    Completed { settled: bool },
    Failed,
}

enum SweepOutcome {
    Notified,
    Empty,
    Failed,
}

/// Drives competitions through their lifecycle on a fixed cadence.
///
/// Time always arrives as a parameter, so passes are replayable in tests and
/// idempotent: a competition that already advanced is not picked up again.
pub struct LifecycleScheduler<L> {
    store: CompetitionStore,
    ledger: Arc<L>,
    settlement: SettlementEngine<L>,
    jobs: JobsConfig,
}

impl<L: LedgerClient> LifecycleScheduler<L> {
    pub(crate) fn new(
        store: CompetitionStore,
        ledger: Arc<L>,
        settlement: SettlementEngine<L>,
        jobs: JobsConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            settlement,
            jobs,
        }
    }

    /// Advance every competition whose start or end time has passed.
    ///
    /// Failures are tallied per competition and never abort the batch.
    pub async fn advance_statuses(&self, now: DateTime<Utc>) -> Result<AdvanceSummary> {
        let mut summary = AdvanceSummary::default();

        let due = self.store.due_to_start(now)?;
        let outcomes = join_all(due.iter().map(|c| self.activate(c))).await;
        for outcome in outcomes {
            match outcome {
                StartOutcome::Activated => summary.started += 1,
                StartOutcome::Unfunded => {}
                StartOutcome::Failed => summary.failed += 1,
            }
        }

        let due = self.store.due_to_end(now)?;
        let outcomes = join_all(due.iter().map(|c| self.complete(c, now))).await;
        for outcome in outcomes {
            match outcome {
                EndOutcome::Completed { settled } => {
                    summary.ended += 1;
                    if settled {
                        summary.settled += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                EndOutcome::Failed => summary.failed += 1,
            }
        }

        if summary.started + summary.ended > 0 {
            tracing::info!(
                "lifecycle pass: {} started, {} ended, {} settled, {} failed",
                summary.started,
                summary.ended,
                summary.settled,
                summary.failed
            );
        }
        Ok(summary)
    }

    async fn activate(&self, competition: &Competition) -> StartOutcome {
        if competition.escrow_id.is_none() {
            tracing::warn!(
                "competition {} reached its start time without escrow, leaving it upcoming",
                competition.id
            );
            return StartOutcome::Unfunded;
        }
        let mut competition = competition.clone();
        competition.status = CompetitionStatus::Active;
        if let Err(err) = self.store.update_competition(&competition) {
            tracing::error!("failed to activate competition {}: {err}", competition.id);
            return StartOutcome::Failed;
        }
        tracing::info!("competition {} started: {}", competition.id, competition.title);
        self.tell_participants(&competition, Notification::started(&competition))
            .await;
        StartOutcome::Activated
    }

    async fn complete(&self, competition: &Competition, now: DateTime<Utc>) -> EndOutcome {
        let mut competition = competition.clone();
        competition.status = CompetitionStatus::Completed;
        if let Err(err) = self.store.update_competition(&competition) {
            tracing::error!("failed to complete competition {}: {err}", competition.id);
            return EndOutcome::Failed;
        }
        tracing::info!("competition {} ended: {}", competition.id, competition.title);
        let settled = match self.settlement.settle(&competition.id, now).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!("settlement of competition {} failed: {err}", competition.id);
                false
            }
        };
        // Participants hear about the ending even when settlement failed.
        self.tell_participants(&competition, Notification::ended(&competition))
            .await;
        EndOutcome::Completed { settled }
    }

    async fn tell_participants(&self, competition: &Competition, note: Notification) {
        let participants = match self.store.participants_of(&competition.id) {
            Ok(participants) => participants,
            Err(err) => {
                tracing::error!(
                    "could not load participants of {} for notification: {err}",
                    competition.id
                );
                return;
            }
        };
        if participants.is_empty() {
            return;
        }
        let ids = user_ids(&participants);
        broadcast(self.ledger.as_ref(), &ids, &note).await;
    }

    /// Remind participants of competitions starting inside the lead window.
    pub async fn notify_upcoming_starts(&self, now: DateTime<Utc>) -> Result<SweepSummary> {
        let (from, to) = self.jobs.reminder_window(now);
        let batch = self.store.starting_within(from, to)?;
        let outcomes = join_all(batch.iter().map(|competition| async move {
            self.remind(competition, now, competition.start_at, Notification::starting_soon)
                .await
        }))
        .await;
        Ok(tally(outcomes))
    }

    /// Remind participants of competitions ending inside the lead window.
    pub async fn notify_ending_soon(&self, now: DateTime<Utc>) -> Result<SweepSummary> {
        let (from, to) = self.jobs.reminder_window(now);
        let batch = self.store.ending_within(from, to)?;
        let outcomes = join_all(batch.iter().map(|competition| async move {
            self.remind(competition, now, competition.end_at, Notification::ending_soon)
                .await
        }))
        .await;
        Ok(tally(outcomes))
    }

    async fn remind(
        &self,
        competition: &Competition,
        now: DateTime<Utc>,
        at: DateTime<Utc>,
        template: fn(&Competition, i64) -> Notification,
    ) -> SweepOutcome {
        let participants = match self.store.participants_of(&competition.id) {
            Ok(participants) => participants,
            Err(err) => {
                tracing::error!(
                    "could not load participants of {} for reminder: {err}",
                    competition.id
                );
                return SweepOutcome::Failed;
            }
        };
        if participants.is_empty() {
            return SweepOutcome::Empty;
        }
        let ids = user_ids(&participants);
        broadcast(self.ledger.as_ref(), &ids, &template(competition, minutes_until(now, at))).await;
        SweepOutcome::Notified
    }
}

fn tally(outcomes: Vec<SweepOutcome>) -> SweepSummary {
    let mut summary = SweepSummary::default();
    for outcome in outcomes {
        match outcome {
            SweepOutcome::Notified => summary.notified += 1,
            SweepOutcome::Empty => {}
            SweepOutcome::Failed => summary.failed += 1,
        }
    }
    summary
}

fn user_ids(participants: &[Participant]) -> Vec<String> {
    participants.iter().map(|p| p.user_id.clone()).collect()
}

fn minutes_until(now: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    ((at - now).num_seconds() as f64 / 60.0).round() as i64
}
