use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    client::RevenueSource,
    crypto::TokenCipher,
    model::{Competition, CompetitionStatus, Participant},
    store::CompetitionStore,
    Result,
};

/// Result of syncing one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Revenue was recomputed and stored.
    Updated,
    /// Synced recently enough, left untouched.
    Skipped,
    /// Credential, revenue query or store write failed. Prior value kept.
    Failed,
}

/// Tally of one sync pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncSummary {
    /// Participants whose revenue was recomputed.
    pub updated: usize,
    /// Participants skipped by the re-sync interval.
    pub skipped: usize,
    /// Participants or competitions that failed.
    pub failed: usize,
}

impl SyncSummary {
    fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Updated => self.updated += 1,
            SyncOutcome::Skipped => self.skipped += 1,
            SyncOutcome::Failed => self.failed += 1,
        }
    }

    fn merge(&mut self, other: SyncSummary) {
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    /// Whether the pass completed without failures.
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Recomputes participant revenue from the revenue source.
///
/// Every sync recomputes the total over the full competition window and
/// overwrites the stored value. No delta accounting, so a missed run never
/// loses revenue permanently.
pub struct RevenueSyncEngine<R> {
    store: CompetitionStore,
    revenue: Arc<R>,
    cipher: TokenCipher,
    resync_interval: Duration,
}

impl<R: RevenueSource> RevenueSyncEngine<R> {
    pub(crate) fn new(
        store: CompetitionStore,
        revenue: Arc<R>,
        cipher: TokenCipher,
        resync_interval: Duration,
    ) -> Self {
        Self {
            store,
            revenue,
            cipher,
            resync_interval,
        }
    }

    /// Sync one participant. Never propagates per-participant failures.
    pub async fn sync_participant(
        &self,
        competition: &Competition,
        participant: &Participant,
        now: DateTime<Utc>,
    ) -> SyncOutcome {
        if participant.synced_within(self.resync_interval, now) {
            tracing::debug!("{} synced recently, skipping", participant.store_domain);
            return SyncOutcome::Skipped;
        }
        let token = match self.cipher.open(&participant.access_token) {
            Ok(token) => token,
            Err(err) => {
                tracing::error!(
                    "credential for {} is unusable: {err}",
                    participant.store_domain
                );
                return SyncOutcome::Failed;
            }
        };
        let total = match self
            .revenue
            .paid_order_total(
                &token,
                &participant.store_domain,
                competition.start_at,
                competition.end_at,
            )
            .await
        {
            Ok(total) => total,
            Err(err) => {
                tracing::warn!("revenue sync for {} failed: {err}", participant.store_domain);
                return SyncOutcome::Failed;
            }
        };
        let mut updated = participant.clone();
        updated.total_revenue = total;
        updated.last_synced_at = Some(now);
        match self.store.update_participant(&updated) {
            Ok(()) => {
                tracing::debug!("{} synced, total {total}", participant.store_domain);
                SyncOutcome::Updated
            }
            Err(err) => {
                tracing::error!(
                    "persisting sync for {} failed: {err}",
                    participant.store_domain
                );
                SyncOutcome::Failed
            }
        }
    }

    /// Sync all participants of one competition concurrently.
    ///
    /// A no-op for competitions that are not `Active`.
    pub async fn sync_competition(
        &self,
        competition_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<SyncSummary> {
        let competition = self.store.expect_competition(competition_id)?;
        if competition.status != CompetitionStatus::Active {
            tracing::debug!(
                "competition {competition_id} is {}, nothing to sync",
                competition.status
            );
            return Ok(SyncSummary::default());
        }
        let participants = self.store.participants_of(competition_id)?;
        let outcomes = join_all(
            participants
                .iter()
                .map(|p| self.sync_participant(&competition, p, now)),
        )
        .await;
        let mut summary = SyncSummary::default();
        for outcome in outcomes {
            summary.record(outcome);
        }
        Ok(summary)
    }

    /// Sync every active competition.
    pub async fn sync_all_active(&self, now: DateTime<Utc>) -> Result<SyncSummary> {
        let active = self
            .store
            .competitions_with_status(CompetitionStatus::Active)?;
        let results = join_all(active.iter().map(|c| self.sync_competition(&c.id, now))).await;
        let mut summary = SyncSummary::default();
        for (competition, result) in active.iter().zip(results) {
            match result {
                Ok(part) => summary.merge(part),
                Err(err) => {
                    tracing::error!(
                        "revenue sync for competition {} failed: {err}",
                        competition.id
                    );
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}
