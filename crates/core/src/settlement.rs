use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    client::LedgerClient,
    error::Error,
    model::{standings_order, Competition, CompetitionStatus, Winner},
    notify::Notification,
    store::CompetitionStore,
    Result,
};

/// Determines the winner of a completed competition and releases its prize.
///
/// Safe to re-run: the winner record is created at most once, and a run that
/// finds an unpaid winner only re-attempts the payout.
pub struct SettlementEngine<L> {
    store: CompetitionStore,
    ledger: Arc<L>,
}

impl<L> Clone for SettlementEngine<L> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

impl<L: LedgerClient> SettlementEngine<L> {
    pub(crate) fn new(store: CompetitionStore, ledger: Arc<L>) -> Self {
        Self { store, ledger }
    }

    /// Settle a completed competition.
    ///
    /// Returns the winner record. A missing payout reference on the returned
    /// record means the prize release failed and a later run will retry it.
    pub async fn settle(&self, competition_id: &Uuid, now: DateTime<Utc>) -> Result<Winner> {
        let competition = self.store.expect_competition(competition_id)?;
        if competition.status != CompetitionStatus::Completed {
            return Err(Error::conflict(format!(
                "Competition is still {}",
                competition.status
            )));
        }
        if let Some(winner) = self.store.winner_of(competition_id)? {
            if winner.is_paid() {
                tracing::debug!("competition {competition_id} is already settled");
                return Ok(winner);
            }
            tracing::info!("retrying pending payout for competition {competition_id}");
            return self.release_prize(&competition, winner).await;
        }

        let mut standings = self.store.participants_of(competition_id)?;
        standings.sort_by(standings_order);
        let Some(top) = standings.first() else {
            return Err(Error::conflict("No participants in competition"));
        };
        let winner = self
            .store
            .try_create_winner(&Winner::from_standings(top, now))?;
        tracing::info!(
            "competition {} won by {} with revenue {}",
            competition.id,
            winner.user_id,
            winner.total_revenue
        );
        if winner.is_paid() {
            // Lost the creation race against a run that already paid out.
            return Ok(winner);
        }
        self.release_prize(&competition, winner).await
    }

    async fn release_prize(&self, competition: &Competition, winner: Winner) -> Result<Winner> {
        let Some(escrow_id) = competition.escrow_id.as_deref() else {
            tracing::error!(
                "competition {} has a winner but no escrow to release",
                competition.id
            );
            return Ok(winner);
        };
        match self
            .ledger
            .release_escrow(escrow_id, &winner.user_id, &competition.id.to_string())
            .await
        {
            Ok(payout_id) => {
                let winner = self.store.set_winner_payout(&competition.id, &payout_id)?;
                tracing::info!(
                    "prize for competition {} released as payout {payout_id}",
                    competition.id
                );
                // Winners only hear about the prize once it actually moved.
                let note = Notification::prize_won(competition, &payout_id);
                if let Err(err) = self.ledger.notify(&winner.user_id, &note).await {
                    tracing::warn!(
                        "winner notification for competition {} failed: {err}",
                        competition.id
                    );
                }
                Ok(winner)
            }
            Err(err) => {
                tracing::error!(
                    "payout for competition {} failed, leaving it pending: {err}",
                    competition.id
                );
                Ok(winner)
            }
        }
    }
}
