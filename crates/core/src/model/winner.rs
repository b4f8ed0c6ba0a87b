use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Participant;

/// Settlement outcome for a completed competition.
///
/// At most one exists per competition. A missing `payout_id` means the prize
/// release has not succeeded yet and settlement may be retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Winner {
    /// Unique id.
    pub id: Uuid,
    /// Competition that was settled.
    pub competition_id: Uuid,
    /// External user id of the winning store owner.
    pub user_id: String,
    /// Final revenue the win was decided on.
    pub total_revenue: Decimal,
    /// Payout reference returned by the ledger, once the prize was released.
    pub payout_id: Option<String>,
    /// Time the winner was determined.
    pub won_at: DateTime<Utc>,
}

impl Winner {
    /// Record the top-ranked participant as the winner, payout still pending.
    pub fn from_standings(top: &Participant, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            competition_id: top.competition_id,
            user_id: top.user_id.clone(),
            total_revenue: top.total_revenue,
            payout_id: None,
            won_at: now,
        }
    }

    /// Whether the prize has been released.
    pub fn is_paid(&self) -> bool {
        self.payout_id.is_some()
    }
}
