use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// A store enrolled in a competition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Unique id.
    pub id: Uuid,
    /// Competition this participant belongs to.
    pub competition_id: Uuid,
    /// External user id of the store owner.
    pub user_id: String,
    /// Storefront domain revenue is read from.
    pub store_domain: String,
    /// Sealed storefront API credential. Never stored in the clear.
    pub access_token: String,
    /// Revenue accumulated inside the competition window, as of the last sync.
    pub total_revenue: Decimal,
    /// Time of the last successful revenue sync.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Enrollment time.
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Create a fresh participant with zero revenue.
    ///
    /// `sealed_token` must already be encrypted.
    pub fn new(
        competition_id: Uuid,
        user_id: impl Into<String>,
        store_domain: impl Into<String>,
        sealed_token: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            competition_id,
            user_id: user_id.into(),
            store_domain: store_domain.into(),
            access_token: sealed_token,
            total_revenue: Decimal::ZERO,
            last_synced_at: None,
            joined_at: now,
        }
    }

    /// Whether the last successful sync happened within `interval` of `now`.
    pub fn synced_within(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        match self.last_synced_at {
            Some(last) => now - last < interval,
            None => false,
        }
    }
}

/// Standings order: revenue descending, then enrollment time ascending, then id.
///
/// Total over any participant set, so ranks and the settlement winner are
/// deterministic even when revenues tie.
pub fn standings_order(a: &Participant, b: &Participant) -> Ordering {
    b.total_revenue
        .cmp(&a.total_revenue)
        .then_with(|| a.joined_at.cmp(&b.joined_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Parameters for joining a competition.
#[derive(Debug, Clone, TypedBuilder)]
pub struct JoinCompetition {
    /// Competition to join.
    pub competition_id: Uuid,
    /// External user id of the store owner.
    #[builder(setter(into))]
    pub user_id: String,
    /// Storefront domain to track.
    #[builder(setter(into))]
    pub store_domain: String,
    /// Plaintext storefront API credential. Sealed before it is stored.
    #[builder(setter(into))]
    pub access_token: String,
}
