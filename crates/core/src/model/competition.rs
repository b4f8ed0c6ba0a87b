use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::{error::Error, Result};

/// Shortest allowed competition duration, in hours.
pub const MIN_DURATION_HOURS: i64 = 1;

/// Longest allowed competition duration, in days.
pub const MAX_DURATION_DAYS: i64 = 60;

/// Lifecycle status of a competition.
///
/// Statuses only move forward: `Upcoming` to `Active` to `Completed`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum CompetitionStatus {
    /// Created and funded but not yet running.
    Upcoming,
    /// Currently running. Revenue is being tracked.
    Active,
    /// Past its end time. Settlement may still be pending.
    Completed,
}

impl CompetitionStatus {
    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Upcoming, Self::Active) | (Self::Active, Self::Completed)
        )
    }

    /// Whether this status accepts new participants.
    pub fn accepts_participants(self) -> bool {
        !matches!(self, Self::Completed)
    }
}

/// A time-boxed revenue competition with an escrowed prize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competition {
    /// Unique id.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Optional long-form description.
    pub description: Option<String>,
    /// Prize amount escrowed for the winner.
    pub prize: Decimal,
    /// Scheduled start time.
    pub start_at: DateTime<Utc>,
    /// Scheduled end time.
    pub end_at: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: CompetitionStatus,
    /// External user id of the creator funding the prize.
    pub creator_id: String,
    /// Escrow reference returned by the ledger, once funded.
    pub escrow_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Competition {
    /// Scheduled duration.
    pub fn duration(&self) -> Duration {
        self.end_at - self.start_at
    }

    /// Whether the scheduled start time has passed.
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_at
    }

    /// Whether the scheduled end time has passed.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_at
    }

    /// Whether the competition is eligible for activation.
    ///
    /// Requires `Upcoming` status, a reached start time and a funded escrow.
    pub fn can_activate(&self, now: DateTime<Utc>) -> bool {
        self.status == CompetitionStatus::Upcoming
            && self.has_started(now)
            && self.escrow_id.is_some()
    }
}

/// Parameters for creating a competition.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CreateCompetition {
    /// Display title.
    #[builder(setter(into))]
    pub title: String,
    /// Optional long-form description.
    #[builder(default, setter(strip_option, into))]
    pub description: Option<String>,
    /// Prize amount to escrow.
    pub prize: Decimal,
    /// Scheduled start time.
    pub start_at: DateTime<Utc>,
    /// Scheduled end time.
    pub end_at: DateTime<Utc>,
    /// External user id of the creator.
    #[builder(setter(into))]
    pub creator_id: String,
}

impl CreateCompetition {
    /// Validate the schedule and prize against `now`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("Title must not be empty"));
        }
        if self.end_at <= self.start_at {
            return Err(Error::validation("End date must be after start date"));
        }
        if self.start_at <= now {
            return Err(Error::validation("Start date must be in the future"));
        }
        let duration = self.end_at - self.start_at;
        if duration < Duration::hours(MIN_DURATION_HOURS) {
            return Err(Error::validation(
                "Competition duration must be at least 1 hour",
            ));
        }
        if duration > Duration::days(MAX_DURATION_DAYS) {
            return Err(Error::validation(
                "Competition duration cannot exceed 60 days",
            ));
        }
        if self.prize <= Decimal::ZERO {
            return Err(Error::validation("Prize amount must be greater than 0"));
        }
        Ok(())
    }

    /// Materialize an `Upcoming` competition with a fresh id and no escrow yet.
    pub fn into_competition(self, now: DateTime<Utc>) -> Competition {
        Competition {
            id: Uuid::new_v4(),
            title: self.title,
            description: self.description,
            prize: self.prize,
            start_at: self.start_at,
            end_at: self.end_at,
            status: CompetitionStatus::Upcoming,
            creator_id: self.creator_id,
            escrow_id: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use super::*;

    fn input(start_in_hours: i64, lasts_hours: i64) -> CreateCompetition {
        let now = Utc::now();
        CreateCompetition::builder()
            .title("August sprint")
            .prize(dec!(250))
            .start_at(now + Duration::hours(start_in_hours))
            .end_at(now + Duration::hours(start_in_hours + lasts_hours))
            .creator_id("user_1")
            .build()
    }

    #[test]
    fn valid_input_passes() {
        let now = Utc::now();
        assert!(input(2, 24).validate(now).is_ok());
    }

    #[test]
    fn rejects_past_start() {
        let now = Utc::now();
        let err = input(-1, 24).validate(now).unwrap_err();
        assert!(err.to_string().contains("Start date must be in the future"));
    }

    #[test]
    fn rejects_end_before_start() {
        let now = Utc::now();
        let err = input(2, -3).validate(now).unwrap_err();
        assert!(err.to_string().contains("End date must be after start date"));
    }

    #[test]
    fn rejects_short_duration() {
        let now = Utc::now();
        let mut short = input(2, 1);
        short.end_at = short.start_at + Duration::minutes(59);
        let err = short.validate(now).unwrap_err();
        assert!(err.to_string().contains("at least 1 hour"));
    }

    #[test]
    fn rejects_long_duration() {
        let now = Utc::now();
        let err = input(2, 61 * 24).validate(now).unwrap_err();
        assert!(err.to_string().contains("cannot exceed 60 days"));
    }

    #[test]
    fn rejects_non_positive_prize() {
        let now = Utc::now();
        let mut free = input(2, 24);
        free.prize = Decimal::ZERO;
        let err = free.validate(now).unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn boundary_durations_pass() {
        let now = Utc::now();
        let mut exact = input(2, 0);
        exact.end_at = exact.start_at + Duration::hours(1);
        assert!(exact.validate(now).is_ok());
        exact.end_at = exact.start_at + Duration::days(60);
        assert!(exact.validate(now).is_ok());
    }

    #[test]
    fn status_only_moves_forward() {
        use CompetitionStatus::*;
        assert!(Upcoming.can_advance_to(Active));
        assert!(Active.can_advance_to(Completed));
        assert!(!Upcoming.can_advance_to(Completed));
        assert!(!Active.can_advance_to(Upcoming));
        assert!(!Completed.can_advance_to(Active));
        assert!(!Completed.can_advance_to(Upcoming));
    }

    #[test]
    fn status_round_trips_through_text() {
        use std::str::FromStr;
        for status in [
            CompetitionStatus::Upcoming,
            CompetitionStatus::Active,
            CompetitionStatus::Completed,
        ] {
            let text = status.to_string();
            assert_eq!(CompetitionStatus::from_str(&text).unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{text}\""));
        }
    }

    proptest! {
        #[test]
        fn duration_bounds_hold(start_in_mins in 1_i64..10_000, lasts_mins in 1_i64..120_000) {
            let now = Utc::now();
            let mut create = input(0, 0);
            create.start_at = now + Duration::minutes(start_in_mins);
            create.end_at = create.start_at + Duration::minutes(lasts_mins);
            let expect_ok = (60..=60 * 24 * 60).contains(&lasts_mins);
            prop_assert_eq!(create.validate(now).is_ok(), expect_ok);
        }
    }
}
