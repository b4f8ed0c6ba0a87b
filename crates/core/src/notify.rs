use futures_util::future::join_all;
use serde::Serialize;
use serde_json::json;

use crate::{client::LedgerClient, model::Competition};

/// A push notification ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Short headline.
    pub title: String,
    /// Message body.
    pub body: String,
    /// Structured payload for client-side routing.
    pub data: serde_json::Value,
}

impl Notification {
    /// Heads-up that a competition starts in `minutes`.
    pub fn starting_soon(competition: &Competition, minutes: i64) -> Self {
        Self {
            title: "Competition Starting Soon! 🏁".into(),
            body: format!(
                "\"{}\" starts in {minutes} minutes. Get ready!",
                competition.title
            ),
            data: json!({
                "type": "competition_starting",
                "competition_id": competition.id,
                "minutes_until_start": minutes,
            }),
        }
    }

    /// A competition just went live.
    pub fn started(competition: &Competition) -> Self {
        Self {
            title: "Competition Started! 🚀".into(),
            body: format!(
                "\"{}\" has begun! Start making sales to climb the leaderboard.",
                competition.title
            ),
            data: json!({
                "type": "competition_started",
                "competition_id": competition.id,
            }),
        }
    }

    /// Heads-up that a competition ends in `minutes`.
    pub fn ending_soon(competition: &Competition, minutes: i64) -> Self {
        Self {
            title: "Final Sprint! ⏰".into(),
            body: format!(
                "\"{}\" ends in {minutes} minutes. Push for those final sales!",
                competition.title
            ),
            data: json!({
                "type": "competition_ending",
                "competition_id": competition.id,
                "minutes_remaining": minutes,
            }),
        }
    }

    /// A competition just closed.
    pub fn ended(competition: &Competition) -> Self {
        Self {
            title: "Competition Ended! 🏆".into(),
            body: format!(
                "\"{}\" has ended. Results are being calculated...",
                competition.title
            ),
            data: json!({
                "type": "competition_ended",
                "competition_id": competition.id,
            }),
        }
    }

    /// Someone new joined; `participant_count` includes the newcomer.
    pub fn new_participant(competition: &Competition, participant_count: usize) -> Self {
        Self {
            title: "New Challenger! ⚔️".into(),
            body: format!(
                "Someone new joined \"{}\". {participant_count} stores are now competing!",
                competition.title
            ),
            data: json!({
                "type": "participant_joined",
                "competition_id": competition.id,
                "participant_count": participant_count,
            }),
        }
    }

    /// Creator confirmation that the competition is live and funded.
    pub fn created(competition: &Competition) -> Self {
        Self {
            title: "Competition Created! ✅".into(),
            body: format!(
                "Your competition \"{}\" is live. ${} has been escrowed for the winner.",
                competition.title, competition.prize
            ),
            data: json!({
                "type": "competition_created",
                "competition_id": competition.id,
                "escrow_id": competition.escrow_id,
            }),
        }
    }

    /// The prize landed in the winner's account.
    pub fn prize_won(competition: &Competition, payout_id: &str) -> Self {
        Self {
            title: "🎉 Congratulations! You Won!".into(),
            body: format!(
                "You won \"{}\" and earned ${}! The prize has been sent to your account.",
                competition.title, competition.prize
            ),
            data: json!({
                "type": "competition_won",
                "competition_id": competition.id,
                "payout_id": payout_id,
            }),
        }
    }
}

/// Delivery tally of one fan-out.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FanoutSummary {
    /// Notifications delivered.
    pub sent: usize,
    /// Notifications that failed to deliver.
    pub failed: usize,
}

/// Deliver one notification to many users concurrently.
///
/// Best effort: failures are logged and tallied, never propagated, so a dead
/// notification channel cannot stall competition processing.
pub async fn broadcast<L: LedgerClient>(
    ledger: &L,
    user_ids: &[String],
    notification: &Notification,
) -> FanoutSummary {
    let sends = user_ids
        .iter()
        .map(|user_id| ledger.notify(user_id, notification));
    let results = join_all(sends).await;
    let mut summary = FanoutSummary::default();
    for (user_id, result) in user_ids.iter().zip(results) {
        match result {
            Ok(()) => summary.sent += 1,
            Err(err) => {
                summary.failed += 1;
                tracing::warn!("notification to {user_id} failed: {err}");
            }
        }
    }
    summary
}
