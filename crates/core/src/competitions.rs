use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    client::LedgerClient,
    crypto::TokenCipher,
    error::Error,
    model::{
        standings_order, Competition, CompetitionStatus, CreateCompetition, JoinCompetition,
        Participant, Winner,
    },
    notify::{broadcast, Notification},
    store::{CompetitionStore, STORE_ALREADY_JOINED, USER_ALREADY_JOINED},
    Result,
};

/// Conflict message for a user who is already in some active competition.
pub const SINGLE_ACTIVE_RULE: &str =
    "You can only participate in one active competition at a time";

/// Competition operations initiated by users: create, join, start and reads.
pub struct Competitions<L> {
    store: CompetitionStore,
    ledger: Arc<L>,
    cipher: TokenCipher,
}

impl<L: LedgerClient> Competitions<L> {
    pub(crate) fn new(store: CompetitionStore, ledger: Arc<L>, cipher: TokenCipher) -> Self {
        Self {
            store,
            ledger,
            cipher,
        }
    }

    /// Create a competition and escrow its prize.
    ///
    /// The record is persisted before the ledger is touched. When funding
    /// fails it is deleted again, so a competition either exists fully funded
    /// or not at all.
    pub async fn create(&self, input: CreateCompetition, now: DateTime<Utc>) -> Result<Competition> {
        input.validate(now)?;
        let mut competition = input.into_competition(now);
        self.store.insert_competition(&competition)?;
        match self.fund(&competition).await {
            Ok(escrow_id) => {
                competition.escrow_id = Some(escrow_id);
                self.store.update_competition(&competition)?;
                tracing::info!(
                    "competition {} created by {} with prize {}",
                    competition.id,
                    competition.creator_id,
                    competition.prize
                );
                let note = Notification::created(&competition);
                if let Err(err) = self.ledger.notify(&competition.creator_id, &note).await {
                    tracing::warn!(
                        "creator confirmation for {} failed: {err}",
                        competition.id
                    );
                }
                Ok(competition)
            }
            Err(err) => {
                if let Err(remove_err) = self.store.remove_competition(&competition.id) {
                    tracing::error!(
                        "failed to remove unfunded competition {}: {remove_err}",
                        competition.id
                    );
                }
                Err(err)
            }
        }
    }

    async fn fund(&self, competition: &Competition) -> Result<String> {
        let check = self
            .ledger
            .verify_balance(&competition.creator_id, competition.prize)
            .await?;
        if !check.has_balance {
            return Err(Error::conflict(format!(
                "Insufficient balance. Required: {}, Available: {}",
                competition.prize, check.available
            )));
        }
        self.ledger
            .escrow(
                &competition.creator_id,
                competition.prize,
                &competition.id.to_string(),
            )
            .await
    }

    /// Enroll a store in a competition.
    pub async fn join(&self, input: JoinCompetition, now: DateTime<Utc>) -> Result<Participant> {
        let competition = self.store.expect_competition(&input.competition_id)?;
        if !competition.status.accepts_participants() {
            return Err(Error::conflict("Competition has already ended"));
        }
        let store_domain = input.store_domain.trim().to_ascii_lowercase();
        if store_domain.is_empty() {
            return Err(Error::validation("Store domain must not be empty"));
        }
        if input.access_token.is_empty() {
            return Err(Error::validation("Access token must not be empty"));
        }
        if self
            .store
            .find_participant(&competition.id, &input.user_id)?
            .is_some()
        {
            return Err(Error::conflict(USER_ALREADY_JOINED));
        }
        if self.store.domain_taken(&competition.id, &store_domain)? {
            return Err(Error::conflict(STORE_ALREADY_JOINED));
        }
        if self.store.active_participation(&input.user_id)?.is_some() {
            return Err(Error::conflict(SINGLE_ACTIVE_RULE));
        }

        let others = self.store.participants_of(&competition.id)?;
        let sealed = self.cipher.seal(&input.access_token)?;
        let participant = Participant::new(competition.id, input.user_id, store_domain, sealed, now);
        // The insert re-checks both uniqueness slots atomically, so a raced
        // duplicate still fails with the same conflicts as above.
        self.store.insert_participant(&participant)?;
        tracing::info!(
            "user {} joined competition {} with store {}",
            participant.user_id,
            competition.id,
            participant.store_domain
        );

        if !others.is_empty() {
            let ids = others.iter().map(|p| p.user_id.clone()).collect::<Vec<_>>();
            let note = Notification::new_participant(&competition, others.len() + 1);
            broadcast(self.ledger.as_ref(), &ids, &note).await;
        }
        Ok(participant)
    }

    /// Manually activate an upcoming competition. Restricted to its creator.
    pub async fn start(
        &self,
        competition_id: &Uuid,
        caller_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Competition> {
        let mut competition = self.store.expect_competition(competition_id)?;
        if competition.creator_id != caller_id {
            return Err(Error::conflict("Only the creator can start this competition"));
        }
        if competition.status != CompetitionStatus::Upcoming {
            return Err(Error::conflict(format!(
                "Competition is already {}",
                competition.status
            )));
        }
        if !competition.has_started(now) {
            return Err(Error::conflict(
                "Competition cannot be started before its scheduled start time",
            ));
        }
        if competition.escrow_id.is_none() {
            return Err(Error::conflict(
                "Competition funds must be escrowed before starting",
            ));
        }
        competition.status = CompetitionStatus::Active;
        self.store.update_competition(&competition)?;
        tracing::info!("competition {} started by its creator", competition.id);

        let participants = self.store.participants_of(&competition.id)?;
        if !participants.is_empty() {
            let ids = participants
                .iter()
                .map(|p| p.user_id.clone())
                .collect::<Vec<_>>();
            broadcast(
                self.ledger.as_ref(),
                &ids,
                &Notification::started(&competition),
            )
            .await;
        }
        Ok(competition)
    }

    /// Ranked standings of a competition.
    pub fn leaderboard(&self, competition_id: &Uuid) -> Result<Leaderboard> {
        let competition = self.store.expect_competition(competition_id)?;
        let mut participants = self.store.participants_of(competition_id)?;
        participants.sort_by(standings_order);
        let entries = participants
            .iter()
            .enumerate()
            .map(|(index, p)| LeaderboardEntry {
                rank: index + 1,
                user_id: p.user_id.clone(),
                store_domain: p.store_domain.clone(),
                total_revenue: p.total_revenue,
                last_synced_at: p.last_synced_at,
                joined_at: p.joined_at,
            })
            .collect::<Vec<_>>();
        let stats = LeaderboardStats::over(&entries);
        Ok(Leaderboard {
            competition_id: competition.id,
            title: competition.title,
            status: competition.status,
            entries,
            stats,
        })
    }

    /// A competition with its participant count and settlement outcome.
    pub fn details(&self, competition_id: &Uuid) -> Result<CompetitionDetails> {
        let competition = self.store.expect_competition(competition_id)?;
        let participant_count = self.store.participants_of(competition_id)?.len();
        let winner = self.store.winner_of(competition_id)?;
        Ok(CompetitionDetails {
            competition,
            participant_count,
            winner,
        })
    }

    /// Competitions a user created and competitions they joined.
    pub fn user_competitions(&self, user_id: &str) -> Result<UserCompetitions> {
        let mut created = self.store.competitions_created_by(user_id)?;
        created.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut joined = Vec::new();
        for participation in self.store.user_participations(user_id)? {
            joined.push(self.store.expect_competition(&participation.competition_id)?);
        }
        joined.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(UserCompetitions { created, joined })
    }
}

/// One row of a leaderboard.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    /// Position, starting at 1.
    pub rank: usize,
    /// External user id of the store owner.
    pub user_id: String,
    /// Storefront domain.
    pub store_domain: String,
    /// Revenue as of the last sync.
    pub total_revenue: Decimal,
    /// Time of the last successful sync.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Enrollment time.
    pub joined_at: DateTime<Utc>,
}

/// Aggregates over a leaderboard.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LeaderboardStats {
    /// Number of participants.
    pub participants: usize,
    /// Sum of all tracked revenue.
    pub total_revenue: Decimal,
    /// Mean revenue, rounded to cents. Zero when empty.
    pub average_revenue: Decimal,
    /// Revenue of the leader. Zero when empty.
    pub highest_revenue: Decimal,
}

impl LeaderboardStats {
    fn over(entries: &[LeaderboardEntry]) -> Self {
        let participants = entries.len();
        let total_revenue: Decimal = entries.iter().map(|e| e.total_revenue).sum();
        let average_revenue = if participants > 0 {
            (total_revenue / Decimal::from(participants)).round_dp(2)
        } else {
            Decimal::ZERO
        };
        let highest_revenue = entries
            .first()
            .map(|e| e.total_revenue)
            .unwrap_or(Decimal::ZERO);
        Self {
            participants,
            total_revenue,
            average_revenue,
            highest_revenue,
        }
    }
}

/// Ranked standings with aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    /// Competition id.
    pub competition_id: Uuid,
    /// Competition title.
    pub title: String,
    /// Competition status at read time.
    pub status: CompetitionStatus,
    /// Rows ordered by rank.
    pub entries: Vec<LeaderboardEntry>,
    /// Aggregates over all rows.
    pub stats: LeaderboardStats,
}

/// A competition together with enrollment and settlement state.
#[derive(Debug, Clone, Serialize)]
pub struct CompetitionDetails {
    /// The competition record.
    pub competition: Competition,
    /// Number of enrolled stores.
    pub participant_count: usize,
    /// Settlement outcome, once one exists.
    pub winner: Option<Winner>,
}

/// Competitions associated with one user.
#[derive(Debug, Clone, Serialize)]
pub struct UserCompetitions {
    /// Competitions the user created, newest first.
    pub created: Vec<Competition>,
    /// Competitions the user joined, newest first.
    pub joined: Vec<Competition>,
}
