use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sled::{
    transaction::{ConflictableTransactionError, TransactionError},
    Transactional, Tree,
};
use uuid::Uuid;

use crate::{
    error::Error,
    model::{Competition, CompetitionStatus, Participant, Winner},
    Result,
};

/// Conflict message for a user joining the same competition twice.
pub const USER_ALREADY_JOINED: &str = "You are already participating in this competition";

/// Conflict message for a store domain joining the same competition twice.
pub const STORE_ALREADY_JOINED: &str = "This store is already participating in this competition";

/// Record counts per lifecycle status.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StatusCounts {
    /// All competitions.
    pub total: usize,
    /// Competitions in `Upcoming`.
    pub upcoming: usize,
    /// Competitions in `Active`.
    pub active: usize,
    /// Competitions in `Completed`.
    pub completed: usize,
}

enum JoinConflict {
    User,
    Domain,
}

impl JoinConflict {
    fn into_error(self) -> Error {
        match self {
            Self::User => Error::conflict(USER_ALREADY_JOINED),
            Self::Domain => Error::conflict(STORE_ALREADY_JOINED),
        }
    }
}

/// Durable store for competitions, participants and winners.
///
/// Backed by one [`sled`] database with a tree per record kind plus two
/// uniqueness indexes over participants. Handles are cheap to clone and share
/// the underlying database.
#[derive(Debug, Clone)]
pub struct CompetitionStore {
    db: sled::Db,
    competitions: Tree,
    participants: Tree,
    participants_by_user: Tree,
    participants_by_domain: Tree,
    winners: Tree,
}

impl CompetitionStore {
    /// Open or create a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Open a throwaway in-memory store. Used by tests.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        Ok(Self {
            competitions: db.open_tree("competitions")?,
            participants: db.open_tree("participants")?,
            participants_by_user: db.open_tree("participants_by_user")?,
            participants_by_domain: db.open_tree("participants_by_domain")?,
            winners: db.open_tree("winners")?,
            db,
        })
    }

    /// Flush dirty buffers to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(record)?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    // Competition ids are fixed-width, so plain concatenation is unambiguous.
    fn scoped_key(competition_id: &Uuid, suffix: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(16 + suffix.len());
        key.extend_from_slice(competition_id.as_bytes());
        key.extend_from_slice(suffix.as_bytes());
        key
    }

    /// Insert a new competition record.
    pub fn insert_competition(&self, competition: &Competition) -> Result<()> {
        self.competitions
            .insert(competition.id.as_bytes(), Self::encode(competition)?)?;
        Ok(())
    }

    /// Overwrite an existing competition record.
    pub fn update_competition(&self, competition: &Competition) -> Result<()> {
        self.insert_competition(competition)
    }

    /// Remove a competition record. Compensation path for failed escrow setup.
    pub fn remove_competition(&self, id: &Uuid) -> Result<()> {
        self.competitions.remove(id.as_bytes())?;
        Ok(())
    }

    /// Look up a competition by id.
    pub fn competition(&self, id: &Uuid) -> Result<Option<Competition>> {
        self.competitions
            .get(id.as_bytes())?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    /// Look up a competition by id, failing when absent.
    pub fn expect_competition(&self, id: &Uuid) -> Result<Competition> {
        self.competition(id)?.ok_or(Error::NotFound("competition"))
    }

    fn competitions_matching(
        &self,
        mut keep: impl FnMut(&Competition) -> bool,
    ) -> Result<Vec<Competition>> {
        let mut out = Vec::new();
        for entry in self.competitions.iter() {
            let (_, bytes) = entry?;
            let competition: Competition = Self::decode(&bytes)?;
            if keep(&competition) {
                out.push(competition);
            }
        }
        Ok(out)
    }

    /// All competitions in the given status.
    pub fn competitions_with_status(&self, status: CompetitionStatus) -> Result<Vec<Competition>> {
        self.competitions_matching(|c| c.status == status)
    }

    /// `Upcoming` competitions whose start time has passed.
    pub fn due_to_start(&self, now: DateTime<Utc>) -> Result<Vec<Competition>> {
        self.competitions_matching(|c| c.status == CompetitionStatus::Upcoming && c.start_at <= now)
    }

    /// `Active` competitions whose end time has passed.
    pub fn due_to_end(&self, now: DateTime<Utc>) -> Result<Vec<Competition>> {
        self.competitions_matching(|c| c.status == CompetitionStatus::Active && c.end_at <= now)
    }

    /// `Upcoming` competitions starting inside the half-open window `(from, to]`.
    pub fn starting_within(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Competition>> {
        self.competitions_matching(|c| {
            c.status == CompetitionStatus::Upcoming && c.start_at > from && c.start_at <= to
        })
    }

    /// `Active` competitions ending inside the half-open window `(from, to]`.
    pub fn ending_within(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Competition>> {
        self.competitions_matching(|c| {
            c.status == CompetitionStatus::Active && c.end_at > from && c.end_at <= to
        })
    }

    /// Competitions created by the given user.
    pub fn competitions_created_by(&self, user_id: &str) -> Result<Vec<Competition>> {
        self.competitions_matching(|c| c.creator_id == user_id)
    }

    /// Record counts per lifecycle status.
    pub fn status_counts(&self) -> Result<StatusCounts> {
        let mut counts = StatusCounts::default();
        self.competitions_matching(|c| {
            counts.total += 1;
            match c.status {
                CompetitionStatus::Upcoming => counts.upcoming += 1,
                CompetitionStatus::Active => counts.active += 1,
                CompetitionStatus::Completed => counts.completed += 1,
            }
            false
        })?;
        Ok(counts)
    }

    /// Insert a participant and claim its uniqueness index slots atomically.
    ///
    /// Fails with a conflict when the user or the store domain already holds a
    /// slot in this competition.
    pub fn insert_participant(&self, participant: &Participant) -> Result<()> {
        let user_key = Self::scoped_key(&participant.competition_id, &participant.user_id);
        let domain_key = Self::scoped_key(&participant.competition_id, &participant.store_domain);
        let id_bytes = participant.id.as_bytes().to_vec();
        let encoded = Self::encode(participant)?;
        let result = (
            &self.participants,
            &self.participants_by_user,
            &self.participants_by_domain,
        )
            .transaction(|(participants, by_user, by_domain)| {
                if by_user.get(user_key.as_slice())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(JoinConflict::User));
                }
                if by_domain.get(domain_key.as_slice())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(JoinConflict::Domain));
                }
                by_user.insert(user_key.as_slice(), id_bytes.as_slice())?;
                by_domain.insert(domain_key.as_slice(), id_bytes.as_slice())?;
                participants.insert(id_bytes.as_slice(), encoded.as_slice())?;
                Ok(())
            });
        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(conflict)) => Err(conflict.into_error()),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    /// Overwrite an existing participant record. Index slots are untouched.
    pub fn update_participant(&self, participant: &Participant) -> Result<()> {
        self.participants
            .insert(participant.id.as_bytes(), Self::encode(participant)?)?;
        Ok(())
    }

    /// Look up a participant by id.
    pub fn participant(&self, id: &Uuid) -> Result<Option<Participant>> {
        self.participants
            .get(id.as_bytes())?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    /// The participant a user holds in a given competition, if any.
    pub fn find_participant(
        &self,
        competition_id: &Uuid,
        user_id: &str,
    ) -> Result<Option<Participant>> {
        let key = Self::scoped_key(competition_id, user_id);
        let Some(id_bytes) = self.participants_by_user.get(key)? else {
            return Ok(None);
        };
        let Some(bytes) = self.participants.get(&id_bytes)? else {
            return Err(Error::custom("participant index points to a missing record"));
        };
        Self::decode(&bytes).map(Some)
    }

    /// Whether a store domain already holds a slot in a competition.
    pub fn domain_taken(&self, competition_id: &Uuid, store_domain: &str) -> Result<bool> {
        let key = Self::scoped_key(competition_id, store_domain);
        Ok(self.participants_by_domain.get(key)?.is_some())
    }

    /// All participants of a competition, in unspecified order.
    pub fn participants_of(&self, competition_id: &Uuid) -> Result<Vec<Participant>> {
        let mut out = Vec::new();
        for entry in self.participants_by_user.scan_prefix(competition_id.as_bytes()) {
            let (_, id_bytes) = entry?;
            let Some(bytes) = self.participants.get(&id_bytes)? else {
                return Err(Error::custom("participant index points to a missing record"));
            };
            out.push(Self::decode(&bytes)?);
        }
        Ok(out)
    }

    /// All participations of a user across competitions.
    pub fn user_participations(&self, user_id: &str) -> Result<Vec<Participant>> {
        let mut out = Vec::new();
        for entry in self.participants.iter() {
            let (_, bytes) = entry?;
            let participant: Participant = Self::decode(&bytes)?;
            if participant.user_id == user_id {
                out.push(participant);
            }
        }
        Ok(out)
    }

    /// The participation a user holds in any currently `Active` competition.
    pub fn active_participation(&self, user_id: &str) -> Result<Option<Participant>> {
        for participant in self.user_participations(user_id)? {
            let competition = self.expect_competition(&participant.competition_id)?;
            if competition.status == CompetitionStatus::Active {
                return Ok(Some(participant));
            }
        }
        Ok(None)
    }

    /// The settlement record of a competition, if any.
    pub fn winner_of(&self, competition_id: &Uuid) -> Result<Option<Winner>> {
        self.winners
            .get(competition_id.as_bytes())?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    /// Record a winner unless one already exists.
    ///
    /// First writer wins. Returns the record that ended up stored, which is
    /// the existing one when this call lost the race.
    pub fn try_create_winner(&self, winner: &Winner) -> Result<Winner> {
        let encoded = Self::encode(winner)?;
        let outcome = self.winners.compare_and_swap(
            winner.competition_id.as_bytes(),
            None as Option<&[u8]>,
            Some(encoded),
        )?;
        match outcome {
            Ok(()) => Ok(winner.clone()),
            Err(cas) => {
                let current = cas
                    .current
                    .ok_or_else(|| Error::custom("winner record vanished during settlement"))?;
                Self::decode(&current)
            }
        }
    }

    /// Attach a payout reference to an existing winner record.
    pub fn set_winner_payout(&self, competition_id: &Uuid, payout_id: &str) -> Result<Winner> {
        let mut winner = self
            .winner_of(competition_id)?
            .ok_or(Error::NotFound("winner"))?;
        winner.payout_id = Some(payout_id.to_string());
        self.winners
            .insert(competition_id.as_bytes(), Self::encode(&winner)?)?;
        Ok(winner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::model::CreateCompetition;

    fn competition(store: &CompetitionStore, start_in: i64, lasts: i64) -> Competition {
        let now = Utc::now();
        let competition = CreateCompetition::builder()
            .title("store test")
            .prize(dec!(100))
            .start_at(now + Duration::hours(start_in))
            .end_at(now + Duration::hours(start_in + lasts))
            .creator_id("creator")
            .build()
            .into_competition(now);
        store.insert_competition(&competition).unwrap();
        competition
    }

    fn participant(competition_id: Uuid, user: &str, domain: &str) -> Participant {
        Participant::new(competition_id, user, domain, "sealed".into(), Utc::now())
    }

    #[test]
    fn competition_round_trip() {
        let store = CompetitionStore::temporary().unwrap();
        let competition = competition(&store, 2, 24);
        let loaded = store.expect_competition(&competition.id).unwrap();
        assert_eq!(loaded.title, competition.title);
        assert_eq!(loaded.prize, competition.prize);
        assert!(store.competition(&Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn remove_competition_leaves_no_trace() {
        let store = CompetitionStore::temporary().unwrap();
        let competition = competition(&store, 2, 24);
        store.remove_competition(&competition.id).unwrap();
        assert!(store.competition(&competition.id).unwrap().is_none());
        assert_eq!(store.status_counts().unwrap().total, 0);
    }

    #[test]
    fn duplicate_user_is_rejected_atomically() {
        let store = CompetitionStore::temporary().unwrap();
        let competition = competition(&store, 2, 24);
        store
            .insert_participant(&participant(competition.id, "alice", "a.example.com"))
            .unwrap();
        let err = store
            .insert_participant(&participant(competition.id, "alice", "b.example.com"))
            .unwrap_err();
        assert!(err.to_string().contains(USER_ALREADY_JOINED));
        // The losing insert must not have claimed the domain slot.
        assert!(!store.domain_taken(&competition.id, "b.example.com").unwrap());
        assert_eq!(store.participants_of(&competition.id).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_domain_is_rejected() {
        let store = CompetitionStore::temporary().unwrap();
        let competition = competition(&store, 2, 24);
        store
            .insert_participant(&participant(competition.id, "alice", "shared.example.com"))
            .unwrap();
        let err = store
            .insert_participant(&participant(competition.id, "bob", "shared.example.com"))
            .unwrap_err();
        assert!(err.to_string().contains(STORE_ALREADY_JOINED));
    }

    #[test]
    fn same_user_and_domain_allowed_across_competitions() {
        let store = CompetitionStore::temporary().unwrap();
        let first = competition(&store, 2, 24);
        let second = competition(&store, 3, 24);
        store
            .insert_participant(&participant(first.id, "alice", "a.example.com"))
            .unwrap();
        store
            .insert_participant(&participant(second.id, "alice", "a.example.com"))
            .unwrap();
        assert_eq!(store.participants_of(&first.id).unwrap().len(), 1);
        assert_eq!(store.participants_of(&second.id).unwrap().len(), 1);
        assert_eq!(store.user_participations("alice").unwrap().len(), 2);
    }

    #[test]
    fn due_and_window_queries() {
        let store = CompetitionStore::temporary().unwrap();
        let now = Utc::now();
        let mut due = competition(&store, 2, 24);
        due.start_at = now - Duration::minutes(1);
        store.update_competition(&due).unwrap();
        let soon = competition(&store, 2, 24);
        let mut far = competition(&store, 2, 24);
        far.start_at = now + Duration::hours(5);
        store.update_competition(&far).unwrap();

        let ids: Vec<_> = store.due_to_start(now).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![due.id]);

        let window = store
            .starting_within(now + Duration::minutes(10), now + Duration::minutes(170))
            .unwrap();
        let ids: Vec<_> = window.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![soon.id]);
    }

    #[test]
    fn window_bounds_are_half_open() {
        let store = CompetitionStore::temporary().unwrap();
        let now = Utc::now();
        let mut at_lower = competition(&store, 2, 24);
        at_lower.start_at = now + Duration::minutes(10);
        store.update_competition(&at_lower).unwrap();
        let mut at_upper = competition(&store, 2, 24);
        at_upper.start_at = now + Duration::minutes(60);
        store.update_competition(&at_upper).unwrap();

        let window = store
            .starting_within(now + Duration::minutes(10), now + Duration::minutes(60))
            .unwrap();
        let ids: Vec<_> = window.iter().map(|c| c.id).collect();
        // Lower bound exclusive, upper bound inclusive.
        assert_eq!(ids, vec![at_upper.id]);
    }

    #[test]
    fn winner_is_created_at_most_once() {
        let store = CompetitionStore::temporary().unwrap();
        let competition = competition(&store, 2, 24);
        let mut first = participant(competition.id, "alice", "a.example.com");
        first.total_revenue = dec!(500);
        let second = participant(competition.id, "bob", "b.example.com");

        let stored = store
            .try_create_winner(&Winner::from_standings(&first, Utc::now()))
            .unwrap();
        assert_eq!(stored.user_id, "alice");

        let raced = store
            .try_create_winner(&Winner::from_standings(&second, Utc::now()))
            .unwrap();
        assert_eq!(raced.user_id, "alice");
        assert_eq!(raced.id, stored.id);
    }

    #[test]
    fn payout_reference_is_attached() {
        let store = CompetitionStore::temporary().unwrap();
        let competition = competition(&store, 2, 24);
        let top = participant(competition.id, "alice", "a.example.com");
        store
            .try_create_winner(&Winner::from_standings(&top, Utc::now()))
            .unwrap();
        let updated = store.set_winner_payout(&competition.id, "pay_123").unwrap();
        assert_eq!(updated.payout_id.as_deref(), Some("pay_123"));
        let loaded = store.winner_of(&competition.id).unwrap().unwrap();
        assert!(loaded.is_paid());
    }

    #[test]
    fn status_counts_cover_all_statuses() {
        let store = CompetitionStore::temporary().unwrap();
        let _upcoming = competition(&store, 2, 24);
        let mut active = competition(&store, 2, 24);
        active.status = CompetitionStatus::Active;
        store.update_competition(&active).unwrap();
        let mut done = competition(&store, 2, 24);
        done.status = CompetitionStatus::Completed;
        store.update_competition(&done).unwrap();

        let counts = store.status_counts().unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.upcoming, 1);
        assert_eq!(counts.active, 1);
        assert_eq!(counts.completed, 1);
    }
}
