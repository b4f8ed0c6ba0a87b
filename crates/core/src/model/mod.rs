/// Competition record and lifecycle status.
pub mod competition;

/// Participant record.
pub mod participant;

/// Winner record.
pub mod winner;

pub use competition::{Competition, CompetitionStatus, CreateCompetition};
pub use participant::{standings_order, JoinCompetition, Participant};
pub use winner::Winner;
