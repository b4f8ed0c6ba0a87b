//! # CartBrawl Core
//!
//! Time-boxed revenue competitions between storefronts, with escrowed prizes
//! paid out to the top earner.
//!
//! The crate wires a durable [`store`], two external clients (a prize
//! [`ledger`](client::ledger) and a storefront [`revenue`](client::revenue)
//! source) and the engines driving the competition lifecycle: user-facing
//! [`competitions`] operations, the background [`lifecycle`] scheduler,
//! [`sync`] of participant revenue and [`settlement`] of finished
//! competitions. [`App`] assembles all of it from a [`Config`].

/// Error type.
pub mod error;

/// Data model: competitions, participants, winners.
pub mod model;

/// Durable competition store.
pub mod store;

/// Credential sealing.
pub mod crypto;

/// External service clients.
pub mod client;

/// Notification templates and fan-out.
pub mod notify;

/// Configuration.
pub mod config;

/// User-facing competition operations.
pub mod competitions;

/// Background lifecycle scheduler.
pub mod lifecycle;

/// Participant revenue sync.
pub mod sync;

/// Winner determination and prize release.
pub mod settlement;

/// Application assembly.
pub mod app;

pub use crate::{
    app::App,
    config::Config,
    error::Error,
    model::{Competition, CompetitionStatus, Participant, Winner},
};

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
