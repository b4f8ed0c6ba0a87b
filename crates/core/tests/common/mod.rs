#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, Once},
};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use cartbrawl_core::{
    client::{LedgerClient, RevenueSource},
    config::Config,
    error::Error,
    model::{Competition, CreateCompetition, JoinCompetition, Participant},
    notify::Notification,
    store::CompetitionStore,
    App, Result,
};

pub const ENCRYPTION_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// One escrow call the mock ledger observed.
#[derive(Debug, Clone)]
pub struct EscrowCall {
    pub user_id: String,
    pub amount: Decimal,
    pub reference: String,
}

/// One release call the mock ledger observed.
#[derive(Debug, Clone)]
pub struct ReleaseCall {
    pub escrow_id: String,
    pub recipient_id: String,
    pub reference: String,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<String, Decimal>,
    escrows: Vec<EscrowCall>,
    releases: Vec<ReleaseCall>,
    notifications: Vec<(String, String)>,
    fail_escrow: bool,
    fail_release: bool,
    fail_notify: bool,
    escrow_seq: usize,
    release_seq: usize,
}

/// In-memory ledger recording every call it sees.
#[derive(Debug, Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn with_balance(user_id: &str, amount: Decimal) -> Self {
        let ledger = Self::default();
        ledger.set_balance(user_id, amount);
        ledger
    }

    pub fn set_balance(&self, user_id: &str, amount: Decimal) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(user_id.into(), amount);
    }

    pub fn fail_escrow(&self, fail: bool) {
        self.state.lock().unwrap().fail_escrow = fail;
    }

    pub fn fail_release(&self, fail: bool) {
        self.state.lock().unwrap().fail_release = fail;
    }

    pub fn fail_notify(&self, fail: bool) {
        self.state.lock().unwrap().fail_notify = fail;
    }

    pub fn escrows(&self) -> Vec<EscrowCall> {
        self.state.lock().unwrap().escrows.clone()
    }

    pub fn releases(&self) -> Vec<ReleaseCall> {
        self.state.lock().unwrap().releases.clone()
    }

    /// All notifications as `(user_id, title)` pairs, in delivery order.
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().notifications.clone()
    }

    /// Titles delivered to one user.
    pub fn titles_for(&self, user_id: &str) -> Vec<String> {
        self.notifications()
            .into_iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, title)| title)
            .collect()
    }
}

impl LedgerClient for MockLedger {
    async fn balance(&self, user_id: &str) -> Result<Decimal> {
        let state = self.state.lock().unwrap();
        Ok(state.balances.get(user_id).copied().unwrap_or(Decimal::ZERO))
    }

    async fn escrow(&self, user_id: &str, amount: Decimal, reference: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_escrow {
            return Err(Error::external("whop", "escrow unavailable"));
        }
        state.escrow_seq += 1;
        let id = format!("esc_{}", state.escrow_seq);
        state.escrows.push(EscrowCall {
            user_id: user_id.into(),
            amount,
            reference: reference.into(),
        });
        Ok(id)
    }

    async fn release_escrow(
        &self,
        escrow_id: &str,
        recipient_id: &str,
        reference: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_release {
            return Err(Error::external("whop", "release unavailable"));
        }
        state.release_seq += 1;
        let id = format!("pay_{}", state.release_seq);
        state.releases.push(ReleaseCall {
            escrow_id: escrow_id.into(),
            recipient_id: recipient_id.into(),
            reference: reference.into(),
        });
        Ok(id)
    }

    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_notify {
            return Err(Error::external("whop", "notification rejected"));
        }
        state
            .notifications
            .push((user_id.into(), notification.title.clone()));
        Ok(())
    }
}

/// One revenue query the mock source observed.
#[derive(Debug, Clone)]
pub struct RevenueCall {
    pub token: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RevenueState {
    totals: HashMap<String, Decimal>,
    failing: HashSet<String>,
    calls: HashMap<String, Vec<RevenueCall>>,
}

/// In-memory revenue source keyed by store domain.
#[derive(Debug, Default)]
pub struct MockRevenue {
    state: Mutex<RevenueState>,
}

impl MockRevenue {
    pub fn set_total(&self, store_domain: &str, amount: Decimal) {
        self.state
            .lock()
            .unwrap()
            .totals
            .insert(store_domain.into(), amount);
    }

    pub fn fail_domain(&self, store_domain: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(store_domain.into());
    }

    pub fn restore_domain(&self, store_domain: &str) {
        self.state.lock().unwrap().failing.remove(store_domain);
    }

    pub fn calls(&self, store_domain: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(store_domain)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn last_call(&self, store_domain: &str) -> Option<RevenueCall> {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(store_domain)
            .and_then(|calls| calls.last().cloned())
    }
}

impl RevenueSource for MockRevenue {
    async fn paid_order_total(
        &self,
        access_token: &str,
        store_domain: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Decimal> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .entry(store_domain.into())
            .or_default()
            .push(RevenueCall {
                token: access_token.into(),
                from,
                to,
            });
        if state.failing.contains(store_domain) {
            return Err(Error::external("shopify", "order query failed"));
        }
        Ok(state.totals.get(store_domain).copied().unwrap_or(Decimal::ZERO))
    }
}

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.encryption_key = ENCRYPTION_KEY.into();
    config.ledger.api_key = "test-key".into();
    config
}

pub type TestApp = App<MockLedger, MockRevenue>;

/// Assemble an app over a throwaway store and the given mocks.
pub fn app_with(ledger: MockLedger, revenue: MockRevenue) -> TestApp {
    init_tracing();
    App::with_clients(
        test_config(),
        CompetitionStore::temporary().unwrap(),
        ledger,
        revenue,
    )
    .unwrap()
}

/// App with a funded creator and an empty revenue source.
pub fn funded_app(creator: &str) -> TestApp {
    app_with(
        MockLedger::with_balance(creator, dec!(10000)),
        MockRevenue::default(),
    )
}

/// Create a competition starting `start_in_mins` from `now`.
pub async fn create_competition(
    app: &TestApp,
    creator: &str,
    prize: Decimal,
    start_in_mins: i64,
    lasts_hours: i64,
    now: DateTime<Utc>,
) -> Competition {
    let input = CreateCompetition::builder()
        .title("Test Sprint")
        .prize(prize)
        .start_at(now + Duration::minutes(start_in_mins))
        .end_at(now + Duration::minutes(start_in_mins) + Duration::hours(lasts_hours))
        .creator_id(creator)
        .build();
    app.competitions().create(input, now).await.unwrap()
}

/// Enroll `user` with a deterministic token `token-{user}`.
pub async fn join(
    app: &TestApp,
    competition: &Competition,
    user: &str,
    store_domain: &str,
    now: DateTime<Utc>,
) -> Participant {
    let input = JoinCompetition::builder()
        .competition_id(competition.id)
        .user_id(user)
        .store_domain(store_domain)
        .access_token(format!("token-{user}"))
        .build();
    app.competitions().join(input, now).await.unwrap()
}
