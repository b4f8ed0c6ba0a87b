use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

use super::ensure_success;
use crate::{config::LedgerConfig, error::Error, notify::Notification, Result};

const SERVICE: &str = "whop";
const CURRENCY: &str = "usd";

/// Result of a balance probe against a required amount.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BalanceCheck {
    /// Whether the available balance covers the required amount.
    pub has_balance: bool,
    /// Balance available at probe time.
    pub available: Decimal,
}

/// Client for the external ledger holding user balances, escrows and payouts.
///
/// Also carries push notifications, since the ledger platform owns the user
/// accounts they are delivered to.
#[allow(async_fn_in_trait)]
pub trait LedgerClient {
    /// Available balance of a user.
    async fn balance(&self, user_id: &str) -> Result<Decimal>;

    /// Probe whether a user can cover `amount`.
    async fn verify_balance(&self, user_id: &str, amount: Decimal) -> Result<BalanceCheck> {
        let available = self.balance(user_id).await?;
        Ok(BalanceCheck {
            has_balance: available >= amount,
            available,
        })
    }

    /// Move `amount` from the user into escrow. Returns the escrow reference.
    async fn escrow(&self, user_id: &str, amount: Decimal, reference: &str) -> Result<String>;

    /// Release an escrow to a recipient. Returns the payout reference.
    async fn release_escrow(
        &self,
        escrow_id: &str,
        recipient_id: &str,
        reference: &str,
    ) -> Result<String>;

    /// Deliver a push notification to a user.
    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<()>;
}

/// [`LedgerClient`] implementation backed by the Whop REST API.
#[derive(Debug, Clone)]
pub struct WhopLedger {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    agent_user_id: Option<String>,
}

impl WhopLedger {
    /// Create a client from configuration.
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|err| Error::Config(format!("invalid ledger base url: {err}")))?;
        // `Url::join` drops the last path segment without this.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            agent_user_id: config.agent_user_id.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|err| Error::Config(format!("invalid ledger endpoint {path}: {err}")))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url).bearer_auth(&self.api_key);
        match &self.agent_user_id {
            Some(agent) => builder.header("x-on-behalf-of", agent),
            None => builder,
        }
    }
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

#[derive(Serialize)]
struct EscrowRequest<'a> {
    user_id: &'a str,
    amount: Decimal,
    currency: &'a str,
    description: String,
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct EscrowResponse {
    id: String,
}

#[derive(Serialize)]
struct ReleaseRequest<'a> {
    recipient_user_id: &'a str,
    description: String,
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct ReleaseResponse {
    payout_id: String,
}

#[derive(Serialize)]
struct NotifyRequest<'a> {
    user_id: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a serde_json::Value,
}

impl LedgerClient for WhopLedger {
    async fn balance(&self, user_id: &str) -> Result<Decimal> {
        let url = self.endpoint(&format!("v1/users/{user_id}/balance"))?;
        let response = self.request(reqwest::Method::GET, url).send().await?;
        let response = ensure_success(SERVICE, response).await?;
        let body: BalanceResponse = response.json().await?;
        Ok(body.balance)
    }

    async fn escrow(&self, user_id: &str, amount: Decimal, reference: &str) -> Result<String> {
        let url = self.endpoint("v1/escrows")?;
        let request = EscrowRequest {
            user_id,
            amount,
            currency: CURRENCY,
            description: format!("Prize escrow for competition {reference}"),
            metadata: serde_json::json!({
                "competition_id": reference,
                "type": "competition_prize",
            }),
        };
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(SERVICE, response).await?;
        let body: EscrowResponse = response.json().await?;
        Ok(body.id)
    }

    async fn release_escrow(
        &self,
        escrow_id: &str,
        recipient_id: &str,
        reference: &str,
    ) -> Result<String> {
        let url = self.endpoint(&format!("v1/escrows/{escrow_id}/release"))?;
        let request = ReleaseRequest {
            recipient_user_id: recipient_id,
            description: format!("Competition prize payout for competition {reference}"),
            metadata: serde_json::json!({
                "competition_id": reference,
                "type": "competition_winner_payout",
            }),
        };
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(SERVICE, response).await?;
        let body: ReleaseResponse = response.json().await?;
        Ok(body.payout_id)
    }

    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<()> {
        let url = self.endpoint("v1/notifications")?;
        let request = NotifyRequest {
            user_id,
            title: &notification.title,
            body: &notification.body,
            data: &notification.data,
        };
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&request)
            .send()
            .await?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }
}
