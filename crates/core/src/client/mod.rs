use crate::{error::Error, Result};

/// Prize-ledger client.
pub mod ledger;

/// Storefront revenue source.
pub mod revenue;

pub use ledger::{BalanceCheck, LedgerClient, WhopLedger};
pub use revenue::{RevenueSource, ShopifyRevenue};

const ERROR_SNIPPET_LEN: usize = 1024;

/// Pass the response through when it succeeded, otherwise surface the status
/// and a bounded body snippet as an external-service error.
async fn ensure_success(service: &'static str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet = body.chars().take(ERROR_SNIPPET_LEN).collect::<String>();
    Err(Error::external(service, format!("{status}: {snippet}")))
}
