use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

use super::ensure_success;
use crate::{config::RevenueConfig, error::Error, Result};

const SERVICE: &str = "shopify";
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";
const PAGE_SIZE: u32 = 250;

const ORDERS_QUERY: &str = r#"
query PaidOrders($first: Int!, $query: String!, $cursor: String) {
  orders(first: $first, after: $cursor, query: $query) {
    pageInfo {
      hasNextPage
    }
    edges {
      cursor
      node {
        currentTotalPriceSet {
          shopMoney {
            amount
          }
        }
      }
    }
  }
}"#;

/// Read-side client for storefront revenue inside a time window.
#[allow(async_fn_in_trait)]
pub trait RevenueSource {
    /// Total value of paid orders created inside `[from, to]`.
    ///
    /// Drains every result page before returning. Any page failure fails the
    /// whole call so a partial total is never observed.
    async fn paid_order_total(
        &self,
        access_token: &str,
        store_domain: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Decimal>;
}

/// [`RevenueSource`] implementation backed by the Shopify Admin GraphQL API.
#[derive(Debug, Clone)]
pub struct ShopifyRevenue {
    http: reqwest::Client,
    api_version: String,
}

impl ShopifyRevenue {
    /// Create a client from configuration.
    pub fn new(config: &RevenueConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_version: config.api_version.clone(),
        })
    }

    fn endpoint(&self, store_domain: &str) -> Result<Url> {
        Url::parse(&format!(
            "https://{store_domain}/admin/api/{}/graphql.json",
            self.api_version
        ))
        .map_err(|_| Error::custom(format!("invalid store domain: {store_domain}")))
    }
}

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Variables<'a>,
}

#[derive(Serialize)]
struct Variables<'a> {
    first: u32,
    query: &'a str,
    cursor: Option<&'a str>,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<OrdersData>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct OrdersData {
    orders: OrdersConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrdersConnection {
    page_info: PageInfo,
    edges: Vec<OrderEdge>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
}

#[derive(Deserialize)]
struct OrderEdge {
    cursor: String,
    node: OrderNode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderNode {
    current_total_price_set: PriceSet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceSet {
    shop_money: Money,
}

#[derive(Deserialize)]
struct Money {
    amount: Decimal,
}

fn search_query(from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    format!(
        "created_at:>='{}' created_at:<='{}' financial_status:paid status:any",
        from.to_rfc3339_opts(SecondsFormat::Secs, true),
        to.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

impl RevenueSource for ShopifyRevenue {
    async fn paid_order_total(
        &self,
        access_token: &str,
        store_domain: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Decimal> {
        let url = self.endpoint(store_domain)?;
        let search = search_query(from, to);
        let mut total = Decimal::ZERO;
        let mut cursor: Option<String> = None;
        loop {
            let request = GraphqlRequest {
                query: ORDERS_QUERY,
                variables: Variables {
                    first: PAGE_SIZE,
                    query: &search,
                    cursor: cursor.as_deref(),
                },
            };
            let response = self
                .http
                .post(url.clone())
                .header(ACCESS_TOKEN_HEADER, access_token)
                .json(&request)
                .send()
                .await?;
            let response = ensure_success(SERVICE, response).await?;
            let page: GraphqlResponse = response.json().await?;
            if let Some(errors) = page.errors.filter(|errors| !errors.is_empty()) {
                let message = errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(Error::external(SERVICE, message));
            }
            let data = page
                .data
                .ok_or_else(|| Error::external(SERVICE, "response missing data"))?;
            for edge in &data.orders.edges {
                total += edge.node.current_total_price_set.shop_money.amount;
            }
            if !data.orders.page_info.has_next_page {
                break;
            }
            match data.orders.edges.last() {
                Some(last) => cursor = Some(last.cursor.clone()),
                None => {
                    return Err(Error::external(SERVICE, "pagination cursor missing"));
                }
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn parses_order_page() {
        let raw = serde_json::json!({
            "data": {
                "orders": {
                    "pageInfo": { "hasNextPage": true },
                    "edges": [
                        {
                            "cursor": "abc",
                            "node": {
                                "currentTotalPriceSet": { "shopMoney": { "amount": "129.95" } }
                            }
                        },
                        {
                            "cursor": "def",
                            "node": {
                                "currentTotalPriceSet": { "shopMoney": { "amount": "0.05" } }
                            }
                        }
                    ]
                }
            }
        });
        let page: GraphqlResponse = serde_json::from_value(raw).unwrap();
        let data = page.data.unwrap();
        assert!(data.orders.page_info.has_next_page);
        let sum: Decimal = data
            .orders
            .edges
            .iter()
            .map(|e| e.node.current_total_price_set.shop_money.amount)
            .sum();
        assert_eq!(sum, dec!(130.00));
        assert_eq!(data.orders.edges.last().unwrap().cursor, "def");
    }

    #[test]
    fn surfaces_graphql_errors() {
        let raw = serde_json::json!({
            "data": null,
            "errors": [{ "message": "Throttled" }]
        });
        let page: GraphqlResponse = serde_json::from_value(raw).unwrap();
        let errors = page.errors.unwrap();
        assert_eq!(errors[0].message, "Throttled");
    }

    #[test]
    fn search_query_covers_the_window() {
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap();
        let query = search_query(from, to);
        assert_eq!(
            query,
            "created_at:>='2024-03-01T00:00:00Z' created_at:<='2024-03-08T00:00:00Z' \
             financial_status:paid status:any"
        );
    }
}
