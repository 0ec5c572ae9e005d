use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::config::Config;
use crate::types::{AccountSnapshot, Order, OrderKind};

/// Signed Binance USDT-futures REST client. Every private endpoint gets a
/// millisecond timestamp and an HMAC-SHA256 signature over the query string.
pub struct BinanceRest {
    http: reqwest::Client,
    base: String,
    api_key: String,
    api_secret: String,
    symbol: String,
}

const RECV_WINDOW: &str = "5000";

/// Hex HMAC-SHA256 of the query string.
pub fn sign_query(secret: &str, query: &str) -> Result<String, String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid api secret".to_string())?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Query parameters for a new order. Separated from the HTTP path so the
/// mapping of our order model onto the exchange API is testable.
pub fn order_params(symbol: &str, order: &Order, client_id: &str) -> Vec<(&'static str, String)> {
    let mut params: Vec<(&'static str, String)> = vec![
        ("symbol", symbol.to_string()),
        ("side", order.side.to_string()),
    ];

    match order.kind {
        OrderKind::Limit { price, post_only } => {
            params.push(("type", "LIMIT".into()));
            // GTX is post-only: the order is rejected instead of taking
            params.push(("timeInForce", if post_only { "GTX" } else { "GTC" }.into()));
            params.push(("price", format!("{}", price)));
        }
        OrderKind::StopMarket { trigger } => {
            params.push(("type", "STOP_MARKET".into()));
            params.push(("stopPrice", format!("{}", trigger)));
        }
        OrderKind::Market => {
            params.push(("type", "MARKET".into()));
        }
    }

    params.push(("quantity", format!("{}", order.qty)));
    if order.reduce_only {
        params.push(("reduceOnly", "true".into()));
    }
    params.push(("newClientOrderId", client_id.to_string()));
    params
}

#[derive(Deserialize)]
pub struct OrderResponse {
    #[serde(rename = "clientOrderId")]
    pub client_order_id: String,
    pub status: String,
    #[serde(rename = "avgPrice", default)]
    pub avg_price: String,
    #[serde(rename = "executedQty", default)]
    pub executed_qty: String,
}

impl OrderResponse {
    pub fn fill(&self) -> Option<(f64, f64)> {
        if self.status != "FILLED" && self.status != "PARTIALLY_FILLED" {
            return None;
        }
        let price: f64 = self.avg_price.parse().ok()?;
        let qty: f64 = self.executed_qty.parse().ok()?;
        if qty > 0.0 {
            Some((price, qty))
        } else {
            None
        }
    }
}

#[derive(Deserialize)]
struct AccountResponse {
    #[serde(rename = "totalWalletBalance")]
    total_wallet_balance: String,
    #[serde(rename = "totalMarginBalance")]
    total_margin_balance: String,
    #[serde(rename = "totalMaintMargin")]
    total_maint_margin: String,
    #[serde(rename = "totalUnrealizedProfit")]
    total_unrealized_profit: String,
}

impl BinanceRest {
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let api_key = config
            .api_key
            .clone()
            .ok_or("BINANCE_API_KEY required when DRY_RUN=false")?;
        let api_secret = config
            .api_secret
            .clone()
            .ok_or("BINANCE_API_SECRET required when DRY_RUN=false")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base: config.profile.rest_base().to_string(),
            api_key,
            api_secret,
            symbol: config.symbol.clone(),
        })
    }

    async fn signed_request(
        &self,
        method: reqwest::Method,
        path: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<String, String> {
        params.push(("recvWindow", RECV_WINDOW.into()));
        params.push(("timestamp", chrono::Utc::now().timestamp_millis().to_string()));

        let query = encode_params(&params);
        let signature = sign_query(&self.api_secret, &query)?;
        let url = format!("{}{}?{}&signature={}", self.base, path, query, signature);

        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| format!("{}: {}", path, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| format!("{}: read body: {}", path, e))?;

        if !status.is_success() {
            return Err(format!("{}: HTTP {}: {}", path, status, body));
        }
        Ok(body)
    }

    pub async fn place_order(&self, order: &Order, client_id: &str) -> Result<OrderResponse, String> {
        let params = order_params(&self.symbol, order, client_id);
        let body = self
            .signed_request(reqwest::Method::POST, "/fapi/v1/order", params)
            .await?;
        serde_json::from_str(&body).map_err(|e| format!("order response: {}: {}", e, body))
    }

    pub async fn query_order(&self, client_id: &str) -> Result<OrderResponse, String> {
        let params = vec![
            ("symbol", self.symbol.clone()),
            ("origClientOrderId", client_id.to_string()),
        ];
        let body = self
            .signed_request(reqwest::Method::GET, "/fapi/v1/order", params)
            .await?;
        serde_json::from_str(&body).map_err(|e| format!("order query: {}: {}", e, body))
    }

    /// Cancel a resting order. The response carries the order's final
    /// state; it may already have filled.
    pub async fn cancel_order(&self, client_id: &str) -> Result<OrderResponse, String> {
        let params = vec![
            ("symbol", self.symbol.clone()),
            ("origClientOrderId", client_id.to_string()),
        ];
        let body = self
            .signed_request(reqwest::Method::DELETE, "/fapi/v1/order", params)
            .await?;
        serde_json::from_str(&body).map_err(|e| format!("cancel response: {}: {}", e, body))
    }

    pub async fn cancel_all(&self) -> Result<(), String> {
        let params = vec![("symbol", self.symbol.clone())];
        self.signed_request(reqwest::Method::DELETE, "/fapi/v1/allOpenOrders", params)
            .await?;
        Ok(())
    }

    pub async fn account(&self) -> Result<AccountSnapshot, String> {
        let body = self
            .signed_request(reqwest::Method::GET, "/fapi/v2/account", vec![])
            .await?;
        let acct: AccountResponse =
            serde_json::from_str(&body).map_err(|e| format!("account response: {}: {}", e, body))?;

        let num = |s: &str| s.parse::<f64>().map_err(|e| format!("account field: {}", e));
        Ok(AccountSnapshot {
            ts_ms: chrono::Utc::now().timestamp_millis(),
            wallet_balance: num(&acct.total_wallet_balance)?,
            margin_balance: num(&acct.total_margin_balance)?,
            maint_margin: num(&acct.total_maint_margin)?,
            unrealized_pnl: num(&acct.total_unrealized_profit)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use crate::types::{OrderPurpose, Side};

    /// Signature vector from the Binance API documentation.
    #[test]
    fn test_signature_known_vector() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        let sig = sign_query(secret, query).unwrap();
        assert_eq!(
            sig,
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71",
        );
    }

    fn order(kind: OrderKind, reduce_only: bool) -> Order {
        Order {
            id: 7,
            side: Side::Buy,
            qty: 0.04,
            kind,
            reduce_only,
            purpose: OrderPurpose::Grid { level: 1 },
            created_at: Instant::now(),
        }
    }

    fn get<'a>(params: &'a [(&str, String)], key: &str) -> Option<&'a str> {
        params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_post_only_limit_maps_to_gtx() {
        let o = order(OrderKind::Limit { price: 142.51, post_only: true }, false);
        let params = order_params("SOLUSDT", &o, "axb-1-7");
        assert_eq!(get(&params, "type"), Some("LIMIT"));
        assert_eq!(get(&params, "timeInForce"), Some("GTX"));
        assert_eq!(get(&params, "price"), Some("142.51"));
        assert_eq!(get(&params, "side"), Some("BUY"));
        assert_eq!(get(&params, "newClientOrderId"), Some("axb-1-7"));
        assert!(get(&params, "reduceOnly").is_none());
    }

    #[test]
    fn test_stop_market_carries_trigger() {
        let o = order(OrderKind::StopMarket { trigger: 139.66 }, true);
        let params = order_params("SOLUSDT", &o, "axb-1-7");
        assert_eq!(get(&params, "type"), Some("STOP_MARKET"));
        assert_eq!(get(&params, "stopPrice"), Some("139.66"));
        assert_eq!(get(&params, "reduceOnly"), Some("true"));
        assert!(get(&params, "price").is_none());
        assert!(get(&params, "timeInForce").is_none());
    }

    #[test]
    fn test_market_order_params() {
        let o = order(OrderKind::Market, true);
        let params = order_params("SOLUSDT", &o, "axb-1-7");
        assert_eq!(get(&params, "type"), Some("MARKET"));
        assert!(get(&params, "price").is_none());
        assert!(get(&params, "stopPrice").is_none());
    }

    #[test]
    fn test_fill_extraction() {
        let resp = OrderResponse {
            client_order_id: "axb-1-7".into(),
            status: "FILLED".into(),
            avg_price: "142.4950".into(),
            executed_qty: "0.040".into(),
        };
        let (price, qty) = resp.fill().unwrap();
        assert!((price - 142.495).abs() < 1e-9);
        assert!((qty - 0.04).abs() < 1e-9);

        let resting = OrderResponse {
            client_order_id: "axb-1-8".into(),
            status: "NEW".into(),
            avg_price: "0".into(),
            executed_qty: "0".into(),
        };
        assert!(resting.fill().is_none());
    }
}
