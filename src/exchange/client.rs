//! REST venue client.
//!
//! Outbound-only client for an FTX-style perpetuals REST API:
//! HMAC-SHA256 signed requests, optional subaccount header, JSON
//! `{success, result, error}` response envelope. HTTP failures are
//! mapped onto the transient/terminal taxonomy in
//! [`crate::exchange::error::GatewayError`].

use crate::config::VenueConfig;
use crate::exchange::error::GatewayError;
use crate::exchange::traits::ExecutionGateway;
use crate::exchange::types::{Candle, OrderId, OrderIntent, PositionRecord, Ticker};
use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// Response envelope used by every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    result: Option<T>,
    error: Option<String>,
}

/// Signed REST client for one venue (sub)account.
pub struct RestGateway {
    http: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    subaccount: Option<String>,
}

impl RestGateway {
    /// Create a client from venue configuration.
    pub fn new(config: &VenueConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            subaccount: config.subaccount.clone(),
        })
    }

    /// HMAC-SHA256 over `{timestamp}{METHOD}{path}{body}`.
    fn sign(&self, payload: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, GatewayError> {
        let timestamp = Self::timestamp_ms();
        let body_str = body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();
        let signature = self.sign(&format!("{}{}{}{}", timestamp, method, path, body_str));

        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method, &url)
            .header("X-API-KEY", &self.api_key)
            .header("X-TIMESTAMP", timestamp.to_string())
            .header("X-SIGNATURE", signature);

        if let Some(subaccount) = &self.subaccount {
            request = request.header("X-SUBACCOUNT", subaccount);
        }

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        Self::decode(response).await
    }

    /// Map HTTP status and envelope onto the error taxonomy.
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimited);
        }
        if status.is_server_error() {
            return Err(GatewayError::Unavailable {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| GatewayError::malformed(format!("{e}: {body}")))?;

        if !envelope.success || !status.is_success() {
            return Err(GatewayError::rejected(
                envelope.error.unwrap_or_else(|| format!("status {status}")),
            ));
        }
        envelope
            .result
            .ok_or_else(|| GatewayError::malformed("missing result field"))
    }
}

#[async_trait]
impl ExecutionGateway for RestGateway {
    #[instrument(skip(self))]
    async fn cancel_all_orders(&self) -> Result<(), GatewayError> {
        // Result payload is a human-readable confirmation string.
        let _: String = self.request(Method::DELETE, "/api/orders", None).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_positions(&self) -> Result<Vec<PositionRecord>, GatewayError> {
        self.request(Method::GET, "/api/positions", None).await
    }

    #[instrument(skip(self))]
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, GatewayError> {
        let path = format!("/api/markets/{}/ticker", urlencoding::encode(symbol));
        self.request(Method::GET, &path, None).await
    }

    #[instrument(skip(self))]
    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let path = format!(
            "/api/markets/{}/candles?resolution={}&limit={}",
            urlencoding::encode(symbol),
            urlencoding::encode(resolution),
            limit
        );
        self.request(Method::GET, &path, None).await
    }

    #[instrument(skip(self, intent), fields(symbol = %intent.symbol, side = %intent.side))]
    async fn submit_limit_order(&self, intent: &OrderIntent) -> Result<OrderId, GatewayError> {
        debug!(price = %intent.price, size = %intent.size, "Submitting post-only limit order");

        #[derive(Debug, Deserialize)]
        struct Placed {
            id: OrderId,
        }

        let body = json!({
            "market": intent.symbol,
            "side": intent.side,
            "type": "limit",
            "price": intent.price.to_string(),
            "size": intent.size.to_string(),
            "postOnly": true,
        });

        let placed: Placed = self.request(Method::POST, "/api/orders", Some(body)).await?;
        Ok(placed.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::types::OrderSide;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, header_exists, method as http_method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn gateway_for(server: &MockServer) -> RestGateway {
        RestGateway::new(&VenueConfig {
            api_key: "key".to_string(),
            secret_key: "secret".to_string(),
            subaccount: Some("recon".to_string()),
            base_url: server.uri(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_ticker_parses_and_signs() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/markets/BTC-PERP/ticker"))
            .and(header_exists("X-API-KEY"))
            .and(header_exists("X-SIGNATURE"))
            .and(header_exists("X-SUBACCOUNT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "result": { "bid": "10", "ask": "10.1" }
            })))
            .mount(&server)
            .await;

        let ticker = gateway_for(&server)
            .await
            .fetch_ticker("BTC-PERP")
            .await
            .unwrap();
        assert_eq!(ticker.bid, dec!(10));
        assert_eq!(ticker.ask, dec!(10.1));
    }

    #[tokio::test]
    async fn test_429_maps_to_transient() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/positions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .await
            .fetch_positions()
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_5xx_maps_to_transient() {
        let server = MockServer::start().await;
        Mock::given(http_method("DELETE"))
            .and(path("/api/orders"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .await
            .cancel_all_orders()
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable { status: 503 }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_venue_rejection_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path("/api/orders"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "success": false,
                "error": "Post-only order would cross"
            })))
            .mount(&server)
            .await;

        let intent = OrderIntent {
            symbol: "BTC-PERP".to_string(),
            side: OrderSide::Buy,
            price: dec!(10),
            size: dec!(1),
        };
        let err = gateway_for(&server)
            .await
            .submit_limit_order(&intent)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_submit_sends_post_only_payload() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path("/api/orders"))
            .and(body_partial_json(serde_json::json!({
                "market": "ETH-PERP",
                "side": "sell",
                "type": "limit",
                "postOnly": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "result": { "id": "12345" }
            })))
            .mount(&server)
            .await;

        let intent = OrderIntent {
            symbol: "ETH-PERP".to_string(),
            side: OrderSide::Sell,
            price: dec!(2000.5),
            size: dec!(0.25),
        };
        let id = gateway_for(&server)
            .await
            .submit_limit_order(&intent)
            .await
            .unwrap();
        assert_eq!(id, OrderId("12345".to_string()));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .await
            .fetch_positions()
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
        assert!(!err.is_transient());
    }
}
