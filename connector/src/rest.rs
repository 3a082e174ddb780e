use std::time::Duration;

use chrono::Utc;
use common::{PairInfo, RangeFilter};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use sha2::Sha256;

use crate::types::{BinanceOrder, ExchangeInfoResponse, ExchangeInfoSymbol, OrderAck};
use crate::{BinanceCredentials, ConnectorError};

type HmacSha256 = Hmac<Sha256>;

const HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RECV_WINDOW_MS: i64 = 5_000;

/// Thin Binance spot REST client: exchange metadata, order placement and
/// order lookup. Signing follows the standard query-string HMAC scheme.
pub struct RestClient {
    http: Client,
    endpoint: String,
    credentials: Option<BinanceCredentials>,
    recv_window: i64,
}

impl RestClient {
    pub fn new(endpoint: impl Into<String>, credentials: Option<BinanceCredentials>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        RestClient {
            http,
            endpoint: endpoint.into(),
            credentials,
            recv_window: DEFAULT_RECV_WINDOW_MS,
        }
    }

    pub async fn fetch_pair_info(&self, base: &str, quote: &str) -> Result<PairInfo, ConnectorError> {
        let symbol = format!("{base}{quote}");
        let url = format!("{}/api/v3/exchangeInfo", self.endpoint);
        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", symbol.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            // binance answers 400 for symbols it has never heard of
            return Err(ConnectorError::UnknownPair(symbol));
        }
        let payload: ExchangeInfoResponse = resp.json().await?;
        let info = payload
            .symbols
            .into_iter()
            .find(|entry| entry.symbol.eq_ignore_ascii_case(&symbol))
            .ok_or(ConnectorError::UnknownPair(symbol))?;
        build_pair_info(info)
    }

    pub async fn place_order(
        &self,
        symbol: &str,
        side: &str,
        order_type: &str,
        quantity: f64,
        price: Option<f64>,
        client_order_id: &str,
    ) -> Result<OrderAck, ConnectorError> {
        let mut params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), side.to_string()),
            ("type".to_string(), order_type.to_string()),
            ("quantity".to_string(), quantity.to_string()),
            ("newClientOrderId".to_string(), client_order_id.to_string()),
        ];
        if let Some(price) = price {
            params.push(("price".to_string(), price.to_string()));
            params.push(("timeInForce".to_string(), "GTC".to_string()));
        }
        self.signed_request(Method::POST, "/api/v3/order", params)
            .await
    }

    pub async fn query_order(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<BinanceOrder, ConnectorError> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        self.signed_request(Method::GET, "/api/v3/order", params)
            .await
    }

    /// Account-wide open orders, one call per poll tick.
    pub async fn open_orders(&self) -> Result<Vec<BinanceOrder>, ConnectorError> {
        self.signed_request(Method::GET, "/api/v3/openOrders", Vec::new())
            .await
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ConnectorError> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        let _: serde_json::Value = self
            .signed_request(Method::DELETE, "/api/v3/order", params)
            .await?;
        Ok(())
    }

    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(String, String)>,
    ) -> Result<T, ConnectorError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(ConnectorError::MissingCredentials)?;

        params.push(("timestamp".to_string(), Utc::now().timestamp_millis().to_string()));
        params.push(("recvWindow".to_string(), self.recv_window.to_string()));
        let query = serde_urlencoded::to_string(&params)
            .map_err(|_| ConnectorError::InvalidPayload("encode params"))?;
        let signature = sign_payload(&creds.api_secret, &query);

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&creds.api_key)
                .map_err(|_| ConnectorError::InvalidPayload("api key"))?,
        );

        let url = format!("{}{path}", self.endpoint);
        let request = if method == Method::POST {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            );
            self.http
                .post(&url)
                .headers(headers)
                .body(format!("{query}&signature={signature}"))
        } else {
            self.http
                .request(method, format!("{url}?{query}&signature={signature}"))
                .headers(headers)
        };

        let resp = request.send().await?;
        let status = resp.status();
        let payload = resp.text().await?;
        if !status.is_success() {
            return Err(ConnectorError::HttpStatus {
                code: status.as_u16(),
                body: payload,
            });
        }
        serde_json::from_str(&payload).map_err(|_| ConnectorError::InvalidPayload("decode response"))
    }
}

fn sign_payload(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn build_pair_info(info: ExchangeInfoSymbol) -> Result<PairInfo, ConnectorError> {
    let mut pair = PairInfo {
        base_price_precision: info.base_asset_precision,
        quote_price_precision: info.quote_asset_precision,
        ..PairInfo::default()
    };
    for filter in info.filters {
        match filter.filter_type.as_str() {
            "PRICE_FILTER" => {
                pair.price = RangeFilter {
                    min: parse_filter_value(filter.min_price)?,
                    max: parse_filter_value(filter.max_price)?,
                    tick: parse_filter_value(filter.tick_size)?,
                };
            }
            "LOT_SIZE" => {
                pair.lot = RangeFilter {
                    min: parse_filter_value(filter.min_qty)?,
                    max: parse_filter_value(filter.max_qty)?,
                    tick: parse_filter_value(filter.step_size)?,
                };
            }
            "MIN_NOTIONAL" | "NOTIONAL" => {
                pair.min_quote_volume = parse_filter_value(filter.min_notional)?;
            }
            _ => {}
        }
    }
    if pair.price.tick <= 0.0 || pair.lot.tick <= 0.0 {
        return Err(ConnectorError::InvalidPayload("symbol filters missing"));
    }
    Ok(pair)
}

fn parse_filter_value(raw: Option<String>) -> Result<f64, ConnectorError> {
    raw.as_deref()
        .unwrap_or("0")
        .parse::<f64>()
        .map_err(|_| ConnectorError::InvalidPayload("numeric filter field"))
}
