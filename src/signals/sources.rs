//! # Built-in Signal Sources
//!
//! Four HTTP providers covering the first four attention layers: social
//! mentions (cultural noise), search interest, marketplace listings, and media
//! coverage. Each source runs in one of two modes. With an API key configured
//! it calls the provider and maps transport, status, and payload failures to
//! the corresponding [`SignalError`] variants. Without a key it synthesizes a
//! deterministic observation and marks it as mock, so the rest of the pipeline
//! can run end to end against realistic-looking data.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::errors::SignalError;
use crate::signals::{RawObservation, SignalSource};
use crate::types::{AttentionLayer, UpdateFrequency};

//================================================================================================//
//                                         CONSTANTS                                              //
//================================================================================================//

const SOCIAL_PULSE_ENDPOINT: &str = "https://api.socialpulse.io/v1/mentions";
const SEARCH_TRENDS_ENDPOINT: &str = "https://api.trendscope.dev/v1/interest";
const MARKET_LISTINGS_ENDPOINT: &str = "https://api.listingradar.io/v1/listings";
const MEDIA_COVERAGE_ENDPOINT: &str = "https://api.pressfeed.io/v1/articles";

const USER_AGENT: &str = concat!("trend-intel/", env!("CARGO_PKG_VERSION"));

//================================================================================================//
//                                       SHARED PLUMBING                                          //
//================================================================================================//

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .expect("Failed to build HTTP client")
}

/// GET the provider endpoint for a keyword and return the raw JSON body.
async fn fetch_payload(
    client: &Client,
    source: &'static str,
    endpoint: &str,
    keyword: &str,
    api_key: &str,
) -> Result<Value, SignalError> {
    let response = client
        .get(endpoint)
        .query(&[("q", keyword)])
        .bearer_auth(api_key)
        .send()
        .await
        .map_err(|e| SignalError::Transport { source: source.to_string(), inner: e })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SignalError::SourceRejected {
            source_name: source.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| SignalError::Transport { source: source.to_string(), inner: e })?;
    serde_json::from_str(&body).map_err(|e| SignalError::MalformedPayload {
        source_name: source.to_string(),
        details: format!("{e} (body starts: {:.80})", body),
    })
}

fn parse_reply<T: for<'de> Deserialize<'de>>(
    source: &'static str,
    payload: &Value,
) -> Result<T, SignalError> {
    serde_json::from_value(payload.clone()).map_err(|e| SignalError::MalformedPayload {
        source_name: source.to_string(),
        details: e.to_string(),
    })
}

/// Deterministic stand-in value for keyless mode. Stable within an hour for a
/// given (source, keyword) pair, wobbling hour to hour so derived velocity and
/// deviation metrics see movement.
fn synthetic_value(salt: u64, keyword: &str, at: DateTime<Utc>) -> f64 {
    let mut acc = salt;
    for byte in keyword.bytes() {
        acc = acc.wrapping_mul(31).wrapping_add(byte as u64);
    }
    let hour = (at.timestamp() / 3600) as u64;
    let wobble = acc.wrapping_add(hour).wrapping_mul(2_654_435_761) % 1000;
    20.0 + (acc % 600) as f64 / 10.0 + wobble as f64 / 25.0
}

fn mock_observation(source: &'static str, salt: u64, keyword: &str) -> RawObservation {
    let now = Utc::now();
    let value = synthetic_value(salt, keyword, now);
    RawObservation {
        value,
        payload: json!({ "mock": true, "source": source, "keyword": keyword, "value": value }),
        is_mock: true,
    }
}

//================================================================================================//
//                                   LAYER 1: SOCIAL MENTIONS                                     //
//================================================================================================//

#[derive(Debug, Clone, Deserialize)]
struct SocialPulseReply {
    #[serde(rename = "mentionCount")]
    mention_count: f64,
    #[serde(rename = "engagementScore", default)]
    engagement_score: f64,
}

/// Social mention volume weighted by engagement.
#[derive(Debug)]
pub struct SocialPulseSource {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl SocialPulseSource {
    pub fn new(timeout: Duration, api_key: Option<String>, endpoint: Option<String>) -> Self {
        Self {
            client: build_client(timeout),
            api_key,
            endpoint: endpoint.unwrap_or_else(|| SOCIAL_PULSE_ENDPOINT.to_string()),
        }
    }
}

#[async_trait]
impl SignalSource for SocialPulseSource {
    fn name(&self) -> &'static str {
        "social_pulse"
    }

    fn layer(&self) -> AttentionLayer {
        AttentionLayer::CulturalNoise
    }

    fn update_frequency(&self) -> UpdateFrequency {
        UpdateFrequency::Hourly
    }

    async fn fetch(&self, keyword: &str) -> Result<RawObservation, SignalError> {
        let Some(api_key) = &self.api_key else {
            return Ok(mock_observation(self.name(), 0x5053, keyword));
        };
        let payload = fetch_payload(&self.client, self.name(), &self.endpoint, keyword, api_key).await?;
        let reply: SocialPulseReply = parse_reply(self.name(), &payload)?;
        Ok(RawObservation {
            value: reply.mention_count * (1.0 + reply.engagement_score),
            payload,
            is_mock: false,
        })
    }
}

//================================================================================================//
//                                   LAYER 2: SEARCH INTEREST                                     //
//================================================================================================//

#[derive(Debug, Clone, Deserialize)]
struct SearchTrendsReply {
    interest: f64,
}

/// Relative search interest index.
#[derive(Debug)]
pub struct SearchTrendsSource {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl SearchTrendsSource {
    pub fn new(timeout: Duration, api_key: Option<String>, endpoint: Option<String>) -> Self {
        Self {
            client: build_client(timeout),
            api_key,
            endpoint: endpoint.unwrap_or_else(|| SEARCH_TRENDS_ENDPOINT.to_string()),
        }
    }
}

#[async_trait]
impl SignalSource for SearchTrendsSource {
    fn name(&self) -> &'static str {
        "search_trends"
    }

    fn layer(&self) -> AttentionLayer {
        AttentionLayer::SearchIntent
    }

    fn update_frequency(&self) -> UpdateFrequency {
        UpdateFrequency::Hourly
    }

    async fn fetch(&self, keyword: &str) -> Result<RawObservation, SignalError> {
        let Some(api_key) = &self.api_key else {
            return Ok(mock_observation(self.name(), 0x5354, keyword));
        };
        let payload = fetch_payload(&self.client, self.name(), &self.endpoint, keyword, api_key).await?;
        let reply: SearchTrendsReply = parse_reply(self.name(), &payload)?;
        Ok(RawObservation { value: reply.interest, payload, is_mock: false })
    }
}

//================================================================================================//
//                                 LAYER 3: MARKETPLACE LISTINGS                                  //
//================================================================================================//

#[derive(Debug, Clone, Deserialize)]
struct MarketListingsReply {
    #[serde(rename = "activeListings")]
    active_listings: f64,
}

/// Active marketplace listing volume for a keyword.
#[derive(Debug)]
pub struct MarketListingsSource {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl MarketListingsSource {
    pub fn new(timeout: Duration, api_key: Option<String>, endpoint: Option<String>) -> Self {
        Self {
            client: build_client(timeout),
            api_key,
            endpoint: endpoint.unwrap_or_else(|| MARKET_LISTINGS_ENDPOINT.to_string()),
        }
    }
}

#[async_trait]
impl SignalSource for MarketListingsSource {
    fn name(&self) -> &'static str {
        "market_listings"
    }

    fn layer(&self) -> AttentionLayer {
        AttentionLayer::Marketplace
    }

    fn update_frequency(&self) -> UpdateFrequency {
        UpdateFrequency::Daily
    }

    async fn fetch(&self, keyword: &str) -> Result<RawObservation, SignalError> {
        let Some(api_key) = &self.api_key else {
            return Ok(mock_observation(self.name(), 0x4d4c, keyword));
        };
        let payload = fetch_payload(&self.client, self.name(), &self.endpoint, keyword, api_key).await?;
        let reply: MarketListingsReply = parse_reply(self.name(), &payload)?;
        // Listing count is the attention proxy; the full body stays in the payload.
        Ok(RawObservation { value: reply.active_listings, payload, is_mock: false })
    }
}

//================================================================================================//
//                                   LAYER 4: MEDIA COVERAGE                                      //
//================================================================================================//

#[derive(Debug, Clone, Deserialize)]
struct MediaCoverageReply {
    articles: f64,
}

/// Published article count mentioning the keyword.
#[derive(Debug)]
pub struct MediaCoverageSource {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl MediaCoverageSource {
    pub fn new(timeout: Duration, api_key: Option<String>, endpoint: Option<String>) -> Self {
        Self {
            client: build_client(timeout),
            api_key,
            endpoint: endpoint.unwrap_or_else(|| MEDIA_COVERAGE_ENDPOINT.to_string()),
        }
    }
}

#[async_trait]
impl SignalSource for MediaCoverageSource {
    fn name(&self) -> &'static str {
        "media_coverage"
    }

    fn layer(&self) -> AttentionLayer {
        AttentionLayer::MediaAmplification
    }

    fn update_frequency(&self) -> UpdateFrequency {
        UpdateFrequency::Daily
    }

    async fn fetch(&self, keyword: &str) -> Result<RawObservation, SignalError> {
        let Some(api_key) = &self.api_key else {
            return Ok(mock_observation(self.name(), 0x4d43, keyword));
        };
        let payload = fetch_payload(&self.client, self.name(), &self.endpoint, keyword, api_key).await?;
        let reply: MediaCoverageReply = parse_reply(self.name(), &payload)?;
        Ok(RawObservation { value: reply.articles, payload, is_mock: false })
    }
}

//================================================================================================//
//                                         ASSEMBLY                                               //
//================================================================================================//

/// Build the four built-in sources from configuration. Keys and endpoint
/// overrides are looked up per source name; a source without a key runs in
/// mock mode.
pub fn builtin_sources(config: &Config) -> Vec<Arc<dyn SignalSource>> {
    let timeout = Duration::from_secs(config.signals.http_timeout_seconds);
    vec![
        Arc::new(SocialPulseSource::new(
            timeout,
            config.api_key("social_pulse"),
            config.endpoint_override("social_pulse"),
        )),
        Arc::new(SearchTrendsSource::new(
            timeout,
            config.api_key("search_trends"),
            config.endpoint_override("search_trends"),
        )),
        Arc::new(MarketListingsSource::new(
            timeout,
            config.api_key("market_listings"),
            config.endpoint_override("market_listings"),
        )),
        Arc::new(MediaCoverageSource::new(
            timeout,
            config.api_key("media_coverage"),
            config.endpoint_override("media_coverage"),
        )),
    ]
}
