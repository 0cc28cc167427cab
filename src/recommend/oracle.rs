//! Estimation oracle
//!
//! The oracle is an external model asked for a `{week, day, hour}` estimate
//! of a ticket given its tracker key and description. [`HttpOracle`] talks
//! to any OpenAI-compatible chat-completions endpoint and requests a
//! strict JSON-schema response.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::estimate::hours_from_parts;

use super::error::OracleError;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "google/gemini-2.5-flash-lite";

/// Largest accepted `dayEstimate`
pub const MAX_DAY_ESTIMATE: i64 = 7;
/// Largest accepted `hourEstimate`
pub const MAX_HOUR_ESTIMATE: i64 = 8;

const SYSTEM_PROMPT: &str = "You estimate the work required for a Jira ticket. \
You will be given the ticket key and its description. \
Answer with a JSON object with the keys weekEstimate (minimum 0), \
dayEstimate (0 to 7) and hourEstimate (0 to 8).";

/// Estimate suggested by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedEstimate {
    pub week_estimate: i64,
    pub day_estimate: i64,
    pub hour_estimate: i64,
}

impl RecommendedEstimate {
    /// Total hours, five eight-hour days to a week
    ///
    /// `None` if the total overflows.
    pub fn hours(&self) -> Option<i64> {
        hours_from_parts(self.week_estimate, self.day_estimate, self.hour_estimate)
    }

    /// Total hours of an estimate within the requested bounds
    ///
    /// Weeks must be non-negative, days within `0..=7` and hours within
    /// `0..=8`. Anything else is a malformed answer.
    pub fn checked_hours(&self) -> Result<i64, OracleError> {
        if self.week_estimate < 0
            || !(0..=MAX_DAY_ESTIMATE).contains(&self.day_estimate)
            || !(0..=MAX_HOUR_ESTIMATE).contains(&self.hour_estimate)
        {
            return Err(OracleError::Malformed(format!(
                "estimate out of range: {}",
                self
            )));
        }
        self.hours()
            .ok_or_else(|| OracleError::Malformed(format!("estimate too large: {}", self)))
    }
}

impl fmt::Display for RecommendedEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}w {}d {}h",
            self.week_estimate, self.day_estimate, self.hour_estimate
        )
    }
}

/// Source of recommended estimates
pub trait Oracle: Send + Sync + 'static {
    /// Ask for an estimate, giving up after `timeout`
    fn estimate(
        &self,
        external_key: &str,
        description: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<RecommendedEstimate, OracleError>> + Send;
}

/// Connection settings for [`HttpOracle`]
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Base URL; `/chat/completions` is appended
    pub base_url: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl OracleConfig {
    /// Read `OPENROUTER_BASE_URL`, `OPENROUTER_API_KEY` and `ORACLE_MODEL`
    ///
    /// Unset or empty variables keep their defaults.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            base_url: var("OPENROUTER_BASE_URL").unwrap_or(defaults.base_url),
            api_key: var("OPENROUTER_API_KEY"),
            model: var("ORACLE_MODEL").unwrap_or(defaults.model),
        }
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// True when an API key is present
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Chat-completions oracle client
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    config: OracleConfig,
}

impl HttpOracle {
    /// Build a client for `config`
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, config })
    }

    /// Connection settings in use
    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    fn request_body(&self, external_key: &str, description: &str) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!(
                        "Ticket key: {}.\nTicket description: {}",
                        external_key, description
                    ),
                },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "ticket_estimate",
                    "description": "Estimate for the required work for a Jira ticket.",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "weekEstimate": { "type": "integer", "minimum": 0 },
                            "dayEstimate": {
                                "type": "integer",
                                "minimum": 0,
                                "maximum": MAX_DAY_ESTIMATE,
                            },
                            "hourEstimate": {
                                "type": "integer",
                                "minimum": 0,
                                "maximum": MAX_HOUR_ESTIMATE,
                            },
                        },
                        "required": ["weekEstimate", "dayEstimate", "hourEstimate"],
                        "additionalProperties": false,
                    },
                },
            },
        })
    }
}

/// Parse the assistant message into an estimate
///
/// Tolerates a Markdown code fence around the JSON. Values outside the
/// schema bounds are rejected.
fn parse_content(content: &str) -> Result<RecommendedEstimate, OracleError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    let estimate: RecommendedEstimate =
        serde_json::from_str(body.trim()).map_err(|e| OracleError::Malformed(e.to_string()))?;
    estimate.checked_hours()?;
    Ok(estimate)
}

impl Oracle for HttpOracle {
    async fn estimate(
        &self,
        external_key: &str,
        description: &str,
        timeout: Duration,
    ) -> Result<RecommendedEstimate, OracleError> {
        let mut request = self
            .client
            .post(self.config.completions_url())
            .timeout(timeout)
            .json(&self.request_body(external_key, description));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OracleError::Malformed("no choices in response".to_string()))?;

        let estimate = parse_content(&content)?;
        tracing::debug!(external_key, %estimate, "Oracle estimate received");
        Ok(estimate)
    }
}
