use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::ChatBackend;
use crate::error::RobotError;
use crate::text::ascii_alnum_prefix;

const DEFAULT_ENDPOINT: &str = "http://openapi.turingapi.com/openapi/api/v2";
const BACKEND_NAME: &str = "tuling";
const MAX_USER_ID_LEN: usize = 32;
/// Intent codes below this value are API errors (bad key, quota, ...).
const MIN_SUCCESS_CODE: i64 = 10000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TulingOptions {
    pub api_key: String,
}

pub struct TulingBackend {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl TulingBackend {
    pub fn new(options: &TulingOptions, timeout: Duration) -> Result<Self, RobotError> {
        Self::with_endpoint(options, timeout, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(
        options: &TulingOptions,
        timeout: Duration,
        endpoint: &str,
    ) -> Result<Self, RobotError> {
        Ok(TulingBackend {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .no_proxy()
                .build()?,
            api_key: options.api_key.clone(),
            endpoint: endpoint.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TulingResponse {
    intent: TulingIntent,
    #[serde(default)]
    results: Vec<TulingResult>,
}

#[derive(Debug, Deserialize)]
struct TulingIntent {
    code: i64,
}

#[derive(Debug, Deserialize)]
struct TulingResult {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    values: serde_json::Value,
}

fn tuling_user_id(user_id: &str) -> String {
    let id = ascii_alnum_prefix(user_id, MAX_USER_ID_LEN);
    if id.is_empty() {
        "anonymous".to_string()
    } else {
        id
    }
}

fn extract_reply(response: TulingResponse) -> Result<String, RobotError> {
    if response.intent.code < MIN_SUCCESS_CODE {
        let detail = response
            .results
            .iter()
            .find_map(|r| r.values.get("text").and_then(|v| v.as_str()))
            .unwrap_or("request rejected");
        return Err(RobotError::backend(
            BACKEND_NAME,
            format!("code {}: {detail}", response.intent.code),
        ));
    }

    let parts: Vec<&str> = response
        .results
        .iter()
        .filter_map(|r| match r.result_type.as_str() {
            "text" => r.values.get("text").and_then(|v| v.as_str()),
            "url" => r.values.get("url").and_then(|v| v.as_str()),
            _ => None,
        })
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(RobotError::backend(BACKEND_NAME, "no text in response"));
    }
    Ok(parts.join("\n"))
}

#[async_trait]
impl ChatBackend for TulingBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn reply(&self, user_id: &str, text: &str) -> Result<String, RobotError> {
        let body = json!({
            "reqType": 0,
            "perception": {"inputText": {"text": text}},
            "userInfo": {"apiKey": self.api_key, "userId": tuling_user_id(user_id)},
        });
        let response = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RobotError::backend(
                BACKEND_NAME,
                format!("HTTP {status}: {text}"),
            ));
        }
        let text = response.text().await?;
        let parsed: TulingResponse = serde_json::from_str(&text).map_err(|e| {
            RobotError::backend(
                BACKEND_NAME,
                format!("Failed to parse response: {e}\nBody: {text}"),
            )
        })?;
        extract_reply(parsed)
    }
}
