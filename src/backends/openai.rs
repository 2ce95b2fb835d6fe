use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{with_default_scheme, ChatBackend};
use crate::error::RobotError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const BACKEND_NAME: &str = "openai";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenAiOptions {
    pub api_key: String,
    /// `host[:port]` or full URL of an OpenAI-compatible endpoint.
    pub base_domain: Option<String>,
    pub proxy: Option<String>,
}

pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
    chat_url: String,
}

fn chat_url_for(base_domain: Option<&str>) -> String {
    let base = match base_domain {
        Some(domain) => {
            let base = with_default_scheme(domain.trim(), "https");
            let base = base.trim_end_matches('/');
            if base.ends_with("/v1") {
                base.to_string()
            } else {
                format!("{base}/v1")
            }
        }
        None => DEFAULT_BASE_URL.to_string(),
    };
    format!("{base}/chat/completions")
}

impl OpenAiBackend {
    pub fn new(options: &OpenAiOptions, timeout: Duration) -> Result<Self, RobotError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        // Only OPENAI_PROXY routes this client through a proxy.
        builder = match options.proxy {
            Some(ref proxy) => {
                builder.proxy(reqwest::Proxy::all(with_default_scheme(proxy, "http"))?)
            }
            None => builder.no_proxy(),
        };
        Ok(OpenAiBackend {
            http: builder.build()?,
            api_key: options.api_key.clone(),
            model: DEFAULT_MODEL.to_string(),
            chat_url: chat_url_for(options.base_domain.as_deref()),
        })
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }
}

#[derive(Debug, Deserialize)]
struct OaiResponse {
    choices: Vec<OaiChoice>,
}

#[derive(Debug, Deserialize)]
struct OaiChoice {
    message: OaiMessage,
}

#[derive(Debug, Deserialize)]
struct OaiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaiErrorResponse {
    error: OaiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OaiErrorDetail {
    message: String,
}

fn first_choice_text(response: OaiResponse) -> Result<String, RobotError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| RobotError::backend(BACKEND_NAME, "empty completion"))
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn reply(&self, user_id: &str, text: &str) -> Result<String, RobotError> {
        let body = json!({
            "model": self.model,
            "user": user_id,
            "messages": [{"role": "user", "content": text}],
        });

        let response = self
            .http
            .post(&self.chat_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("openai responded with HTTP {status}");

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<OaiErrorResponse>(&text) {
                return Err(RobotError::backend(BACKEND_NAME, err.error.message));
            }
            return Err(RobotError::backend(
                BACKEND_NAME,
                format!("HTTP {status}: {text}"),
            ));
        }

        let parsed: OaiResponse = serde_json::from_str(&text).map_err(|e| {
            RobotError::backend(
                BACKEND_NAME,
                format!("Failed to parse response: {e}\nBody: {text}"),
            )
        })?;
        first_choice_text(parsed)
    }
}
