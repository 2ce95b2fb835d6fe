pub mod openai;
pub mod tuling;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::info;

use crate::error::RobotError;

pub use openai::{OpenAiBackend, OpenAiOptions};
pub use tuling::{TulingBackend, TulingOptions};

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_DOMAIN: &str = "OPENAI_BASE_DOMAIN";
pub const ENV_OPENAI_PROXY: &str = "OPENAI_PROXY";
pub const ENV_TULING_API_KEY: &str = "TULING_API_KEY";

/// A conversational service that can answer one message.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn reply(&self, user_id: &str, text: &str) -> Result<String, RobotError>;
}

/// Which backends are enabled, resolved once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendOptions {
    pub openai: Option<OpenAiOptions>,
    pub tuling: Option<TulingOptions>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl BackendOptions {
    pub fn from_env() -> Result<Self, RobotError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve options through `lookup`; invalid addresses are rejected here so
    /// a bad value never reaches the first request.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RobotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai = match non_empty(lookup(ENV_OPENAI_API_KEY)) {
            Some(api_key) => {
                let base_domain = non_empty(lookup(ENV_OPENAI_BASE_DOMAIN));
                if let Some(ref domain) = base_domain {
                    if !validate_address(domain) {
                        return Err(RobotError::Config(format!(
                            "{ENV_OPENAI_BASE_DOMAIN} is not valid: {domain}"
                        )));
                    }
                }
                let proxy = non_empty(lookup(ENV_OPENAI_PROXY));
                if let Some(ref proxy) = proxy {
                    if !validate_address(proxy) {
                        return Err(RobotError::Config(format!(
                            "{ENV_OPENAI_PROXY} is not valid: {proxy}"
                        )));
                    }
                }
                Some(OpenAiOptions {
                    api_key,
                    base_domain,
                    proxy,
                })
            }
            None => None,
        };

        let tuling = non_empty(lookup(ENV_TULING_API_KEY)).map(|api_key| TulingOptions { api_key });

        Ok(BackendOptions { openai, tuling })
    }
}

/// Prefix a scheme onto bare `host[:port]` values.
pub(crate) fn with_default_scheme(address: &str, scheme: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("{scheme}://{address}")
    }
}

/// Accepts `host[:port]` or an `http`/`https`/`socks5`/`socks5h` URL with a host.
pub fn validate_address(address: &str) -> bool {
    let address = address.trim();
    if address.is_empty() || address.chars().any(char::is_whitespace) {
        return false;
    }
    let Ok(url) = Url::parse(&with_default_scheme(address, "http")) else {
        return false;
    };
    let scheme_ok = matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h");
    let host_ok = url.host_str().map(|h| !h.is_empty()).unwrap_or(false);
    scheme_ok && host_ok && url.query().is_none() && url.fragment().is_none()
}

/// Build the enabled backends in fallback order: LLM first, then rule-based.
pub fn build_backends(
    options: &BackendOptions,
    timeout: Duration,
) -> Result<Vec<Arc<dyn ChatBackend>>, RobotError> {
    let mut backends: Vec<Arc<dyn ChatBackend>> = Vec::new();
    if let Some(ref openai) = options.openai {
        backends.push(Arc::new(OpenAiBackend::new(openai, timeout)?));
        info!(
            "OpenAI backend enabled (base domain: {}, proxy: {})",
            openai.base_domain.as_deref().unwrap_or("default"),
            if openai.proxy.is_some() { "on" } else { "off" }
        );
    }
    if let Some(ref tuling) = options.tuling {
        backends.push(Arc::new(TulingBackend::new(tuling, timeout)?));
        info!("Tuling backend enabled");
    }
    if backends.is_empty() {
        info!("No chat backend configured; replying from the keyword table only");
    }
    Ok(backends)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_no_credentials_disables_all_backends() {
        let options = BackendOptions::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(options, BackendOptions::default());
        let backends = build_backends(&options, Duration::from_secs(1)).unwrap();
        assert!(backends.is_empty());
    }

    #[test]
    fn test_openai_key_unset_never_builds_openai() {
        let options = BackendOptions::from_lookup(lookup_from(&[
            (ENV_TULING_API_KEY, "tl-key"),
            (ENV_OPENAI_BASE_DOMAIN, "not a domain"),
        ]))
        .unwrap();
        assert!(options.openai.is_none());
        let backends = build_backends(&options, Duration::from_secs(1)).unwrap();
        let names: Vec<&str> = backends.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["tuling"]);
    }

    #[test]
    fn test_blank_key_counts_as_unset() {
        let options =
            BackendOptions::from_lookup(lookup_from(&[(ENV_OPENAI_API_KEY, "   ")])).unwrap();
        assert!(options.openai.is_none());
    }

    #[test]
    fn test_invalid_base_domain_rejected() {
        let err = BackendOptions::from_lookup(lookup_from(&[
            (ENV_OPENAI_API_KEY, "sk-test"),
            (ENV_OPENAI_BASE_DOMAIN, "bad domain"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("OPENAI_BASE_DOMAIN is not valid"));
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let err = BackendOptions::from_lookup(lookup_from(&[
            (ENV_OPENAI_API_KEY, "sk-test"),
            (ENV_OPENAI_PROXY, "ftp://proxy.local:21"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("OPENAI_PROXY is not valid"));
    }

    #[test]
    fn test_full_options_build_in_fallback_order() {
        let options = BackendOptions::from_lookup(lookup_from(&[
            (ENV_OPENAI_API_KEY, "sk-test"),
            (ENV_OPENAI_BASE_DOMAIN, "api.example.com"),
            (ENV_OPENAI_PROXY, "127.0.0.1:7890"),
            (ENV_TULING_API_KEY, "tl-key"),
        ]))
        .unwrap();
        let openai = options.openai.clone().unwrap();
        assert_eq!(openai.base_domain.as_deref(), Some("api.example.com"));
        assert_eq!(openai.proxy.as_deref(), Some("127.0.0.1:7890"));

        let backends = build_backends(&options, Duration::from_secs(1)).unwrap();
        let names: Vec<&str> = backends.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["openai", "tuling"]);
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("api.openai.com"));
        assert!(validate_address("api.openai.com:443"));
        assert!(validate_address("127.0.0.1:7890"));
        assert!(validate_address("http://127.0.0.1:7890"));
        assert!(validate_address("https://proxy.example.com"));
        assert!(validate_address("socks5://127.0.0.1:1080"));

        assert!(!validate_address(""));
        assert!(!validate_address("   "));
        assert!(!validate_address("bad domain"));
        assert!(!validate_address("ftp://example.com"));
        assert!(!validate_address("http://"));
        assert!(!validate_address("example.com:notaport"));
        assert!(!validate_address("example.com?x=1"));
    }

    #[test]
    fn test_with_default_scheme() {
        assert_eq!(
            with_default_scheme("example.com", "https"),
            "https://example.com"
        );
        assert_eq!(
            with_default_scheme("http://example.com", "https"),
            "http://example.com"
        );
    }
}
