//! Canned replies looked up before any chat backend is consulted.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::RobotError;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pic_url: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KeywordReply {
    Text { content: String },
    News { articles: Vec<Article> },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    #[default]
    Exact,
    Contains,
}

#[derive(Debug, Deserialize)]
struct KeywordRule {
    keys: Vec<String>,
    #[serde(default, rename = "match")]
    match_kind: MatchKind,
    reply: KeywordReply,
}

#[derive(Debug, Deserialize)]
struct KeywordPayload {
    #[serde(default)]
    subscribe: Option<KeywordReply>,
    #[serde(default)]
    keywords: Vec<KeywordRule>,
}

#[derive(Debug, Default)]
pub struct KeywordTable {
    exact: HashMap<String, KeywordReply>,
    contains: Vec<(String, KeywordReply)>,
    subscribe: Option<KeywordReply>,
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

impl KeywordTable {
    pub fn from_json(bytes: &[u8]) -> Result<Self, RobotError> {
        let payload: KeywordPayload = serde_json::from_slice(bytes)
            .map_err(|e| RobotError::Keyword(format!("invalid keyword payload: {e}")))?;

        let mut table = KeywordTable {
            subscribe: payload.subscribe,
            ..Default::default()
        };
        for rule in payload.keywords {
            if rule.keys.is_empty() {
                return Err(RobotError::Keyword("keyword rule without keys".into()));
            }
            if let KeywordReply::News { articles } = &rule.reply {
                if articles.is_empty() {
                    return Err(RobotError::Keyword(format!(
                        "news reply for {:?} has no articles",
                        rule.keys
                    )));
                }
            }
            for key in rule.keys {
                let key = normalize_key(&key);
                if key.is_empty() {
                    return Err(RobotError::Keyword("empty keyword".into()));
                }
                match rule.match_kind {
                    MatchKind::Exact => {
                        table.exact.insert(key, rule.reply.clone());
                    }
                    MatchKind::Contains => table.contains.push((key, rule.reply.clone())),
                }
            }
        }
        Ok(table)
    }

    /// Exact keys win over substring rules; substring rules apply in file order.
    pub fn lookup(&self, text: &str) -> Option<&KeywordReply> {
        let needle = normalize_key(text);
        if needle.is_empty() {
            return None;
        }
        if let Some(reply) = self.exact.get(&needle) {
            return Some(reply);
        }
        self.contains
            .iter()
            .find(|(key, _)| needle.contains(key.as_str()))
            .map(|(_, reply)| reply)
    }

    pub fn subscribe_reply(&self) -> Option<&KeywordReply> {
        self.subscribe.as_ref()
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.contains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
