use thiserror::Error;

#[derive(Error, Debug)]
pub enum RobotError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Keyword table error: {0}")]
    Keyword(String),

    #[error("{backend} backend error: {message}")]
    Backend { backend: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Signature mismatch")]
    Signature,

    #[error("Server error: {0}")]
    Server(String),
}

impl RobotError {
    pub fn backend(backend: &str, message: impl Into<String>) -> Self {
        RobotError::Backend {
            backend: backend.to_string(),
            message: message.into(),
        }
    }
}
