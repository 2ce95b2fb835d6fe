use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backends::ChatBackend;
use crate::error::RobotError;
use crate::keyword::KeywordTable;
use crate::wechat::{
    verify_signature, CallbackQuery, InboundMessage, MessageType, OutboundReply, ReplyBody,
    EMPTY_REPLY,
};

pub const DEFAULT_REPLY: &str = "抱歉，我暂时无法回答这个问题，换个话题试试吧。";
pub const WELCOME_REPLY: &str = "感谢关注！直接发送消息就可以和我聊天。";
pub const UNSUPPORTED_REPLY: &str = "暂时只支持文字消息哦。";

/// WeChat drops a passive reply after 5s, so the whole backend chain must
/// finish inside this bound.
pub const REPLY_DEADLINE: Duration = Duration::from_millis(4500);

/// What the webhook handler should write back.
#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    Reply(OutboundReply),
    /// Acknowledge without a message.
    Empty,
}

impl Response {
    pub fn into_body(self) -> Result<String, RobotError> {
        match self {
            Response::Reply(reply) => reply.to_xml(),
            Response::Empty => Ok(EMPTY_REPLY.to_string()),
        }
    }
}

pub struct MessageController {
    token: String,
    keywords: Arc<KeywordTable>,
    backends: Vec<Arc<dyn ChatBackend>>,
    reply_deadline: Duration,
}

impl MessageController {
    pub fn new(
        token: impl Into<String>,
        keywords: Arc<KeywordTable>,
        backends: Vec<Arc<dyn ChatBackend>>,
    ) -> Self {
        MessageController {
            token: token.into(),
            keywords,
            backends,
            reply_deadline: REPLY_DEADLINE,
        }
    }

    pub fn with_reply_deadline(mut self, deadline: Duration) -> Self {
        self.reply_deadline = deadline;
        self
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn verify(&self, query: &CallbackQuery) -> Result<(), RobotError> {
        verify_signature(&self.token, query)
    }

    /// Handshake: a verified request gets its `echostr` back.
    pub fn handshake(&self, query: &CallbackQuery) -> Result<String, RobotError> {
        self.verify(query)?;
        query
            .echostr
            .clone()
            .ok_or_else(|| RobotError::Xml("missing echostr".into()))
    }

    pub async fn handle(&self, inbound: &InboundMessage) -> Response {
        match inbound.msg_type {
            MessageType::Event => self.handle_event(inbound),
            MessageType::Text | MessageType::Voice => match inbound.query_text() {
                Some(text) => Response::Reply(self.answer_text(inbound, text).await),
                None if inbound.msg_type == MessageType::Text => {
                    Response::Reply(OutboundReply::text(inbound, DEFAULT_REPLY))
                }
                None => Response::Reply(OutboundReply::text(inbound, UNSUPPORTED_REPLY)),
            },
            _ => {
                debug!(
                    "unsupported message type {:?} from {}",
                    inbound.msg_type, inbound.from_user
                );
                Response::Reply(OutboundReply::text(inbound, UNSUPPORTED_REPLY))
            }
        }
    }

    fn handle_event(&self, inbound: &InboundMessage) -> Response {
        match inbound.event.as_deref() {
            Some("subscribe") => {
                info!("new subscriber {}", inbound.from_user);
                let body = self
                    .keywords
                    .subscribe_reply()
                    .map(ReplyBody::from)
                    .unwrap_or_else(|| ReplyBody::Text {
                        content: WELCOME_REPLY.to_string(),
                    });
                Response::Reply(OutboundReply::answering(inbound, body))
            }
            Some("unsubscribe") => {
                info!("subscriber left {}", inbound.from_user);
                Response::Empty
            }
            other => {
                debug!("ignoring event {:?} from {}", other, inbound.from_user);
                Response::Empty
            }
        }
    }

    async fn answer_text(&self, inbound: &InboundMessage, text: &str) -> OutboundReply {
        if let Some(reply) = self.keywords.lookup(text) {
            debug!("keyword hit for {}", inbound.from_user);
            return OutboundReply::answering(inbound, ReplyBody::from(reply));
        }

        let chain = tokio::time::timeout(self.reply_deadline, self.ask_backends(inbound, text));
        match chain.await {
            Ok(Some(answer)) => OutboundReply::text(inbound, answer),
            Ok(None) => OutboundReply::text(inbound, DEFAULT_REPLY),
            Err(_) => {
                warn!(
                    "backends did not answer {} within {}ms",
                    inbound.from_user,
                    self.reply_deadline.as_millis()
                );
                OutboundReply::text(inbound, DEFAULT_REPLY)
            }
        }
    }

    /// First non-empty answer, trying backends in order.
    async fn ask_backends(&self, inbound: &InboundMessage, text: &str) -> Option<String> {
        for backend in &self.backends {
            match backend.reply(&inbound.from_user, text).await {
                Ok(answer) if !answer.trim().is_empty() => {
                    debug!("{} answered {}", backend.name(), inbound.from_user);
                    return Some(answer.trim().to_string());
                }
                Ok(_) => warn!("{} returned an empty answer", backend.name()),
                Err(e) => warn!("{} failed: {e}", backend.name()),
            }
        }
        None
    }
}
