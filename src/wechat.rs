//! WeChat public-platform plumbing: callback signature check and the plaintext
//! XML message envelope.

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::error::RobotError;
use crate::keyword::{Article, KeywordReply};
use crate::text::truncate_utf8;

/// Passive text replies longer than this are rejected by WeChat.
pub const MAX_TEXT_REPLY_BYTES: usize = 2048;

/// Body WeChat accepts when there is nothing to reply.
pub const EMPTY_REPLY: &str = "success";

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub echostr: Option<String>,
}

pub fn compute_signature(token: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [token.trim(), timestamp.trim(), nonce.trim()];
    parts.sort_unstable();
    let mut sha = Sha1::new();
    sha.update(parts.concat());
    hex::encode(sha.finalize())
}

pub fn verify_signature(token: &str, query: &CallbackQuery) -> Result<(), RobotError> {
    let signature = query.signature.trim();
    if signature.is_empty() {
        return Err(RobotError::Signature);
    }
    let expected = compute_signature(token, &query.timestamp, &query.nonce);
    if expected.eq_ignore_ascii_case(signature) {
        Ok(())
    } else {
        Err(RobotError::Signature)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Image,
    Voice,
    Video,
    ShortVideo,
    Location,
    Link,
    Event,
    Other(String),
}

impl From<&str> for MessageType {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => MessageType::Text,
            "image" => MessageType::Image,
            "voice" => MessageType::Voice,
            "video" => MessageType::Video,
            "shortvideo" => MessageType::ShortVideo,
            "location" => MessageType::Location,
            "link" => MessageType::Link,
            "event" => MessageType::Event,
            other => MessageType::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename = "xml")]
struct RawEnvelope {
    #[serde(rename = "ToUserName")]
    to_user: String,
    #[serde(rename = "FromUserName")]
    from_user: String,
    #[serde(rename = "CreateTime", default)]
    create_time: i64,
    #[serde(rename = "MsgType")]
    msg_type: String,
    #[serde(rename = "Content", default)]
    content: Option<String>,
    #[serde(rename = "MsgId", default)]
    msg_id: Option<String>,
    #[serde(rename = "Event", default)]
    event: Option<String>,
    #[serde(rename = "EventKey", default)]
    event_key: Option<String>,
    #[serde(rename = "Recognition", default)]
    recognition: Option<String>,
    #[serde(rename = "PicUrl", default)]
    pic_url: Option<String>,
    #[serde(rename = "MediaId", default)]
    media_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub to_user: String,
    pub from_user: String,
    pub create_time: i64,
    pub msg_type: MessageType,
    pub content: String,
    pub msg_id: Option<String>,
    pub event: Option<String>,
    pub event_key: Option<String>,
    pub recognition: Option<String>,
    pub pic_url: Option<String>,
    pub media_id: Option<String>,
}

impl InboundMessage {
    pub fn parse(body: &str) -> Result<Self, RobotError> {
        let raw: RawEnvelope =
            quick_xml::de::from_str(body).map_err(|e| RobotError::Xml(e.to_string()))?;
        if raw.to_user.trim().is_empty() || raw.from_user.trim().is_empty() {
            return Err(RobotError::Xml(
                "ToUserName and FromUserName are required".into(),
            ));
        }
        Ok(InboundMessage {
            to_user: raw.to_user,
            from_user: raw.from_user,
            create_time: raw.create_time,
            msg_type: MessageType::from(raw.msg_type.as_str()),
            content: raw.content.unwrap_or_default(),
            msg_id: raw.msg_id,
            event: raw.event.map(|e| e.trim().to_ascii_lowercase()),
            event_key: raw.event_key,
            recognition: raw.recognition.filter(|r| !r.trim().is_empty()),
            pic_url: raw.pic_url,
            media_id: raw.media_id,
        })
    }

    /// Text the robot should answer: typed content, or the transcript of a voice message.
    pub fn query_text(&self) -> Option<&str> {
        let text = match self.msg_type {
            MessageType::Text => self.content.as_str(),
            MessageType::Voice => self.recognition.as_deref()?,
            _ => return None,
        };
        let text = text.trim();
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyBody {
    Text { content: String },
    News { articles: Vec<Article> },
}

impl From<&KeywordReply> for ReplyBody {
    fn from(reply: &KeywordReply) -> Self {
        match reply {
            KeywordReply::Text { content } => ReplyBody::Text {
                content: content.clone(),
            },
            KeywordReply::News { articles } => ReplyBody::News {
                articles: articles.clone(),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundReply {
    pub to_user: String,
    pub from_user: String,
    pub create_time: i64,
    pub body: ReplyBody,
}

type XmlWriter = Writer<Vec<u8>>;

fn xml_err(e: impl std::fmt::Display) -> RobotError {
    RobotError::Xml(e.to_string())
}

/// Writes `text` as CDATA, splitting on `]]>` so the section cannot be closed early.
fn write_cdata(writer: &mut XmlWriter, text: &str) -> Result<(), RobotError> {
    let mut rest = text;
    while let Some(idx) = rest.find("]]>") {
        let (head, tail) = rest.split_at(idx + 2);
        writer
            .write_event(Event::CData(BytesCData::new(head)))
            .map_err(xml_err)?;
        rest = tail;
    }
    writer
        .write_event(Event::CData(BytesCData::new(rest)))
        .map_err(xml_err)
}

fn write_cdata_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<(), RobotError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    write_cdata(writer, text)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)
}

fn write_text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<(), RobotError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)
}

fn write_start(writer: &mut XmlWriter, name: &str) -> Result<(), RobotError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)
}

fn write_end(writer: &mut XmlWriter, name: &str) -> Result<(), RobotError> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)
}

impl OutboundReply {
    /// Reply addressed back to the sender of `inbound`.
    pub fn answering(inbound: &InboundMessage, body: ReplyBody) -> Self {
        OutboundReply {
            to_user: inbound.from_user.clone(),
            from_user: inbound.to_user.clone(),
            create_time: chrono::Utc::now().timestamp(),
            body,
        }
    }

    pub fn text(inbound: &InboundMessage, content: impl Into<String>) -> Self {
        Self::answering(
            inbound,
            ReplyBody::Text {
                content: content.into(),
            },
        )
    }

    pub fn to_xml(&self) -> Result<String, RobotError> {
        let mut writer = Writer::new(Vec::new());
        write_start(&mut writer, "xml")?;
        write_cdata_element(&mut writer, "ToUserName", &self.to_user)?;
        write_cdata_element(&mut writer, "FromUserName", &self.from_user)?;
        write_text_element(&mut writer, "CreateTime", &self.create_time.to_string())?;
        match &self.body {
            ReplyBody::Text { content } => {
                write_cdata_element(&mut writer, "MsgType", "text")?;
                let content = truncate_utf8(content, MAX_TEXT_REPLY_BYTES);
                write_cdata_element(&mut writer, "Content", &content)?;
            }
            ReplyBody::News { articles } => {
                write_cdata_element(&mut writer, "MsgType", "news")?;
                write_text_element(&mut writer, "ArticleCount", &articles.len().to_string())?;
                write_start(&mut writer, "Articles")?;
                for article in articles {
                    write_start(&mut writer, "item")?;
                    write_cdata_element(&mut writer, "Title", &article.title)?;
                    write_cdata_element(&mut writer, "Description", &article.description)?;
                    write_cdata_element(&mut writer, "PicUrl", &article.pic_url)?;
                    write_cdata_element(&mut writer, "Url", &article.url)?;
                    write_end(&mut writer, "item")?;
                }
                write_end(&mut writer, "Articles")?;
            }
        }
        write_end(&mut writer, "xml")?;
        String::from_utf8(writer.into_inner()).map_err(xml_err)
    }
}
