use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{error, info, warn};

use crate::assets;
use crate::controller::MessageController;
use crate::error::RobotError;
use crate::wechat::{CallbackQuery, InboundMessage};

pub const WEBHOOK_PATH: &str = "/weChat/receiveMessage";

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Clone)]
pub struct WebState {
    controller: Arc<MessageController>,
}

impl WebState {
    pub fn new(controller: Arc<MessageController>) -> Self {
        WebState { controller }
    }
}

async fn index() -> impl IntoResponse {
    match assets::landing_page() {
        Some(page) => Html(page).into_response(),
        None => (StatusCode::NOT_FOUND, "index.html missing").into_response(),
    }
}

async fn public_file(Path(file): Path<String>) -> impl IntoResponse {
    match assets::static_file(&file) {
        Some(file) => ([("content-type", file.content_type)], file.contents).into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

async fn health() -> &'static str {
    "ok"
}

fn signature_rejected() -> Response {
    (StatusCode::UNAUTHORIZED, "invalid signature").into_response()
}

async fn wechat_verify(
    State(state): State<WebState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    match state.controller.handshake(&query) {
        Ok(echo) => {
            info!("wechat handshake verified");
            ([("content-type", TEXT_CONTENT_TYPE)], echo).into_response()
        }
        Err(RobotError::Signature) => {
            warn!("wechat handshake rejected: bad signature");
            signature_rejected()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn wechat_message(
    State(state): State<WebState>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Response {
    if state.controller.verify(&query).is_err() {
        warn!("wechat message rejected: bad signature");
        return signature_rejected();
    }

    let inbound = match InboundMessage::parse(&body) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!("malformed wechat message: {e}");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    info!(
        "wechat message from={} type={:?}",
        inbound.from_user, inbound.msg_type
    );

    let response = state.controller.handle(&inbound).await;
    let is_empty = matches!(response, crate::controller::Response::Empty);
    match response.into_body() {
        Ok(body) if is_empty => ([("content-type", TEXT_CONTENT_TYPE)], body).into_response(),
        Ok(body) => ([("content-type", XML_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!("failed to render reply: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "render failed").into_response()
        }
    }
}

pub fn build_router(state: WebState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/public/*file", get(public_file))
        .route("/health", get(health))
        .route(WEBHOOK_PATH, get(wechat_verify).post(wechat_message))
        .with_state(state)
}
