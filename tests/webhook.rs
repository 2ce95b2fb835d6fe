//! End-to-end webhook tests over a real socket.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use wechat_robot::backends::{
    build_backends, BackendOptions, ENV_OPENAI_API_KEY, ENV_OPENAI_BASE_DOMAIN,
};
use wechat_robot::controller::{MessageController, DEFAULT_REPLY};
use wechat_robot::keyword::KeywordTable;
use wechat_robot::runtime::{serve_until, ShutdownOutcome};
use wechat_robot::web::{build_router, WebState, WEBHOOK_PATH};
use wechat_robot::wechat::compute_signature;

const TOKEN: &str = "integration-token";

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

async fn spawn_mock_openai() -> String {
    spawn(Router::new().route(
        "/v1/chat/completions",
        post(|Json(body): Json<serde_json::Value>| async move {
            let prompt = body["messages"][0]["content"].as_str().unwrap_or("").to_string();
            Json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": format!("echo: {prompt}")}}]
            }))
        }),
    ))
    .await
}

fn bundled_keywords() -> Arc<KeywordTable> {
    let payload = wechat_robot::assets::keyword_payload().unwrap();
    Arc::new(KeywordTable::from_json(payload).unwrap())
}

fn signed_url(base: &str) -> String {
    let signature = compute_signature(TOKEN, "1700000000", "nonce1");
    format!("{base}{WEBHOOK_PATH}?signature={signature}&timestamp=1700000000&nonce=nonce1")
}

fn text_message(content: &str) -> String {
    format!(
        "<xml><ToUserName><![CDATA[gh_account]]></ToUserName>\
         <FromUserName><![CDATA[oUser42]]></FromUserName>\
         <CreateTime>1700000000</CreateTime>\
         <MsgType><![CDATA[text]]></MsgType>\
         <Content><![CDATA[{content}]]></Content>\
         <MsgId>1234567890</MsgId></xml>"
    )
}

struct Running {
    base: String,
    stop: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<Result<ShutdownOutcome, wechat_robot::error::RobotError>>,
}

async fn start(controller: MessageController) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (stop, stop_rx) = oneshot::channel::<()>();
    let router = build_router(WebState::new(Arc::new(controller)));
    let server = tokio::spawn(serve_until(
        listener,
        router,
        async move {
            let _ = stop_rx.await;
        },
        Duration::from_secs(2),
    ));
    Running { base, stop, server }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_bundled_keyword_answered_over_http() {
    let running = start(MessageController::new(TOKEN, bundled_keywords(), vec![])).await;

    let resp = client()
        .post(signed_url(&running.base))
        .body(text_message("Help"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let xml = resp.text().await.unwrap();
    assert!(xml.contains("<ToUserName><![CDATA[oUser42]]></ToUserName>"));
    assert!(xml.contains("<FromUserName><![CDATA[gh_account]]></FromUserName>"));
    assert!(xml.contains("<MsgType><![CDATA[text]]></MsgType>"));

    running.stop.send(()).unwrap();
    assert_eq!(
        running.server.await.unwrap().unwrap(),
        ShutdownOutcome::Graceful
    );
}

#[tokio::test]
async fn test_unmatched_message_uses_openai_backend() {
    let openai = spawn_mock_openai().await;
    let options = BackendOptions::from_lookup(|key| match key {
        ENV_OPENAI_API_KEY => Some("sk-it".to_string()),
        ENV_OPENAI_BASE_DOMAIN => Some(openai.clone()),
        _ => None,
    })
    .unwrap();
    let backends = build_backends(&options, Duration::from_secs(5)).unwrap();
    let running = start(MessageController::new(TOKEN, bundled_keywords(), backends)).await;

    let xml = client()
        .post(signed_url(&running.base))
        .body(text_message("what is ownership"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(xml.contains("<Content><![CDATA[echo: what is ownership]]></Content>"));

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unreachable_backend_falls_back_to_default_reply() {
    let options = BackendOptions::from_lookup(|key| match key {
        ENV_OPENAI_API_KEY => Some("sk-it".to_string()),
        ENV_OPENAI_BASE_DOMAIN => Some("http://127.0.0.1:1".to_string()),
        _ => None,
    })
    .unwrap();
    let backends = build_backends(&options, Duration::from_secs(2)).unwrap();
    let running = start(MessageController::new(TOKEN, bundled_keywords(), backends)).await;

    let resp = client()
        .post(signed_url(&running.base))
        .body(text_message("tell me a story"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let xml = resp.text().await.unwrap();
    assert!(xml.contains(DEFAULT_REPLY));

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_handshake_over_http() {
    let running = start(MessageController::new(TOKEN, bundled_keywords(), vec![])).await;

    let body = client()
        .get(format!("{}&echostr=5188392841", signed_url(&running.base)))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "5188392841");

    let resp = client()
        .get(format!(
            "{}{WEBHOOK_PATH}?signature=0000&timestamp=1&nonce=2&echostr=x",
            running.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();
}
