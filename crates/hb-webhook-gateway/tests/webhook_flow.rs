//! End-to-end tests driving the axum router in-process.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use hb_webhook_gateway::crypto::{compute_signature, PlatformCipher};
use hb_webhook_gateway::{
    GatewayConfig, InMemoryRecipeBook, Notifier, NotifyError, Recipe, WebhookService,
};
use http_body_util::BodyExt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceExt;

const TOKEN: &str = "QDG6eK";
const ENCODING_AES_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";
const CORP_ID: &str = "wx5823bf96d3bd56c7";

const RECIPES: &str = r#"[
    {
        "title": "Omelette",
        "ingredients": ["egg", "milk"],
        "instructions": "Whisk and fry.",
        "tags": ["breakfast"],
        "calories": 220,
        "protein": 14,
        "carbs": 3,
        "fat": 16
    }
]"#;

#[derive(Default)]
struct RecordingNotifier {
    delay: Duration,
    sent: Mutex<Vec<(String, Recipe)>>,
    delivered: Notify,
}

impl RecordingNotifier {
    /// Dispatch runs after the response, so wait for it to land.
    async fn wait_for(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.sent.lock().unwrap().len() < count {
                self.delivered.notified().await;
            }
        })
        .await
        .expect("recipe was not delivered");
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, recipe: &Recipe) -> Result<(), NotifyError> {
        tokio::time::sleep(self.delay).await;
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), recipe.clone()));
        self.delivered.notify_one();
        Ok(())
    }
}

fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.wecom.token = TOKEN.into();
    config.wecom.encoding_aes_key = ENCODING_AES_KEY.into();
    config.wecom.receiver_id = Some(CORP_ID.into());
    config
}

fn service(config: GatewayConfig, notifier: Arc<RecordingNotifier>) -> WebhookService {
    let book = InMemoryRecipeBook::from_json(RECIPES).unwrap();
    WebhookService::new(config, Arc::new(book), notifier).unwrap()
}

fn app(config: GatewayConfig) -> (Router, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    (service(config, notifier.clone()).router(), notifier)
}

fn cipher() -> PlatformCipher {
    PlatformCipher::new(ENCODING_AES_KEY, Some(CORP_ID.into())).unwrap()
}

fn callback_body(from: &str, content: &str) -> String {
    let inner = format!(
        "<xml><ToUserName><![CDATA[{CORP_ID}]]></ToUserName>\
         <FromUserName><![CDATA[{from}]]></FromUserName>\
         <CreateTime>1409659813</CreateTime>\
         <MsgType><![CDATA[text]]></MsgType>\
         <Content><![CDATA[{content}]]></Content>\
         <MsgId>4561255354251345929</MsgId><AgentID>218</AgentID></xml>"
    );
    let encrypted = cipher().encrypt(&inner).unwrap();
    format!(
        "<xml><ToUserName><![CDATA[{CORP_ID}]]></ToUserName>\
         <Encrypt><![CDATA[{encrypted}]]></Encrypt>\
         <AgentID><![CDATA[218]]></AgentID></xml>"
    )
}

fn signed_uri(timestamp: &str, nonce: &str) -> String {
    let signature = compute_signature(TOKEN, timestamp, nonce);
    format!("/wechat/webhook?msg_signature={signature}&timestamp={timestamp}&nonce={nonce}")
}

fn post(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "text/xml")
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn recipe_request_is_acknowledged_and_dispatched() {
    let (app, notifier) = app(config());

    let response = app
        .oneshot(post(
            &signed_uri("1409659589", "263121"),
            callback_body("zhangsan", "@HealthBot recipe ingredients: egg, milk exclude: nuts"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(json_body(response).await, serde_json::json!({ "status": "success" }));

    notifier.wait_for(1).await;
    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "zhangsan");
    assert_eq!(sent[0].1.title, "Omelette");
}

#[tokio::test]
async fn legacy_signature_parameter_is_accepted() {
    let (app, notifier) = app(config());
    let signature = compute_signature(TOKEN, "1409659589", "263121");
    let uri = format!("/wechat/webhook?signature={signature}&timestamp=1409659589&nonce=263121");

    let response = app
        .oneshot(post(&uri, callback_body("lisi", "@HealthBot recipe")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    notifier.wait_for(1).await;
}

#[tokio::test]
async fn slow_notifier_does_not_delay_acknowledgement() {
    let mut config = config();
    config.http.request_timeout = Duration::from_millis(200);
    let notifier = Arc::new(RecordingNotifier {
        delay: Duration::from_millis(800),
        ..Default::default()
    });
    let app = service(config, notifier.clone()).router();

    let response = app
        .oneshot(post(
            &signed_uri("1409659589", "263121"),
            callback_body("zhangsan", "@HealthBot recipe ingredients: egg"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "success");
    assert!(notifier.sent.lock().unwrap().is_empty());

    // The send finishes after the request deadline has passed
    notifier.wait_for(1).await;
    assert_eq!(notifier.sent.lock().unwrap()[0].0, "zhangsan");
}

#[tokio::test]
async fn forged_signature_is_unauthorized() {
    let (app, notifier) = app(config());
    let uri = format!(
        "/wechat/webhook?msg_signature={}&timestamp=1409659589&nonce=263121",
        "0".repeat(40)
    );

    let response = app
        .oneshot(post(&uri, callback_body("zhangsan", "@HealthBot recipe")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn garbage_payload_still_acknowledged() {
    let (app, notifier) = app(config());

    let response = app
        .oneshot(post(
            &signed_uri("1409659589", "263121"),
            "<xml><Encrypt><![CDATA[AAAA]]></Encrypt></xml>".to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "success");
    assert!(notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rate_limit_returns_429_after_threshold() {
    let mut config = config();
    config.rate_limit.max_requests = 2;
    let (app, _) = app(config);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post(&signed_uri("1", "n"), callback_body("u", "hello")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(post(&signed_uri("1", "n"), callback_body("u", "hello")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Auxiliary routes share the same limiter
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn forwarded_clients_are_limited_separately_when_trusted() {
    let mut config = config();
    config.rate_limit.max_requests = 1;
    config.http.trust_proxy_headers = true;
    let (app, _) = app(config);

    for client in ["203.0.113.1", "203.0.113.2"] {
        let mut request = post(&signed_uri("1", "n"), callback_body("u", "hello"));
        request
            .headers_mut()
            .insert("x-forwarded-for", client.parse().unwrap());
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let mut request = post(&signed_uri("1", "n"), callback_body("u", "hello"));
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.1".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn url_verification_echoes_plaintext() {
    let (app, _) = app(config());
    let echostr = cipher().encrypt("5927782489442352469").unwrap();
    let mut uri = signed_uri("1409659589", "263121");
    uri.push_str("&echostr=");
    uri.push_str(&echostr.replace('+', "%2B").replace('/', "%2F").replace('=', "%3D"));

    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"5927782489442352469");
}

#[tokio::test]
async fn metrics_report_outcomes() {
    let notifier = Arc::new(RecordingNotifier::default());
    let service = service(config(), notifier.clone());
    let metrics = service.metrics();
    let app = service.router();

    app.clone()
        .oneshot(post(
            &signed_uri("1409659589", "263121"),
            callback_body("zhangsan", "@HealthBot recipe ingredients: tofu"),
        ))
        .await
        .unwrap();

    notifier.wait_for(1).await;
    // Counters are bumped right after the send returns
    tokio::time::timeout(Duration::from_secs(5), async {
        while metrics.dispatched.load(Ordering::Relaxed) == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["requests"]["total"], 1);
    assert_eq!(json["recipes"]["dispatched"], 1);
    assert_eq!(json["recipes"]["fallback"], 1);
    assert_eq!(json["rate_limiting"]["tracked_clients"], 1);
}
