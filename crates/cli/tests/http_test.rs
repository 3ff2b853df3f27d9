//! HTTP router tests driven through `tower::ServiceExt::oneshot`

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use tower::ServiceExt;

use rtpbridge_cli::http::{RELAY_PORT_HEADER, SESSION_ID_HEADER};
use rtpbridge_cli::{router, AppState};
use rtpbridge_media_core::{Sample, SampleSink};
use rtpbridge_session_core::{
    decode_description, encode_description, InboundTrack, MediaEngine, NegotiatedSession,
    PeerSession, SdpType, SessionConfig, SessionCoordinator, SessionDescription, SessionError,
    SessionInfo,
};

struct NullSink;

#[async_trait]
impl SampleSink for NullSink {
    async fn write_sample(&self, _sample: Sample) -> rtpbridge_media_core::Result<()> {
        Ok(())
    }
}

struct NullPeer;

#[async_trait]
impl PeerSession for NullPeer {
    async fn close(&self) -> rtpbridge_session_core::Result<()> {
        Ok(())
    }
}

/// Answers offers without ever delivering inbound tracks
#[derive(Default)]
struct StubEngine {
    track_feeds: std::sync::Mutex<Vec<mpsc::Sender<InboundTrack>>>,
}

#[async_trait]
impl MediaEngine for StubEngine {
    async fn negotiate(&self, offer: SessionDescription) -> rtpbridge_session_core::Result<NegotiatedSession> {
        if offer.sdp.contains("fail") {
            return Err(SessionError::negotiation("no common codec"));
        }
        let (tx, rx) = mpsc::channel(1);
        self.track_feeds.lock().unwrap().push(tx);
        Ok(NegotiatedSession {
            answer: SessionDescription::answer("v=0\r\ns=stub\r\n"),
            outbound: Arc::new(NullSink),
            inbound: rx,
            peer: Arc::new(NullPeer),
        })
    }
}

fn app(dir: &std::path::Path, max_sessions: usize) -> (Router, Arc<SessionCoordinator>) {
    let mut config = SessionConfig::default();
    config.relay.listen = "127.0.0.1:0".parse().unwrap();
    config.capture.output_dir = dir.to_path_buf();
    config.max_sessions = max_sessions;
    let coordinator = SessionCoordinator::new(config, Arc::new(StubEngine::default())).unwrap();

    let state = AppState {
        coordinator: coordinator.clone(),
        demo_page: dir.join("demo.html"),
    };
    (router(state, "*"), coordinator)
}

fn offer_key(sdp: &str) -> String {
    encode_description(&SessionDescription::offer(sdp))
        .unwrap()
        .replace('+', "-")
        .replace('/', "_")
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_keygen_returns_answer() {
    let dir = tempfile::tempdir().unwrap();
    let (app, coordinator) = app(dir.path(), 1);

    let request = Request::builder()
        .uri(format!("/keygen/{}", offer_key("v=0")))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert!(response.headers().contains_key(SESSION_ID_HEADER));
    assert_eq!(response.headers()[RELAY_PORT_HEADER], "0");

    let answer = decode_description(&body_string(response).await).unwrap();
    assert_eq!(answer.sdp_type, SdpType::Answer);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_keygen_post_body() {
    let dir = tempfile::tempdir().unwrap();
    let (app, coordinator) = app(dir.path(), 1);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/keygen")
        .body(Body::from(encode_description(&SessionDescription::offer("v=0")).unwrap()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_keygen_error_statuses() {
    let dir = tempfile::tempdir().unwrap();
    let (app, coordinator) = app(dir.path(), 1);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/keygen/not-base64!").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/keygen/{}", offer_key("please fail")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    coordinator.shutdown().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/keygen/{}", offer_key("v=0")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_demo_page() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _coordinator) = app(dir.path(), 1);

    // Missing page: the error text is served in its place
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/demo").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!body_string(response).await.is_empty());

    std::fs::write(dir.path().join("demo.html"), "<html>demo</html>").unwrap();
    let response = app
        .oneshot(Request::builder().uri("/demo").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "<html>demo</html>");
}

#[tokio::test]
async fn test_list_and_delete_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let (app, coordinator) = app(dir.path(), 2);

    let accepted = coordinator
        .submit_offer(encode_description(&SessionDescription::offer("v=0")).unwrap())
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let sessions: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(sessions[0]["id"], accepted.session_id.to_string());

    let delete = |id: String| {
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/sessions/{}", id))
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete(accepted.session_id.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.oneshot(delete("nope".to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    coordinator.shutdown().await;
    let remaining: Vec<SessionInfo> = coordinator.list_sessions().await;
    assert!(remaining.is_empty());
}
