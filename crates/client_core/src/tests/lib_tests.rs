use super::*;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        OriginalUri, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use shared::{
    error::ErrorCode,
    protocol::{PresentationState, SetSlideOptions},
};
use tokio::{
    net::TcpListener,
    sync::mpsc::{self, UnboundedSender},
};

#[derive(Clone)]
struct StubState {
    seen: UnboundedSender<String>,
}

fn session(name: &str) -> SessionName {
    SessionName::parse(name).expect("session name")
}

async fn serve(app: Router) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn record(
    State(state): State<StubState>,
    OriginalUri(uri): OriginalUri,
    body: String,
) -> StatusCode {
    let _ = state.seen.send(format!("{} {body}", uri.path()));
    StatusCode::NO_CONTENT
}

async fn stub_state() -> Json<PresentationState> {
    Json(PresentationState {
        current_slide_index: 4,
        ..PresentationState::default()
    })
}

async fn stub_totals() -> Json<BTreeMap<String, u64>> {
    Json(BTreeMap::from([("🍅".to_string(), 7)]))
}

fn update(revision: u64, index: u32) -> String {
    serde_json::to_string(&ServerEvent::StateUpdated(StateUpdate {
        session: session("live"),
        revision,
        state: PresentationState {
            current_slide_index: index,
            ..PresentationState::default()
        },
    }))
    .expect("encode update")
}

async fn stub_ws(ws: WebSocketUpgrade, State(state): State<StubState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| drive_socket(socket, state))
}

async fn drive_socket(mut socket: WebSocket, state: StubState) {
    if socket.send(WsMessage::Text(update(3, 1))).await.is_err() {
        return;
    }
    while let Some(Ok(message)) = socket.recv().await {
        if let WsMessage::Text(text) = message {
            let _ = state.seen.send(text);
            for frame in [update(2, 0), "garbage".to_string(), update(4, 2)] {
                if socket.send(WsMessage::Text(frame)).await.is_err() {
                    return;
                }
            }
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        }
    }
}

fn stub_app() -> (Router, mpsc::UnboundedReceiver<String>) {
    let (seen, seen_rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/sessions/talk/state", get(stub_state))
        .route("/sessions/talk/advance/forward", post(record))
        .route("/sessions/talk/advance/backward", post(record))
        .route("/sessions/talk/slide", post(record))
        .route("/sessions/talk/reactions", post(record))
        .route("/sessions/talk/reactions/totals", get(stub_totals))
        .route(
            "/sessions/broken/state",
            get(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiError::new(ErrorCode::Validation, "bad session")),
                )
            }),
        )
        .route("/sessions/live/ws", get(stub_ws))
        .with_state(StubState { seen });
    (app, seen_rx)
}

#[test]
fn rejects_non_http_server_urls() {
    assert!(PresentationClient::new("ftp://example.com", session("talk")).is_err());
    let client = PresentationClient::new("http://example.com/", session("talk")).expect("client");
    assert_eq!(client.server_url(), "http://example.com");
}

#[tokio::test]
async fn http_calls_target_the_session_routes() -> Result<()> {
    let (app, mut seen) = stub_app();
    let base = serve(app).await?;
    let client = PresentationClient::new(base, session("talk"))?;

    assert_eq!(client.state().await?.current_slide_index, 4);

    client.advance(Direction::Forward).await?;
    client.advance(Direction::Backward).await?;
    client
        .set_slide(&SetSlideRequest::new(
            2,
            vec!["🧡".into()],
            SetSlideOptions::default(),
        ))
        .await?;
    client.submit_reaction("🧡").await?;

    assert_eq!(seen.recv().await.as_deref(), Some("/sessions/talk/advance/forward "));
    assert_eq!(seen.recv().await.as_deref(), Some("/sessions/talk/advance/backward "));
    let slide = seen.recv().await.expect("slide call");
    assert!(slide.starts_with("/sessions/talk/slide {"));
    let body: SetSlideRequest =
        serde_json::from_str(slide.trim_start_matches("/sessions/talk/slide "))?;
    assert_eq!(body.index, 2.0);
    assert_eq!(
        seen.recv().await.as_deref(),
        Some(r#"/sessions/talk/reactions {"reaction":"🧡"}"#)
    );

    assert_eq!(client.reaction_totals().await?.get("🍅"), Some(&7));
    Ok(())
}

#[tokio::test]
async fn error_bodies_surface_as_api_exceptions() -> Result<()> {
    let (app, _seen) = stub_app();
    let base = serve(app).await?;
    let client = PresentationClient::new(base, session("broken"))?;

    let err = client.state().await.expect_err("should fail");
    let api = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(api.code, ErrorCode::Validation);
    assert_eq!(api.message, "bad session");
    Ok(())
}

#[tokio::test]
async fn live_session_starts_from_snapshot_and_drops_stale_revisions() -> Result<()> {
    let (app, mut seen) = stub_app();
    let base = serve(app).await?;
    let client = PresentationClient::new(base, session("live"))?;

    let live = client.connect().await?;
    let snapshot = live.latest().await;
    assert_eq!(snapshot.revision, 3);
    assert_eq!(snapshot.state.current_slide_index, 1);

    let mut events = live.subscribe();
    live.advance(Direction::Forward).await?;
    assert_eq!(
        seen.recv().await.as_deref(),
        Some(r#"{"type":"advance_slide_forward"}"#)
    );

    let mut received = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for events")?;
        let done = matches!(event, ClientEvent::Disconnected);
        received.push(event);
        if done {
            break;
        }
    }

    let revisions: Vec<_> = received
        .iter()
        .filter_map(|event| match event {
            ClientEvent::State(update) => Some(update.revision),
            _ => None,
        })
        .collect();
    assert_eq!(revisions, vec![4]);
    assert!(received.iter().any(|event| matches!(
        event,
        ClientEvent::Error(message) if message.starts_with("invalid server event")
    )));
    assert_eq!(live.latest().await.state.current_slide_index, 2);
    Ok(())
}
