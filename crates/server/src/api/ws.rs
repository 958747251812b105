use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use presentation::{Attachment, SessionHandle};
use shared::protocol::{ClientRequest, ServerEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

use crate::app_state::AppState;

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> Response {
    match state.session(&session).await {
        Ok(handle) => ws
            .on_upgrade(move |socket| ws_connection(handle, socket))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn ws_connection(handle: SessionHandle, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    let Attachment {
        snapshot,
        mut events,
    } = match handle.attach().await {
        Ok(attachment) => attachment,
        Err(error) => {
            warn!(session = %handle.name(), %error, "failed to attach websocket client");
            return;
        }
    };
    if send_event(&mut sender, &ServerEvent::StateUpdated(snapshot))
        .await
        .is_err()
    {
        return;
    }

    let resync = handle.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        session = %resync.name(),
                        skipped,
                        "websocket client lagged; resending snapshot"
                    );
                    match resync.snapshot().await {
                        Ok(update) => ServerEvent::StateUpdated(update),
                        Err(_) => break,
                    }
                }
                Err(RecvError::Closed) => break,
            };
            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientRequest>(&text) {
                Ok(request) => {
                    if let Err(error) = handle.dispatch(request).await {
                        error!(session = %handle.name(), %error, "websocket request failed");
                    }
                }
                Err(error) => {
                    warn!(session = %handle.name(), %error, "dropping malformed client request");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    debug!(session = %handle.name(), "websocket client detached");
    send_task.abort();
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(error) => {
            error!(%error, "failed to encode server event");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}
