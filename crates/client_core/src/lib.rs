use std::{collections::BTreeMap, sync::Arc};

use anyhow::{anyhow, Context, Result};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use reqwest::Client;
use shared::{
    domain::{Direction, SessionName},
    error::{ApiError, ApiException},
    protocol::{
        ClientRequest, PresentationState, ReactionRequest, ServerEvent, SetSlideRequest,
        StateUpdate,
    },
};
use tokio::{
    net::TcpStream,
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_stream::wrappers::BroadcastStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

pub mod audience;
pub mod deck;
pub mod navigator;
pub mod prop;
pub mod verify;

const CLIENT_EVENT_CAPACITY: usize = 256;

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    State(StateUpdate),
    Error(String),
    Disconnected,
}

/// HTTP side of one presentation session.
#[derive(Clone)]
pub struct PresentationClient {
    http: Client,
    server_url: String,
    session: SessionName,
}

impl PresentationClient {
    pub fn new(server_url: impl Into<String>, session: SessionName) -> Result<Self> {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            return Err(anyhow!("server_url must start with http:// or https://"));
        }
        Ok(Self {
            http: Client::new(),
            server_url,
            session,
        })
    }

    pub fn session(&self) -> &SessionName {
        &self.session
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/sessions/{}/{path}", self.server_url, self.session)
    }

    pub async fn state(&self) -> Result<PresentationState> {
        let res = self.http.get(self.session_url("state")).send().await?;
        Ok(check(res).await?.json().await?)
    }

    pub async fn advance(&self, direction: Direction) -> Result<()> {
        let path = match direction {
            Direction::Forward => "advance/forward",
            Direction::Backward => "advance/backward",
        };
        let res = self.http.post(self.session_url(path)).send().await?;
        check(res).await?;
        Ok(())
    }

    pub async fn set_slide(&self, request: &SetSlideRequest) -> Result<()> {
        let res = self
            .http
            .post(self.session_url("slide"))
            .json(request)
            .send()
            .await?;
        check(res).await?;
        Ok(())
    }

    /// Accepted reactions are not echoed back; rejected ones are dropped
    /// silently by the server.
    pub async fn submit_reaction(&self, reaction: &str) -> Result<()> {
        let res = self
            .http
            .post(self.session_url("reactions"))
            .json(&ReactionRequest {
                reaction: reaction.to_string(),
            })
            .send()
            .await?;
        check(res).await?;
        Ok(())
    }

    pub async fn reaction_totals(&self) -> Result<BTreeMap<String, u64>> {
        let res = self
            .http
            .get(self.session_url("reactions/totals"))
            .send()
            .await?;
        Ok(check(res).await?.json().await?)
    }

    /// Opens the session's event stream. Returns once the attach snapshot
    /// has arrived, so [`LiveSession::latest`] is always populated.
    pub async fn connect(&self) -> Result<LiveSession> {
        let ws_url = if self.server_url.starts_with("https://") {
            self.server_url.replacen("https://", "wss://", 1)
        } else {
            self.server_url.replacen("http://", "ws://", 1)
        };
        let ws_url = format!("{ws_url}/sessions/{}/ws", self.session);
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        let (writer, mut reader) = ws_stream.split();

        let snapshot = loop {
            let Some(msg) = reader.next().await else {
                return Err(anyhow!("websocket closed before the session snapshot"));
            };
            match msg.context("websocket receive failed")? {
                Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text)? {
                    ServerEvent::StateUpdated(update) => break update,
                    ServerEvent::Error(err) => {
                        return Err(ApiException::new(err.code, err.message).into())
                    }
                },
                Message::Close(_) => {
                    return Err(anyhow!("websocket closed before the session snapshot"))
                }
                _ => {}
            }
        };
        info!(
            session = %self.session,
            revision = snapshot.revision,
            "attached to session"
        );

        let (events, _) = broadcast::channel(CLIENT_EVENT_CAPACITY);
        let latest = Arc::new(Mutex::new(snapshot));
        let reader_task = {
            let events = events.clone();
            let latest = Arc::clone(&latest);
            tokio::spawn(async move {
                while let Some(msg) = reader.next().await {
                    match msg {
                        Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(ServerEvent::StateUpdated(update)) => {
                                let mut guard = latest.lock().await;
                                if update.revision <= guard.revision {
                                    debug!(
                                        revision = update.revision,
                                        latest = guard.revision,
                                        "discarding stale state update"
                                    );
                                    continue;
                                }
                                *guard = update.clone();
                                drop(guard);
                                let _ = events.send(ClientEvent::State(update));
                            }
                            Ok(ServerEvent::Error(err)) => {
                                let _ = events.send(ClientEvent::Error(err.message));
                            }
                            Err(err) => {
                                let _ = events
                                    .send(ClientEvent::Error(format!("invalid server event: {err}")));
                            }
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(err) => {
                            let _ = events.send(ClientEvent::Error(format!(
                                "websocket receive failed: {err}"
                            )));
                            break;
                        }
                    }
                }
                let _ = events.send(ClientEvent::Disconnected);
            })
        };

        Ok(LiveSession {
            session: self.session.clone(),
            events,
            writer: Arc::new(Mutex::new(writer)),
            latest,
            reader_task,
        })
    }
}

async fn check(res: reqwest::Response) -> Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(err) => Err(anyhow::Error::new(ApiException::new(err.code, err.message))
            .context(format!("server responded {status}"))),
        Err(_) => Err(anyhow!("server responded {status}: {body}")),
    }
}

/// A live WebSocket attachment to one session.
pub struct LiveSession {
    session: SessionName,
    events: broadcast::Sender<ClientEvent>,
    writer: Arc<Mutex<WsWriter>>,
    latest: Arc<Mutex<StateUpdate>>,
    reader_task: JoinHandle<()>,
}

impl LiveSession {
    pub fn session(&self) -> &SessionName {
        &self.session
    }

    pub async fn latest(&self) -> StateUpdate {
        self.latest.lock().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// State updates only. A lagged receiver skips ahead to the next
    /// snapshot.
    pub fn updates(&self) -> impl futures::Stream<Item = StateUpdate> + Send + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| async move {
            match event {
                Ok(ClientEvent::State(update)) => Some(update),
                Ok(_) => None,
                Err(err) => {
                    warn!(%err, "state update stream lagged");
                    None
                }
            }
        })
    }

    pub async fn send(&self, request: &ClientRequest) -> Result<()> {
        let text = serde_json::to_string(request)?;
        self.writer
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .context("websocket send failed")
    }

    pub async fn advance(&self, direction: Direction) -> Result<()> {
        let request = match direction {
            Direction::Forward => ClientRequest::AdvanceSlideForward,
            Direction::Backward => ClientRequest::AdvanceSlideBackward,
        };
        self.send(&request).await
    }

    pub async fn set_slide(&self, request: SetSlideRequest) -> Result<()> {
        self.send(&ClientRequest::SetSlide(request)).await
    }

    pub async fn submit_reaction(&self, reaction: &str) -> Result<()> {
        self.send(&ClientRequest::SubmitReaction(ReactionRequest {
            reaction: reaction.to_string(),
        }))
        .await
    }

    pub async fn close(self) -> Result<()> {
        let result = self.writer.lock().await.close().await;
        self.reader_task.abort();
        result.context("websocket close failed")
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
