use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, Result};
use shared::{
    domain::{Direction, SessionName},
    protocol::{ClientRequest, ServerEvent, SetSlideRequest, StateUpdate},
};
use storage::ReactionLog;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::state::PresentationMachine;

const COMMAND_CAPACITY: usize = 64;

/// Whether a submitted reaction made it into the log. Remote callers never
/// see this; it exists for in-process callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    Recorded,
    Ignored,
}

/// What a newly attached client starts from: the current snapshot plus a
/// receiver subscribed at the same instant, so nothing falls in between.
pub struct Attachment {
    pub snapshot: StateUpdate,
    pub events: broadcast::Receiver<ServerEvent>,
}

enum Command {
    Advance {
        direction: Direction,
        reply: oneshot::Sender<StateUpdate>,
    },
    SetSlide {
        request: SetSlideRequest,
        reply: oneshot::Sender<StateUpdate>,
    },
    SubmitReaction {
        symbol: String,
        reply: oneshot::Sender<Result<ReactionOutcome>>,
    },
    Snapshot {
        reply: oneshot::Sender<StateUpdate>,
    },
    Attach {
        reply: oneshot::Sender<Attachment>,
    },
    ReactionTotals {
        reply: oneshot::Sender<Result<HashMap<String, u64>>>,
    },
}

/// Cloneable address of one running session endpoint.
#[derive(Clone)]
pub struct SessionHandle {
    name: SessionName,
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub fn name(&self) -> &SessionName {
        &self.name
    }

    pub async fn advance_slide(&self, direction: Direction) -> Result<StateUpdate> {
        self.call(|reply| Command::Advance { direction, reply }).await
    }

    pub async fn set_slide(&self, request: SetSlideRequest) -> Result<StateUpdate> {
        self.call(|reply| Command::SetSlide { request, reply }).await
    }

    pub async fn submit_reaction(&self, symbol: impl Into<String>) -> Result<ReactionOutcome> {
        let symbol = symbol.into();
        self.call(|reply| Command::SubmitReaction { symbol, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<StateUpdate> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    pub async fn attach(&self) -> Result<Attachment> {
        self.call(|reply| Command::Attach { reply }).await
    }

    pub async fn reaction_totals(&self) -> Result<HashMap<String, u64>> {
        self.call(|reply| Command::ReactionTotals { reply }).await?
    }

    /// Applies one remote request. Results are discarded: remote callers only
    /// ever learn about changes through pushed snapshots.
    pub async fn dispatch(&self, request: ClientRequest) -> Result<()> {
        match request {
            ClientRequest::AdvanceSlideForward => {
                self.advance_slide(Direction::Forward).await?;
            }
            ClientRequest::AdvanceSlideBackward => {
                self.advance_slide(Direction::Backward).await?;
            }
            ClientRequest::SetSlide(request) => {
                self.set_slide(request).await?;
            }
            ClientRequest::SubmitReaction(request) => {
                self.submit_reaction(request.reaction).await?;
            }
        }
        Ok(())
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| anyhow!("session '{}' endpoint has stopped", self.name))?;
        response
            .await
            .map_err(|_| anyhow!("session '{}' endpoint dropped the request", self.name))
    }
}

/// Starts the endpoint task for `name`. The task lives until every handle is
/// dropped.
pub fn spawn_session(
    name: SessionName,
    log: Arc<dyn ReactionLog>,
    slide_limit: Option<u32>,
    event_capacity: usize,
) -> SessionHandle {
    let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
    let (events, _) = broadcast::channel(event_capacity.max(1));
    let endpoint = SessionEndpoint {
        name: name.clone(),
        machine: PresentationMachine::new(slide_limit),
        log,
        events,
        revision: 0,
    };
    tokio::spawn(endpoint.run(receiver));
    SessionHandle { name, commands }
}

struct SessionEndpoint {
    name: SessionName,
    machine: PresentationMachine,
    log: Arc<dyn ReactionLog>,
    events: broadcast::Sender<ServerEvent>,
    revision: u64,
}

impl SessionEndpoint {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(session = %self.name, "presentation session started");
        while let Some(command) = commands.recv().await {
            self.handle(command).await;
        }
        info!(session = %self.name, "presentation session stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Advance { direction, reply } => {
                let index = self.machine.advance(direction);
                self.refresh_counts().await;
                info!(session = %self.name, ?direction, index, "advanced slide");
                let _ = reply.send(self.publish());
            }
            Command::SetSlide { request, reply } => {
                let index = self.machine.set_slide(request);
                self.refresh_counts().await;
                info!(
                    session = %self.name,
                    index,
                    live = self.machine.show_live_reactions(),
                    "set slide"
                );
                let _ = reply.send(self.publish());
            }
            Command::SubmitReaction { symbol, reply } => {
                let outcome = self.submit_reaction(&symbol).await;
                let _ = reply.send(outcome);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.current());
            }
            Command::Attach { reply } => {
                debug!(
                    session = %self.name,
                    subscribers = self.events.receiver_count(),
                    "client attached"
                );
                let _ = reply.send(Attachment {
                    snapshot: self.current(),
                    events: self.events.subscribe(),
                });
            }
            Command::ReactionTotals { reply } => {
                let _ = reply.send(self.log.reaction_totals().await);
            }
        }
    }

    async fn submit_reaction(&mut self, symbol: &str) -> Result<ReactionOutcome> {
        if !self.machine.accepts(symbol) {
            warn!(
                session = %self.name,
                reaction = symbol,
                index = self.machine.current_index(),
                "reaction not available on current slide; ignoring"
            );
            return Ok(ReactionOutcome::Ignored);
        }

        let index = self.machine.current_index();
        if let Err(error) = self.log.append_reaction(index, symbol).await {
            error!(
                session = %self.name,
                index,
                reaction = symbol,
                %error,
                "failed to record reaction"
            );
            return Err(error);
        }
        debug!(session = %self.name, index, reaction = symbol, "recorded reaction");

        if self.machine.show_live_reactions() {
            self.refresh_counts().await;
            self.publish();
        }
        Ok(ReactionOutcome::Recorded)
    }

    /// Reloads live counts for the current slide. A failed read leaves the
    /// zeroed counts the machine already holds.
    async fn refresh_counts(&mut self) {
        if !self.machine.show_live_reactions() {
            return;
        }
        let index = self.machine.current_index();
        match self.log.reaction_counts(index).await {
            Ok(recorded) => self.machine.apply_counts(&recorded),
            Err(error) => {
                warn!(
                    session = %self.name,
                    index,
                    %error,
                    "failed to load reaction counts; showing zeros"
                );
            }
        }
    }

    fn current(&self) -> StateUpdate {
        StateUpdate {
            session: self.name.clone(),
            revision: self.revision,
            state: self.machine.state().clone(),
        }
    }

    fn publish(&mut self) -> StateUpdate {
        self.revision += 1;
        let update = self.current();
        // No receivers is fine: nobody is attached yet.
        let _ = self.events.send(ServerEvent::StateUpdated(update.clone()));
        update
    }
}

#[cfg(test)]
#[path = "tests/endpoint_tests.rs"]
mod tests;
