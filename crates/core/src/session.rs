//! Session token negotiation
//!
//! The handshake is a four-state machine driven one message at a time:
//!
//! ```text
//! Init --start--> AwaitEcho --echo--> AwaitResult --result--> Done
//! ```
//!
//! [`Negotiator`] holds the protocol logic and performs no I/O, so every
//! transition can be exercised directly; [`negotiate`] drives it over a
//! [`Channel`] and observes cancellation at each send and receive.

use tokio_util::sync::CancellationToken;

use crate::error::{HandshakeError, HandshakeStage};
use crate::identity::Identity;
use crate::ids::ObjectId;
use crate::token::{Token, TokenBody, ValidityWindow, Verb};
use crate::transport::{self, Channel, Interrupt, Message};

/// What the caller asks a token for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub verb: Verb,
    /// Objects to authorize; empty means container-wide
    pub scope: Vec<ObjectId>,
    pub window: ValidityWindow,
}

impl SessionRequest {
    /// Request with an unbounded validity window
    pub fn new(verb: Verb, scope: impl IntoIterator<Item = ObjectId>) -> Self {
        Self {
            verb,
            scope: scope.into_iter().collect(),
            window: ValidityWindow::unbounded(),
        }
    }

    pub fn with_window(mut self, window: ValidityWindow) -> Self {
        self.window = window;
        self
    }
}

#[derive(Debug)]
enum State {
    Init,
    AwaitEcho { requested: TokenBody },
    AwaitResult { requested: TokenBody },
    Done,
}

/// Outcome of feeding one reply to the negotiator
#[derive(Debug)]
pub enum Step {
    /// Send this message and wait for the next reply
    Send(Message),
    /// Handshake complete
    Finished(Token),
}

/// Handshake state machine
pub struct Negotiator<'a, I: Identity + ?Sized> {
    identity: &'a I,
    request: SessionRequest,
    state: State,
}

impl<'a, I: Identity + ?Sized> Negotiator<'a, I> {
    pub fn new(identity: &'a I, request: SessionRequest) -> Self {
        Self {
            identity,
            request,
            state: State::Init,
        }
    }

    /// Stage the negotiator is waiting in, used to label failures
    pub fn stage(&self) -> HandshakeStage {
        match self.state {
            State::Init => HandshakeStage::SendInit,
            State::AwaitEcho { .. } => HandshakeStage::AwaitEcho,
            State::AwaitResult { .. } | State::Done => HandshakeStage::AwaitResult,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Build the unsigned candidate and move to `AwaitEcho`
    pub fn start(&mut self) -> Message {
        let candidate = TokenBody {
            owner: self.identity.owner_id(),
            scope: self.request.scope.clone(),
            window: self.request.window,
            verb: self.request.verb,
            session_key: self.identity.public_key(),
        };
        self.state = State::AwaitEcho {
            requested: candidate.clone(),
        };
        Message::SessionInit { token: candidate }
    }

    /// Consume one reply from the peer
    pub fn handle(&mut self, reply: Message) -> Result<Step, HandshakeError> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::AwaitEcho { requested } => {
                let Message::SessionEcho { token: echo } = reply else {
                    return Err(HandshakeError::NoEchoToken);
                };
                check_consistent(&requested, &echo).map_err(HandshakeError::TokenEchoMismatch)?;

                let signature = self.identity.sign(&echo.signed_data());
                self.state = State::AwaitResult { requested };
                Ok(Step::Send(Message::SessionConfirm {
                    token: Token {
                        body: echo,
                        signature,
                    },
                }))
            }
            State::AwaitResult { requested } => match reply {
                Message::SessionResult { token } => {
                    if let Err(reason) = check_consistent(&requested, &token.body) {
                        tracing::warn!("Result token rejected: {reason}");
                        return Err(HandshakeError::NoResultToken);
                    }
                    Ok(Step::Finished(token))
                }
                _ => Err(HandshakeError::NoResultToken),
            },
            State::Init => Err(HandshakeError::NoEchoToken),
            State::Done => Err(HandshakeError::NoResultToken),
        }
    }
}

/// The peer may narrow the validity window but not touch identity, verb or
/// scope, and must supply a session key.
fn check_consistent(requested: &TokenBody, received: &TokenBody) -> Result<(), String> {
    if received.owner != requested.owner {
        return Err("owner differs".into());
    }
    if received.verb != requested.verb {
        return Err(format!(
            "verb differs: requested {}, got {}",
            requested.verb, received.verb
        ));
    }
    if received.scope_set() != requested.scope_set() {
        return Err("object scope differs".into());
    }
    if !requested.window.covers(&received.window) {
        return Err(format!(
            "validity window [{}, {}] is not within requested [{}, {}]",
            received.window.first_epoch,
            received.window.last_epoch,
            requested.window.first_epoch,
            requested.window.last_epoch
        ));
    }
    if received.session_key.is_empty() {
        return Err("received empty session public key".into());
    }
    Ok(())
}

fn interrupted(stage: HandshakeStage) -> impl FnOnce(Interrupt) -> HandshakeError {
    move |interrupt| match interrupt {
        Interrupt::Canceled => HandshakeError::Canceled,
        Interrupt::Transport(source) => HandshakeError::Transport { stage, source },
    }
}

/// Run the handshake over `channel` and return the countersigned token.
///
/// Single attempt: any failure aborts, and the channel is closed on every
/// exit path.
pub async fn negotiate<C, I>(
    channel: &mut C,
    identity: &I,
    request: SessionRequest,
    cancel: &CancellationToken,
) -> Result<Token, HandshakeError>
where
    C: Channel + ?Sized,
    I: Identity + ?Sized,
{
    tracing::debug!(verb = %request.verb, objects = request.scope.len(), "Negotiating session");

    let result = drive(channel, Negotiator::new(identity, request), cancel).await;
    let _ = channel.close().await;

    match &result {
        Ok(token) => tracing::debug!(
            first_epoch = token.window().first_epoch,
            last_epoch = token.window().last_epoch,
            "Session established"
        ),
        Err(e) => tracing::debug!("Session negotiation failed: {e}"),
    }
    result
}

async fn drive<C, I>(
    channel: &mut C,
    mut negotiator: Negotiator<'_, I>,
    cancel: &CancellationToken,
) -> Result<Token, HandshakeError>
where
    C: Channel + ?Sized,
    I: Identity + ?Sized,
{
    let init = negotiator.start();
    transport::send(channel, init, cancel)
        .await
        .map_err(interrupted(HandshakeStage::SendInit))?;

    loop {
        let stage = negotiator.stage();
        let reply = transport::recv(channel, cancel)
            .await
            .map_err(interrupted(stage))?;

        let Some(reply) = reply else {
            return Err(match stage {
                HandshakeStage::AwaitEcho => HandshakeError::NoEchoToken,
                _ => HandshakeError::NoResultToken,
            });
        };

        match negotiator.handle(reply)? {
            Step::Send(confirm) => transport::send(channel, confirm, cancel)
                .await
                .map_err(interrupted(HandshakeStage::SendConfirm))?,
            Step::Finished(token) => return Ok(token),
        }
    }
}
