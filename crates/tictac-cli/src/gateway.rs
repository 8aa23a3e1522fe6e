//! WebSocket gateway
//!
//! Accepts WebSocket clients, owns one coordinator connection per socket and
//! translates request frames into coordinator calls. Events pushed by the
//! coordinator are forwarded as they arrive, interleaved with replies.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use tictac_core::{ConnectionId, ErrorKind, GameError, GameResult};
use tictac_runtime::{ClientConnection, MoveRequest, SessionCoordinator};

use crate::error::Result;
use crate::protocol::{parse_frame, ClientRequest, Reply, ReplyData, BAD_REQUEST};

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

pub struct Gateway {
    listener: TcpListener,
    coordinator: Arc<SessionCoordinator>,
}

impl Gateway {
    pub async fn bind(addr: SocketAddr, coordinator: Arc<SessionCoordinator>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            coordinator,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until the task is cancelled
    pub async fn run(self) -> Result<()> {
        info!("Gateway listening on {}", self.local_addr()?);
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            let coordinator = self.coordinator.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_socket(stream, peer, coordinator).await {
                    debug!("Connection from {} ended with error: {}", peer, e);
                }
            });
        }
    }
}

async fn serve_socket(
    stream: TcpStream,
    peer: SocketAddr,
    coordinator: Arc<SessionCoordinator>,
) -> Result<()> {
    let socket = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = socket.split();
    let ClientConnection { id, mut events } = coordinator.connect();
    debug!("Connection {} opened from {}", id, peer);

    let mut client = ClientState::new(id);
    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if let Err(e) = send_json(&mut sink, &event).await {
                        break Err(e);
                    }
                }
                None => {
                    debug!("Connection {} closed by the server", id);
                    let _ = sink.send(Message::Close(None)).await;
                    break Ok(());
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = client.handle_frame(&coordinator, &text).await;
                    if let Err(e) = send_json(&mut sink, &reply).await {
                        break Err(e);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
        }
    };

    coordinator.disconnect(id);
    debug!("Connection {} from {} closed", id, peer);
    outcome
}

async fn send_json<S, T>(sink: &mut S, value: &T) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
    T: Serialize,
{
    let text = serde_json::to_string(value)?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Per-socket request handling
// ----------------------------------------------------------------------------

/// What the gateway remembers about one socket
pub struct ClientState {
    connection: ConnectionId,
    credential: Option<String>,
}

impl ClientState {
    pub fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            credential: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    pub async fn handle_frame(&mut self, coordinator: &SessionCoordinator, text: &str) -> Reply {
        let (id, request) = parse_frame(text);
        let request = match request {
            Ok(request) => request,
            Err(message) => return Reply::failure(id, BAD_REQUEST, message),
        };
        match self.execute(coordinator, request).await {
            Ok(data) => Reply::success(id, data),
            Err(e) => {
                if e.kind() == ErrorKind::Internal {
                    warn!("Request on connection {} failed: {}", self.connection, e);
                } else {
                    debug!("Request on connection {} refused: {}", self.connection, e);
                }
                Reply::from_error(id, &e)
            }
        }
    }

    async fn execute(
        &mut self,
        coordinator: &SessionCoordinator,
        request: ClientRequest,
    ) -> GameResult<ReplyData> {
        let origin = Some(self.connection);
        let credential = match (&self.credential, request.is_anonymous()) {
            (Some(credential), _) => credential.clone(),
            (None, true) => String::new(),
            (None, false) => return Err(GameError::Unauthenticated),
        };

        let data = match request {
            ClientRequest::Authenticate { token } => {
                let identity = coordinator.authenticate(self.connection, &token).await?;
                self.credential = Some(token);
                ReplyData::Identity(identity)
            }
            ClientRequest::JoinGame { session_id } => ReplyData::Joined {
                session_id,
                joined: coordinator.join_room(self.connection, session_id),
            },
            ClientRequest::LeaveRoom { session_id } => {
                coordinator.leave_room(self.connection, session_id);
                ReplyData::Ack
            }
            ClientRequest::Challenge { opponent_id } => {
                ReplyData::Session(coordinator.challenge(&credential, opponent_id).await?)
            }
            ClientRequest::Sessions => ReplyData::Views(coordinator.list_my_sessions(&credential).await?),
            ClientRequest::Accept { session_id } => {
                ReplyData::Session(coordinator.accept_challenge(&credential, session_id).await?)
            }
            ClientRequest::Reject { session_id } => {
                ReplyData::Session(coordinator.reject_challenge(&credential, session_id).await?)
            }
            ClientRequest::Move {
                session_id,
                board,
                next_turn,
                winner_id,
            } => {
                let request = MoveRequest {
                    board,
                    next_turn,
                    winner_id,
                };
                ReplyData::Session(coordinator.submit_move(&credential, session_id, request).await?)
            }
            ClientRequest::Session { session_id } => {
                ReplyData::View(coordinator.get_session(&credential, session_id).await?)
            }
            ClientRequest::RequestRematch { session_id } => {
                coordinator.request_rematch(&credential, session_id, origin).await?;
                ReplyData::Ack
            }
            ClientRequest::AcceptRematch { session_id } => {
                ReplyData::Session(coordinator.accept_rematch(&credential, session_id).await?)
            }
            ClientRequest::RejectRematch { session_id } => {
                coordinator.reject_rematch(&credential, session_id, origin).await?;
                ReplyData::Ack
            }
            ClientRequest::LeaveGame { session_id } => {
                coordinator.leave_session(&credential, session_id, origin).await?;
                ReplyData::Ack
            }
            ClientRequest::Stats => ReplyData::Stats(coordinator.get_my_stats(&credential).await?),
            ClientRequest::ResetStats => ReplyData::Stats(coordinator.reset_my_stats(&credential).await?),
            ClientRequest::Result { outcome } => {
                ReplyData::Stats(coordinator.record_result(&credential, outcome).await?)
            }
            ClientRequest::Presence => {
                ReplyData::Presence(coordinator.presence_snapshot(&credential).await?)
            }
        };
        Ok(data)
    }
}
