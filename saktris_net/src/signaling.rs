//! The signaling client: message schema for the relay and the connection
//! state machine that tracks a client from offline through lobby to a live
//! peer connection.
//!
//! The transport is injected. The relay speaks line-delimited JSON; how
//! those lines travel (a WebSocket in the shipped game) is outside the
//! core. The state machine is driven from the host loop: call
//! [`SignalingClient::poll`] once per frame.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::room_code::validate_room_code;
use crate::NetError;

/// Client-to-server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    Create,
    Join {
        code: String,
    },
    Leave,
    Signal {
        signal_type: SignalKind,
        #[serde(flatten)]
        payload: Value,
    },
}

/// Server-to-client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Created {
        code: String,
    },
    Joined {
        code: String,
    },
    Error {
        message: String,
    },
    PeerJoined,
    PeerLeft,
    Signal {
        signal_type: SignalKind,
        #[serde(flatten)]
        payload: Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    Ice,
}

/// The client-side connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Offline,
    ConnectingToServer,
    InLobby,
    ConnectingToPeer,
    Connected,
    Disconnected,
    Error,
}

/// Events surfaced to the host loop, state changes included.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    StateChanged(ConnectionState),
    RoomCreated(String),
    RoomJoined(String),
    PeerJoined,
    PeerLeft,
    SignalReceived { signal_type: SignalKind, payload: Value },
    SignalingError(String),
}

/// How lines reach and leave the relay.
pub trait SignalingTransport {
    fn send_line(&mut self, line: &str) -> Result<(), NetError>;
    fn poll_line(&mut self) -> Result<Option<String>, NetError>;
}

pub struct SignalingClient {
    state: ConnectionState,
    room_code: Option<String>,
    is_host: bool,
    connect_deadline: Option<Instant>,
    pending: VecDeque<SignalingEvent>,
}

impl SignalingClient {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Offline,
            room_code: None,
            is_host: false,
            connect_deadline: None,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Marks the start of the transport's connection attempt; `poll` fails
    /// the state machine over to `Error` if the transport does not open
    /// within `timeout`.
    pub fn begin_connect(&mut self, timeout: Duration, now: Instant) {
        self.connect_deadline = Some(now + timeout);
        self.set_state(ConnectionState::ConnectingToServer);
    }

    /// The transport reports its connection is up.
    pub fn transport_opened(&mut self) {
        self.connect_deadline = None;
        self.set_state(ConnectionState::InLobby);
    }

    /// The transport reports its connection is gone.
    pub fn transport_closed(&mut self) {
        self.room_code = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// The data channel to the peer is open; the game can start.
    pub fn data_channel_opened(&mut self) {
        self.set_state(ConnectionState::Connected);
    }

    pub fn create_room(
        &mut self,
        transport: &mut dyn SignalingTransport,
    ) -> Result<(), NetError> {
        self.is_host = true;
        self.send(transport, &ClientRequest::Create)
    }

    pub fn join_room(
        &mut self,
        transport: &mut dyn SignalingTransport,
        code: &str,
    ) -> Result<(), NetError> {
        validate_room_code(code)?;
        self.is_host = false;
        self.send(
            transport,
            &ClientRequest::Join {
                code: code.to_owned(),
            },
        )
    }

    /// Leaves the room and returns to the lobby. Pending peer state is
    /// forgotten.
    pub fn leave_room(
        &mut self,
        transport: &mut dyn SignalingTransport,
    ) -> Result<(), NetError> {
        self.room_code = None;
        self.send(transport, &ClientRequest::Leave)?;
        self.set_state(ConnectionState::InLobby);
        Ok(())
    }

    pub fn send_signal(
        &mut self,
        transport: &mut dyn SignalingTransport,
        signal_type: SignalKind,
        payload: Value,
    ) -> Result<(), NetError> {
        self.send(
            transport,
            &ClientRequest::Signal {
                signal_type,
                payload,
            },
        )
    }

    /// Drains the transport and advances the state machine. Call once per
    /// frame; returns the events that occurred.
    pub fn poll(
        &mut self,
        transport: &mut dyn SignalingTransport,
        now: Instant,
    ) -> Vec<SignalingEvent> {
        if self.state == ConnectionState::ConnectingToServer {
            if let Some(deadline) = self.connect_deadline {
                if now >= deadline {
                    tracing::warn!("signaling connect timed out");
                    self.connect_deadline = None;
                    self.pending.push_back(SignalingEvent::SignalingError(
                        "connection to signaling server timed out".to_owned(),
                    ));
                    self.set_state(ConnectionState::Error);
                }
            }
        }

        loop {
            match transport.poll_line() {
                Ok(Some(line)) => self.handle_line(&line),
                Ok(None) => break,
                Err(_) => {
                    self.transport_closed();
                    break;
                }
            }
        }

        self.pending.drain(..).collect()
    }

    fn handle_line(&mut self, line: &str) {
        let event: ServerEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(%err, "dropping malformed signaling message");
                self.pending
                    .push_back(SignalingEvent::SignalingError(err.to_string()));
                return;
            }
        };

        match event {
            ServerEvent::Created { code } => {
                tracing::info!(%code, "room created");
                self.room_code = Some(code.clone());
                self.pending.push_back(SignalingEvent::RoomCreated(code));
            }
            ServerEvent::Joined { code } => {
                tracing::info!(%code, "joined room");
                self.room_code = Some(code.clone());
                self.pending.push_back(SignalingEvent::RoomJoined(code));
                // A successful join means a host is waiting; the signal
                // exchange starts now.
                self.set_state(ConnectionState::ConnectingToPeer);
            }
            ServerEvent::PeerJoined => {
                tracing::info!("peer joined the room");
                self.pending.push_back(SignalingEvent::PeerJoined);
                self.set_state(ConnectionState::ConnectingToPeer);
            }
            ServerEvent::PeerLeft => {
                tracing::info!("peer left the room");
                self.pending.push_back(SignalingEvent::PeerLeft);
                let next = if self.state == ConnectionState::Connected {
                    ConnectionState::Disconnected
                } else {
                    ConnectionState::InLobby
                };
                self.set_state(next);
            }
            ServerEvent::Error { message } => {
                tracing::warn!(%message, "signaling server error");
                self.pending
                    .push_back(SignalingEvent::SignalingError(message));
            }
            ServerEvent::Signal {
                signal_type,
                payload,
            } => {
                self.pending.push_back(SignalingEvent::SignalReceived {
                    signal_type,
                    payload,
                });
            }
        }
    }

    fn send(
        &mut self,
        transport: &mut dyn SignalingTransport,
        request: &ClientRequest,
    ) -> Result<(), NetError> {
        let line = serde_json::to_string(request)
            .map_err(crate::protocol::ProtocolError::Malformed)?;
        transport.send_line(&line)
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "signaling state change");
            self.state = state;
            self.pending
                .push_back(SignalingEvent::StateChanged(state));
        }
    }
}

impl Default for SignalingClient {
    fn default() -> Self {
        Self::new()
    }
}
