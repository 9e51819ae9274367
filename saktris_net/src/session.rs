//! The peer session: applies the game protocol to a local
//! [`GameState`].
//!
//! Both peers run the same deterministic rules engine from the same seed,
//! so a remote action replayed locally yields the identical position; the
//! StateHash exchanged after every action verifies exactly that. The host
//! is authoritative: on a mismatch the guest requests a resync and rebuilds
//! from the host's FullState payload.
//!
//! All methods run on the host loop. Time is injected (`now`) so the ACK
//! and ping clocks are testable.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde_json::Value;

use saktris_core::board::{PieceKind, Side, Square};
use saktris_core::game::{EventSink, GameError, GameSettings, GameState, SaveError, SaveGame};

use crate::protocol::{
    Envelope, GameStartPayload, MovePayload, PeerMessage, PlacementPayload, PromotionPayload,
};
use crate::NetError;

pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);
pub const PING_INTERVAL: Duration = Duration::from_secs(5);
/// Repeated ACK timeouts before the connection is flagged as likely dead.
pub const DEAD_CONNECTION_STRIKES: u32 = 3;

/// A reliable, ordered peer-to-peer text channel. The shipped game backs
/// this with its data-channel transport; tests use [`loopback_pair`].
pub trait DataChannel {
    fn send(&mut self, text: &str) -> Result<(), NetError>;
    fn try_recv(&mut self) -> Result<Option<String>, NetError>;
}

/// An in-memory channel pair with the same ordering guarantees as the real
/// transport.
pub struct LoopbackChannel {
    tx: Sender<String>,
    rx: Receiver<String>,
}

pub fn loopback_pair() -> (LoopbackChannel, LoopbackChannel) {
    let (a_tx, a_rx) = crossbeam_channel::unbounded();
    let (b_tx, b_rx) = crossbeam_channel::unbounded();
    (
        LoopbackChannel { tx: a_tx, rx: b_rx },
        LoopbackChannel { tx: b_tx, rx: a_rx },
    )
}

impl DataChannel for LoopbackChannel {
    fn send(&mut self, text: &str) -> Result<(), NetError> {
        self.tx
            .send(text.to_owned())
            .map_err(|_| NetError::TransportClosed)
    }

    fn try_recv(&mut self) -> Result<Option<String>, NetError> {
        match self.rx.try_recv() {
            Ok(text) => Ok(Some(text)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(NetError::TransportClosed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Host,
    Guest,
}

/// What the session reports back to the host loop each poll.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Guest only: the host started the game. The host loop builds its
    /// GameState from the seed and settings and then sends GameReady.
    GameStartReceived {
        seed: u64,
        settings: GameSettings,
        local_side: Side,
    },
    PeerReady,
    RemoteActionApplied {
        seq: u32,
    },
    HashMismatch {
        remote: u64,
        local: u64,
        move_count: u32,
    },
    /// Guest only: the host's FullState arrived; the host loop applies it
    /// via [`PeerSession::apply_full_state`].
    FullStateReceived {
        state: Value,
    },
    AckTimedOut {
        seq: u32,
    },
    ConnectionSuspect,
    PingMeasured {
        rtt: Duration,
    },
    RemoteResigned,
    DrawOffered,
    DrawAccepted,
    DrawDeclined,
    RematchOffered,
    RematchAccepted,
    RematchDeclined,
    ProtocolViolation {
        detail: String,
    },
}

struct PendingAck {
    seq: u32,
    encoded: String,
    sent_at: Instant,
    nudged: bool,
}

pub struct PeerSession {
    role: PeerRole,
    local_side: Option<Side>,
    next_seq: u32,
    last_remote_seq: u32,
    pending_acks: Vec<PendingAck>,
    timeout_strikes: u32,
    suspect_reported: bool,
    last_ping_sent: Option<Instant>,
    ping_in_flight: Option<Instant>,
    rtt: Option<Duration>,
    inert: bool,
}

impl PeerSession {
    /// A host session. The host knows its side up front; it is broadcast
    /// in GameStart.
    pub fn host(local_side: Side) -> Self {
        Self::new(PeerRole::Host, Some(local_side))
    }

    /// A guest session. The local side is learned from GameStart.
    pub fn guest() -> Self {
        Self::new(PeerRole::Guest, None)
    }

    fn new(role: PeerRole, local_side: Option<Side>) -> Self {
        Self {
            role,
            local_side,
            next_seq: 1,
            last_remote_seq: 0,
            pending_acks: Vec::new(),
            timeout_strikes: 0,
            suspect_reported: false,
            last_ping_sent: None,
            ping_in_flight: None,
            rtt: None,
            inert: false,
        }
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn local_side(&self) -> Option<Side> {
        self.local_side
    }

    /// Last measured round trip, if a ping has completed.
    pub fn rtt(&self) -> Option<Duration> {
        self.rtt
    }

    pub fn is_inert(&self) -> bool {
        self.inert
    }

    /// Detaches the session from the game: pending ACKs are discarded and
    /// no further actions (local or remote) are accepted.
    pub fn disconnect(&mut self) {
        self.inert = true;
        self.pending_acks.clear();
    }

    /// Host only: starts the networked game by broadcasting the seed,
    /// settings and side assignment.
    pub fn send_game_start(
        &mut self,
        channel: &mut dyn DataChannel,
        seed: u64,
        settings: &GameSettings,
    ) -> Result<(), NetError> {
        self.ensure_active()?;
        if self.role != PeerRole::Host {
            return Err(NetError::NotHost);
        }
        let host_side = self.local_side.ok_or(NetError::NoLocalSide)?;

        self.send_message(
            channel,
            PeerMessage::GameStart(GameStartPayload {
                seed,
                settings: settings.clone(),
                host_side,
            }),
        )
    }

    pub fn send_game_ready(&mut self, channel: &mut dyn DataChannel) -> Result<(), NetError> {
        self.ensure_active()?;
        self.send_message(channel, PeerMessage::GameReady)
    }

    /// Applies a local move and announces it (plus the resulting state
    /// hash) to the peer.
    pub fn submit_move(
        &mut self,
        game: &mut GameState,
        channel: &mut dyn DataChannel,
        from: Square,
        to: Square,
        now: Instant,
    ) -> Result<(), NetError> {
        self.ensure_local_turn(game)?;
        game.request_move(from, to)?;

        let seq = self.take_seq();
        self.send_tracked(
            channel,
            PeerMessage::Move(MovePayload::new(from, to, seq)),
            seq,
            now,
        )?;
        self.send_state_hash(game, channel)
    }

    /// Applies a local placement and announces it.
    pub fn submit_placement(
        &mut self,
        game: &mut GameState,
        channel: &mut dyn DataChannel,
        column: u8,
        choice: Option<usize>,
        now: Instant,
    ) -> Result<(), NetError> {
        self.ensure_local_turn(game)?;
        if let Some(index) = choice {
            game.select_arrival(index)?;
        }
        game.request_placement(column)?;

        let seq = self.take_seq();
        self.send_tracked(
            channel,
            PeerMessage::Placement(PlacementPayload {
                column,
                choice,
                seq,
            }),
            seq,
            now,
        )?;
        self.send_state_hash(game, channel)
    }

    /// Resolves a local promotion and announces it.
    pub fn submit_promotion(
        &mut self,
        game: &mut GameState,
        channel: &mut dyn DataChannel,
        kind: PieceKind,
        now: Instant,
    ) -> Result<(), NetError> {
        self.ensure_active()?;
        game.choose_promotion(kind)?;

        let seq = self.take_seq();
        self.send_tracked(
            channel,
            PeerMessage::Promotion(PromotionPayload {
                piece_kind: kind,
                seq,
            }),
            seq,
            now,
        )?;
        self.send_state_hash(game, channel)
    }

    /// Resigns locally and tells the peer.
    pub fn submit_resign(
        &mut self,
        game: &mut GameState,
        channel: &mut dyn DataChannel,
    ) -> Result<(), NetError> {
        self.ensure_active()?;
        let side = self.local_side.ok_or(NetError::NoLocalSide)?;
        game.request_resign(side)?;
        self.send_message(channel, PeerMessage::Resign)
    }

    pub fn send_draw_offer(
        &mut self,
        game: &mut GameState,
        channel: &mut dyn DataChannel,
    ) -> Result<(), NetError> {
        self.ensure_active()?;
        let side = self.local_side.ok_or(NetError::NoLocalSide)?;
        game.offer_draw(side)?;
        self.send_message(channel, PeerMessage::DrawOffer)
    }

    pub fn respond_draw_offer(
        &mut self,
        game: &mut GameState,
        channel: &mut dyn DataChannel,
        accept: bool,
    ) -> Result<(), NetError> {
        self.ensure_active()?;
        game.respond_draw_offer(accept)?;
        let reply = if accept {
            PeerMessage::DrawAccept
        } else {
            PeerMessage::DrawDecline
        };
        self.send_message(channel, reply)
    }

    /// Guest only: rebuilds the game from the host's FullState payload.
    /// Clock timings are not deterministic across peers, so the local
    /// clock is kept and the host's is discarded.
    pub fn apply_full_state(
        &mut self,
        game: &mut GameState,
        state: Value,
        events: Box<dyn EventSink>,
    ) -> Result<(), SaveError> {
        let mut save = match serde_json::from_value::<SaveGame>(state) {
            Ok(save) => save,
            Err(err) => {
                self.inert = true;
                return Err(SaveError::Malformed(err));
            }
        };
        save.clock = game.clock().cloned();

        match GameState::from_save(save, events) {
            Ok(rebuilt) => {
                *game = rebuilt;
                tracing::info!(
                    hash = game.position_hash(),
                    move_count = game.move_counter(),
                    "resynced to host state"
                );
                Ok(())
            }
            Err(err) => {
                // A FullState that fails validation cannot preserve the
                // core invariants; the session goes inert.
                tracing::error!(%err, "host FullState failed validation");
                self.inert = true;
                Err(err)
            }
        }
    }

    /// Drains the channel, applies remote actions, answers pings, verifies
    /// state hashes and maintains the ACK clock. Call once per frame.
    ///
    /// `game` is [`None`] before GameStart has been processed.
    pub fn poll(
        &mut self,
        mut game: Option<&mut GameState>,
        channel: &mut dyn DataChannel,
        now: Instant,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.inert {
            return events;
        }

        loop {
            let text = match channel.try_recv() {
                Ok(Some(text)) => text,
                Ok(None) => break,
                Err(_) => {
                    self.disconnect();
                    return events;
                }
            };

            let envelope = match Envelope::decode(&text) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::warn!(%err, "dropping malformed peer message");
                    events.push(SessionEvent::ProtocolViolation {
                        detail: err.to_string(),
                    });
                    continue;
                }
            };

            self.handle_message(envelope.message, game.as_deref_mut(), channel, now, &mut events);
        }

        self.maintain_ping(channel, now);
        self.maintain_acks(channel, now, &mut events);

        events
    }

    fn handle_message(
        &mut self,
        message: PeerMessage,
        game: Option<&mut GameState>,
        channel: &mut dyn DataChannel,
        now: Instant,
        events: &mut Vec<SessionEvent>,
    ) {
        match message {
            PeerMessage::Ping => {
                let _ = self.send_message(channel, PeerMessage::Pong);
            }
            PeerMessage::Pong => {
                if let Some(sent_at) = self.ping_in_flight.take() {
                    let rtt = now.saturating_duration_since(sent_at);
                    self.rtt = Some(rtt);
                    events.push(SessionEvent::PingMeasured { rtt });
                }
            }
            PeerMessage::GameStart(payload) => {
                if self.role == PeerRole::Guest {
                    let local_side = payload.host_side.flip();
                    self.local_side = Some(local_side);
                    events.push(SessionEvent::GameStartReceived {
                        seed: payload.seed,
                        settings: payload.settings,
                        local_side,
                    });
                } else {
                    events.push(SessionEvent::ProtocolViolation {
                        detail: "GameStart received by the host".to_owned(),
                    });
                }
            }
            PeerMessage::GameReady => events.push(SessionEvent::PeerReady),
            PeerMessage::Move(payload) => {
                self.apply_remote_action(game, channel, payload.seq, events, |game| {
                    let from = payload.from_square().ok_or_else(bad_coordinates)?;
                    let to = payload.to_square().ok_or_else(bad_coordinates)?;
                    game.request_move(from, to)
                });
            }
            PeerMessage::Placement(payload) => {
                self.apply_remote_action(game, channel, payload.seq, events, |game| {
                    if let Some(index) = payload.choice {
                        game.select_arrival(index)?;
                    }
                    game.request_placement(payload.column)
                });
            }
            PeerMessage::Promotion(payload) => {
                self.apply_remote_action(game, channel, payload.seq, events, |game| {
                    game.choose_promotion(payload.piece_kind)
                });
            }
            PeerMessage::Ack { seq } => {
                self.pending_acks.retain(|p| p.seq != seq);
            }
            PeerMessage::StateHash { hash, move_count } => {
                self.verify_state_hash(game, channel, hash, move_count, events);
            }
            PeerMessage::ResyncRequest => {
                if self.role == PeerRole::Host {
                    if let Some(game) = game {
                        match game.to_value() {
                            Ok(state) => {
                                tracing::info!("sending FullState for resync");
                                let _ = self
                                    .send_message(channel, PeerMessage::FullState { state });
                            }
                            Err(err) => {
                                tracing::error!(%err, "could not serialize state for resync");
                            }
                        }
                    }
                }
            }
            PeerMessage::FullState { state } => {
                if self.role == PeerRole::Guest {
                    events.push(SessionEvent::FullStateReceived { state });
                } else {
                    events.push(SessionEvent::ProtocolViolation {
                        detail: "FullState received by the host".to_owned(),
                    });
                }
            }
            PeerMessage::Resign => {
                if let (Some(game), Some(local)) = (game, self.local_side) {
                    let _ = game.request_resign(local.flip());
                }
                events.push(SessionEvent::RemoteResigned);
            }
            PeerMessage::DrawOffer => {
                if let (Some(game), Some(local)) = (game, self.local_side) {
                    let _ = game.offer_draw(local.flip());
                }
                events.push(SessionEvent::DrawOffered);
            }
            PeerMessage::DrawAccept => {
                if let Some(game) = game {
                    let _ = game.respond_draw_offer(true);
                }
                events.push(SessionEvent::DrawAccepted);
            }
            PeerMessage::DrawDecline => {
                if let Some(game) = game {
                    let _ = game.respond_draw_offer(false);
                }
                events.push(SessionEvent::DrawDeclined);
            }
            PeerMessage::RematchOffer => events.push(SessionEvent::RematchOffered),
            PeerMessage::RematchAccept => events.push(SessionEvent::RematchAccepted),
            PeerMessage::RematchDecline => events.push(SessionEvent::RematchDeclined),
        }
    }

    /// Common handling for remote Move/Placement/Promotion: sequence
    /// discipline, terminal-game acknowledgment, application, ACK.
    fn apply_remote_action(
        &mut self,
        game: Option<&mut GameState>,
        channel: &mut dyn DataChannel,
        seq: u32,
        events: &mut Vec<SessionEvent>,
        apply: impl FnOnce(&mut GameState) -> Result<(), GameError>,
    ) {
        let Some(game) = game else {
            events.push(SessionEvent::ProtocolViolation {
                detail: format!("game action seq {seq} before GameStart"),
            });
            return;
        };

        // A finished game ignores further actions but still acknowledges
        // them so the peer's ACK clock stays quiet.
        if game.status().is_terminal() {
            let _ = self.send_message(channel, PeerMessage::Ack { seq });
            return;
        }

        let expected = self.last_remote_seq + 1;
        if seq != expected {
            tracing::warn!(seq, expected, "remote action out of order");
            events.push(SessionEvent::ProtocolViolation {
                detail: format!("expected seq {expected}, got {seq}"),
            });
            self.request_resync(channel);
            return;
        }

        match apply(game) {
            Ok(()) => {
                self.last_remote_seq = seq;
                let _ = self.send_message(channel, PeerMessage::Ack { seq });
                events.push(SessionEvent::RemoteActionApplied { seq });
            }
            Err(err) => {
                tracing::warn!(%err, seq, "remote action was rejected locally");
                events.push(SessionEvent::ProtocolViolation {
                    detail: format!("remote action {seq} rejected: {err}"),
                });
                self.request_resync(channel);
            }
        }
    }

    fn verify_state_hash(
        &mut self,
        game: Option<&mut GameState>,
        channel: &mut dyn DataChannel,
        remote: u64,
        move_count: u32,
        events: &mut Vec<SessionEvent>,
    ) {
        let Some(game) = game else { return };
        if game.move_counter() != move_count {
            // The hash refers to a state we have not reached (or have
            // passed); the next one will line up.
            tracing::debug!(
                remote_count = move_count,
                local_count = game.move_counter(),
                "state hash at a different move count, skipping"
            );
            return;
        }

        let local = game.position_hash();
        if local != remote {
            tracing::warn!(remote, local, move_count, "state hash mismatch");
            events.push(SessionEvent::HashMismatch {
                remote,
                local,
                move_count,
            });
            // The host is authoritative; only the guest resyncs.
            self.request_resync(channel);
        }
    }

    fn request_resync(&mut self, channel: &mut dyn DataChannel) {
        if self.role == PeerRole::Guest {
            let _ = self.send_message(channel, PeerMessage::ResyncRequest);
        }
    }

    fn maintain_ping(&mut self, channel: &mut dyn DataChannel, now: Instant) {
        let due = match self.last_ping_sent {
            Some(last) => now.saturating_duration_since(last) >= PING_INTERVAL,
            None => true,
        };
        if due && self.send_message(channel, PeerMessage::Ping).is_ok() {
            self.last_ping_sent = Some(now);
            self.ping_in_flight = Some(now);
        }
    }

    fn maintain_acks(
        &mut self,
        channel: &mut dyn DataChannel,
        now: Instant,
        events: &mut Vec<SessionEvent>,
    ) {
        let mut resend = Vec::new();

        for pending in &mut self.pending_acks {
            if now.saturating_duration_since(pending.sent_at) < ACK_TIMEOUT {
                continue;
            }

            tracing::warn!(seq = pending.seq, "no ACK within timeout");
            events.push(SessionEvent::AckTimedOut { seq: pending.seq });
            self.timeout_strikes += 1;
            pending.sent_at = now;

            if !pending.nudged {
                // One resend, then we only count strikes.
                pending.nudged = true;
                resend.push(pending.encoded.clone());
            }
        }

        for encoded in resend {
            let _ = channel.send(&encoded);
        }

        if self.timeout_strikes >= DEAD_CONNECTION_STRIKES && !self.suspect_reported {
            tracing::warn!(
                strikes = self.timeout_strikes,
                "connection is likely dead"
            );
            self.suspect_reported = true;
            events.push(SessionEvent::ConnectionSuspect);
        }
    }

    fn ensure_active(&self) -> Result<(), NetError> {
        if self.inert {
            Err(NetError::SessionInert)
        } else {
            Ok(())
        }
    }

    fn ensure_local_turn(&self, game: &GameState) -> Result<(), NetError> {
        self.ensure_active()?;
        let side = self.local_side.ok_or(NetError::NoLocalSide)?;
        if game.side_to_move() != side {
            return Err(NetError::NotYourTurn);
        }
        Ok(())
    }

    fn take_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn send_state_hash(
        &mut self,
        game: &GameState,
        channel: &mut dyn DataChannel,
    ) -> Result<(), NetError> {
        self.send_message(
            channel,
            PeerMessage::StateHash {
                hash: game.position_hash(),
                move_count: game.move_counter(),
            },
        )
    }

    fn send_tracked(
        &mut self,
        channel: &mut dyn DataChannel,
        message: PeerMessage,
        seq: u32,
        now: Instant,
    ) -> Result<(), NetError> {
        let encoded = Envelope::now(message).encode()?;
        channel.send(&encoded)?;
        self.pending_acks.push(PendingAck {
            seq,
            encoded,
            sent_at: now,
            nudged: false,
        });
        Ok(())
    }

    fn send_message(
        &mut self,
        channel: &mut dyn DataChannel,
        message: PeerMessage,
    ) -> Result<(), NetError> {
        let encoded = Envelope::now(message).encode()?;
        channel.send(&encoded)
    }
}

fn bad_coordinates() -> GameError {
    GameError::Rules(saktris_core::board::RulesError::InvalidPosition)
}
