//! The peer-to-peer game protocol: a JSON envelope `{type, data, ts}`
//! whose message types mirror the game state machine's transitions.
//!
//! Encoding and decoding must be structurally lossless (modulo `ts`, which
//! is the sender's wall clock and informational only): the receiving peer
//! replays the action through the same deterministic rules engine, so the
//! payloads carry coordinates and choices, never derived state.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use saktris_core::board::{PieceKind, Side, Square};
use saktris_core::game::GameSettings;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The wire envelope. `ts` is the sender's Unix time in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub message: PeerMessage,
    pub ts: u64,
}

impl Envelope {
    /// Wraps a message with the current wall-clock timestamp.
    pub fn now(message: PeerMessage) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self { message, ts }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Every message the peers exchange after the data channel opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PeerMessage {
    Ping,
    Pong,
    /// Host to guest only; the guest infers its own side as the opposite
    /// of `host_side`.
    GameStart(GameStartPayload),
    GameReady,
    Move(MovePayload),
    Placement(PlacementPayload),
    Promotion(PromotionPayload),
    Ack { seq: u32 },
    StateHash { hash: u64, move_count: u32 },
    /// The serialized game; only the host ever sends this authoritatively.
    FullState { state: Value },
    ResyncRequest,
    Resign,
    DrawOffer,
    DrawAccept,
    DrawDecline,
    RematchOffer,
    RematchAccept,
    RematchDecline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStartPayload {
    pub seed: u64,
    pub settings: GameSettings,
    pub host_side: Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePayload {
    /// `[file, rank]`, zero-based.
    pub from: [u8; 2],
    pub to: [u8; 2],
    pub seq: u32,
}

impl MovePayload {
    pub fn new(from: Square, to: Square, seq: u32) -> Self {
        Self {
            from: [from.file(), from.rank()],
            to: [to.file(), to.rank()],
            seq,
        }
    }

    pub fn from_square(&self) -> Option<Square> {
        Square::new(self.from[0], self.from[1])
    }

    pub fn to_square(&self) -> Option<Square> {
        Square::new(self.to[0], self.to[1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementPayload {
    pub column: u8,
    /// Which of the offered kinds was chosen (Selectable mode only; absent
    /// means the first).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<usize>,
    pub seq: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionPayload {
    pub piece_kind: PieceKind,
    pub seq: u32,
}
