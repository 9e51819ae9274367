//! The networking core for two-player games: the signaling-client state
//! machine and message schema, room codes, the peer-to-peer game protocol
//! (sequence numbers, ACKs, state-hash verification, resync) and the
//! session that applies remote actions to a local
//! [`GameState`](saktris_core::game::GameState).
//!
//! Transports are a trait seam. Signaling is line-delimited JSON over
//! whatever carries it; the game protocol assumes a reliable ordered data
//! channel. The crate ships an in-memory loopback channel that the tests
//! (and the determinism acceptance scenario) run both peers over.

use thiserror::Error;

pub mod protocol;
pub mod room_code;
pub mod session;
pub mod signaling;

use protocol::ProtocolError;
use room_code::RoomCodeError;
use saktris_core::game::GameError;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("transport closed")]
    TransportClosed,
    #[error("session is no longer accepting actions")]
    SessionInert,
    #[error("it is not the local side's turn")]
    NotYourTurn,
    #[error("operation requires the host role")]
    NotHost,
    #[error("the local side is not known yet")]
    NoLocalSide,
    #[error("invalid room code: {0}")]
    RoomCode(#[from] RoomCodeError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Game(#[from] GameError),
}
