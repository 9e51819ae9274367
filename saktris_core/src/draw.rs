//! Draw detection: the fifty-move rule, threefold repetition and
//! insufficient material.
//!
//! The repetition table is keyed by the full position hash -- side to move,
//! castling rights and en-passant file included -- so superficially equal
//! boards under different rights never collide into a false repetition.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::board::Board;

/// Why a position is drawn. [`DrawReason::as_str`] is the string surfaced
/// in the game-over event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    Stalemate,
    FiftyMoveRule,
    ThreefoldRepetition,
    InsufficientMaterial,
    Agreement,
}

impl DrawReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            DrawReason::Stalemate => "stalemate",
            DrawReason::FiftyMoveRule => "fifty-move rule",
            DrawReason::ThreefoldRepetition => "threefold repetition",
            DrawReason::InsufficientMaterial => "insufficient material",
            DrawReason::Agreement => "mutual agreement",
        }
    }
}

/// Tracks positions seen so far and answers whether the current one is
/// drawn by rule. Stalemate and draw-by-agreement are decided by the game
/// state machine, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawDetector {
    repetitions: HashMap<u64, u32>,
}

impl DrawDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a reached position and returns how many times it has now
    /// occurred. Call once per completed turn with the post-turn hash.
    pub fn record_position(&mut self, hash: u64) -> u32 {
        let count = self.repetitions.entry(hash).or_insert(0);
        *count += 1;
        *count
    }

    pub fn occurrences(&self, hash: u64) -> u32 {
        self.repetitions.get(&hash).copied().unwrap_or(0)
    }

    /// Checks the board against the draw rules, in the order insufficient
    /// material, fifty-move rule, threefold repetition.
    pub fn check(&self, board: &Board) -> Option<DrawReason> {
        if board.insufficient_material() {
            return Some(DrawReason::InsufficientMaterial);
        }

        // Fifty full moves without a pawn move or capture is 100 plies.
        if board.halfmove_clock() >= 100 {
            return Some(DrawReason::FiftyMoveRule);
        }

        if self.occurrences(board.position_hash().get()) >= 3 {
            return Some(DrawReason::ThreefoldRepetition);
        }

        None
    }

    pub fn clear(&mut self) {
        self.repetitions.clear();
    }

    /// The repetition table, for serialization.
    pub fn repetitions(&self) -> &HashMap<u64, u32> {
        &self.repetitions
    }

    pub fn from_repetitions(repetitions: HashMap<u64, u32>) -> Self {
        Self { repetitions }
    }
}
