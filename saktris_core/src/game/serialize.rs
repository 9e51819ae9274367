//! Save-file serialization: a self-describing JSON map of the whole game.
//!
//! Reads are forward compatible: unknown keys are ignored and missing keys
//! take defaults (White to move, move counter zero, no clock, empty draw
//! state, arrival config from the embedded settings). The network layer
//! reuses this exact shape as the FULL_STATE resync payload, so a load that
//! fails validation is a fatal desync there.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{EventSink, GameSettings, GameState, GameStatus, HistoryEntry, TurnPhase};
use crate::arrival::{ArrivalManager, ArrivalManagerState, ArrivalMode, SideQueueState};
use crate::board::{Board, MoveBuilder, Piece, Side, Square};
use crate::clock::ChessClock;
use crate::draw::DrawDetector;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("malformed save payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid game state: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveGame {
    /// Absent in minimal saves: defaults to the seeded-kings opening
    /// position.
    pub board: Option<SaveBoard>,
    pub side_to_move: Side,
    pub move_counter: u32,
    pub arrival_config: ArrivalConfig,
    pub arrival_queues: [SideQueueState; 2],
    pub clock: Option<ChessClock>,
    pub status: GameStatus,
    pub move_history: Vec<HistoryEntry>,
    pub draw_state: DrawState,
    pub captures: [Vec<Piece>; 2],
    pub settings: GameSettings,
    pub turn_phase: SavePhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveBoard {
    /// 64 slots, a1 first, increasing file then rank.
    pub squares: Vec<Option<Piece>>,
    pub en_passant: Option<Square>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrivalConfig {
    pub mode: ArrivalMode,
    pub frequency: u32,
    pub seed: u64,
}

impl Default for ArrivalConfig {
    fn default() -> Self {
        Self {
            mode: ArrivalMode::default(),
            frequency: 1,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawState {
    pub halfmove_clock: u32,
    pub repetitions: HashMap<u64, u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SavePhase {
    #[default]
    Move,
    /// The offered kinds live in the arrival queue's pending slot.
    Placement { selected: usize },
    Promotion { from: Square, to: Square },
}

impl GameState {
    pub fn to_save(&self) -> SaveGame {
        let arrival_state = self.arrivals.to_state();

        SaveGame {
            board: Some(SaveBoard {
                squares: Square::all().map(|sq| self.board.piece_at(sq)).collect(),
                en_passant: self.board.en_passant(),
            }),
            side_to_move: self.board.to_move(),
            move_counter: self.move_counter,
            arrival_config: ArrivalConfig {
                mode: arrival_state.mode,
                frequency: arrival_state.frequency,
                seed: arrival_state.seed,
            },
            arrival_queues: arrival_state.sides,
            clock: self.clock.clone(),
            status: self.status,
            move_history: self.history.clone(),
            draw_state: DrawState {
                halfmove_clock: self.board.halfmove_clock(),
                repetitions: self.draw.repetitions().clone(),
            },
            captures: self.captures.clone(),
            settings: self.settings.clone(),
            turn_phase: match &self.phase {
                TurnPhase::AwaitingMove { .. } => SavePhase::Move,
                TurnPhase::AwaitingPlacement { selected, .. } => SavePhase::Placement {
                    selected: *selected,
                },
                TurnPhase::AwaitingPromotion { square, record, .. } => SavePhase::Promotion {
                    from: record.from_square(),
                    to: *square,
                },
            },
        }
    }

    pub fn to_value(&self) -> Result<Value, SaveError> {
        Ok(serde_json::to_value(self.to_save())?)
    }

    pub fn to_json(&self) -> Result<String, SaveError> {
        Ok(serde_json::to_string(&self.to_save())?)
    }

    pub fn from_save(save: SaveGame, events: Box<dyn EventSink>) -> Result<Self, SaveError> {
        let board = match save.board {
            Some(save_board) => {
                let squares: [Option<Piece>; 64] =
                    save_board.squares.try_into().map_err(|v: Vec<_>| {
                        SaveError::Invalid(format!("board has {} squares, expected 64", v.len()))
                    })?;
                Board::from_parts(
                    squares,
                    save.side_to_move,
                    save_board.en_passant,
                    save.draw_state.halfmove_clock,
                )
            }
            None => {
                let mut board = Board::with_seeded_kings();
                board.set_side_to_move(save.side_to_move);
                board
            }
        };

        for side in [Side::White, Side::Black] {
            let kings = board
                .pieces()
                .filter(|(_, p)| p.side() == side && p.is_king())
                .count();
            if kings > 1 {
                return Err(SaveError::Invalid(format!(
                    "{side:?} has {kings} kings on the board"
                )));
            }
        }

        let arrivals = ArrivalManager::from_state(ArrivalManagerState {
            frequency: save.arrival_config.frequency,
            mode: save.arrival_config.mode,
            seed: save.arrival_config.seed,
            sides: save.arrival_queues,
        });

        let side_to_move = board.to_move();
        let phase = match save.turn_phase {
            SavePhase::Move => TurnPhase::AwaitingMove { side: side_to_move },
            SavePhase::Placement { selected } => match arrivals.pending(side_to_move) {
                Some(kinds) if selected < kinds.len() => TurnPhase::AwaitingPlacement {
                    side: side_to_move,
                    kinds: kinds.to_vec(),
                    selected,
                },
                _ => {
                    return Err(SaveError::Invalid(
                        "placement phase without a pending arrival".to_owned(),
                    ))
                }
            },
            SavePhase::Promotion { from, to } => {
                let piece = board.piece_at(to).ok_or_else(|| {
                    SaveError::Invalid("promotion phase with an empty square".to_owned())
                })?;
                if !piece.is_pawn() {
                    return Err(SaveError::Invalid(
                        "promotion phase without a pawn".to_owned(),
                    ));
                }
                TurnPhase::AwaitingPromotion {
                    // The mover already moved; the board shows the opponent
                    // to move.
                    side: side_to_move.flip(),
                    square: to,
                    record: MoveBuilder::new(from, to, piece).build(),
                }
            }
        };

        Ok(Self {
            board,
            arrivals,
            clock: save.clock,
            draw: DrawDetector::from_repetitions(save.draw_state.repetitions),
            settings: save.settings,
            status: save.status,
            move_counter: save.move_counter,
            history: save.move_history,
            captures: save.captures,
            phase,
            draw_offer: None,
            events,
        })
    }

    pub fn from_value(value: Value, events: Box<dyn EventSink>) -> Result<Self, SaveError> {
        let save: SaveGame = serde_json::from_value(value)?;
        Self::from_save(save, events)
    }

    pub fn from_json(json: &str, events: Box<dyn EventSink>) -> Result<Self, SaveError> {
        let save: SaveGame = serde_json::from_str(json)?;
        Self::from_save(save, events)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::board::PieceKind;
    use crate::game::{GameError, NullSink};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn played_game() -> GameState {
        let mut game = GameState::new(GameSettings {
            seed: Some(42),
            ..GameSettings::default()
        });
        game.configure_clock(Duration::from_secs(300), Duration::from_secs(2));

        // A few placement turns on both sides.
        game.request_placement(0).unwrap();
        game.request_placement(7).unwrap();
        game.request_placement(1).unwrap();
        game.request_placement(6).unwrap();
        game
    }

    #[test]
    fn save_round_trip_preserves_board_and_hash() {
        let game = played_game();
        let json = game.to_json().unwrap();
        let loaded = GameState::from_json(&json, Box::new(NullSink)).unwrap();

        assert_eq!(loaded.board().bytes(), game.board().bytes());
        assert_eq!(loaded.position_hash(), game.position_hash());
        assert_eq!(loaded.move_counter(), game.move_counter());
        assert_eq!(loaded.side_to_move(), game.side_to_move());
        assert_eq!(loaded.status(), game.status());
        assert_eq!(loaded.history(), game.history());
    }

    #[test]
    fn save_round_trip_preserves_clock_and_arrivals() {
        let mut game = played_game();
        game.tick(Duration::from_secs(30));

        let value = game.to_value().unwrap();
        let mut loaded = GameState::from_value(value, Box::new(NullSink)).unwrap();

        let clock = loaded.clock().unwrap();
        assert_eq!(
            clock.time_remaining(Side::White),
            game.clock().unwrap().time_remaining(Side::White)
        );
        assert_eq!(
            clock.time_remaining(Side::Black),
            game.clock().unwrap().time_remaining(Side::Black)
        );

        // Both games sit in the next placement phase; the offered kinds
        // must match, meaning the arrival stream survived the round trip.
        let pending = |g: &GameState| match g.phase() {
            TurnPhase::AwaitingPlacement { kinds, .. } => kinds.clone(),
            other => panic!("expected placement phase, got {other:?}"),
        };
        assert_eq!(pending(&game), pending(&loaded));

        // And both continue the same way.
        game.request_placement(2).unwrap();
        loaded.request_placement(2).unwrap();
        assert_eq!(loaded.position_hash(), game.position_hash());
    }

    #[test]
    fn minimal_document_gets_defaults() {
        let loaded = GameState::from_json("{}", Box::new(NullSink)).unwrap();

        assert_eq!(loaded.side_to_move(), Side::White);
        assert_eq!(loaded.move_counter(), 0);
        assert_eq!(loaded.status(), GameStatus::Playing);
        assert!(loaded.clock().is_none());
        // The default board is the seeded opening.
        assert_eq!(
            loaded.board().piece_at(Square::E1),
            Some(Piece::WHITE_KING)
        );
        assert_eq!(
            loaded.board().piece_at(Square::E8),
            Some(Piece::BLACK_KING)
        );
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let loaded = GameState::from_json(
            r#"{"side_to_move": "black", "replay_camera": {"zoom": 2.0}}"#,
            Box::new(NullSink),
        )
        .unwrap();
        assert_eq!(loaded.side_to_move(), Side::Black);
    }

    #[test]
    fn invalid_boards_are_rejected() {
        let mut save = played_game().to_save();
        save.board.as_mut().unwrap().squares.truncate(10);
        assert!(matches!(
            GameState::from_save(save, Box::new(NullSink)),
            Err(SaveError::Invalid(_))
        ));

        // Two kings for one side fail validation.
        let mut save = played_game().to_save();
        save.board.as_mut().unwrap().squares[Square::D4.index()] =
            Some(Piece::WHITE_KING.as_moved());
        assert!(matches!(
            GameState::from_save(save, Box::new(NullSink)),
            Err(SaveError::Invalid(_))
        ));
    }

    #[test]
    fn promotion_phase_round_trips() {
        let mut game = GameState::new(GameSettings {
            arrival_frequency: 1000,
            ..GameSettings::default()
        });
        game.board.put_piece_unchecked(Square::H7, Piece::WHITE_PAWN.as_moved());
        game.request_move(Square::H7, Square::H8).unwrap();

        let json = game.to_json().unwrap();
        let mut loaded = GameState::from_json(&json, Box::new(NullSink)).unwrap();

        assert!(matches!(
            loaded.phase(),
            TurnPhase::AwaitingPromotion { square: Square::H8, .. }
        ));
        loaded.choose_promotion(PieceKind::Knight).unwrap();
        assert_eq!(
            loaded.board().piece_at(Square::H8).map(Piece::identity),
            Some(Piece::WHITE_KNIGHT)
        );
    }

    #[test]
    fn placement_phase_round_trips_with_pending_kinds() {
        let game = GameState::new(GameSettings::default());
        assert!(matches!(game.phase(), TurnPhase::AwaitingPlacement { .. }));

        let json = game.to_json().unwrap();
        let mut loaded = GameState::from_json(&json, Box::new(NullSink)).unwrap();

        match loaded.phase() {
            TurnPhase::AwaitingPlacement { kinds, .. } => {
                assert_eq!(kinds.as_slice(), &[PieceKind::Rook]);
            }
            other => panic!("expected placement phase, got {other:?}"),
        }
        loaded.request_placement(0).unwrap();
        assert_eq!(
            loaded.board().piece_at(Square::A1),
            Some(Piece::WHITE_ROOK)
        );
    }

    #[test]
    fn illegal_after_load_still_fails_cleanly() {
        let json = played_game().to_json().unwrap();
        let mut loaded = GameState::from_json(&json, Box::new(NullSink)).unwrap();

        // Loaded game is in a placement phase; a move request is refused
        // exactly as in the original.
        assert_eq!(
            loaded.request_move(Square::E1, Square::D1),
            Err(GameError::PlacementRequired)
        );
    }
}
