//! The aggregate game state machine: turn flow, arrivals, promotions,
//! triplet clearing, the clock, draw detection and game-over handling.

mod events;
mod serialize;
mod settings;

pub use events::{EventCollector, EventSink, GameEvent, NullSink};
pub use serialize::{
    ArrivalConfig, DrawState, SaveBoard, SaveError, SaveGame, SavePhase,
};
pub use settings::{Difficulty, GameMode, GameSettings};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arrival::ArrivalManager;
use crate::board::{
    Axis, Board, Move, Piece, PieceKind, RulesError, Side, Square, Triplet,
};
use crate::clock::{ChessClock, ClockEvent, ClockState};
use crate::draw::{DrawDetector, DrawReason};

/// Game-level request failures. Rule violations pass through from the
/// board; the rest are turn-discipline errors. A failed request mutates
/// nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("the game is already over")]
    GameOver,
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("an arriving piece must be placed first")]
    PlacementRequired,
    #[error("no placement is pending")]
    NoPlacementPending,
    #[error("no promotion is pending")]
    NoPromotionPending,
    #[error("no draw offer is pending")]
    NoDrawOfferPending,
    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// Where the game stands. Everything except `Playing` and `Check` is
/// terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    Playing,
    /// The named side is in check; the game continues.
    Check { side: Side },
    Checkmate { winner: Side },
    Stalemate,
    Draw { reason: DrawReason },
    /// The named side's flag fell.
    Timeout { side: Side },
    /// The named side resigned.
    Resigned { side: Side },
    /// A triplet clear bumped a king; the named side won.
    TripletWin { winner: Side },
}

impl GameStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, GameStatus::Playing | GameStatus::Check { .. })
    }
}

/// What the game is waiting on.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnPhase {
    /// An arrival is due: the side must place one of the offered kinds on
    /// its back rank. `selected` is the index the placement will use.
    AwaitingPlacement {
        side: Side,
        kinds: Vec<PieceKind>,
        selected: usize,
    },
    AwaitingMove { side: Side },
    /// A pawn stands on its promotion rank awaiting the choice; the turn
    /// completes when it lands.
    AwaitingPromotion {
        side: Side,
        square: Square,
        record: Move,
    },
}

/// One entry of the move history, as recorded and serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Move {
        from: Square,
        to: Square,
        piece: Piece,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        captured: Option<Piece>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        promotion: Option<PieceKind>,
    },
    Placement { square: Square, piece: Piece },
}

/// The aggregate state machine. All mutation happens on the host loop; the
/// UI and the network layer call the `request_*` methods and listen on the
/// event sink.
pub struct GameState {
    board: Board,
    arrivals: ArrivalManager,
    clock: Option<ChessClock>,
    draw: DrawDetector,
    settings: GameSettings,
    status: GameStatus,
    move_counter: u32,
    history: Vec<HistoryEntry>,
    captures: [Vec<Piece>; 2],
    phase: TurnPhase,
    draw_offer: Option<Side>,
    events: Box<dyn EventSink>,
}

impl GameState {
    /// A new game with kings seeded and White to act first. Events go
    /// nowhere; see [`Self::with_sink`].
    pub fn new(settings: GameSettings) -> Self {
        Self::with_sink(settings, Box::new(NullSink))
    }

    pub fn with_sink(settings: GameSettings, events: Box<dyn EventSink>) -> Self {
        let seed = settings.seed.unwrap_or(0);
        let mut state = Self {
            board: Board::with_seeded_kings(),
            arrivals: ArrivalManager::new(
                settings.arrival_mode,
                settings.arrival_frequency,
                seed,
            ),
            clock: None,
            draw: DrawDetector::new(),
            settings,
            status: GameStatus::Playing,
            move_counter: 0,
            history: Vec::new(),
            captures: [Vec::new(), Vec::new()],
            phase: TurnPhase::AwaitingMove { side: Side::White },
            draw_offer: None,
            events,
        };

        state.draw.record_position(state.board.position_hash().get());
        state.enter_turn(Side::White);
        state
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn side_to_move(&self) -> Side {
        self.board.to_move()
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    /// Completed turns so far (placements included).
    pub fn move_counter(&self) -> u32 {
        self.move_counter
    }

    /// The position hash peers compare for state verification.
    pub fn position_hash(&self) -> u64 {
        self.board.position_hash().get()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Pieces captured *by* the given side.
    pub fn captures(&self, side: Side) -> &[Piece] {
        &self.captures[side.index()]
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn pending_draw_offer(&self) -> Option<Side> {
        self.draw_offer
    }

    /// Attaches and arms a clock. It starts counting when the first turn
    /// completes.
    pub fn configure_clock(&mut self, initial: Duration, increment: Duration) {
        let mut clock = ChessClock::new();
        clock.configure(initial, increment);
        clock.set_thresholds(
            Duration::from_secs(self.settings.clock_low_threshold_secs),
            Duration::from_secs(self.settings.clock_critical_threshold_secs),
        );
        self.clock = Some(clock);
    }

    pub fn clock(&self) -> Option<&ChessClock> {
        self.clock.as_ref()
    }

    /// Advances the clock by the host loop's frame delta and forwards
    /// whatever it reports. A timeout ends the game on the spot.
    pub fn tick(&mut self, delta: Duration) {
        if self.status.is_terminal() {
            return;
        }
        let clock_events = match self.clock.as_mut() {
            Some(clock) => clock.tick(delta),
            None => return,
        };

        for event in clock_events {
            match event {
                ClockEvent::Expired { side } => {
                    self.status = GameStatus::Timeout { side };
                    self.events.publish(GameEvent::TimeExpired { side });
                    self.finish_game(Some(side.flip()), "timeout");
                }
                ClockEvent::LowTime { side, remaining } => {
                    self.events.publish(GameEvent::LowTimeWarning {
                        side,
                        remaining,
                        critical: false,
                    });
                }
                ClockEvent::CriticalTime { side, remaining } => {
                    self.events.publish(GameEvent::LowTimeWarning {
                        side,
                        remaining,
                        critical: true,
                    });
                }
            }
        }
    }

    /// For Selectable arrivals: picks which of the offered kinds the
    /// pending placement will use.
    pub fn select_arrival(&mut self, index: usize) -> Result<(), GameError> {
        self.ensure_live()?;
        match &mut self.phase {
            TurnPhase::AwaitingPlacement { kinds, selected, .. } if index < kinds.len() => {
                *selected = index;
                Ok(())
            }
            TurnPhase::AwaitingPlacement { .. } => Err(RulesError::InvalidPosition.into()),
            _ => Err(GameError::NoPlacementPending),
        }
    }

    /// Places the arriving piece on the given back-rank file. A placement
    /// is a full turn.
    pub fn request_placement(&mut self, column: u8) -> Result<(), GameError> {
        self.ensure_live()?;

        let (side, kind, selected) = match &self.phase {
            TurnPhase::AwaitingPlacement {
                side,
                kinds,
                selected,
            } => (*side, kinds[*selected], *selected),
            _ => return Err(GameError::NoPlacementPending),
        };

        let square =
            Square::new(column, side.back_rank()).ok_or(RulesError::InvalidPosition)?;
        let piece = Piece::new(side, kind);
        self.board.place_piece(square, piece)?;

        self.arrivals.take(side, selected);
        self.history.push(HistoryEntry::Placement { square, piece });
        self.events.publish(GameEvent::PiecePlaced { square, piece });

        // Placement never runs triplet detection; it just consumes the
        // turn.
        self.board.end_placement_turn();
        self.move_counter += 1;
        self.switch_clock();
        self.draw_offer = None;
        self.draw.record_position(self.board.position_hash().get());
        self.conclude_turn(side);
        Ok(())
    }

    /// Executes a move for the side to move.
    pub fn request_move(&mut self, from: Square, to: Square) -> Result<(), GameError> {
        self.ensure_live()?;
        match self.phase {
            TurnPhase::AwaitingMove { .. } => {}
            TurnPhase::AwaitingPlacement { .. } => return Err(GameError::PlacementRequired),
            TurnPhase::AwaitingPromotion { .. } => {
                return Err(RulesError::PromotionPending.into())
            }
        }

        let mover = self.board.to_move();
        let outcome = self.board.execute_move(from, to)?;
        let record = outcome.record;

        self.events.publish(GameEvent::PieceMoved {
            from,
            to,
            piece: record.piece(),
        });
        if let Some((square, victim)) = record.captured() {
            self.captures[mover.index()].push(victim);
            self.events.publish(GameEvent::PieceCaptured {
                square,
                piece: victim,
                attacker_from: from,
            });
        }
        self.history.push(HistoryEntry::Move {
            from,
            to,
            piece: record.piece(),
            captured: record.captured().map(|(_, p)| p),
            promotion: None,
        });

        if outcome.promotion_required {
            self.phase = TurnPhase::AwaitingPromotion {
                side: mover,
                square: to,
                record,
            };
            self.events.publish(GameEvent::PromotionRequired {
                square: to,
                piece: record.piece().as_moved(),
            });
            return Ok(());
        }

        self.complete_move_turn(mover, record);
        Ok(())
    }

    /// Resolves a pending promotion and completes the interrupted turn.
    pub fn choose_promotion(&mut self, kind: PieceKind) -> Result<(), GameError> {
        self.ensure_live()?;
        let (side, square, record) = match &self.phase {
            TurnPhase::AwaitingPromotion {
                side,
                square,
                record,
            } => (*side, *square, *record),
            _ => return Err(GameError::NoPromotionPending),
        };

        let _ = self.board.resolve_promotion(square, kind)?;
        if let Some(HistoryEntry::Move { promotion, .. }) = self.history.last_mut() {
            *promotion = Some(kind);
        }

        self.complete_move_turn(side, record.promoting_to(kind));
        Ok(())
    }

    /// Resigns on behalf of `side`. Allowed from any non-terminal state,
    /// whoever's turn it is.
    pub fn request_resign(&mut self, side: Side) -> Result<(), GameError> {
        self.ensure_live()?;
        self.status = GameStatus::Resigned { side };
        self.finish_game(Some(side.flip()), "resignation");
        Ok(())
    }

    pub fn offer_draw(&mut self, side: Side) -> Result<(), GameError> {
        self.ensure_live()?;
        self.draw_offer = Some(side);
        self.events.publish(GameEvent::DrawOffered { side });
        Ok(())
    }

    /// Accepts or declines the pending draw offer. Accepting ends the game
    /// by agreement; declining just clears the offer.
    pub fn respond_draw_offer(&mut self, accept: bool) -> Result<(), GameError> {
        self.ensure_live()?;
        if self.draw_offer.take().is_none() {
            return Err(GameError::NoDrawOfferPending);
        }
        if accept {
            self.status = GameStatus::Draw {
                reason: DrawReason::Agreement,
            };
            self.finish_game(None, DrawReason::Agreement.as_str());
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), GameError> {
        if self.status.is_terminal() {
            Err(GameError::GameOver)
        } else {
            Ok(())
        }
    }

    /// Opens `side`'s turn: advances the arrival cadence and decides
    /// whether this is a placement turn or a move turn. An arrival with no
    /// legal destination file is skipped and the turn continues as a move
    /// turn.
    fn enter_turn(&mut self, side: Side) {
        if self.status.is_terminal() {
            return;
        }

        self.events.publish(GameEvent::TurnChanged { side });

        let offered = self.arrivals.poll(side).map(<[PieceKind]>::to_vec);
        match offered {
            Some(kinds) => {
                let placeable = kinds
                    .iter()
                    .any(|&kind| !self.board.placement_files(side, kind).is_empty());

                if placeable {
                    self.phase = TurnPhase::AwaitingPlacement {
                        side,
                        kinds,
                        selected: 0,
                    };
                } else {
                    tracing::debug!(?side, "arrival skipped: back rank is blocked");
                    self.arrivals.skip(side);
                    self.events.publish(GameEvent::ArrivalSkipped { side });
                    self.phase = TurnPhase::AwaitingMove { side };
                }
            }
            None => self.phase = TurnPhase::AwaitingMove { side },
        }
    }

    /// Everything that happens after a move (with any promotion resolved):
    /// triplet clearing, the clock handover, draw bookkeeping and the
    /// status computation for the opponent.
    fn complete_move_turn(&mut self, mover: Side, record: Move) {
        if self.settings.triplet_clear_enabled {
            if let Some(triplet) = self.board.find_triplet_at(record.to_square()) {
                self.resolve_triplet(record, triplet);
            }
        }

        self.move_counter += 1;
        self.switch_clock();
        self.draw_offer = None;
        self.draw.record_position(self.board.position_hash().get());
        self.conclude_turn(mover);
    }

    /// Clears a triplet and applies the bump rule.
    ///
    /// The bump direction is the mover's displacement projected on the
    /// triplet's axis (defaulting forward when the projection is zero). The
    /// leading piece of the run is bumped off with the other two, and the
    /// square one past the run in that direction loses its piece as a
    /// secondary bump. A bumped king ends the game against its owner.
    fn resolve_triplet(&mut self, record: Move, triplet: Triplet) {
        let (df, dr) = triplet.axis.step();
        let travel = match triplet.axis {
            Axis::Horizontal => {
                record.to_square().file() as i8 - record.from_square().file() as i8
            }
            Axis::Vertical => {
                record.to_square().rank() as i8 - record.from_square().rank() as i8
            }
        };
        let forward = travel >= 0;

        let leading = if forward {
            triplet.squares[2]
        } else {
            triplet.squares[0]
        };
        let beyond = if forward {
            leading.try_offset(df, dr)
        } else {
            leading.try_offset(-df, -dr)
        };

        for square in triplet.squares {
            let _ = self.board.lift_piece(square);
        }

        let mut bumped_square = None;
        let mut bumped_king_owner = None;
        if let Some(target) = beyond {
            if let Some(victim) = self.board.lift_piece(target) {
                bumped_square = Some(target);
                if victim.is_king() {
                    bumped_king_owner = Some(victim.side());
                }
            }
        }

        self.events.publish(GameEvent::TripletCleared {
            squares: triplet.squares,
            axis: triplet.axis,
            bumped_square,
            physics_bump: self.settings.physics_bump,
        });

        if let Some(owner) = bumped_king_owner {
            let winner = owner.flip();
            self.status = GameStatus::TripletWin { winner };
            self.finish_game(Some(winner), "triplet");
        }
    }

    /// Computes the opponent's standing after a completed turn and either
    /// ends the game or opens the opponent's turn.
    fn conclude_turn(&mut self, mover: Side) {
        if self.status.is_terminal() {
            return;
        }

        let opponent = mover.flip();
        let in_check = self.board.is_in_check(opponent);
        let has_moves = self.board.has_any_legal_move(opponent);

        if !has_moves && in_check {
            self.status = GameStatus::Checkmate { winner: mover };
            self.finish_game(Some(mover), "checkmate");
            return;
        }
        if !has_moves {
            self.status = GameStatus::Stalemate;
            self.finish_game(None, DrawReason::Stalemate.as_str());
            return;
        }
        if let Some(reason) = self.draw.check(&self.board) {
            self.status = GameStatus::Draw { reason };
            self.finish_game(None, reason.as_str());
            return;
        }

        if in_check {
            self.status = GameStatus::Check { side: opponent };
            self.events.publish(GameEvent::CheckDetected { side: opponent });
        } else {
            self.status = GameStatus::Playing;
        }

        self.enter_turn(opponent);
    }

    fn switch_clock(&mut self) {
        if let Some(clock) = &mut self.clock {
            if matches!(clock.state(), ClockState::Ready) {
                clock.start().ok();
            }
            clock.switch_side().ok();
        }
    }

    fn finish_game(&mut self, winner: Option<Side>, reason: &str) {
        if let Some(clock) = &mut self.clock {
            clock.pause().ok();
        }
        self.events.publish(GameEvent::GameOver {
            winner,
            reason: reason.to_owned(),
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Settings with no arrivals scheduled for a long while, so move-only
    /// scenarios are not interrupted by placement turns.
    fn quiet_settings() -> GameSettings {
        GameSettings {
            arrival_frequency: 1000,
            ..GameSettings::default()
        }
    }

    fn game_with_pieces(pieces: &[(Square, Piece)], settings: GameSettings) -> GameState {
        let mut game = GameState::new(settings);
        for &(square, piece) in pieces {
            game.board.put_piece_unchecked(square, piece);
        }
        game
    }

    #[test]
    fn fresh_game_awaits_a_white_action() {
        let game = GameState::new(quiet_settings());
        assert_eq!(game.side_to_move(), Side::White);
        assert_eq!(game.status(), GameStatus::Playing);
        assert_eq!(game.move_counter(), 0);
        assert_eq!(game.phase(), &TurnPhase::AwaitingMove { side: Side::White });
    }

    #[test]
    fn first_turn_offers_a_placement_at_frequency_one() {
        let game = GameState::new(GameSettings::default());
        match game.phase() {
            TurnPhase::AwaitingPlacement { side, kinds, .. } => {
                assert_eq!(*side, Side::White);
                assert_eq!(kinds.as_slice(), &[PieceKind::Rook]);
            }
            other => panic!("expected a placement phase, got {other:?}"),
        }
    }

    #[test]
    fn placement_consumes_the_whole_turn() {
        let collector = EventCollector::new();
        let mut game =
            GameState::with_sink(GameSettings::default(), collector.sink());

        game.request_placement(0).unwrap();

        assert_eq!(
            game.board().piece_at(Square::A1),
            Some(Piece::WHITE_ROOK)
        );
        assert_eq!(game.side_to_move(), Side::Black);
        assert_eq!(game.move_counter(), 1);
        assert!(collector.contains(&GameEvent::PiecePlaced {
            square: Square::A1,
            piece: Piece::WHITE_ROOK,
        }));

        // A move request while Black's own placement is pending is refused.
        assert_eq!(
            game.request_move(Square::E8, Square::E7),
            Err(GameError::PlacementRequired)
        );
    }

    #[test]
    fn placement_on_an_occupied_file_is_rejected_without_side_effects() {
        let mut game = GameState::new(GameSettings::default());

        // e1 holds the seeded king.
        let result = game.request_placement(4);
        assert_eq!(
            result,
            Err(GameError::Rules(RulesError::SquareOccupied(Square::E1)))
        );
        assert_eq!(game.side_to_move(), Side::White);
        assert_eq!(game.move_counter(), 0);

        // A proper file still works afterwards.
        game.request_placement(7).unwrap();
        assert_eq!(game.side_to_move(), Side::Black);
    }

    #[test]
    fn moves_alternate_sides_and_count_turns() {
        let mut game = game_with_pieces(
            &[
                (Square::E2, Piece::WHITE_PAWN),
                (Square::E7, Piece::BLACK_PAWN),
            ],
            quiet_settings(),
        );

        game.request_move(Square::E2, Square::E4).unwrap();
        assert_eq!(game.side_to_move(), Side::Black);
        assert_eq!(game.move_counter(), 1);

        game.request_move(Square::E7, Square::E5).unwrap();
        assert_eq!(game.side_to_move(), Side::White);
        assert_eq!(game.move_counter(), 2);
    }

    #[test]
    fn illegal_move_leaves_state_untouched() {
        let mut game = game_with_pieces(
            &[(Square::D4, Piece::WHITE_ROOK)],
            quiet_settings(),
        );
        let hash = game.position_hash();

        assert_eq!(
            game.request_move(Square::D4, Square::E5),
            Err(GameError::Rules(RulesError::IllegalMove))
        );
        assert_eq!(game.position_hash(), hash);
        assert_eq!(game.move_counter(), 0);
    }

    #[test]
    fn check_is_reported_and_only_resolving_moves_allowed() {
        let collector = EventCollector::new();
        let mut game = GameState::with_sink(quiet_settings(), collector.sink());
        game.board.put_piece_unchecked(Square::A2, Piece::WHITE_ROOK);

        // Rook to a8 gives check along the back rank.
        game.request_move(Square::A2, Square::A8).unwrap();

        assert_eq!(game.status(), GameStatus::Check { side: Side::Black });
        assert!(collector.contains(&GameEvent::CheckDetected { side: Side::Black }));

        // The king cannot stay in check.
        assert_eq!(
            game.request_move(Square::E8, Square::F8),
            Err(GameError::Rules(RulesError::IllegalMove))
        );
        game.request_move(Square::E8, Square::E7).unwrap();
        assert_eq!(game.status(), GameStatus::Playing);
    }

    #[test]
    fn back_rank_mate_ends_the_game() {
        let collector = EventCollector::new();
        let mut game = GameState::with_sink(quiet_settings(), collector.sink());
        // Box the black king in behind its own pawns, then mate on the back
        // rank.
        for (square, piece) in [
            (Square::F7, Piece::BLACK_PAWN),
            (Square::G7, Piece::BLACK_PAWN),
            (Square::H7, Piece::BLACK_PAWN),
            (Square::G8, Piece::BLACK_KING),
            (Square::A1, Piece::WHITE_ROOK),
        ] {
            game.board.put_piece_unchecked(square, piece);
        }
        // Replace the seeded king position for black.
        game.board.lift_piece(Square::E8);

        game.request_move(Square::A1, Square::A8).unwrap();

        assert_eq!(game.status(), GameStatus::Checkmate { winner: Side::White });
        assert!(collector.contains(&GameEvent::GameOver {
            winner: Some(Side::White),
            reason: "checkmate".into(),
        }));

        // Terminal: nothing further is accepted.
        assert_eq!(
            game.request_move(Square::G8, Square::H8),
            Err(GameError::GameOver)
        );
    }

    #[test]
    fn stalemate_is_a_draw() {
        let mut game = game_with_pieces(&[], quiet_settings());
        // Lone black king on h8; Qg6 covers g7, g8 and h7 without giving
        // check, leaving Black no move at all.
        game.board.lift_piece(Square::E8);
        game.board.put_piece_unchecked(Square::H8, Piece::BLACK_KING.as_moved());
        game.board.put_piece_unchecked(Square::F5, Piece::WHITE_QUEEN);

        game.request_move(Square::F5, Square::G6).unwrap();

        assert_eq!(game.status(), GameStatus::Stalemate);
    }

    #[test]
    fn promotion_pauses_the_turn_until_the_choice_lands() {
        let collector = EventCollector::new();
        let mut game = GameState::with_sink(quiet_settings(), collector.sink());
        game.board.put_piece_unchecked(Square::H7, Piece::WHITE_PAWN.as_moved());

        game.request_move(Square::H7, Square::H8).unwrap();

        assert!(matches!(
            game.phase(),
            TurnPhase::AwaitingPromotion { square: Square::H8, .. }
        ));
        // The turn has not completed yet.
        assert_eq!(game.move_counter(), 0);
        assert_eq!(game.side_to_move(), Side::Black);
        assert_eq!(
            game.request_move(Square::E8, Square::E7),
            Err(GameError::Rules(RulesError::PromotionPending))
        );

        game.choose_promotion(PieceKind::Queen).unwrap();
        assert_eq!(
            game.board().piece_at(Square::H8).map(Piece::identity),
            Some(Piece::WHITE_QUEEN)
        );
        assert_eq!(game.move_counter(), 1);
        assert!(matches!(
            game.history().last(),
            Some(HistoryEntry::Move {
                promotion: Some(PieceKind::Queen),
                ..
            })
        ));
    }

    #[test]
    fn resignation_ends_the_game_for_the_resigner() {
        let collector = EventCollector::new();
        let mut game = GameState::with_sink(quiet_settings(), collector.sink());

        game.request_resign(Side::Black).unwrap();

        assert_eq!(game.status(), GameStatus::Resigned { side: Side::Black });
        assert!(collector.contains(&GameEvent::GameOver {
            winner: Some(Side::White),
            reason: "resignation".into(),
        }));
    }

    #[test]
    fn draw_by_agreement() {
        let mut game = GameState::new(quiet_settings());

        assert_eq!(
            game.respond_draw_offer(true),
            Err(GameError::NoDrawOfferPending)
        );

        game.offer_draw(Side::White).unwrap();
        game.respond_draw_offer(false).unwrap();
        assert_eq!(game.status(), GameStatus::Playing);

        game.offer_draw(Side::Black).unwrap();
        game.respond_draw_offer(true).unwrap();
        assert_eq!(
            game.status(),
            GameStatus::Draw {
                reason: DrawReason::Agreement
            }
        );
    }

    #[test]
    fn timeout_flows_through_tick() {
        let collector = EventCollector::new();
        let mut game = GameState::with_sink(quiet_settings(), collector.sink());
        game.board.put_piece_unchecked(Square::A2, Piece::WHITE_PAWN);
        game.configure_clock(Duration::from_secs(60), Duration::ZERO);

        // The clock arms on the first completed turn; then Black's time
        // runs out.
        game.request_move(Square::A2, Square::A3).unwrap();
        game.tick(Duration::from_secs(61));

        assert_eq!(game.status(), GameStatus::Timeout { side: Side::Black });
        assert!(collector.contains(&GameEvent::TimeExpired { side: Side::Black }));
        assert!(collector.contains(&GameEvent::GameOver {
            winner: Some(Side::White),
            reason: "timeout".into(),
        }));
        assert_eq!(
            game.request_move(Square::E8, Square::E7),
            Err(GameError::GameOver)
        );
    }

    #[test]
    fn triplet_clear_bumps_along_the_travel_direction() {
        let collector = EventCollector::new();
        let settings = GameSettings {
            triplet_clear_enabled: true,
            physics_bump: true,
            ..quiet_settings()
        };
        let mut game = GameState::with_sink(settings, collector.sink());
        for (square, piece) in [
            (Square::C4, Piece::WHITE_ROOK),
            (Square::D4, Piece::BLACK_ROOK),
            (Square::E2, Piece::WHITE_ROOK),
            (Square::F4, Piece::BLACK_PAWN),
        ] {
            game.board.put_piece_unchecked(square, piece);
        }

        // Re2-e4 completes c4-d4-e4. The rook arrived perpendicular to the
        // horizontal run, so the bump defaults toward the h-file and the
        // pawn on f4 takes the secondary bump.
        game.request_move(Square::E2, Square::E4).unwrap();

        assert_eq!(game.board().piece_at(Square::C4), None);
        assert_eq!(game.board().piece_at(Square::D4), None);
        assert_eq!(game.board().piece_at(Square::E4), None);
        assert_eq!(game.board().piece_at(Square::F4), None);

        assert!(collector.contains(&GameEvent::TripletCleared {
            squares: [Square::C4, Square::D4, Square::E4],
            axis: crate::board::Axis::Horizontal,
            bumped_square: Some(Square::F4),
            physics_bump: true,
        }));
        assert_eq!(game.status(), GameStatus::Playing);
    }

    #[test]
    fn triplet_bumping_the_king_wins_the_game() {
        let collector = EventCollector::new();
        let settings = GameSettings {
            triplet_clear_enabled: true,
            ..quiet_settings()
        };
        let mut game = GameState::with_sink(settings, collector.sink());
        // Black king on e8; completing a vertical knight run e5-e6-e7
        // upward bumps it.
        for (square, piece) in [
            (Square::E5, Piece::WHITE_KNIGHT),
            (Square::E6, Piece::BLACK_KNIGHT),
            (Square::G6, Piece::WHITE_KNIGHT),
        ] {
            game.board.put_piece_unchecked(square, piece);
        }

        // Ng6-e7 arrives from the right but upward: travel projects +1 on
        // the vertical axis, so the bump runs up the file into e8.
        game.request_move(Square::G6, Square::E7).unwrap();

        assert_eq!(
            game.status(),
            GameStatus::TripletWin { winner: Side::White }
        );
        assert!(collector.contains(&GameEvent::GameOver {
            winner: Some(Side::White),
            reason: "triplet".into(),
        }));
        assert_eq!(game.board().find_king(Side::Black), None);
    }

    #[test]
    fn triplet_detection_respects_the_setting() {
        let mut game = game_with_pieces(
            &[
                (Square::C4, Piece::WHITE_ROOK),
                (Square::D4, Piece::BLACK_ROOK),
                (Square::E2, Piece::WHITE_ROOK),
            ],
            quiet_settings(), // triplet_clear_enabled: false
        );

        game.request_move(Square::E2, Square::E4).unwrap();

        // The run stands; nothing was cleared.
        assert!(game.board().piece_at(Square::C4).is_some());
        assert!(game.board().piece_at(Square::D4).is_some());
        assert!(game.board().piece_at(Square::E4).is_some());
    }

    #[test]
    fn arrival_with_blocked_back_rank_is_skipped() {
        let collector = EventCollector::new();
        let mut game =
            GameState::with_sink(GameSettings::default(), collector.sink());

        // Fill White's entire back rank.
        for file in 0..8 {
            let square = Square::new_unchecked(file, 0);
            if game.board.piece_at(square).is_none() {
                game.board.put_piece_unchecked(square, Piece::WHITE_PAWN);
            }
        }

        // Re-enter the turn: the pending rook has nowhere to go.
        game.arrivals.skip(Side::White);
        game.enter_turn(Side::White);

        assert!(collector.contains(&GameEvent::ArrivalSkipped { side: Side::White }));
        assert!(matches!(
            game.phase(),
            TurnPhase::AwaitingMove { side: Side::White }
        ));
    }

    #[test]
    fn threefold_repetition_draws_the_game() {
        let mut game = game_with_pieces(
            &[(Square::H1, Piece::WHITE_ROOK)],
            quiet_settings(),
        );

        // Shuffle the rook and the black king. The rook-on-h2 position
        // recurs with every cycle; its third occurrence claims the draw.
        for _ in 0..2 {
            game.request_move(Square::H1, Square::H2).unwrap();
            game.request_move(Square::E8, Square::D8).unwrap();
            game.request_move(Square::H2, Square::H1).unwrap();
            game.request_move(Square::D8, Square::E8).unwrap();
        }
        assert_eq!(game.status(), GameStatus::Playing);

        game.request_move(Square::H1, Square::H2).unwrap();

        assert_eq!(
            game.status(),
            GameStatus::Draw {
                reason: DrawReason::ThreefoldRepetition
            }
        );
    }

    /// A complete game played through the real arrival machinery: both
    /// sides fill their back ranks piece by piece, the pawn arrivals skip
    /// once the ranks are full, and White mates with queen and rook.
    #[test]
    fn arrival_game_ends_in_checkmate() {
        let collector = EventCollector::new();
        let mut game =
            GameState::with_sink(GameSettings::default(), collector.sink());

        // Alternating placement turns; Black's columns keep its pieces
        // away from the d7 mating square.
        let placements: [u8; 14] = [0, 0, 1, 2, 2, 6, 3, 7, 5, 5, 6, 3, 7, 1];
        for column in placements {
            game.request_placement(column).unwrap();
        }

        // Both back ranks are full now, so the pawn arrivals skip and the
        // remaining turns are plain moves.
        assert!(matches!(
            game.phase(),
            TurnPhase::AwaitingMove { side: Side::White }
        ));
        game.request_move(Square::A1, Square::A7).unwrap();
        game.request_move(Square::G8, Square::H7).unwrap();
        game.request_move(Square::D1, Square::D7).unwrap();

        assert_eq!(game.status(), GameStatus::Checkmate { winner: Side::White });
        assert!(collector.contains(&GameEvent::GameOver {
            winner: Some(Side::White),
            reason: "checkmate".into(),
        }));
        assert!(collector.contains(&GameEvent::ArrivalSkipped { side: Side::White }));
    }

    #[test]
    fn en_passant_capture_flows_through_the_game() {
        let collector = EventCollector::new();
        let mut game = GameState::with_sink(quiet_settings(), collector.sink());
        game.board.put_piece_unchecked(Square::E2, Piece::WHITE_PAWN);
        game.board.put_piece_unchecked(Square::D4, Piece::BLACK_PAWN.as_moved());

        game.request_move(Square::E2, Square::E4).unwrap();
        assert_eq!(game.board().en_passant(), Some(Square::E3));

        game.request_move(Square::D4, Square::E3).unwrap();

        assert_eq!(game.board().piece_at(Square::E4), None);
        assert_eq!(
            game.board().piece_at(Square::E3).map(Piece::identity),
            Some(Piece::BLACK_PAWN)
        );
        assert_eq!(game.board().en_passant(), None);
        assert!(collector.contains(&GameEvent::PieceCaptured {
            square: Square::E4,
            piece: Piece::WHITE_PAWN.as_moved(),
            attacker_from: Square::D4,
        }));
        assert_eq!(game.captures(Side::Black).len(), 1);
    }

    #[test]
    fn insufficient_material_draws_immediately_after_a_move() {
        // Kings plus a single knight cannot mate: capturing White's last
        // pawn ends the game on the spot.
        let mut game = game_with_pieces(
            &[
                (Square::D4, Piece::WHITE_PAWN.as_moved()),
                (Square::C6, Piece::BLACK_KNIGHT),
            ],
            quiet_settings(),
        );
        game.board.set_side_to_move(Side::Black);

        game.request_move(Square::C6, Square::D4).unwrap();

        assert_eq!(
            game.status(),
            GameStatus::Draw {
                reason: DrawReason::InsufficientMaterial
            }
        );
    }
}
