//! The board representation: occupancy, move generation, legality,
//! make/undo, placement and triplet detection.

mod castling;
mod move_repr;
mod movegen;
mod piece;
mod square;
mod zobrist;

pub use castling::Castling;
pub use move_repr::{Move, MoveBuilder, MoveFlags, Undo};
pub use movegen::{MoveVec, MAX_MOVES};
pub use piece::{Piece, PieceData, PieceKind, Side};
pub use square::{ParseSquareError, Square};
pub use zobrist::ZobristHash;

use std::fmt::{self, Display, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rule violations surfaced to the caller. These are returned, never
/// panicked: a rejected request leaves the board untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulesError {
    #[error("position is outside the board")]
    InvalidPosition,
    #[error("square {0} is already occupied")]
    SquareOccupied(Square),
    #[error("a bishop of that side already stands on a square of that color")]
    BishopColorViolation,
    #[error("move is not legal in this position")]
    IllegalMove,
    #[error("a promotion choice is still pending")]
    PromotionPending,
    #[error("no piece stands on {0}")]
    MoveOfAbsentPiece(Square),
}

/// The axis a triplet lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    /// Unit step along this axis as a (file, rank) delta.
    pub const fn step(self) -> (i8, i8) {
        match self {
            Axis::Horizontal => (1, 0),
            Axis::Vertical => (0, 1),
        }
    }
}

/// Three consecutive same-kind pieces on a rank or file.
///
/// `squares` is ordered by increasing coordinate along the axis. The sides
/// of the involved pieces do not matter, only the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triplet {
    pub squares: [Square; 3],
    pub axis: Axis,
    pub kind: PieceKind,
}

/// The result of a validated move execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub record: Move,
    /// The move carried a pawn onto its promotion rank and no promotion
    /// choice has been made yet. The pawn stays a pawn until
    /// [`Board::resolve_promotion`] is called.
    pub promotion_required: bool,
}

/// The board: an 8x8 occupancy grid plus the per-position state that moves
/// depend on (side to move, en-passant target, halfmove clock) and an
/// incrementally maintained piece-placement hash.
///
/// The board is the sole owner of the pieces it contains. Captured and
/// lifted pieces are handed back to the caller by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    squares: [Option<Piece>; 64],
    to_move: Side,
    en_passant: Option<Square>,
    halfmove_clock: u32,
    piece_hash: ZobristHash,
}

impl Board {
    /// Creates an empty board with White to move.
    pub fn new() -> Self {
        Self {
            squares: [None; 64],
            to_move: Side::White,
            en_passant: None,
            halfmove_clock: 0,
            piece_hash: ZobristHash::default(),
        }
    }

    /// Creates a board holding only the two kings on their seed squares.
    /// This is the starting position of a game: everything else arrives.
    pub fn with_seeded_kings() -> Self {
        let mut board = Self::new();
        board.put_piece_unchecked(Square::E1, Piece::WHITE_KING);
        board.put_piece_unchecked(Square::E8, Piece::BLACK_KING);
        board
    }

    /// Reassembles a board from its parts, recomputing the placement hash.
    /// Save-file loading comes through here.
    pub fn from_parts(
        squares: [Option<Piece>; 64],
        to_move: Side,
        en_passant: Option<Square>,
        halfmove_clock: u32,
    ) -> Self {
        let mut board = Self {
            squares,
            to_move,
            en_passant,
            halfmove_clock,
            piece_hash: ZobristHash::default(),
        };
        board.piece_hash = board.recompute_piece_hash();
        board
    }

    /// Places a piece on a square without any rule checks, overwriting
    /// whatever was there. Intended for position setup; game play goes
    /// through [`Self::place_piece`] and [`Self::make_move`].
    pub fn put_piece_unchecked(&mut self, square: Square, piece: Piece) {
        if let Some(old) = self.squares[square.index()] {
            self.piece_hash.toggle_piece(old, square);
        }
        self.squares[square.index()] = Some(piece);
        self.piece_hash.toggle_piece(piece, square);
    }

    /// Overrides the side to move. Intended for position setup.
    pub fn set_side_to_move(&mut self, side: Side) {
        self.to_move = side;
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.squares[square.index()]
    }

    /// All pieces on the board with their squares, in increasing square
    /// order.
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all().filter_map(|sq| self.squares[sq.index()].map(|p| (sq, p)))
    }

    pub fn to_move(&self) -> Side {
        self.to_move
    }

    /// The square a pawn may be captured on en passant, set only on the
    /// move immediately after a double pawn push.
    pub fn en_passant(&self) -> Option<Square> {
        self.en_passant
    }

    /// Plies since the last capture or pawn move, for the fifty-move rule.
    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    /// The raw occupancy bytes. Undo is required to restore these exactly,
    /// and tests hold it to that.
    pub fn bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        for (i, slot) in self.squares.iter().enumerate() {
            out[i] = slot.map_or(0, Piece::get);
        }
        out
    }

    /// Finds the king of the given side, or [`None`] if it has not arrived
    /// (or was bumped off).
    pub fn find_king(&self, side: Side) -> Option<Square> {
        self.pieces()
            .find(|&(_, p)| p.side() == side && p.is_king())
            .map(|(sq, _)| sq)
    }

    /// Castling rights, derived from the board bytes: a side holds a right
    /// while its unmoved king stands on its seed square and an unmoved rook
    /// on the matching corner.
    pub fn castling_rights(&self) -> Castling {
        let mut rights = Castling::empty();

        for side in [Side::White, Side::Black] {
            let back = side.back_rank();
            let king_ok = self
                .piece_at(Square::new_unchecked(4, back))
                .is_some_and(|p| p.side() == side && p.is_king() && !p.has_moved());
            if !king_ok {
                continue;
            }

            let rook_ok = |file| {
                self.piece_at(Square::new_unchecked(file, back))
                    .is_some_and(|p: Piece| p.side() == side && p.is_rook() && !p.has_moved())
            };
            if rook_ok(7) {
                rights |= Castling::kingside(side);
            }
            if rook_ok(0) {
                rights |= Castling::queenside(side);
            }
        }

        rights
    }

    /// The full position hash: piece placement, side to move, castling
    /// rights and en-passant file. This is the repetition-table key and the
    /// value peers compare over the wire.
    pub fn position_hash(&self) -> ZobristHash {
        self.piece_hash
            ^ ZobristHash::side_to_move(self.to_move)
            ^ ZobristHash::castling(self.castling_rights())
            ^ ZobristHash::en_passant(self.en_passant)
    }

    /// Folds the placement hash from scratch. The incrementally maintained
    /// value must always equal this.
    pub fn recompute_piece_hash(&self) -> ZobristHash {
        let mut hash = ZobristHash::default();
        for (square, piece) in self.pieces() {
            hash.toggle_piece(piece, square);
        }
        hash
    }

    /// Places an arriving piece. Succeeds iff the square is empty and, for
    /// bishops, no same-side bishop already stands on a square of the same
    /// color. No check filtering applies to placements.
    pub fn place_piece(&mut self, square: Square, piece: Piece) -> Result<(), RulesError> {
        if self.squares[square.index()].is_some() {
            return Err(RulesError::SquareOccupied(square));
        }

        if piece.is_bishop() && self.bishop_color_conflict(piece.side(), square) {
            return Err(RulesError::BishopColorViolation);
        }

        self.squares[square.index()] = Some(piece);
        self.piece_hash.toggle_piece(piece, square);
        Ok(())
    }

    /// The back-rank files where `side` could legally place an arriving
    /// piece of `kind`. Empty means the arrival must be skipped.
    pub fn placement_files(&self, side: Side, kind: PieceKind) -> Vec<u8> {
        let back = side.back_rank();
        (0..8)
            .filter(|&file| {
                let square = Square::new_unchecked(file, back);
                self.piece_at(square).is_none()
                    && (kind != PieceKind::Bishop || !self.bishop_color_conflict(side, square))
            })
            .collect()
    }

    fn bishop_color_conflict(&self, side: Side, square: Square) -> bool {
        self.pieces().any(|(sq, p)| {
            p.side() == side && p.is_bishop() && sq.parity() == square.parity()
        })
    }

    /// Removes and returns the piece on a square, if any. Triplet clearing
    /// and bumping go through here.
    pub fn lift_piece(&mut self, square: Square) -> Option<Piece> {
        let piece = self.squares[square.index()].take()?;
        self.piece_hash.toggle_piece(piece, square);
        Some(piece)
    }

    /// Closes out a placement turn: the en-passant window lapses, the clock
    /// ticks over and the other side is to move.
    pub fn end_placement_turn(&mut self) {
        self.en_passant = None;
        self.halfmove_clock += 1;
        self.to_move = self.to_move.flip();
    }

    /// Makes a move and returns the record needed to invert it.
    ///
    /// This is the hot pair of the search: no validation, no events, no
    /// allocation. The caller guarantees the move came out of move
    /// generation for this exact position.
    pub fn make_move(&mut self, m: Move) -> Undo {
        let mut undo = Undo {
            the_move: m,
            prev_en_passant: self.en_passant,
            prev_halfmove_clock: self.halfmove_clock,
            prev_piece_hash: self.piece_hash,
            rook_before: None,
        };

        if let Some((square, victim)) = m.captured() {
            self.squares[square.index()] = None;
            self.piece_hash.toggle_piece(victim, square);
        }

        let arriving = match m.promotion() {
            Some(kind) => Piece::new(m.piece().side(), kind).as_moved(),
            None => m.piece().as_moved(),
        };
        self.squares[m.from_square().index()] = None;
        self.squares[m.to_square().index()] = Some(arriving);
        self.piece_hash.toggle_piece(m.piece(), m.from_square());
        self.piece_hash.toggle_piece(arriving, m.to_square());

        if m.is_castle() {
            let back = m.piece().side().back_rank();
            let (rook_from_file, rook_to_file) =
                if m.is_kingside_castle() { (7, 5) } else { (0, 3) };
            let rook_from = Square::new_unchecked(rook_from_file, back);
            let rook_to = Square::new_unchecked(rook_to_file, back);

            if let Some(rook) = self.squares[rook_from.index()].take() {
                undo.rook_before = Some((rook_from, rook));
                self.squares[rook_to.index()] = Some(rook.as_moved());
                self.piece_hash.toggle_piece(rook, rook_from);
                self.piece_hash.toggle_piece(rook, rook_to);
            }
        }

        self.en_passant = if m.is_double_pawn_push() {
            let rank = m.from_square().rank() as i8 + m.piece().side().pawn_direction();
            Some(Square::new_unchecked(m.from_square().file(), rank as u8))
        } else {
            None
        };

        if m.is_capture() || m.piece().is_pawn() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }

        self.to_move = self.to_move.flip();

        undo
    }

    /// Restores the board to the exact state before the matching
    /// [`Self::make_move`] call, byte for byte.
    pub fn undo_move(&mut self, undo: Undo) {
        let m = undo.the_move;

        self.squares[m.to_square().index()] = None;
        self.squares[m.from_square().index()] = Some(m.piece());

        if let Some((square, victim)) = m.captured() {
            self.squares[square.index()] = Some(victim);
        }

        if let Some((rook_from, rook)) = undo.rook_before {
            let rook_to_file = if m.is_kingside_castle() { 5 } else { 3 };
            let rook_to = Square::new_unchecked(rook_to_file, rook_from.rank());
            self.squares[rook_to.index()] = None;
            self.squares[rook_from.index()] = Some(rook);
        }

        self.en_passant = undo.prev_en_passant;
        self.halfmove_clock = undo.prev_halfmove_clock;
        self.piece_hash = undo.prev_piece_hash;
        self.to_move = self.to_move.flip();
    }

    /// Validated move execution for the interactive path.
    ///
    /// Finds the legal move from `from` to `to` and makes it. If the move
    /// carries a pawn onto its promotion rank, the pawn stays a pawn and
    /// the outcome asks for a promotion choice.
    pub fn execute_move(&mut self, from: Square, to: Square) -> Result<MoveOutcome, RulesError> {
        let piece = self
            .piece_at(from)
            .ok_or(RulesError::MoveOfAbsentPiece(from))?;
        if piece.side() != self.to_move {
            return Err(RulesError::IllegalMove);
        }

        let m = self
            .legal_moves_from(from)
            .into_iter()
            .find(|m| m.to_square() == to)
            .ok_or(RulesError::IllegalMove)?;

        let promotion_required = m.is_promotion_eligible();
        let _ = self.make_move(m);

        Ok(MoveOutcome {
            record: m,
            promotion_required,
        })
    }

    /// Swaps a pawn standing on its promotion rank for the chosen kind.
    pub fn resolve_promotion(
        &mut self,
        square: Square,
        kind: PieceKind,
    ) -> Result<Piece, RulesError> {
        let pawn = self
            .piece_at(square)
            .ok_or(RulesError::MoveOfAbsentPiece(square))?;
        if !pawn.is_pawn() || square.rank() != pawn.side().promotion_rank() {
            return Err(RulesError::IllegalMove);
        }
        if !PieceKind::PROMOTABLE.contains(&kind) {
            return Err(RulesError::IllegalMove);
        }

        let promoted = Piece::new(pawn.side(), kind).as_moved();
        self.squares[square.index()] = Some(promoted);
        self.piece_hash.toggle_piece(pawn, square);
        self.piece_hash.toggle_piece(promoted, square);
        Ok(promoted)
    }

    /// Scans the rank and file through `square` for a run of at least three
    /// consecutive same-kind pieces.
    ///
    /// When the run is longer than three, the returned window is the three
    /// squares nearest `square`, clamped into the run. The horizontal axis
    /// is checked first.
    pub fn find_triplet_at(&self, square: Square) -> Option<Triplet> {
        let kind = self.piece_at(square)?.kind();

        for axis in [Axis::Horizontal, Axis::Vertical] {
            let (df, dr) = axis.step();

            let mut start = square;
            while let Some(prev) = start.try_offset(-df, -dr) {
                if self.piece_at(prev).is_some_and(|p| p.kind() == kind) {
                    start = prev;
                } else {
                    break;
                }
            }

            let mut end = square;
            while let Some(next) = end.try_offset(df, dr) {
                if self.piece_at(next).is_some_and(|p| p.kind() == kind) {
                    end = next;
                } else {
                    break;
                }
            }

            let coord = |sq: Square| match axis {
                Axis::Horizontal => sq.file(),
                Axis::Vertical => sq.rank(),
            };
            let (lo, hi, anchor) = (coord(start), coord(end), coord(square));

            if hi - lo + 1 >= 3 {
                let window_lo = anchor.saturating_sub(1).clamp(lo, hi - 2);
                let at = |c: u8| match axis {
                    Axis::Horizontal => Square::new_unchecked(c, square.rank()),
                    Axis::Vertical => Square::new_unchecked(square.file(), c),
                };
                return Some(Triplet {
                    squares: [at(window_lo), at(window_lo + 1), at(window_lo + 2)],
                    axis,
                    kind,
                });
            }
        }

        None
    }

    /// Whether the material on the board can no longer produce a checkmate:
    /// bare kings, or a lone minor piece beside them.
    pub fn insufficient_material(&self) -> bool {
        let mut minor_count = 0u32;
        for (_, piece) in self.pieces() {
            match piece.kind() {
                PieceKind::King => {}
                PieceKind::Bishop | PieceKind::Knight => minor_count += 1,
                _ => return false,
            }
        }
        minor_count <= 1
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8).rev() {
            write!(f, "{} ", rank + 1)?;
            for file in 0..8 {
                let square = Square::new_unchecked(file, rank);
                match self.piece_at(square) {
                    Some(piece) => f.write_char(piece.as_char())?,
                    None => f.write_char('.')?,
                }
                if file != 7 {
                    f.write_char(' ')?;
                }
            }
            f.write_char('\n')?;
        }
        f.write_str("  a b c d e f g h")
    }
}
