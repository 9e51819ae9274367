use std::{
    fmt::{Debug, Display, Write},
    num::NonZeroU8,
};

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

/// The kind of a piece, without its side.
///
/// Kinds are assigned integers 1-6 so that they fit in 3 bits with 0 unused,
/// which lets Rust use 0 for the [`None`] of an [`Option<Piece>`].
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    FromPrimitive,
    ToPrimitive,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PieceKind {
    Pawn = 1,
    Knight = 2,
    Bishop = 3,
    Rook = 4,
    Queen = 5,
    King = 6,
}

impl PieceKind {
    pub const ALL: [PieceKind; 6] = [
        Self::Pawn,
        Self::Knight,
        Self::Bishop,
        Self::Rook,
        Self::Queen,
        Self::King,
    ];

    /// The kinds a pawn may promote to.
    pub const PROMOTABLE: [PieceKind; 4] = [Self::Queen, Self::Rook, Self::Bishop, Self::Knight];

    /// The kinds the arrival scheduler may ever produce (everything but the
    /// King, which is seeded onto the board at game start).
    pub const ARRIVABLE: [PieceKind; 5] =
        [Self::Pawn, Self::Knight, Self::Bishop, Self::Rook, Self::Queen];

    /// Convenience method for constructing a [`Piece`] of the supplied
    /// [`Side`].
    pub const fn of(self, side: Side) -> Piece {
        Piece::new(side, self)
    }

    /// One-letter representation, uppercase, as used in board diagrams.
    pub const fn as_uppercase_char(self) -> char {
        match self {
            PieceKind::Pawn => 'P',
            PieceKind::Knight => 'N',
            PieceKind::Bishop => 'B',
            PieceKind::Rook => 'R',
            PieceKind::Queen => 'Q',
            PieceKind::King => 'K',
        }
    }

    /// One-letter representation, lowercase.
    pub const fn as_lowercase_char(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }

    /// Returns true for the ray-scanning kinds (bishop, rook, queen).
    pub const fn is_slider(self) -> bool {
        matches!(self, PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen)
    }

    pub const fn index(self) -> usize {
        self as usize - 1
    }
}

/// A player in the game.
///
/// Uses 0 for White and 8 for Black so that a [`Piece`] representation is a
/// simple bitwise-or of [`Side`] and [`PieceKind`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[default]
    White = 0,
    Black = 8,
}

impl Side {
    pub const fn is_white(self) -> bool {
        matches!(self, Side::White)
    }

    pub const fn is_black(self) -> bool {
        !self.is_white()
    }

    /// The opposing side.
    pub const fn flip(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Side::White => 0,
            Side::Black => 1,
        }
    }

    /// The rank arriving pieces for this side land on (and where this side's
    /// king is seeded).
    pub const fn back_rank(self) -> u8 {
        match self {
            Side::White => 0,
            Side::Black => 7,
        }
    }

    /// The rank this side's pawns promote on.
    pub const fn promotion_rank(self) -> u8 {
        self.flip().back_rank()
    }

    /// The rank delta of a forward pawn step for this side.
    pub const fn pawn_direction(self) -> i8 {
        match self {
            Side::White => 1,
            Side::Black => -1,
        }
    }
}

/// A piece on the board.
///
/// Internal representation is a 5-bit integer: a bitwise-or of the [`Side`]
/// (bit 3) and [`PieceKind`] (bits 0-2), plus a moved flag in bit 4. Since
/// [`PieceKind`] can never be 0, Rust optimises the [`None`] of an
/// [`Option<Piece>`] to be represented by 0 -- the board's occupancy array is
/// exactly 64 bytes.
///
/// The moved flag participates in equality (it decides castling rights and
/// pawn double-push eligibility) but never in position hashing.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "PieceData", from = "PieceData")]
pub struct Piece(NonZeroU8);

const SIDE_BIT: u8 = 8;
const MOVED_BIT: u8 = 16;
const KIND_MASK: u8 = 0x07;

impl Piece {
    /// Constructs an unmoved [`Piece`] from a [`Side`] and a [`PieceKind`].
    pub const fn new(side: Side, kind: PieceKind) -> Self {
        // Safety: kind as u8 can never be 0
        unsafe { Self(NonZeroU8::new_unchecked(side as u8 | kind as u8)) }
    }

    pub const fn pawn(side: Side) -> Self {
        Self::new(side, PieceKind::Pawn)
    }

    pub const fn knight(side: Side) -> Self {
        Self::new(side, PieceKind::Knight)
    }

    pub const fn bishop(side: Side) -> Self {
        Self::new(side, PieceKind::Bishop)
    }

    pub const fn rook(side: Side) -> Self {
        Self::new(side, PieceKind::Rook)
    }

    pub const fn queen(side: Side) -> Self {
        Self::new(side, PieceKind::Queen)
    }

    pub const fn king(side: Side) -> Self {
        Self::new(side, PieceKind::King)
    }

    /// Constructs a [`Piece`] from its 5-bit representation, or [`None`] if
    /// the kind bits are invalid. Higher bits are truncated first.
    pub const fn try_from_u8(value: u8) -> Option<Self> {
        let value = value & 0x1F;
        if value & KIND_MASK == 0 || value & KIND_MASK == 7 {
            None
        } else {
            // Safety: the kind bits are nonzero, so value is nonzero
            unsafe { Some(Self(NonZeroU8::new_unchecked(value))) }
        }
    }

    pub const fn side(self) -> Side {
        if self.0.get() & SIDE_BIT > 0 {
            Side::Black
        } else {
            Side::White
        }
    }

    pub const fn kind(self) -> PieceKind {
        match self.0.get() & KIND_MASK {
            1 => PieceKind::Pawn,
            2 => PieceKind::Knight,
            3 => PieceKind::Bishop,
            4 => PieceKind::Rook,
            5 => PieceKind::Queen,
            6 => PieceKind::King,
            // The constructors only ever store kind bits 1-6
            _ => unreachable!(),
        }
    }

    pub const fn is_white(self) -> bool {
        self.side().is_white()
    }

    pub const fn is_black(self) -> bool {
        self.side().is_black()
    }

    pub const fn is_pawn(self) -> bool {
        matches!(self.kind(), PieceKind::Pawn)
    }

    pub const fn is_bishop(self) -> bool {
        matches!(self.kind(), PieceKind::Bishop)
    }

    pub const fn is_rook(self) -> bool {
        matches!(self.kind(), PieceKind::Rook)
    }

    pub const fn is_king(self) -> bool {
        matches!(self.kind(), PieceKind::King)
    }

    /// Whether this piece has ever been moved by the board.
    pub const fn has_moved(self) -> bool {
        self.0.get() & MOVED_BIT > 0
    }

    /// This piece with its moved flag set. Only [`Board`](super::Board)
    /// mutates occupancy with this.
    pub const fn as_moved(self) -> Self {
        // Safety: setting a bit cannot zero a nonzero value
        unsafe { Self(NonZeroU8::new_unchecked(self.0.get() | MOVED_BIT)) }
    }

    /// The side-and-kind identity of this piece with the moved flag cleared.
    ///
    /// This is the value position hashing keys on: two pieces that differ
    /// only in movement history occupy the same hash identity.
    pub const fn identity(self) -> Self {
        // Safety: the kind bits are untouched
        unsafe { Self(NonZeroU8::new_unchecked(self.0.get() & (SIDE_BIT | KIND_MASK))) }
    }

    /// Returns the internal 5-bit representation of this piece.
    pub const fn get(self) -> u8 {
        self.0.get()
    }

    /// One-letter diagram representation: uppercase for White, lowercase for
    /// Black.
    pub const fn as_char(self) -> char {
        if self.side().is_white() {
            self.kind().as_uppercase_char()
        } else {
            self.kind().as_lowercase_char()
        }
    }
}

/// Convenient constants for specifying specific (unmoved) pieces.
impl Piece {
    pub const WHITE_PAWN: Piece = Piece::new(Side::White, PieceKind::Pawn);
    pub const WHITE_KNIGHT: Piece = Piece::new(Side::White, PieceKind::Knight);
    pub const WHITE_BISHOP: Piece = Piece::new(Side::White, PieceKind::Bishop);
    pub const WHITE_ROOK: Piece = Piece::new(Side::White, PieceKind::Rook);
    pub const WHITE_QUEEN: Piece = Piece::new(Side::White, PieceKind::Queen);
    pub const WHITE_KING: Piece = Piece::new(Side::White, PieceKind::King);
    pub const BLACK_PAWN: Piece = Piece::new(Side::Black, PieceKind::Pawn);
    pub const BLACK_KNIGHT: Piece = Piece::new(Side::Black, PieceKind::Knight);
    pub const BLACK_BISHOP: Piece = Piece::new(Side::Black, PieceKind::Bishop);
    pub const BLACK_ROOK: Piece = Piece::new(Side::Black, PieceKind::Rook);
    pub const BLACK_QUEEN: Piece = Piece::new(Side::Black, PieceKind::Queen);
    pub const BLACK_KING: Piece = Piece::new(Side::Black, PieceKind::King);
}

/// The self-describing shape pieces take in save files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PieceData {
    pub kind: PieceKind,
    pub side: Side,
    #[serde(default)]
    pub moved: bool,
}

impl From<Piece> for PieceData {
    fn from(piece: Piece) -> Self {
        Self {
            kind: piece.kind(),
            side: piece.side(),
            moved: piece.has_moved(),
        }
    }
}

impl From<PieceData> for Piece {
    fn from(data: PieceData) -> Self {
        let piece = Piece::new(data.side, data.kind);
        if data.moved {
            piece.as_moved()
        } else {
            piece
        }
    }
}

impl Debug for Piece {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Piece")
            .field("side", &self.side())
            .field("kind", &self.kind())
            .field("moved", &self.has_moved())
            .finish()
    }
}

impl Display for Piece {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char(self.as_char())
    }
}

impl From<(Side, PieceKind)> for Piece {
    fn from((side, kind): (Side, PieceKind)) -> Self {
        Self::new(side, kind)
    }
}
