use std::{
    fmt::Debug,
    ops::{BitXor, BitXorAssign},
    sync::OnceLock,
};

use rand::{RngCore, SeedableRng};

use super::{Castling, Piece, Side, Square};

/// A 64-bit Zobrist key for a position.
///
/// Keys cover piece placement (by side and kind -- per-piece moved flags are
/// deliberately excluded), the side to move, the four castling-right bits,
/// and the en-passant file. Two peers running the same build always derive
/// identical keys: the key table is generated from a compile-time constant
/// seed, which is what makes networked state-hash verification possible.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ZobristHash(pub u64);

impl ZobristHash {
    pub fn piece(piece: Piece, square: Square) -> Self {
        let instance = ZobristTable::get_instance();
        let identity = piece.side().index() * 6 + piece.kind().index();
        Self(instance.pieces[identity * 64 + square.index()])
    }

    pub fn side_to_move(side: Side) -> Self {
        let instance = ZobristTable::get_instance();
        match side {
            Side::White => Self(0),
            Side::Black => Self(instance.black),
        }
    }

    pub fn castling(castling: Castling) -> Self {
        let instance = ZobristTable::get_instance();
        Self(instance.castling[castling.bits() as usize])
    }

    pub fn en_passant(en_passant: Option<Square>) -> Self {
        let instance = ZobristTable::get_instance();
        match en_passant {
            Some(square) => Self(instance.en_passant[square.file() as usize]),
            None => Self(0),
        }
    }

    pub fn toggle_piece(&mut self, piece: Piece, square: Square) {
        *self ^= Self::piece(piece, square);
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl BitXor for ZobristHash {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for ZobristHash {
    fn bitxor_assign(&mut self, rhs: Self) {
        *self = *self ^ rhs;
    }
}

impl Debug for ZobristHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ZobristHash")
            .field(&format_args!("{:#016X}", self.0))
            .finish()
    }
}

struct ZobristTable {
    pieces: [u64; 12 * 64],
    black: u64,
    castling: [u64; 16],
    en_passant: [u64; 8],
}

impl ZobristTable {
    fn new() -> Self {
        // The seed is part of the wire protocol in effect: peers compare
        // position hashes, so every build must generate the same table.
        let mut rng = rand_chacha::ChaCha12Rng::from_seed([
            0x53, 0x61, 0x6b, 0x74, 0x72, 0x69, 0x73, 0x21, 0x7b, 0x09, 0xc4, 0x5e, 0x88, 0x2d,
            0x6f, 0x31, 0xa7, 0x19, 0xe0, 0x4b, 0x90, 0x3c, 0xd5, 0x62, 0x0e, 0xf8, 0x27, 0xb1,
            0x4a, 0x85, 0x1c, 0xd9,
        ]);

        let mut pieces = [0; 12 * 64];
        pieces.fill_with(|| rng.next_u64());

        let black = rng.next_u64();

        let mut castling = [0; 16];
        castling.fill_with(|| rng.next_u64());
        castling[0] = 0;

        let mut en_passant = [0; 8];
        en_passant.fill_with(|| rng.next_u64());

        Self {
            pieces,
            black,
            castling,
            en_passant,
        }
    }

    pub fn get_instance() -> &'static Self {
        static INSTANCE: OnceLock<ZobristTable> = OnceLock::new();

        INSTANCE.get_or_init(Self::new)
    }
}
