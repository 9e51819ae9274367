use bitflags::bitflags;

use super::Side;

bitflags! {
    /// Which castling moves are still available to each player.
    ///
    /// In this game rights are not tracked as mutable state: because every
    /// piece carries its own moved flag, the rights are a pure function of
    /// the board bytes. A side holds a right when its king stands unmoved on
    /// its seed square and an unmoved rook stands on the corresponding
    /// corner of the back rank. [`Board::castling_rights`](super::Board)
    /// derives this value whenever it is needed -- in particular for
    /// position hashing, where the four bits distinguish otherwise-identical
    /// placements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Castling: u8 {
        /// White may castle kingside.
        const WHITE_KINGSIDE  = 0b0001;
        /// White may castle queenside.
        const WHITE_QUEENSIDE = 0b0010;
        /// Black may castle kingside.
        const BLACK_KINGSIDE  = 0b0100;
        /// Black may castle queenside.
        const BLACK_QUEENSIDE = 0b1000;

        const WHITE = Self::WHITE_KINGSIDE.bits() | Self::WHITE_QUEENSIDE.bits();
        const BLACK = Self::BLACK_KINGSIDE.bits() | Self::BLACK_QUEENSIDE.bits();
    }
}

impl Default for Castling {
    fn default() -> Self {
        Self::empty()
    }
}

impl Castling {
    pub const fn kingside(side: Side) -> Self {
        match side {
            Side::White => Self::WHITE_KINGSIDE,
            Side::Black => Self::BLACK_KINGSIDE,
        }
    }

    pub const fn queenside(side: Side) -> Self {
        match side {
            Side::White => Self::WHITE_QUEENSIDE,
            Side::Black => Self::BLACK_QUEENSIDE,
        }
    }
}
