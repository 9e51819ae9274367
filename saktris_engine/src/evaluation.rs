//! Static evaluation: material plus small positional terms.
//!
//! Deliberately simple -- the variant's tactics (arrivals, triplets) are
//! not modelled; material dominates and the tables only nudge pieces
//! toward the center and pawns up the board. The function is pure and
//! takes the board by shared reference.

use saktris_core::board::{Board, PieceKind, Side, Square};

use crate::score::Score;

pub const PAWN_VALUE: i32 = 100;
pub const KNIGHT_VALUE: i32 = 320;
pub const BISHOP_VALUE: i32 = 330;
pub const ROOK_VALUE: i32 = 500;
pub const QUEEN_VALUE: i32 = 900;

pub const fn piece_value(kind: PieceKind) -> i32 {
    match kind {
        PieceKind::Pawn => PAWN_VALUE,
        PieceKind::Knight => KNIGHT_VALUE,
        PieceKind::Bishop => BISHOP_VALUE,
        PieceKind::Rook => ROOK_VALUE,
        PieceKind::Queen => QUEEN_VALUE,
        // The king is never exchanged; it carries no material weight.
        PieceKind::King => 0,
    }
}

// Tables are stored with index 0 = a1, i.e. White's back rank is the first
// row below. Black indexes them with the rank mirrored.
#[rustfmt::skip]
const PAWN_TABLE: [i32; 64] = [
     0,  0,  0,  0,  0,  0,  0,  0,
     5, 10, 10,-20,-20, 10, 10,  5,
     5, -5,-10,  0,  0,-10, -5,  5,
     0,  0,  0, 20, 20,  0,  0,  0,
     5,  5, 10, 25, 25, 10,  5,  5,
    10, 10, 20, 30, 30, 20, 10, 10,
    50, 50, 50, 50, 50, 50, 50, 50,
     0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const KNIGHT_TABLE: [i32; 64] = [
    -50,-40,-30,-30,-30,-30,-40,-50,
    -40,-20,  0,  5,  5,  0,-20,-40,
    -30,  0, 10, 15, 15, 10,  0,-30,
    -30,  5, 15, 20, 20, 15,  5,-30,
    -30,  5, 15, 20, 20, 15,  5,-30,
    -30,  0, 10, 15, 15, 10,  0,-30,
    -40,-20,  0,  5,  5,  0,-20,-40,
    -50,-40,-30,-30,-30,-30,-40,-50,
];

// A mild centralization nudge for the sliding pieces.
#[rustfmt::skip]
const CENTER_TABLE: [i32; 64] = [
    -10, -5, -5, -5, -5, -5, -5,-10,
     -5,  0,  0,  0,  0,  0,  0, -5,
     -5,  0,  5,  5,  5,  5,  0, -5,
     -5,  0,  5, 10, 10,  5,  0, -5,
     -5,  0,  5, 10, 10,  5,  0, -5,
     -5,  0,  5,  5,  5,  5,  0, -5,
     -5,  0,  0,  0,  0,  0,  0, -5,
    -10, -5, -5, -5, -5, -5, -5,-10,
];

fn table_index(square: Square, side: Side) -> usize {
    match side {
        Side::White => square.index(),
        Side::Black => ((7 - square.rank()) * 8 + square.file()) as usize,
    }
}

fn positional_term(kind: PieceKind, square: Square, side: Side) -> i32 {
    let index = table_index(square, side);
    match kind {
        PieceKind::Pawn => PAWN_TABLE[index],
        PieceKind::Knight => KNIGHT_TABLE[index],
        PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen => CENTER_TABLE[index],
        PieceKind::King => 0,
    }
}

/// Evaluates the position from the perspective of the side to move, as
/// negamax expects: positive favors the mover.
pub fn evaluate(board: &Board) -> Score {
    let mover = board.to_move();
    let mut total = 0;

    for (square, piece) in board.pieces() {
        let value =
            piece_value(piece.kind()) + positional_term(piece.kind(), square, piece.side());
        if piece.side() == mover {
            total += value;
        } else {
            total -= value;
        }
    }

    Score(total)
}

#[cfg(test)]
mod test {
    use super::*;
    use saktris_core::board::Piece;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_and_kings_only_positions_are_level() {
        assert_eq!(evaluate(&Board::new()), Score(0));
        assert_eq!(evaluate(&Board::with_seeded_kings()), Score(0));
    }

    #[test]
    fn material_dominates() {
        let mut board = Board::with_seeded_kings();
        board.put_piece_unchecked(Square::D4, Piece::WHITE_QUEEN);

        // White to move: up a queen.
        let score = evaluate(&board);
        assert!(score.get() >= QUEEN_VALUE);

        // Black to move: down a queen.
        board.set_side_to_move(saktris_core::board::Side::Black);
        let score = evaluate(&board);
        assert!(score.get() <= -QUEEN_VALUE);
    }

    #[test]
    fn mirrored_positions_evaluate_symmetrically() {
        let mut board = Board::with_seeded_kings();
        board.put_piece_unchecked(Square::C3, Piece::WHITE_KNIGHT);
        board.put_piece_unchecked(Square::C6, Piece::BLACK_KNIGHT);

        // The material and tables cancel exactly.
        assert_eq!(evaluate(&board), Score(0));
    }

    #[test]
    fn advanced_pawns_score_higher() {
        let near_promotion = positional_term(PieceKind::Pawn, Square::E7, Side::White);
        let at_home = positional_term(PieceKind::Pawn, Square::E2, Side::White);
        assert!(near_promotion > at_home);

        // Black reads the table mirrored.
        let black_near = positional_term(PieceKind::Pawn, Square::E2, Side::Black);
        assert_eq!(black_near, near_promotion);
    }
}
