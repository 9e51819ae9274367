//! Pseudo-legal move generation and the legality filter.
//!
//! Generation walks the occupancy grid directly: sliders ray-scan until
//! blocked, leapers test their fixed offsets. Legality is decided by trying
//! each pseudo-legal move with make-then-undo and rejecting those that leave
//! the mover's king attacked. While a side's king has not yet arrived there
//! is nothing to attack, so every pseudo-legal move is legal.

use arrayvec::ArrayVec;

use super::{Board, Move, MoveBuilder, Piece, PieceKind, Side, Square};

/// Maximum number of moves that could occur in a reachable position, used
/// for stack-allocating a vector to hold moves. Arrivals cap each side at a
/// standard army, so the classical bound applies.
pub const MAX_MOVES: usize = 256;

pub type MoveVec = ArrayVec<Move, MAX_MOVES>;

const ROOK_DIRECTIONS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const BISHOP_DIRECTIONS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];
const KING_DIRECTIONS: [(i8, i8); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];
const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

impl Board {
    /// Generate the pseudo-legal moves of the piece on `from` into `out`.
    ///
    /// Generates nothing if the square is empty. No check filtering is done;
    /// see [`Self::legal_moves_from`].
    pub fn potential_moves_from(&self, from: Square, out: &mut MoveVec) {
        let Some(piece) = self.piece_at(from) else {
            return;
        };

        match piece.kind() {
            PieceKind::Pawn => self.gen_pawn_moves(from, piece, out),
            PieceKind::Knight => self.gen_leaper_moves(from, piece, &KNIGHT_OFFSETS, out),
            PieceKind::Bishop => self.gen_slider_moves(from, piece, &BISHOP_DIRECTIONS, out),
            PieceKind::Rook => self.gen_slider_moves(from, piece, &ROOK_DIRECTIONS, out),
            PieceKind::Queen => {
                self.gen_slider_moves(from, piece, &ROOK_DIRECTIONS, out);
                self.gen_slider_moves(from, piece, &BISHOP_DIRECTIONS, out);
            }
            PieceKind::King => {
                self.gen_leaper_moves(from, piece, &KING_DIRECTIONS, out);
                self.gen_castling_moves(from, piece, out);
            }
        }
    }

    /// Generate all pseudo-legal moves for `side` into `out`.
    pub fn pseudo_legal_moves(&self, side: Side, out: &mut MoveVec) {
        for from in Square::all() {
            if self.piece_at(from).is_some_and(|p| p.side() == side) {
                self.potential_moves_from(from, out);
            }
        }
    }

    /// The fully legal moves of the piece on `from`.
    pub fn legal_moves_from(&mut self, from: Square) -> MoveVec {
        let mut pseudo = MoveVec::new();
        self.potential_moves_from(from, &mut pseudo);

        let mut legal = MoveVec::new();
        for m in pseudo {
            if self.move_is_legal(m) {
                legal.push(m);
            }
        }
        legal
    }

    /// All fully legal moves for `side`.
    pub fn legal_moves(&mut self, side: Side) -> MoveVec {
        let mut pseudo = MoveVec::new();
        self.pseudo_legal_moves(side, &mut pseudo);

        let mut legal = MoveVec::new();
        for m in pseudo {
            if self.move_is_legal(m) {
                legal.push(m);
            }
        }
        legal
    }

    /// Whether `side` has at least one legal move. Short-circuits, unlike
    /// collecting [`Self::legal_moves`], which matters for the mate and
    /// stalemate checks run after every turn.
    pub fn has_any_legal_move(&mut self, side: Side) -> bool {
        let mut pseudo = MoveVec::new();
        for from in Square::all() {
            if self.piece_at(from).is_some_and(|p| p.side() == side) {
                pseudo.clear();
                self.potential_moves_from(from, &mut pseudo);
                for &m in &pseudo {
                    if self.move_is_legal(m) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Whether a pseudo-legal move leaves the mover's own king safe.
    pub fn move_is_legal(&mut self, m: Move) -> bool {
        let side = m.piece().side();
        let undo = self.make_move(m);
        let legal = !self.is_in_check(side);
        self.undo_move(undo);
        legal
    }

    /// Whether `side`'s king is currently attacked. False while the king has
    /// not arrived.
    pub fn is_in_check(&self, side: Side) -> bool {
        match self.find_king(side) {
            Some(square) => self.is_square_attacked(square, side.flip()),
            None => false,
        }
    }

    /// Whether any piece of `by` attacks `square`.
    ///
    /// Attack geometry, not move geometry: a pawn attacks its two
    /// diagonal-forward squares whether or not they are occupied, and never
    /// attacks the square straight ahead of it.
    pub fn is_square_attacked(&self, square: Square, by: Side) -> bool {
        // Leapers: knights and the enemy king.
        for (df, dr) in KNIGHT_OFFSETS {
            if self.side_piece_at(square, df, dr, by, PieceKind::Knight) {
                return true;
            }
        }
        for (df, dr) in KING_DIRECTIONS {
            if self.side_piece_at(square, df, dr, by, PieceKind::King) {
                return true;
            }
        }

        // Pawns: an attacker sits one rank back along either diagonal.
        let pawn_dr = -by.pawn_direction();
        for df in [-1, 1] {
            if self.side_piece_at(square, df, pawn_dr, by, PieceKind::Pawn) {
                return true;
            }
        }

        // Sliders: walk each ray outward until a piece blocks it.
        for (df, dr) in ROOK_DIRECTIONS {
            if self.slider_on_ray(square, df, dr, by, PieceKind::Rook) {
                return true;
            }
        }
        for (df, dr) in BISHOP_DIRECTIONS {
            if self.slider_on_ray(square, df, dr, by, PieceKind::Bishop) {
                return true;
            }
        }

        false
    }

    fn side_piece_at(&self, from: Square, df: i8, dr: i8, side: Side, kind: PieceKind) -> bool {
        from.try_offset(df, dr)
            .and_then(|sq| self.piece_at(sq))
            .is_some_and(|p| p.side() == side && p.kind() == kind)
    }

    fn slider_on_ray(&self, from: Square, df: i8, dr: i8, side: Side, kind: PieceKind) -> bool {
        let mut current = from;
        while let Some(next) = current.try_offset(df, dr) {
            match self.piece_at(next) {
                Some(p) => {
                    return p.side() == side
                        && (p.kind() == kind || p.kind() == PieceKind::Queen);
                }
                None => current = next,
            }
        }
        false
    }

    fn gen_leaper_moves(
        &self,
        from: Square,
        piece: Piece,
        offsets: &[(i8, i8)],
        out: &mut MoveVec,
    ) {
        for &(df, dr) in offsets {
            let Some(to) = from.try_offset(df, dr) else {
                continue;
            };

            match self.piece_at(to) {
                None => out.push(MoveBuilder::new(from, to, piece).build()),
                Some(target) if target.side() != piece.side() => {
                    out.push(MoveBuilder::new(from, to, piece).captures(target).build());
                }
                Some(_) => {}
            }
        }
    }

    fn gen_slider_moves(
        &self,
        from: Square,
        piece: Piece,
        directions: &[(i8, i8)],
        out: &mut MoveVec,
    ) {
        for &(df, dr) in directions {
            let mut current = from;
            while let Some(to) = current.try_offset(df, dr) {
                match self.piece_at(to) {
                    None => {
                        out.push(MoveBuilder::new(from, to, piece).build());
                        current = to;
                    }
                    Some(target) => {
                        if target.side() != piece.side() {
                            out.push(MoveBuilder::new(from, to, piece).captures(target).build());
                        }
                        break;
                    }
                }
            }
        }
    }

    fn gen_pawn_moves(&self, from: Square, piece: Piece, out: &mut MoveVec) {
        let side = piece.side();
        let dir = side.pawn_direction();

        // Forward pushes. Double pushes hang off the moved flag rather than
        // a fixed starting rank: an arrived pawn gets one double push from
        // wherever it was placed.
        if let Some(one) = from.try_offset(0, dir) {
            if self.piece_at(one).is_none() {
                out.push(MoveBuilder::new(from, one, piece).build());

                if !piece.has_moved() {
                    if let Some(two) = one.try_offset(0, dir) {
                        if self.piece_at(two).is_none() {
                            out.push(
                                MoveBuilder::new(from, two, piece)
                                    .is_double_pawn_push()
                                    .build(),
                            );
                        }
                    }
                }
            }
        }

        // Diagonal captures, including en passant onto the current target.
        for df in [-1, 1] {
            let Some(to) = from.try_offset(df, dir) else {
                continue;
            };

            match self.piece_at(to) {
                Some(target) if target.side() != side => {
                    out.push(MoveBuilder::new(from, to, piece).captures(target).build());
                }
                None if self.en_passant() == Some(to) => {
                    // The captured pawn stands behind the destination, on
                    // the mover's own rank.
                    let victim_square = Square::new_unchecked(to.file(), from.rank());
                    if let Some(victim) = self.piece_at(victim_square) {
                        out.push(
                            MoveBuilder::new(from, to, piece)
                                .captures_en_passant(victim_square, victim)
                                .build(),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn gen_castling_moves(&self, from: Square, piece: Piece, out: &mut MoveVec) {
        let side = piece.side();
        let back = side.back_rank();

        if piece.has_moved() || from != Square::new_unchecked(4, back) {
            return;
        }

        // Castling out of check is never allowed.
        if self.is_square_attacked(from, side.flip()) {
            return;
        }

        // (rook file, empty files, files the king passes through, king
        // destination file, kingside?)
        let wings: [(u8, &[u8], [u8; 2], u8, bool); 2] = [
            (7, &[5, 6], [5, 6], 6, true),
            (0, &[1, 2, 3], [3, 2], 2, false),
        ];

        'wing: for (rook_file, empty_files, traversed, king_file, kingside) in wings {
            let rook_square = Square::new_unchecked(rook_file, back);
            let rook_ok = self
                .piece_at(rook_square)
                .is_some_and(|p| p.side() == side && p.is_rook() && !p.has_moved());
            if !rook_ok {
                continue;
            }

            for &file in empty_files {
                if self.piece_at(Square::new_unchecked(file, back)).is_some() {
                    continue 'wing;
                }
            }

            for file in traversed {
                if self.is_square_attacked(Square::new_unchecked(file, back), side.flip()) {
                    continue 'wing;
                }
            }

            let to = Square::new_unchecked(king_file, back);
            let builder = MoveBuilder::new(from, to, piece);
            out.push(if kingside {
                builder.castles_kingside().build()
            } else {
                builder.castles_queenside().build()
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn board_with(pieces: &[(Square, Piece)]) -> Board {
        let mut board = Board::new();
        for &(square, piece) in pieces {
            board.put_piece_unchecked(square, piece);
        }
        board
    }

    fn targets_of(board: &Board, from: Square) -> Vec<Square> {
        let mut moves = MoveVec::new();
        board.potential_moves_from(from, &mut moves);
        let mut targets: Vec<_> = moves.iter().map(|m| m.to_square()).collect();
        targets.sort();
        targets
    }

    #[test]
    fn knight_moves_from_corner_and_center() {
        let board = board_with(&[
            (Square::A1, Piece::WHITE_KNIGHT),
            (Square::D4, Piece::BLACK_KNIGHT),
        ]);

        assert_eq!(targets_of(&board, Square::A1), vec![Square::C2, Square::B3]);
        assert_eq!(targets_of(&board, Square::D4).len(), 8);
    }

    #[test]
    fn rook_rays_stop_at_blockers() {
        let board = board_with(&[
            (Square::D4, Piece::WHITE_ROOK),
            (Square::D6, Piece::WHITE_PAWN),
            (Square::F4, Piece::BLACK_PAWN),
        ]);

        let targets = targets_of(&board, Square::D4);
        // Up: d5 only (own pawn blocks d6). Right: e4 and the capture on f4.
        assert!(targets.contains(&Square::D5));
        assert!(!targets.contains(&Square::D6));
        assert!(targets.contains(&Square::F4));
        assert!(!targets.contains(&Square::G4));
        // Down and left are open to the edges.
        assert!(targets.contains(&Square::D1));
        assert!(targets.contains(&Square::A4));
    }

    #[test]
    fn pawn_pushes_and_double_push() {
        let board = board_with(&[
            (Square::E2, Piece::WHITE_PAWN),
            (Square::H5, Piece::WHITE_PAWN.as_moved()),
        ]);

        assert_eq!(targets_of(&board, Square::E2), vec![Square::E3, Square::E4]);
        // A moved pawn has spent its double push.
        assert_eq!(targets_of(&board, Square::H5), vec![Square::H6]);
    }

    #[test]
    fn pawn_double_push_blocked() {
        let board = board_with(&[
            (Square::E2, Piece::WHITE_PAWN),
            (Square::E4, Piece::BLACK_ROOK),
        ]);
        assert_eq!(targets_of(&board, Square::E2), vec![Square::E3]);

        let board = board_with(&[
            (Square::E2, Piece::WHITE_PAWN),
            (Square::E3, Piece::BLACK_ROOK),
        ]);
        assert_eq!(targets_of(&board, Square::E2), Vec::<Square>::new());
    }

    #[test]
    fn pawn_captures_diagonally_only() {
        let board = board_with(&[
            (Square::E4, Piece::WHITE_PAWN.as_moved()),
            (Square::D5, Piece::BLACK_PAWN.as_moved()),
            (Square::E5, Piece::BLACK_ROOK),
            (Square::F5, Piece::WHITE_KNIGHT),
        ]);

        // d5 is a capture, e5 is blocked, f5 is a friend.
        assert_eq!(targets_of(&board, Square::E4), vec![Square::D5]);
    }

    #[test]
    fn placed_pawn_gets_a_double_push_from_the_back_rank() {
        let board = board_with(&[(Square::C1, Piece::WHITE_PAWN)]);
        assert_eq!(targets_of(&board, Square::C1), vec![Square::C2, Square::C3]);
    }

    #[test]
    fn pawn_attack_geometry_ignores_occupancy() {
        let board = board_with(&[(Square::E4, Piece::WHITE_PAWN.as_moved())]);

        assert!(board.is_square_attacked(Square::D5, Side::White));
        assert!(board.is_square_attacked(Square::F5, Side::White));
        // Straight ahead is not attacked, even though the pawn may move there.
        assert!(!board.is_square_attacked(Square::E5, Side::White));
    }

    #[test]
    fn slider_attacks_through_empty_squares_only() {
        let board = board_with(&[
            (Square::A1, Piece::BLACK_ROOK),
            (Square::A4, Piece::WHITE_PAWN.as_moved()),
        ]);

        assert!(board.is_square_attacked(Square::A3, Side::Black));
        assert!(board.is_square_attacked(Square::A4, Side::Black));
        assert!(!board.is_square_attacked(Square::A5, Side::Black));
        assert!(board.is_square_attacked(Square::H1, Side::Black));

        // A queen attacks along both ray sets.
        let board = board_with(&[(Square::D4, Piece::WHITE_QUEEN)]);
        assert!(board.is_square_attacked(Square::D8, Side::White));
        assert!(board.is_square_attacked(Square::H8, Side::White));
        assert!(!board.is_square_attacked(Square::E6, Side::White));
    }

    #[test]
    fn legal_moves_exclude_self_check() {
        // The white rook on e2 is pinned to its king by the black rook on e8.
        let mut board = board_with(&[
            (Square::E1, Piece::WHITE_KING),
            (Square::E2, Piece::WHITE_ROOK),
            (Square::E8, Piece::BLACK_ROOK),
        ]);

        let legal = board.legal_moves_from(Square::E2);
        for m in &legal {
            assert_eq!(m.to_square().file(), 4, "pinned rook left the e-file");
        }
        // It can still slide up the file and capture the pinner.
        assert!(legal.iter().any(|m| m.to_square() == Square::E8));
    }

    #[test]
    fn no_check_filtering_before_the_king_arrives() {
        // No white king on the board: every pseudo-legal rook move is legal.
        let mut board = board_with(&[
            (Square::E2, Piece::WHITE_ROOK),
            (Square::E8, Piece::BLACK_ROOK),
        ]);

        let mut pseudo = MoveVec::new();
        board.potential_moves_from(Square::E2, &mut pseudo);
        let legal = board.legal_moves_from(Square::E2);
        assert_eq!(legal.len(), pseudo.len());
    }

    #[test]
    fn castling_generated_when_clear() {
        let mut board = board_with(&[
            (Square::E1, Piece::WHITE_KING),
            (Square::H1, Piece::WHITE_ROOK),
            (Square::A1, Piece::WHITE_ROOK),
        ]);

        let legal = board.legal_moves_from(Square::E1);
        assert!(legal
            .iter()
            .any(|m| m.is_kingside_castle() && m.to_square() == Square::G1));
        assert!(legal
            .iter()
            .any(|m| m.is_castle() && !m.is_kingside_castle() && m.to_square() == Square::C1));
    }

    #[test]
    fn castling_rejected_through_attacked_square() {
        // Black rook on f8 covers f1; kingside castling must not appear.
        let mut board = board_with(&[
            (Square::E1, Piece::WHITE_KING),
            (Square::H1, Piece::WHITE_ROOK),
            (Square::F8, Piece::BLACK_ROOK),
        ]);

        let legal = board.legal_moves_from(Square::E1);
        assert!(!legal.iter().any(|m| m.is_castle()));
    }

    #[test]
    fn castling_rejected_for_moved_rook_or_king() {
        let mut board = board_with(&[
            (Square::E1, Piece::WHITE_KING),
            (Square::H1, Piece::WHITE_ROOK.as_moved()),
        ]);
        assert!(!board
            .legal_moves_from(Square::E1)
            .iter()
            .any(|m| m.is_castle()));

        let mut board = board_with(&[
            (Square::E1, Piece::WHITE_KING.as_moved()),
            (Square::H1, Piece::WHITE_ROOK),
        ]);
        assert!(!board
            .legal_moves_from(Square::E1)
            .iter()
            .any(|m| m.is_castle()));
    }

    #[test]
    fn castling_rejected_while_in_check() {
        let mut board = board_with(&[
            (Square::E1, Piece::WHITE_KING),
            (Square::H1, Piece::WHITE_ROOK),
            (Square::E8, Piece::BLACK_ROOK),
        ]);

        assert!(board.is_in_check(Side::White));
        assert!(!board
            .legal_moves_from(Square::E1)
            .iter()
            .any(|m| m.is_castle()));
    }

    #[test]
    fn en_passant_capture_generated() {
        let mut board = board_with(&[
            (Square::E2, Piece::WHITE_PAWN),
            (Square::D4, Piece::BLACK_PAWN.as_moved()),
        ]);
        board.set_side_to_move(Side::White);

        // e2-e4 sets the target square behind the pawn.
        let m = board
            .legal_moves_from(Square::E2)
            .into_iter()
            .find(|m| m.is_double_pawn_push())
            .unwrap();
        board.make_move(m);
        assert_eq!(board.en_passant(), Some(Square::E3));

        let captures: Vec<_> = board
            .legal_moves_from(Square::D4)
            .into_iter()
            .filter(|m| m.is_en_passant())
            .collect();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].to_square(), Square::E3);
        assert_eq!(
            captures[0].captured().map(|(sq, p)| (sq, p.identity())),
            Some((Square::E4, Piece::WHITE_PAWN))
        );
    }
}
