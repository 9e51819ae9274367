//! Depth-limited alpha-beta negamax over the board's make/undo pair.
//!
//! The search allocates nothing per node: move lists live in fixed-size
//! [`MoveVec`]s on the stack and undo records are plain `Copy` values in
//! the recursion frames. Cancellation is cooperative -- the abort flag is
//! sampled every so many nodes and the search unwinds promptly once it is
//! set.

use std::{
    sync::atomic::{AtomicBool, Ordering as AtomicOrdering},
    time::{Duration, Instant},
};

use saktris_core::board::{Board, Move, MoveVec, PieceKind};

use crate::{
    evaluation::{evaluate, piece_value},
    score::Score,
};

/// Hard ceiling on the requested depth; recursion frames are bounded by
/// this.
pub const MAX_DEPTH: u32 = 16;

/// How many nodes pass between abort-flag samples.
const ABORT_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    pub nodes: u64,
    pub depth: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchResult {
    /// The chosen move, or [`None`] if the side to move has no legal move
    /// (which the caller treats as resignation).
    pub best_move: Option<Move>,
    pub score: Score,
    pub stats: SearchStats,
    pub aborted: bool,
}

/// Runs a fixed-depth search for the board's side to move.
pub fn search_best_move(board: &mut Board, depth: u32, abort_flag: &AtomicBool) -> SearchResult {
    let start = Instant::now();
    let depth = depth.clamp(1, MAX_DEPTH);

    let mut ctx = SearchContext {
        board,
        abort_flag,
        nodes: 0,
        aborted: false,
    };
    let (score, best_move) = ctx.negamax(depth, 0, -Score::INF, Score::INF);

    let stats = SearchStats {
        nodes: ctx.nodes,
        depth,
        elapsed: start.elapsed(),
    };
    tracing::debug!(
        nodes = stats.nodes,
        depth,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        aborted = ctx.aborted,
        "search finished"
    );

    SearchResult {
        best_move,
        score,
        stats,
        aborted: ctx.aborted,
    }
}

struct SearchContext<'a> {
    board: &'a mut Board,
    abort_flag: &'a AtomicBool,
    nodes: u64,
    aborted: bool,
}

impl SearchContext<'_> {
    fn negamax(
        &mut self,
        depth: u32,
        ply_from_root: u32,
        mut alpha: Score,
        beta: Score,
    ) -> (Score, Option<Move>) {
        self.nodes += 1;
        if self.nodes % ABORT_CHECK_INTERVAL == 0
            && self.abort_flag.load(AtomicOrdering::Relaxed)
        {
            self.aborted = true;
        }
        if self.aborted {
            return (alpha, None);
        }

        // The fifty-move rule would void anything found down this line.
        if self.board.halfmove_clock() >= 100 {
            return (Score(0), None);
        }

        let mover = self.board.to_move();
        let mut moves = self.board.legal_moves(mover);

        if moves.is_empty() {
            return if self.board.is_in_check(mover) {
                (-Score::mate_in_plies(ply_from_root), None)
            } else {
                (Score(0), None)
            };
        }

        if depth == 0 {
            return (evaluate(self.board), None);
        }

        order_moves(&mut moves);

        let mut best_score = -Score::INF;
        let mut best_move = None;

        for m in moves {
            // The search never defers promotion choices: auto-queen.
            let m = if m.is_promotion_eligible() && m.promotion().is_none() {
                m.promoting_to(PieceKind::Queen)
            } else {
                m
            };

            let undo = self.board.make_move(m);
            let (reply, _) = self.negamax(depth - 1, ply_from_root + 1, -beta, -alpha);
            let eval = -reply;
            self.board.undo_move(undo);

            if self.aborted {
                return (best_score, best_move);
            }

            if eval > best_score {
                best_score = eval;
                best_move = Some(m);

                if eval >= beta {
                    break;
                }
                if eval > alpha {
                    alpha = eval;
                }
            }
        }

        (best_score, best_move)
    }
}

/// Captures first, most valuable victim first; ties broken by (from, to)
/// order so equal-scoring moves resolve identically on every peer and
/// every run.
fn order_moves(moves: &mut MoveVec) {
    moves.sort_unstable_by_key(|m| {
        let capture_value = m.captured().map_or(0, |(_, p)| piece_value(p.kind()));
        (
            std::cmp::Reverse(capture_value),
            m.from_square().get(),
            m.to_square().get(),
        )
    });
}
