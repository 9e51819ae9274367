//! The minimax AI: static evaluation, alpha-beta search over the core's
//! make/undo interface, and the background worker the host loop talks to
//! through a completion channel.

use std::sync::{
    atomic::{AtomicBool, Ordering as AtomicOrdering},
    Arc,
};

use saktris_core::{board::Board, game::Difficulty};

pub mod evaluation;
pub mod score;
pub mod search;
pub mod search_thread;

use search::{search_best_move, SearchResult};

/// Owns the abort flag for the search in flight and spawns the worker
/// thread. One search at a time; starting a new one orphans the previous
/// (its result is delivered with a stale flag the caller ignores).
pub struct Engine {
    curr_abort_flag: Arc<AtomicBool>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            curr_abort_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Searches an owned copy of the board on a background thread and
    /// hands the result to `callback` from that thread.
    pub fn start_search(
        &mut self,
        board: &Board,
        difficulty: Difficulty,
        callback: impl FnOnce(SearchResult) + Send + 'static,
    ) {
        let mut board = board.clone();

        self.curr_abort_flag = Arc::new(AtomicBool::new(false));
        let abort_flag = self.curr_abort_flag.clone();

        std::thread::spawn(move || {
            let result = search_best_move(&mut board, difficulty.search_depth(), &abort_flag);
            callback(result);
        });
    }

    /// Asks the running search (if any) to stop. Cooperative: the search
    /// notices between nodes and returns what it has.
    pub fn abort_search(&self) {
        self.curr_abort_flag.store(true, AtomicOrdering::Relaxed);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.curr_abort_flag.store(true, AtomicOrdering::Relaxed);
    }
}
