//! A polling wrapper around the background search, for hosts that drain a
//! channel once per frame instead of taking a callback.

use std::sync::{
    atomic::{AtomicBool, Ordering as AtomicOrdering},
    mpsc::{self, Receiver, Sender},
    Arc,
};

use saktris_core::board::Board;

use crate::search::{search_best_move, SearchResult};

pub struct SearchThread {
    tx: Sender<(SearchResult, u64)>,
    rx: Receiver<(SearchResult, u64)>,
    abort_flag: Arc<AtomicBool>,

    outstanding_request: bool,
    search_gen: u64,
}

impl SearchThread {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        Self {
            tx,
            rx,
            abort_flag: Arc::new(AtomicBool::new(false)),
            outstanding_request: false,
            search_gen: 0,
        }
    }

    pub fn searching(&self) -> bool {
        self.outstanding_request
    }

    /// Kicks off a search over an owned copy of the board. A previous
    /// in-flight search is aborted and its late result discarded.
    pub fn send_search_request(&mut self, board: &Board, depth: u32) {
        self.cancel_search();

        let tx = self.tx.clone();
        let mut board = board.clone();

        self.abort_flag = Arc::new(AtomicBool::new(false));
        let abort_flag = self.abort_flag.clone();
        let search_gen = self.search_gen;

        std::thread::spawn(move || {
            let result = search_best_move(&mut board, depth, &abort_flag);
            // The receiver may be gone if the host shut down; that's fine.
            let _ = tx.send((result, search_gen));
        });

        self.outstanding_request = true;
    }

    /// Aborts the in-flight search, if any. Its eventual result carries a
    /// stale generation and is dropped by [`Self::try_receive_result`].
    pub fn cancel_search(&mut self) {
        self.abort_flag.store(true, AtomicOrdering::Relaxed);
        self.search_gen += 1;
        self.outstanding_request = false;
    }

    /// Non-blocking poll for the completed search; call once per frame.
    pub fn try_receive_result(&mut self) -> Option<SearchResult> {
        while let Ok((result, search_gen)) = self.rx.try_recv() {
            if search_gen == self.search_gen {
                self.outstanding_request = false;
                return Some(result);
            }
            // Stale result from a cancelled search; keep draining.
        }

        None
    }
}

impl Default for SearchThread {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SearchThread {
    fn drop(&mut self) {
        self.abort_flag.store(true, AtomicOrdering::Relaxed);
    }
}
