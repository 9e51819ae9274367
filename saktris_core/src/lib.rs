//! Core rules and game-state machinery for Saktris, a chess variant where
//! pieces arrive on the back rank over time instead of being set up at the
//! start.
//!
//! The crate is layered leaves-first: [`board`] owns occupancy, move
//! generation and the make/undo pair the search runs on; [`arrival`]
//! schedules which piece kinds arrive when; [`clock`] and [`draw`] keep
//! time and draw bookkeeping; [`game`] ties them together into the turn
//! state machine the UI, AI and network layers all drive.

pub mod arrival;
pub mod board;
pub mod clock;
pub mod draw;
pub mod game;
