//! The enumerated options the core consumes from the settings file.
//!
//! The settings file carries more than this (theme, audio, bindings); those
//! keys do not affect core semantics and are ignored on read. Missing keys
//! take the documented defaults.

use serde::{Deserialize, Serialize};

use crate::arrival::ArrivalMode;
use crate::board::Side;

/// AI strength, mapped to search depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const fn search_depth(self) -> u32 {
        match self {
            Difficulty::Easy => 2,
            Difficulty::Medium => 3,
            Difficulty::Hard => 4,
        }
    }
}

/// Which turn model the session runs. Action mode's real-time details live
/// outside the core; the core only carries the selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    TwoPlayer,
    VsAi,
    Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    /// One arrival every N turns of a side; 1 means every turn.
    pub arrival_frequency: u32,
    pub arrival_mode: ArrivalMode,
    pub triplet_clear_enabled: bool,
    pub ai_difficulty: Difficulty,
    /// Which side the AI plays, if any.
    pub ai_side: Option<Side>,
    pub game_mode: GameMode,
    /// Game seed; in networked play the host chooses it and broadcasts it
    /// in the GAME_START payload.
    pub seed: Option<u64>,
    /// Cosmetic flag the core merely propagates in triplet-clear events.
    pub physics_bump: bool,
    pub clock_low_threshold_secs: u64,
    pub clock_critical_threshold_secs: u64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            arrival_frequency: 1,
            arrival_mode: ArrivalMode::Fixed,
            triplet_clear_enabled: false,
            ai_difficulty: Difficulty::Medium,
            ai_side: None,
            game_mode: GameMode::TwoPlayer,
            seed: None,
            physics_bump: false,
            clock_low_threshold_secs: 30,
            clock_critical_threshold_secs: 10,
        }
    }
}

impl GameSettings {
    /// Parses a settings document, tolerating unknown keys and filling
    /// defaults for missing ones. The frequency is clamped to at least 1.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut settings: Self = serde_json::from_str(json)?;
        settings.arrival_frequency = settings.arrival_frequency.max(1);
        Ok(settings)
    }
}
