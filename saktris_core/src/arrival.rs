//! The piece-arrival scheduler: decides *when* a piece arrives for each
//! side and *what kind* it is. Where it lands on the back rank is the
//! player's choice and none of this module's business.
//!
//! Determinism is the load-bearing property here. Arrival randomness runs
//! on per-side `ChaCha12` streams derived from the game seed, and every
//! draw consumes exactly one 32-bit output, so a manager rebuilt from
//! `(seed, draw count)` -- as save files and the network GAME_START
//! handshake do -- continues the identical sequence.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};

use crate::board::{PieceKind, Side};

/// How the scheduler picks arriving kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalMode {
    /// A fixed sequence: the standard back rank minus the king, followed by
    /// the eight pawns.
    #[default]
    Fixed,
    /// The player picks among the next few scheduled kinds.
    Selectable,
    /// Kinds are drawn from a weighted distribution.
    Random,
}

/// How many kinds a Selectable arrival offers.
pub const SELECTABLE_CHOICES: usize = 3;

/// The Fixed-mode schedule: a full army minus the king, heavy pieces first.
const FIXED_SEQUENCE: [PieceKind; 15] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
    PieceKind::Pawn,
    PieceKind::Pawn,
    PieceKind::Pawn,
    PieceKind::Pawn,
    PieceKind::Pawn,
    PieceKind::Pawn,
    PieceKind::Pawn,
    PieceKind::Pawn,
];

/// Draw weights over [`PieceKind::ARRIVABLE`], pawns heaviest.
const KIND_WEIGHTS: [u32; 5] = [40, 15, 15, 20, 10];

/// White's and Black's streams must differ or both sides would receive the
/// same kinds in lockstep.
const BLACK_STREAM_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

fn stream_seed(seed: u64, side: Side) -> u64 {
    match side {
        Side::White => seed,
        Side::Black => seed ^ BLACK_STREAM_SALT,
    }
}

#[derive(Debug, Clone)]
struct SideQueue {
    /// Turns of this side since the last arrival tick.
    counter: u32,
    /// Remaining scheduled kinds (Fixed) or the current lookahead window
    /// (Selectable). Unused in Random mode.
    upcoming: Vec<PieceKind>,
    /// The kinds offered for the arrival currently due, if any.
    pending: Option<Vec<PieceKind>>,
    /// Bishops committed so far (delivered or sitting in the window). The
    /// scheduler never commits a third: the board could not hold it.
    bishops_committed: u32,
    draws: u32,
    rng: ChaCha12Rng,
}

impl SideQueue {
    fn new(mode: ArrivalMode, seed: u64, side: Side) -> Self {
        let upcoming = match mode {
            ArrivalMode::Fixed => FIXED_SEQUENCE.to_vec(),
            _ => Vec::new(),
        };

        Self {
            counter: 0,
            upcoming,
            pending: None,
            bishops_committed: 0,
            draws: 0,
            rng: ChaCha12Rng::seed_from_u64(stream_seed(seed, side)),
        }
    }

    /// One weighted draw, consuming exactly one 32-bit rng output.
    fn draw_kind(&mut self) -> PieceKind {
        let total: u32 = KIND_WEIGHTS.iter().sum();
        let mut roll = self.rng.next_u32() % total;
        self.draws += 1;

        for (kind, &weight) in PieceKind::ARRIVABLE.iter().zip(&KIND_WEIGHTS) {
            if roll < weight {
                return *kind;
            }
            roll -= weight;
        }
        // The cumulative weights cover the whole roll range.
        unreachable!()
    }

    /// A draw that respects the two-bishop commitment cap.
    fn draw_placeable_kind(&mut self) -> PieceKind {
        loop {
            let kind = self.draw_kind();
            if kind != PieceKind::Bishop || self.bishops_committed < 2 {
                return kind;
            }
        }
    }
}

/// Per-side arrival scheduling: cadence counters plus the kind queues.
///
/// [`GameState`](crate::game::GameState) drives this once per turn; the
/// manager itself never touches the board.
#[derive(Debug, Clone)]
pub struct ArrivalManager {
    frequency: u32,
    mode: ArrivalMode,
    seed: u64,
    sides: [SideQueue; 2],
}

impl ArrivalManager {
    /// `frequency` is clamped to at least one: an arrival every turn.
    pub fn new(mode: ArrivalMode, frequency: u32, seed: u64) -> Self {
        Self {
            frequency: frequency.max(1),
            mode,
            seed,
            sides: [
                SideQueue::new(mode, seed, Side::White),
                SideQueue::new(mode, seed, Side::Black),
            ],
        }
    }

    pub fn mode(&self) -> ArrivalMode {
        self.mode
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Advances the cadence counter at the start of `side`'s turn and, if
    /// an arrival is due, prepares and returns the offered kinds.
    ///
    /// Returns `None` when nothing arrives this turn (not due yet, or the
    /// schedule has run dry).
    pub fn poll(&mut self, side: Side) -> Option<&[PieceKind]> {
        let queue = &mut self.sides[side.index()];

        if queue.pending.is_some() {
            // An arrival that was never placed (e.g. loaded mid-turn from a
            // save) stays on offer.
            return queue.pending.as_deref();
        }

        queue.counter += 1;
        if queue.counter < self.frequency {
            return None;
        }
        queue.counter = 0;

        let offered = match self.mode {
            ArrivalMode::Fixed => queue.upcoming.first().map(|&k| vec![k]),
            ArrivalMode::Random => Some(vec![queue.draw_placeable_kind()]),
            ArrivalMode::Selectable => {
                while queue.upcoming.len() < SELECTABLE_CHOICES {
                    let kind = queue.draw_placeable_kind();
                    if kind == PieceKind::Bishop {
                        queue.bishops_committed += 1;
                    }
                    queue.upcoming.push(kind);
                }
                Some(queue.upcoming[..SELECTABLE_CHOICES].to_vec())
            }
        };

        queue.pending = offered.filter(|kinds| !kinds.is_empty());
        queue.pending.as_deref()
    }

    /// The kinds currently on offer for `side`, if an arrival is due.
    pub fn pending(&self, side: Side) -> Option<&[PieceKind]> {
        self.sides[side.index()].pending.as_deref()
    }

    /// Consumes the offered kind at `index` (0 except in Selectable mode)
    /// once it has been placed.
    pub fn take(&mut self, side: Side, index: usize) -> Option<PieceKind> {
        let queue = &mut self.sides[side.index()];
        let pending = queue.pending.take()?;
        let &kind = pending.get(index)?;

        match self.mode {
            ArrivalMode::Fixed => {
                queue.upcoming.remove(0);
            }
            ArrivalMode::Selectable => {
                queue.upcoming.remove(index);
            }
            ArrivalMode::Random => {
                if kind == PieceKind::Bishop {
                    queue.bishops_committed += 1;
                }
            }
        }

        Some(kind)
    }

    /// Drops the current offer without consuming the schedule; used when no
    /// back-rank file can take the piece. Fixed sequences and Selectable
    /// windows keep their kinds for a later turn.
    pub fn skip(&mut self, side: Side) {
        self.sides[side.index()].pending = None;
    }

    pub fn to_state(&self) -> ArrivalManagerState {
        ArrivalManagerState {
            frequency: self.frequency,
            mode: self.mode,
            seed: self.seed,
            sides: [
                SideQueueState::of(&self.sides[0]),
                SideQueueState::of(&self.sides[1]),
            ],
        }
    }

    pub fn from_state(state: ArrivalManagerState) -> Self {
        let restore = |side: Side, qs: &SideQueueState| {
            let mut rng = ChaCha12Rng::seed_from_u64(stream_seed(state.seed, side));
            // Replay the stream position; every draw consumed one output.
            for _ in 0..qs.draws {
                let _ = rng.next_u32();
            }
            SideQueue {
                counter: qs.counter,
                upcoming: qs.upcoming.clone(),
                pending: qs.pending.clone(),
                bishops_committed: qs.bishops_committed,
                draws: qs.draws,
                rng,
            }
        };

        Self {
            frequency: state.frequency.max(1),
            mode: state.mode,
            seed: state.seed,
            sides: [
                restore(Side::White, &state.sides[0]),
                restore(Side::Black, &state.sides[1]),
            ],
        }
    }
}

/// The serialized shape of the manager: everything but the rng itself,
/// which is rebuilt from the seed and the stream position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalManagerState {
    pub frequency: u32,
    pub mode: ArrivalMode,
    pub seed: u64,
    pub sides: [SideQueueState; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SideQueueState {
    pub counter: u32,
    pub upcoming: Vec<PieceKind>,
    pub pending: Option<Vec<PieceKind>>,
    pub bishops_committed: u32,
    pub draws: u32,
}

impl SideQueueState {
    fn of(queue: &SideQueue) -> Self {
        Self {
            counter: queue.counter,
            upcoming: queue.upcoming.clone(),
            pending: queue.pending.clone(),
            bishops_committed: queue.bishops_committed,
            draws: queue.draws,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drain_arrivals(manager: &mut ArrivalManager, side: Side, turns: u32) -> Vec<PieceKind> {
        let mut kinds = Vec::new();
        for _ in 0..turns {
            if manager.poll(side).is_some() {
                kinds.push(manager.take(side, 0).unwrap());
            }
        }
        kinds
    }

    #[test]
    fn fixed_mode_delivers_the_standard_army_in_order() {
        let mut manager = ArrivalManager::new(ArrivalMode::Fixed, 1, 0);
        let kinds = drain_arrivals(&mut manager, Side::White, 15);

        assert_eq!(&kinds[..7], &FIXED_SEQUENCE[..7]);
        assert_eq!(kinds.len(), 15);
        // The schedule runs dry afterwards.
        assert_eq!(manager.poll(Side::White), None);
    }

    #[test]
    fn frequency_spaces_out_arrivals() {
        let mut manager = ArrivalManager::new(ArrivalMode::Fixed, 3, 0);

        assert_eq!(manager.poll(Side::White), None);
        assert_eq!(manager.poll(Side::White), None);
        assert!(manager.poll(Side::White).is_some());
        manager.take(Side::White, 0).unwrap();
        assert_eq!(manager.poll(Side::White), None);
    }

    #[test]
    fn sides_run_independent_cadences_and_streams() {
        let mut manager = ArrivalManager::new(ArrivalMode::Random, 1, 42);

        let white = drain_arrivals(&mut manager, Side::White, 10);
        let black = drain_arrivals(&mut manager, Side::Black, 10);

        assert_eq!(white.len(), 10);
        assert_eq!(black.len(), 10);
        // Same seed, different per-side streams.
        assert_ne!(white, black);
    }

    #[test]
    fn random_mode_is_deterministic_per_seed() {
        let mut a = ArrivalManager::new(ArrivalMode::Random, 1, 42);
        let mut b = ArrivalManager::new(ArrivalMode::Random, 1, 42);
        let mut c = ArrivalManager::new(ArrivalMode::Random, 1, 43);

        let kinds_a = drain_arrivals(&mut a, Side::White, 20);
        let kinds_b = drain_arrivals(&mut b, Side::White, 20);
        let kinds_c = drain_arrivals(&mut c, Side::White, 20);

        assert_eq!(kinds_a, kinds_b);
        assert_ne!(kinds_a, kinds_c);
    }

    #[test]
    fn random_mode_never_produces_kings_or_third_bishops() {
        let mut manager = ArrivalManager::new(ArrivalMode::Random, 1, 7);
        let kinds = drain_arrivals(&mut manager, Side::White, 200);

        assert!(kinds.iter().all(|&k| k != PieceKind::King));
        assert!(kinds.iter().filter(|&&k| k == PieceKind::Bishop).count() <= 2);
    }

    #[test]
    fn selectable_mode_offers_a_window_and_consumes_the_choice() {
        let mut manager = ArrivalManager::new(ArrivalMode::Selectable, 1, 9);

        let offered = manager.poll(Side::White).unwrap().to_vec();
        assert_eq!(offered.len(), SELECTABLE_CHOICES);

        let chosen = manager.take(Side::White, 1).unwrap();
        assert_eq!(chosen, offered[1]);

        // The unchosen kinds stay at the front of the next window.
        let next = manager.poll(Side::White).unwrap();
        assert_eq!(next[0], offered[0]);
        assert_eq!(next[1], offered[2]);
    }

    #[test]
    fn skip_keeps_the_fixed_schedule_intact() {
        let mut manager = ArrivalManager::new(ArrivalMode::Fixed, 1, 0);

        let first = manager.poll(Side::White).unwrap()[0];
        manager.skip(Side::White);

        // The same kind is offered again on the next tick.
        let again = manager.poll(Side::White).unwrap()[0];
        assert_eq!(first, again);
    }

    #[test]
    fn state_round_trip_continues_the_same_stream() {
        let mut manager = ArrivalManager::new(ArrivalMode::Random, 1, 1234);
        let _ = drain_arrivals(&mut manager, Side::White, 5);

        let mut restored = ArrivalManager::from_state(manager.to_state());

        let from_original = drain_arrivals(&mut manager, Side::White, 10);
        let from_restored = drain_arrivals(&mut restored, Side::White, 10);
        assert_eq!(from_original, from_restored);
    }

    #[test]
    fn state_serde_round_trip() {
        let mut manager = ArrivalManager::new(ArrivalMode::Selectable, 2, 5);
        let _ = manager.poll(Side::White);
        let _ = manager.poll(Side::White);

        let state = manager.to_state();
        let json = serde_json::to_string(&state).unwrap();
        let back: ArrivalManagerState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
