//! Typed events the core publishes to the UI.
//!
//! The core owns a sink provided at construction and fires events into it
//! as turns resolve; it never waits for acknowledgment and holds no
//! reference back to the subscriber.

use std::{cell::RefCell, rc::Rc, time::Duration};

use crate::board::{Axis, Piece, Side, Square};

/// Everything the core tells the outside world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    PieceMoved {
        from: Square,
        to: Square,
        piece: Piece,
    },
    PieceCaptured {
        square: Square,
        piece: Piece,
        attacker_from: Square,
    },
    PiecePlaced {
        square: Square,
        piece: Piece,
    },
    /// A pawn reached its promotion rank and waits for a choice.
    PromotionRequired {
        square: Square,
        piece: Piece,
    },
    TurnChanged {
        side: Side,
    },
    CheckDetected {
        side: Side,
    },
    GameOver {
        winner: Option<Side>,
        reason: String,
    },
    TimeExpired {
        side: Side,
    },
    LowTimeWarning {
        side: Side,
        remaining: Duration,
        critical: bool,
    },
    TripletCleared {
        squares: [Square; 3],
        axis: Axis,
        bumped_square: Option<Square>,
        /// Cosmetic passthrough for the UI's bump animation; no rules
        /// effect.
        physics_bump: bool,
    },
    /// An arrival had no legal back-rank file and was skipped.
    ArrivalSkipped {
        side: Side,
    },
    DrawOffered {
        side: Side,
    },
}

/// The seam the UI subscribes through.
pub trait EventSink {
    fn publish(&mut self, event: GameEvent);
}

/// Discards everything. The default sink for headless games and search.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&mut self, _event: GameEvent) {}
}

/// A sink that records events into a shared buffer. Handles are cheap
/// clones over the same buffer; tests hand one clone to the game and drain
/// the other.
#[derive(Debug, Default, Clone)]
pub struct EventCollector {
    events: Rc<RefCell<Vec<GameEvent>>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A boxed handle suitable for [`GameState`](crate::game::GameState)
    /// construction.
    pub fn sink(&self) -> Box<dyn EventSink> {
        Box::new(self.clone())
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<GameEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    /// A snapshot of everything recorded so far.
    pub fn snapshot(&self) -> Vec<GameEvent> {
        self.events.borrow().clone()
    }

    pub fn contains(&self, event: &GameEvent) -> bool {
        self.events.borrow().iter().any(|e| e == event)
    }
}

impl EventSink for EventCollector {
    fn publish(&mut self, event: GameEvent) {
        self.events.borrow_mut().push(event);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collector_handles_share_one_buffer() {
        let collector = EventCollector::new();
        let mut sink = collector.sink();

        sink.publish(GameEvent::TurnChanged { side: Side::White });
        sink.publish(GameEvent::CheckDetected { side: Side::Black });

        assert_eq!(collector.snapshot().len(), 2);
        assert_eq!(collector.drain().len(), 2);
        assert!(collector.snapshot().is_empty());
    }
}
