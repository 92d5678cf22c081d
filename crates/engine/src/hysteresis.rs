//! Hysteresis engine: prevents alert fatigue from tier oscillation.
//!
//! A collateral price hovering around a tier cutoff would flip a position's
//! tier on every tick. The hysteresis engine requires a worse tier to be seen
//! for N consecutive price ticks before the monitor reports it.
//!
//! State is held in memory per position ID and resets on restart.

use std::collections::HashMap;
use uuid::Uuid;

/// Default number of consecutive ticks required before an alert fires.
pub const DEFAULT_HYSTERESIS_TICKS: u64 = 1;

/// Per-position hysteresis tracking state.
#[derive(Debug, Clone)]
struct HysteresisState {
    /// Number of consecutive ticks where the worse tier was observed.
    consecutive_count: u64,
    /// Most recent tick in the streak.
    last_tick: u64,
}

/// In-memory hysteresis engine.
pub struct HysteresisEngine {
    required_ticks: u64,
    states: HashMap<Uuid, HysteresisState>,
}

impl HysteresisEngine {
    /// `required_ticks` of zero is treated as one.
    pub fn new(required_ticks: u64) -> Self {
        Self {
            required_ticks: required_ticks.max(1),
            states: HashMap::new(),
        }
    }

    /// Check whether the hysteresis condition is satisfied for a position.
    ///
    /// - `position_id`: the position being evaluated
    /// - `degraded`: whether the position is in a worse tier than last reported
    /// - `tick`: sequence number of the current price tick
    ///
    /// Returns `true` only when `degraded` has held for N consecutive ticks.
    pub fn check(&mut self, position_id: Uuid, degraded: bool, tick: u64) -> bool {
        if !degraded {
            self.states.remove(&position_id);
            return false;
        }

        let state = self.states.entry(position_id).or_insert(HysteresisState {
            consecutive_count: 0,
            last_tick: 0,
        });

        // Same tick twice is idempotent
        if state.consecutive_count == 0 || tick == state.last_tick + 1 {
            state.consecutive_count += 1;
            state.last_tick = tick;
        } else if tick != state.last_tick {
            // Gap in ticks → restart streak
            state.consecutive_count = 1;
            state.last_tick = tick;
        }

        if state.consecutive_count >= self.required_ticks {
            // Next alert needs a fresh streak
            self.states.remove(&position_id);
            true
        } else {
            false
        }
    }

    /// Reset hysteresis state for a position.
    pub fn reset(&mut self, position_id: Uuid) {
        self.states.remove(&position_id);
    }

    /// Number of positions with an open streak.
    pub fn tracked_count(&self) -> usize {
        self.states.len()
    }
}

impl Default for HysteresisEngine {
    fn default() -> Self {
        Self::new(DEFAULT_HYSTERESIS_TICKS)
    }
}
