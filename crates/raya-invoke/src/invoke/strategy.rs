//! Interpreted-to-compiled strategy switch
//!
//! Each invoker starts out interpreting. The first call runs interpreted and
//! marks the invoker as invoked; the second call attempts compilation and
//! settles the strategy for good. Counters use relaxed atomics: a racing
//! caller may interpret or compile once more than strictly necessary, which
//! is harmless.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::config::StrategyOverride;

/// Settled dispatch strategy of an invoker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// No call has settled the strategy yet
    Undetermined,
    /// Compilation failed, was unavailable, or was forced off
    InterpretedOnly,
    /// Calls go through a compiled trampoline
    Compiled,
}

impl Strategy {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Strategy::InterpretedOnly,
            2 => Strategy::Compiled,
            _ => Strategy::Undetermined,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Strategy::Undetermined => 0,
            Strategy::InterpretedOnly => 1,
            Strategy::Compiled => 2,
        }
    }
}

/// What the current call should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallPhase {
    /// First call: interpret
    Interpret,
    /// Second call: try to compile, then settle
    Determine,
    /// Strategy already settled
    Settled(Strategy),
}

/// Per-invoker strategy flags and counters
#[derive(Debug)]
pub struct StrategyState {
    invoked_once: AtomicBool,
    strategy: AtomicU8,
    call_count: AtomicU64,
    compilations: AtomicU32,
}

impl StrategyState {
    /// Fresh state, with an optional override applied up front
    pub fn new(policy: StrategyOverride) -> Self {
        let state = Self {
            invoked_once: AtomicBool::new(false),
            strategy: AtomicU8::new(Strategy::Undetermined.as_u8()),
            call_count: AtomicU64::new(0),
            compilations: AtomicU32::new(0),
        };
        match policy {
            StrategyOverride::None => {}
            StrategyOverride::Interpreted => {
                state.strategy.store(Strategy::InterpretedOnly.as_u8(), Ordering::Relaxed);
            }
            StrategyOverride::Compiled => state.invoked_once.store(true, Ordering::Relaxed),
        }
        state
    }

    /// Record a call and decide how to dispatch it
    pub(crate) fn next_call(&self) -> CallPhase {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        match self.strategy() {
            Strategy::Undetermined => {}
            settled => return CallPhase::Settled(settled),
        }
        if self.invoked_once.swap(true, Ordering::Relaxed) {
            CallPhase::Determine
        } else {
            CallPhase::Interpret
        }
    }

    /// Settle the strategy. The first caller to settle wins; returns the
    /// strategy in effect afterwards.
    pub(crate) fn settle(&self, strategy: Strategy) -> Strategy {
        match self.strategy.compare_exchange(
            Strategy::Undetermined.as_u8(),
            strategy.as_u8(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => strategy,
            Err(current) => Strategy::from_u8(current),
        }
    }

    /// Record a compilation attempt, return the new count
    pub(crate) fn record_compilation(&self) -> u32 {
        self.compilations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current strategy
    pub fn strategy(&self) -> Strategy {
        Strategy::from_u8(self.strategy.load(Ordering::Relaxed))
    }

    /// Whether at least one call has started
    pub fn invoked_once(&self) -> bool {
        self.invoked_once.load(Ordering::Relaxed)
    }

    /// Whether the strategy is settled
    pub fn is_determined(&self) -> bool {
        self.strategy() != Strategy::Undetermined
    }

    /// Total calls dispatched
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Compilation attempts made
    pub fn compilations(&self) -> u32 {
        self.compilations.load(Ordering::Relaxed)
    }
}

impl Default for StrategyState {
    fn default() -> Self {
        Self::new(StrategyOverride::None)
    }
}
