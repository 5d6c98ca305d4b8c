//! Per-backend circuit breaker
//!
//! Isolates a persistently failing backend so repeated slow failures
//! cannot cascade into the rest of the pipeline. Owned and mutated only
//! by the orchestrator; no interior locking.

use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls fail fast until the cooldown elapses
    Open,
    /// Exactly one trial call is allowed through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: CircuitState,
    failure_count: u32,
    failure_threshold: u32,
    cooldown: Duration,
    last_transition: Instant,
    trial_pending: bool,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            failure_threshold: failure_threshold.max(1),
            cooldown,
            last_transition: Instant::now(),
            trial_pending: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Whether a call may proceed right now.
    ///
    /// Open transitions to half-open once the cooldown elapses; half-open
    /// admits a single trial call and refuses the rest until that trial
    /// reports back. Returns the remaining cooldown when refused.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        match self.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = self.last_transition.elapsed();
                if elapsed >= self.cooldown {
                    self.transition(CircuitState::HalfOpen);
                    self.trial_pending = true;
                    Ok(())
                } else {
                    Err(self.cooldown - elapsed)
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_pending {
                    // A trial is already out; fail fast
                    Err(self.cooldown)
                } else {
                    self.trial_pending = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful call.
    pub fn on_success(&mut self) {
        self.failure_count = 0;
        self.trial_pending = false;
        if self.state != CircuitState::Closed {
            info!("Circuit for {} closed after successful trial", self.name);
            self.transition(CircuitState::Closed);
        }
    }

    /// Record a surfaced call failure.
    pub fn on_failure(&mut self) {
        self.trial_pending = false;
        match self.state {
            CircuitState::HalfOpen => {
                warn!("Circuit for {} reopened: trial call failed", self.name);
                self.transition(CircuitState::Open);
            }
            CircuitState::Closed => {
                self.failure_count = self.failure_count.saturating_add(1);
                if self.failure_count >= self.failure_threshold {
                    warn!(
                        "Circuit for {} opened after {} consecutive failures",
                        self.name, self.failure_count
                    );
                    self.transition(CircuitState::Open);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.last_transition = Instant::now();
    }
}
