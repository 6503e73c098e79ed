//! # Workflows Module
//!
//! Complete procedures built on the [`Lattice`](crate::engine::Lattice):
//!
//! - **Simulation** ([`simulate`]) - Burn-in followed by a recorded measurement run, summarized
//!   into means and fluctuation estimators.
//! - **Sweep** ([`sweep`]) - Independent chains over a range of one parameter, run on a bounded
//!   thread pool with per-chain seeds derived from a common base.
//!
//! Both check a shared [`CancelToken`] between chunks of Metropolis steps, so a cancelled run
//! stops at the next chunk boundary and still reports what it measured.

pub mod simulate;
pub mod sweep;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a workflow and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
