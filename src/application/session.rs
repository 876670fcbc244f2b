use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rust_decimal::Decimal;

use crate::domain::errors::Termination;

/// A cloneable, cooperative cancellation flag. `Simulator::tick` polls it
/// once per minute; once tripped, `Session::check_cancellation` returns
/// `Err(Termination)` so callers can unwind cleanly instead of panicking.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run state threaded through the Simulator, MatchingEngine, and
/// OptimizationCoordinator instead of touching process-wide globals.
/// Each worker owns its own `Session`; nothing here is shared across
/// concurrent simulations.
#[derive(Debug, Clone)]
pub struct Session {
    pub starting_balance: Decimal,
    pub current_balance: Decimal,
    pub liquidation_count: u64,
    cancellation: CancellationToken,
}

impl Session {
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            starting_balance,
            current_balance: starting_balance,
            liquidation_count: 0,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn check_cancellation(&self) -> Result<(), Termination> {
        if self.cancellation.is_cancelled() {
            return Err(Termination);
        }
        Ok(())
    }

    pub fn record_liquidation(&mut self) {
        self.liquidation_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fresh_session_is_not_cancelled() {
        let session = Session::new(dec!(10000));
        assert!(session.check_cancellation().is_ok());
    }

    #[test]
    fn cancelling_the_shared_token_is_observed_by_the_session() {
        let session = Session::new(dec!(10000));
        let token = session.cancellation_token();
        token.cancel();
        assert!(session.check_cancellation().is_err());
    }
}
