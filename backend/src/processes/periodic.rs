//! Periodic budget release
//!
//! Models a budget granted once per period (e.g. an annual appropriation)
//! and spent evenly across the ticks of that period. The pool is refilled at
//! `reset` and at ticks 1, 1 + period, 1 + 2·period, ... Each tick releases
//! `amount / period`, capped by what is left in the pool.

use crate::models::process::{PortDecl, Process, ProcessError, ProcessIo};
use crate::models::property::{PropertyDecl, PropertySet};

pub const KIND: &str = "periodic_budget";

#[derive(Debug, Default)]
pub struct PeriodicBudget {
    pool: f64,
}

impl PeriodicBudget {
    /// Amount still available in the current period
    pub fn pool(&self) -> f64 {
        self.pool
    }
}

fn period_of(io: &ProcessIo<'_>) -> Result<usize, ProcessError> {
    let period = io.int("period")?;
    usize::try_from(period)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| ProcessError::InvalidProperty {
            name: "period".to_string(),
            reason: format!("must be positive, got {}", period),
        })
}

impl Process for PeriodicBudget {
    fn kind(&self) -> &str {
        KIND
    }

    fn ports(&self) -> Vec<PortDecl> {
        vec![PortDecl::output("out")]
    }

    fn properties(&self) -> Vec<PropertyDecl> {
        vec![PropertyDecl::real("amount", 0.0), PropertyDecl::int("period", 12)]
    }

    fn reset(&mut self, properties: &PropertySet) {
        self.pool = properties.real("amount").unwrap_or(0.0);
    }

    fn compute(&mut self, io: &mut ProcessIo<'_>) -> Result<(), ProcessError> {
        let amount = io.real("amount")?;
        let period = match period_of(io) {
            Ok(period) => period,
            Err(e) => {
                io.zero_outputs();
                return Err(e);
            }
        };

        if io.tick() >= 1 && (io.tick() - 1) % period == 0 {
            self.pool = amount;
        }

        let release = (amount / period as f64).min(self.pool).max(0.0);
        self.pool -= release;
        io.provide("out", release)
    }
}
