//! Fixed amount every tick

use crate::models::process::{PortDecl, Process, ProcessError, ProcessIo};
use crate::models::property::PropertyDecl;

pub const KIND: &str = "constant";

/// Writes `amount` to `out` every tick
#[derive(Debug, Default)]
pub struct Constant;

impl Process for Constant {
    fn kind(&self) -> &str {
        KIND
    }

    fn ports(&self) -> Vec<PortDecl> {
        vec![PortDecl::output("out")]
    }

    fn properties(&self) -> Vec<PropertyDecl> {
        vec![PropertyDecl::real("amount", 0.0)]
    }

    fn compute(&mut self, io: &mut ProcessIo<'_>) -> Result<(), ProcessError> {
        let amount = io.real("amount")?;
        io.provide("out", amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processes::test_support::Harness;

    #[test]
    fn test_writes_amount_each_tick() {
        let mut harness = Harness::new(Box::new(Constant));
        harness.set("amount", 7.5.into());

        for tick in 1..=3 {
            harness.compute(tick).unwrap();
            assert_eq!(harness.output("out"), 7.5);
            assert!(harness.written("out", tick));
        }
    }
}
