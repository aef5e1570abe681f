//! Pass-through

use crate::models::process::{PortDecl, Process, ProcessError, ProcessIo};

pub const KIND: &str = "relay";

/// Forwards everything available on `in` to `out`
#[derive(Debug, Default)]
pub struct Relay;

impl Process for Relay {
    fn kind(&self) -> &str {
        KIND
    }

    fn ports(&self) -> Vec<PortDecl> {
        vec![PortDecl::input("in"), PortDecl::output("out")]
    }

    fn compute(&mut self, io: &mut ProcessIo<'_>) -> Result<(), ProcessError> {
        let amount = io.available("in")?.max(0.0);
        io.consume("in", amount)?;
        io.provide("out", amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processes::test_support::Harness;

    #[test]
    fn test_forwards_all() {
        let mut harness = Harness::new(Box::new(Relay));
        harness.feed("in", 12.0, 1);
        harness.compute(1).unwrap();

        assert_eq!(harness.output("out"), 12.0);
        assert_eq!(harness.remaining("in"), 0.0);
    }
}
