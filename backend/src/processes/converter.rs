//! Converts a required input amount into output
//!
//! Each tick the converter needs `required` units on `in`. If they are there
//! it consumes exactly that and writes `required * ratio` to `out`. On a
//! shortfall it consumes nothing, writes zero to `out` and reports
//! insufficient input. A `required` of zero converts whatever is available.

use crate::models::process::{PortDecl, Process, ProcessError, ProcessIo};
use crate::models::property::PropertyDecl;

pub const KIND: &str = "converter";

#[derive(Debug, Default)]
pub struct Converter;

impl Process for Converter {
    fn kind(&self) -> &str {
        KIND
    }

    fn ports(&self) -> Vec<PortDecl> {
        vec![PortDecl::input("in"), PortDecl::output("out")]
    }

    fn properties(&self) -> Vec<PropertyDecl> {
        vec![PropertyDecl::real("required", 0.0), PropertyDecl::real("ratio", 1.0)]
    }

    fn compute(&mut self, io: &mut ProcessIo<'_>) -> Result<(), ProcessError> {
        let required = io.real("required")?;
        let ratio = io.real("ratio")?;

        let amount = if required > 0.0 {
            if let Err(e) = io.require("in", required) {
                io.zero_outputs();
                return Err(e);
            }
            required
        } else {
            io.available("in")?.max(0.0)
        };

        io.consume("in", amount)?;
        io.provide("out", amount * ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processes::test_support::Harness;

    #[test]
    fn test_converts_required_amount() {
        let mut harness = Harness::new(Box::new(Converter));
        harness.set("required", 40.0.into());
        harness.set("ratio", 0.5.into());

        harness.feed("in", 100.0, 1);
        harness.compute(1).unwrap();

        assert_eq!(harness.output("out"), 20.0);
        assert_eq!(harness.remaining("in"), 60.0);
    }

    #[test]
    fn test_shortfall_zeroes_output() {
        let mut harness = Harness::new(Box::new(Converter));
        harness.set("required", 100.0.into());

        harness.feed("in", 50.0, 1);
        let err = harness.compute(1).unwrap_err();

        assert_eq!(
            err,
            ProcessError::InsufficientInput {
                port: "in".to_string(),
                available: 50.0,
                required: 100.0,
            }
        );
        assert!(harness.written("out", 1));
        assert_eq!(harness.output("out"), 0.0);
        assert_eq!(harness.remaining("in"), 50.0);
    }

    #[test]
    fn test_zero_required_converts_everything() {
        let mut harness = Harness::new(Box::new(Converter));
        harness.set("ratio", 2.0.into());

        harness.feed("in", 3.0, 1);
        harness.compute(1).unwrap();

        assert_eq!(harness.output("out"), 6.0);
        assert_eq!(harness.remaining("in"), 0.0);
    }
}
