//! Stock with bounded capacity and throughput
//!
//! Everything arriving on `in` is added to the stock. Stock above `capacity`
//! is dropped (0 means unbounded). Each tick up to `throughput` is released
//! on `out` (0 means release everything). The stock starts at `initial` on
//! every run.

use crate::models::process::{PortDecl, Process, ProcessError, ProcessIo};
use crate::models::property::{PropertyDecl, PropertySet};

pub const KIND: &str = "buffer";

#[derive(Debug, Default)]
pub struct Buffer {
    stock: f64,
}

impl Buffer {
    pub fn stock(&self) -> f64 {
        self.stock
    }
}

impl Process for Buffer {
    fn kind(&self) -> &str {
        KIND
    }

    fn ports(&self) -> Vec<PortDecl> {
        vec![PortDecl::input("in"), PortDecl::output("out")]
    }

    fn properties(&self) -> Vec<PropertyDecl> {
        vec![
            PropertyDecl::real("capacity", 0.0),
            PropertyDecl::real("throughput", 0.0),
            PropertyDecl::real("initial", 0.0),
        ]
    }

    fn reset(&mut self, properties: &PropertySet) {
        self.stock = properties.real("initial").unwrap_or(0.0).max(0.0);
    }

    fn compute(&mut self, io: &mut ProcessIo<'_>) -> Result<(), ProcessError> {
        let capacity = io.real("capacity")?;
        let throughput = io.real("throughput")?;

        let inflow = io.available("in")?.max(0.0);
        io.consume("in", inflow)?;
        self.stock += inflow;
        if capacity > 0.0 {
            self.stock = self.stock.min(capacity);
        }

        let release = if throughput > 0.0 {
            self.stock.min(throughput)
        } else {
            self.stock
        };
        self.stock -= release;
        io.provide("out", release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processes::test_support::Harness;

    #[test]
    fn test_throughput_limits_release() {
        let mut harness = Harness::new(Box::new(Buffer::default()));
        harness.set("throughput", 4.0.into());
        harness.reset();

        harness.feed("in", 10.0, 1);
        harness.compute(1).unwrap();
        assert_eq!(harness.output("out"), 4.0);

        harness.feed("in", 0.0, 2);
        harness.compute(2).unwrap();
        assert_eq!(harness.output("out"), 4.0);

        harness.feed("in", 0.0, 3);
        harness.compute(3).unwrap();
        assert_eq!(harness.output("out"), 2.0);
    }

    #[test]
    fn test_capacity_drops_overflow() {
        let mut harness = Harness::new(Box::new(Buffer::default()));
        harness.set("capacity", 5.0.into());
        harness.set("throughput", 1.0.into());
        harness.set("initial", 3.0.into());
        harness.reset();

        harness.feed("in", 10.0, 1);
        harness.compute(1).unwrap();

        assert_eq!(harness.output("out"), 1.0);
        assert_eq!(harness.remaining("in"), 0.0);
    }

    #[test]
    fn test_reset_restores_initial_stock() {
        let mut harness = Harness::new(Box::new(Buffer::default()));
        harness.set("initial", 8.0.into());
        harness.reset();

        harness.feed("in", 0.0, 1);
        harness.compute(1).unwrap();
        assert_eq!(harness.output("out"), 8.0);

        harness.reset();
        harness.feed("in", 0.0, 1);
        harness.compute(1).unwrap();
        assert_eq!(harness.output("out"), 8.0);
    }
}
