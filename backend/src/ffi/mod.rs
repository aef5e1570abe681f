//! Python bindings (enabled with the `pyo3` feature)

pub mod simulation;

pub use simulation::PySimulation;
