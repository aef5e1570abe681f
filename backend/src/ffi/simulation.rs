//! PyO3 wrapper for Simulation
//!
//! Models, run reports, errors and telemetry cross the boundary as JSON
//! strings so the Python side needs no mirror types.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict};

use crate::error::KernelError;
use crate::events::GraphEvent;
use crate::models::property::PropertyValue;
use crate::simulation::Simulation as RustSimulation;

fn kernel_err(e: KernelError) -> PyErr {
    PyErr::new::<PyRuntimeError, _>(e.to_string())
}

fn json_err(e: serde_json::Error) -> PyErr {
    PyErr::new::<PyRuntimeError, _>(format!("serialization failed: {}", e))
}

/// Python wrapper for Rust Simulation
///
/// # Example (from Python)
///
/// ```python
/// from capability_flow_core_rs import Simulation
///
/// sim = Simulation.from_json(open("archive.json").read())
/// report = sim.run()
/// print(report["violations"], sim.telemetry_json())
/// ```
#[pyclass(name = "Simulation", unsendable)]
pub struct PySimulation {
    inner: RustSimulation,
}

#[pymethods]
impl PySimulation {
    /// Build a simulation from a JSON model
    ///
    /// # Errors
    ///
    /// Raises RuntimeError if the model does not parse or any object in it
    /// fails validation.
    #[staticmethod]
    fn from_json(model: &str) -> PyResult<Self> {
        let inner = RustSimulation::from_json(model).map_err(kernel_err)?;
        Ok(PySimulation { inner })
    }

    /// Run ticks `start..=end` (defaults: the full range)
    ///
    /// # Returns
    ///
    /// Dictionary with `first_tick`, `last_tick`, `ticks_run`, `violations`,
    /// `pending` and `failed_events`.
    #[pyo3(signature = (start=None, end=None))]
    fn run(&mut self, py: Python<'_>, start: Option<usize>, end: Option<usize>) -> PyResult<Py<PyDict>> {
        let report = self.inner.run(start, end);

        let dict = PyDict::new_bound(py);
        dict.set_item("first_tick", report.first_tick)?;
        dict.set_item("last_tick", report.last_tick)?;
        dict.set_item("ticks_run", report.ticks_run)?;
        dict.set_item("violations", report.violations)?;
        dict.set_item("pending", report.pending)?;
        dict.set_item("failed_events", report.failed_events)?;
        Ok(dict.unbind())
    }

    fn step_count(&self) -> usize {
        self.inner.step_count()
    }

    fn set_step_count(&mut self, step_count: usize) -> PyResult<()> {
        self.inner.set_step_count(step_count).map_err(kernel_err)
    }

    /// Constraint violations of the last run, as a JSON array
    fn errors_json(&self) -> PyResult<String> {
        serde_json::to_string(self.inner.errors()).map_err(json_err)
    }

    fn telemetry_json(&self) -> PyResult<String> {
        self.inner.telemetry().to_json().map_err(kernel_err)
    }

    /// SHA-256 of the last run's series
    fn digest(&self) -> PyResult<String> {
        self.inner.telemetry().digest().map_err(kernel_err)
    }

    fn entity_names(&self) -> Vec<String> {
        self.inner.entities().map(|e| e.name().to_string()).collect()
    }

    fn output_names(&self) -> Vec<String> {
        self.inner.outputs().map(|o| o.name().to_string()).collect()
    }

    /// Set a process property by entity and process name
    #[pyo3(signature = (entity, process, name, value, additive=false))]
    fn set_property(
        &mut self,
        entity: &str,
        process: &str,
        name: &str,
        value: &Bound<'_, PyAny>,
        additive: bool,
    ) -> PyResult<()> {
        let value = if value.is_instance_of::<PyBool>() {
            PropertyValue::Bool(value.extract()?)
        } else if let Ok(v) = value.extract::<i64>() {
            PropertyValue::Int(v)
        } else if let Ok(v) = value.extract::<f64>() {
            PropertyValue::Real(v)
        } else {
            return Err(PyErr::new::<PyValueError, _>(
                "property values must be bool, int or float",
            ));
        };

        GraphEvent::SetProperty {
            entity: entity.to_string(),
            process: process.to_string(),
            property: name.to_string(),
            value,
            additive,
        }
        .apply(&mut self.inner)
        .map(|_| ())
        .map_err(kernel_err)
    }

    /// Set the bias of the `from -> to` endpoint for `unit`
    fn set_bias(&mut self, from: &str, to: &str, unit: &str, bias: f64) -> PyResult<()> {
        GraphEvent::SetBias {
            from: from.to_string(),
            to: to.to_string(),
            unit: unit.to_string(),
            bias,
        }
        .apply(&mut self.inner)
        .map(|_| ())
        .map_err(kernel_err)
    }

    /// Replace every bias of `entity`'s output connector for `unit`
    fn set_biases(&mut self, entity: &str, unit: &str, biases: Vec<f64>) -> PyResult<()> {
        GraphEvent::SetBiases {
            entity: entity.to_string(),
            unit: unit.to_string(),
            biases,
        }
        .apply(&mut self.inner)
        .map(|_| ())
        .map_err(kernel_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "Simulation(name={:?}, entities={}, outputs={}, step_count={})",
            self.inner.name(),
            self.inner.entities().count(),
            self.inner.outputs().count(),
            self.inner.step_count()
        )
    }
}
