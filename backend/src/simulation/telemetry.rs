//! Telemetry snapshot
//!
//! After a run, [`Simulation::telemetry`] produces one record per output sink
//! (its full series with the tick of every value) plus one aggregate record
//! holding the run messages. [`Telemetry::digest`] hashes the canonical JSON
//! form so two runs can be compared without diffing series.

use crate::core::OutputId;
use crate::error::KernelError;
use crate::simulation::engine::Simulation;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// One entry of the telemetry snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum TelemetryRecord {
    /// Series recorded by one output sink
    Output {
        id: OutputId,
        name: String,
        unit: String,
        ticks: Vec<usize>,
        values: Vec<f64>,
    },

    /// Run messages, one line each, in the order they were logged
    Messages { entries: Vec<MessageEntry> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageEntry {
    pub tick: usize,
    pub kind: String,
    pub message: String,
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Telemetry {
    pub simulation: String,
    pub records: Vec<TelemetryRecord>,
}

impl Telemetry {
    /// Record of the sink named `name`
    pub fn output(&self, name: &str) -> Option<&TelemetryRecord> {
        self.records.iter().find(|r| match r {
            TelemetryRecord::Output { name: n, .. } => n == name,
            TelemetryRecord::Messages { .. } => false,
        })
    }

    pub fn messages(&self) -> &[MessageEntry] {
        self.records
            .iter()
            .find_map(|r| match r {
                TelemetryRecord::Messages { entries } => Some(entries.as_slice()),
                TelemetryRecord::Output { .. } => None,
            })
            .unwrap_or(&[])
    }

    pub fn to_json(&self) -> Result<String, KernelError> {
        serde_json::to_string(self)
            .map_err(|e| KernelError::InvalidConfig(format!("telemetry serialization failed: {}", e)))
    }

    /// SHA-256 over the series only, as canonical JSON with sorted keys
    ///
    /// Sink ids and run messages are excluded, so two simulations built from
    /// the same model that produce the same series share a digest.
    pub fn digest(&self) -> Result<String, KernelError> {
        let series: Vec<Value> = self
            .records
            .iter()
            .filter_map(|r| match r {
                TelemetryRecord::Output {
                    name,
                    unit,
                    ticks,
                    values,
                    ..
                } => Some(serde_json::json!({
                    "name": name,
                    "unit": unit,
                    "ticks": ticks,
                    "values": values,
                })),
                TelemetryRecord::Messages { .. } => None,
            })
            .collect();

        let json = serde_json::to_string(&canonicalize(Value::Array(series)))
            .map_err(|e| KernelError::InvalidConfig(format!("telemetry serialization failed: {}", e)))?;

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Recursively sort all object keys
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

impl Simulation {
    /// Snapshot of every sink series plus the run messages
    pub fn telemetry(&self) -> Telemetry {
        let mut records: Vec<TelemetryRecord> = self
            .outputs()
            .map(|output| TelemetryRecord::Output {
                id: output.id(),
                name: output.name().to_string(),
                unit: output.unit().to_string(),
                ticks: output.ticks().to_vec(),
                values: output.results().to_vec(),
            })
            .collect();

        records.push(TelemetryRecord::Messages {
            entries: self
                .event_log()
                .events()
                .iter()
                .map(|event| MessageEntry {
                    tick: event.tick(),
                    kind: event.event_type().to_string(),
                    message: event.message(),
                })
                .collect(),
        });

        Telemetry {
            simulation: self.name().to_string(),
            records,
        }
    }
}
