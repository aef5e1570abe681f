//! Build a simulation from a declarative model
//!
//! Objects are created in a fixed order: entities (parents before children),
//! connections, process attachments, fan-out settings, output sinks, then
//! scheduled events. Names in the model resolve to the ids created so far,
//! and the first failure aborts the build. Entity names must be unique
//! within a model since every reference is by name.

use crate::error::KernelError;
use crate::simulation::config::ModelConfig;
use crate::simulation::engine::Simulation;
use crate::simulation::graph::ConnectOptions;
use std::collections::HashSet;
use tracing::info;

impl Simulation {
    /// Build a simulation from a model
    ///
    /// # Example
    ///
    /// ```rust
    /// use capability_flow_core_rs::{ModelConfig, Simulation};
    ///
    /// let model = ModelConfig::from_json(r#"{
    ///     "simulation": {"name": "grant", "step_count": 2, "unit_types": ["money"]},
    ///     "entities": [{"name": "Treasury"}],
    ///     "processes": [{"entity": "Treasury", "kind": "constant", "name": "grant",
    ///                    "ports": {"out": "money"}, "properties": {"amount": 4}}],
    ///     "outputs": [{"name": "Granted", "unit": "money", "producers": ["Treasury"]}]
    /// }"#).unwrap();
    ///
    /// let mut sim = Simulation::from_model(model).unwrap();
    /// sim.run(None, None);
    /// assert_eq!(sim.output_by_name("Granted").unwrap().results(), &[4.0, 4.0]);
    /// ```
    pub fn from_model(model: ModelConfig) -> Result<Self, KernelError> {
        let mut seen = HashSet::new();
        if let Some(entity) = model.entities.iter().find(|e| !seen.insert(e.name.as_str())) {
            return Err(KernelError::InvalidConfig(format!(
                "duplicate entity name in model: {}",
                entity.name
            )));
        }

        let mut sim = Simulation::new(model.simulation)?;

        for entity in &model.entities {
            let parent = entity
                .parent
                .as_deref()
                .map(|name| sim.entity_id(name))
                .transpose()?;
            sim.create_entity(&entity.name, &entity.attributes, parent)?;
        }

        for connection in &model.connections {
            let from = sim.entity_id(&connection.from)?;
            let to = sim.entity_id(&connection.to)?;
            let options = ConnectOptions {
                additive: connection.additive,
                copy: connection.copy,
            };
            sim.connect(from, to, &connection.unit, options)?;
        }

        for process in model.processes {
            let entity = sim.entity_id(&process.entity)?;
            sim.attach_process(entity, process.spec)?;
        }

        for fan_out in &model.apportionments {
            let connector = sim
                .entity_by_name(&fan_out.entity)?
                .output(&fan_out.unit)
                .map(|c| c.id())
                .ok_or_else(|| KernelError::NotConnected {
                    unit: fan_out.unit.clone(),
                })?;
            if let Some(mode) = &fan_out.mode {
                sim.set_apportionment(connector, mode.parse()?)?;
            }
            if let Some(biases) = &fan_out.biases {
                sim.set_biases(connector, biases)?;
            }
        }

        for output in &model.outputs {
            let id = sim.create_output(&output.name, &output.unit)?;
            for producer in &output.producers {
                let entity = sim.entity_id(producer)?;
                sim.connect_output(entity, id)?;
            }
        }

        for event in model.events {
            sim.schedule_event(event);
        }

        info!(
            simulation = %sim.name(),
            entities = sim.entities().count(),
            outputs = sim.outputs().count(),
            "model loaded"
        );
        Ok(sim)
    }

    /// Parse a JSON model and build it
    pub fn from_json(json: &str) -> Result<Self, KernelError> {
        Self::from_model(ModelConfig::from_json(json)?)
    }
}
