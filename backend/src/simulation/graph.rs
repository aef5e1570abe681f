//! Graph mutation and lookup
//!
//! Every mutating call validates all of its arguments before touching the
//! graph, so a call that returns an error leaves the graph unchanged.
//!
//! # Critical Invariants
//!
//! 1. **Mutual links**: an output connector lists an input connector as an
//!    endpoint iff that input connector lists the output connector as a
//!    source
//! 2. **One connector per unit type** on each side of an entity
//! 3. **Acyclic**: a connection that would let flow return to its producer
//!    is rejected with `CycleDetected`
//! 4. **Pruning**: an input connector losing its last source is detached
//!    from its owner, so the owner becomes a source. An output connector
//!    losing its last endpoint is detached unless a process port is still
//!    bound to it

use crate::core::{ConnectorId, EntityId, NodeId, OutputId, ProcessId, UnitType};
use crate::error::KernelError;
use crate::events::ScheduledEvent;
use crate::models::connector::{Apportionment, InputConnector, OutputConnector};
use crate::models::entity::Entity;
use crate::models::output::Output;
use crate::models::process::{PortBinding, PortDirection, Process, ProcessEntry};
use crate::models::property::{PropertySet, PropertyValue};
use crate::processes::ProcessSpec;
use crate::simulation::engine::{ConnectorRef, ConnectorSide, Simulation};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Options for `Simulation::connect`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Switch the receiving input connector to additive accumulation
    #[serde(default)]
    pub additive: bool,

    /// Switch the producing output connector to copy apportionment
    #[serde(default)]
    pub copy: bool,
}

impl Simulation {
    // ========================================================================
    // Entities
    // ========================================================================

    /// Create an entity, optionally under an administrative parent
    pub fn create_entity<I, S>(
        &mut self,
        name: &str,
        attributes: I,
        parent: Option<EntityId>,
    ) -> Result<EntityId, KernelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        check_name(name, "entity")?;
        let attributes = self.registry.check_attributes(attributes)?;
        if let Some(parent) = parent {
            if !self.entities.contains_key(&parent) {
                return Err(KernelError::entity(parent));
            }
        }

        let entity = Entity::new(name.to_string(), attributes, parent);
        let id = entity.id();
        self.entities.insert(id, entity);
        if let Some(parent) = parent.and_then(|p| self.entities.get_mut(&p)) {
            parent.add_child(id);
        }
        debug!(entity = %name, "entity created");
        Ok(id)
    }

    /// Remove an entity and, recursively, its administrative children.
    ///
    /// Every connection touching a removed entity is severed first.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<(), KernelError> {
        let root = self.entity(id)?;
        let parent = root.parent();

        let mut doomed = vec![id];
        let mut index = 0;
        while index < doomed.len() {
            if let Some(entity) = self.entities.get(&doomed[index]) {
                doomed.extend(entity.children().iter().copied());
            }
            index += 1;
        }

        if let Some(parent) = parent.and_then(|p| self.entities.get_mut(&p)) {
            parent.remove_child(id);
        }
        for entity in doomed {
            self.sever(entity);
            if let Some(removed) = self.entities.shift_remove(&entity) {
                for process in removed.processes() {
                    self.process_owners.remove(&process.id());
                }
                for connector in removed.inputs() {
                    self.connectors.remove(&connector.id());
                }
                for connector in removed.outputs() {
                    self.connectors.remove(&connector.id());
                }
                debug!(entity = %removed.name(), "entity removed");
            }
        }
        Ok(())
    }

    pub fn remove_entity_by_name(&mut self, name: &str) -> Result<(), KernelError> {
        let id = self.entity_id(name)?;
        self.remove_entity(id)
    }

    /// Detach every link between `entity` and the rest of the graph
    fn sever(&mut self, entity: EntityId) {
        let Some(node) = self.entities.get(&entity) else {
            return;
        };
        let upstream: Vec<(ConnectorId, ConnectorId)> = node
            .inputs()
            .flat_map(|input| input.sources().iter().map(move |l| (l.connector, input.id())))
            .collect();
        let downstream: Vec<(ConnectorId, ConnectorId)> = node
            .outputs()
            .flat_map(|output| output.endpoints().iter().map(move |e| (output.id(), e.input)))
            .collect();

        for (output, input) in upstream.into_iter().chain(downstream) {
            self.unlink(output, input);
        }
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Connect `from`'s output connector of `unit` to `to`'s input connector
    /// of `unit`, creating either connector if absent.
    ///
    /// Returns `(output connector, input connector)`. Connecting an already
    /// connected pair is a no-op apart from the options.
    pub fn connect(
        &mut self,
        from: EntityId,
        to: EntityId,
        unit: &str,
        options: ConnectOptions,
    ) -> Result<(ConnectorId, ConnectorId), KernelError> {
        let unit = self.registry.unit_type(unit)?;
        self.entity(from)?;
        self.entity(to)?;
        if from == to || self.reaches(to, from) {
            return Err(KernelError::CycleDetected { from, to });
        }

        let output = self.ensure_output(from, &unit)?;
        let input = self.ensure_input(to, &unit, options.additive)?;
        if options.additive {
            self.input_connector_mut(input)?.set_additive(true);
        }
        if options.copy {
            self.output_connector_mut(output)?.set_mode(Apportionment::Copy);
        }

        self.output_connector_mut(output)?.add_endpoint(input);
        self.input_connector_mut(input)?.add_source(output);
        debug!(%from, %to, %unit, "connected");
        Ok((output, input))
    }

    /// Remove the connection between `from` and `to` for `unit`
    pub fn disconnect(&mut self, from: EntityId, to: EntityId, unit: &str) -> Result<(), KernelError> {
        let not_connected = || KernelError::NotConnected {
            unit: unit.to_string(),
        };
        let output = self
            .entity(from)?
            .output(unit)
            .map(OutputConnector::id)
            .ok_or_else(not_connected)?;
        let input = self
            .entity(to)?
            .input(unit)
            .map(InputConnector::id)
            .ok_or_else(not_connected)?;
        if !self.output_connector(output)?.has_endpoint(input) {
            return Err(not_connected());
        }

        self.unlink(output, input);
        debug!(%from, %to, %unit, "disconnected");
        Ok(())
    }

    /// Create an output sink collecting `unit`
    pub fn create_output(&mut self, name: &str, unit: &str) -> Result<OutputId, KernelError> {
        check_name(name, "output")?;
        let unit = self.registry.unit_type(unit)?;

        let output = Output::new(name.to_string(), unit);
        let id = output.id();
        self.outputs.insert(id, output);
        Ok(id)
    }

    /// Remove an output sink and its links
    pub fn remove_output(&mut self, id: OutputId) -> Result<(), KernelError> {
        let links: Vec<(ConnectorId, ConnectorId)> = self
            .output(id)?
            .inputs()
            .flat_map(|input| input.sources().iter().map(move |l| (l.connector, input.id())))
            .collect();
        for (output, input) in links {
            self.unlink(output, input);
        }
        self.outputs.shift_remove(&id);
        Ok(())
    }

    /// Feed `entity`'s output connector of the sink's unit type into the sink
    ///
    /// Returns the sink-side input connector.
    pub fn connect_output(&mut self, entity: EntityId, output: OutputId) -> Result<ConnectorId, KernelError> {
        self.entity(entity)?;
        let unit = self.output(output)?.unit().clone();

        let source = self.ensure_output(entity, &unit)?;
        let sink = self
            .outputs
            .get_mut(&output)
            .ok_or_else(|| KernelError::output(output))?;
        if let Some(existing) = sink.input_from(source) {
            return Ok(existing);
        }

        let input = sink.add_input();
        input.add_source(source);
        let input = input.id();
        self.connectors.insert(
            input,
            ConnectorRef {
                owner: NodeId::Output(output),
                unit,
                side: ConnectorSide::Input,
            },
        );
        self.output_connector_mut(source)?.add_endpoint(input);
        Ok(input)
    }

    pub fn disconnect_output(&mut self, entity: EntityId, output: OutputId) -> Result<(), KernelError> {
        let unit = self.output(output)?.unit().clone();
        let not_connected = || KernelError::NotConnected {
            unit: unit.to_string(),
        };
        let source = self
            .entity(entity)?
            .output(unit.as_str())
            .map(OutputConnector::id)
            .ok_or_else(not_connected)?;
        let input = self
            .output(output)?
            .input_from(source)
            .ok_or_else(not_connected)?;

        self.unlink(source, input);
        Ok(())
    }

    /// Break one output -> input link and prune whatever became idle
    fn unlink(&mut self, output: ConnectorId, input: ConnectorId) {
        let Some(source) = self.connectors.get(&output).cloned() else {
            return;
        };
        let Some(target) = self.connectors.get(&input).cloned() else {
            return;
        };

        if let NodeId::Entity(id) = source.owner {
            if let Some(entity) = self.entities.get_mut(&id) {
                if let Some(connector) = entity.output_mut(source.unit.as_str()) {
                    connector.remove_endpoint(input);
                }
                if let Some(pruned) = entity.prune_output(&source.unit) {
                    self.connectors.remove(&pruned.id());
                }
            }
        }

        match target.owner {
            NodeId::Entity(id) => {
                if let Some(entity) = self.entities.get_mut(&id) {
                    if let Some(connector) = entity.input_mut(target.unit.as_str()) {
                        connector.remove_source(output);
                    }
                    if let Some(pruned) = entity.release_input(&target.unit) {
                        self.connectors.remove(&pruned.id());
                    }
                }
            }
            NodeId::Output(id) => {
                // Sink inputs are per producer, so they always go
                if let Some(sink) = self.outputs.get_mut(&id) {
                    sink.remove_input(input);
                }
                self.connectors.remove(&input);
            }
        }
    }

    /// True if flow leaving `start` can arrive at `target`
    fn reaches(&self, start: EntityId, target: EntityId) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            let Some(entity) = self.entities.get(&current) else {
                continue;
            };
            for endpoint in entity.outputs().flat_map(OutputConnector::endpoints) {
                if let Some(ConnectorRef {
                    owner: NodeId::Entity(next),
                    ..
                }) = self.connectors.get(&endpoint.input)
                {
                    queue.push_back(*next);
                }
            }
        }
        false
    }

    fn ensure_output(&mut self, entity: EntityId, unit: &UnitType) -> Result<ConnectorId, KernelError> {
        let id = self
            .entities
            .get_mut(&entity)
            .ok_or_else(|| KernelError::entity(entity))?
            .ensure_output(unit)
            .id();
        self.connectors.entry(id).or_insert_with(|| ConnectorRef {
            owner: NodeId::Entity(entity),
            unit: unit.clone(),
            side: ConnectorSide::Output,
        });
        Ok(id)
    }

    fn ensure_input(&mut self, entity: EntityId, unit: &UnitType, additive: bool) -> Result<ConnectorId, KernelError> {
        let id = self
            .entities
            .get_mut(&entity)
            .ok_or_else(|| KernelError::entity(entity))?
            .ensure_input(unit, additive)
            .id();
        self.connectors.entry(id).or_insert_with(|| ConnectorRef {
            owner: NodeId::Entity(entity),
            unit: unit.clone(),
            side: ConnectorSide::Input,
        });
        Ok(id)
    }

    // ========================================================================
    // Processes
    // ========================================================================

    /// Attach a process of a registered kind
    pub fn attach_process(&mut self, entity: EntityId, spec: ProcessSpec) -> Result<ProcessId, KernelError> {
        let process = self.process_kinds.create(&spec.kind)?;
        self.attach_custom_process(entity, spec, process)
    }

    /// Attach a caller-supplied process instance
    ///
    /// `spec.kind` is ignored; the kind reported by `process` is used.
    /// Ports are bound to the entity's connectors of the unit types given
    /// in `spec.ports`, creating connectors as needed.
    pub fn attach_custom_process(
        &mut self,
        entity: EntityId,
        spec: ProcessSpec,
        process: Box<dyn Process>,
    ) -> Result<ProcessId, KernelError> {
        check_name(&spec.name, "process")?;
        self.entity(entity)?;

        let kind = process.kind().to_string();
        let decls = process.ports();
        if let Some(port) = spec
            .ports
            .keys()
            .find(|port| !decls.iter().any(|d| d.name == port.as_str()))
        {
            return Err(KernelError::UnknownPort {
                kind,
                port: port.clone(),
            });
        }

        let mut ports = Vec::with_capacity(decls.len());
        for decl in &decls {
            let unit = spec.ports.get(decl.name).ok_or_else(|| KernelError::MissingPortBinding {
                kind: kind.clone(),
                port: decl.name.to_string(),
            })?;
            ports.push(PortBinding {
                name: decl.name.to_string(),
                direction: decl.direction,
                unit: self.registry.unit_type(unit)?,
            });
        }

        let mut properties = PropertySet::from_decls(&process.properties());
        for (name, value) in &spec.properties {
            properties.set(name, *value, false)?;
        }

        for port in &ports {
            match port.direction {
                PortDirection::Input => self.ensure_input(entity, &port.unit, false)?,
                PortDirection::Output => self.ensure_output(entity, &port.unit)?,
            };
        }

        let entry = ProcessEntry::new(spec.name, spec.priority, entity, ports, properties, process);
        let id = entry.id();
        debug!(process = %entry.name(), kind = %kind, priority = entry.priority(), "process attached");
        self.entities
            .get_mut(&entity)
            .ok_or_else(|| KernelError::entity(entity))?
            .add_process(entry);
        self.process_owners.insert(id, entity);
        Ok(id)
    }

    /// Detach a process, pruning connectors only it kept alive
    pub fn detach_process(&mut self, id: ProcessId) -> Result<(), KernelError> {
        let entity = *self
            .process_owners
            .get(&id)
            .ok_or_else(|| KernelError::process(id))?;
        let owner = self
            .entities
            .get_mut(&entity)
            .ok_or_else(|| KernelError::entity(entity))?;
        let entry = owner.remove_process(id).ok_or_else(|| KernelError::process(id))?;

        let mut pruned = Vec::new();
        for port in entry.ports() {
            match port.direction {
                PortDirection::Input => pruned.extend(owner.prune_input(&port.unit).map(|c| c.id())),
                PortDirection::Output => {
                    pruned.extend(owner.prune_output(&port.unit).map(|c| c.id()))
                }
            }
        }
        for connector in pruned {
            self.connectors.remove(&connector);
        }
        self.process_owners.remove(&id);
        Ok(())
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Set (or, with `additive`, add to) a process property
    ///
    /// Returns the stored value.
    pub fn set_property(
        &mut self,
        process: ProcessId,
        name: &str,
        value: impl Into<PropertyValue>,
        additive: bool,
    ) -> Result<PropertyValue, KernelError> {
        let entry = self.process_mut(process)?;
        Ok(entry.properties_mut().set(name, value.into(), additive)?)
    }

    /// Set the bias of one endpoint of an output connector
    pub fn set_bias(&mut self, connector: ConnectorId, endpoint: ConnectorId, bias: f64) -> Result<(), KernelError> {
        self.output_connector_mut(connector)?.set_bias(endpoint, bias)
    }

    /// Replace every bias of an output connector, in endpoint order
    pub fn set_biases(&mut self, connector: ConnectorId, biases: &[f64]) -> Result<(), KernelError> {
        self.output_connector_mut(connector)?.set_biases(biases)
    }

    pub fn set_apportionment(&mut self, connector: ConnectorId, mode: Apportionment) -> Result<(), KernelError> {
        self.output_connector_mut(connector)?.set_mode(mode);
        Ok(())
    }

    pub(crate) fn restore_weights(
        &mut self,
        connector: ConnectorId,
        mode: Apportionment,
        biases: &[f64],
    ) -> Result<(), KernelError> {
        self.output_connector_mut(connector)?.restore_biases(mode, biases);
        Ok(())
    }

    /// Schedule a parameter change for future runs
    pub fn schedule_event(&mut self, event: ScheduledEvent) {
        self.schedule.push(event);
    }

    pub fn scheduled_events(&self) -> &[ScheduledEvent] {
        self.schedule.events()
    }

    pub fn clear_scheduled_events(&mut self) {
        self.schedule.clear();
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn entity(&self, id: EntityId) -> Result<&Entity, KernelError> {
        self.entities.get(&id).ok_or_else(|| KernelError::entity(id))
    }

    /// Names are not unique; the first entity created with `name` wins
    pub fn entity_by_name(&self, name: &str) -> Result<&Entity, KernelError> {
        self.entities
            .values()
            .find(|e| e.name() == name)
            .ok_or_else(|| KernelError::EntityNotFound(name.to_string()))
    }

    pub fn entity_id(&self, name: &str) -> Result<EntityId, KernelError> {
        self.entity_by_name(name).map(Entity::id)
    }

    /// Entities in creation order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn process(&self, id: ProcessId) -> Result<&ProcessEntry, KernelError> {
        self.process_owners
            .get(&id)
            .and_then(|entity| self.entities.get(entity))
            .and_then(|entity| entity.process(id))
            .ok_or_else(|| KernelError::process(id))
    }

    /// Process `name` on the entity named `entity`
    /// First process called `name` in firing order on the first entity
    /// called `entity`
    pub fn process_by_name(&self, entity: &str, name: &str) -> Result<&ProcessEntry, KernelError> {
        self.entity_by_name(entity)?
            .processes()
            .find(|p| p.name() == name)
            .ok_or_else(|| KernelError::ProcessNotFound(format!("{}/{}", entity, name)))
    }

    fn process_mut(&mut self, id: ProcessId) -> Result<&mut ProcessEntry, KernelError> {
        self.process_owners
            .get(&id)
            .and_then(|entity| self.entities.get_mut(entity))
            .and_then(|entity| entity.process_mut(id))
            .ok_or_else(|| KernelError::process(id))
    }

    pub fn output(&self, id: OutputId) -> Result<&Output, KernelError> {
        self.outputs.get(&id).ok_or_else(|| KernelError::output(id))
    }

    /// First output sink created with `name`
    pub fn output_by_name(&self, name: &str) -> Result<&Output, KernelError> {
        self.outputs
            .values()
            .find(|o| o.name() == name)
            .ok_or_else(|| KernelError::OutputNotFound(name.to_string()))
    }

    /// Output sinks in creation order
    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    pub fn output_connector(&self, id: ConnectorId) -> Result<&OutputConnector, KernelError> {
        let found = match self.connectors.get(&id) {
            Some(ConnectorRef {
                owner: NodeId::Entity(entity),
                unit,
                side: ConnectorSide::Output,
            }) => self
                .entities
                .get(entity)
                .and_then(|e| e.output(unit.as_str())),
            _ => None,
        };
        found.ok_or_else(|| KernelError::connector(id))
    }

    pub fn input_connector(&self, id: ConnectorId) -> Result<&InputConnector, KernelError> {
        let found = match self.connectors.get(&id) {
            Some(ConnectorRef {
                owner: NodeId::Entity(entity),
                unit,
                side: ConnectorSide::Input,
            }) => self.entities.get(entity).and_then(|e| e.input(unit.as_str())),
            Some(ConnectorRef {
                owner: NodeId::Output(output),
                side: ConnectorSide::Input,
                ..
            }) => self.outputs.get(output).and_then(|o| o.input(id)),
            _ => None,
        };
        found.ok_or_else(|| KernelError::connector(id))
    }

    /// Look up a connector id by its name (`"<owner>.<unit>.in"` or `".out"`)
    pub fn connector_id(&self, name: &str) -> Result<ConnectorId, KernelError> {
        let on_entities = self.entities.values().find_map(|e| {
            e.inputs()
                .find(|c| c.name() == name)
                .map(InputConnector::id)
                .or_else(|| e.outputs().find(|c| c.name() == name).map(OutputConnector::id))
        });
        on_entities
            .or_else(|| {
                self.outputs
                    .values()
                    .flat_map(Output::inputs)
                    .find(|c| c.name() == name)
                    .map(InputConnector::id)
            })
            .ok_or_else(|| KernelError::ConnectorNotFound(name.to_string()))
    }

    fn output_connector_mut(&mut self, id: ConnectorId) -> Result<&mut OutputConnector, KernelError> {
        let found = match self.connectors.get(&id) {
            Some(ConnectorRef {
                owner: NodeId::Entity(entity),
                unit,
                side: ConnectorSide::Output,
            }) => self
                .entities
                .get_mut(entity)
                .and_then(|e| e.output_mut(unit.as_str())),
            _ => None,
        };
        found.ok_or_else(|| KernelError::connector(id))
    }

    fn input_connector_mut(&mut self, id: ConnectorId) -> Result<&mut InputConnector, KernelError> {
        let found = match self.connectors.get(&id) {
            Some(ConnectorRef {
                owner: NodeId::Entity(entity),
                unit,
                side: ConnectorSide::Input,
            }) => self
                .entities
                .get_mut(entity)
                .and_then(|e| e.input_mut(unit.as_str())),
            Some(ConnectorRef {
                owner: NodeId::Output(output),
                side: ConnectorSide::Input,
                ..
            }) => self.outputs.get_mut(output).and_then(|o| o.input_mut(id)),
            _ => None,
        };
        found.ok_or_else(|| KernelError::connector(id))
    }
}

fn check_name(name: &str, what: &str) -> Result<(), KernelError> {
    if name.trim().is_empty() {
        return Err(KernelError::InvalidConfig(format!(
            "{} name must not be empty",
            what
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::SimulationConfig;

    fn sim() -> Simulation {
        Simulation::new(SimulationConfig::new(
            "graph",
            4,
            ["money", "staff_hours"],
            ["core", "support"],
        ))
        .unwrap()
    }

    fn entity(sim: &mut Simulation, name: &str) -> EntityId {
        sim.create_entity(name, Vec::<String>::new(), None).unwrap()
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let mut sim = sim();
        let err = sim.create_entity("A", ["core", "bogus"], None).unwrap_err();
        assert_eq!(err, KernelError::UnknownAttribute("bogus".to_string()));
        assert_eq!(sim.entities().count(), 0);
    }

    #[test]
    fn test_connect_is_idempotent_and_mutual() {
        let mut sim = sim();
        let a = entity(&mut sim, "A");
        let b = entity(&mut sim, "B");

        let (out, input) = sim.connect(a, b, "money", ConnectOptions::default()).unwrap();
        let again = sim.connect(a, b, "money", ConnectOptions::default()).unwrap();
        assert_eq!(again, (out, input));

        assert_eq!(sim.output_connector(out).unwrap().endpoints().len(), 1);
        assert_eq!(sim.input_connector(input).unwrap().sources()[0].connector, out);
        assert_eq!(sim.connector_id("A.money.out").unwrap(), out);
        assert_eq!(sim.connector_id("B.money.in").unwrap(), input);
    }

    #[test]
    fn test_unknown_unit_type_rejected() {
        let mut sim = sim();
        let a = entity(&mut sim, "A");
        let b = entity(&mut sim, "B");
        let err = sim.connect(a, b, "widgets", ConnectOptions::default()).unwrap_err();
        assert_eq!(err, KernelError::UnknownUnitType("widgets".to_string()));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut sim = sim();
        let a = entity(&mut sim, "A");
        let b = entity(&mut sim, "B");
        let c = entity(&mut sim, "C");
        sim.connect(a, b, "money", ConnectOptions::default()).unwrap();
        sim.connect(b, c, "staff_hours", ConnectOptions::default()).unwrap();

        let err = sim.connect(c, a, "money", ConnectOptions::default()).unwrap_err();
        assert_eq!(err, KernelError::CycleDetected { from: c, to: a });
        assert!(sim.entity(c).unwrap().output("money").is_none());

        let err = sim.connect(a, a, "money", ConnectOptions::default()).unwrap_err();
        assert!(matches!(err, KernelError::CycleDetected { .. }));
    }

    #[test]
    fn test_disconnect_prunes_idle_connectors() {
        let mut sim = sim();
        let a = entity(&mut sim, "A");
        let b = entity(&mut sim, "B");
        let (out, input) = sim.connect(a, b, "money", ConnectOptions::default()).unwrap();

        sim.disconnect(a, b, "money").unwrap();
        assert!(sim.entity(a).unwrap().output("money").is_none());
        assert!(sim.entity(b).unwrap().input("money").is_none());
        assert!(sim.output_connector(out).is_err());
        assert!(sim.input_connector(input).is_err());
        assert!(sim.entity(b).unwrap().is_source());

        assert_eq!(
            sim.disconnect(a, b, "money"),
            Err(KernelError::NotConnected {
                unit: "money".to_string()
            })
        );
    }

    #[test]
    fn test_bound_port_keeps_connector_alive() {
        let mut sim = sim();
        let a = entity(&mut sim, "A");
        let b = entity(&mut sim, "B");
        sim.attach_process(
            a,
            ProcessSpec::new("constant", "grant").with_port("out", "money"),
        )
        .unwrap();
        let (out, _) = sim.connect(a, b, "money", ConnectOptions::default()).unwrap();

        sim.disconnect(a, b, "money").unwrap();
        assert!(sim.output_connector(out).is_ok());
        assert!(sim.output_connector(out).unwrap().endpoints().is_empty());
    }

    #[test]
    fn test_remove_entity_cascades_to_children_and_links() {
        let mut sim = sim();
        let parent = entity(&mut sim, "Division");
        let child = sim.create_entity("Team", ["core"], Some(parent)).unwrap();
        let grandchild = sim.create_entity("Squad", Vec::<String>::new(), Some(child)).unwrap();
        let other = entity(&mut sim, "Other");
        let (out, _) = sim.connect(other, grandchild, "money", ConnectOptions::default()).unwrap();
        sim.connect(other, parent, "money", ConnectOptions::default()).unwrap();

        assert_eq!(sim.entity(parent).unwrap().children(), &[child]);
        sim.remove_entity_by_name("Team").unwrap();

        assert!(sim.entity(child).is_err());
        assert!(sim.entity(grandchild).is_err());
        assert!(sim.entity(parent).unwrap().children().is_empty());
        assert_eq!(sim.output_connector(out).unwrap().endpoints().len(), 1);
    }

    #[test]
    fn test_attach_validates_ports() {
        let mut sim = sim();
        let a = entity(&mut sim, "A");

        let missing = ProcessSpec::new("relay", "r").with_port("in", "money");
        assert_eq!(
            sim.attach_process(a, missing).unwrap_err(),
            KernelError::MissingPortBinding {
                kind: "relay".to_string(),
                port: "out".to_string()
            }
        );

        let extra = ProcessSpec::new("constant", "c")
            .with_port("out", "money")
            .with_port("sideways", "money");
        assert!(matches!(
            sim.attach_process(a, extra).unwrap_err(),
            KernelError::UnknownPort { .. }
        ));

        let unknown = ProcessSpec::new("teleporter", "t");
        assert_eq!(
            sim.attach_process(a, unknown).unwrap_err(),
            KernelError::UnknownProcessKind("teleporter".to_string())
        );

        // Nothing was half-attached
        assert_eq!(sim.entity(a).unwrap().process_count(), 0);
        assert!(sim.entity(a).unwrap().input("money").is_none());
    }

    #[test]
    fn test_property_override_type_checked() {
        let mut sim = sim();
        let a = entity(&mut sim, "A");
        let spec = ProcessSpec::new("periodic_budget", "funding")
            .with_port("out", "money")
            .with_property("period", 2.5);

        let err = sim.attach_process(a, spec).unwrap_err();
        assert!(matches!(err, KernelError::Property(_)));
    }

    #[test]
    fn test_detach_process_prunes_unlinked_connectors() {
        let mut sim = sim();
        let a = entity(&mut sim, "A");
        let id = sim
            .attach_process(
                a,
                ProcessSpec::new("relay", "r")
                    .with_port("in", "money")
                    .with_port("out", "staff_hours"),
            )
            .unwrap();
        assert!(!sim.entity(a).unwrap().is_source());

        sim.detach_process(id).unwrap();
        assert!(sim.entity(a).unwrap().is_source());
        assert!(sim.entity(a).unwrap().output("staff_hours").is_none());
        assert!(matches!(
            sim.detach_process(id),
            Err(KernelError::ProcessNotFound(_))
        ));
    }

    #[test]
    fn test_set_bias_on_unknown_endpoint() {
        let mut sim = sim();
        let a = entity(&mut sim, "A");
        let b = entity(&mut sim, "B");
        let (out, _) = sim.connect(a, b, "money", ConnectOptions::default()).unwrap();

        let stranger = ConnectorId::new();
        assert!(matches!(
            sim.set_bias(out, stranger, 0.5),
            Err(KernelError::EndpointNotFound { .. })
        ));
        assert!(matches!(
            sim.set_biases(stranger, &[1.0]),
            Err(KernelError::ConnectorNotFound(_))
        ));
    }
}
