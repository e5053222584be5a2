//! Device Graph Mirror: index-keyed reconciliation against backend
//! snapshots, default endpoint resolution and per-port policy resumption.

use tracing::{debug, info, warn};

use crate::device::{Availability, CardInfo, Direction, EndpointInfo, EndpointKind, SinkInputInfo};
use crate::engine::AudioEngine;
use crate::error::{Error, Result};
use crate::graph::{MirroredEndpoint, plan};
use crate::properties::{
    CardSummary, ExportedEndpoint, ExportedObject, ExportedSinkInput, NO_OBJECT, PortSummary, endpoint_path,
    sink_input_path,
};

/// Volume and balance drift below this is not recorded.
const VOLUME_EPSILON: f64 = 0.001;

fn exported_endpoint(m: &MirroredEndpoint) -> ExportedObject {
    ExportedObject::Endpoint(ExportedEndpoint {
        path: m.path.clone(),
        index: m.info.index,
        name: m.info.name.clone(),
        description: m.info.description.clone(),
        direction: m.info.direction,
        card: m.info.card,
        kind: m.kind.clone(),
        ports: m.info.ports.clone(),
        active_port: m.info.active_port.clone(),
        volume: m.info.volume.avg(),
        balance: m.info.volume.balance(),
        fade: m.info.volume.fade(),
        mute: m.info.mute,
    })
}

fn exported_sink_input(info: &SinkInputInfo) -> ExportedObject {
    ExportedObject::SinkInput(ExportedSinkInput {
        path: sink_input_path(info.index),
        index: info.index,
        name: info.name.clone(),
        sink: endpoint_path(Direction::Sink, info.sink),
    })
}

impl AudioEngine {
    /// Pull full snapshots and reconcile every collection, then the defaults.
    pub fn refresh(&self) {
        self.refresh_cards();
        self.refresh_endpoints(Direction::Sink);
        self.refresh_endpoints(Direction::Source);
        self.refresh_sink_inputs();
        self.refresh_defaults();
    }

    pub(crate) fn refresh_cards(&self) {
        let snapshot = match self.backend.cards() {
            Ok(cards) => cards,
            Err(e) => {
                warn!(error = %e, "Failed to list cards");
                return;
            }
        };

        let appeared: Vec<CardInfo> = {
            let mut graph = self.graph.lock();
            let plan = plan(&graph.cards, snapshot, |c| c.index);
            for index in &plan.removed {
                debug!(card = index, "Card removed");
                graph.cards.remove(index);
            }
            for card in plan.updated {
                graph.cards.insert(card.index, card);
            }
            for card in &plan.added {
                debug!(card = card.index, name = %card.name, "Card added");
                graph.cards.insert(card.index, card.clone());
            }
            plan.added
        };

        self.publish_cards();
        for card in appeared.iter().filter(|c| c.is_bluetooth()) {
            self.restore_bluetooth_mode(card);
        }
    }

    /// Rebuild the exported card summaries.
    pub(crate) fn publish_cards(&self) {
        let cards: Vec<CardInfo> = self.graph.lock().cards.values().cloned().collect();
        let summaries: Vec<CardSummary> = cards
            .iter()
            .map(|card| CardSummary {
                id: card.index,
                name: card.name.clone(),
                active_profile: card.active_profile_name().to_string(),
                ports: card
                    .ports
                    .iter()
                    .map(|p| PortSummary {
                        name: p.name.clone(),
                        description: p.description.clone(),
                        direction: p.direction,
                        enabled: self.keeper.is_port_enabled(&card.name, &p.name),
                        availability: p.availability,
                        priority: p.priority,
                        bluetooth: card.is_bluetooth(),
                    })
                    .collect(),
            })
            .collect();
        let available = summaries
            .iter()
            .map(|c| CardSummary {
                ports: c.ports.iter().filter(|p| p.availability != Availability::No).cloned().collect(),
                ..c.clone()
            })
            .collect();
        self.props.set_cards(summaries, available);
    }

    pub(crate) fn refresh_endpoints(&self, direction: Direction) {
        let snapshot = match self.backend.endpoints(direction) {
            Ok(list) => list,
            Err(e) => {
                warn!(%direction, error = %e, "Failed to list endpoints");
                return;
            }
        };
        let plan = plan(self.graph.lock().endpoints(direction), snapshot, |e| e.index);

        for index in plan.removed {
            self.remove_endpoint(direction, index);
        }
        for info in plan.updated {
            let index = info.index;
            if let Err(e) = self.update_endpoint(info) {
                warn!(%direction, index, error = %e, "Failed to update endpoint");
            }
        }
        for info in plan.added {
            let index = info.index;
            if let Err(e) = self.add_endpoint(info) {
                warn!(%direction, index, error = %e, "Failed to add endpoint");
            }
        }
    }

    /// Mirror and export a new endpoint.
    pub(crate) fn add_endpoint(&self, info: EndpointInfo) -> Result<()> {
        let mirrored = MirroredEndpoint::new(info);
        let direction = mirrored.info.direction;
        let index = mirrored.info.index;
        let resume = mirrored.kind == EndpointKind::Physical
            && mirrored.info.card.is_some()
            && mirrored.info.active_port.is_some();
        debug!(%direction, index, name = %mirrored.info.name, kind = ?mirrored.kind, "Endpoint added");

        let object = exported_endpoint(&mirrored);
        self.graph.lock().endpoints_mut(direction).insert(index, mirrored);
        self.props.export(object)?;

        if resume {
            self.resume_config(direction, index);
        }
        Ok(())
    }

    /// Copy mutable fields onto a mirrored endpoint and track policy.
    pub(crate) fn update_endpoint(&self, info: EndpointInfo) -> Result<()> {
        let direction = info.direction;
        let index = info.index;

        let (old_port, updated, card_name) = {
            let mut graph = self.graph.lock();
            let Some(entry) = graph.endpoints_mut(direction).get_mut(&index) else {
                drop(graph);
                return self.add_endpoint(info);
            };
            let old_port = std::mem::replace(&mut entry.info, info).active_port;
            let updated = entry.clone();
            let card_name = updated.info.card.and_then(|c| graph.card_name(c)).map(str::to_string);
            (old_port, updated, card_name)
        };
        self.props.update_object(exported_endpoint(&updated));

        if updated.kind != EndpointKind::Physical {
            return Ok(());
        }
        let (Some(card), Some(port)) = (card_name, updated.info.active_port.as_deref()) else {
            return Ok(());
        };
        if old_port.as_deref() != Some(port) {
            debug!(%direction, index, port, "Active port changed, resuming its policy");
            self.resume_config(direction, index);
            return Ok(());
        }

        let config = self.keeper.port_config(&card, port, direction);
        let volume = updated.info.volume.avg();
        let balance = updated.info.volume.balance();
        if (config.volume - volume).abs() > VOLUME_EPSILON {
            debug!(%direction, card, port, volume, "Recording volume");
            self.keeper.set_volume(&card, port, direction, volume)?;
        }
        if (config.balance - balance).abs() > VOLUME_EPSILON {
            debug!(%direction, card, port, balance, "Recording balance");
            self.keeper.set_balance(&card, port, direction, balance)?;
        }
        Ok(())
    }

    pub(crate) fn remove_endpoint(&self, direction: Direction, index: u32) {
        let Some(removed) = self.graph.lock().remove_endpoint(direction, index) else {
            return;
        };
        debug!(%direction, index, name = %removed.info.name, "Endpoint removed");
        self.props.unexport(&removed.path);
        if self.props.load().default_path(direction) == removed.path {
            self.props.set_default(direction, NO_OBJECT);
        }
    }

    pub(crate) fn refresh_sink_inputs(&self) {
        let snapshot = match self.backend.sink_inputs() {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Failed to list sink inputs");
                return;
            }
        };
        let plan = plan(&self.graph.lock().sink_inputs, snapshot, |s| s.index);
        for index in plan.removed {
            self.remove_sink_input(index);
        }
        for info in plan.updated.into_iter().chain(plan.added) {
            self.upsert_sink_input(info);
        }
    }

    pub(crate) fn upsert_sink_input(&self, info: SinkInputInfo) {
        let object = exported_sink_input(&info);
        let added = self.graph.lock().sink_inputs.insert(info.index, info).is_none();
        if added {
            if let Err(e) = self.props.export(object) {
                warn!(error = %e, "Failed to export sink input");
            }
        } else {
            self.props.update_object(object);
        }
    }

    pub(crate) fn remove_sink_input(&self, index: u32) {
        if self.graph.lock().sink_inputs.remove(&index).is_some() {
            self.props.unexport(&sink_input_path(index));
        }
    }

    pub(crate) fn refresh_defaults(&self) {
        for direction in [Direction::Sink, Direction::Source] {
            if let Err(e) = self.resolve_default(direction) {
                warn!(%direction, error = %e, "Failed to resolve default endpoint");
            }
        }
    }

    /// Bring the default pointer in line with the backend's default name.
    pub(crate) fn resolve_default(&self, direction: Direction) -> Result<()> {
        let server = self.backend.server_info()?;
        let reported = server.default_name(direction).to_string();
        {
            let graph = self.graph.lock();
            if graph.reported_default(direction) == reported
                && (reported.is_empty() || graph.default_endpoint(direction).is_some())
            {
                return Ok(());
            }
        }

        if reported.is_empty() {
            self.clear_default(direction);
            return Ok(());
        }
        let Some(info) = self.backend.endpoint_by_name(direction, &reported)? else {
            warn!(%direction, name = %reported, "Backend default not found");
            self.clear_default(direction);
            return Ok(());
        };

        let target = match EndpointKind::classify(&info) {
            EndpointKind::Monitor => {
                debug!(%direction, name = %reported, "Ignoring monitor as default");
                return Ok(());
            }
            EndpointKind::VirtualMaster { master } => {
                if direction == Direction::Sink {
                    self.move_sink_inputs_to(info.index);
                }
                match self.backend.endpoint_by_name(direction, &master)? {
                    Some(m) => m,
                    None => {
                        warn!(%direction, name = %reported, master, "Master device not found, using virtual device");
                        info
                    }
                }
            }
            EndpointKind::Physical => {
                if direction == Direction::Sink {
                    self.move_sink_inputs_to(info.index);
                }
                info
            }
        };

        let index = target.index;
        if self.graph.lock().endpoint(direction, index).is_none() {
            debug!(%direction, index, "Default not mirrored yet, fetching on demand");
            if let Err(e) = self.add_endpoint(target) {
                warn!(%direction, index, error = %e, "Failed to add default endpoint");
            }
        }

        let path = {
            let mut graph = self.graph.lock();
            if !graph.set_default(direction, Some(index), &reported) {
                return Err(Error::EndpointNotFound { card: 0, port: reported, direction });
            }
            endpoint_path(direction, index)
        };
        info!(%direction, index, name = %reported, "Default endpoint changed");
        self.props.set_default(direction, &path);
        self.resume_config(direction, index);
        if direction == Direction::Sink {
            self.refresh_bluetooth();
        }
        Ok(())
    }

    fn clear_default(&self, direction: Direction) {
        self.graph.lock().set_default(direction, None, "");
        if self.props.set_default(direction, NO_OBJECT) {
            info!(%direction, "No default endpoint");
        }
    }

    /// Move every mirrored stream not on `sink` onto it.
    pub(crate) fn move_sink_inputs_to(&self, sink: u32) {
        let inputs: Vec<u32> =
            self.graph.lock().sink_inputs.values().filter(|s| s.sink != sink).map(|s| s.index).collect();
        if inputs.is_empty() {
            return;
        }
        debug!(sink, count = inputs.len(), "Moving sink inputs");
        if let Err(e) = self.backend.move_sink_inputs(&inputs, sink) {
            warn!(sink, error = %e, "Failed to move sink inputs");
        }
    }

    pub(crate) fn move_sink_inputs_to_default(&self) {
        let default = self.graph.lock().default_index(Direction::Sink);
        if let Some(sink) = default {
            self.move_sink_inputs_to(sink);
        }
    }

    pub(crate) fn resume_default_config(&self, direction: Direction) {
        let default = self.graph.lock().default_index(direction);
        if let Some(index) = default {
            self.resume_config(direction, index);
        }
    }

    /// Apply the persisted policy of the endpoint's active port.
    pub(crate) fn resume_config(&self, direction: Direction, index: u32) {
        let (info, card, is_default) = {
            let graph = self.graph.lock();
            let Some(entry) = graph.endpoint(direction, index) else {
                return;
            };
            if entry.kind != EndpointKind::Physical {
                return;
            }
            let Some(card) = entry.info.card.and_then(|c| graph.card_name(c)) else {
                return;
            };
            (entry.info.clone(), card.to_string(), graph.default_index(direction) == Some(index))
        };
        let Some(port) = info.active_port.as_deref() else {
            return;
        };

        let config = self.keeper.port_config(&card, port, direction);
        debug!(%direction, index, card, port, volume = config.volume, enabled = config.enabled, "Resuming port policy");

        let volume = info.volume.with_avg(config.volume).with_balance(config.balance).with_fade(0.0);
        if volume.to_raw() != info.volume.to_raw()
            && let Err(e) = self.backend.set_volume(direction, index, &volume)
        {
            warn!(%direction, index, error = %e, "Failed to apply volume");
        }

        let mute = self.keeper.mute(direction) || !config.enabled;
        if mute != info.mute
            && let Err(e) = self.backend.set_mute(direction, index, mute)
        {
            warn!(%direction, index, error = %e, "Failed to apply mute");
        }

        if is_default {
            match direction {
                Direction::Sink => self.props.set_flags(Some(config.increase_volume), None),
                Direction::Source => self.props.set_flags(None, Some(config.reduce_noise)),
            };
        }
    }
}
