//! Auto-recovery of unavailable active ports and priority-based auto switch.

use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use crate::device::{Availability, CardPort, Direction, EndpointPort};
use crate::engine::AudioEngine;
use crate::priority::PortType;
use crate::store::PortKey;

/// Best port of an endpoint: `yes` before `unknown`, then highest priority,
/// first seen on ties. Ports reported `no` are never chosen.
#[must_use]
pub fn best_port(ports: &[EndpointPort]) -> Option<&EndpointPort> {
    let rank = |p: &EndpointPort| match p.availability {
        Availability::Yes => 1,
        _ => 0,
    };
    let mut best: Option<&EndpointPort> = None;
    for port in ports.iter().filter(|p| p.availability != Availability::No) {
        best = match best {
            Some(b) if (rank(port), port.priority) <= (rank(b), b.priority) => Some(b),
            _ => Some(port),
        };
    }
    best
}

struct Candidate {
    card: u32,
    card_name: String,
    port: CardPort,
    port_type: PortType,
}

impl AudioEngine {
    /// Move every sink off an active port that reports `no` availability,
    /// onto its best port that policy has not disabled.
    pub fn fix_active_port_not_available(&self) {
        let _switch = self.switch_lock.lock();
        let stale: Vec<(u32, Option<String>, String, Vec<EndpointPort>)> = {
            let graph = self.graph.lock();
            graph
                .sinks
                .values()
                .filter_map(|m| {
                    let active = m.info.active_port()?;
                    if active.availability != Availability::No {
                        return None;
                    }
                    let card = m.info.card.and_then(|c| graph.card_name(c)).map(str::to_string);
                    Some((m.info.index, card, active.name.clone(), m.info.ports.clone()))
                })
                .collect()
        };

        for (index, card, from, ports) in stale {
            let enabled: Vec<EndpointPort> = ports
                .into_iter()
                .filter(|p| card.as_deref().is_none_or(|c| self.keeper.is_port_enabled(c, &p.name)))
                .collect();
            let Some(to) = best_port(&enabled).map(|p| p.name.clone()) else {
                debug!(index, from, "No enabled port to recover to");
                continue;
            };
            if to == from {
                continue;
            }

            info!(index, from, to, "Active port not available, switching");
            if let Err(e) = self.backend.set_port(Direction::Sink, index, &to) {
                warn!(index, port = %to, error = %e, "Failed to switch away from unavailable port");
                continue;
            }
            self.sync_endpoint(Direction::Sink, index);
            if let Some(card) = card
                && let Err(e) = self.store.save_last_selected(Direction::Sink, &PortKey::new(card, &to))
            {
                warn!(index, port = %to, error = %e, "Failed to persist last selected port");
            }
        }
    }

    /// Switch `direction` to the preferred eligible port, if not already there.
    ///
    /// Only ports usable under their card's current profile are considered,
    /// so this never changes a profile.
    pub fn auto_switch_port(&self, direction: Direction) {
        if !self.auto_switch {
            return;
        }
        let _switch = self.switch_lock.lock();

        let candidates: Vec<Candidate> = {
            let graph = self.graph.lock();
            graph
                .cards
                .values()
                .flat_map(|card| {
                    let profile = card.active_profile_name();
                    card.ports
                        .iter()
                        .filter(move |p| {
                            p.direction == direction
                                && p.availability != Availability::No
                                && p.usable_under(profile)
                        })
                        .map(move |p| Candidate {
                            card: card.index,
                            card_name: card.name.clone(),
                            port: p.clone(),
                            port_type: PortType::classify(card, p),
                        })
                })
                .collect()
        };
        let candidates: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| self.keeper.is_port_enabled(&c.card_name, &c.port.name))
            .collect();

        let mut types: Vec<PortType> = Vec::new();
        for c in &candidates {
            if !types.contains(&c.port_type) {
                types.push(c.port_type);
            }
        }
        let Some(port_type) = self.priorities.first_eligible_port_type(direction, &types) else {
            debug!(%direction, "No eligible port for auto switch");
            return;
        };

        let last = self.store.last_selected(direction).unwrap_or_else(|e| {
            warn!(%direction, error = %e, "Failed to read last selected port");
            None
        });
        let pool: Vec<&Candidate> = candidates.iter().filter(|c| c.port_type == port_type).collect();
        let chosen = pool
            .iter()
            .find(|c| last.as_ref().is_some_and(|l| l.card == c.card_name && l.port == c.port.name))
            .or_else(|| {
                pool.iter().fold(None, |best: Option<&&Candidate>, c| match best {
                    Some(b) if c.port.priority <= b.port.priority => Some(b),
                    _ => Some(c),
                })
            });
        let Some(chosen) = chosen else {
            return;
        };

        let already = {
            let graph = self.graph.lock();
            graph.default_endpoint(direction).is_some_and(|d| {
                d.info.card == Some(chosen.card) && d.info.active_port.as_deref() == Some(chosen.port.name.as_str())
            })
        };
        if already {
            return;
        }

        info!(%direction, card = chosen.card, port = %chosen.port.name, %port_type, "Auto switching port");
        match self.switch_port(chosen.card, &chosen.port.name, direction) {
            Ok(()) => {
                self.switch_counter(direction).fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(%direction, card = chosen.card, port = %chosen.port.name, error = %e, "Auto switch failed"),
        }
    }
}
