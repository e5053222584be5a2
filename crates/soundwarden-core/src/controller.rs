//! Port/Profile Controller: port activation and the profile search.

use tracing::{debug, info, warn};

use crate::device::{CardInfo, CardPort, Direction, common_profiles, is_a2dp_sink_profile};
use crate::engine::AudioEngine;
use crate::error::{Error, Result};
use crate::store::PortKey;

/// Pick the profile to switch `card` to so that `port` becomes usable.
///
/// Output ports listing an A2DP sink profile always get it, whatever its
/// availability flag says. Otherwise the first profile shared with the
/// opposite-direction active port wins, then the first card profile exposing
/// the port.
///
/// # Errors
/// [`Error::ProfileNotFound`] if no profile exposes the port.
pub fn choose_profile(
    card: &CardInfo,
    port: &CardPort,
    opposite: Option<&CardPort>,
    direction: Direction,
) -> Result<String> {
    if direction == Direction::Sink
        && let Some(a2dp) = port.profiles.iter().find(|p| is_a2dp_sink_profile(p))
    {
        return Ok(a2dp.clone());
    }

    if let Some(common) = common_profiles(port, opposite).first() {
        return Ok((*common).to_string());
    }

    card.first_profile_for_port(port)
        .map(|p| p.name.clone())
        .ok_or_else(|| Error::ProfileNotFound { card: card.index, port: port.name.clone() })
}

impl AudioEngine {
    /// Make (card, port) the active port and its endpoint the default,
    /// switching the card profile if needed.
    ///
    /// # Errors
    /// [`Error::PolicyRejected`] without any backend call if the port is
    /// disabled; not-found errors for unknown cards, ports, profiles or
    /// endpoints; backend errors for rejected commands.
    pub(crate) fn switch_port(&self, card: u32, port: &str, direction: Direction) -> Result<()> {
        let _switch = self.switch_lock.lock();

        let card_info = self.graph.lock().cards.get(&card).cloned().ok_or(Error::CardNotFound(card))?;
        let target = card_info.port(port, direction).cloned().ok_or_else(|| Error::PortNotFound {
            card,
            port: port.to_string(),
            direction,
        })?;

        if !self.keeper.is_port_enabled(&card_info.name, port) {
            warn!(card, port, %direction, "Refusing to switch to disabled port");
            return Err(Error::PolicyRejected { card, port: port.to_string() });
        }

        let active_profile = card_info.active_profile_name().to_string();
        if target.usable_under(&active_profile) {
            debug!(card, port, %direction, profile = %active_profile, "No profile change needed");
        } else {
            let opposite = self.opposite_active_port(&card_info, direction);
            let profile = choose_profile(&card_info, &target, opposite.as_ref(), direction)?;
            debug!(
                card,
                port,
                %direction,
                opposite = opposite.as_ref().map(|p| p.name.as_str()),
                from = %active_profile,
                to = %profile,
                "Switching card profile"
            );
            self.apply_profile(card, &profile)?;
        }

        self.activate(card, port, direction)?;

        let key = PortKey::new(&card_info.name, port);
        if let Err(e) = self.store.save_last_selected(direction, &key) {
            warn!(card, port, %direction, error = %e, "Failed to persist last selected port");
        }
        info!(card, port, %direction, "Port activated");
        Ok(())
    }

    /// The card port serving the opposite direction's default, if it lives
    /// on the same card.
    fn opposite_active_port(&self, card: &CardInfo, direction: Direction) -> Option<CardPort> {
        let graph = self.graph.lock();
        let opposite = graph.default_endpoint(direction.opposite())?;
        if opposite.info.card != Some(card.index) {
            return None;
        }
        card.port(opposite.info.active_port.as_deref()?, direction.opposite()).cloned()
    }

    /// Set a card profile. The mirror keeps the new profile even if the
    /// backend rejects it; the next card event corrects it.
    pub(crate) fn apply_profile(&self, card: u32, profile: &str) -> Result<()> {
        if let Some(c) = self.graph.lock().cards.get_mut(&card) {
            c.active_profile = Some(profile.to_string());
        }
        self.backend.set_card_profile(card, profile).inspect_err(|e| {
            warn!(card, profile, error = %e, "Backend rejected profile switch");
        })?;
        self.refresh_cards();
        self.refresh_endpoints(Direction::Sink);
        self.refresh_endpoints(Direction::Source);
        Ok(())
    }

    /// Activate `port` on the card's live endpoint and make it the default.
    fn activate(&self, card: u32, port: &str, direction: Direction) -> Result<()> {
        let endpoint = self
            .backend
            .endpoints(direction)?
            .into_iter()
            .find(|e| e.card == Some(card) && e.has_port(port))
            .ok_or_else(|| Error::EndpointNotFound { card, port: port.to_string(), direction })?;

        if endpoint.active_port_name() != port {
            debug!(card, port, %direction, index = endpoint.index, "Setting active port");
            self.backend.set_port(direction, endpoint.index, port)?;
            self.sync_endpoint(direction, endpoint.index);
        }

        let server = self.backend.server_info()?;
        if server.default_name(direction) != endpoint.name {
            debug!(%direction, name = %endpoint.name, "Setting default endpoint");
            self.backend.set_default(direction, &endpoint.name)?;
        }
        self.resolve_default(direction)
    }

    /// Re-read one endpoint from the backend into the mirror.
    pub(crate) fn sync_endpoint(&self, direction: Direction, index: u32) {
        match self.backend.endpoint_by_index(direction, index) {
            Ok(Some(info)) => {
                if let Err(e) = self.update_endpoint(info) {
                    warn!(%direction, index, error = %e, "Failed to update endpoint");
                }
            }
            Ok(None) => self.remove_endpoint(direction, index),
            Err(e) => warn!(%direction, index, error = %e, "Failed to fetch endpoint"),
        }
    }
}
