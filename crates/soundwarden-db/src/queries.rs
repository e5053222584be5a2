//! Database query functions.

use rusqlite::{OptionalExtension, params};

use soundwarden_core::{Direction, MuteConfig, PortConfig, PortKey, PortType};

use crate::{Database, DbError, DbResult};

fn direction_token(direction: Direction) -> &'static str {
    match direction {
        Direction::Sink => "sink",
        Direction::Source => "source",
    }
}

fn port_config_from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<PortConfig> {
    Ok(PortConfig {
        enabled: row.get(offset)?,
        volume: row.get(offset + 1)?,
        balance: row.get(offset + 2)?,
        increase_volume: row.get(offset + 3)?,
        reduce_noise: row.get(offset + 4)?,
    })
}

impl Database {
    /// Load the record for one (card, port) pair.
    pub fn load_port_config(&self, key: &PortKey) -> DbResult<Option<PortConfig>> {
        let config = self
            .conn
            .query_row(
                r"SELECT enabled, volume, balance, increase_volume, reduce_noise
                  FROM port_configs WHERE card_name = ? AND port_name = ?",
                params![key.card, key.port],
                |row| port_config_from_row(row, 0),
            )
            .optional()?;
        Ok(config)
    }

    /// Insert or replace the record for one (card, port) pair.
    pub fn store_port_config(&self, key: &PortKey, config: &PortConfig) -> DbResult<()> {
        self.conn.execute(
            r"INSERT INTO port_configs
                (card_name, port_name, enabled, volume, balance, increase_volume, reduce_noise, updated_at)
              VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))
              ON CONFLICT(card_name, port_name) DO UPDATE SET
                enabled = excluded.enabled,
                volume = excluded.volume,
                balance = excluded.balance,
                increase_volume = excluded.increase_volume,
                reduce_noise = excluded.reduce_noise,
                updated_at = excluded.updated_at",
            params![
                key.card,
                key.port,
                config.enabled,
                config.volume,
                config.balance,
                config.increase_volume,
                config.reduce_noise,
            ],
        )?;
        Ok(())
    }

    /// Every stored port record, ordered by card then port.
    pub fn load_port_configs(&self) -> DbResult<Vec<(PortKey, PortConfig)>> {
        let mut stmt = self.conn.prepare(
            r"SELECT card_name, port_name, enabled, volume, balance, increase_volume, reduce_noise
              FROM port_configs
              ORDER BY card_name, port_name",
        )?;
        let configs = stmt
            .query_map([], |row| {
                let key = PortKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
                Ok((key, port_config_from_row(row, 2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(configs)
    }

    pub fn load_mute_config(&self) -> DbResult<MuteConfig> {
        let config = self
            .conn
            .query_row("SELECT mute_output, mute_input FROM mute_settings WHERE id = 1", [], |row| {
                Ok(MuteConfig { mute_output: row.get(0)?, mute_input: row.get(1)? })
            })
            .optional()?;
        Ok(config.unwrap_or_default())
    }

    pub fn store_mute_config(&self, config: &MuteConfig) -> DbResult<()> {
        self.conn.execute(
            r"INSERT INTO mute_settings (id, mute_output, mute_input) VALUES (1, ?, ?)
              ON CONFLICT(id) DO UPDATE SET mute_output = excluded.mute_output, mute_input = excluded.mute_input",
            params![config.mute_output, config.mute_input],
        )?;
        Ok(())
    }

    /// Stored port type order for `direction`, `None` if never saved.
    pub fn load_priorities(&self, direction: Direction) -> DbResult<Option<Vec<PortType>>> {
        let mut stmt =
            self.conn.prepare("SELECT port_type FROM port_priorities WHERE direction = ? ORDER BY position")?;
        let names = stmt
            .query_map([direction_token(direction)], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if names.is_empty() {
            return Ok(None);
        }
        let order = names
            .iter()
            .map(|name| name.parse().map_err(|_| DbError::InvalidValue(format!("port type {name:?}"))))
            .collect::<DbResult<Vec<PortType>>>()?;
        Ok(Some(order))
    }

    /// Replace the stored order for `direction`.
    pub fn store_priorities(&mut self, direction: Direction, order: &[PortType]) -> DbResult<()> {
        let token = direction_token(direction);
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM port_priorities WHERE direction = ?", [token])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO port_priorities (direction, position, port_type) VALUES (?, ?, ?)")?;
            for (position, port_type) in order.iter().enumerate() {
                stmt.execute(params![token, position, port_type.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_bluetooth_mode(&self, card: &str) -> DbResult<Option<String>> {
        let mode = self
            .conn
            .query_row("SELECT mode FROM bluetooth_modes WHERE card_name = ?", [card], |row| row.get(0))
            .optional()?;
        Ok(mode)
    }

    pub fn store_bluetooth_mode(&self, card: &str, mode: &str) -> DbResult<()> {
        self.conn.execute(
            r"INSERT INTO bluetooth_modes (card_name, mode) VALUES (?, ?)
              ON CONFLICT(card_name) DO UPDATE SET mode = excluded.mode",
            params![card, mode],
        )?;
        Ok(())
    }

    pub fn load_last_selected(&self, direction: Direction) -> DbResult<Option<PortKey>> {
        let key = self
            .conn
            .query_row(
                "SELECT card_name, port_name FROM last_selected_ports WHERE direction = ?",
                [direction_token(direction)],
                |row| Ok(PortKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(key)
    }

    pub fn store_last_selected(&self, direction: Direction, key: &PortKey) -> DbResult<()> {
        self.conn.execute(
            r"INSERT INTO last_selected_ports (direction, card_name, port_name) VALUES (?, ?, ?)
              ON CONFLICT(direction) DO UPDATE SET card_name = excluded.card_name, port_name = excluded.port_name",
            params![direction_token(direction), key.card, key.port],
        )?;
        Ok(())
    }
}
