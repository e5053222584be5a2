//! Database schema definition.

/// Initial schema (version 1).
pub const SCHEMA_V1: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Per card/port policy, keyed by stable names
CREATE TABLE IF NOT EXISTS port_configs (
    card_name TEXT NOT NULL,
    port_name TEXT NOT NULL,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    volume REAL NOT NULL,
    balance REAL NOT NULL DEFAULT 0.0,
    increase_volume BOOLEAN NOT NULL DEFAULT FALSE,
    reduce_noise BOOLEAN NOT NULL DEFAULT FALSE,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (card_name, port_name)
);

-- Global mute toggles (single row)
CREATE TABLE IF NOT EXISTS mute_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    mute_output BOOLEAN NOT NULL DEFAULT FALSE,
    mute_input BOOLEAN NOT NULL DEFAULT FALSE
);

-- Port type preference order per direction
CREATE TABLE IF NOT EXISTS port_priorities (
    direction TEXT NOT NULL CHECK (direction IN ('sink', 'source')),
    position INTEGER NOT NULL,
    port_type TEXT NOT NULL,
    PRIMARY KEY (direction, position)
);

-- Bluetooth audio mode per card
CREATE TABLE IF NOT EXISTS bluetooth_modes (
    card_name TEXT PRIMARY KEY,
    mode TEXT NOT NULL
);

-- Port last chosen per direction
CREATE TABLE IF NOT EXISTS last_selected_ports (
    direction TEXT PRIMARY KEY CHECK (direction IN ('sink', 'source')),
    card_name TEXT NOT NULL,
    port_name TEXT NOT NULL
);
";

/// Default data to insert after schema creation.
pub const DEFAULT_DATA: &str = r"
INSERT OR IGNORE INTO mute_settings (id, mute_output, mute_input) VALUES (1, FALSE, FALSE);
";
