//! SoundWarden Database - SQLite persistence for routing policy.
//!
//! Stores per-port configuration, global mute toggles, port type
//! priorities, bluetooth audio modes and last selected ports. All keys are
//! stable card and port names.

pub mod error;
pub mod migrations;
pub mod queries;
pub mod schema;

pub use error::{DbError, DbResult};

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, info};

use soundwarden_core::{Direction, MuteConfig, PolicyStore, PortConfig, PortKey, PortType};

/// Database handle for SoundWarden.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the database at the default location.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open() -> DbResult<Self> {
        Self::open_at(&Self::default_path()?)
    }

    /// Open or create the database at `path`, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_at(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Opening policy database");
        let mut conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        migrations::run(&mut conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> DbResult<Self> {
        debug!("Opening in-memory policy database");
        let mut conn = Connection::open_in_memory()?;
        migrations::run(&mut conn)?;
        Ok(Self { conn })
    }

    /// `$XDG_DATA_HOME/soundwarden/soundwarden.db` or the platform equivalent.
    ///
    /// # Errors
    /// Returns [`DbError::NoDataDir`] when no home directory is known.
    pub fn default_path() -> DbResult<PathBuf> {
        let dirs = ProjectDirs::from("org", "soundwarden", "SoundWarden").ok_or(DbError::NoDataDir)?;
        Ok(dirs.data_dir().join("soundwarden.db"))
    }

    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// A [`Database`] shared between threads, usable as the engine's
/// [`PolicyStore`].
pub struct SharedDatabase {
    db: Mutex<Database>,
}

impl SharedDatabase {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }
}

impl PolicyStore for SharedDatabase {
    fn port_config(&self, key: &PortKey) -> soundwarden_core::Result<Option<PortConfig>> {
        Ok(self.db.lock().load_port_config(key)?)
    }

    fn save_port_config(&self, key: &PortKey, config: &PortConfig) -> soundwarden_core::Result<()> {
        Ok(self.db.lock().store_port_config(key, config)?)
    }

    fn port_configs(&self) -> soundwarden_core::Result<Vec<(PortKey, PortConfig)>> {
        Ok(self.db.lock().load_port_configs()?)
    }

    fn mute_config(&self) -> soundwarden_core::Result<MuteConfig> {
        Ok(self.db.lock().load_mute_config()?)
    }

    fn save_mute_config(&self, config: &MuteConfig) -> soundwarden_core::Result<()> {
        Ok(self.db.lock().store_mute_config(config)?)
    }

    fn priorities(&self, direction: Direction) -> soundwarden_core::Result<Option<Vec<PortType>>> {
        Ok(self.db.lock().load_priorities(direction)?)
    }

    fn save_priorities(&self, direction: Direction, order: &[PortType]) -> soundwarden_core::Result<()> {
        Ok(self.db.lock().store_priorities(direction, order)?)
    }

    fn bluetooth_mode(&self, card: &str) -> soundwarden_core::Result<Option<String>> {
        Ok(self.db.lock().load_bluetooth_mode(card)?)
    }

    fn save_bluetooth_mode(&self, card: &str, mode: &str) -> soundwarden_core::Result<()> {
        Ok(self.db.lock().store_bluetooth_mode(card, mode)?)
    }

    fn last_selected(&self, direction: Direction) -> soundwarden_core::Result<Option<PortKey>> {
        Ok(self.db.lock().load_last_selected(direction)?)
    }

    fn save_last_selected(&self, direction: Direction, key: &PortKey) -> soundwarden_core::Result<()> {
        Ok(self.db.lock().store_last_selected(direction, key)?)
    }
}
