//! Deployable platform units exposing backup and restore.

pub mod elastic_runtime;
pub mod opsmanager;

use crate::Result;

pub use elastic_runtime::ElasticRuntime;
pub use opsmanager::OpsManager;

pub trait Tile {
    fn name(&self) -> &str;

    fn backup(&mut self) -> Result<()>;

    fn restore(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileAction {
    Backup,
    Restore,
}

impl TileAction {
    pub fn apply(self, tile: &mut dyn Tile) -> Result<()> {
        match self {
            TileAction::Backup => tile.backup(),
            TileAction::Restore => tile.restore(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TileAction::Backup => "backup",
            TileAction::Restore => "restore",
        }
    }
}

impl std::fmt::Display for TileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
