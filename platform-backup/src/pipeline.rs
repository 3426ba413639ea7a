//! Sequential, fail-fast execution of tile actions.

use crate::config::{ConnectionBucket, PipelineConfig};
use crate::persistence::SshAdapterFactory;
use crate::tile::opsmanager::installation_settings_path;
use crate::tile::{ElasticRuntime, OpsManager, Tile, TileAction};
use crate::transport::{HttpGateway, ReqwestGateway};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;

/// Run `action` on each tile in order. The first failure is returned and
/// later tiles are not invoked.
pub fn run_pipeline(action: TileAction, tiles: &mut [Box<dyn Tile>]) -> Result<()> {
    for tile in tiles.iter_mut() {
        let start = Instant::now();
        tracing::info!(tile = tile.name(), action = %action, "Starting tile");

        if let Err(e) = action.apply(&mut **tile) {
            tracing::error!(tile = tile.name(), action = %action, error = %e, "Tile failed");
            return Err(e);
        }

        tracing::info!(
            tile = tile.name(),
            action = %action,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tile finished"
        );
    }
    Ok(())
}

/// Ops Manager first: the runtime tile reads the installation settings it exports.
pub fn full_tile_list(conn: &ConnectionBucket, config: &PipelineConfig) -> Result<Vec<Box<dyn Tile>>> {
    let config = config.clone().pinned();
    let gateway: Arc<dyn HttpGateway> = Arc::new(ReqwestGateway::new(config.accept_invalid_certs)?);

    let opsmanager = OpsManager::connect(conn, &config, gateway.clone())?;
    let runtime = ElasticRuntime::new(
        installation_settings_path(conn.destination()),
        conn.destination(),
        gateway,
        Box::new(SshAdapterFactory::new(config.tool_paths(), config.ssh_port)),
        config,
    );

    let tiles: Vec<Box<dyn Tile>> = vec![Box::new(opsmanager), Box::new(runtime)];
    Ok(tiles)
}

pub fn run_backup_pipeline(conn: &ConnectionBucket, config: &PipelineConfig) -> Result<()> {
    let mut tiles = full_tile_list(conn, config)?;
    run_pipeline(TileAction::Backup, &mut tiles)
}

pub fn run_restore_pipeline(conn: &ConnectionBucket, config: &PipelineConfig) -> Result<()> {
    let mut tiles = full_tile_list(conn, config)?;
    run_pipeline(TileAction::Restore, &mut tiles)
}
