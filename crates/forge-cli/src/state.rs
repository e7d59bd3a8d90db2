//! Application state shared by the CLI commands.
//!
//! AppState resolves the data directory, loads the engine configuration and
//! opens the selected snapshot store once, before dispatch.

use std::path::{Path, PathBuf};

use forge_core::persistence::BoxSnapshotStore;
use forge_infra::config::{default_data_dir, load_engine_config, load_engine_config_file};
use forge_infra::{StoreKind, open_store};
use forge_types::config::EngineConfig;

/// Resolved configuration and backends for one CLI invocation.
#[derive(Clone, Debug)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: EngineConfig,
    pub store_kind: StoreKind,
    pub store: BoxSnapshotStore,
}

impl AppState {
    /// Resolve the data dir, read `forge.toml` (or `config_path`) and open the store.
    ///
    /// An explicit `config_path` must parse; the default `forge.toml` falls
    /// back to defaults with a warning.
    pub async fn init(
        data_dir: Option<PathBuf>,
        config_path: Option<&Path>,
        store_kind: StoreKind,
    ) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = match config_path {
            Some(path) => load_engine_config_file(path).await?,
            None => load_engine_config(&data_dir).await,
        };

        let store = open_store(store_kind, &data_dir).await?;

        tracing::debug!(
            data_dir = %data_dir.display(),
            store = %store_kind,
            "initialized CLI state"
        );

        Ok(Self {
            data_dir,
            config,
            store_kind,
            store,
        })
    }
}
