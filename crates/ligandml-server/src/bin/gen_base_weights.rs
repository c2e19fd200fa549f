//! Write fresh base weights into the configured weights directory.
//!
//! Run with: cargo run -p ligandml-server --bin gen-base-weights [-- --force]

use tracing::info;
use tracing_subscriber::EnvFilter;

use ligandml_model::{WeightCache, WeightStore};
use ligandml_server::config::Config;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let force = std::env::args().skip(1).any(|arg| arg == "--force");
    let config = Config::load()?;
    let store = WeightStore::open(&config.model.weights_path, config.model.input_dim, WeightCache::disabled())?;

    let path = store.base_path();
    if force && path.exists() {
        std::fs::remove_file(&path)?;
    }
    if store.ensure_base()? {
        info!("Base weight saved at {}", path.display());
    } else {
        info!("Base weight already present at {} (use --force to replace)", path.display());
    }
    Ok(())
}
