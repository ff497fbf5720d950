//! Wiring shared by the commands that assemble context.

use ledgerbridge_cache::{CachedAccounting, EntityCache};
use ledgerbridge_config::AppConfig;
use ledgerbridge_context::ContextAssembler;
use ledgerbridge_memory::SessionStore;
use ledgerbridge_sources::{FileAccounting, FileRecordSource};
use std::path::Path;
use std::sync::Arc;

/// Load config from `path` if given, else from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}

/// Build an assembler over the JSON fixtures in `data_dir`.
pub fn build(
    config: &AppConfig,
    data_dir: &Path,
) -> Result<ContextAssembler, Box<dyn std::error::Error>> {
    if !data_dir.is_dir() {
        return Err(format!("Data directory not found: {}", data_dir.display()).into());
    }

    let records = Arc::new(FileRecordSource::new(data_dir));
    let upstream = Arc::new(
        FileAccounting::open(data_dir).map_err(|e| format!("Failed to open accounting data: {e}"))?,
    );
    let cache = Arc::new(EntityCache::new(config.cache.ttl()).with_grace(config.cache.grace()));
    let accounting = Arc::new(CachedAccounting::new(
        upstream,
        cache,
        config.cache.fetch_timeout(),
    ));
    let sessions = Arc::new(SessionStore::new(config.session.ttl()));

    Ok(ContextAssembler::new(config, sessions, records, accounting))
}
