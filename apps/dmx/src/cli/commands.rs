//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api::{self, StatusResponse};
use crate::config::{Backend, Config, StorageConfig};
use dmx_core::{CoreService, DmxError, ErrorKind, ObjectId, StorageBackend, TypeView};

/// Open the configured storage and bootstrap it if needed.
fn open_core(storage: &StorageConfig) -> Result<CoreService<StorageBackend>, DmxError> {
    CoreService::new(storage.open()?)
}

fn print_json(value: &serde_json::Value) -> Result<(), DmxError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| DmxError::SerializationError(format!("cannot render output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// SERVE COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_serve(config: &Config) -> Result<(), DmxError> {
    let core = open_core(&config.storage)?;

    println!("DMX Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Address:  {}", config.server.addr());
    println!("  Backend:  {:?}", config.storage.backend);
    if config.storage.backend == Backend::Redb {
        println!("  Database: {}", config.storage.path.display());
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&config.server.addr(), core, &config.server.cors_origins).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Bootstrap a new database. An existing one is only replaced with `force`.
pub fn cmd_init(storage: &StorageConfig, force: bool, json_mode: bool) -> Result<(), DmxError> {
    if storage.backend == Backend::Redb && storage.path.exists() {
        if !force {
            return Err(DmxError::InvalidState(format!(
                "database {} already exists, use --force to replace it",
                storage.path.display()
            )));
        }
        std::fs::remove_file(&storage.path).map_err(|e| {
            DmxError::StorageError(format!("cannot remove {}: {}", storage.path.display(), e))
        })?;
        tracing::info!(path = %storage.path.display(), "existing database removed");
    }

    let core = open_core(storage)?;
    let status = status_of(&core)?;
    if json_mode {
        print_json(&serde_json::json!({
            "initialized": true,
            "topic_types": status.topic_type_count,
            "assoc_types": status.assoc_type_count,
        }))
    } else {
        println!(
            "Initialized with {} topic types and {} association types",
            status.topic_type_count, status.assoc_type_count
        );
        Ok(())
    }
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

fn status_of(core: &CoreService<StorageBackend>) -> Result<StatusResponse, DmxError> {
    Ok(StatusResponse {
        topic_count: core.all_topics().try_fold(0usize, |n, t| t.map(|_| n.saturating_add(1)))?,
        assoc_count: core.all_assocs().try_fold(0usize, |n, a| a.map(|_| n.saturating_add(1)))?,
        topic_type_count: core.get_topic_types().len(),
        assoc_type_count: core.get_assoc_types().len(),
        connections: 0,
    })
}

/// Show object counts.
pub fn cmd_status(storage: &StorageConfig, json_mode: bool) -> Result<(), DmxError> {
    let core = open_core(storage)?;
    let status = status_of(&core)?;
    if json_mode {
        let value = serde_json::to_value(&status)
            .map_err(|e| DmxError::SerializationError(format!("cannot render status: {}", e)))?;
        return print_json(&value);
    }
    println!("Topics:            {}", status.topic_count);
    println!("Associations:      {}", status.assoc_count);
    println!("Topic types:       {}", status.topic_type_count);
    println!("Association types: {}", status.assoc_type_count);
    Ok(())
}

// =============================================================================
// TOPIC / TYPE COMMANDS
// =============================================================================

/// Print a topic as JSON.
pub fn cmd_topic(storage: &StorageConfig, id: u64, children: bool) -> Result<(), DmxError> {
    let core = open_core(storage)?;
    print_json(&core.get_topic(ObjectId(id), children)?.to_json())
}

/// Print a type as JSON. Topic types are looked up first.
pub fn cmd_type(storage: &StorageConfig, uri: &str) -> Result<(), DmxError> {
    let core = open_core(storage)?;
    print_json(&find_type(&core, uri)?.to_json())
}

fn find_type(core: &CoreService<StorageBackend>, uri: &str) -> Result<TypeView, DmxError> {
    match core.get_topic_type(uri) {
        Err(e) if e.kind() == ErrorKind::SchemaViolation => core.get_assoc_type(uri),
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmx_core::constants::{COMPOSITION, TOPIC_TYPE};
    use dmx_core::HasCompDefs;

    fn redb_config(dir: &tempfile::TempDir) -> StorageConfig {
        StorageConfig {
            backend: Backend::Redb,
            path: dir.path().join("dmx.redb"),
        }
    }

    #[test]
    fn init_refuses_existing_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = redb_config(&dir);
        cmd_init(&storage, false, true).expect("first init");
        let err = cmd_init(&storage, false, true).expect_err("exists");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        cmd_init(&storage, true, true).expect("forced");
    }

    #[test]
    fn find_type_of_either_kind() {
        let core = CoreService::new(StorageBackend::default()).expect("core");
        assert_eq!(find_type(&core, TOPIC_TYPE).expect("topic type").owner_uri(), TOPIC_TYPE);
        assert_eq!(find_type(&core, COMPOSITION).expect("assoc type").owner_uri(), COMPOSITION);
        assert_eq!(find_type(&core, "dmx.nowhere").expect_err("missing").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn status_counts_bootstrap() {
        let core = CoreService::new(StorageBackend::default()).expect("core");
        let status = status_of(&core).expect("status");
        assert!(status.topic_count > 0);
        assert!(status.topic_type_count >= 3);
        assert!(status.assoc_type_count >= 5);
    }
}
