//! Conversation session stores for Touchline.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemorySessionStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStore;

use std::sync::Arc;
use touchline_config::SessionConfig;
use touchline_core::error::SessionError;
use touchline_core::session::SessionStore;

/// Build the store named by `config.backend` and run its `init`.
pub async fn build_from_config(config: &SessionConfig) -> Result<Arc<dyn SessionStore>, SessionError> {
    let store: Arc<dyn SessionStore> = match config.backend.as_str() {
        "memory" => Arc::new(InMemorySessionStore::new()),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            if let Some(parent) = config.database_path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    SessionError::Storage(format!("Cannot create {}: {e}", parent.display()))
                })?;
            }
            let url = format!("sqlite://{}", config.database_path.display());
            Arc::new(SqliteSessionStore::new(&url).await?)
        }
        other => {
            return Err(SessionError::NotInitialised(format!(
                "Session backend '{other}' is not available in this build"
            )));
        }
    };
    store.init().await?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_memory_store_by_default() {
        let store = build_from_config(&SessionConfig::default()).await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn builds_sqlite_store_and_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            backend: "sqlite".into(),
            database_path: dir.path().join("nested").join("conversations.db"),
            ..SessionConfig::default()
        };
        let store = build_from_config(&config).await.unwrap();
        assert_eq!(store.name(), "sqlite");
        assert!(dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let config = SessionConfig {
            backend: "redis".into(),
            ..SessionConfig::default()
        };
        assert!(build_from_config(&config).await.is_err());
    }
}
