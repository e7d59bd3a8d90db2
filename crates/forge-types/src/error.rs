use thiserror::Error;

/// Errors raised by snapshot stores (used by the `SnapshotStore` port in forge-core).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot store connection error: {0}")]
    Connection(String),

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot query error: {0}")]
    Query(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_error_display() {
        let err = PersistenceError::Query("no such table: snapshots".to_string());
        assert_eq!(
            err.to_string(),
            "snapshot query error: no such table: snapshots"
        );
    }

    #[test]
    fn test_persistence_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: PersistenceError = io.into();
        assert!(matches!(err, PersistenceError::Io(_)));
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_persistence_error_from_serde() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: PersistenceError = bad.into();
        assert!(err.to_string().starts_with("snapshot serialization error"));
    }
}
