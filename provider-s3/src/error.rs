//! Error classification for object store failures

use bridge_traits::error::BridgeError;

/// Convert an `object_store` error into the bridge taxonomy.
///
/// Missing objects map to `NotFound`. Errors that no retry can fix (bad
/// paths, unsupported operations, rejected credentials, unknown settings) map
/// to `Configuration`. Everything else, including network failures and
/// service errors, is `Transient`.
pub fn map_store_error(error: object_store::Error) -> BridgeError {
    use object_store::Error;

    match error {
        Error::NotFound { path, .. } => BridgeError::NotFound(path),
        err @ (Error::InvalidPath { .. }
        | Error::NotSupported { .. }
        | Error::NotImplemented
        | Error::PermissionDenied { .. }
        | Error::Unauthenticated { .. }
        | Error::UnknownConfigurationKey { .. }) => BridgeError::Configuration(err.to_string()),
        other => BridgeError::Transient(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_keeps_path() {
        let err = map_store_error(object_store::Error::NotFound {
            path: "raw/a.txt".to_string(),
            source: "missing".into(),
        });
        assert!(matches!(err, BridgeError::NotFound(ref path) if path == "raw/a.txt"));
    }

    #[test]
    fn test_credential_errors_are_configuration() {
        let denied = map_store_error(object_store::Error::PermissionDenied {
            path: "raw/a.txt".to_string(),
            source: "AccessDenied".into(),
        });
        assert!(matches!(denied, BridgeError::Configuration(_)));

        let unauthenticated = map_store_error(object_store::Error::Unauthenticated {
            path: "raw/a.txt".to_string(),
            source: "InvalidAccessKeyId".into(),
        });
        assert!(matches!(unauthenticated, BridgeError::Configuration(_)));

        let unknown_key = map_store_error(object_store::Error::UnknownConfigurationKey {
            store: "S3",
            key: "aws_bogus".to_string(),
        });
        assert!(matches!(unknown_key, BridgeError::Configuration(_)));
    }

    #[test]
    fn test_generic_errors_are_transient() {
        let err = map_store_error(object_store::Error::Generic {
            store: "S3",
            source: "connection reset by peer".into(),
        });
        assert!(err.is_transient());
        assert!(err.to_string().contains("connection reset"));
    }
}
