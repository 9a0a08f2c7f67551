//! Errors raised while navigating or patching a [`Document`](crate::Document).

use thiserror::Error;

/// Failure to resolve or mutate a location addressed by a JSON pointer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PointerError {
    /// The pointer string is not a valid RFC 6901 pointer.
    #[error("invalid pointer '{path}': {reason}")]
    Malformed {
        /// The offending pointer text.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The operation targets the document root, which is never reassigned.
    #[error("cannot {op} the document root")]
    RootMutation {
        /// The rejected operation (`set`, `insert`, `remove`).
        op: &'static str,
    },

    /// A map key along the pointer does not exist.
    #[error("'{path}': key '{key}' not found")]
    NotFound {
        /// The full pointer being resolved.
        path: String,
        /// The missing key.
        key: String,
    },

    /// An intermediate value is a scalar and cannot be descended into.
    #[error("'{path}': cannot navigate through a {found} at '{token}'")]
    NotNavigable {
        /// The full pointer being resolved.
        path: String,
        /// The token that would have been looked up.
        token: String,
        /// The kind of value that was found instead of a container.
        found: &'static str,
    },

    /// A sequence step is not a valid index.
    #[error("'{path}': '{token}' is not a valid array index")]
    InvalidIndex {
        /// The full pointer being resolved.
        path: String,
        /// The token that failed to parse.
        token: String,
    },

    /// A sequence index is outside the array bounds.
    #[error("'{path}': index {index} out of range for array of length {len}")]
    IndexOutOfRange {
        /// The full pointer being resolved.
        path: String,
        /// The requested index.
        index: usize,
        /// The array length at the time of the lookup.
        len: usize,
    },
}

/// Failure to apply a single patch operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PatchError {
    /// The operation record could not be decoded.
    #[error("invalid patch operation: {reason}")]
    Decode {
        /// Decoder message.
        reason: String,
    },

    /// The operation kind is valid JSON Patch but not applied by this client.
    #[error("unsupported patch operation '{op}'")]
    Unsupported {
        /// The operation name as received.
        op: String,
    },

    /// The operation's pointer could not be resolved against the document.
    #[error("patch failed: {op} at '{path}' - {source}")]
    Pointer {
        /// The operation name.
        op: &'static str,
        /// The operation's pointer.
        path: String,
        /// The underlying resolver error.
        #[source]
        source: PointerError,
    },
}

/// Result type alias for pointer operations.
pub type PointerResult<T> = Result<T, PointerError>;

/// Result type alias for patch operations.
pub type PatchResult<T> = Result<T, PatchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn display_messages() {
        let err = PointerError::IndexOutOfRange {
            path: "/a/3".into(),
            index: 3,
            len: 2,
        };
        assert_eq!(
            err.to_string(),
            "'/a/3': index 3 out of range for array of length 2"
        );

        let err = PatchError::Unsupported { op: "move".into() };
        assert_eq!(err.to_string(), "unsupported patch operation 'move'");
    }

    #[test]
    fn pointer_error_is_patch_source() {
        let err = PatchError::Pointer {
            op: "remove",
            path: "/x".into(),
            source: PointerError::RootMutation { op: "remove" },
        };
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "patch failed: remove at '/x' - cannot remove the document root"
        );
    }
}
