//! The single error type shared by every Stacks crate.

/// Errors raised anywhere in the entity/component runtime.
///
/// Every failure is unrecoverable at the point of detection and propagates to
/// the nearest caller. Construction-time failures (bad configuration, bad
/// descriptors) are meant to be treated as fatal at startup; runtime failures
/// (lock contention, backend errors) are per-operation.
#[derive(Debug, thiserror::Error)]
pub enum StacksError {
    /// Required positional data is absent (entity without identity, record
    /// without component, descriptor without a name or kind).
    #[error("missing {field} on {context}")]
    MissingField {
        /// The absent field.
        field: &'static str,
        /// What the field was expected on.
        context: String,
    },

    /// A value was assigned to a component whose kind forbids it.
    #[error("'{component}' is not a {expected} component")]
    TypeMismatch {
        /// The component name.
        component: String,
        /// The kind of component the operation requires.
        expected: &'static str,
    },

    /// An integer update does not fit in an `i64`.
    #[error("'{component}' would overflow: {value} + {delta}")]
    Overflow {
        /// The component name.
        component: String,
        /// The stored value.
        value: i64,
        /// The requested change.
        delta: i64,
    },

    /// A transaction chain was started while another is still open.
    #[error("cannot start a new transaction chain until the last one completes")]
    LockContention,

    /// A transaction with no bound writer was committed freely.
    #[error("transaction is not bound to a writer; it cannot be committed freely")]
    UnboundCommit,

    /// A required configuration entry, processor, or backend does not exist.
    #[error("no {kind} named '{name}'")]
    LookupMiss {
        /// What was looked up (e.g. `"configuration entry"`).
        kind: &'static str,
        /// The missing key.
        name: String,
    },

    /// A storage backend failed.
    #[error("storage backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StacksError {
    /// Shorthand for [`StacksError::MissingField`].
    pub fn missing(field: &'static str, context: impl Into<String>) -> Self {
        Self::MissingField {
            field,
            context: context.into(),
        }
    }

    /// Shorthand for [`StacksError::LookupMiss`].
    pub fn lookup(kind: &'static str, name: impl Into<String>) -> Self {
        Self::LookupMiss {
            kind,
            name: name.into(),
        }
    }

    /// Wrap any backend error as [`StacksError::Backend`].
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, StacksError>;
