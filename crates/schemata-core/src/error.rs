//! Error types for the schema compiler.

/// Errors raised while compiling a schema into DDL.
///
/// Registry, resolver and differ errors are structural: re-running with the
/// same declared input reproduces them deterministically, so none of them are
/// retried. Introspection errors are environmental and surfaced as fatal for
/// the current invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Two objects of the same kind share a qualified name.
    #[error("duplicate {kind} '{name}'")]
    DuplicateName {
        /// Kind of the duplicated object (`table`, `column`, ...).
        kind: String,
        /// Qualified name that appears more than once.
        name: String,
    },

    /// A declared dependency does not resolve within the registered set.
    #[error("{from} references unknown {kind} '{reference}'")]
    UnknownReference {
        /// The object holding the dangling reference.
        from: String,
        /// Kind of the referenced object.
        kind: String,
        /// Name of the referenced object.
        reference: String,
    },

    /// No valid order exists; the cycle is listed in dependency order.
    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Objects forming the cycle.
        cycle: Vec<String>,
    },

    /// Reading the live catalog failed.
    #[error("introspection failed: {0}")]
    Introspection(String),

    /// A structural change has no safe DDL translation.
    #[error("unsupported change to {object}: {reason}")]
    UnsupportedChange {
        /// The object being changed.
        object: String,
        /// Why the change cannot be applied safely.
        reason: String,
    },

    /// The target dialect cannot render the requested feature.
    #[error("{dialect} does not support {feature}")]
    Dialect {
        /// Dialect name.
        dialect: &'static str,
        /// The unsupported feature.
        feature: String,
    },
}

impl CompileError {
    /// Stable name of the error kind, printed by the CLI.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateName { .. } => "DuplicateNameError",
            Self::UnknownReference { .. } => "UnknownReferenceError",
            Self::CyclicDependency { .. } => "CyclicDependencyError",
            Self::Introspection(_) => "IntrospectionError",
            Self::UnsupportedChange { .. } => "UnsupportedChangeError",
            Self::Dialect { .. } => "DialectError",
        }
    }

    pub(crate) fn duplicate(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub(crate) fn unknown(
        from: impl Into<String>,
        kind: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self::UnknownReference {
            from: from.into(),
            kind: kind.into(),
            reference: reference.into(),
        }
    }

    pub(crate) fn unsupported(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedChange {
            object: object.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for compiler operations.
pub type Result<T> = std::result::Result<T, CompileError>;
