//! Resolution errors.

use thiserror::Error;

/// Why no implementation could be bound for a member.
///
/// Resolution errors are recoverable: the caller decides whether a failed
/// lookup is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The value does not conform to the capability (a failed downcast).
    #[error("{type_name} does not conform to {capability}")]
    NoSuchCapability { type_name: String, capability: String },

    /// The member is not declared on the capability, or nothing implements it.
    #[error("No member {member} on capability {capability}")]
    NoSuchMember { capability: String, member: String },

    /// Several conditional (or refining) defaults apply and none is more
    /// specific than the others.
    #[error("Ambiguous default for {member} on {capability}: {}", candidates.join(", "))]
    AmbiguousDefault {
        capability: String,
        member: String,
        candidates: Vec<String>,
    },
}
