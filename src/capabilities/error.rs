//! Registry errors.

use thiserror::Error;

/// Errors raised while declaring capabilities or providing defaults.
///
/// All of these are setup-time configuration errors: the registry is left
/// exactly as it was before the failing call.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A capability with this name is already registered.
    #[error("Capability already declared: {0}")]
    DuplicateCapability(String),

    /// The capability id or name is not registered.
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// The signature is not a member of the capability.
    #[error("Unknown member {member} on capability {capability}")]
    UnknownMember { capability: String, member: String },

    /// The signature is already a member of the capability (directly or
    /// through refinement).
    #[error("Member {member} already declared on capability {capability}")]
    DuplicateMember { capability: String, member: String },

    /// The same extension context already provides a default for the member.
    #[error("Default for {member} already provided by {provider}")]
    DuplicateDefault { provider: String, member: String },

    /// A conditional default cannot use its own capability as companion.
    #[error("Capability {0} cannot be its own companion")]
    InvalidCompanion(String),

    /// The registry has been frozen; no further registration is allowed.
    #[error("Registry is frozen")]
    Frozen,

    /// A process-wide registry is already installed.
    #[error("A global registry is already installed")]
    AlreadyInstalled,

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
