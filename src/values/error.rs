//! Value construction errors.

use thiserror::Error;

/// Errors raised while building a [`ValueDescriptor`](super::ValueDescriptor).
///
/// A failure only rejects that value; the registry is never touched.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// A required member has neither an override nor an applicable default.
    #[error("{type_name} does not satisfy {capability}: missing {member}")]
    UnsatisfiedCapability {
        type_name: String,
        capability: String,
        member: String,
    },

    /// The capability id is not registered.
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// An override names a member the capability does not have.
    #[error("Unknown member {member} on capability {capability}")]
    UnknownMember { capability: String, member: String },

    /// An override targets a capability the value does not conform to.
    #[error("{type_name} overrides {member} of {capability} without conforming to it")]
    UndeclaredCapability {
        type_name: String,
        capability: String,
        member: String,
    },
}
