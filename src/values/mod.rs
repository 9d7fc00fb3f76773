//! Value descriptors: the resolver-facing view of a concrete value.

pub mod descriptor;
pub mod error;

pub use descriptor::{stored_property, ValueBuilder, ValueDescriptor};
pub use error::DescriptorError;
