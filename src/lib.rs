//! # Capability Resolver
//!
//! A runtime engine for protocol-oriented capabilities: named contracts with
//! required members, default implementations supplied by extensions, and
//! defaults that apply only when a value also holds a companion capability.
//!
//! The engine answers one question for every call site: given a value, a
//! capability and a member, which body runs?
//!
//! - [`capabilities`]: the registry of capabilities and defaults
//! - [`values`]: value descriptors (a value plus its conformances and overrides)
//! - [`resolver`]: the precedence rules that bind a body
//! - [`dispatch`]: the facade that resolves and executes members
//! - [`hooks`]: observers of dispatch

pub mod capabilities;
pub mod dispatch;
pub mod hooks;
pub mod resolver;
pub mod values;

pub use capabilities::{
    body, CapabilityId, CapabilityRegistry, MemberSignature, RegistryError, ValueKind,
};
pub use dispatch::{CapabilityView, DispatchConfig, DispatchError, Dispatcher, Receiver};
pub use hooks::DispatchHook;
pub use resolver::{Binding, BindingSource, ExtensionContext, ResolutionError, Resolver};
pub use values::{DescriptorError, ValueBuilder, ValueDescriptor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
