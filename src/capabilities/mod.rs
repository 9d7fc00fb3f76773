//! # Capability Registry
//!
//! Capabilities are named contracts: a set of required members plus default
//! implementations supplied by extensions. Defaults may be unconditional or
//! conditional on a companion capability ("Record where Tieable").
//!
//! ## Lifecycle
//!
//! 1. Declare capabilities (`declare_capability`, `declare_refining`, or a
//!    YAML manifest through `declare_from_yaml`)
//! 2. Provide extension members and defaults (`extend`, `provide_default`,
//!    `provide_conditional_default`)
//! 3. `freeze()` the registry and share it behind an `Arc` (optionally through
//!    [`global::install`])
//!
//! ```rust
//! use capability_resolver::capabilities::{body, CapabilityRegistry, MemberSignature, ValueKind};
//! use serde_json::json;
//!
//! let mut registry = CapabilityRegistry::new();
//! let record = registry
//!     .declare_capability("Record", vec![MemberSignature::getter("wins", ValueKind::Int)])
//!     .unwrap();
//! registry
//!     .extend(record, MemberSignature::getter("shout", ValueKind::String), body(|_, _| Ok(json!("WE WIN"))))
//!     .unwrap();
//! registry.freeze();
//! assert!(registry.is_frozen());
//! ```

pub mod capability;
pub mod error;
pub mod global;
pub mod registry;

pub use capability::{
    body, Capability, CapabilityDecl, CapabilityId, MemberBody, MemberDecl, MemberKind,
    MemberSignature, ValueKind,
};
pub use error::RegistryError;
pub use registry::{CapabilityRegistry, ConditionalDefault, DefaultImpl};
