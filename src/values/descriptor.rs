//! Value descriptors: type-erased values with their declared conformances.
//!
//! A descriptor is created once per value and is immutable afterwards: the
//! set of capabilities and concrete overrides is fixed at construction, the
//! same way a type's conformances are fixed when it is declared.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::error::DescriptorError;
use crate::capabilities::registry::MemberKey;
use crate::capabilities::{body, CapabilityId, CapabilityRegistry, MemberBody, MemberSignature};
use crate::dispatch::DispatchError;

/// A value together with the capabilities it conforms to and the members its
/// concrete type implements itself.
#[derive(Clone)]
pub struct ValueDescriptor {
    /// Concrete type name (diagnostics only)
    type_name: String,

    /// The underlying value
    state: Value,

    /// Capabilities in declaration order
    declared: Vec<CapabilityId>,

    /// Declared capabilities followed by the ones they refine
    capabilities: Vec<CapabilityId>,

    /// Concrete overrides keyed by the member's declaring capability
    overrides: HashMap<MemberKey, MemberBody>,
}

impl ValueDescriptor {
    /// Start building a descriptor for a value of `type_name`.
    pub fn builder(type_name: impl Into<String>) -> ValueBuilder {
        ValueBuilder::new(type_name)
    }

    /// Create a descriptor, validating every conformance against `registry`.
    ///
    /// Each required member of every capability the value conforms to
    /// (including refined ones) must have an override or an applicable
    /// default: an unconditional default from a held capability, or a
    /// conditional default whose companion is held too.
    pub fn create(
        registry: &CapabilityRegistry,
        type_name: impl Into<String>,
        state: Value,
        capabilities: Vec<CapabilityId>,
        overrides: Vec<(CapabilityId, MemberSignature, MemberBody)>,
    ) -> Result<Self, DescriptorError> {
        let type_name = type_name.into();

        let mut declared = Vec::with_capacity(capabilities.len());
        for capability in capabilities {
            if registry.lookup(capability).is_none() {
                return Err(DescriptorError::UnknownCapability(capability.to_string()));
            }
            if !declared.contains(&capability) {
                declared.push(capability);
            }
        }

        let mut closure = declared.clone();
        for capability in &declared {
            for ancestor in registry.ancestors(*capability) {
                if !closure.contains(&ancestor) {
                    closure.push(ancestor);
                }
            }
        }

        let mut bodies = HashMap::with_capacity(overrides.len());
        for (capability, signature, member_body) in overrides {
            let Some(cap) = registry.lookup(capability) else {
                return Err(DescriptorError::UnknownCapability(capability.to_string()));
            };
            if !closure.contains(&capability) {
                return Err(DescriptorError::UndeclaredCapability {
                    type_name,
                    capability: cap.name.clone(),
                    member: signature.to_string(),
                });
            }
            let declaring = registry
                .declaring_capability(capability, &signature)
                .ok_or_else(|| DescriptorError::UnknownMember {
                    capability: cap.name.clone(),
                    member: signature.to_string(),
                })?;
            bodies.insert(
                MemberKey {
                    capability: declaring,
                    signature,
                },
                member_body,
            );
        }

        for capability in &closure {
            let Some(cap) = registry.lookup(*capability) else {
                continue;
            };
            for signature in cap.required() {
                let key = MemberKey {
                    capability: *capability,
                    signature: signature.clone(),
                };
                if bodies.contains_key(&key) {
                    continue;
                }
                let defaulted = registry.defaults_for(*capability, signature).any(|d| {
                    closure.contains(&d.context.provider)
                        && d.context.companion.is_none_or(|c| closure.contains(&c))
                });
                if !defaulted {
                    return Err(DescriptorError::UnsatisfiedCapability {
                        type_name,
                        capability: cap.name.clone(),
                        member: signature.to_string(),
                    });
                }
            }
        }

        log::debug!(
            "Created {} conforming to {} capabilities ({} overrides)",
            type_name,
            closure.len(),
            bodies.len()
        );

        Ok(Self {
            type_name,
            state,
            declared,
            capabilities: closure,
            overrides: bodies,
        })
    }

    /// Concrete type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The underlying value.
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// A field of the underlying value, if it is a map.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.state.get(name)
    }

    /// Capabilities in the order the value declared them.
    pub fn declared_capabilities(&self) -> &[CapabilityId] {
        &self.declared
    }

    /// Declared capabilities followed by every capability they refine.
    pub fn capabilities(&self) -> &[CapabilityId] {
        &self.capabilities
    }

    /// Whether the value conforms to `capability` (directly or by refinement).
    pub fn has_capability(&self, capability: CapabilityId) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether the value conforms to every capability in `capabilities`.
    pub fn conforms_to_all(&self, capabilities: &[CapabilityId]) -> bool {
        capabilities.iter().all(|c| self.has_capability(*c))
    }

    /// The concrete override for a member of `capability`, including members
    /// it inherits through refinement.
    pub fn override_for(
        &self,
        registry: &CapabilityRegistry,
        capability: CapabilityId,
        signature: &MemberSignature,
    ) -> Option<&MemberBody> {
        let declaring = registry.declaring_capability(capability, signature)?;
        self.declared_override(declaring, signature)
    }

    /// Override lookup by the capability that declares the member.
    pub(crate) fn declared_override(
        &self,
        declaring: CapabilityId,
        signature: &MemberSignature,
    ) -> Option<&MemberBody> {
        self.overrides.get(&MemberKey {
            capability: declaring,
            signature: signature.clone(),
        })
    }
}

impl fmt::Debug for ValueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut overrides: Vec<String> = self
            .overrides
            .keys()
            .map(|k| format!("{}::{}", k.capability, k.signature))
            .collect();
        overrides.sort();
        f.debug_struct("ValueDescriptor")
            .field("type_name", &self.type_name)
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .field("overrides", &overrides)
            .finish()
    }
}

/// An override body that reads the stored field `field` of the value.
///
/// This is how a stored property satisfies a `{ get }` requirement.
pub fn stored_property(field: impl Into<String>) -> MemberBody {
    let field = field.into();
    body(move |receiver, _| {
        receiver.field(&field).cloned().ok_or_else(|| {
            DispatchError::Runtime(anyhow::anyhow!(
                "{} has no stored field {}",
                receiver.value().type_name(),
                field
            ))
        })
    })
}

/// Builder for [`ValueDescriptor`].
pub struct ValueBuilder {
    type_name: String,
    state: Value,
    capabilities: Vec<CapabilityId>,
    overrides: Vec<(CapabilityId, MemberSignature, MemberBody)>,
}

impl ValueBuilder {
    /// Create a builder for a value of `type_name` with `null` state.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            state: Value::Null,
            capabilities: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Set the underlying value.
    pub fn state(mut self, state: Value) -> Self {
        self.state = state;
        self
    }

    /// Declare conformance to a capability.
    pub fn conforms_to(mut self, capability: CapabilityId) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Implement a member directly on the value's type.
    pub fn implement(
        mut self,
        capability: CapabilityId,
        signature: MemberSignature,
        member_body: MemberBody,
    ) -> Self {
        self.overrides.push((capability, signature, member_body));
        self
    }

    /// Satisfy a getter requirement with the stored field of the same name.
    pub fn stored(self, capability: CapabilityId, signature: MemberSignature) -> Self {
        let field = signature.name.clone();
        self.implement(capability, signature, stored_property(field))
    }

    /// Validate and build the descriptor.
    pub fn build(self, registry: &CapabilityRegistry) -> Result<ValueDescriptor, DescriptorError> {
        ValueDescriptor::create(
            registry,
            self.type_name,
            self.state,
            self.capabilities,
            self.overrides,
        )
    }
}
