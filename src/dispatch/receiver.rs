//! The receiver handed to member bodies.

use serde_json::Value;

use super::error::DispatchError;
use super::{Dispatcher, Target};
use crate::capabilities::{CapabilityId, MemberSignature};
use crate::resolver::{ResolutionError, Scope};
use crate::values::ValueDescriptor;

/// `self` inside a member body: the value, plus the scope the body was
/// written in.
///
/// Sibling calls made through [`Receiver::call`] follow the scope: bodies
/// implemented on the value's type dispatch dynamically, default bodies stay
/// inside their extension block. A conditional block can also call the
/// members of its companion capability.
pub struct Receiver<'a> {
    dispatcher: &'a Dispatcher,
    value: &'a ValueDescriptor,
    capability: CapabilityId,
    scope: Scope,
    depth: usize,
}

impl<'a> Receiver<'a> {
    pub(crate) fn new(
        dispatcher: &'a Dispatcher,
        value: &'a ValueDescriptor,
        capability: CapabilityId,
        scope: Scope,
        depth: usize,
    ) -> Self {
        Self {
            dispatcher,
            value,
            capability,
            scope,
            depth,
        }
    }

    /// The value the member was invoked on.
    pub fn value(&self) -> &'a ValueDescriptor {
        self.value
    }

    /// The underlying value.
    pub fn state(&self) -> &'a Value {
        self.value.state()
    }

    /// A stored field of the underlying value.
    pub fn field(&self, name: &str) -> Option<&'a Value> {
        self.value.field(name)
    }

    /// Capability that declares the running member.
    pub fn capability(&self) -> CapabilityId {
        self.capability
    }

    /// Scope sibling calls are resolved in.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Number of enclosing member calls.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Runtime conformance check (`self is Capability`).
    pub fn has_capability(&self, capability: CapabilityId) -> bool {
        self.value.has_capability(capability)
    }

    /// Call a sibling member by name.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, DispatchError> {
        let (target, signature) = self.sibling(name, args.len())?;
        self.dispatcher
            .dispatch(self.value, target, &signature, args, self.depth)
    }

    /// Call a sibling member by exact signature.
    pub fn call_signature(
        &self,
        signature: &MemberSignature,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        let target = match self.scope {
            Scope::Extension(context) => Target::Extension(context),
            Scope::Concrete => Target::Capability(self.capability),
        };
        self.dispatcher
            .dispatch(self.value, target, signature, args, self.depth)
    }

    /// Call a member of another capability with full resolution.
    pub fn invoke(
        &self,
        capability: CapabilityId,
        name: &str,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        let signature = self
            .dispatcher
            .named_signature(self.value, capability, name, args.len())?;
        self.dispatcher.dispatch(
            self.value,
            Target::Capability(capability),
            &signature,
            args,
            self.depth,
        )
    }

    /// Call a zero-argument sibling and read the result as a number.
    pub fn call_f64(&self, name: &str) -> Result<f64, DispatchError> {
        let value = self.call(name, &[])?;
        value.as_f64().ok_or_else(|| {
            DispatchError::Runtime(anyhow::anyhow!("{} returned non-numeric {}", name, value))
        })
    }

    /// Call a zero-argument sibling and read the result as an integer.
    pub fn call_i64(&self, name: &str) -> Result<i64, DispatchError> {
        let value = self.call(name, &[])?;
        value.as_i64().ok_or_else(|| {
            DispatchError::Runtime(anyhow::anyhow!("{} returned non-integer {}", name, value))
        })
    }

    fn sibling(&self, name: &str, arity: usize) -> Result<(Target, MemberSignature), DispatchError> {
        let registry = self.dispatcher.registry();
        let found = match self.scope {
            // `where Self: Companion` blocks also see the companion's members.
            Scope::Extension(context) => registry
                .member_named(context.provider, name, arity)
                .map(|signature| (Target::Extension(context), signature.clone()))
                .or_else(|| {
                    let companion = context.companion?;
                    registry
                        .member_named(companion, name, arity)
                        .map(|signature| (Target::Capability(companion), signature.clone()))
                }),
            Scope::Concrete => std::iter::once(self.capability)
                .chain(self.value.capabilities().iter().copied())
                .find_map(|capability| {
                    registry
                        .member_named(capability, name, arity)
                        .map(|signature| (Target::Capability(capability), signature.clone()))
                }),
        };
        found.ok_or_else(|| {
            let owner = match self.scope {
                Scope::Extension(context) => context.provider,
                Scope::Concrete => self.capability,
            };
            ResolutionError::NoSuchMember {
                capability: registry.name_of(owner),
                member: format!("{}/{}", name, arity),
            }
            .into()
        })
    }
}
