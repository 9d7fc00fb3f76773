//! # Resolver
//!
//! Decides which implementation of a capability member binds for a value.
//!
//! ## Precedence
//!
//! ```text
//! resolve(value, Record, winningPercent)
//!   1. concrete override on the value           → always wins
//!   2. conditional defaults whose companion     → exactly one binds,
//!      the value also has (Record where Tieable)   several are ambiguous
//!   3. unconditional default                    → refining providers first
//!   4. NoSuchMember
//! ```
//!
//! ## Extension context
//!
//! A default body is bound together with the extension block it was written
//! in. Calls the body makes to sibling members are resolved statically in
//! that block ([`Resolver::resolve_in`]): the block itself, then the
//! provider's unconditional extension, then the declaring capability's own
//! default, and only then the value's override. A value's override therefore
//! never replaces a member an extension implements for itself.

pub mod error;

use std::fmt;

use crate::capabilities::{
    CapabilityId, CapabilityRegistry, DefaultImpl, MemberBody, MemberSignature,
};
use crate::values::ValueDescriptor;

pub use error::ResolutionError;

/// The extension block a default body was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionContext {
    /// Capability whose extension supplied the body
    pub provider: CapabilityId,

    /// Companion capability for `extension Provider where Self: Companion`
    pub companion: Option<CapabilityId>,
}

impl ExtensionContext {
    pub fn unconditional(provider: CapabilityId) -> Self {
        Self {
            provider,
            companion: None,
        }
    }

    pub fn conditional(provider: CapabilityId, companion: CapabilityId) -> Self {
        Self {
            provider,
            companion: Some(companion),
        }
    }
}

/// Where sibling calls made by a running body are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Body implemented on the value's own type: calls dispatch dynamically.
    Concrete,
    /// Default body: calls resolve statically in its extension block.
    Extension(ExtensionContext),
}

/// Which rule produced a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    /// The value's own implementation.
    Override,
    /// A default that required a companion capability.
    ConditionalDefault(ExtensionContext),
    /// An unconditional default.
    Default(ExtensionContext),
}

/// A resolved implementation, ready to execute.
#[derive(Clone)]
pub struct Binding {
    /// Capability that declares the member
    pub capability: CapabilityId,

    /// The member
    pub signature: MemberSignature,

    /// Rule that selected the body
    pub source: BindingSource,

    /// The implementation
    pub body: MemberBody,
}

impl Binding {
    /// Scope the body runs in.
    pub fn scope(&self) -> Scope {
        match self.source {
            BindingSource::Override => Scope::Concrete,
            BindingSource::ConditionalDefault(context) | BindingSource::Default(context) => {
                Scope::Extension(context)
            }
        }
    }

    fn from_default(default: &DefaultImpl) -> Self {
        let source = if default.is_conditional() {
            BindingSource::ConditionalDefault(default.context)
        } else {
            BindingSource::Default(default.context)
        };
        Self {
            capability: default.declaring,
            signature: default.signature.clone(),
            source,
            body: default.body.clone(),
        }
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.capability == other.capability
            && self.signature == other.signature
            && self.source == other.source
            && std::sync::Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("capability", &self.capability)
            .field("signature", &self.signature)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Either a binding or the reason none exists.
pub type ResolutionResult = Result<Binding, ResolutionError>;

/// Resolves members of one value against a registry.
///
/// A resolver only borrows its inputs and lives for a single dispatch.
pub struct Resolver<'a> {
    registry: &'a CapabilityRegistry,
    value: &'a ValueDescriptor,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a CapabilityRegistry, value: &'a ValueDescriptor) -> Self {
        Self { registry, value }
    }

    /// Resolve `signature` of `capability` for the value.
    pub fn resolve(&self, capability: CapabilityId, signature: &MemberSignature) -> ResolutionResult {
        let cap = self
            .registry
            .lookup(capability)
            .filter(|_| self.value.has_capability(capability))
            .ok_or_else(|| ResolutionError::NoSuchCapability {
                type_name: self.value.type_name().to_string(),
                capability: self.registry.name_of(capability),
            })?;
        let declaring = self
            .registry
            .declaring_capability(capability, signature)
            .ok_or_else(|| ResolutionError::NoSuchMember {
                capability: cap.name.clone(),
                member: signature.to_string(),
            })?;

        if let Some(body) = self.value.declared_override(declaring, signature) {
            return Ok(self.bind_override(declaring, signature, body));
        }

        let applicable: Vec<&DefaultImpl> = self
            .registry
            .defaults_for(declaring, signature)
            .filter(|d| self.applies(d))
            .collect();

        let conditional: Vec<&DefaultImpl> =
            applicable.iter().copied().filter(|d| d.is_conditional()).collect();
        if let Some(default) = self.pick(&conditional, capability, signature)? {
            return Ok(self.bind_default(default));
        }

        let refining: Vec<&DefaultImpl> = applicable
            .iter()
            .copied()
            .filter(|d| !d.is_conditional() && d.context.provider != declaring)
            .collect();
        if let Some(default) = self.pick(&refining, capability, signature)? {
            return Ok(self.bind_default(default));
        }

        if let Some(default) = applicable
            .iter()
            .find(|d| d.context == ExtensionContext::unconditional(declaring))
        {
            return Ok(self.bind_default(default));
        }

        Err(ResolutionError::NoSuchMember {
            capability: cap.name.clone(),
            member: signature.to_string(),
        })
    }

    /// Resolve a sibling call made from a default body written in `context`.
    ///
    /// Order: the same extension block, the provider's unconditional
    /// extension, the declaring capability's own default, the value's
    /// override.
    pub fn resolve_in(
        &self,
        context: ExtensionContext,
        signature: &MemberSignature,
    ) -> ResolutionResult {
        let provider = self.registry.lookup(context.provider).ok_or_else(|| {
            ResolutionError::NoSuchCapability {
                type_name: self.value.type_name().to_string(),
                capability: context.provider.to_string(),
            }
        })?;
        let declaring = self
            .registry
            .declaring_capability(context.provider, signature)
            .ok_or_else(|| ResolutionError::NoSuchMember {
                capability: provider.name.clone(),
                member: signature.to_string(),
            })?;

        let candidates = [
            context,
            ExtensionContext::unconditional(context.provider),
            ExtensionContext::unconditional(declaring),
        ];
        for wanted in candidates {
            if let Some(default) = self
                .registry
                .defaults_for(declaring, signature)
                .find(|d| d.context == wanted)
            {
                log::trace!(
                    "{} in {} resolved statically to {}",
                    signature,
                    self.registry.describe_context(&context),
                    self.registry.describe_context(&default.context)
                );
                return Ok(Binding::from_default(default));
            }
        }

        if let Some(body) = self.value.declared_override(declaring, signature) {
            return Ok(self.bind_override(declaring, signature, body));
        }

        Err(ResolutionError::NoSuchMember {
            capability: provider.name.clone(),
            member: signature.to_string(),
        })
    }

    /// A default applies when the value holds its provider and companion.
    fn applies(&self, default: &DefaultImpl) -> bool {
        self.value.has_capability(default.context.provider)
            && default
                .context
                .companion
                .is_none_or(|c| self.value.has_capability(c))
    }

    /// Exactly one candidate binds; several are ambiguous.
    fn pick<'d>(
        &self,
        candidates: &[&'d DefaultImpl],
        capability: CapabilityId,
        signature: &MemberSignature,
    ) -> Result<Option<&'d DefaultImpl>, ResolutionError> {
        match candidates {
            [] => Ok(None),
            [only] => Ok(Some(*only)),
            many => Err(ResolutionError::AmbiguousDefault {
                capability: self.registry.name_of(capability),
                member: signature.to_string(),
                candidates: many
                    .iter()
                    .map(|d| self.registry.describe_context(&d.context))
                    .collect(),
            }),
        }
    }

    fn bind_override(
        &self,
        declaring: CapabilityId,
        signature: &MemberSignature,
        body: &MemberBody,
    ) -> Binding {
        log::debug!(
            "{}::{} bound to the override on {}",
            self.registry.name_of(declaring),
            signature,
            self.value.type_name()
        );
        Binding {
            capability: declaring,
            signature: signature.clone(),
            source: BindingSource::Override,
            body: body.clone(),
        }
    }

    fn bind_default(&self, default: &DefaultImpl) -> Binding {
        log::debug!(
            "{}::{} bound to the default in {} for {}",
            self.registry.name_of(default.declaring),
            default.signature,
            self.registry.describe_context(&default.context),
            self.value.type_name()
        );
        Binding::from_default(default)
    }
}
