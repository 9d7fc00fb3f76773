//! Capability Registry: the append-only store of capability declarations and
//! default implementations.
//!
//! The registry has two phases:
//! 1. Setup: capabilities are declared, extensions and defaults provided
//! 2. Serving: after [`CapabilityRegistry::freeze`] it is read-only and can be
//!    shared behind an `Arc` without locking
//!
//! Every failing call leaves the registry unchanged.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use super::capability::{
    Capability, CapabilityId, CapabilityManifest, MemberBody, MemberDecl, MemberKind,
    MemberSignature,
};
use super::error::RegistryError;
use crate::resolver::ExtensionContext;

/// A default implementation together with the extension context it was
/// written in.
///
/// An unconditional default has no companion; a conditional default applies
/// only when the value also has the companion capability.
#[derive(Clone)]
pub struct DefaultImpl {
    /// Extension block that supplied the body
    pub context: ExtensionContext,

    /// Capability that declares the member (the provider or one it refines)
    pub declaring: CapabilityId,

    /// Member implemented by the body
    pub signature: MemberSignature,

    /// The implementation
    pub body: MemberBody,
}

/// A default scoped to "the value also has the companion capability".
pub type ConditionalDefault = DefaultImpl;

impl DefaultImpl {
    /// Whether this default only applies alongside a companion capability.
    pub fn is_conditional(&self) -> bool {
        self.context.companion.is_some()
    }
}

impl fmt::Debug for DefaultImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultImpl")
            .field("context", &self.context)
            .field("declaring", &self.declaring)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Key of a member: the capability that declares it plus its signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct MemberKey {
    pub capability: CapabilityId,
    pub signature: MemberSignature,
}

/// Registry of capabilities and their defaults.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    /// Capabilities in declaration order (index = id)
    capabilities: Vec<Capability>,

    /// Name → id
    by_name: HashMap<String, CapabilityId>,

    /// Defaults in registration order
    defaults: Vec<DefaultImpl>,

    /// Declaring member → indices into `defaults`
    default_index: HashMap<MemberKey, Vec<usize>>,

    /// Set once setup is over
    frozen: bool,
}

impl CapabilityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// End the setup phase. Every later mutating call fails with
    /// [`RegistryError::Frozen`].
    pub fn freeze(&mut self) {
        if !self.frozen {
            log::debug!(
                "Freezing capability registry ({} capabilities, {} defaults)",
                self.capabilities.len(),
                self.defaults.len()
            );
        }
        self.frozen = true;
    }

    /// Whether the registry is in its read-only phase.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Get the total number of registered capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    /// Declare a capability with its required members.
    pub fn declare_capability(
        &mut self,
        name: &str,
        required: Vec<MemberSignature>,
    ) -> Result<CapabilityId, RegistryError> {
        self.declare_refining(name, &[], required)
    }

    /// Declare a capability that refines earlier capabilities.
    ///
    /// The new capability inherits every member of the capabilities it
    /// refines, and conforming to it implies conforming to them.
    pub fn declare_refining(
        &mut self,
        name: &str,
        refines: &[CapabilityId],
        required: Vec<MemberSignature>,
    ) -> Result<CapabilityId, RegistryError> {
        self.ensure_writable()?;
        if self.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateCapability(name.to_string()));
        }
        for parent in refines {
            self.get(*parent)?;
        }

        {
            let mut seen: HashSet<&MemberSignature> = HashSet::new();
            let mut visited = HashSet::new();
            for parent in refines {
                for (_, member) in self.collect_members(*parent, &mut visited) {
                    seen.insert(&member.signature);
                }
            }
            for signature in &required {
                if !seen.insert(signature) {
                    return Err(RegistryError::DuplicateMember {
                        capability: name.to_string(),
                        member: signature.to_string(),
                    });
                }
            }
        }

        let id = CapabilityId(self.capabilities.len());
        let mut parents = Vec::with_capacity(refines.len());
        for parent in refines {
            if !parents.contains(parent) {
                parents.push(*parent);
            }
        }
        self.capabilities.push(Capability {
            id,
            name: name.to_string(),
            refines: parents,
            members: required
                .into_iter()
                .map(|signature| MemberDecl {
                    signature,
                    kind: MemberKind::Required,
                })
                .collect(),
        });
        self.by_name.insert(name.to_string(), id);
        log::debug!("Declared capability {} as {}", name, id);
        Ok(id)
    }

    /// Declare every capability of a YAML manifest.
    ///
    /// The manifest is validated in full first; if any declaration fails the
    /// registry is left untouched.
    pub fn declare_from_yaml(&mut self, yaml: &str) -> Result<Vec<CapabilityId>, RegistryError> {
        self.ensure_writable()?;
        let manifest = CapabilityManifest::from_yaml(yaml)?;

        let mut scratch = CapabilityRegistry {
            capabilities: self.capabilities.clone(),
            by_name: self.by_name.clone(),
            ..Default::default()
        };
        let mut ids = Vec::with_capacity(manifest.capabilities.len());
        for decl in manifest.capabilities {
            let refines = decl
                .refines
                .iter()
                .map(|parent| {
                    scratch
                        .capability_id(parent)
                        .ok_or_else(|| RegistryError::UnknownCapability(parent.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            ids.push(scratch.declare_refining(&decl.name, &refines, decl.members)?);
        }

        self.capabilities = scratch.capabilities;
        self.by_name = scratch.by_name;
        Ok(ids)
    }

    /// Declare every capability of a YAML manifest file.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<CapabilityId>, RegistryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let ids = self.declare_from_yaml(&content)?;
        log::debug!("Loaded {} capabilities from {}", ids.len(), path.display());
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Extensions and defaults
    // -----------------------------------------------------------------------

    /// Add an extension member to a capability together with its body.
    ///
    /// Extension members are never required of conforming values.
    pub fn extend(
        &mut self,
        capability: CapabilityId,
        signature: MemberSignature,
        body: MemberBody,
    ) -> Result<(), RegistryError> {
        self.ensure_writable()?;
        self.get(capability)?;
        // Capabilities refining this one inherit the new member too.
        let clash = self
            .capabilities
            .iter()
            .filter(|c| c.id == capability || self.refines(c.id, capability))
            .find(|c| self.declaring_capability(c.id, &signature).is_some());
        if let Some(clash) = clash {
            return Err(RegistryError::DuplicateMember {
                capability: clash.name.clone(),
                member: signature.to_string(),
            });
        }

        self.capabilities[capability.0].members.push(MemberDecl {
            signature: signature.clone(),
            kind: MemberKind::Extension,
        });
        self.push_default(
            ExtensionContext::unconditional(capability),
            capability,
            signature,
            body,
        );
        Ok(())
    }

    /// Provide the unconditional default for a member of `capability`.
    ///
    /// The member may be declared on the capability itself or on one it
    /// refines.
    pub fn provide_default(
        &mut self,
        capability: CapabilityId,
        signature: MemberSignature,
        body: MemberBody,
    ) -> Result<(), RegistryError> {
        self.insert_default(ExtensionContext::unconditional(capability), signature, body)
    }

    /// Provide a default for a member of `capability` that applies only when
    /// the value also has `companion`.
    pub fn provide_conditional_default(
        &mut self,
        capability: CapabilityId,
        companion: CapabilityId,
        signature: MemberSignature,
        body: MemberBody,
    ) -> Result<(), RegistryError> {
        self.ensure_writable()?;
        let cap = self.get(capability)?;
        self.get(companion)?;
        if capability == companion {
            return Err(RegistryError::InvalidCompanion(cap.name.clone()));
        }
        self.insert_default(
            ExtensionContext::conditional(capability, companion),
            signature,
            body,
        )
    }

    fn insert_default(
        &mut self,
        context: ExtensionContext,
        signature: MemberSignature,
        body: MemberBody,
    ) -> Result<(), RegistryError> {
        self.ensure_writable()?;
        let provider = self.get(context.provider)?;
        let declaring = self
            .declaring_capability(context.provider, &signature)
            .ok_or_else(|| RegistryError::UnknownMember {
                capability: provider.name.clone(),
                member: signature.to_string(),
            })?;

        if self
            .defaults_for(declaring, &signature)
            .any(|existing| existing.context == context)
        {
            return Err(RegistryError::DuplicateDefault {
                provider: self.describe_context(&context),
                member: signature.to_string(),
            });
        }

        self.push_default(context, declaring, signature, body);
        Ok(())
    }

    fn push_default(
        &mut self,
        context: ExtensionContext,
        declaring: CapabilityId,
        signature: MemberSignature,
        body: MemberBody,
    ) {
        log::debug!(
            "Registered default {} in {}",
            signature,
            self.describe_context(&context)
        );
        let key = MemberKey {
            capability: declaring,
            signature: signature.clone(),
        };
        self.default_index
            .entry(key)
            .or_default()
            .push(self.defaults.len());
        self.defaults.push(DefaultImpl {
            context,
            declaring,
            signature,
            body,
        });
    }

    fn ensure_writable(&self) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Look up a capability by id.
    pub fn lookup(&self, capability: CapabilityId) -> Option<&Capability> {
        self.capabilities.get(capability.0)
    }

    /// Conditional defaults provided by `capability`, in registration order.
    pub fn lookup_conditional(&self, capability: CapabilityId) -> Vec<&ConditionalDefault> {
        self.defaults
            .iter()
            .filter(|d| d.context.provider == capability && d.is_conditional())
            .collect()
    }

    /// Look up a capability id by name.
    pub fn capability_id(&self, name: &str) -> Option<CapabilityId> {
        self.by_name.get(name).copied()
    }

    /// Name of a capability, or its id rendered when unknown.
    pub fn name_of(&self, capability: CapabilityId) -> String {
        self.lookup(capability)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| capability.to_string())
    }

    /// List all registered capabilities in declaration order.
    pub fn list(&self) -> Vec<&Capability> {
        self.capabilities.iter().collect()
    }

    /// All capabilities `capability` refines, transitively, nearest first.
    pub fn ancestors(&self, capability: CapabilityId) -> Vec<CapabilityId> {
        let mut out = Vec::new();
        let mut stack: Vec<CapabilityId> = match self.lookup(capability) {
            Some(cap) => cap.refines.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            if out.contains(&next) {
                continue;
            }
            out.push(next);
            if let Some(cap) = self.lookup(next) {
                stack.extend(cap.refines.iter().rev().copied());
            }
        }
        out
    }

    /// Whether `capability` refines `ancestor` (directly or transitively).
    pub fn refines(&self, capability: CapabilityId, ancestor: CapabilityId) -> bool {
        self.ancestors(capability).contains(&ancestor)
    }

    /// Every member of `capability`: its own first, then inherited ones.
    pub fn effective_members(&self, capability: CapabilityId) -> Vec<(CapabilityId, &MemberDecl)> {
        let mut visited = HashSet::new();
        self.collect_members(capability, &mut visited)
    }

    /// The capability that declares `signature` as seen from `capability`.
    pub fn declaring_capability(
        &self,
        capability: CapabilityId,
        signature: &MemberSignature,
    ) -> Option<CapabilityId> {
        self.effective_members(capability)
            .into_iter()
            .find(|(_, member)| &member.signature == signature)
            .map(|(owner, _)| owner)
    }

    /// Find a member of `capability` by name and arity.
    pub fn member_named(
        &self,
        capability: CapabilityId,
        name: &str,
        arity: usize,
    ) -> Option<&MemberSignature> {
        self.effective_members(capability)
            .into_iter()
            .map(|(_, member)| &member.signature)
            .find(|signature| signature.name == name && signature.arity() == arity)
    }

    /// Defaults registered for a member, keyed by its declaring capability.
    pub(crate) fn defaults_for<'a>(
        &'a self,
        declaring: CapabilityId,
        signature: &MemberSignature,
    ) -> impl Iterator<Item = &'a DefaultImpl> + 'a {
        let key = MemberKey {
            capability: declaring,
            signature: signature.clone(),
        };
        self.default_index
            .get(&key)
            .into_iter()
            .flatten()
            .map(move |&i| &self.defaults[i])
    }

    /// Human-readable extension context, e.g. `Record where Tieable`.
    pub fn describe_context(&self, context: &ExtensionContext) -> String {
        match context.companion {
            Some(companion) => format!(
                "{} where {}",
                self.name_of(context.provider),
                self.name_of(companion)
            ),
            None => self.name_of(context.provider),
        }
    }

    fn get(&self, capability: CapabilityId) -> Result<&Capability, RegistryError> {
        self.lookup(capability)
            .ok_or_else(|| RegistryError::UnknownCapability(capability.to_string()))
    }

    fn collect_members<'a>(
        &'a self,
        capability: CapabilityId,
        visited: &mut HashSet<CapabilityId>,
    ) -> Vec<(CapabilityId, &'a MemberDecl)> {
        let mut out = Vec::new();
        if !visited.insert(capability) {
            return out;
        }
        let Some(cap) = self.lookup(capability) else {
            return out;
        };
        out.extend(cap.members.iter().map(|m| (capability, m)));
        for parent in &cap.refines {
            out.extend(self.collect_members(*parent, visited));
        }
        out
    }
}
