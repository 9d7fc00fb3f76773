//! Capability declarations: the named contracts values conform to.
//!
//! A capability declares:
//! - Which members a conforming value must provide (requirements)
//! - Which members an extension adds with a body (extension members)
//! - Which earlier capabilities it refines
//!
//! Capabilities can be declared programmatically through the
//! [`CapabilityRegistry`](super::registry::CapabilityRegistry) or loaded from a
//! YAML manifest.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::{DispatchError, Receiver};

/// Stable identifier of a registered capability.
///
/// Ids are assigned in declaration order and never reused; the registry has
/// no removal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CapabilityId(pub(crate) usize);

impl CapabilityId {
    /// Position of the capability in declaration order.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The body of a member implementation.
///
/// Bodies receive a [`Receiver`] (the value plus the context the body was
/// written in) and the call arguments.
pub type MemberBody =
    Arc<dyn Fn(&Receiver<'_>, &[Value]) -> Result<Value, DispatchError> + Send + Sync>;

/// Wrap a closure as a [`MemberBody`].
pub fn body<F>(f: F) -> MemberBody
where
    F: Fn(&Receiver<'_>, &[Value]) -> Result<Value, DispatchError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Kinds of values accepted as parameters or produced as results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Any JSON value
    #[default]
    Any,
    /// `null`
    Unit,
    Bool,
    /// Integral number
    Int,
    /// Any number (integers widen)
    Float,
    String,
    List,
    Map,
}

impl ValueKind {
    /// Check whether a value has this kind.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueKind::Any => true,
            ValueKind::Unit => value.is_null(),
            ValueKind::Bool => value.is_boolean(),
            ValueKind::Int => value.is_i64() || value.is_u64(),
            ValueKind::Float => value.is_number(),
            ValueKind::String => value.is_string(),
            ValueKind::List => value.is_array(),
            ValueKind::Map => value.is_object(),
        }
    }

    /// Kind of a concrete value (integers report `Int`).
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Unit,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(n) if n.is_f64() => ValueKind::Float,
            Value::Number(_) => ValueKind::Int,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::List,
            Value::Object(_) => ValueKind::Map,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Any => "any",
            ValueKind::Unit => "unit",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        };
        f.write_str(name)
    }
}

/// A member signature: name, parameter kinds and return kind.
///
/// Two signatures are the same member only if all three agree, so a
/// capability may overload a name by arity or parameter kinds.
///
/// Example YAML:
/// ```yaml
/// name: "winningPercent"
/// params: []
/// returns: float
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberSignature {
    /// Member name
    pub name: String,

    /// Parameter kinds, in call order
    #[serde(default)]
    pub params: Vec<ValueKind>,

    /// Result kind
    #[serde(default)]
    pub returns: ValueKind,
}

impl MemberSignature {
    /// A signature with the given name and no parameters, returning `any`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: ValueKind::Any,
        }
    }

    /// A zero-argument getter returning `returns` (a `{ get }` property).
    pub fn getter(name: impl Into<String>, returns: ValueKind) -> Self {
        Self::new(name).returning(returns)
    }

    /// Set the parameter kinds.
    pub fn with_params(mut self, params: Vec<ValueKind>) -> Self {
        self.params = params;
        self
    }

    /// Set the return kind.
    pub fn returning(mut self, returns: ValueKind) -> Self {
        self.returns = returns;
        self
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for MemberSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, kind) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", kind)?;
        }
        write!(f, ") -> {}", self.returns)
    }
}

/// How a member entered a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    /// Declared as a requirement; conforming values must satisfy it.
    Required,
    /// Added by an extension together with its body; never required.
    Extension,
}

/// A member declared on a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDecl {
    pub signature: MemberSignature,
    pub kind: MemberKind,
}

impl MemberDecl {
    pub fn is_required(&self) -> bool {
        self.kind == MemberKind::Required
    }
}

/// A registered capability.
#[derive(Debug, Clone)]
pub struct Capability {
    /// Registry-assigned id
    pub id: CapabilityId,

    /// Unique name (e.g., "Record")
    pub name: String,

    /// Capabilities this one refines, in declaration order
    pub refines: Vec<CapabilityId>,

    /// Members declared directly on this capability
    pub members: Vec<MemberDecl>,
}

impl Capability {
    /// Required members declared directly on this capability.
    pub fn required(&self) -> impl Iterator<Item = &MemberSignature> {
        self.members
            .iter()
            .filter(|m| m.is_required())
            .map(|m| &m.signature)
    }

    /// Look up a directly declared member by exact signature.
    pub fn member(&self, signature: &MemberSignature) -> Option<&MemberDecl> {
        self.members.iter().find(|m| &m.signature == signature)
    }

    /// Whether this capability declares the signature directly.
    pub fn declares(&self, signature: &MemberSignature) -> bool {
        self.member(signature).is_some()
    }
}

/// A capability declaration as written in a YAML manifest.
///
/// Example YAML:
/// ```yaml
/// capabilities:
///   - name: "Describable"
///     members:
///       - name: "description"
///         returns: string
///   - name: "Record"
///     refines: ["Describable"]
///     members:
///       - name: "wins"
///         returns: int
///       - name: "losses"
///         returns: int
///       - name: "winningPercent"
///         returns: float
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDecl {
    /// Unique capability name
    pub name: String,

    /// Names of capabilities this one refines (must already be declared,
    /// or appear earlier in the same manifest)
    #[serde(default)]
    pub refines: Vec<String>,

    /// Required member signatures
    #[serde(default)]
    pub members: Vec<MemberSignature>,
}

/// Wrapper for YAML manifests (declarations are nested under `capabilities:`)
#[derive(Debug, Deserialize)]
pub(crate) struct CapabilityManifest {
    pub capabilities: Vec<CapabilityDecl>,
}

impl CapabilityManifest {
    pub(crate) fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}
