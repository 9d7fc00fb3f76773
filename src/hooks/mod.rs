//! Dispatch hooks for observing resolution and invocation.
//!
//! # Design Principles
//!
//! - All methods have default no-op implementations → implementors pick what they need.
//! - `&self` receivers → hooks are shared-immutable, interior mutability via atomics/locks.
//! - `Send + Sync + 'static` bounds → hooks can be registered once on a dispatcher
//!   that is shared across threads.
//!
//! Hooks observe; they cannot change which body binds or what it returns.

use serde_json::Value;

use crate::capabilities::{CapabilityId, MemberSignature};
use crate::dispatch::DispatchError;
use crate::resolver::{Binding, ResolutionError};
use crate::values::ValueDescriptor;

/// Hook trait for observing member dispatch.
///
/// Called for top-level invocations and for every nested call a body makes.
///
/// # Example
///
/// ```ignore
/// struct CountingHook(AtomicUsize);
///
/// impl DispatchHook for CountingHook {
///     fn on_resolved(&self, _value: &ValueDescriptor, _binding: &Binding) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait DispatchHook: Send + Sync + 'static {
    /// Called once a body has been bound, before it runs.
    fn on_resolved(&self, _value: &ValueDescriptor, _binding: &Binding) {}

    /// Called when resolution fails.
    fn on_unresolved(
        &self,
        _value: &ValueDescriptor,
        _capability: Option<CapabilityId>,
        _signature: &MemberSignature,
        _error: &ResolutionError,
    ) {
    }

    /// Called after a bound body returns (success or failure).
    fn after_invoke(
        &self,
        _value: &ValueDescriptor,
        _binding: &Binding,
        _result: &Result<Value, DispatchError>,
    ) {
    }
}
