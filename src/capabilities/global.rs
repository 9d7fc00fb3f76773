//! Process-wide capability registry.
//!
//! Hosts that populate their capabilities once at startup can publish the
//! frozen registry here instead of threading an `Arc` through every layer.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::error::RegistryError;
use super::registry::CapabilityRegistry;

static GLOBAL_REGISTRY: OnceCell<Arc<CapabilityRegistry>> = OnceCell::new();

/// Freeze `registry` and install it as the process-wide registry.
///
/// Fails with [`RegistryError::AlreadyInstalled`] if a registry was
/// installed before; the existing one is kept.
pub fn install(mut registry: CapabilityRegistry) -> Result<Arc<CapabilityRegistry>, RegistryError> {
    registry.freeze();
    let shared = Arc::new(registry);
    GLOBAL_REGISTRY
        .set(Arc::clone(&shared))
        .map_err(|_| RegistryError::AlreadyInstalled)?;
    log::info!("Installed global capability registry ({} capabilities)", shared.len());
    Ok(shared)
}

/// The process-wide registry, if one was installed.
pub fn global() -> Option<Arc<CapabilityRegistry>> {
    GLOBAL_REGISTRY.get().cloned()
}
