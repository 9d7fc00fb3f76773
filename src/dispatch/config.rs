//! Dispatcher configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a [`Dispatcher`](super::Dispatcher).
///
/// Example YAML:
/// ```yaml
/// max_call_depth: 32
/// check_arguments: true
/// check_returns: false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum nesting of member calls made from bodies.
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,

    /// Check argument count and kinds against the member signature.
    #[serde(default = "default_true")]
    pub check_arguments: bool,

    /// Check the kind of every returned value against the member signature.
    #[serde(default = "default_true")]
    pub check_returns: bool,
}

fn default_max_call_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_call_depth: default_max_call_depth(),
            check_arguments: true,
            check_returns: true,
        }
    }
}

impl DispatchConfig {
    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Set the maximum call depth.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}
