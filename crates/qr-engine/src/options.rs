use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How an `enableWhen.question` reference is resolved when several nodes
/// share the linkId (repeating groups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceResolution {
    /// The candidate sharing the closest ancestor with the referring node,
    /// so a condition inside a group instance reads that same instance.
    #[default]
    Nearest,
    /// Always the first registered node.
    First,
}

/// Policies applied by a [`crate::FormStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FormOptions {
    /// Report issues of disabled nodes from `validate_all` and `issues`.
    #[serde(default)]
    pub validate_disabled: bool,
    /// Serialize disabled nodes that still hold answers.
    #[serde(default)]
    pub include_disabled_in_response: bool,
    #[serde(default)]
    pub reference_resolution: ReferenceResolution,
    /// Upper bound on recalculation passes after a mutation.
    #[serde(default = "default_calculation_passes")]
    pub max_calculation_passes: usize,
}

fn default_calculation_passes() -> usize {
    8
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_disabled: false,
            include_disabled_in_response: false,
            reference_resolution: ReferenceResolution::default(),
            max_calculation_passes: default_calculation_passes(),
        }
    }
}
