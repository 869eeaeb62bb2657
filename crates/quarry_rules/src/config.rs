//! Rule compilation and iteration settings.

use quarry_foundation::MAX_VARS;

/// Configuration for compiling and running a rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleConfig {
    /// Resolve a term's first id through its `IsA` subtypes.
    pub inherit_components: bool,

    /// Count fresh and redo executions per instruction.
    pub profile: bool,

    /// Emit a trace event for every VM step.
    pub trace_steps: bool,

    /// Maximum number of variable slots (capped at 64).
    pub max_variables: usize,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            inherit_components: true,
            profile: false,
            trace_steps: false,
            max_variables: MAX_VARS,
        }
    }
}

impl RuleConfig {
    /// Creates a configuration for debugging: profiling and step tracing enabled.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            profile: true,
            trace_steps: true,
            ..Self::default()
        }
    }

    /// Builder method to set component inheritance.
    #[must_use]
    pub fn with_inherit_components(mut self, inherit: bool) -> Self {
        self.inherit_components = inherit;
        self
    }

    /// Builder method to set profiling.
    #[must_use]
    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    /// Builder method to set step tracing.
    #[must_use]
    pub fn with_trace_steps(mut self, trace: bool) -> Self {
        self.trace_steps = trace;
        self
    }

    /// Builder method to set the variable limit. Values above 64 are clamped.
    #[must_use]
    pub fn with_max_variables(mut self, max: usize) -> Self {
        self.max_variables = max.min(MAX_VARS);
        self
    }
}
