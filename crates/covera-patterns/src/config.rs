//! Engine configuration.

/// Tunables for the exhaustiveness engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExhaustivenessConfig {
    /// Primitive type patterns: `int` is unconditional for `Integer` and
    /// `Integer` for `int`
    pub primitive_patterns: bool,

    /// Widen stalled record pattern sets along direct sealed paths once per
    /// reduction loop
    pub unwrap_sealed_types: bool,

    /// Passes per reduction loop before the query is abandoned (default: 5000)
    pub max_iterations: usize,

    /// Nesting depth of component reductions (default: 32)
    pub max_depth: usize,

    /// Largest reduced record pattern set the synthesizer works on (default: 100)
    pub max_record_patterns: usize,

    /// Missing branches reported before giving up or truncating (default: 10)
    pub max_generated_branches: usize,

    /// Specializations per usefulness search before the query is abandoned
    /// (default: 100000)
    pub max_usefulness_steps: usize,
}

impl Default for ExhaustivenessConfig {
    fn default() -> Self {
        Self {
            primitive_patterns: true,
            unwrap_sealed_types: true,
            max_iterations: 5_000,
            max_depth: 32,
            max_record_patterns: 100,
            max_generated_branches: 10,
            max_usefulness_steps: 100_000,
        }
    }
}

impl ExhaustivenessConfig {
    /// Language level without primitive patterns and without the sealed
    /// unwrapping step.
    pub fn legacy() -> Self {
        Self {
            primitive_patterns: false,
            unwrap_sealed_types: false,
            ..Default::default()
        }
    }

    /// Builder-style override of the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}
