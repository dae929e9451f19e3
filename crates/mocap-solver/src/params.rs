use serde::{Deserialize, Serialize};

/// What to do when nodes recorded different numbers of frames.
///
/// Fusion always stops at the shortest node; this only controls whether the
/// frames dropped from longer nodes are reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameCountPolicy {
    Truncate,
    #[default]
    Warn,
}

fn default_parallel_epsilon() -> f64 {
    1e-12
}

/// Configuration for [`crate::TriangulationSolver`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverParams {
    /// Squared cross-product norm of two unit ray directions at or below which
    /// the rays are treated as parallel.
    #[serde(default = "default_parallel_epsilon")]
    pub parallel_epsilon: f64,
    #[serde(default)]
    pub frame_count_policy: FrameCountPolicy,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            parallel_epsilon: default_parallel_epsilon(),
            frame_count_policy: FrameCountPolicy::default(),
        }
    }
}
