//! Execution modes and turn outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How hard the agent works on a turn: each mode fixes a step ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Fast,
    #[default]
    Balanced,
    Deep,
}

impl ExecutionMode {
    pub const ALL: [ExecutionMode; 3] = [Self::Fast, Self::Balanced, Self::Deep];

    /// Maximum provider round-trips per turn.
    pub fn max_steps(self) -> u32 {
        match self {
            Self::Fast => 8,
            Self::Balanced => 15,
            Self::Deep => 24,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Balanced => "balanced",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "deep" => Ok(Self::Deep),
            other => Err(format!("unknown build mode: {other} (expected fast / balanced / deep)")),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model answered with plain content.
    Done,
    /// The cancel flag was observed mid-stream.
    Cancelled,
    /// Every step requested tools; the ceiling was hit.
    StepLimitReached,
    /// The provider failed; the turn was abandoned.
    Error(String),
}

impl TurnOutcome {
    /// Reason string recorded in `runtime.finished` and replay summaries.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Done => "stop",
            Self::Cancelled => "cancelled",
            Self::StepLimitReached => "step_limit",
            Self::Error(_) => "error",
        }
    }
}

/// Result of one user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReport {
    #[serde(flatten)]
    pub outcome: TurnOutcome,
    /// Provider round-trips performed.
    pub steps: u32,
}
