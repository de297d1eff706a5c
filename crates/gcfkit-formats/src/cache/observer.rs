//! Parse progress and advisory reporting
//!
//! Parsing reports to an injected [`ParseObserver`] instead of a global
//! logger. Advisories are problems that real archives are known to have
//! and that do not stop the parse.

use std::fmt;

use tracing::{debug, warn};

use super::error::ParseStage;

/// Receives parse progress
pub trait ParseObserver {
    /// A stage finished and validated
    fn stage_completed(&mut self, stage: ParseStage) {
        let _ = stage;
    }

    /// A non-fatal problem was found
    fn advisory(&mut self, stage: ParseStage, message: &str) {
        let _ = (stage, message);
    }
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ParseObserver for TracingObserver {
    fn stage_completed(&mut self, stage: ParseStage) {
        debug!("Parsed {stage}");
    }

    fn advisory(&mut self, stage: ParseStage, message: &str) {
        warn!("{stage}: {message}");
    }
}

/// Non-fatal problem recorded during a parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    /// Stage that reported it
    pub stage: ParseStage,
    /// Description
    pub message: String,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// Records stages and advisories for later inspection
#[derive(Debug, Default, Clone)]
pub struct CollectingObserver {
    /// Completed stages in order
    pub stages: Vec<ParseStage>,
    /// Advisories in order
    pub advisories: Vec<Advisory>,
}

impl CollectingObserver {
    /// Create an empty observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any advisory came from `stage`
    pub fn has_advisory(&self, stage: ParseStage) -> bool {
        self.advisories.iter().any(|a| a.stage == stage)
    }
}

impl ParseObserver for CollectingObserver {
    fn stage_completed(&mut self, stage: ParseStage) {
        self.stages.push(stage);
    }

    fn advisory(&mut self, stage: ParseStage, message: &str) {
        self.advisories.push(Advisory {
            stage,
            message: message.to_string(),
        });
    }
}
