use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::selector::Role;

/// Failures raised by a [`Page`](crate::page::Page) implementation.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("element is no longer attached to the document")]
    Detached,

    #[error("invalid selector \"{selector}\": {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("script evaluation failed: {0}")]
    Script(String),
}

/// Funnel stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Venue,
    Product,
    Date,
    Time,
    Submit,
    Scan,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Venue => "venue",
            Self::Product => "product",
            Self::Date => "date",
            Self::Time => "time",
            Self::Submit => "submit",
            Self::Scan => "scan",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid booking request: {0}")]
    InvalidRequest(String),

    #[error("no {role} found after trying {} candidate(s): [{}]{}", .candidates.len(), .candidates.join(", "), seen_suffix(.seen))]
    ElementNotFound {
        role: Role,
        candidates: Vec<String>,
        /// Labels actually present on the page, for selector maintenance.
        seen: Vec<String>,
    },

    #[error("could not click {target} after {attempts} attempt(s)")]
    ClickFailed { target: String, attempts: u32 },

    #[error("timed out after {timeout:?} waiting for {what}")]
    NavigationTimeout { what: String, timeout: Duration },

    #[error("consent overlay could not be dismissed: {0}")]
    ConsentDismissFailure(String),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<EngineError>,
    },

    #[error(transparent)]
    Page(#[from] PageError),
}

impl EngineError {
    /// Tags the error with the stage it aborted. Already-tagged errors keep their original tag.
    pub fn at(self, stage: Stage) -> Self {
        match self {
            tagged @ Self::Stage { .. } => tagged,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, with stage tags peeled off.
    pub fn root(&self) -> &EngineError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

fn seen_suffix(seen: &[String]) -> String {
    if seen.is_empty() {
        String::new()
    } else {
        format!("; seen: [{}]", seen.join(", "))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
