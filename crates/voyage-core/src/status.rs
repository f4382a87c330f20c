//! Operation status and step direction, persisted as plain text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an operation row. Stored as TEXT in `flight.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Queued,
    Running,
    Waiting,
    Ready,
    Success,
    Error,
    Fatal,
    ReadyToRestart,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Waiting => "WAITING",
            Self::Ready => "READY",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::ReadyToRestart => "READY_TO_RESTART",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(Self::Queued),
            "RUNNING" => Ok(Self::Running),
            "WAITING" => Ok(Self::Waiting),
            "READY" => Ok(Self::Ready),
            "SUCCESS" => Ok(Self::Success),
            "ERROR" => Ok(Self::Error),
            "FATAL" => Ok(Self::Fatal),
            "READY_TO_RESTART" => Ok(Self::ReadyToRestart),
            other => Err(format!("unknown operation status `{other}`")),
        }
    }
}

/// Direction of travel through an operation's step list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Do,
    Undo,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Do => "DO",
            Self::Undo => "UNDO",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DO" => Ok(Self::Do),
            "UNDO" => Ok(Self::Undo),
            other => Err(format!("unknown direction `{other}`")),
        }
    }
}
