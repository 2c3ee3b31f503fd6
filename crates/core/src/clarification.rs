// SPDX-License-Identifier: MIT

//! Clarifications: durable questions raised against a project, protocol,
//! or step. Blocking clarifications hold their step in `blocked`.

use crate::project::ProjectId;
use crate::protocol::{ProtocolRunId, StepRunId};
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_row_id! {
    /// Unique identifier for a clarification.
    pub struct ClarificationId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationStatus {
    Open,
    Answered,
    Dismissed,
}

impl fmt::Display for ClarificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClarificationStatus::Open => write!(f, "open"),
            ClarificationStatus::Answered => write!(f, "answered"),
            ClarificationStatus::Dismissed => write!(f, "dismissed"),
        }
    }
}

/// A durable question/answer pair, unique by `(scope, key)`.
///
/// Upserting an open clarification refreshes its question and options
/// rather than creating a duplicate row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clarification {
    pub id: ClarificationId,
    pub scope: String,
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_run_id: Option<ProtocolRunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_run_id: Option<StepRunId>,
    pub key: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    pub applies_to: String,
    pub blocking: bool,
    pub status: ClarificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_by: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Clarification {
    pub fn is_open(&self) -> bool {
        self.status == ClarificationStatus::Open
    }

    /// `answered` implies a non-null answer and answerer.
    pub fn invariant_holds(&self) -> bool {
        self.status != ClarificationStatus::Answered
            || (self.answer.is_some() && self.answered_by.is_some())
    }
}

#[cfg(test)]
#[path = "clarification_tests.rs"]
mod tests;
