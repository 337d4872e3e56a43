use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vst3_host::{ClassDescriptor, ClassId};

use crate::outcome::Outcome;
use crate::registry::Suite;
use crate::report::ClassSummary;

/// Everything a reporting sink is told about a run.
///
/// Serialized as one self-describing object whose `event` field names the
/// variant, e.g. `{"event":"caseEnded","name":"state.round-trip",...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    RunStarted {
        path: PathBuf,
        seed: u64,
    },
    ClassListed {
        class: ClassDescriptor,
    },
    ClassStarted {
        class: ClassDescriptor,
    },
    CaseStarted {
        name: String,
        suite: Suite,
    },
    Info {
        message: String,
    },
    /// A problem on the host side of a case. Never dropped by `--quiet`.
    Warning {
        message: String,
    },
    CaseEnded {
        name: String,
        outcome: Outcome,
        elapsed_ms: u64,
        /// Slowest single `process` call of the case, if it processed audio.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slowest_process_us: Option<u64>,
    },
    ClassEnded {
        class_id: ClassId,
        name: String,
        summary: ClassSummary,
    },
    RunEnded {
        summary: String,
        exit_code: i32,
        totals: ClassSummary,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "runStarted",
            Self::ClassListed { .. } => "classListed",
            Self::ClassStarted { .. } => "classStarted",
            Self::CaseStarted { .. } => "caseStarted",
            Self::Info { .. } => "info",
            Self::Warning { .. } => "warning",
            Self::CaseEnded { .. } => "caseEnded",
            Self::ClassEnded { .. } => "classEnded",
            Self::RunEnded { .. } => "runEnded",
        }
    }

    /// The same event with wall-clock measurements cleared.
    pub fn without_timing(&self) -> Event {
        match self {
            Self::CaseEnded { name, outcome, .. } => Self::CaseEnded {
                name: name.clone(),
                outcome: outcome.clone(),
                elapsed_ms: 0,
                slowest_process_us: None,
            },
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn events_are_tagged_in_camel_case() {
        let event = Event::RunEnded {
            summary: "loader-error: file-not-found".into(),
            exit_code: 3,
            totals: ClassSummary::default(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "runEnded");
        assert_eq!(json["summary"], "loader-error: file-not-found");
        assert_eq!(json["exit_code"], 3);
    }

    #[test]
    fn case_outcomes_nest_with_their_status() {
        let event = Event::CaseEnded {
            name: "identity.class-id".into(),
            outcome: Outcome::Passed,
            elapsed_ms: 4,
            slowest_process_us: None,
        };
        let line = serde_json::to_string(&event).unwrap();
        assert_eq!(
            line,
            r#"{"event":"caseEnded","name":"identity.class-id","outcome":{"status":"passed"},"elapsed_ms":4}"#
        );
        let parsed: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, event);
    }
}
