use std::time::Duration;

use serde::{Deserialize, Serialize};
use vst3_host::ClassDescriptor;

use crate::outcome::Outcome;
use crate::registry::Suite;

/// Outcome counts of one class or of a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub passed: usize,
    pub warnings: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ClassSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Passed => self.passed += 1,
            Outcome::Warning { .. } => self.warnings += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &ClassSummary) {
        self.passed += other.passed;
        self.warnings += other.warnings;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.passed + self.warnings + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub name: String,
    pub suite: Suite,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassReport {
    pub class: ClassDescriptor,
    pub cases: Vec<CaseRecord>,
}

impl ClassReport {
    pub fn new(class: ClassDescriptor) -> Self {
        Self {
            class,
            cases: Vec::new(),
        }
    }

    pub fn summary(&self) -> ClassSummary {
        let mut summary = ClassSummary::default();
        for case in &self.cases {
            summary.record(&case.outcome);
        }
        summary
    }

    pub fn passed(&self) -> bool {
        self.cases.iter().all(|case| !case.outcome.is_failure())
    }

    pub fn outcome(&self, case: &str) -> Option<&Outcome> {
        self.cases
            .iter()
            .find(|record| record.name == case)
            .map(|record| &record.outcome)
    }
}

/// Everything a run produced, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub classes: Vec<ClassReport>,
    pub interrupted: bool,
}

impl Report {
    pub fn totals(&self) -> ClassSummary {
        let mut totals = ClassSummary::default();
        for class in &self.classes {
            totals.merge(&class.summary());
        }
        totals
    }

    /// True iff no case failed. Warnings and skips pass.
    pub fn passed(&self) -> bool {
        self.classes.iter().all(ClassReport::passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use pretty_assertions::assert_eq;
    use vst3_host::ClassId;

    fn record(name: &str, outcome: Outcome) -> CaseRecord {
        CaseRecord {
            name: name.into(),
            suite: Suite::Identity,
            outcome,
            elapsed: Duration::from_millis(1),
        }
    }

    #[test]
    fn warnings_and_skips_still_pass() {
        let descriptor = ClassDescriptor::basic(ClassId([1; 16]), "Audio Module Class", "Gain");
        let mut class = ClassReport::new(descriptor);
        class.cases.push(record("identity.class-id", Outcome::Passed));
        class.cases.push(record("identity.metadata", Outcome::warning("no version")));
        class.cases.push(record("bypass.passthrough", Outcome::skipped("not an effect")));
        let report = Report {
            classes: vec![class],
            interrupted: false,
        };
        assert!(report.passed());
        assert_eq!(
            report.totals(),
            ClassSummary {
                passed: 1,
                warnings: 1,
                skipped: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn one_failure_fails_the_report() {
        let descriptor = ClassDescriptor::basic(ClassId([2; 16]), "Audio Module Class", "Gain");
        let mut class = ClassReport::new(descriptor);
        class
            .cases
            .push(record("identity.class-id", Outcome::failed(FailureKind::Contract, "nil id")));
        assert!(!class.passed());
        assert_eq!(class.summary().failed, 1);
        assert!(class.outcome("identity.class-id").is_some_and(Outcome::is_failure));
    }
}
