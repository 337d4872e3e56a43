use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vst3_host::ClassDescriptor;

use crate::cases;
use crate::context::{CaseContext, CaseResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Suite {
    Identity,
    StateMachine,
    Bus,
    Parameters,
    Processing,
    Tail,
    State,
    Threading,
    Bypass,
}

impl Suite {
    pub const ALL: [Suite; 9] = [
        Suite::Identity,
        Suite::StateMachine,
        Suite::Bus,
        Suite::Parameters,
        Suite::Processing,
        Suite::Tail,
        Suite::State,
        Suite::Threading,
        Suite::Bypass,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::StateMachine => "state-machine",
            Self::Bus => "bus",
            Self::Parameters => "parameters",
            Self::Processing => "processing",
            Self::Tail => "tail",
            Self::State => "state",
            Self::Threading => "threading",
            Self::Bypass => "bypass",
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Suite {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Suite::ALL
            .into_iter()
            .find(|suite| suite.name() == value.trim())
            .ok_or_else(|| {
                let known: Vec<_> = Suite::ALL.iter().map(|suite| suite.name()).collect();
                format!("unknown suite `{value}` (expected one of {})", known.join(", "))
            })
    }
}

/// Lifecycle state a case's primary instance is brought to before its body runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Created,
    Initialized,
    /// Initialized, arrangements kept and processing set up at 48 kHz / 512.
    Setup,
}

/// Decides whether a case applies to a class; `Err` carries the skip reason.
pub type Applies = fn(&ClassDescriptor) -> Result<(), String>;

pub type CaseFn = Arc<dyn Fn(&mut CaseContext) -> CaseResult + Send + Sync>;

#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    pub suite: Suite,
    pub stage: Stage,
    pub applies: Applies,
    pub run: CaseFn,
}

impl TestCase {
    pub fn new(
        name: impl Into<String>,
        suite: Suite,
        stage: Stage,
        applies: Applies,
        run: impl Fn(&mut CaseContext) -> CaseResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            suite,
            stage,
            applies,
            run: Arc::new(run),
        }
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("suite", &self.suite)
            .field("stage", &self.stage)
            .finish()
    }
}

pub fn all_classes(_: &ClassDescriptor) -> Result<(), String> {
    Ok(())
}

/// Ordered collection of cases. Declaration order is execution order.
#[derive(Debug, Clone)]
pub struct Registry {
    cases: Vec<TestCase>,
}

impl Registry {
    pub fn standard() -> Self {
        let mut cases = Vec::new();
        cases.extend(cases::identity::cases());
        cases.extend(cases::state_machine::cases());
        cases.extend(cases::bus::cases());
        cases.extend(cases::parameters::cases());
        cases.extend(cases::processing::cases());
        cases.extend(cases::tail::cases());
        cases.extend(cases::state::cases());
        cases.extend(cases::threading::cases());
        cases.extend(cases::bypass::cases());
        Self { cases }
    }

    pub fn from_cases(cases: Vec<TestCase>) -> Self {
        Self { cases }
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Cases of the given suites in registry order; every case when `suites` is empty.
    pub fn select(&self, suites: &[Suite]) -> Vec<&TestCase> {
        self.cases
            .iter()
            .filter(|case| suites.is_empty() || suites.contains(&case.suite))
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|case| case.name == name)
    }
}
