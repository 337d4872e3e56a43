use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use tracing::debug;
use vst3_host::{
    ClassDescriptor, ComponentInstance, Controller, FactoryInspector, ProcessMode, ProcessSetup,
    Ticket,
};

use crate::config::ValidatorConfig;
use crate::error::{Failure, FailureKind};
use crate::outcome::Outcome;
use crate::registry::Stage;

pub type CaseResult = Result<(), Failure>;

/// Rate and block size of the `Setup` stage.
pub const SETUP_RATE: f64 = 48_000.0;
pub const SETUP_BLOCK: usize = 512;

/// What a finished case hands back to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseReport {
    pub outcome: Outcome,
    pub notes: Vec<String>,
    /// Host-side problems found while settling the case, such as instances
    /// left behind on a detached worker.
    pub warnings: Vec<String>,
    pub slowest_process: Option<Duration>,
}

impl CaseReport {
    pub fn from_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            notes: Vec::new(),
            warnings: Vec::new(),
            slowest_process: None,
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::from_outcome(Outcome::failed(kind, message))
    }
}

/// Everything one case may touch: its class, the factory, a seeded RNG and
/// the instances it creates.
///
/// Every instance is registered in `tickets` so the driver can settle it when
/// the case never returns.
pub struct CaseContext {
    class: ClassDescriptor,
    inspector: Arc<FactoryInspector>,
    config: ValidatorConfig,
    rng: StdRng,
    tickets: Arc<Mutex<Vec<Ticket>>>,
    instance: Option<ComponentInstance>,
    notes: Vec<String>,
    warnings: Vec<String>,
    skipped: Option<String>,
    slowest_process: Option<Duration>,
}

impl CaseContext {
    pub fn new(
        class: ClassDescriptor,
        inspector: Arc<FactoryInspector>,
        config: ValidatorConfig,
        rng: StdRng,
        tickets: Arc<Mutex<Vec<Ticket>>>,
    ) -> Self {
        Self {
            class,
            inspector,
            config,
            rng,
            tickets,
            instance: None,
            notes: Vec::new(),
            warnings: Vec::new(),
            skipped: None,
            slowest_process: None,
        }
    }

    pub fn class(&self) -> &ClassDescriptor {
        &self.class
    }

    pub fn inspector(&self) -> &FactoryInspector {
        &self.inspector
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// A new instance of the class in state `Created`.
    pub fn create(&mut self) -> Result<ComponentInstance, Failure> {
        let instance = self.inspector.create(&self.class.id)?;
        self.tickets.lock().push(instance.ticket());
        Ok(instance)
    }

    /// A new instance brought to `stage`.
    pub fn create_staged(&mut self, stage: Stage) -> Result<ComponentInstance, Failure> {
        let mut instance = self.create()?;
        bring_to(&mut instance, stage)?;
        Ok(instance)
    }

    /// Creates the primary instance and brings it to `stage`.
    pub fn stage(&mut self, stage: Stage) -> CaseResult {
        let instance = self.create_staged(stage)?;
        debug!(class = %self.class.id, ?stage, "primary instance staged");
        self.instance = Some(instance);
        Ok(())
    }

    pub fn instance(&mut self) -> Result<&mut ComponentInstance, Failure> {
        self.instance
            .as_mut()
            .ok_or_else(|| Failure::instance("case has no staged instance"))
    }

    /// The controller of the primary instance.
    pub fn controller(&mut self) -> Result<Option<Arc<dyn Controller>>, Failure> {
        Ok(self.instance()?.controller())
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    /// Records a SHOULD deviation. The case still passes, as a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Marks the case as not applicable after inspecting the instance.
    pub fn skip(&mut self, reason: impl Into<String>) -> CaseResult {
        self.skipped = Some(reason.into());
        Ok(())
    }

    pub fn record_process_time(&mut self, elapsed: Duration) {
        if self.slowest_process.map_or(true, |slowest| elapsed > slowest) {
            self.slowest_process = Some(elapsed);
        }
    }

    /// Releases every instance and turns the body's result into a report.
    pub fn finish(mut self, result: CaseResult) -> CaseReport {
        if let Some(instance) = self.instance.take() {
            instance.release();
        }
        let outcome = match result {
            Err(failure) => Outcome::from(failure),
            Ok(()) => match self.skipped.take() {
                Some(reason) => Outcome::skipped(reason),
                None if !self.warnings.is_empty() => Outcome::warning(self.warnings.join("; ")),
                None => Outcome::Passed,
            },
        };
        CaseReport {
            outcome,
            notes: std::mem::take(&mut self.notes),
            warnings: Vec::new(),
            slowest_process: self.slowest_process,
        }
    }
}

/// Drives a `Created` instance through the legal path up to `stage`.
pub fn bring_to(instance: &mut ComponentInstance, stage: Stage) -> CaseResult {
    if stage == Stage::Created {
        return Ok(());
    }
    instance.initialize()?;
    if stage == Stage::Setup {
        instance.keep_bus_arrangements()?;
        let setup = ProcessSetup::new(SETUP_RATE, SETUP_BLOCK, ProcessMode::Realtime);
        instance.setup_processing(&setup)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::case_rng;
    use vst3_host::{ClassId, HostContext};

    struct NoFactory;

    impl vst3_host::PluginFactory for NoFactory {
        fn info(&self) -> Result<vst3_host::FactoryInfo, vst3_host::FactoryError> {
            Ok(Default::default())
        }

        fn class_count(&self) -> usize {
            0
        }

        fn class_info(&self, index: usize) -> Result<ClassDescriptor, vst3_host::FactoryError> {
            Err(vst3_host::FactoryError::InvalidIndex { index, count: 0 })
        }

        fn create_component(
            &self,
            id: &ClassId,
        ) -> Result<Box<dyn vst3_host::Component>, vst3_host::FactoryError> {
            Err(vst3_host::FactoryError::UnknownId(*id))
        }
    }

    fn context() -> CaseContext {
        let host = HostContext::new("test");
        let inspector = Arc::new(FactoryInspector::new(Arc::new(NoFactory), host));
        CaseContext::new(
            ClassDescriptor::basic(ClassId([9; 16]), "Audio Module Class", "Ghost"),
            inspector,
            ValidatorConfig::default(),
            case_rng(1, "context"),
            Arc::default(),
        )
    }

    #[test]
    fn warnings_turn_a_pass_into_a_warning() {
        let mut ctx = context();
        ctx.warn("no bypass parameter");
        ctx.note("informational only");
        let report = ctx.finish(Ok(()));
        assert_eq!(report.outcome, Outcome::warning("no bypass parameter"));
        assert_eq!(report.notes, vec!["informational only".to_string()]);
    }

    #[test]
    fn failures_win_over_skips() {
        let mut ctx = context();
        let _ = ctx.skip("no controller");
        let report = ctx.finish(Err(Failure::numeric("Inf")));
        assert!(report.outcome.is_failure());
    }

    #[test]
    fn unknown_classes_fail_staging_as_instance_errors() {
        let mut ctx = context();
        let failure = ctx.stage(Stage::Initialized).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Instance);
    }
}
