//! Runs the selected suites against every audio module class of one plug-in.
//!
//! A run goes `runStarted` → load → enumerate → filter → list or run cases →
//! unload → `runEnded`. The module is unloaded on every path that loaded it,
//! and every case runs on a watched worker thread so that hangs and crashes
//! end the case instead of the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use vst3_host::{
    ClassDescriptor, ClassId, FactoryInspector, HostContext, ModuleLoader, PluginModule, Ticket,
};

use crate::barrier;
use crate::cancel::CancelFlag;
use crate::config::ValidatorConfig;
use crate::context::{CaseContext, CaseReport};
use crate::error::{DriverError, ExitStatus, FailureKind};
use crate::event::Event;
use crate::outcome::Outcome;
use crate::registry::{Registry, Suite, TestCase};
use crate::report::{CaseRecord, ClassReport, Report};
use crate::seed::case_rng;
use crate::sink::Sink;
use crate::watchdog::{run_watched, Watched};

/// What to do with one plug-in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub path: PathBuf,
    /// Only enumerate classes.
    pub list: bool,
    pub class_filter: Option<ClassId>,
    /// Suites to run; empty runs all of them.
    pub suites: Vec<Suite>,
    pub stop_on_failure: bool,
    /// Drop `info` events.
    pub quiet: bool,
}

impl RunOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: ExitStatus,
    pub summary: String,
    pub report: Report,
}

enum Completion {
    Listed(usize),
    Ran,
}

/// Forwards events to the sink, applying `-q`. Sink errors are logged and
/// never abort the run.
struct Emitter<'a> {
    sink: &'a mut dyn Sink,
    quiet: bool,
}

impl Emitter<'_> {
    fn emit(&mut self, event: Event) {
        if self.quiet && matches!(event, Event::Info { .. }) {
            return;
        }
        if let Err(err) = self.sink.emit(&event) {
            warn!(event = event.name(), %err, "sink rejected event");
        }
    }

    fn info(&mut self, message: impl Into<String>) {
        self.emit(Event::Info {
            message: message.into(),
        });
    }

    fn flush(&mut self) {
        if let Err(err) = self.sink.flush() {
            warn!(%err, "failed to flush sink");
        }
    }
}

pub struct Driver<L> {
    loader: L,
    config: ValidatorConfig,
    registry: Registry,
}

impl<L: ModuleLoader> Driver<L> {
    pub fn new(loader: L, config: ValidatorConfig) -> Self {
        Self::with_registry(loader, config, Registry::standard())
    }

    pub fn with_registry(loader: L, config: ValidatorConfig, registry: Registry) -> Self {
        Self {
            loader,
            config,
            registry,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn run(
        &self,
        options: &RunOptions,
        sink: &mut dyn Sink,
        cancel: &CancelFlag,
    ) -> RunOutcome {
        let mut emitter = Emitter {
            sink,
            quiet: options.quiet,
        };
        info!(path = %options.path.display(), seed = self.config.seed, "run started");
        emitter.emit(Event::RunStarted {
            path: options.path.clone(),
            seed: self.config.seed,
        });

        let mut report = Report::default();
        let (status, summary) = match self.execute(options, &mut emitter, cancel, &mut report) {
            Ok(Completion::Listed(count)) => {
                (ExitStatus::Success, format!("listed {count} classes"))
            }
            Ok(Completion::Ran) if report.interrupted => {
                (ExitStatus::Internal, "interrupted".to_string())
            }
            Ok(Completion::Ran) if report.passed() => (ExitStatus::Success, "passed".to_string()),
            Ok(Completion::Ran) => (
                ExitStatus::TestFailures,
                format!("test-failures: {} failed", report.totals().failed),
            ),
            Err(err) => {
                error!(error = %err.detail(), "run aborted");
                (err.exit_status(), err.to_string())
            }
        };

        info!(%summary, code = status.code(), "run finished");
        emitter.emit(Event::RunEnded {
            summary: summary.clone(),
            exit_code: status.code(),
            totals: report.totals(),
        });
        emitter.flush();
        RunOutcome {
            status,
            summary,
            report,
        }
    }

    fn execute(
        &self,
        options: &RunOptions,
        emitter: &mut Emitter<'_>,
        cancel: &CancelFlag,
        report: &mut Report,
    ) -> Result<Completion, DriverError> {
        barrier::install().map_err(|err| DriverError::Internal(err.to_string()))?;
        let mut module = self.loader.load(&options.path)?;
        let result = self.run_module(module.as_ref(), options, emitter, cancel, report);
        module.unload();
        debug!(path = %options.path.display(), "module unloaded");
        result
    }

    fn run_module(
        &self,
        module: &dyn PluginModule,
        options: &RunOptions,
        emitter: &mut Emitter<'_>,
        cancel: &CancelFlag,
        report: &mut Report,
    ) -> Result<Completion, DriverError> {
        let factory = module.factory()?;
        let host = HostContext::new(&self.config.host_name);
        let inspector = Arc::new(FactoryInspector::new(factory, host));
        let enumeration = inspector.enumerate()?;
        for diagnostic in &enumeration.diagnostics {
            emitter.info(diagnostic.as_str());
        }

        let classes: Vec<ClassDescriptor> = enumeration
            .audio_modules()
            .filter(|class| options.class_filter.map_or(true, |id| class.id == id))
            .cloned()
            .collect();
        if classes.is_empty() {
            return Err(DriverError::NoMatchingClasses);
        }

        if options.list {
            let count = classes.len();
            for class in classes {
                emitter.emit(Event::ClassListed { class });
            }
            return Ok(Completion::Listed(count));
        }

        let cases = self.registry.select(&options.suites);
        let mut stopped = false;
        for class in classes {
            emitter.emit(Event::ClassStarted { class: class.clone() });
            let mut class_report = ClassReport::new(class.clone());
            for case in &cases {
                if cancel.is_cancelled() {
                    warn!("cancellation requested, stopping before {}", case.name);
                    report.interrupted = true;
                    break;
                }
                let record = self.run_case(&inspector, &class, case, emitter);
                let failed = record.outcome.is_failure();
                class_report.cases.push(record);
                if failed && options.stop_on_failure {
                    stopped = true;
                    break;
                }
            }
            emitter.emit(Event::ClassEnded {
                class_id: class.id,
                name: class.name.clone(),
                summary: class_report.summary(),
            });
            report.classes.push(class_report);
            if stopped || report.interrupted {
                break;
            }
        }

        let unbalanced = inspector.ledger().unbalanced();
        if !unbalanced.is_empty() {
            let detail = unbalanced
                .iter()
                .map(|(id, counts)| format!("{id}: {} instances outstanding", counts.net()))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DriverError::Internal(format!("instance ledger unbalanced ({detail})")));
        }
        Ok(Completion::Ran)
    }

    fn run_case(
        &self,
        inspector: &Arc<FactoryInspector>,
        class: &ClassDescriptor,
        case: &TestCase,
        emitter: &mut Emitter<'_>,
    ) -> CaseRecord {
        emitter.emit(Event::CaseStarted {
            name: case.name.clone(),
            suite: case.suite,
        });
        let started = Instant::now();
        let report = match (case.applies)(class) {
            Err(reason) => CaseReport::from_outcome(Outcome::skipped(reason)),
            Ok(()) => self.watch(inspector, class, case),
        };
        let elapsed = started.elapsed();
        debug!(
            case = %case.name,
            class = %class.id,
            outcome = %report.outcome.label(),
            ?elapsed,
            "case finished"
        );

        for note in &report.notes {
            emitter.info(note.as_str());
        }
        for message in &report.warnings {
            emitter.emit(Event::Warning {
                message: message.clone(),
            });
        }
        emitter.emit(Event::CaseEnded {
            name: case.name.clone(),
            outcome: report.outcome.clone(),
            elapsed_ms: elapsed.as_millis() as u64,
            slowest_process_us: report.slowest_process.map(|slowest| slowest.as_micros() as u64),
        });
        CaseRecord {
            name: case.name.clone(),
            suite: case.suite,
            outcome: report.outcome,
            elapsed,
        }
    }

    /// Runs one applicable case on a watched worker.
    fn watch(
        &self,
        inspector: &Arc<FactoryInspector>,
        class: &ClassDescriptor,
        case: &TestCase,
    ) -> CaseReport {
        let tickets: Arc<Mutex<Vec<Ticket>>> = Arc::default();
        let ctx = CaseContext::new(
            class.clone(),
            Arc::clone(inspector),
            self.config.clone(),
            case_rng(self.config.seed, &case.name),
            Arc::clone(&tickets),
        );
        let body = Arc::clone(&case.run);
        let stage = case.stage;
        let watched = run_watched(&case.name, self.config.case_timeout, move || {
            let mut ctx = ctx;
            let result = ctx.stage(stage).and_then(|()| body(&mut ctx));
            ctx.finish(result)
        });

        let detached = matches!(watched, Ok(Watched::TimedOut));
        let mut report = match watched {
            Ok(Watched::Completed(report)) => return report,
            Ok(Watched::Panicked(message)) => {
                CaseReport::failed(FailureKind::Crash, format!("panic: {message}"))
            }
            Ok(Watched::Crashed(crash)) => {
                CaseReport::failed(FailureKind::Crash, crash.to_string())
            }
            Ok(Watched::TimedOut) => CaseReport::failed(
                FailureKind::Timeout,
                format!("case did not finish within {:?}", self.config.case_timeout),
            ),
            Err(err) => CaseReport::failed(FailureKind::Crash, format!("{err:#}")),
        };
        let settled: Vec<Ticket> = tickets
            .lock()
            .iter()
            .copied()
            .filter(|ticket| inspector.force_release(*ticket))
            .collect();
        if !settled.is_empty() {
            warn!(
                case = %case.name,
                settled = settled.len(),
                detached,
                "force-released abandoned instances"
            );
        }
        report.warnings = settled
            .into_iter()
            .map(|ticket| abandoned_instance(ticket, class, &case.name, detached))
            .collect();
        report
    }
}

fn abandoned_instance(
    ticket: Ticket,
    class: &ClassDescriptor,
    case: &str,
    detached: bool,
) -> String {
    let fate = if detached {
        "is still alive on the detached worker"
    } else {
        "was never released"
    };
    format!(
        "instance #{ticket} of {} [{}] abandoned by {case} {fate}",
        class.name, class.id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use vst3_host::{LoadError, PluginModule};

    struct MissingLoader;

    impl ModuleLoader for MissingLoader {
        fn load(&self, path: &Path) -> Result<Box<dyn PluginModule>, LoadError> {
            Err(LoadError::FileNotFound(path.to_path_buf()))
        }
    }

    #[test]
    fn missing_module_ends_with_loader_error() {
        let driver = Driver::new(MissingLoader, ValidatorConfig::default());
        let mut sink = MemorySink::new();
        let options = RunOptions::new("/nowhere/Gain.vst3");
        let outcome = driver.run(&options, &mut sink, &CancelFlag::new());

        assert_eq!(outcome.status, ExitStatus::LoaderError);
        assert_eq!(outcome.summary, "loader-error: file-not-found");
        let names: Vec<_> = sink.events().iter().map(Event::name).collect();
        assert_eq!(names, vec!["runStarted", "runEnded"]);
    }

    #[test]
    fn quiet_emitter_drops_info() {
        let mut sink = MemorySink::new();
        let mut emitter = Emitter {
            sink: &mut sink,
            quiet: true,
        };
        emitter.info("hidden");
        emitter.emit(Event::ClassStarted {
            class: ClassDescriptor::basic(ClassId::default(), "Audio Module Class", "Gain"),
        });
        assert_eq!(sink.events().len(), 1);
    }
}
