use std::io::{self, Write};

use super::Sink;
use crate::event::Event;
use crate::outcome::Outcome;
use crate::report::ClassSummary;

/// Line-oriented text for terminals.
pub struct HumanSink<W: Write> {
    out: W,
}

impl<W: Write> HumanSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn tally(summary: &ClassSummary) -> String {
    format!(
        "{} passed, {} warnings, {} skipped, {} failed",
        summary.passed, summary.warnings, summary.skipped, summary.failed
    )
}

impl<W: Write> Sink for HumanSink<W> {
    fn emit(&mut self, event: &Event) -> io::Result<()> {
        match event {
            Event::RunStarted { path, seed } => {
                writeln!(self.out, "validating {} (seed {seed:#x})", path.display())
            }
            Event::ClassListed { class } => writeln!(
                self.out,
                "{}  {}  {}  {}  {}",
                class.id,
                class.name,
                class.vendor,
                class.version,
                class.sub_categories.join("|")
            ),
            Event::ClassStarted { class } => {
                writeln!(self.out, "\n{} by {} [{}]", class.name, class.vendor, class.id)
            }
            Event::CaseStarted { .. } => Ok(()),
            Event::Info { message } => writeln!(self.out, "  note: {message}"),
            Event::Warning { message } => writeln!(self.out, "  warning: {message}"),
            Event::CaseEnded {
                name,
                outcome,
                elapsed_ms,
                ..
            } => {
                let label = match outcome {
                    Outcome::Passed => "ok",
                    Outcome::Skipped { .. } => "skip",
                    Outcome::Warning { .. } => "warn",
                    Outcome::Failed { .. } => "FAIL",
                };
                let head = format!("  [{label:>4}] {name} ({elapsed_ms} ms)");
                match outcome {
                    Outcome::Passed => writeln!(self.out, "{head}"),
                    Outcome::Failed { kind, message } => {
                        writeln!(self.out, "{head}: {kind}: {message}")
                    }
                    Outcome::Skipped { reason: message } | Outcome::Warning { message } => {
                        writeln!(self.out, "  [{label:>4}] {name} ({elapsed_ms} ms): {message}")
                    }
                }
            }
            Event::ClassEnded { name, summary, .. } => {
                writeln!(self.out, "{name}: {}", tally(summary))
            }
            Event::RunEnded {
                summary,
                exit_code,
                totals,
            } => {
                if totals.total() > 0 {
                    writeln!(self.out, "\ntotal: {}", tally(totals))?;
                }
                writeln!(self.out, "result: {summary} (exit {exit_code})")?;
                self.out.flush()
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
