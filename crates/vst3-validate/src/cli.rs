use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use vst3_host::ClassId;

use crate::driver::RunOptions;
use crate::registry::Suite;

/// Checks a VST3 plug-in module against the VST3 component contract.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "validator", version, about)]
pub struct Args {
    /// List the audio module classes and exit.
    #[arg(short = 'l', long)]
    pub list: bool,
    /// Only validate the class with this identifier (32 hex digits, dashes and braces allowed).
    #[arg(short = 'e', long = "class", value_name = "ID", value_parser = parse_class_id)]
    pub class: Option<ClassId>,
    /// Comma separated suites to run.
    #[arg(
        short = 's',
        long = "suite",
        value_name = "NAME",
        value_delimiter = ',',
        value_parser = parse_suite
    )]
    pub suites: Vec<Suite>,
    /// Stop after the first failing case.
    #[arg(short = 'x', long)]
    pub stop_on_failure: bool,
    /// Suppress informational output.
    #[arg(short = 'q', long)]
    pub quiet: bool,
    /// Emit one JSON object per event instead of text.
    #[arg(short = 'j', long)]
    pub json: bool,
    /// Path to the `.vst3` bundle or module.
    pub path: PathBuf,
}

fn parse_class_id(raw: &str) -> Result<ClassId, String> {
    raw.parse::<ClassId>().map_err(|err| err.to_string())
}

fn parse_suite(raw: &str) -> Result<Suite, String> {
    raw.parse()
}

impl Args {
    /// Parses `argv`. On error returns the message and the exit code to use:
    /// 0 for `--help`/`--version`, 2 for usage errors.
    pub fn try_parse_args<I, T>(argv: I) -> Result<Self, (String, i32)>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(argv).map_err(|err| {
            let code = if err.use_stderr() { 2 } else { 0 };
            (err.render().to_string(), code)
        })
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            path: self.path.clone(),
            list: self.list,
            class_filter: self.class,
            suites: self.suites.clone(),
            stop_on_failure: self.stop_on_failure,
            quiet: self.quiet,
        }
    }
}
