use std::io;
use std::process;

use anyhow::Context;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use vst3_host::Vst3Loader;
use vst3_validate::{
    Args, CancelFlag, Driver, ExitStatus, HumanSink, JsonSink, Sink, ValidatorConfig,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = match Args::try_parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err((message, code)) => {
            if code == 0 {
                print!("{message}");
            } else {
                eprint!("{message}");
            }
            process::exit(code);
        }
    };

    let config = match ValidatorConfig::from_env().context("invalid environment") {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(ExitStatus::Usage.code());
        }
    };

    let cancel = CancelFlag::new();
    if let Err(err) = cancel.install_ctrlc() {
        warn!(%err, "Ctrl-C will terminate the process instead of stopping the run");
    }

    let stdout = io::stdout();
    let mut sink: Box<dyn Sink> = if args.json {
        Box::new(JsonSink::new(stdout.lock()))
    } else {
        Box::new(HumanSink::new(stdout.lock()))
    };
    let driver = Driver::new(Vst3Loader, config);
    let outcome = driver.run(&args.options(), sink.as_mut(), &cancel);
    drop(sink);
    process::exit(outcome.status.code());
}
