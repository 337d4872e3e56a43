use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::RecvTimeoutError;
use tracing::warn;

use crate::barrier::{self, Crash};

/// How a watched closure ended.
#[derive(Debug)]
pub enum Watched<T> {
    Completed(T),
    Panicked(String),
    Crashed(Crash),
    /// The worker is still running and has been detached.
    TimedOut,
}

/// Runs `f` on a named worker thread behind the crash barrier and waits at
/// most `timeout` for it.
pub fn run_watched<F, T>(name: &str, timeout: Duration, f: F) -> Result<Watched<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    let handle = thread::Builder::new()
        .name(format!("case {name}"))
        .spawn(move || {
            let guarded = panic::catch_unwind(AssertUnwindSafe(|| barrier::with_crash_guard(f)));
            let watched = match guarded {
                Ok(Ok(value)) => Watched::Completed(value),
                Ok(Err(crash)) => Watched::Crashed(crash),
                Err(payload) => Watched::Panicked(panic_message(payload.as_ref())),
            };
            // The driver may have stopped listening after a timeout.
            let _ = tx.send(watched);
        })
        .with_context(|| format!("failed to spawn worker for {name}"))?;

    match rx.recv_timeout(timeout) {
        Ok(watched) => {
            if handle.join().is_err() {
                warn!(case = name, "case worker panicked after reporting");
            }
            Ok(watched)
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(case = name, ?timeout, "case worker detached after timeout");
            drop(handle);
            Ok(Watched::TimedOut)
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(anyhow!("worker for {name} exited without reporting"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn completed_values_are_returned() {
        let watched = run_watched("sum", Duration::from_secs(5), || 2 + 2).unwrap();
        assert!(matches!(watched, Watched::Completed(4)));
    }

    #[test]
    fn panics_are_reported_with_their_message() {
        let watched = run_watched("panics", Duration::from_secs(5), || -> u8 {
            panic!("plug-in bug")
        })
        .unwrap();
        match watched {
            Watched::Panicked(message) => assert_eq!(message, "plug-in bug"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn hangs_time_out_and_detach() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&release);
        let watched = run_watched("hangs", Duration::from_millis(50), move || {
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();
        assert!(matches!(watched, Watched::TimedOut));
        release.store(true, Ordering::SeqCst);
    }
}
