//! Crash barrier around plug-in calls.
//!
//! Faults raised by plug-in code inside [`with_crash_guard`] are turned into a
//! [`Crash`] value instead of terminating the process:
//!
//! - Unix: `sigsetjmp`/`siglongjmp` out of SIGSEGV/SIGBUS/SIGILL/SIGFPE/SIGABRT
//!   handlers. Jump buffers are per thread, so every case worker carries its
//!   own barrier. Faults on threads without an active guard go to whatever
//!   handler was installed before ours.
//! - Windows: structured exception handling through `microseh`.
//!
//! # Safety
//! Jumping out of a fault skips destructors of everything created inside the
//! guarded closure. Callers must treat the objects the closure touched as
//! poisoned and never reuse them.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{description} (code {code})")]
pub struct Crash {
    pub code: i32,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum BarrierError {
    #[error("failed to install handler for signal {signal}: {source}")]
    Install {
        signal: i32,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(unix)]
mod unix {
    use std::cell::{Cell, UnsafeCell};
    use std::ffi::c_void;

    use once_cell::sync::OnceCell;
    use tracing::{error, info};

    use super::{BarrierError, Crash};

    /// Large enough for `sigjmp_buf` on every supported libc.
    #[repr(C, align(16))]
    struct SigJmpBuf([u8; 1024]);

    extern "C" {
        #[cfg_attr(target_os = "linux", link_name = "__sigsetjmp")]
        fn sigsetjmp(env: *mut SigJmpBuf, savemask: libc::c_int) -> libc::c_int;
        fn siglongjmp(env: *mut SigJmpBuf, val: libc::c_int) -> !;
    }

    const SIGNALS: [libc::c_int; 5] = [
        libc::SIGSEGV,
        libc::SIGBUS,
        libc::SIGILL,
        libc::SIGFPE,
        libc::SIGABRT,
    ];

    struct JumpPoint {
        buf: UnsafeCell<SigJmpBuf>,
        active: Cell<bool>,
        signal: Cell<libc::c_int>,
    }

    thread_local! {
        static JUMP_POINT: JumpPoint = const {
            JumpPoint {
                buf: UnsafeCell::new(SigJmpBuf([0; 1024])),
                active: Cell::new(false),
                signal: Cell::new(0),
            }
        };
    }

    /// Handlers that were installed before ours, in `SIGNALS` order.
    static PREVIOUS: OnceCell<Vec<(libc::c_int, libc::sigaction)>> = OnceCell::new();

    extern "C" fn on_fault(signal: libc::c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
        let target = JUMP_POINT.with(|point| {
            if point.active.get() {
                point.active.set(false);
                point.signal.set(signal);
                Some(point.buf.get())
            } else {
                None
            }
        });
        if let Some(buf) = target {
            unsafe { siglongjmp(buf, 1) }
        }
        unsafe { chain(signal, info, context) }
    }

    unsafe fn chain(signal: libc::c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
        let previous = PREVIOUS
            .get()
            .and_then(|list| list.iter().find(|(sig, _)| *sig == signal))
            .map(|(_, action)| *action);
        match previous {
            Some(action) if action.sa_sigaction == libc::SIG_IGN => {}
            Some(action) if action.sa_sigaction != libc::SIG_DFL => {
                if action.sa_flags & libc::SA_SIGINFO != 0 {
                    let handler: extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut c_void) =
                        std::mem::transmute(action.sa_sigaction);
                    handler(signal, info, context);
                } else {
                    let handler: extern "C" fn(libc::c_int) =
                        std::mem::transmute(action.sa_sigaction);
                    handler(signal);
                }
            }
            _ => {
                libc::signal(signal, libc::SIG_DFL);
                libc::raise(signal);
            }
        }
    }

    pub fn install() -> Result<(), BarrierError> {
        PREVIOUS
            .get_or_try_init(|| {
                let mut previous = Vec::with_capacity(SIGNALS.len());
                for signal in SIGNALS {
                    unsafe {
                        let mut action: libc::sigaction = std::mem::zeroed();
                        action.sa_sigaction = on_fault as usize;
                        action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
                        libc::sigemptyset(&mut action.sa_mask);
                        let mut old: libc::sigaction = std::mem::zeroed();
                        if libc::sigaction(signal, &action, &mut old) != 0 {
                            return Err(BarrierError::Install {
                                signal,
                                source: std::io::Error::last_os_error(),
                            });
                        }
                        previous.push((signal, old));
                    }
                }
                info!("crash barrier installed");
                Ok(previous)
            })
            .map(|_| ())
    }

    pub fn describe(signal: libc::c_int) -> &'static str {
        match signal {
            libc::SIGSEGV => "SIGSEGV (segmentation fault)",
            libc::SIGBUS => "SIGBUS (bus error)",
            libc::SIGILL => "SIGILL (illegal instruction)",
            libc::SIGFPE => "SIGFPE (arithmetic fault)",
            libc::SIGABRT => "SIGABRT (abort)",
            _ => "unknown signal",
        }
    }

    struct Disarm;

    impl Drop for Disarm {
        fn drop(&mut self) {
            JUMP_POINT.with(|point| point.active.set(false));
        }
    }

    pub fn with_crash_guard<F, T>(f: F) -> Result<T, Crash>
    where
        F: FnOnce() -> T,
    {
        if JUMP_POINT.with(|point| point.active.get()) {
            return Ok(f());
        }
        let buf = JUMP_POINT.with(|point| point.buf.get());
        unsafe {
            if sigsetjmp(buf, 1) == 0 {
                JUMP_POINT.with(|point| point.active.set(true));
                let disarm = Disarm;
                let value = f();
                drop(disarm);
                Ok(value)
            } else {
                let signal = JUMP_POINT.with(|point| point.signal.get());
                error!(signal, "crash barrier caught {}", describe(signal));
                Err(Crash {
                    code: signal,
                    description: describe(signal).to_string(),
                })
            }
        }
    }
}

#[cfg(windows)]
mod windows {
    use tracing::error;

    use super::{BarrierError, Crash};

    pub fn install() -> Result<(), BarrierError> {
        Ok(())
    }

    pub fn with_crash_guard<F, T>(f: F) -> Result<T, Crash>
    where
        F: FnOnce() -> T,
    {
        let mut pending = Some(f);
        match microseh::try_seh(|| pending.take().map(|f| f())) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(Crash {
                code: 0,
                description: "guarded closure did not run".into(),
            }),
            Err(exception) => {
                error!("crash barrier caught SEH exception: {}", exception.code());
                Err(Crash {
                    code: exception.code() as u32 as i32,
                    description: format!("SEH exception {}", exception.code()),
                })
            }
        }
    }
}

#[cfg(unix)]
pub use unix::{install, with_crash_guard};

#[cfg(windows)]
pub use windows::{install, with_crash_guard};
