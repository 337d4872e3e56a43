//! The conformance cases, one module per suite.

pub mod bus;
pub mod bypass;
pub mod identity;
pub mod parameters;
pub mod processing;
pub mod state;
pub mod state_machine;
pub mod tail;
pub mod threading;

use vst3_host::{Capability, ClassDescriptor, ResultCode};

use crate::error::Failure;

/// Contract failure unless the plug-in answered `kResultOk`.
fn must_succeed(code: ResultCode, call: &str) -> Result<(), Failure> {
    if code.is_ok() {
        Ok(())
    } else {
        Err(Failure::contract(format!("{call} returned {code}")))
    }
}

fn audio_modules(class: &ClassDescriptor) -> Result<(), String> {
    if class.is_audio_module() {
        Ok(())
    } else {
        Err(format!("`{}` is not an audio module class", class.category))
    }
}

fn audio_effects(class: &ClassDescriptor) -> Result<(), String> {
    if class.capabilities().contains(Capability::AudioEffect) {
        Ok(())
    } else {
        Err("class does not advertise the Fx sub-category".into())
    }
}

fn pure_effects(class: &ClassDescriptor) -> Result<(), String> {
    if class.capabilities().is_pure_effect() {
        Ok(())
    } else {
        Err("class is not a pure audio effect".into())
    }
}

/// Joins the first few messages of a list, counting the rest.
fn summarize(messages: &[String]) -> String {
    const SHOWN: usize = 3;
    let mut text = messages.iter().take(SHOWN).cloned().collect::<Vec<_>>().join("; ");
    if messages.len() > SHOWN {
        text.push_str(&format!(" (+{} more)", messages.len() - SHOWN));
    }
    text
}
