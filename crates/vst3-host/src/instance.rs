use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::error::ResultCode;
use crate::ffi::SpeakerArrangement;
use crate::ledger::{InstanceLedger, Ticket};
use crate::plugin::{
    BusDirection, Component, Controller, HostContext, IoMode, MediaType, ProcessData, ProcessSetup,
};
use crate::uid::ClassId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Created,
    Initialized,
    Setup,
    Activated,
    Processing,
    Terminated,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Initialize,
    SetBusArrangements,
    SetupProcessing,
    Activate,
    Deactivate,
    StartProcessing,
    StopProcessing,
    Process,
    Terminate,
    Release,
}

impl LifecycleState {
    /// The state reached by `event`, or `None` if the host may not issue it here.
    pub fn next(self, event: LifecycleEvent) -> Option<LifecycleState> {
        use LifecycleEvent as E;
        use LifecycleState as S;
        match (self, event) {
            (S::Released, _) => None,
            (_, E::Release) => Some(S::Released),
            (S::Created, E::Initialize) => Some(S::Initialized),
            (S::Initialized | S::Setup, E::SetBusArrangements) => Some(S::Setup),
            (S::Setup, E::SetupProcessing) => Some(S::Setup),
            (S::Setup, E::Activate) => Some(S::Activated),
            (S::Activated, E::StartProcessing) => Some(S::Processing),
            (S::Processing, E::Process) => Some(S::Processing),
            (S::Processing, E::StopProcessing) => Some(S::Activated),
            (S::Activated, E::Deactivate) => Some(S::Setup),
            (S::Initialized | S::Setup, E::Terminate) => Some(S::Terminated),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{event:?} is not permitted in state {state:?}")]
    Illegal {
        state: LifecycleState,
        event: LifecycleEvent,
    },
    #[error("{event:?} in state {state:?} returned {code}")]
    Refused {
        state: LifecycleState,
        event: LifecycleEvent,
        code: ResultCode,
    },
}

/// A component instance tracked through the host-side lifecycle machine.
///
/// Dropping the instance unwinds it (stop processing, deactivate, terminate)
/// and settles its ledger ticket, so a case that bails out early still
/// releases the plug-in.
pub struct ComponentInstance {
    class: ClassId,
    ticket: Ticket,
    state: LifecycleState,
    tainted: bool,
    host: HostContext,
    ledger: InstanceLedger,
    component: Box<dyn Component>,
}

impl ComponentInstance {
    pub fn new(
        class: ClassId,
        component: Box<dyn Component>,
        ticket: Ticket,
        ledger: InstanceLedger,
        host: HostContext,
    ) -> Self {
        Self {
            class,
            ticket,
            state: LifecycleState::Created,
            tainted: false,
            host,
            ledger,
            component,
        }
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }

    /// Whether lifecycle calls bypassed the machine through [`Self::raw`].
    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    /// Read-only queries that are legal in every state.
    pub fn query(&self) -> &dyn Component {
        self.component.as_ref()
    }

    /// Unchecked access for deliberate misuse. Marks the instance as tainted.
    pub fn raw(&mut self) -> &mut dyn Component {
        self.tainted = true;
        self.component.as_mut()
    }

    pub fn controller(&self) -> Option<Arc<dyn Controller>> {
        self.component.controller()
    }

    fn begin(&self, event: LifecycleEvent) -> Result<LifecycleState, LifecycleError> {
        self.state.next(event).ok_or(LifecycleError::Illegal {
            state: self.state,
            event,
        })
    }

    fn finish(
        &mut self,
        event: LifecycleEvent,
        next: LifecycleState,
        code: ResultCode,
    ) -> Result<(), LifecycleError> {
        if code.is_ok() {
            trace!(class = %self.class, ?event, from = ?self.state, to = ?next, "transition");
            self.state = next;
            Ok(())
        } else {
            Err(LifecycleError::Refused {
                state: self.state,
                event,
                code,
            })
        }
    }

    pub fn initialize(&mut self) -> Result<(), LifecycleError> {
        let next = self.begin(LifecycleEvent::Initialize)?;
        let code = self.component.initialize(&self.host);
        self.finish(LifecycleEvent::Initialize, next, code)
    }

    /// Negotiates the bus arrangement. `kResultFalse` means the plug-in adjusted
    /// the request and still moves the machine to `Setup`; the code is returned
    /// so the caller can read back the arrangement.
    pub fn set_bus_arrangements(
        &mut self,
        inputs: &[SpeakerArrangement],
        outputs: &[SpeakerArrangement],
    ) -> Result<ResultCode, LifecycleError> {
        let next = self.begin(LifecycleEvent::SetBusArrangements)?;
        let code = self.component.set_bus_arrangements(inputs, outputs);
        let accepted = if code == ResultCode::FALSE { ResultCode::OK } else { code };
        self.finish(LifecycleEvent::SetBusArrangements, next, accepted)?;
        Ok(code)
    }

    /// Moves an initialized instance to `Setup` with the arrangements the
    /// plug-in reports for its audio buses.
    pub fn keep_bus_arrangements(&mut self) -> Result<ResultCode, LifecycleError> {
        let current = |direction| {
            let count = self.component.bus_count(MediaType::Audio, direction);
            (0..count)
                .map(|index| self.component.bus_arrangement(direction, index).unwrap_or_default())
                .collect::<Vec<_>>()
        };
        let inputs = current(BusDirection::Input);
        let outputs = current(BusDirection::Output);
        self.set_bus_arrangements(&inputs, &outputs)
    }

    pub fn setup_processing(&mut self, setup: &ProcessSetup) -> Result<(), LifecycleError> {
        let next = self.begin(LifecycleEvent::SetupProcessing)?;
        let code = self.component.setup_processing(setup);
        self.finish(LifecycleEvent::SetupProcessing, next, code)
    }

    pub fn activate(&mut self) -> Result<(), LifecycleError> {
        let next = self.begin(LifecycleEvent::Activate)?;
        let code = self.component.set_active(true);
        self.finish(LifecycleEvent::Activate, next, code)
    }

    pub fn deactivate(&mut self) -> Result<(), LifecycleError> {
        let next = self.begin(LifecycleEvent::Deactivate)?;
        let code = self.component.set_active(false);
        self.finish(LifecycleEvent::Deactivate, next, code)
    }

    /// `setProcessing(true)`. `kNotImplemented` is the SDK default and accepted.
    pub fn start_processing(&mut self) -> Result<(), LifecycleError> {
        let next = self.begin(LifecycleEvent::StartProcessing)?;
        let code = allow_not_implemented(self.component.set_processing(true));
        self.finish(LifecycleEvent::StartProcessing, next, code)
    }

    pub fn stop_processing(&mut self) -> Result<(), LifecycleError> {
        let next = self.begin(LifecycleEvent::StopProcessing)?;
        let code = allow_not_implemented(self.component.set_processing(false));
        self.finish(LifecycleEvent::StopProcessing, next, code)
    }

    pub fn process(&mut self, data: &mut ProcessData<'_>) -> Result<(), LifecycleError> {
        let next = self.begin(LifecycleEvent::Process)?;
        let code = self.component.process(data);
        self.finish(LifecycleEvent::Process, next, code)
    }

    pub fn terminate(&mut self) -> Result<(), LifecycleError> {
        let next = self.begin(LifecycleEvent::Terminate)?;
        let code = self.component.terminate();
        self.finish(LifecycleEvent::Terminate, next, code)
    }

    pub fn set_io_mode(&mut self, mode: IoMode) -> ResultCode {
        self.component.set_io_mode(mode)
    }

    pub fn activate_bus(
        &mut self,
        media: MediaType,
        direction: BusDirection,
        index: i32,
        active: bool,
    ) -> ResultCode {
        self.component.activate_bus(media, direction, index, active)
    }

    pub fn set_state(&mut self, state: &[u8]) -> ResultCode {
        self.component.set_state(state)
    }

    pub fn get_state(&mut self) -> Result<Vec<u8>, ResultCode> {
        self.component.get_state()
    }

    /// Returns the instance to `Released` from any state.
    pub fn release(mut self) {
        self.unwind();
    }

    fn unwind(&mut self) {
        if self.state == LifecycleState::Released {
            return;
        }
        debug!(
            class = %self.class,
            ticket = self.ticket,
            state = ?self.state,
            "releasing instance"
        );
        if self.state == LifecycleState::Processing {
            self.component.set_processing(false);
            self.state = LifecycleState::Activated;
        }
        if self.state == LifecycleState::Activated {
            self.component.set_active(false);
            self.state = LifecycleState::Setup;
        }
        if matches!(self.state, LifecycleState::Initialized | LifecycleState::Setup) {
            self.component.terminate();
            self.state = LifecycleState::Terminated;
        }
        self.state = LifecycleState::Released;
        self.ledger.release(self.ticket);
    }
}

fn allow_not_implemented(code: ResultCode) -> ResultCode {
    if code == ResultCode::NOT_IMPLEMENTED {
        ResultCode::OK
    } else {
        code
    }
}

impl Drop for ComponentInstance {
    fn drop(&mut self) {
        self.unwind();
    }
}

impl std::fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("class", &self.class)
            .field("ticket", &self.ticket)
            .field("state", &self.state)
            .field("tainted", &self.tainted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleEvent as E;
    use LifecycleState as S;

    #[test]
    fn full_legal_path_reaches_released() {
        let path = [
            E::Initialize,
            E::SetBusArrangements,
            E::SetupProcessing,
            E::Activate,
            E::StartProcessing,
            E::Process,
            E::StopProcessing,
            E::Deactivate,
            E::Terminate,
            E::Release,
        ];
        let end = path
            .iter()
            .try_fold(S::Created, |state, event| state.next(*event));
        assert_eq!(end, Some(S::Released));
    }

    #[test]
    fn premature_events_are_illegal() {
        assert_eq!(S::Created.next(E::Activate), None);
        assert_eq!(S::Created.next(E::StartProcessing), None);
        assert_eq!(S::Created.next(E::Process), None);
        assert_eq!(S::Setup.next(E::StartProcessing), None);
        assert_eq!(S::Activated.next(E::Terminate), None);
        assert_eq!(S::Initialized.next(E::Initialize), None);
    }

    #[test]
    fn release_is_terminal() {
        for state in [S::Created, S::Setup, S::Processing, S::Terminated] {
            assert_eq!(state.next(E::Release), Some(S::Released));
        }
        assert_eq!(S::Released.next(E::Release), None);
    }
}
