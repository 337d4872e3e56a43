use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::uid::ClassId;

/// Identifies one created instance in the [`InstanceLedger`].
pub type Ticket = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounts {
    pub created: u64,
    pub released: u64,
    pub forced: u64,
}

impl LedgerCounts {
    /// Instances still unaccounted for.
    pub fn net(&self) -> i64 {
        self.created as i64 - self.released as i64 - self.forced as i64
    }
}

#[derive(Default)]
struct LedgerState {
    next_ticket: Ticket,
    live: HashMap<Ticket, ClassId>,
    per_class: BTreeMap<ClassId, LedgerCounts>,
}

/// Create/release accounting shared by the inspector and every instance it
/// hands out. Each ticket is settled at most once; later settlements are
/// ignored.
#[derive(Clone, Default)]
pub struct InstanceLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InstanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, class: ClassId) -> Ticket {
        let mut state = self.state.lock();
        state.next_ticket += 1;
        let ticket = state.next_ticket;
        state.live.insert(ticket, class);
        state.per_class.entry(class).or_default().created += 1;
        ticket
    }

    /// Records a regular release. Returns `false` if the ticket was already settled.
    pub fn release(&self, ticket: Ticket) -> bool {
        let mut state = self.state.lock();
        match state.live.remove(&ticket) {
            Some(class) => {
                state.per_class.entry(class).or_default().released += 1;
                true
            }
            None => {
                debug!(ticket, "ignoring release of settled ticket");
                false
            }
        }
    }

    /// Settles an instance abandoned by a timed-out or crashed case.
    pub fn force(&self, ticket: Ticket) -> bool {
        let mut state = self.state.lock();
        match state.live.remove(&ticket) {
            Some(class) => {
                warn!(ticket, class = %class, "instance force-released");
                state.per_class.entry(class).or_default().forced += 1;
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, ticket: Ticket) -> bool {
        self.state.lock().live.contains_key(&ticket)
    }

    pub fn counts(&self, class: &ClassId) -> LedgerCounts {
        self.state.lock().per_class.get(class).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<ClassId, LedgerCounts> {
        self.state.lock().per_class.clone()
    }

    /// Classes whose instances are not all accounted for.
    pub fn unbalanced(&self) -> Vec<(ClassId, LedgerCounts)> {
        self.state
            .lock()
            .per_class
            .iter()
            .filter(|(_, counts)| counts.net() != 0)
            .map(|(class, counts)| (*class, *counts))
            .collect()
    }
}

impl std::fmt::Debug for InstanceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InstanceLedger")
            .field("live", &state.live.len())
            .field("per_class", &state.per_class)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tickets_settle_once() {
        let ledger = InstanceLedger::new();
        let class = ClassId([3; 16]);
        let first = ledger.open(class);
        let second = ledger.open(class);
        assert!(ledger.release(first));
        assert!(!ledger.release(first));
        assert!(ledger.force(second));
        assert!(!ledger.release(second));
        assert_eq!(
            ledger.counts(&class),
            LedgerCounts {
                created: 2,
                released: 1,
                forced: 1
            }
        );
        assert!(ledger.unbalanced().is_empty());
    }

    #[test]
    fn open_tickets_are_unbalanced() {
        let ledger = InstanceLedger::new();
        let class = ClassId([4; 16]);
        let ticket = ledger.open(class);
        assert!(ledger.is_live(ticket));
        let open = LedgerCounts {
            created: 1,
            released: 0,
            forced: 0,
        };
        assert_eq!(ledger.unbalanced(), vec![(class, open)]);
    }
}
