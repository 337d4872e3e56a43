use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::FactoryError;
use crate::instance::ComponentInstance;
use crate::ledger::{InstanceLedger, Ticket};
use crate::plugin::{ClassDescriptor, FactoryInfo, HostContext, PluginFactory};
use crate::uid::ClassId;

/// Classes advertised by a factory, in advertised order and without duplicates.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    pub classes: Vec<ClassDescriptor>,
    pub diagnostics: Vec<String>,
}

impl Enumeration {
    pub fn by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a ClassDescriptor> + 'a {
        self.classes.iter().filter(move |class| class.category == category)
    }

    pub fn audio_modules(&self) -> impl Iterator<Item = &ClassDescriptor> + '_ {
        self.classes.iter().filter(|class| class.is_audio_module())
    }

    pub fn find(&self, id: &ClassId) -> Option<&ClassDescriptor> {
        self.classes.iter().find(|class| class.id == *id)
    }
}

/// Enumerates a factory and hands out ledger-tracked component instances.
pub struct FactoryInspector {
    factory: Arc<dyn PluginFactory>,
    host: HostContext,
    ledger: InstanceLedger,
    known: Mutex<Option<HashSet<ClassId>>>,
}

impl FactoryInspector {
    pub fn new(factory: Arc<dyn PluginFactory>, host: HostContext) -> Self {
        Self {
            factory,
            host,
            ledger: InstanceLedger::new(),
            known: Mutex::new(None),
        }
    }

    pub fn factory_info(&self) -> Result<FactoryInfo, FactoryError> {
        self.factory.info()
    }

    pub fn enumerate(&self) -> Result<Enumeration, FactoryError> {
        let count = self.factory.class_count();
        let mut seen = HashSet::with_capacity(count);
        let mut enumeration = Enumeration::default();
        for index in 0..count {
            let descriptor = match self.factory.class_info(index) {
                Ok(descriptor) => descriptor,
                Err(err @ FactoryError::InvalidIndex { .. }) => return Err(err),
                Err(err) => {
                    enumeration
                        .diagnostics
                        .push(format!("class {index} could not be read: {err}"));
                    continue;
                }
            };
            if !seen.insert(descriptor.id) {
                enumeration.diagnostics.push(format!(
                    "class {index} ({}) repeats identifier {} and is ignored",
                    descriptor.name, descriptor.id
                ));
                continue;
            }
            enumeration.classes.push(descriptor);
        }
        debug!(
            classes = enumeration.classes.len(),
            diagnostics = enumeration.diagnostics.len(),
            "enumerated factory"
        );
        *self.known.lock() = Some(seen);
        Ok(enumeration)
    }

    fn is_known(&self, id: &ClassId) -> Result<bool, FactoryError> {
        if self.known.lock().is_none() {
            self.enumerate()?;
        }
        Ok(self.known.lock().as_ref().is_some_and(|known| known.contains(id)))
    }

    /// Creates an instance in state `Created`. Unknown identifiers are refused
    /// without calling the plug-in.
    pub fn create(&self, id: &ClassId) -> Result<ComponentInstance, FactoryError> {
        if !self.is_known(id)? {
            return Err(FactoryError::UnknownId(*id));
        }
        let component = self.factory.create_component(id)?;
        let ticket = self.ledger.open(*id);
        debug!(class = %id, ticket, "created instance");
        Ok(ComponentInstance::new(
            *id,
            component,
            ticket,
            self.ledger.clone(),
            self.host.clone(),
        ))
    }

    pub fn release(&self, instance: ComponentInstance) {
        instance.release();
    }

    pub fn force_release(&self, ticket: Ticket) -> bool {
        let forced = self.ledger.force(ticket);
        if forced {
            info!(ticket, "abandoned instance settled");
        }
        forced
    }

    pub fn ledger(&self) -> &InstanceLedger {
        &self.ledger
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }
}

impl std::fmt::Debug for FactoryInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryInspector")
            .field("host", &self.host)
            .field("ledger", &self.ledger)
            .finish()
    }
}
