//! Process-lifetime state shared by every batch.
//!
//! RULE: no module-level singletons. The gate and the entity cache live here,
//! and one context is created per server or CLI run and passed by reference.

use crate::{
    config::Settings,
    entity::EntityCache,
    gate::ConcurrencyGate,
    invoker::{SimulatorCommand, TrialInvoker},
};

pub struct FedsimContext {
    settings: Settings,
    gate:     ConcurrencyGate,
    entities: EntityCache,
}

impl FedsimContext {
    pub fn new(settings: Settings) -> Self {
        log::info!(
            "context: max_processes={} interpreter={} script={} timeout={:?}",
            settings.max_processes,
            settings.interpreter,
            settings.script.display(),
            settings.trial_timeout_secs
        );
        Self {
            gate:     ConcurrencyGate::new(settings.max_processes),
            entities: EntityCache::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn entities(&self) -> &EntityCache {
        &self.entities
    }

    pub fn invoker(&self) -> TrialInvoker<'_> {
        TrialInvoker::new(
            &self.gate,
            SimulatorCommand::from_settings(&self.settings),
            self.settings.simulation.clone(),
        )
    }
}
