//! Module construction registry.
//!
//! Maps a (thread name, type tag) pair onto a constructor. Constructors are
//! plain functions injected at startup — no global state — and return `None`
//! for malformed entries so one bad module never aborts the whole load.

use super::{Module, ModuleContext, blink, digipot, pwm, qei};
use pru_common::config::ModuleConfig;
use pru_common::protocol::{THREAD_BASE, THREAD_ON_LOAD, THREAD_SERVO};
use std::collections::HashMap;
use tracing::warn;

/// Constructor signature: build a module from its configuration entry, or
/// `None` when the entry is unusable.
pub type ModuleCtor = fn(&ModuleConfig, &ModuleContext) -> Option<Box<dyn Module>>;

/// Registry of available module constructors.
pub struct ModuleRegistry {
    ctors: HashMap<(String, String), ModuleCtor>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in module set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for thread in [THREAD_BASE, THREAD_SERVO] {
            registry.register(thread, "PWM", pwm::create);
            registry.register(thread, "QEI", qei::create);
            registry.register(thread, "Blink", blink::create);
        }
        registry.register(THREAD_ON_LOAD, "Digipot", digipot::create);
        registry
    }

    /// Register a constructor for a (thread, type) pair.
    ///
    /// # Panics
    /// Panics if the pair is already registered.
    pub fn register(&mut self, thread: &str, type_tag: &str, ctor: ModuleCtor) {
        let key = (thread.to_string(), type_tag.to_string());
        if self.ctors.insert(key, ctor).is_some() {
            panic!("module '{type_tag}' on thread '{thread}' is already registered");
        }
    }

    /// Build a module for a configuration entry.
    ///
    /// Returns `None` — after logging — for an unknown (thread, type) pair
    /// or when the constructor rejects the entry.
    pub fn create(
        &self,
        config: &ModuleConfig,
        ctx: &ModuleContext,
    ) -> Option<Box<dyn Module>> {
        let key = (config.thread.clone(), config.type_tag.clone());
        match self.ctors.get(&key) {
            Some(ctor) => ctor(config, ctx),
            None => {
                warn!(
                    "no module type '{}' registered for thread '{}'",
                    config.type_tag, config.thread
                );
                None
            }
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
