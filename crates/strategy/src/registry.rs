use crate::Strategy;

/// A factory closure that produces a fresh strategy instance per
/// invocation. Strategies are stateless across bars in this model (all
/// state lives in `StrategyContext`), but instances are still cached one
/// per `strategy_universe` row (`spec.md` §4.2, "in-memory cache
/// instance_by_universe_id") in case a future plug-in wants to carry
/// scratch state between calls.
pub type StrategyFactory = Box<dyn Fn() -> Box<dyn Strategy> + Send + Sync>;

/// Errors returned by [`PluginRegistry`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("strategy '{name}' is already registered")]
    DuplicateName { name: String },
    #[error("no strategy named '{name}' is registered")]
    UnknownStrategy { name: String },
}

struct Entry {
    name: &'static str,
    factory: StrategyFactory,
}

/// Catalogue of available strategy plug-ins, keyed by the registry key
/// `strategy_catalog.registry_key()` resolves to (`spec.md` §4.2, dispatch
/// step 5, "resolve plug-in class ... obtain or construct a cached
/// instance"). Grounded on `mqk-strategy::plugin_registry::PluginRegistry`'s
/// `(name) -> Box<dyn Strategy>` factory map.
pub struct PluginRegistry {
    entries: Vec<Entry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register<F>(&mut self, name: &'static str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn Strategy> + Send + Sync + 'static,
    {
        if self.entries.iter().any(|e| e.name == name) {
            return Err(RegistryError::DuplicateName {
                name: name.to_string(),
            });
        }
        self.entries.push(Entry {
            name,
            factory: Box::new(factory),
        });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Instantiates a fresh strategy by its registry key.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Strategy>, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| (e.factory)())
            .ok_or_else(|| RegistryError::UnknownStrategy {
                name: name.to_string(),
            })
    }

    /// Registry keys in insertion order.
    pub fn list(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Built-in registry wired with the two demonstration strategies shipped in
/// [`crate::strategies`].
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry
        .register("sma_trend1_live", || {
            Box::new(crate::strategies::SmaTrend1::default())
        })
        .expect("builtin registration must not collide");
    registry
        .register("atr_trail_trend_live", || {
            Box::new(crate::strategies::AtrTrailTrend::default())
        })
        .expect("builtin registration must not collide");
    registry
}
