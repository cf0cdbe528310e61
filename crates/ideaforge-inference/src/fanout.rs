//! Provider registry and concurrent fan-out.
//!
//! All enabled research adapters are invoked concurrently; the aggregator
//! waits for every outcome, success or failure, before returning. One slow
//! adapter stretches the call but never aborts the set.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use ideaforge_core::{
    defaults, Error, FailureKind, ProviderFailure, ProvidersConfig, RawCompletion, Result,
};

use crate::adapter::{AdapterConfig, ProviderAdapter};

/// One adapter registered for fan-out and/or deepening.
struct RegisteredProvider {
    adapter: Arc<ProviderAdapter>,
    enabled: bool,
    deepening_only: bool,
}

/// Outcome of one provider's retried call during fan-out.
#[derive(Debug)]
pub struct AttemptOutcome {
    pub provider: String,
    pub model: String,
    pub result: std::result::Result<RawCompletion, ProviderFailure>,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Registry of configured provider adapters.
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
    fast_mode: bool,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new(fast_mode: bool) -> Self {
        Self {
            providers: Vec::new(),
            fast_mode,
        }
    }

    /// Build the registry from configuration: the distinguished default
    /// adapter first, then every configured research model.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self> {
        let mut registry = Self::new(config.fast_mode);

        let default_spec = ideaforge_core::ProviderSpec {
            name: defaults::DEFAULT_PROVIDER.to_string(),
            model: config.default_model.clone(),
            api_key: None,
            base_url: None,
            enabled: true,
            deepening_only: false,
        };
        registry.register(
            Arc::new(ProviderAdapter::from_spec(&default_spec, config)?),
            true,
            false,
        );

        for spec in &config.research_models {
            registry.register(
                Arc::new(ProviderAdapter::from_spec(spec, config)?),
                spec.enabled,
                spec.deepening_only,
            );
        }

        info!(
            providers = ?registry.provider_names(),
            fast_mode = config.fast_mode,
            "Provider registry initialized"
        );
        Ok(registry)
    }

    /// Register an adapter with its fan-out effects.
    pub fn register(
        &mut self,
        adapter: Arc<ProviderAdapter>,
        enabled: bool,
        deepening_only: bool,
    ) {
        debug!(
            provider = adapter.name(),
            model = adapter.model(),
            enabled,
            deepening_only,
            "Registering provider adapter"
        );
        self.providers.push(RegisteredProvider {
            adapter,
            enabled,
            deepening_only,
        });
    }

    /// All registered provider names.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.adapter.name()).collect()
    }

    /// The distinguished default adapter.
    pub fn default_adapter(&self) -> Option<Arc<ProviderAdapter>> {
        self.resolve(defaults::DEFAULT_PROVIDER)
    }

    /// Look up an adapter by name (deepening may target any registered
    /// provider, including deepening-only ones).
    pub fn resolve(&self, name: &str) -> Option<Arc<ProviderAdapter>> {
        self.providers
            .iter()
            .find(|p| p.adapter.name() == name)
            .map(|p| p.adapter.clone())
    }

    /// Resolve an adapter for deepening: the named provider, or the default
    /// adapter when no name is given.
    pub fn resolve_for_deepening(&self, name: Option<&str>) -> Result<Arc<ProviderAdapter>> {
        match name {
            Some(name) => self
                .resolve(name)
                .ok_or_else(|| Error::InvalidInput(format!("unknown provider '{name}'"))),
            None => self
                .default_adapter()
                .ok_or_else(|| Error::Config("no default provider registered".to_string())),
        }
    }

    /// Adapters participating in research fan-out.
    fn research_adapters(&self) -> Vec<Arc<ProviderAdapter>> {
        if self.fast_mode {
            return self.default_adapter().into_iter().collect();
        }
        self.providers
            .iter()
            .filter(|p| p.enabled && !p.deepening_only)
            .map(|p| p.adapter.clone())
            .collect()
    }

    /// Invoke every research adapter concurrently and collect every outcome.
    ///
    /// Exactly one outcome is returned per dispatched adapter, in registry
    /// order. A panicking adapter task is reported as a transport failure
    /// for that provider rather than aborting the set.
    pub async fn execute_all(&self, system: &str, user: &str) -> Vec<AttemptOutcome> {
        let adapters = self.research_adapters();
        debug!(
            provider_count = adapters.len(),
            fast_mode = self.fast_mode,
            "Dispatching research fan-out"
        );

        let mut tasks = JoinSet::new();
        for (slot, adapter) in adapters.iter().enumerate() {
            let adapter = adapter.clone();
            let system = system.to_string();
            let user = user.to_string();
            tasks.spawn(async move {
                let result = adapter.call(&system, &user).await;
                (
                    slot,
                    AttemptOutcome {
                        provider: adapter.name().to_string(),
                        model: adapter.model().to_string(),
                        result,
                    },
                )
            });
        }

        let mut slots: Vec<Option<AttemptOutcome>> =
            (0..adapters.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, outcome)) => slots[slot] = Some(outcome),
                Err(e) => warn!(error = ?e, "Fan-out task panicked"),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(slot, outcome)| {
                outcome.unwrap_or_else(|| AttemptOutcome {
                    provider: adapters[slot].name().to_string(),
                    model: adapters[slot].model().to_string(),
                    result: Err(ProviderFailure::new(
                        FailureKind::Transport,
                        "adapter task panicked",
                    )),
                })
            })
            .collect()
    }
}

/// Build an adapter around an arbitrary backend (used by tests and by the
/// registry construction above).
pub fn adapter_with_backend(
    name: &str,
    backend: Arc<dyn ideaforge_core::ChatBackend>,
) -> Arc<ProviderAdapter> {
    Arc::new(ProviderAdapter::new(
        AdapterConfig {
            name: name.to_string(),
            model: backend.model_name().to_string(),
            ..Default::default()
        },
        backend,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockChatBackend, ScriptedReply};
    use std::collections::HashSet;

    fn registry_of(mocks: Vec<(&str, MockChatBackend)>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new(false);
        for (name, mock) in mocks {
            registry.register(adapter_with_backend(name, Arc::new(mock)), true, false);
        }
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn returns_one_outcome_per_adapter() {
        let registry = registry_of(vec![
            ("a", MockChatBackend::new("m-a").with_reply(ScriptedReply::text("one"))),
            (
                "b",
                MockChatBackend::new("m-b")
                    .with_reply(ScriptedReply::failure(FailureKind::ClientError, "bad")),
            ),
            ("c", MockChatBackend::new("m-c").with_reply(ScriptedReply::text("three"))),
        ]);

        let outcomes = registry.execute_all("sys", "user").await;
        assert_eq!(outcomes.len(), 3);

        let names: HashSet<&str> = outcomes.iter().map(|o| o.provider.as_str()).collect();
        assert_eq!(names, HashSet::from(["a", "b", "c"]));
        assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_never_aborts_the_set() {
        let registry = registry_of(vec![
            (
                "slow",
                MockChatBackend::new("m")
                    .with_reply(ScriptedReply::hang())
                    .with_reply(ScriptedReply::hang())
                    .with_reply(ScriptedReply::hang()),
            ),
            ("ok", MockChatBackend::new("m").with_reply(ScriptedReply::text("fine"))),
        ]);

        let outcomes = registry.execute_all("sys", "user").await;
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].is_success());
        assert_eq!(
            outcomes[0].result.as_ref().unwrap_err().kind,
            FailureKind::Timeout
        );
        assert!(outcomes[1].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_preserve_registry_order() {
        let registry = registry_of(vec![
            ("first", MockChatBackend::new("m").with_reply(ScriptedReply::text("1"))),
            ("second", MockChatBackend::new("m").with_reply(ScriptedReply::text("2"))),
        ]);

        let outcomes = registry.execute_all("", "").await;
        assert_eq!(outcomes[0].provider, "first");
        assert_eq!(outcomes[1].provider, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_and_deepening_only_adapters_are_skipped() {
        let mut registry = ProviderRegistry::new(false);
        registry.register(
            adapter_with_backend(
                "on",
                Arc::new(MockChatBackend::new("m").with_reply(ScriptedReply::text("x"))),
            ),
            true,
            false,
        );
        registry.register(
            adapter_with_backend("off", Arc::new(MockChatBackend::new("m"))),
            false,
            false,
        );
        registry.register(
            adapter_with_backend("deepen", Arc::new(MockChatBackend::new("m"))),
            true,
            true,
        );

        let outcomes = registry.execute_all("", "").await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].provider, "on");

        // Still resolvable for deepening.
        assert!(registry.resolve("deepen").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn fast_mode_restricts_to_default_adapter() {
        let mut registry = ProviderRegistry::new(true);
        registry.register(
            adapter_with_backend(
                defaults::DEFAULT_PROVIDER,
                Arc::new(MockChatBackend::new("m").with_reply(ScriptedReply::text("d"))),
            ),
            true,
            false,
        );
        registry.register(
            adapter_with_backend(
                "extra",
                Arc::new(MockChatBackend::new("m").with_reply(ScriptedReply::text("e"))),
            ),
            true,
            false,
        );

        let outcomes = registry.execute_all("", "").await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].provider, defaults::DEFAULT_PROVIDER);
    }

    #[tokio::test]
    async fn resolve_for_deepening_falls_back_to_default() {
        let mut registry = ProviderRegistry::new(false);
        registry.register(
            adapter_with_backend(
                defaults::DEFAULT_PROVIDER,
                Arc::new(MockChatBackend::new("m")),
            ),
            true,
            false,
        );

        let adapter = registry.resolve_for_deepening(None).unwrap();
        assert_eq!(adapter.name(), defaults::DEFAULT_PROVIDER);
        assert!(registry.resolve_for_deepening(Some("ghost")).is_err());
    }
}
