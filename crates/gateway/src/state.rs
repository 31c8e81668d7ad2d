use std::sync::Arc;

use ra_cache::SearchCache;
use ra_domain::config::Config;
use ra_engine::cancel::CancelMap;
use ra_engine::checkpoint::Checkpointer;
use ra_providers::ProviderRegistry;
use ra_tools::registry::ToolRegistry;
use ra_triggers::TriggerManager;

/// Names of the two well-known tools the writer/searcher nodes look for in
/// the registry. Concrete search/code-execution tools are registered by
/// whoever embeds the gateway; the registry is a flat name→tool mapping
/// regardless of kind, so only the names need to be threaded through here.
#[derive(Debug, Clone)]
pub struct ToolNames {
    pub search: String,
    pub code: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self { search: "web_search".into(), code: "execute_python".into() }
    }
}

/// Shared application state passed to all API handlers and the run-driver.
///
/// Fields are grouped by concern:
/// - **Core services** — config, LLM providers, tools
/// - **Research engine** — search cache, cancellation, checkpoints
/// - **Triggers** — the C9 trigger manager (scheduled/webhook/event)
#[derive(Clone)]
pub struct AppState {
    // ── Core services ───────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub tool_names: ToolNames,

    // ── Research engine ─────────────────────────────────────────────
    pub cache: Arc<SearchCache>,
    pub cancel_map: Arc<CancelMap>,
    pub checkpointer: Arc<dyn Checkpointer>,

    // ── Triggers ─────────────────────────────────────────────────────
    pub triggers: Arc<TriggerManager>,
}

impl AppState {
    /// Build the shared state from a loaded [`Config`], wiring providers,
    /// cache, checkpointer and trigger manager against `config.server.state_dir`.
    /// Used by both the server startup path and the one-shot CLI `run` command.
    pub fn bootstrap(config: Config) -> anyhow::Result<Self> {
        let state_dir = std::path::PathBuf::from(&config.server.state_dir);

        let llm = ProviderRegistry::from_config(&config.llm)?;
        for err in llm.init_errors() {
            tracing::warn!(provider = %err.provider_id, error = %err.error, "provider failed to initialize");
        }

        let tools = ToolRegistry::new();
        let cache = SearchCache::new(
            config.cache.max_size,
            config.cache.ttl_secs,
            config.cache.similarity_threshold,
        );
        let cancel_map = CancelMap::new();
        let checkpointer = ra_engine::checkpoint::FileCheckpointer::new(&state_dir)?;

        let triggers_path = state_dir.join("triggers.json");
        let triggers = TriggerManager::load(&triggers_path, config.triggers.clone())?;

        Ok(Self {
            config: Arc::new(config),
            llm: Arc::new(llm),
            tools: Arc::new(tools),
            tool_names: ToolNames::default(),
            cache: Arc::new(cache),
            cancel_map: Arc::new(cancel_map),
            checkpointer: Arc::new(checkpointer),
            triggers: Arc::new(triggers),
        })
    }
}
