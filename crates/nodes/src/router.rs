//! Router node: classifies a run's input into a `Route`, or honors an
//! explicit override from `config.search_mode`.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use ra_domain::config::{RunConfig, SearchMode};
use ra_domain::error::Result;
use ra_domain::run_state::{Route, RunState};
use ra_domain::tool::Message;
use ra_engine::graph::{Node, NodeOutput, PartialRunState};
use ra_providers::ProviderRegistry;

use crate::common::call_structured;

const ROUTER_SYSTEM_PROMPT: &str = "You classify a user's request into exactly one route: \
`direct` (a quick factual answer needs no research), `web` (a handful of web searches will \
answer it), `deep` (a multi-query research report is warranted), `agent` (the request needs \
iterative tool use, not a report), or `clarify` (the request is too ambiguous to act on). \
Respond with JSON: {\"route\": one of the above, \"confidence\": 0..1, \"reasoning\": str}.";

#[derive(Debug, Deserialize)]
struct RouteClassification {
    route: Route,
    confidence: f64,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
}

pub struct RouterNode {
    registry: Arc<ProviderRegistry>,
    config: RunConfig,
}

impl RouterNode {
    pub fn new(registry: Arc<ProviderRegistry>, config: RunConfig) -> Self {
        Self { registry, config }
    }
}

/// Map `config.search_mode` onto an explicit route, bypassing the
/// classifier entirely. `None` means the mode doesn't name a route (an
/// unrecognized string, or a `Flags` variant with nothing set) and the
/// classifier should decide instead.
fn search_mode_override(mode: &SearchMode) -> Option<Route> {
    match mode {
        SearchMode::Named(s) => match s.as_str() {
            "direct" => Some(Route::Direct),
            "web" => Some(Route::Web),
            "deep" => Some(Route::Deep),
            "agent" => Some(Route::Agent),
            "clarify" => Some(Route::Clarify),
            _ => None,
        },
        SearchMode::Flags {
            use_agent,
            use_deep_search,
            use_web,
        } => {
            if *use_agent {
                Some(Route::Agent)
            } else if *use_deep_search {
                Some(Route::Deep)
            } else if *use_web {
                Some(Route::Web)
            } else {
                None
            }
        }
    }
}

#[async_trait]
impl Node for RouterNode {
    fn name(&self) -> &str {
        "router"
    }

    async fn run(&self, state: &RunState, _task: Option<&serde_json::Value>) -> Result<NodeOutput> {
        if let Some(route) = search_mode_override(&self.config.search_mode) {
            return Ok(NodeOutput::Partial(PartialRunState {
                route: Some(route),
                ..Default::default()
            }));
        }

        let (provider, model) = crate::common::resolve_provider(&self.registry, &self.config.model)?;
        let messages = vec![Message::system(ROUTER_SYSTEM_PROMPT), Message::user(state.input.clone())];

        let route = match call_structured::<RouteClassification>(provider.as_ref(), messages, model).await {
            Ok(c) if c.confidence < self.config.routing_confidence_threshold => Route::Clarify,
            Ok(c) => c.route,
            Err(e) => {
                return Ok(NodeOutput::Partial(PartialRunState {
                    route: Some(Route::Clarify),
                    errors: vec![format!("router classification failed: {e}")],
                    ..Default::default()
                }));
            }
        };

        Ok(NodeOutput::Partial(PartialRunState {
            route: Some(route),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_mode_overrides_to_matching_route() {
        assert_eq!(search_mode_override(&SearchMode::Named("direct".into())), Some(Route::Direct));
        assert_eq!(search_mode_override(&SearchMode::Named("deep".into())), Some(Route::Deep));
    }

    #[test]
    fn unrecognized_named_mode_falls_through_to_classifier() {
        assert_eq!(search_mode_override(&SearchMode::Named("auto".into())), None);
    }

    #[test]
    fn flags_prefer_agent_over_deep_over_web() {
        let flags = SearchMode::Flags {
            use_web: true,
            use_agent: true,
            use_deep_search: true,
        };
        assert_eq!(search_mode_override(&flags), Some(Route::Agent));

        let flags = SearchMode::Flags {
            use_web: true,
            use_agent: false,
            use_deep_search: true,
        };
        assert_eq!(search_mode_override(&flags), Some(Route::Deep));
    }

    #[test]
    fn flags_all_false_falls_through_to_classifier() {
        let flags = SearchMode::Flags {
            use_web: false,
            use_agent: false,
            use_deep_search: false,
        };
        assert_eq!(search_mode_override(&flags), None);
    }
}
