//! Shared helpers used by several node implementations.

use std::sync::Arc;

use ra_domain::error::{Error, Result};
use ra_domain::tool::Message;
use ra_providers::router::resolve_model;
use ra_providers::{ChatRequest, LlmProvider, ProviderRegistry};
use serde::de::DeserializeOwned;

/// Resolve a run's `"provider_id/model_name"` spec (e.g. `config.model`)
/// against the registry. Returns the provider and the model name to pass
/// on the request (empty model names become `None`, letting the provider
/// fall back to its own default).
pub fn resolve_provider(registry: &ProviderRegistry, model_spec: &str) -> Result<(Arc<dyn LlmProvider>, Option<String>)> {
    let (provider_id, model_name) = resolve_model(model_spec);
    let provider = registry
        .get(provider_id)
        .ok_or_else(|| Error::Config(format!("no provider registered for '{provider_id}' (from model spec '{model_spec}')")))?;
    let model = if model_name.is_empty() { None } else { Some(model_name.to_string()) };
    Ok((provider, model))
}

/// Send a structured-output request and parse the response as JSON.
///
/// Strips a markdown code fence if the model wrapped its JSON in one —
/// several providers do this even under `json_mode` when asked nicely for
/// prose-free output.
pub async fn call_structured<T: DeserializeOwned>(
    provider: &dyn LlmProvider,
    messages: Vec<Message>,
    model: Option<String>,
) -> Result<T> {
    let response = provider
        .chat(ChatRequest {
            messages,
            json_mode: true,
            model,
            ..Default::default()
        })
        .await?;
    parse_json_response(&response.content)
}

pub fn parse_json_response<T: DeserializeOwned>(content: &str) -> Result<T> {
    let body = strip_code_fence(content);
    serde_json::from_str(body).map_err(|e| Error::Validation(format!("structured output parse failed: {e}")))
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    for prefix in ["```json", "```"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.trim_end_matches("```").trim();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, PartialEq, Debug)]
    struct Foo {
        x: u32,
    }

    #[test]
    fn parses_bare_json() {
        let foo: Foo = parse_json_response(r#"{"x": 1}"#).unwrap();
        assert_eq!(foo, Foo { x: 1 });
    }

    #[test]
    fn strips_json_code_fence() {
        let foo: Foo = parse_json_response("```json\n{\"x\": 2}\n```").unwrap();
        assert_eq!(foo, Foo { x: 2 });
    }

    #[test]
    fn strips_bare_code_fence() {
        let foo: Foo = parse_json_response("```\n{\"x\": 3}\n```").unwrap();
        assert_eq!(foo, Foo { x: 3 });
    }

    #[test]
    fn malformed_json_is_an_error() {
        let result: Result<Foo> = parse_json_response("not json");
        assert!(result.is_err());
    }
}
