//! The dispatcher: match the route, validate, filter, invoke.
//!
//! Validation failures and unknown routes are ordinary outcomes, never
//! errors. Only a failed store lookup or a failing handler surfaces as
//! `Err`, and handler errors pass through unwrapped.

use serde_json::{Map, Value};
use tracing::debug;

use crate::action::{ActionSpec, HandlerInput};
use crate::context::Context;
use crate::validate::validate_action;
use riptide_protocol::Outcome;
use riptide_store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("store lookup failed: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Handler(anyhow::Error),
}

/// Run one request through the pipeline:
/// route lookup, then validation across the declared namespaces, then — on
/// a clean envelope — the handler with the filtered parameter set.
pub async fn dispatch(ctx: &Context) -> Result<Outcome, DispatchError> {
    let route = ctx.req.route.as_deref().or_else(|| ctx.params.action());
    let Some(route) = route else {
        debug!(target: "dispatch", "request names no route");
        return Ok(Outcome::NotFound);
    };
    let Some(spec) = ctx.registry.get(route) else {
        debug!(target: "dispatch", route, "no action registered");
        return Ok(Outcome::NotFound);
    };

    debug!(target: "dispatch", route, "validating");
    let envelope = validate_action(ctx, &spec).await?;
    if !envelope.is_empty() {
        debug!(target: "dispatch", route, "validation failed");
        return Ok(Outcome::Invalid(envelope));
    }

    debug!(target: "dispatch", route, "executing");
    let input = filtered_input(ctx, &spec, route);
    let output = spec
        .handler()
        .call(input)
        .await
        .map_err(DispatchError::Handler)?;
    Ok(Outcome::Done(output))
}

/// Derive the handler's view of the params: per namespace, only the fields
/// the spec validates there plus the fields the keep selector names.
/// Everything else the client sent is dropped before the handler sees it.
fn filtered_input(ctx: &Context, spec: &ActionSpec, route: &str) -> HandlerInput {
    let kept = spec.keep_selector().selected(ctx);
    let mut params = Map::new();
    for (namespace, raw) in ctx.params.entries() {
        let Some(raw) = raw.as_object() else {
            // top-level scalars like the `action` route fallback
            continue;
        };
        let validated = spec.validated_fields(namespace);
        let mut filtered = Map::new();
        for (field, value) in raw {
            if validated.iter().any(|v| v == field) || kept.iter().any(|k| k == field) {
                filtered.insert(field.clone(), value.clone());
            }
        }
        params.insert(namespace.clone(), Value::Object(filtered));
    }
    HandlerInput {
        route: route.to_string(),
        method: ctx.req.method.clone(),
        params,
        lang: ctx.lang.clone(),
        store: ctx.store.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{handler_fn, ActionRegistry, FieldRule, Keep};
    use riptide_i18n::Translator;
    use riptide_store::NoopStore;
    use serde_json::json;
    use std::sync::Arc;

    fn echo_registry(keep: Keep) -> Arc<ActionRegistry> {
        ActionRegistry::builder()
            .register(
                ActionSpec::new(
                    "createProject",
                    handler_fn(|input| async move {
                        Ok(input
                            .namespace("query")
                            .cloned()
                            .map(Value::Object)
                            .unwrap_or(json!({})))
                    }),
                )
                .keep(keep),
            )
            .build()
    }

    fn ctx(registry: Arc<ActionRegistry>) -> Context {
        Context::new(registry, Arc::new(NoopStore), Translator::default())
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let out = dispatch(&ctx(echo_registry(Keep::default())).with_route("nope"))
            .await
            .unwrap();
        assert!(out.is_not_found());
    }

    #[tokio::test]
    async fn missing_route_is_not_found() {
        let out = dispatch(&ctx(echo_registry(Keep::default())))
            .await
            .unwrap();
        assert!(out.is_not_found());
    }

    #[tokio::test]
    async fn route_falls_back_to_action_param() {
        let context = ctx(echo_registry(Keep::fields(&["something"]))).with_params(json!({
            "action": "createProject",
            "query": { "something": 2 }
        }));
        let out = dispatch(&context).await.unwrap();
        assert_eq!(out.done(), Some(&json!({"something": 2})));
    }

    #[tokio::test]
    async fn kept_fields_reach_the_handler_and_evil_fields_do_not() {
        let context = ctx(echo_registry(Keep::fields(&["something", "other"])))
            .with_route("createProject")
            .with_params(json!({
                "query": { "something": 2, "other": 3, "evil": 666 }
            }));
        let out = dispatch(&context).await.unwrap();
        let query = out.done().unwrap();
        assert_eq!(query["something"], 2);
        assert_eq!(query["other"], 3);
        assert!(query.get("evil").is_none());
    }

    #[tokio::test]
    async fn keep_function_selects_from_the_context() {
        let keep = Keep::select(|ctx: &Context| {
            ctx.params
                .namespace("query")
                .map(|query| query.keys().filter(|k| *k != "evil").cloned().collect())
                .unwrap_or_default()
        });
        let context = ctx(echo_registry(keep))
            .with_route("createProject")
            .with_params(json!({
                "query": { "something": 2, "other": 3, "evil": 666 }
            }));
        let out = dispatch(&context).await.unwrap();
        let query = out.done().unwrap();
        assert_eq!(query["something"], 2);
        assert_eq!(query["other"], 3);
        assert!(query.get("evil").is_none());
    }

    #[tokio::test]
    async fn validated_fields_survive_filtering() {
        let registry = ActionRegistry::builder()
            .register(
                ActionSpec::new(
                    "createProject",
                    handler_fn(|input| async move {
                        Ok(input
                            .namespace("values")
                            .cloned()
                            .map(Value::Object)
                            .unwrap_or(json!({})))
                    }),
                )
                .namespace("values", vec![FieldRule::required("name")]),
            )
            .build();
        let context = ctx(registry).with_route("createProject").with_params(json!({
            "values": { "name": "hello", "evil": true }
        }));
        let out = dispatch(&context).await.unwrap();
        assert_eq!(out.done(), Some(&json!({"name": "hello"})));
    }

    #[tokio::test]
    async fn handler_errors_propagate_unwrapped() {
        let registry = ActionRegistry::builder()
            .register(ActionSpec::new(
                "explode",
                handler_fn(|_| async { anyhow::bail!("boom") }),
            ))
            .build();
        let err = dispatch(&ctx(registry).with_route("explode"))
            .await
            .expect_err("handler failure must surface");
        match err {
            DispatchError::Handler(inner) => assert_eq!(inner.to_string(), "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn store_failure_is_a_hard_error_not_a_validation_message() {
        let registry = ActionRegistry::builder()
            .register(
                ActionSpec::new("createUser", handler_fn(|_| async { Ok(json!({})) }))
                    .namespace("values", vec![FieldRule::unique("email", "user")]),
            )
            .build();
        // NoopStore refuses lookups, standing in for a broken backend.
        let context = ctx(registry).with_route("createUser").with_params(json!({
            "values": { "email": "test@example.com" }
        }));
        let err = dispatch(&context).await.expect_err("lookup must fail hard");
        assert!(matches!(err, DispatchError::Store(StoreError::Unavailable)));
    }
}
