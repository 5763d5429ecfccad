//! Rule evaluation.
//!
//! Fields within a namespace are independent and evaluate concurrently;
//! rules within a field run in declaration order. An absent value only ever
//! fails `Required` — dependent rules are skipped so one missing field does
//! not cascade into a pile of errors. `Unique` and `Exists` are the only
//! kinds that touch the store, and only once the structural rules have left
//! the field well-formed enough to query.

use std::future::Future;
use std::pin::Pin;

use futures_util::future::join_all;
use serde_json::{Map, Value};
use tracing::warn;

use crate::action::{ActionSpec, FieldRule, RuleKind};
use crate::context::Context;
use riptide_protocol::ErrorEnvelope;
use riptide_store::{Filter, StoreError};

/// Evaluate every declared namespace of `spec` against the raw params.
/// An empty envelope means the request passed.
pub(crate) async fn validate_action(
    ctx: &Context,
    spec: &ActionSpec,
) -> Result<ErrorEnvelope, StoreError> {
    let mut envelope = ErrorEnvelope::new();
    for (namespace, rules) in spec.namespaces() {
        let values = ctx.params.namespace(namespace);
        let fields = group_by_field(rules);
        let results = join_all(
            fields
                .iter()
                .map(|(_, field_rules)| evaluate_field(ctx, values, field_rules)),
        )
        .await;
        for ((field, _), result) in fields.iter().zip(results) {
            envelope.insert(namespace, field, result?);
        }
    }
    Ok(envelope)
}

/// Rules grouped by field, preserving first-seen field order and
/// declaration order within each field.
fn group_by_field(rules: &[FieldRule]) -> Vec<(&str, Vec<&FieldRule>)> {
    let mut fields: Vec<(&str, Vec<&FieldRule>)> = Vec::new();
    for rule in rules {
        match fields.iter_mut().find(|(field, _)| *field == rule.field) {
            Some((_, bucket)) => bucket.push(rule),
            None => fields.push((&rule.field, vec![rule])),
        }
    }
    fields
}

/// All failure messages for one field, one per failing rule, in declared
/// order. Store-backed rules are skipped once a structural rule has failed.
async fn evaluate_field(
    ctx: &Context,
    values: Option<&Map<String, Value>>,
    rules: &[&FieldRule],
) -> Result<Vec<String>, StoreError> {
    let mut messages = Vec::new();
    let mut structural_failed = false;
    for rule in rules {
        if rule.kind.needs_store() && structural_failed {
            continue;
        }
        let failures = evaluate_rule(ctx, values, rule, 0).await?;
        if !failures.is_empty() && !rule.kind.needs_store() {
            structural_failed = true;
        }
        messages.extend(failures);
    }
    Ok(messages)
}

fn evaluate_rule<'a>(
    ctx: &'a Context,
    values: Option<&'a Map<String, Value>>,
    rule: &'a FieldRule,
    depth: usize,
) -> Pin<Box<dyn Future<Output = Result<Vec<String>, StoreError>> + Send + 'a>> {
    Box::pin(async move {
        let value = values.and_then(|object| object.get(rule.field.as_str()));
        let present = is_present(value);
        if matches!(rule.kind, RuleKind::Required) {
            return Ok(if present {
                Vec::new()
            } else {
                vec![localize(ctx, rule, Vec::new())]
            });
        }
        let Some(value) = value else {
            return Ok(Vec::new());
        };
        if !present {
            return Ok(Vec::new());
        }

        let messages = match &rule.kind {
            RuleKind::Required => Vec::new(),
            RuleKind::MinLength(min) => match length_of(value) {
                Some(len) if len >= *min => Vec::new(),
                _ => vec![localize(ctx, rule, vec![min.to_string()])],
            },
            RuleKind::OneOf(allowed) => {
                if allowed.contains(value) {
                    Vec::new()
                } else {
                    let joined = allowed
                        .iter()
                        .map(display_value)
                        .collect::<Vec<_>>()
                        .join(", ");
                    vec![localize(ctx, rule, vec![joined])]
                }
            }
            RuleKind::Unique { collection, scope } => {
                let mut filter = Filter::new().eq(&rule.field, value.clone());
                for scope_field in scope {
                    if let Some(scope_value) = values.and_then(|object| object.get(scope_field)) {
                        filter = filter.eq(scope_field, scope_value.clone());
                    }
                }
                let records = ctx.store.find(collection, &filter).await?;
                // On update the record being changed may keep its own value;
                // anything else holding it counts as taken.
                let current_id = ctx.params.namespace("query").and_then(|query| query.get("id"));
                let taken = records.iter().any(|record| match current_id {
                    Some(id) => record.get("id") != Some(id),
                    None => true,
                });
                if taken {
                    vec![localize(ctx, rule, Vec::new())]
                } else {
                    Vec::new()
                }
            }
            RuleKind::Exists { collection } => {
                let filter = Filter::new().eq("id", value.clone());
                let records = ctx.store.find(collection, &filter).await?;
                if records.is_empty() {
                    vec![localize(ctx, rule, Vec::new())]
                } else {
                    Vec::new()
                }
            }
            RuleKind::ArrayOf(nested_rules) => {
                if depth > 0 {
                    warn!(target: "validate", field = rule.field.as_str(), "array rules are only supported one level deep");
                    Vec::new()
                } else if let Value::Array(items) = value {
                    // Every element is checked; failures aggregate under the
                    // parent field without short-circuiting.
                    let mut combined = Vec::new();
                    for item in items {
                        let element = item.as_object();
                        for nested in nested_rules {
                            combined.extend(evaluate_rule(ctx, element, nested, depth + 1).await?);
                        }
                    }
                    combined
                } else {
                    Vec::new()
                }
            }
        };
        Ok(messages)
    })
}

fn localize(ctx: &Context, rule: &FieldRule, args: Vec<String>) -> String {
    let key = rule
        .message_key
        .as_deref()
        .unwrap_or_else(|| rule.kind.default_message_key());
    ctx.t(key, &args)
}

/// Present means: defined, non-null, and not an empty string or array.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{handler_fn, ActionRegistry};
    use riptide_i18n::Translator;
    use riptide_store::NoopStore;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx(params: Value) -> Context {
        Context::new(
            ActionRegistry::builder().build(),
            Arc::new(NoopStore),
            Translator::default(),
        )
        .with_params(params)
    }

    fn spec(rules: Vec<FieldRule>) -> ActionSpec {
        ActionSpec::new("test", handler_fn(|_| async { Ok(json!({})) }))
            .namespace("values", rules)
    }

    #[tokio::test]
    async fn absent_value_only_fails_required() {
        let spec = spec(vec![
            FieldRule::required("name"),
            FieldRule::min_length("name", 5),
            FieldRule::one_of("name", vec![json!("hello")]),
        ]);
        let envelope = validate_action(&ctx(json!({})), &spec).await.unwrap();
        assert_eq!(
            envelope.messages("values", "name"),
            Some(&["is required".to_string()][..])
        );
    }

    #[tokio::test]
    async fn empty_string_counts_as_absent() {
        let spec = spec(vec![
            FieldRule::required("name"),
            FieldRule::min_length("name", 5),
        ]);
        let envelope = validate_action(&ctx(json!({"values": {"name": ""}})), &spec)
            .await
            .unwrap();
        assert_eq!(
            envelope.messages("values", "name"),
            Some(&["is required".to_string()][..])
        );
    }

    #[tokio::test]
    async fn multi_rule_failures_accumulate_in_declared_order() {
        let spec = spec(vec![
            FieldRule::min_length("name", 5),
            FieldRule::one_of("name", vec![json!("hello"), json!("howdy")]),
        ]);
        let envelope = validate_action(&ctx(json!({"values": {"name": "hey"}})), &spec)
            .await
            .unwrap();
        assert_eq!(
            envelope.messages("values", "name"),
            Some(
                &[
                    "minimum length is 5".to_string(),
                    "must be one of hello, howdy".to_string()
                ][..]
            )
        );
    }

    #[tokio::test]
    async fn structural_failure_skips_store_rules() {
        // NoopStore errors on any lookup, so reaching the store would turn
        // this into an Err instead of a validation failure.
        let spec = spec(vec![
            FieldRule::min_length("email", 5),
            FieldRule::unique("email", "user"),
        ]);
        let envelope = validate_action(&ctx(json!({"values": {"email": "a@b"}})), &spec)
            .await
            .unwrap();
        assert_eq!(
            envelope.messages("values", "email"),
            Some(&["minimum length is 5".to_string()][..])
        );
    }

    #[tokio::test]
    async fn absent_value_skips_store_rules() {
        let spec = spec(vec![FieldRule::unique("email", "user")]);
        let envelope = validate_action(&ctx(json!({})), &spec).await.unwrap();
        assert!(envelope.is_empty());
    }

    #[tokio::test]
    async fn passing_namespace_is_absent_from_envelope() {
        let spec = spec(vec![FieldRule::required("name")]);
        let envelope = validate_action(&ctx(json!({"values": {"name": "ok"}})), &spec)
            .await
            .unwrap();
        assert!(envelope.is_empty());
        assert!(envelope.messages("values", "name").is_none());
    }

    #[tokio::test]
    async fn array_of_aggregates_all_element_failures() {
        let spec = spec(vec![FieldRule::array_of(
            "members",
            vec![
                FieldRule::required("name"),
                FieldRule::min_length("name", 3),
            ],
        )]);
        let envelope = validate_action(
            &ctx(json!({"values": {"members": [
                {"name": "ab"},
                {},
                {"name": "fine"}
            ]}})),
            &spec,
        )
        .await
        .unwrap();
        assert_eq!(
            envelope.messages("values", "members"),
            Some(
                &[
                    "minimum length is 3".to_string(),
                    "is required".to_string()
                ][..]
            )
        );
    }

    #[tokio::test]
    async fn min_length_counts_characters_and_elements() {
        let by_chars = spec(vec![FieldRule::min_length("name", 5)]);
        let ok = validate_action(&ctx(json!({"values": {"name": "héllo"}})), &by_chars)
            .await
            .unwrap();
        assert!(ok.is_empty());

        let by_elements = spec(vec![FieldRule::min_length("tags", 2)]);
        let short = validate_action(&ctx(json!({"values": {"tags": ["a"]}})), &by_elements)
            .await
            .unwrap();
        assert_eq!(
            short.messages("values", "tags"),
            Some(&["minimum length is 2".to_string()][..])
        );
    }

    #[tokio::test]
    async fn custom_message_key_overrides_the_default() {
        let spec = spec(vec![
            FieldRule::required("name").message_key("validation.bogus")
        ]);
        let envelope = validate_action(&ctx(json!({})), &spec).await.unwrap();
        // unconfigured keys degrade to the key string
        assert_eq!(
            envelope.messages("values", "name"),
            Some(&["validation.bogus".to_string()][..])
        );
    }
}
