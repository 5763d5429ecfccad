//! Action specs, field rules, and the registry the dispatcher reads.
//!
//! Specs are built once at application startup and held behind an `Arc`;
//! nothing in the core writes to them afterwards.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use crate::context::Context;
use riptide_store::Store;

/// One validation directive on one field within a namespace.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: String,
    pub kind: RuleKind,
    pub message_key: Option<String>,
}

#[derive(Debug, Clone)]
pub enum RuleKind {
    Required,
    MinLength(usize),
    OneOf(Vec<Value>),
    Unique {
        collection: String,
        scope: Vec<String>,
    },
    Exists {
        collection: String,
    },
    ArrayOf(Vec<FieldRule>),
}

impl RuleKind {
    pub fn default_message_key(&self) -> &'static str {
        match self {
            RuleKind::Required => "validation.required",
            RuleKind::MinLength(_) => "validation.minLength",
            RuleKind::OneOf(_) => "validation.oneOf",
            RuleKind::Unique { .. } => "validation.unique",
            RuleKind::Exists { .. } => "validation.exists",
            // ArrayOf inherits the nested rules' keys; it never renders its own.
            RuleKind::ArrayOf(_) => "validation.arrayOf",
        }
    }

    /// True for the kinds that need a store round-trip.
    pub fn needs_store(&self) -> bool {
        matches!(self, RuleKind::Unique { .. } | RuleKind::Exists { .. })
    }
}

impl FieldRule {
    pub fn new(field: &str, kind: RuleKind) -> Self {
        Self {
            field: field.to_string(),
            kind,
            message_key: None,
        }
    }

    pub fn required(field: &str) -> Self {
        Self::new(field, RuleKind::Required)
    }

    pub fn min_length(field: &str, min: usize) -> Self {
        Self::new(field, RuleKind::MinLength(min))
    }

    pub fn one_of(field: &str, allowed: Vec<Value>) -> Self {
        Self::new(field, RuleKind::OneOf(allowed))
    }

    pub fn unique(field: &str, collection: &str) -> Self {
        Self::new(
            field,
            RuleKind::Unique {
                collection: collection.to_string(),
                scope: Vec::new(),
            },
        )
    }

    pub fn unique_scoped(field: &str, collection: &str, scope: &[&str]) -> Self {
        Self::new(
            field,
            RuleKind::Unique {
                collection: collection.to_string(),
                scope: scope.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    pub fn exists(field: &str, collection: &str) -> Self {
        Self::new(
            field,
            RuleKind::Exists {
                collection: collection.to_string(),
            },
        )
    }

    pub fn array_of(field: &str, rules: Vec<FieldRule>) -> Self {
        Self::new(field, RuleKind::ArrayOf(rules))
    }

    /// Override the localization key for this rule.
    pub fn message_key(mut self, key: &str) -> Self {
        self.message_key = Some(key.to_string());
        self
    }
}

/// Selector for the fields that pass through to the handler unvalidated:
/// either a static list or a function of the request context.
#[derive(Clone)]
pub enum Keep {
    Fields(Vec<String>),
    Select(Arc<dyn Fn(&Context) -> Vec<String> + Send + Sync>),
}

impl Keep {
    pub fn fields(names: &[&str]) -> Self {
        Keep::Fields(names.iter().map(|n| n.to_string()).collect())
    }

    pub fn select(f: impl Fn(&Context) -> Vec<String> + Send + Sync + 'static) -> Self {
        Keep::Select(Arc::new(f))
    }

    pub fn selected(&self, ctx: &Context) -> Vec<String> {
        match self {
            Keep::Fields(fields) => fields.clone(),
            Keep::Select(f) => f(ctx),
        }
    }
}

impl Default for Keep {
    fn default() -> Self {
        Keep::Fields(Vec::new())
    }
}

impl fmt::Debug for Keep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Keep::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            Keep::Select(_) => f.write_str("Select(..)"),
        }
    }
}

/// The filtered view of a request handed to a business handler. Only
/// validated and kept fields survive in `params`.
#[derive(Clone)]
pub struct HandlerInput {
    pub route: String,
    pub method: Option<String>,
    pub params: Map<String, Value>,
    pub lang: Option<String>,
    pub store: Arc<dyn Store>,
}

impl HandlerInput {
    pub fn namespace(&self, name: &str) -> Option<&Map<String, Value>> {
        self.params.get(name).and_then(Value::as_object)
    }

    pub fn value(&self, namespace: &str, field: &str) -> Option<&Value> {
        self.namespace(namespace).and_then(|ns| ns.get(field))
    }
}

impl fmt::Debug for HandlerInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInput")
            .field("route", &self.route)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("lang", &self.lang)
            .finish()
    }
}

/// Business logic entry point. Invoked by the dispatcher after validation,
/// never inspected; errors propagate to the caller unchanged.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, input: HandlerInput) -> Result<Value>;
}

/// Adapt an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    struct FnHandler<F>(F);

    #[async_trait]
    impl<F, Fut> Handler for FnHandler<F>
    where
        F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        async fn call(&self, input: HandlerInput) -> Result<Value> {
            (self.0)(input).await
        }
    }

    Arc::new(FnHandler(f))
}

/// One named operation: its route, its per-namespace rules, its keep
/// selector, and its handler.
#[derive(Clone)]
pub struct ActionSpec {
    route: String,
    namespaces: Vec<(String, Vec<FieldRule>)>,
    keep: Keep,
    handler: Arc<dyn Handler>,
}

impl ActionSpec {
    pub fn new(route: &str, handler: Arc<dyn Handler>) -> Self {
        Self {
            route: route.to_string(),
            namespaces: Vec::new(),
            keep: Keep::default(),
            handler,
        }
    }

    /// Declare the ordered rule list for one namespace ("query", "values", …).
    pub fn namespace(mut self, name: &str, rules: Vec<FieldRule>) -> Self {
        self.namespaces.push((name.to_string(), rules));
        self
    }

    pub fn keep(mut self, keep: Keep) -> Self {
        self.keep = keep;
        self
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn namespaces(&self) -> &[(String, Vec<FieldRule>)] {
        &self.namespaces
    }

    pub fn keep_selector(&self) -> &Keep {
        &self.keep
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Field names declared for validation in `namespace`, in rule order.
    pub fn validated_fields(&self, namespace: &str) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        if let Some((_, rules)) = self.namespaces.iter().find(|(ns, _)| ns == namespace) {
            for rule in rules {
                if !fields.contains(&rule.field.as_str()) {
                    fields.push(&rule.field);
                }
            }
        }
        fields
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("route", &self.route)
            .field("namespaces", &self.namespaces)
            .field("keep", &self.keep)
            .finish()
    }
}

/// Route name to action spec table. Built once at startup, read-only for
/// the process lifetime.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<ActionSpec>>,
}

impl ActionRegistry {
    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder::default()
    }

    pub fn get(&self, route: &str) -> Option<Arc<ActionSpec>> {
        self.actions.get(route).cloned()
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Default)]
pub struct ActionRegistryBuilder {
    actions: HashMap<String, Arc<ActionSpec>>,
}

impl ActionRegistryBuilder {
    pub fn register(mut self, spec: ActionSpec) -> Self {
        if self.actions.contains_key(spec.route()) {
            warn!(target: "registry", route = spec.route(), "route registered twice; keeping the last definition");
        }
        self.actions.insert(spec.route().to_string(), Arc::new(spec));
        self
    }

    pub fn build(self) -> Arc<ActionRegistry> {
        Arc::new(ActionRegistry {
            actions: self.actions,
        })
    }
}
