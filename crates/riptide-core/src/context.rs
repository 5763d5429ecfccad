//! Per-request context consumed, never owned, by the core.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::action::ActionRegistry;
use riptide_i18n::Translator;
use riptide_protocol::Request;
use riptide_store::Store;

/// Raw request parameters: namespace name to object of submitted values,
/// plus an optional top-level `action` route fallback.
#[derive(Debug, Clone, Default)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self(Map::new()),
        }
    }

    pub fn namespace(&self, name: &str) -> Option<&Map<String, Value>> {
        self.0.get(name).and_then(Value::as_object)
    }

    /// The `action` route fallback, when the caller supplied one.
    pub fn action(&self) -> Option<&str> {
        self.0.get("action").and_then(Value::as_str)
    }

    /// Raw entries in submission order. Non-object entries (like `action`)
    /// are included; callers filter as needed.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// Everything the dispatcher needs for one request. Built by the transport
/// layer; the core only reads it.
#[derive(Clone)]
pub struct Context {
    pub registry: Arc<ActionRegistry>,
    pub req: Request,
    pub params: Params,
    pub store: Arc<dyn Store>,
    pub translator: Translator,
    pub lang: Option<String>,
}

impl Context {
    pub fn new(registry: Arc<ActionRegistry>, store: Arc<dyn Store>, translator: Translator) -> Self {
        Self {
            registry,
            req: Request::default(),
            params: Params::default(),
            store,
            translator,
            lang: None,
        }
    }

    pub fn with_route(mut self, route: &str) -> Self {
        self.req.route = Some(route.to_string());
        self
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.req.method = Some(method.to_string());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Params::from_value(params);
        self
    }

    pub fn with_lang(mut self, lang: &str) -> Self {
        self.lang = Some(lang.to_string());
        self
    }

    /// Localize through the bound resolver with this request's language.
    pub(crate) fn t(&self, key: &str, args: &[String]) -> String {
        self.translator.t(key, self.lang.as_deref(), args)
    }
}
