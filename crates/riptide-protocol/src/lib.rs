//! Shared edge types for the dispatch pipeline.
//!
//! This crate holds the shapes that cross the boundary between the core and
//! whatever transport wraps it: the request line, the validation error
//! envelope, and the dispatch outcome. Types only, no behavior beyond
//! shaping.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

/// Request line as seen by the dispatcher. Routing by method/path to a
/// route name has already happened upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

impl Request {
    pub fn route(route: &str) -> Self {
        Self {
            route: Some(route.to_string()),
            method: None,
        }
    }
}

/// Field-addressable, localized validation failure result.
///
/// Namespaces appear in declaration order, fields within a namespace in
/// rule-declaration order, and each field carries one message per failing
/// rule. Namespaces with zero failures are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorEnvelope {
    namespaces: Vec<(String, Vec<(String, Vec<String>)>)>,
}

impl ErrorEnvelope {
    pub const MESSAGE: &'static str = "validation error";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Record the messages for one failing field. Empty message lists are
    /// dropped so a clean field never shows up in the envelope.
    pub fn insert(&mut self, namespace: &str, field: &str, messages: Vec<String>) {
        if messages.is_empty() {
            return;
        }
        let idx = match self.namespaces.iter().position(|(ns, _)| ns == namespace) {
            Some(idx) => idx,
            None => {
                self.namespaces.push((namespace.to_string(), Vec::new()));
                self.namespaces.len() - 1
            }
        };
        let fields = &mut self.namespaces[idx].1;
        match fields.iter_mut().find(|(f, _)| f == field) {
            Some((_, existing)) => existing.extend(messages),
            None => fields.push((field.to_string(), messages)),
        }
    }

    pub fn messages(&self, namespace: &str, field: &str) -> Option<&[String]> {
        self.namespaces
            .iter()
            .find(|(ns, _)| ns == namespace)
            .and_then(|(_, fields)| fields.iter().find(|(f, _)| f == field))
            .map(|(_, msgs)| msgs.as_slice())
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(|(ns, _)| ns.as_str())
    }

    /// Flat JSON rendering:
    /// `{"error":{"message":"validation error"},"<ns>":{"<field>":["..."]}}`.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(json!({"error": {"message": Self::MESSAGE}}))
    }
}

impl Serialize for ErrorEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.namespaces.len() + 1))?;
        map.serialize_entry("error", &json!({"message": Self::MESSAGE}))?;
        for (ns, fields) in &self.namespaces {
            let mut obj = Map::new();
            for (field, msgs) in fields {
                obj.insert(field.clone(), Value::from(msgs.clone()));
            }
            map.serialize_entry(ns, &obj)?;
        }
        map.end()
    }
}

/// Result of one dispatch. `Done` carries the handler's literal return
/// value; `NotFound` is the sentinel for an unknown route, distinguishable
/// from both success and validation failure. Rendering (status codes,
/// bodies) is a transport concern.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(Value),
    Invalid(ErrorEnvelope),
    NotFound,
}

impl Outcome {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Outcome::NotFound)
    }

    /// The handler's value, if validation passed.
    pub fn done(&self) -> Option<&Value> {
        match self {
            Outcome::Done(v) => Some(v),
            _ => None,
        }
    }

    pub fn invalid(&self) -> Option<&ErrorEnvelope> {
        match self {
            Outcome::Invalid(env) => Some(env),
            _ => None,
        }
    }
}
