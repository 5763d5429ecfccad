//! Locale tables and the bound message resolver.
//!
//! Resolution order is: exact language table, then the declared default
//! language, then the raw key itself — an unconfigured message degrades to
//! an identifier string instead of failing the request. Tables are nested
//! JSON objects addressed with dotted keys, merged explicitly; there is no
//! ambient global lookup.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

pub const DEFAULT_LANG: &str = "en";

/// Language-keyed message tables with a declared default language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Locales {
    default_lang: String,
    tables: Map<String, Value>,
}

impl Locales {
    pub fn new(default_lang: &str) -> Self {
        Self {
            default_lang: default_lang.to_string(),
            tables: Map::new(),
        }
    }

    /// The built-in English validation messages.
    pub fn builtin() -> Self {
        let mut locales = Self::new(DEFAULT_LANG);
        locales.merge(
            DEFAULT_LANG,
            json!({
                "validation": {
                    "required": "is required",
                    "minLength": "minimum length is %s",
                    "oneOf": "must be one of %s",
                    "unique": "has been taken",
                    "exists": "does not exist"
                }
            }),
        );
        locales
    }

    pub fn default_lang(&self) -> &str {
        &self.default_lang
    }

    /// Overlay `table` onto the existing table for `lang`. Objects merge
    /// recursively, leaves replace.
    pub fn merge(&mut self, lang: &str, table: Value) {
        let slot = self
            .tables
            .entry(lang.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        merge_value(slot, table);
    }

    /// Dotted-path lookup into one language table.
    pub fn lookup(&self, lang: &str, key: &str) -> Option<&str> {
        let mut node = self.tables.get(lang)?;
        for part in key.split('.') {
            node = node.get(part)?;
        }
        node.as_str()
    }
}

impl Default for Locales {
    fn default() -> Self {
        Self::builtin()
    }
}

fn merge_value(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}

/// A resolver bound to one set of locale tables; cheap to clone and share
/// across requests.
#[derive(Debug, Clone)]
pub struct Translator {
    locales: Arc<Locales>,
}

impl Translator {
    pub fn new(locales: Locales) -> Self {
        Self {
            locales: Arc::new(locales),
        }
    }

    /// Resolve `key` for `lang` (or the default chain) and substitute
    /// `args` positionally into `%s` placeholders.
    pub fn t(&self, key: &str, lang: Option<&str>, args: &[String]) -> String {
        let template = lang
            .and_then(|lang| self.locales.lookup(lang, key))
            .or_else(|| self.locales.lookup(self.locales.default_lang(), key));
        match template {
            Some(template) => interpolate(template, args),
            None => {
                debug!(target: "i18n", key, "message key not configured");
                key.to_string()
            }
        }
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(Locales::builtin())
    }
}

fn interpolate(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(pos) = rest.find("%s") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push_str("%s"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}
