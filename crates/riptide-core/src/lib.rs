//! Riptide core: the action dispatch and validation pipeline.
//!
//! The pipeline starts once a `(route, params, lang, store)` tuple exists:
//! resolve the action spec, validate and localize, and invoke the handler
//! with a filtered parameter set — or produce a structured error. Transports
//! and loaders sit outside this crate and talk to it through [`Context`]
//! and [`Outcome`].

pub mod action;
pub mod context;
pub mod dispatch;
mod validate;

pub use action::{
    handler_fn, ActionRegistry, ActionRegistryBuilder, ActionSpec, FieldRule, Handler,
    HandlerInput, Keep, RuleKind,
};
pub use context::{Context, Params};
pub use dispatch::{dispatch, DispatchError};

pub use riptide_i18n::{Locales, Translator};
pub use riptide_protocol::{ErrorEnvelope, Outcome, Request};
pub use riptide_store::{Filter, Store, StoreError};
