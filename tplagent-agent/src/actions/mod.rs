//! Pluggable template actions: the lifecycle contract, the process-wide
//! registry, and the prefixed environment view handed to each action.
//!
//! An action is configured exactly once (`set_config`) before its functions
//! are installed on a template, and closed exactly once after the owning
//! render worker's last tick. Registering two actions under the same name is
//! a programmer error and panics at registry construction.

mod coll;
mod httpjson;


use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use minijinja::Value;
use thiserror::Error;
use tracing::Span;

use crate::config::{ActionConfig, RawPayload};
use crate::template::{ActionableTemplate, TemplateError};

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("config decode error: {0}")]
    Decode(#[from] serde_yaml::Error),

    #[error("error reading key {key}: {message}")]
    EnvOverride { key: String, message: String },

    #[error("init error: {0}")]
    Init(String),
}

/// A template function supplied by an action. Arguments arrive as raw engine
/// values; the function validates its own arity and types.
pub type TemplateFunc =
    Box<dyn Fn(&[Value]) -> Result<Value, minijinja::Error> + Send + Sync + 'static>;

/// The lifecycle contract every action implements.
pub trait Action: Send + Sync {
    /// Decode configuration from the opaque payload and apply environment
    /// overrides. Called exactly once, before `functions`.
    fn set_config(&mut self, payload: &RawPayload, env: &ActionEnv) -> Result<(), ActionError>;

    /// Inject the structured logging span scoped to the owning template.
    fn set_logger(&mut self, span: Span);

    /// The template functions this action exposes. Callable after
    /// `set_config`; the returned closures share the configured instance.
    fn functions(self: Arc<Self>) -> Vec<(&'static str, TemplateFunc)>;

    /// Idempotent cleanup of held resources.
    fn close(&self);
}

pub type ActionFactory = fn() -> Box<dyn Action>;

const ENV_PREFIX: &str = "TPLA";

/// A prefixed view of the process environment. A lookup of key `K` for
/// template `my-app` resolves `TPLA_MY_APP_K`.
pub struct ActionEnv {
    prefix: String,
}

impl ActionEnv {
    pub fn for_template(template_name: &str) -> Self {
        let sanitized = template_name.to_uppercase().replace('-', "_");
        ActionEnv {
            prefix: format!("{}_{}", ENV_PREFIX, sanitized),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}_{}", self.prefix, key)).ok()
    }
}

static REGISTRY: LazyLock<HashMap<&'static str, ActionFactory>> = LazyLock::new(|| {
    let mut registry = HashMap::new();
    register(&mut registry, "httpjson", httpjson::make);
    register(&mut registry, "coll", coll::make);
    registry
});

fn register(
    registry: &mut HashMap<&'static str, ActionFactory>,
    name: &'static str,
    factory: ActionFactory,
) {
    if registry.insert(name, factory).is_some() {
        panic!("action {} registered twice", name);
    }
}

pub fn lookup(name: &str) -> Option<ActionFactory> {
    REGISTRY.get(name).copied()
}

pub fn registered_names() -> Vec<&'static str> {
    let mut names: Vec<_> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Construct, configure and bind each configured action to the template,
/// installing its functions under `<action>_<function>` names.
pub fn attach(
    template: &mut ActionableTemplate,
    configs: &[ActionConfig],
    span: &Span,
) -> Result<(), TemplateError> {
    for ac in configs {
        let factory =
            lookup(&ac.name).ok_or_else(|| TemplateError::UnknownAction(ac.name.clone()))?;

        let mut action = factory();
        let env = ActionEnv::for_template(template.name());
        action
            .set_config(&ac.config, &env)
            .map_err(|e| TemplateError::ActionConfig {
                action: ac.name.clone(),
                source: e,
            })?;
        action.set_logger(span.clone());

        let action: Arc<dyn Action> = Arc::from(action);
        let namespaced = action
            .clone()
            .functions()
            .into_iter()
            .map(|(name, func)| (format!("{}_{}", ac.name, name), func))
            .collect();
        template.register_functions(namespaced)?;
        template.add_action(action);
    }
    Ok(())
}
