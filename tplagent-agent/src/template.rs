//! Actionable templates: a text- or HTML-flavored template plus the action
//! instances bound to it.
//!
//! The HTML flavor applies context-sensitive escaping; the text flavor writes
//! values through verbatim. Action-provided functions are registered under
//! `<action>_<function>` names and the bound actions are closed in LIFO order
//! exactly once, when the owning render worker exits.

use std::io;
use std::sync::Arc;

use minijinja::syntax::SyntaxConfig;
use minijinja::value::Rest;
use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value};
use thiserror::Error;

use crate::actions::{Action, TemplateFunc};
use crate::config::MissingKeyPolicy;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("could not read template source {path}: {source}")]
    ReadSource {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("no template source: one of raw or source is required")]
    MissingSource,

    #[error("parse error: {0}")]
    Parse(#[source] minijinja::Error),

    #[error("invalid delimiters: {0}")]
    Delimiters(#[source] minijinja::Error),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("error configuring action {action}: {source}")]
    ActionConfig {
        action: String,
        #[source]
        source: crate::actions::ActionError,
    },

    #[error("invalid template function name: {0}")]
    InvalidFunctionName(String),
}

/// Escaping flavor of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFlavor {
    Text,
    Html,
}

pub struct ActionableTemplate {
    env: Environment<'static>,
    name: String,
    flavor: TemplateFlavor,
    actions: Vec<Arc<dyn Action>>,
}

impl ActionableTemplate {
    pub fn new(name: &str, html: bool) -> Self {
        let mut env = Environment::new();
        let flavor = if html {
            env.set_auto_escape_callback(|_| AutoEscape::Html);
            TemplateFlavor::Html
        } else {
            env.set_auto_escape_callback(|_| AutoEscape::None);
            TemplateFlavor::Text
        };

        ActionableTemplate {
            env,
            name: name.to_string(),
            flavor,
            actions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flavor(&self) -> TemplateFlavor {
        self.flavor
    }

    /// Replace the default `{{`/`}}` variable delimiters.
    pub fn set_delimiters(&mut self, left: &str, right: &str) -> Result<(), TemplateError> {
        let syntax = SyntaxConfig::builder()
            .variable_delimiters(left.to_string(), right.to_string())
            .build()
            .map_err(TemplateError::Delimiters)?;
        self.env.set_syntax(syntax);
        Ok(())
    }

    pub fn set_missing_key_policy(&mut self, policy: MissingKeyPolicy) {
        let behavior = match policy {
            MissingKeyPolicy::EngineDefault => return,
            MissingKeyPolicy::Error => UndefinedBehavior::Strict,
            MissingKeyPolicy::Zero => UndefinedBehavior::Chainable,
            MissingKeyPolicy::Default => UndefinedBehavior::Lenient,
        };
        self.env.set_undefined_behavior(behavior);
    }

    pub fn parse(&mut self, text: &str) -> Result<(), TemplateError> {
        self.env
            .add_template_owned(self.name.clone(), text.to_string())
            .map_err(TemplateError::Parse)
    }

    /// Register template functions by name. Names must be valid identifiers;
    /// the action attach step namespaces them so this holds for well-formed
    /// action names.
    pub fn register_functions(
        &mut self,
        funcs: Vec<(String, TemplateFunc)>,
    ) -> Result<(), TemplateError> {
        for (name, func) in funcs {
            if !is_valid_function_name(&name) {
                return Err(TemplateError::InvalidFunctionName(name));
            }
            self.env
                .add_function(name, move |args: Rest<Value>| -> Result<Value, minijinja::Error> {
                    func(&args.0)
                });
        }
        Ok(())
    }

    /// Render the parsed template against `data` into `writer`.
    pub fn execute<W: io::Write>(
        &self,
        writer: &mut W,
        data: &Value,
    ) -> Result<(), minijinja::Error> {
        let template = self.env.get_template(&self.name)?;
        template.render_to_write(data.clone(), writer)?;
        Ok(())
    }

    pub fn add_action(&mut self, action: Arc<dyn Action>) {
        self.actions.push(action);
    }

    /// Close all bound actions in LIFO order and clear the binding set.
    pub fn close_actions(&mut self) {
        for action in self.actions.drain(..).rev() {
            action.close();
        }
    }
}

fn is_valid_function_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
