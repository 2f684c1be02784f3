//! Collection helpers for templates: keyed map access and indexed slice
//! access that yield undefined instead of erroring on a miss.

use std::sync::Arc;

use minijinja::{ErrorKind, Value};
use tracing::Span;

use super::{Action, ActionEnv, ActionError, TemplateFunc};
use crate::config::RawPayload;

pub struct Coll;

pub fn make() -> Box<dyn Action> {
    Box::new(Coll)
}

fn two_args<'a>(fn_name: &str, args: &'a [Value]) -> Result<(&'a Value, &'a Value), minijinja::Error> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("{} expects exactly two arguments", fn_name),
        )),
    }
}

impl Action for Coll {
    fn set_config(&mut self, _payload: &RawPayload, _env: &ActionEnv) -> Result<(), ActionError> {
        Ok(())
    }

    fn set_logger(&mut self, _span: Span) {}

    fn functions(self: Arc<Self>) -> Vec<(&'static str, TemplateFunc)> {
        let map_get: TemplateFunc = Box::new(|args| {
            let (key, map) = two_args("MapGet", args)?;
            Ok(map.get_item(key).unwrap_or(Value::UNDEFINED))
        });

        let slice_get: TemplateFunc = Box::new(|args| {
            let (index, seq) = two_args("SliceGet", args)?;
            if u64::try_from(index.clone()).is_err() {
                return Err(minijinja::Error::new(
                    ErrorKind::InvalidOperation,
                    "SliceGet expects a non-negative index",
                ));
            }
            Ok(seq.get_item(index).unwrap_or(Value::UNDEFINED))
        });

        vec![("MapGet", map_get), ("SliceGet", slice_get)]
    }

    fn close(&self) {}
}
