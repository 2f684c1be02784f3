//! HTTP/JSON action: fetches JSON documents from a configured base URL and
//! exposes them to templates as maps and slices.
//!
//! The functions run synchronously; render workers always execute templates
//! on blocking threads, which is where the blocking HTTP client is safe to
//! build and use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use minijinja::{ErrorKind, Value};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, Span};

use super::{Action, ActionEnv, ActionError, TemplateFunc};
use crate::config::duration;
use crate::config::expand::expand_str;
use crate::config::RawPayload;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Auth {
    pub basic_auth: HashMap<String, String>,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub auth: Option<Auth>,
    #[serde(deserialize_with = "duration::deserialize_optional_duration")]
    pub timeout: Option<Duration>,
    pub headers: HashMap<String, String>,
    pub error_statuses: Vec<u16>,
}

pub struct HttpJson {
    conf: Config,
    client: Mutex<Option<reqwest::blocking::Client>>,
    span: Span,
}

pub fn make() -> Box<dyn Action> {
    Box::new(HttpJson {
        conf: Config::default(),
        client: Mutex::new(None),
        span: Span::none(),
    })
}

fn override_from_env(env: &ActionEnv, c: &mut Config) -> Result<(), ActionError> {
    if let Some(base_url) = env.get("HTTPJSON_BASE_URL") {
        c.base_url = base_url;
    }

    if let Some(user) = env.get("HTTPJSON_AUTH_USER") {
        c.auth
            .get_or_insert_with(Auth::default)
            .basic_auth
            .insert("username".to_string(), user);
    }
    if let Some(pass) = env.get("HTTPJSON_AUTH_PASS") {
        c.auth
            .get_or_insert_with(Auth::default)
            .basic_auth
            .insert("password".to_string(), pass);
    }
    if let Some(token) = env.get("HTTPJSON_AUTH_TOKEN") {
        c.auth.get_or_insert_with(Auth::default).bearer_token = Some(token);
    }

    if let Some(statuses) = env.get("HTTPJSON_ERROR_STATUSES") {
        c.error_statuses = parse_error_statuses(&statuses).map_err(|e| ActionError::EnvOverride {
            key: "HTTPJSON_ERROR_STATUSES".to_string(),
            message: e,
        })?;
    }

    if let Some(timeout) = env.get("HTTPJSON_TIMEOUT") {
        let parsed =
            duration::parse_duration(&timeout).map_err(|e| ActionError::EnvOverride {
                key: "HTTPJSON_TIMEOUT".to_string(),
                message: e,
            })?;
        c.timeout = Some(parsed);
    }

    if let Some(headers) = env.get("HTTPJSON_HEADERS") {
        for part in headers.split(';') {
            let (k, v) = part.split_once(':').ok_or_else(|| ActionError::EnvOverride {
                key: "HTTPJSON_HEADERS".to_string(),
                message: format!("malformed header entry: {:?}", part),
            })?;
            c.headers.insert(k.trim().to_string(), v.trim().to_string());
        }
    }

    Ok(())
}

fn parse_error_statuses(statuses: &str) -> Result<Vec<u16>, String> {
    statuses
        .split(';')
        .map(|part| {
            part.trim()
                .parse::<u16>()
                .map_err(|_| format!("invalid status code: {:?}", part))
        })
        .collect()
}

impl HttpJson {
    fn full_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!(
            "{}/{}",
            self.conf.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn get_json(&self, endpoint: &str) -> Result<serde_json::Value, String> {
        let guard = self.client.lock();
        let client = guard.as_ref().ok_or("httpjson action is closed")?;

        let url = self.full_url(endpoint);
        self.span.in_scope(|| debug!(url = %url, "httpjson GET"));

        let mut request = client.get(&url);

        if let Some(auth) = &self.conf.auth {
            if !auth.basic_auth.is_empty() {
                let user = auth.basic_auth.get("username").map(|u| expand_str(u));
                let pass = auth.basic_auth.get("password").map(|p| expand_str(p));
                request = request.basic_auth(user.unwrap_or_default(), pass);
            } else if let Some(token) = &auth.bearer_token {
                request = request.header("Authorization", token.as_str());
            }
        }
        for (k, v) in &self.conf.headers {
            let key = expand_str(k);
            let value = expand_str(v);
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .send()
            .map_err(|e| format!("request for {} failed: {}", endpoint, e))?;

        let status = response.status().as_u16();
        if self.conf.error_statuses.contains(&status) {
            return Err(format!("request for {} failed with status {}", endpoint, status));
        }

        response
            .json::<serde_json::Value>()
            .map_err(|e| format!("invalid JSON body from {}: {}", endpoint, e))
    }
}

fn endpoint_arg(fn_name: &str, args: &[Value]) -> Result<String, minijinja::Error> {
    args.first()
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("{} expects an endpoint string", fn_name),
            )
        })
}

impl Action for HttpJson {
    fn set_config(&mut self, payload: &RawPayload, env: &ActionEnv) -> Result<(), ActionError> {
        let mut conf: Config = if payload.is_null() {
            Config::default()
        } else {
            payload.decode()?
        };
        override_from_env(env, &mut conf)?;

        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = conf.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| ActionError::Init(e.to_string()))?;

        *self.client.lock() = Some(client);
        self.conf = conf;
        Ok(())
    }

    fn set_logger(&mut self, span: Span) {
        self.span = span;
    }

    fn functions(self: Arc<Self>) -> Vec<(&'static str, TemplateFunc)> {
        let map_action = self.clone();
        let get_map: TemplateFunc = Box::new(move |args| {
            let endpoint = endpoint_arg("GET_Map", args)?;
            let body = map_action
                .get_json(&endpoint)
                .map_err(|e| minijinja::Error::new(ErrorKind::InvalidOperation, e))?;
            if !body.is_object() {
                return Err(minijinja::Error::new(
                    ErrorKind::InvalidOperation,
                    format!("response from {} is not a JSON object", endpoint),
                ));
            }
            Ok(Value::from_serialize(&body))
        });

        let slice_action = self;
        let get_slice: TemplateFunc = Box::new(move |args| {
            let endpoint = endpoint_arg("GET_Slice", args)?;
            let body = slice_action
                .get_json(&endpoint)
                .map_err(|e| minijinja::Error::new(ErrorKind::InvalidOperation, e))?;
            if !body.is_array() {
                return Err(minijinja::Error::new(
                    ErrorKind::InvalidOperation,
                    format!("response from {} is not a JSON array", endpoint),
                ));
            }
            Ok(Value::from_serialize(&body))
        });

        vec![("GET_Map", get_map), ("GET_Slice", get_slice)]
    }

    fn close(&self) {
        // Drops the HTTP client and its connection pool. Safe to call twice.
        *self.client.lock() = None;
    }
}

#[cfg(test)]
mod tests;
