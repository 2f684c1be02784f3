//! Shell-style `$VAR` / `${VAR}` expansion against the process environment.
//!
//! Expansion happens at configuration time: paths and exec args are frozen
//! before any render loop starts. A string that fails to expand (unknown
//! variable, bad syntax) passes through unchanged.

use std::borrow::Cow;

pub fn expand_str(s: &str) -> String {
    shellexpand::env(s)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| s.to_string())
}

pub fn expand_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| expand_str(v)).collect()
}
