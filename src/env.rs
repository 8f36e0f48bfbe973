//! Environment bindings handed to every middleware.
//!
//! The third argument of [`Middleware::call`](crate::middleware::Middleware::call).
//! It is read-only for the lifetime of the server and shared across requests.

use std::collections::HashMap;

/// Conventional flag for verbose diagnostics.
pub const DEBUG_FLAG: &str = "CORRAL_DEBUG";

/// String key/value bindings (secrets, feature flags, upstream URLs…).
#[derive(Clone, Debug, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the process environment. Non-UTF-8 variables are skipped.
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    /// Adds a binding. Returns `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// `true` for `1`, `true`, `yes` or `on` (any case).
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        })
    }

    pub fn debug(&self) -> bool {
        self.flag(DEBUG_FLAG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_truthy_strings() {
        let env = Env::new()
            .with("A", "TRUE")
            .with("B", "0")
            .with(DEBUG_FLAG, "on");
        assert!(env.flag("A"));
        assert!(!env.flag("B"));
        assert!(!env.flag("MISSING"));
        assert!(env.debug());
        assert_eq!(env.get("B"), Some("0"));
    }
}
