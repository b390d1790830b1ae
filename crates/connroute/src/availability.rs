//! Availability checks against the process environment.

use crate::Strategy;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Source of environment variables.
///
/// [`ProcessEnv`] reads the real process environment. [`StaticEnv`] holds an
/// explicit map and is what tests inject.
pub trait Environment: Send + Sync {
    /// Returns the value of a variable, if set and valid UTF-8.
    fn var(&self, name: &str) -> Option<String>;

    /// Returns true if the variable is set to a non-empty value.
    fn is_set(&self, name: &str) -> bool {
        self.var(name).is_some_and(|value| !value.is_empty())
    }
}

impl<E: Environment + ?Sized> Environment for Arc<E> {
    fn var(&self, name: &str) -> Option<String> {
        (**self).var(name)
    }

    fn is_set(&self, name: &str) -> bool {
        (**self).is_set(name)
    }
}

/// The real process environment, read at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn is_set(&self, name: &str) -> bool {
        std::env::var_os(name).is_some_and(|value| !value.is_empty())
    }
}

/// An in-memory environment.
///
/// Clones share the same variables, so a test can keep a handle and change
/// values after the resolver has been built.
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    vars: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticEnv {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable, builder style.
    pub fn with(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a variable.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    /// Removes a variable.
    pub fn remove(&self, name: &str) {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

impl Environment for StaticEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// Why a strategy was passed over during selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The required environment variable is unset or empty.
    EnvVarNotSet(String),
}

impl SkipReason {
    /// Returns the environment variable whose absence caused the skip.
    pub fn missing_env_var(&self) -> Option<&str> {
        match self {
            Self::EnvVarNotSet(name) => Some(name),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvVarNotSet(name) => write!(f, "env var {} not set", name),
        }
    }
}

impl Serialize for SkipReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Checks whether a strategy can be used right now.
pub fn check(strategy: &Strategy, env: &dyn Environment) -> Result<(), SkipReason> {
    match strategy.required_env_var() {
        None => Ok(()),
        Some(name) if env.is_set(name) => Ok(()),
        Some(name) => Err(SkipReason::EnvVarNotSet(name.to_string())),
    }
}

/// Returns true if the strategy's environment prerequisite is satisfied.
pub fn is_available(strategy: &Strategy, env: &dyn Environment) -> bool {
    check(strategy, env).is_ok()
}

/// Returns true if the strategy is usable against the process environment.
pub fn available(strategy: &Strategy) -> bool {
    is_available(strategy, &ProcessEnv)
}
