//! Runtime Configuration
//!
//! A small set of flags that change how the observer behaves:
//!
//! - `production`: suppresses diagnostics and custom setters.
//! - `server_rendering`: no new observers are created while set.
//! - `warn_handler`: receives diagnostics instead of the `tracing` log.
//!
//! Configuration is thread-local, like the reactive context. Hosts either
//! replace it wholesale with [`set`] or override it for a scope with
//! [`override_with`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;

use crate::error::Diagnostic;

/// Callback receiving every diagnostic emitted outside production mode.
pub type WarnHandler = Rc<dyn Fn(&Diagnostic)>;

/// Observer runtime configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Production builds stay silent and skip custom setters.
    pub production: bool,

    /// Server-side rendering never instruments state.
    pub server_rendering: bool,

    /// Overrides the default `tracing::warn!` sink for diagnostics.
    #[serde(skip)]
    pub warn_handler: Option<WarnHandler>,
}

impl Config {
    /// Parse the serializable flags from JSON.
    ///
    /// The warn handler cannot be expressed in JSON and is always `None`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Attach a warn handler.
    pub fn with_warn_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Diagnostic) + 'static,
    {
        self.warn_handler = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("production", &self.production)
            .field("server_rendering", &self.server_rendering)
            .field("warn_handler", &self.warn_handler.is_some())
            .finish()
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Get a copy of the current configuration.
pub fn current() -> Config {
    CONFIG.with(|config| config.borrow().clone())
}

/// Replace the configuration, returning the previous one.
pub fn set(config: Config) -> Config {
    CONFIG.with(|current| std::mem::replace(&mut *current.borrow_mut(), config))
}

/// Install `config` until the returned guard is dropped.
pub fn override_with(config: Config) -> ConfigGuard {
    ConfigGuard {
        previous: Some(set(config)),
    }
}

/// Read the configuration without cloning it.
pub(crate) fn with<R>(f: impl FnOnce(&Config) -> R) -> R {
    CONFIG.with(|config| f(&config.borrow()))
}

pub(crate) fn is_production() -> bool {
    with(|config| config.production)
}

pub(crate) fn is_server_rendering() -> bool {
    with(|config| config.server_rendering)
}

/// Restores the previous configuration when dropped.
#[must_use = "the override is undone as soon as the guard is dropped"]
pub struct ConfigGuard {
    previous: Option<Config>,
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            set(previous);
        }
    }
}
