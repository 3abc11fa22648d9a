//! Per-thread configuration.
//!
//! Environment:
//!   - `TRACK_TURNS=enabled|disabled` switches turn tracking.
//!   - `DEBUG=...,track-turns,...` also enables it.

use core::cell::RefCell;

use serde::{Deserialize, Serialize};

/// Runtime switches for the eventual-send core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Annotate dispatch failures with the turn and call site of the send.
    pub track_turns: bool,
    /// Report rejected promises that nobody observed once the queue drains.
    pub report_unhandled_rejections: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            track_turns: false,
            report_unhandled_rejections: true,
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Config>> = const { RefCell::new(None) };
}

impl Config {
    /// Build a configuration from `TRACK_TURNS` and `DEBUG`.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("TRACK_TURNS").ok().as_deref(),
            std::env::var("DEBUG").ok().as_deref(),
        )
    }

    fn from_vars(track_turns: Option<&str>, debug: Option<&str>) -> Self {
        let debug_tracks = debug
            .map(|d| d.split(',').any(|part| part.trim() == "track-turns"))
            .unwrap_or(false);
        let track_turns = match track_turns.map(str::trim) {
            Some("enabled") => true,
            Some("disabled") => false,
            Some(other) => {
                tracing::warn!(value = other, "TRACK_TURNS must be 'enabled' or 'disabled'");
                debug_tracks
            }
            None => debug_tracks,
        };
        Self {
            track_turns,
            ..Self::default()
        }
    }

    /// The configuration active on this thread, read from the environment
    /// on first use.
    pub fn current() -> Config {
        CURRENT.with(|c| c.borrow_mut().get_or_insert_with(Config::from_env).clone())
    }

    /// Make `self` the active configuration on this thread.
    pub fn install(self) {
        CURRENT.with(|c| *c.borrow_mut() = Some(self));
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn env_values_select_tracking() {
        assert!(Config::from_vars(Some("enabled"), None).track_turns);
        assert!(!Config::from_vars(Some("disabled"), Some("track-turns")).track_turns);
        assert!(Config::from_vars(None, Some("vat, track-turns")).track_turns);
        assert!(!Config::from_vars(Some("bogus"), None).track_turns);
        assert!(!Config::from_vars(None, None).track_turns);
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: Config = serde_json::from_str(r#"{ "track-turns": true }"#).unwrap();
        assert!(cfg.track_turns);
        assert!(cfg.report_unhandled_rejections);
    }
}
