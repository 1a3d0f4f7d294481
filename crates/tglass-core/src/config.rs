#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! Defaults suit an interactive session. Every knob can be overridden from
//! the environment; values that do not parse are ignored and the default is
//! kept.

use std::time::Duration;

use crate::probe::ProbeQuery;
use crate::profile::TerminalProfile;
use crate::quirks::TerminalFamily;
use crate::width::AmbiguousWidth;

/// Probe ceiling in milliseconds.
const ENV_PROBE_CEILING_MS: &str = "TGLASS_PROBE_CEILING_MS";
/// Disambiguation query kind (`dsr` or `cpr`).
const ENV_PROBE_QUERY: &str = "TGLASS_PROBE_QUERY";
/// Force a terminal family by name.
const ENV_FAMILY: &str = "TGLASS_FAMILY";
/// Force the ambiguous-width policy (`1/0/true/false`).
const ENV_AMBIGUOUS_WIDE: &str = "TGLASS_AMBIGUOUS_WIDE";
/// Dead-key composition (`1/0/true/false`).
const ENV_DEAD_KEYS: &str = "TGLASS_DEAD_KEYS";
/// Two-arrow jam detection (`1/0/true/false`).
const ENV_JAM_DETECTION: &str = "TGLASS_JAM_DETECTION";
/// Rows kept in scrollback.
const ENV_SCROLLBACK: &str = "TGLASS_SCROLLBACK";

const DEFAULT_PROBE_CEILING: Duration = Duration::from_millis(100);
const MAX_PROBE_CEILING: Duration = Duration::from_secs(5);
const DEFAULT_SCROLLBACK: usize = 10_000;
const DEFAULT_MAX_OUTSTANDING: usize = 8;

/// Tunables for [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long an ambiguous prefix waits for a probe reply.
    pub probe_ceiling: Duration,
    /// Query used to disambiguate (`DeviceStatus` or `CursorPosition`).
    pub probe_query: ProbeQuery,
    /// Force this family instead of detecting one.
    pub family_override: Option<TerminalFamily>,
    /// Force the ambiguous-width policy.
    pub ambiguous_width: Option<AmbiguousWidth>,
    /// A mouse-tracking session is open from the start.
    pub mouse_session: bool,
    /// Compose spacing accents with the following letter.
    pub dead_keys: bool,
    /// Merge two jammed orthogonal arrows into a diagonal.
    pub jam_detection: bool,
    pub scrollback_capacity: usize,
    /// Pipelined probe limit for families with ordered replies.
    pub max_outstanding_probes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_ceiling: DEFAULT_PROBE_CEILING,
            probe_query: ProbeQuery::DeviceStatus,
            family_override: None,
            ambiguous_width: None,
            mouse_session: false,
            dead_keys: true,
            jam_detection: true,
            scrollback_capacity: DEFAULT_SCROLLBACK,
            max_outstanding_probes: DEFAULT_MAX_OUTSTANDING,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `get_env`.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = get_env(ENV_PROBE_CEILING_MS).and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.probe_ceiling = Duration::from_millis(ms).clamp(Duration::from_millis(1), MAX_PROBE_CEILING);
        }
        if let Some(query) = get_env(ENV_PROBE_QUERY).and_then(|v| parse_query(&v)) {
            config.probe_query = query;
        }
        if let Some(value) = get_env(ENV_FAMILY) {
            match value.trim().parse::<TerminalFamily>() {
                Ok(family) => config.family_override = Some(family),
                Err(err) => {
                    crate::info!(error = %err, "ignoring {ENV_FAMILY}");
                }
            }
        }
        if let Some(wide) = env_bool(&get_env, ENV_AMBIGUOUS_WIDE) {
            config.ambiguous_width = Some(if wide {
                AmbiguousWidth::Wide
            } else {
                AmbiguousWidth::Narrow
            });
        }
        if let Some(value) = env_bool(&get_env, ENV_DEAD_KEYS) {
            config.dead_keys = value;
        }
        if let Some(value) = env_bool(&get_env, ENV_JAM_DETECTION) {
            config.jam_detection = value;
        }
        if let Some(rows) = get_env(ENV_SCROLLBACK).and_then(|v| v.trim().parse::<usize>().ok()) {
            config.scrollback_capacity = rows;
        }
        config
    }

    /// Apply the family and width overrides to a detected profile.
    #[must_use]
    pub fn apply_to(&self, profile: TerminalProfile) -> TerminalProfile {
        let profile = match self.family_override {
            Some(family) if family != profile.family() => TerminalProfile::for_family(family),
            _ => profile,
        };
        match self.ambiguous_width {
            Some(width) => profile.with_ambiguous_width(width),
            None => profile,
        }
    }
}

fn parse_query(value: &str) -> Option<ProbeQuery> {
    match value.trim().to_ascii_lowercase().as_str() {
        "dsr" | "status" => Some(ProbeQuery::DeviceStatus),
        "cpr" | "cursor" => Some(ProbeQuery::CursorPosition),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_bool<F>(get_env: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    get_env(key).and_then(|value| parse_bool(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn map_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn get_env<'a>(map: &'a HashMap<String, String>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_env_gives_defaults() {
        let env = map_env(&[]);
        assert_eq!(EngineConfig::from_env_with(get_env(&env)), EngineConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let env = map_env(&[
            (ENV_PROBE_CEILING_MS, "250"),
            (ENV_PROBE_QUERY, "CPR"),
            (ENV_FAMILY, "apple_terminal"),
            (ENV_AMBIGUOUS_WIDE, "yes"),
            (ENV_DEAD_KEYS, "off"),
            (ENV_JAM_DETECTION, "0"),
            (ENV_SCROLLBACK, "42"),
        ]);
        let config = EngineConfig::from_env_with(get_env(&env));
        assert_eq!(config.probe_ceiling, Duration::from_millis(250));
        assert_eq!(config.probe_query, ProbeQuery::CursorPosition);
        assert_eq!(config.family_override, Some(TerminalFamily::AppleTerminal));
        assert_eq!(config.ambiguous_width, Some(AmbiguousWidth::Wide));
        assert!(!config.dead_keys);
        assert!(!config.jam_detection);
        assert_eq!(config.scrollback_capacity, 42);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let env = map_env(&[
            (ENV_PROBE_CEILING_MS, "soon"),
            (ENV_PROBE_QUERY, "telepathy"),
            (ENV_FAMILY, "teletype"),
            (ENV_DEAD_KEYS, "maybe"),
        ]);
        assert_eq!(EngineConfig::from_env_with(get_env(&env)), EngineConfig::default());
    }

    #[test]
    fn ceiling_is_clamped() {
        let env = map_env(&[(ENV_PROBE_CEILING_MS, "0")]);
        let config = EngineConfig::from_env_with(get_env(&env));
        assert_eq!(config.probe_ceiling, Duration::from_millis(1));

        let env = map_env(&[(ENV_PROBE_CEILING_MS, "600000")]);
        let config = EngineConfig::from_env_with(get_env(&env));
        assert_eq!(config.probe_ceiling, MAX_PROBE_CEILING);
    }

    #[test]
    fn apply_to_forces_family_and_width() {
        let config = EngineConfig {
            family_override: Some(TerminalFamily::GoogleCloudShell),
            ambiguous_width: Some(AmbiguousWidth::Wide),
            ..EngineConfig::default()
        };
        let profile = config.apply_to(TerminalProfile::for_family(TerminalFamily::Xterm));
        assert_eq!(profile.family(), TerminalFamily::GoogleCloudShell);
        assert_eq!(profile.ambiguous_width(), AmbiguousWidth::Wide);
    }

    #[test]
    fn parse_bool_truthy_and_falsy() {
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool(" On "), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("garbage"), None);
    }
}
