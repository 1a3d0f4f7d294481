#![forbid(unsafe_code)]

//! Terminal profile: which family we are talking to and what that implies.
//!
//! A [`TerminalProfile`] is built once per session from environment hints
//! and, when the terminal answers one, a DA2 reply. It is immutable after
//! that and shared by reference (`Arc`) with every component.

use std::sync::Arc;

use crate::key::KeyChord;
use crate::quirks::{self, Quirks, TerminalFamily};
use crate::width::AmbiguousWidth;

/// Where the family identification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifiedBy {
    /// Set explicitly (configuration or tests).
    Override,
    /// Environment variables such as `TERM_PROGRAM`.
    Environment,
    /// The terminal's DA2 reply.
    DeviceAttributes,
    /// Nothing matched; baseline profile.
    Fallback,
}

/// Environment hints used for identification.
///
/// Kept as a plain struct so identification can be tested without touching
/// the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectInputs {
    pub term: String,
    pub term_program: String,
    pub cloud_shell: bool,
    pub in_tmux: bool,
    pub in_screen: bool,
    pub kitty_window_id: bool,
    pub vte_version: bool,
    pub wezterm: bool,
    pub windows_terminal: bool,
}

impl DetectInputs {
    /// Read the hints from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read the hints through `get_env`.
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str| get_env(key).is_some_and(|v| !v.is_empty());
        Self {
            term: get_env("TERM").unwrap_or_default(),
            term_program: get_env("TERM_PROGRAM").unwrap_or_default(),
            cloud_shell: set("CLOUD_SHELL"),
            in_tmux: set("TMUX"),
            in_screen: set("STY"),
            kitty_window_id: set("KITTY_WINDOW_ID"),
            vte_version: set("VTE_VERSION"),
            wezterm: set("WEZTERM_EXECUTABLE"),
            windows_terminal: set("WT_SESSION"),
        }
    }

    /// The family the hints name outright, if any.
    fn family(&self) -> Option<TerminalFamily> {
        // Multiplexers sit between us and the real terminal, so they win.
        if self.in_tmux {
            return Some(TerminalFamily::Tmux);
        }
        if self.in_screen {
            return Some(TerminalFamily::Screen);
        }
        if self.cloud_shell {
            return Some(TerminalFamily::GoogleCloudShell);
        }
        match self.term_program.as_str() {
            "Apple_Terminal" => return Some(TerminalFamily::AppleTerminal),
            "iTerm.app" => return Some(TerminalFamily::ITerm2),
            "WezTerm" => return Some(TerminalFamily::WezTerm),
            _ => {}
        }
        if self.kitty_window_id || self.term == "xterm-kitty" {
            return Some(TerminalFamily::Kitty);
        }
        if self.wezterm {
            return Some(TerminalFamily::WezTerm);
        }
        if self.term == "alacritty" {
            return Some(TerminalFamily::Alacritty);
        }
        if self.vte_version {
            return Some(TerminalFamily::Vte);
        }
        if self.windows_terminal {
            // No quirks of its own beyond xterm's.
            return Some(TerminalFamily::Xterm);
        }
        if self.term == "linux" {
            return Some(TerminalFamily::LinuxConsole);
        }
        None
    }

    /// A generic `TERM` that only says "some xterm-compatible terminal".
    fn generic_xterm(&self) -> bool {
        self.term.starts_with("xterm")
    }
}

/// Immutable description of the terminal on the other end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalProfile {
    family: TerminalFamily,
    quirks: Quirks,
    identified_by: IdentifiedBy,
    /// DA2 `(terminal type, version)` when the terminal answered.
    device_attributes: Option<(u32, u32)>,
}

impl TerminalProfile {
    /// Profile for a family with its default quirks.
    #[must_use]
    pub const fn for_family(family: TerminalFamily) -> Self {
        Self {
            family,
            quirks: family.quirks(),
            identified_by: IdentifiedBy::Override,
            device_attributes: None,
        }
    }

    /// The least-capability profile.
    #[must_use]
    pub const fn baseline() -> Self {
        let mut profile = Self::for_family(TerminalFamily::Baseline);
        profile.identified_by = IdentifiedBy::Fallback;
        profile
    }

    /// Identify the terminal from environment hints and an optional DA2
    /// reply `(terminal type, version)`.
    ///
    /// Specific environment hints beat DA2, DA2 beats a generic
    /// `TERM=xterm*`, and anything unmatched falls back to
    /// [`baseline`](Self::baseline).
    #[must_use]
    pub fn identify(inputs: &DetectInputs, da2: Option<(u32, u32)>) -> Self {
        let mut profile = if let Some(family) = inputs.family() {
            let mut p = Self::for_family(family);
            p.identified_by = IdentifiedBy::Environment;
            p
        } else if let Some(family) = da2.and_then(|(kind, _)| TerminalFamily::from_da2(kind)) {
            let mut p = Self::for_family(family);
            p.identified_by = IdentifiedBy::DeviceAttributes;
            p
        } else if inputs.generic_xterm() {
            let mut p = Self::for_family(TerminalFamily::Xterm);
            p.identified_by = IdentifiedBy::Environment;
            p
        } else {
            crate::info!(
                term = %inputs.term,
                term_program = %inputs.term_program,
                "unknown terminal family, using baseline profile"
            );
            Self::baseline()
        };
        profile.device_attributes = da2;
        crate::debug!(family = %profile.family, by = ?profile.identified_by, "terminal identified");
        profile
    }

    /// Replace the quirk set wholesale.
    #[must_use]
    pub const fn with_quirks(mut self, quirks: Quirks) -> Self {
        self.quirks = quirks;
        self
    }

    /// Force the ambiguous-width policy.
    #[must_use]
    pub fn with_ambiguous_width(mut self, width: AmbiguousWidth) -> Self {
        self.quirks.set(Quirks::AMBIGUOUS_WIDE, width == AmbiguousWidth::Wide);
        self
    }

    /// Wrap the profile for sharing.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    #[must_use]
    pub const fn family(&self) -> TerminalFamily {
        self.family
    }

    #[must_use]
    pub const fn quirks(&self) -> Quirks {
        self.quirks
    }

    #[must_use]
    pub const fn identified_by(&self) -> IdentifiedBy {
        self.identified_by
    }

    #[must_use]
    pub const fn device_attributes(&self) -> Option<(u32, u32)> {
        self.device_attributes
    }

    #[must_use]
    pub const fn has(&self, quirk: Quirks) -> bool {
        self.quirks.contains(quirk)
    }

    #[must_use]
    pub fn ambiguous_width(&self) -> AmbiguousWidth {
        if self.has(Quirks::AMBIGUOUS_WIDE) {
            AmbiguousWidth::Wide
        } else {
            AmbiguousWidth::Narrow
        }
    }

    /// Family-specific meaning of a wire sequence.
    #[must_use]
    pub fn key_override(&self, wire: &[u8]) -> Option<KeyChord> {
        quirks::key_override(self.family, self.quirks, wire)
    }

    /// Whether `received` should trigger a binding for `wanted`.
    ///
    /// True when they are equal, or when this family cannot send `wanted`
    /// and `received` is its documented stand-in.
    #[must_use]
    pub fn chord_matches(&self, received: KeyChord, wanted: KeyChord) -> bool {
        received == wanted || quirks::chord_aliases(self.family, self.quirks, wanted).any(|a| a == received)
    }
}

impl Default for TerminalProfile {
    fn default() -> Self {
        Self::baseline()
    }
}
