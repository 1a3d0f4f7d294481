#![forbid(unsafe_code)]

//! Core: input frame lexing, escape disambiguation, key-chord resolution,
//! terminal quirks, column tracking, and shared-screen composition.
//!
//! The crate does no I/O. [`engine::Engine`] is fed raw bytes with a
//! timestamp and produces [`engine::EngineEvent`]s plus bytes to write back
//! to the terminal. `tglass-tty` drives it against a real TTY.

pub mod cell;
pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod key;
pub mod logging;
pub mod pointer;
pub mod probe;
pub mod profile;
pub mod quirks;
pub mod resolver;
pub mod scrollback;
pub mod width;

pub use config::EngineConfig;
pub use engine::{Engine, EngineEvent};
pub use error::{GlassError, Result};
pub use key::{KeyChord, Modifiers};
pub use profile::TerminalProfile;
pub use quirks::{Quirks, TerminalFamily};

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{debug, error, info, trace, warn};
