#![forbid(unsafe_code)]
//! Native Unix terminal driver for the tglass engine.
//!
//! The engine in `tglass-core` is pure: it takes bytes and timestamps and
//! hands back events and bytes to write. This crate supplies the rest of a
//! live session: raw mode on `/dev/tty`, a `poll(2)` read loop that wakes at
//! the engine's deadlines, SIGWINCH delivery, and terminal identification at
//! startup.
//!
//! ## Escape Sequence Reference
//!
//! | Purpose              | Sent            | Reply                      |
//! |----------------------|-----------------|----------------------------|
//! | Identify (DA2)       | `CSI > c`       | `CSI > Pp ; Pv ; Pc c`     |
//! | Status (DSR)         | `CSI 5 n`       | `CSI 0 n`                  |
//! | Cursor (CPR)         | `CSI 6 n`       | `CSI r ; c R`              |
//! | Mouse (SGR)          | `CSI ? 1000;1002;1006 h` / `l` | `CSI < b ; x ; y M/m` |

pub mod logging;

#[cfg(unix)]
mod session;

#[cfg(unix)]
pub use session::{IDENTIFY_TIMEOUT, Identification, RawModeGuard, TtyDriver, identify_terminal};
