#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, Read, Stdout, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use signal_hook::consts::signal::SIGWINCH;
use signal_hook::iterator::Signals;
use tglass_core::frame::FrameLexer;
use tglass_core::probe::{CapabilityReply, ProbeQuery, parse_reply};
use tglass_core::profile::DetectInputs;
use tglass_core::{Engine, EngineConfig, EngineEvent, GlassError, TerminalProfile};

/// How long startup identification waits for the terminal to answer.
pub const IDENTIFY_TIMEOUT: Duration = Duration::from_millis(250);

const READ_BUF: usize = 4096;

/// DA2 first so the status reply marks the end of the answers.
const IDENTIFY_QUERIES: [ProbeQuery; 2] =
    [ProbeQuery::SecondaryAttributes, ProbeQuery::DeviceStatus];

// ── Raw Mode Guard ───────────────────────────────────────────────────────

/// RAII guard that saves the original termios and restores it on drop.
///
/// Raw mode also turns off signal generation, so Ctrl+C arrives as an
/// ordinary key.
pub struct RawModeGuard {
    original_termios: nix::sys::termios::Termios,
    tty: File,
}

impl RawModeGuard {
    /// Enter raw mode on the controlling terminal.
    pub fn enter() -> io::Result<Self> {
        let tty = File::open("/dev/tty")?;

        let original_termios = nix::sys::termios::tcgetattr(&tty).map_err(io::Error::other)?;

        let mut raw = original_termios.clone();
        nix::sys::termios::cfmakeraw(&mut raw);
        nix::sys::termios::tcsetattr(&tty, nix::sys::termios::SetArg::TCSAFLUSH, &raw)
            .map_err(io::Error::other)?;

        Ok(Self {
            original_termios,
            tty,
        })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = nix::sys::termios::tcsetattr(
            &self.tty,
            nix::sys::termios::SetArg::TCSAFLUSH,
            &self.original_termios,
        );
    }
}

// ── Resize Notifications ─────────────────────────────────────────────────

// SIGWINCH is watched on a dedicated thread so no handler code runs in
// signal context. The thread only posts into a channel of depth one.
#[derive(Debug)]
struct ResizeSignalGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ResizeSignalGuard {
    fn new(tx: mpsc::SyncSender<()>) -> io::Result<Self> {
        let mut signals = Signals::new([SIGWINCH]).map_err(io::Error::other)?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            for _ in signals.forever() {
                // Storms coalesce: the size is read fresh when handled.
                let _ = tx.try_send(());
            }
        });

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for ResizeSignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ── Readiness ────────────────────────────────────────────────────────────

/// Wait until `fd` is readable or `timeout` passes. An interrupted wait
/// counts as not ready.
fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> io::Result<bool> {
    let mut poll_fds = [nix::poll::PollFd::new(fd, nix::poll::PollFlags::POLLIN)];
    // Round up so a sub-millisecond wait does not spin.
    let timeout_ms: u16 = timeout
        .as_micros()
        .div_ceil(1000)
        .try_into()
        .unwrap_or(u16::MAX);
    match nix::poll::poll(&mut poll_fds, nix::poll::PollTimeout::from(timeout_ms)) {
        Ok(n) => Ok(n > 0),
        Err(nix::errno::Errno::EINTR) => Ok(false),
        Err(e) => Err(io::Error::other(e)),
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ── Identification ───────────────────────────────────────────────────────

/// Result of startup identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub profile: TerminalProfile,
    /// Input that arrived during identification and is not a reply. Feed
    /// it to the engine first.
    pub pending: Vec<u8>,
}

/// Ask the terminal who it is (DA2), then wait for a status reply or
/// `timeout`. Environment hints fill in when the terminal stays silent.
///
/// # Errors
///
/// I/O errors on the reader or writer.
pub fn identify_terminal<R, W>(
    reader: &mut R,
    writer: &mut W,
    inputs: &DetectInputs,
    timeout: Duration,
) -> io::Result<Identification>
where
    R: Read + AsFd,
    W: Write,
{
    for query in IDENTIFY_QUERIES {
        writer.write_all(query.bytes())?;
    }
    writer.flush()?;

    let start = Instant::now();
    let deadline = start + timeout;
    let mut lexer = FrameLexer::new();
    let mut da2 = None;
    let mut pending = Vec::new();
    let mut answered = false;
    let mut buf = [0u8; READ_BUF];

    while !answered {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        if !wait_readable(reader.as_fd(), deadline - now)? {
            continue;
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if is_transient(e) => continue,
            Err(e) => return Err(e),
        };
        for frame in lexer.feed(&buf[..n]) {
            if frame.is_marker() {
                continue;
            }
            match parse_reply(&frame) {
                Some(CapabilityReply::SecondaryAttributes {
                    terminal_type,
                    version,
                }) => da2 = Some((terminal_type, version)),
                Some(CapabilityReply::DeviceOk) => answered = true,
                _ => pending.extend(frame.to_bytes()),
            }
        }
    }

    let mut rest = Vec::new();
    lexer.resolve_pending(&mut rest);
    for frame in rest.into_iter().filter(|f| !f.is_marker()) {
        pending.extend(frame.to_bytes());
    }

    if !answered {
        tracing::info!(
            waited_ms = start.elapsed().as_millis() as u64,
            "no reply to identification, using environment hints"
        );
    }
    Ok(Identification {
        profile: TerminalProfile::identify(inputs, da2),
        pending,
    })
}

// ── Driver ───────────────────────────────────────────────────────────────

/// Runs an [`Engine`] against a byte source and sink.
///
/// Reads wait on `poll(2)` for at most the caller's timeout or the engine's
/// next deadline, whichever is sooner, so escape disambiguation and dead-key
/// timeouts fire on time without busy-waiting.
pub struct TtyDriver<R: Read + AsFd, W: Write> {
    // Field order matters for drop: raw_mode is restored last.
    engine: Engine,
    reader: R,
    writer: W,
    resize_rx: Option<mpsc::Receiver<()>>,
    _resize_guard: Option<ResizeSignalGuard>,
    closed: bool,
    close_reported: bool,
    raw_mode: Option<RawModeGuard>,
}

impl TtyDriver<File, Stdout> {
    /// Open a live session on the controlling terminal: raw mode, startup
    /// identification, and resize notifications.
    ///
    /// The terminal is restored on drop.
    pub fn open(config: EngineConfig) -> io::Result<Self> {
        let raw_mode = RawModeGuard::enter()?;
        let mut reader = File::open("/dev/tty")?;
        let mut writer = io::stdout();
        let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));

        let id = identify_terminal(
            &mut reader,
            &mut writer,
            &DetectInputs::from_env(),
            IDENTIFY_TIMEOUT,
        )?;
        let profile = config.apply_to(id.profile);
        tracing::info!(family = %profile.family(), rows, cols, "session opened");

        let engine = Engine::new(profile.shared(), config, rows, cols);
        let mut driver = Self::new(engine, reader, writer);
        driver.raw_mode = Some(raw_mode);
        driver.watch_resize();
        if !id.pending.is_empty() {
            driver.engine.feed(&id.pending, Instant::now());
        }
        driver.flush()?;
        Ok(driver)
    }
}

impl<R: Read + AsFd, W: Write> TtyDriver<R, W> {
    /// Drive `engine` from `reader`, writing to `writer`. No raw mode and no
    /// signal handling.
    pub fn new(engine: Engine, reader: R, writer: W) -> Self {
        Self {
            engine,
            reader,
            writer,
            resize_rx: None,
            _resize_guard: None,
            closed: false,
            close_reported: false,
            raw_mode: None,
        }
    }

    /// Start delivering SIGWINCH as [`EngineEvent::Resize`].
    pub fn watch_resize(&mut self) {
        let (tx, rx) = mpsc::sync_channel(1);
        match ResizeSignalGuard::new(tx) {
            Ok(guard) => {
                self._resize_guard = Some(guard);
                self.resize_rx = Some(rx);
            }
            Err(err) => tracing::warn!(error = %err, "resize notifications unavailable"),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    #[must_use]
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Whether the driver holds the terminal in raw mode.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.raw_mode.is_some()
    }

    /// Write whatever the engine has queued for the terminal.
    pub fn flush(&mut self) -> io::Result<()> {
        let out = self.engine.take_output();
        if !out.is_empty() {
            self.writer.write_all(&out)?;
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `Ok(None)` on timeout. End of input is reported once as
    /// [`GlassError::StreamClosed`] after every event before it; later
    /// calls return `Ok(None)`.
    ///
    /// # Errors
    ///
    /// [`GlassError::StreamClosed`] and [`GlassError::Io`], both fatal.
    pub fn next_event(&mut self, timeout: Duration) -> tglass_core::Result<Option<EngineEvent>> {
        let limit = Instant::now() + timeout;
        loop {
            self.check_resize();
            let now = Instant::now();
            self.engine.tick(now);
            self.flush()?;

            if let Some(event) = self.engine.poll_event() {
                return Ok(Some(event));
            }
            if self.closed {
                if self.close_reported {
                    return Ok(None);
                }
                self.close_reported = true;
                tracing::error!("input stream closed");
                return Err(GlassError::StreamClosed);
            }
            if now >= limit {
                return Ok(None);
            }

            let wake = self
                .engine
                .next_deadline()
                .map_or(limit, |deadline| deadline.min(limit));
            if wait_readable(self.reader.as_fd(), wake.saturating_duration_since(now))? {
                self.read_available()?;
            }
        }
    }

    fn read_available(&mut self) -> io::Result<()> {
        let mut buf = [0u8; READ_BUF];
        match self.reader.read(&mut buf) {
            Ok(0) => {
                self.closed = true;
                self.engine.finish(Instant::now());
                Ok(())
            }
            Ok(n) => {
                self.engine.feed(&buf[..n], Instant::now());
                Ok(())
            }
            Err(ref e) if is_transient(e) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "read failed");
                Err(e)
            }
        }
    }

    fn check_resize(&mut self) {
        let Some(rx) = &self.resize_rx else {
            return;
        };
        if rx.try_recv().is_err() {
            return;
        }
        match crossterm::terminal::size() {
            Ok((cols, rows)) if (rows, cols) != self.engine.screen_size() => {
                self.engine.resize(rows, cols);
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "could not read screen size"),
        }
    }
}

impl<R: Read + AsFd, W: Write> Drop for TtyDriver<R, W> {
    fn drop(&mut self) {
        if self.engine.mouse_session() {
            self.engine.set_mouse_session(false);
        }
        // Flush before RawModeGuard restores termios.
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;
    use tglass_core::key::{Direction, KeyChord, Modifiers, NamedKey};
    use tglass_core::profile::IdentifiedBy;
    use tglass_core::TerminalFamily;

    /// Create a (reader_file, writer_stream) pair using Unix sockets.
    fn pipe_pair() -> (File, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        let reader: File = std::os::fd::OwnedFd::from(a).into();
        (reader, b)
    }

    fn driver(reader: File, config: EngineConfig) -> TtyDriver<File, Vec<u8>> {
        let profile = TerminalProfile::for_family(TerminalFamily::Xterm).shared();
        TtyDriver::new(Engine::new(profile, config, 24, 80), reader, Vec::new())
    }

    fn key(event: Option<EngineEvent>) -> KeyChord {
        match event {
            Some(EngineEvent::Key(chord)) => chord,
            other => panic!("expected key, got {other:?}"),
        }
    }

    #[test]
    fn pipe_ascii_chars() {
        let (reader, mut writer) = pipe_pair();
        let mut drv = driver(reader, EngineConfig::default());
        writer.write_all(b"abc").unwrap();
        let wait = Duration::from_millis(200);
        assert_eq!(key(drv.next_event(wait).unwrap()), KeyChord::from_char('a'));
        assert_eq!(key(drv.next_event(wait).unwrap()), KeyChord::from_char('b'));
        assert_eq!(key(drv.next_event(wait).unwrap()), KeyChord::from_char('c'));
    }

    #[test]
    fn pipe_ctrl_c_is_a_key() {
        let (reader, mut writer) = pipe_pair();
        let mut drv = driver(reader, EngineConfig::default());
        writer.write_all(&[0x03]).unwrap();
        assert_eq!(
            key(drv.next_event(Duration::from_millis(200)).unwrap()),
            KeyChord::from_char('c').with_modifiers(Modifiers::CONTROL)
        );
    }

    #[test]
    fn pipe_lone_escape_resolves_at_deadline() {
        let (reader, mut writer) = pipe_pair();
        let mut drv = driver(reader, EngineConfig::default());
        writer.write_all(b"\x1b").unwrap();
        let start = Instant::now();
        assert_eq!(
            key(drv.next_event(Duration::from_secs(2)).unwrap()),
            KeyChord::named(NamedKey::Escape)
        );
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(drv.writer().as_slice(), b"\x1b[5n");
    }

    #[test]
    fn pipe_split_arrow_and_late_reply() {
        let (reader, mut writer) = pipe_pair();
        let mut drv = driver(reader, EngineConfig::default());
        writer.write_all(b"\x1b").unwrap();
        assert!(drv.next_event(Duration::from_millis(10)).unwrap().is_none());

        writer.write_all(b"[D").unwrap();
        assert_eq!(
            key(drv.next_event(Duration::from_millis(200)).unwrap()),
            KeyChord::arrow(Direction::Left)
        );

        writer.write_all(b"\x1b[0n").unwrap();
        assert!(drv.next_event(Duration::from_millis(50)).unwrap().is_none());
    }

    #[test]
    fn timeout_without_input() {
        let (reader, _writer) = pipe_pair();
        let mut drv = driver(reader, EngineConfig::default());
        assert!(drv.next_event(Duration::from_millis(20)).unwrap().is_none());
    }

    #[test]
    fn eof_reported_once() {
        let (reader, mut writer) = pipe_pair();
        let mut drv = driver(reader, EngineConfig::default());
        writer.write_all(b"x").unwrap();
        drop(writer);
        let wait = Duration::from_millis(200);
        assert_eq!(key(drv.next_event(wait).unwrap()), KeyChord::from_char('x'));
        assert!(matches!(drv.next_event(wait), Err(GlassError::StreamClosed)));
        assert!(drv.next_event(wait).unwrap().is_none());
    }

    #[test]
    fn initial_mouse_session_is_enabled() {
        let (reader, _writer) = pipe_pair();
        let config = EngineConfig {
            mouse_session: true,
            ..EngineConfig::default()
        };
        let mut drv = driver(reader, config);
        drv.flush().unwrap();
        assert_eq!(drv.writer().as_slice(), b"\x1b[?1000;1002;1006h");
        assert!(!drv.is_live());
    }

    #[test]
    fn identify_from_device_attributes() {
        let (mut reader, mut writer) = pipe_pair();
        writer.write_all(b"\x1b[>41;379;0c\x1b[0nq").unwrap();
        let mut sent = Vec::<u8>::new();
        let id = identify_terminal(
            &mut reader,
            &mut sent,
            &DetectInputs::default(),
            Duration::from_millis(500),
        )
        .unwrap();
        assert_eq!(sent, b"\x1b[>c\x1b[5n");
        assert_eq!(id.profile.family(), TerminalFamily::Xterm);
        assert_eq!(id.profile.identified_by(), IdentifiedBy::DeviceAttributes);
        assert_eq!(id.profile.device_attributes(), Some((41, 379)));
        assert_eq!(id.pending, b"q");
    }

    #[test]
    fn identify_keeps_keys_typed_during_startup() {
        let (mut reader, mut writer) = pipe_pair();
        writer.write_all(b"\x1b[A\x1b[>1;95;0c\x1bx\x1b[0n").unwrap();
        let id = identify_terminal(
            &mut reader,
            &mut Vec::<u8>::new(),
            &DetectInputs::default(),
            Duration::from_millis(500),
        )
        .unwrap();
        assert_eq!(id.pending, b"\x1b[A\x1bx");
    }

    #[test]
    fn identify_falls_back_to_environment() {
        let (mut reader, _writer) = pipe_pair();
        let inputs = DetectInputs {
            term_program: "Apple_Terminal".into(),
            ..DetectInputs::default()
        };
        let id =
            identify_terminal(&mut reader, &mut Vec::<u8>::new(), &inputs, Duration::from_millis(30))
                .unwrap();
        assert_eq!(id.profile.family(), TerminalFamily::AppleTerminal);
        assert_eq!(id.profile.identified_by(), IdentifiedBy::Environment);
        assert!(id.pending.is_empty());
    }
}
