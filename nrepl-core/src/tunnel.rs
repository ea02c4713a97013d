//! Full-duplex line bridge between a host and an nREPL socket.
//!
//! Output lines are JSON envelopes `[0, payload]`:
//!
//! - `[0, ["status", ""]]` once the connection is up,
//! - `[0, <response>]` for every message received from the server,
//! - `[0, ["exception", <report>]]` for faults (see [`Report`]).
//!
//! Input lines are JSON payloads, bare or wrapped as `[seq, payload]`.
//! Dictionaries are bencoded onto the socket, strings are written verbatim.
use std::{
    io::{self, BufRead, Write},
    sync::{mpsc, Arc, Mutex, PoisonError},
    thread,
};

use log::{debug, error, warn};
use serde::Serialize;
use serde_json::Value;

use crate::{
    bencoded::Entry,
    connection::{Connection, Inbound, Outbound},
    error::{Error, ErrorKind, Result},
    quickfix::Report,
};

/// How a tunnel session ended. Maps onto the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// End of input or a clean end of stream from the server.
    Normal,
    /// Could not connect.
    ConnectFailed,
    /// Connected, but could not start bridging.
    SetupFailed,
    /// The socket direction failed mid-session.
    ReceiveFailed,
}

impl Exit {
    pub fn code(self) -> i32 {
        match self {
            Exit::Normal => 0,
            Exit::ConnectFailed => 2,
            Exit::SetupFailed => 3,
            Exit::ReceiveFailed => 4,
        }
    }
}

/// Writes envelopes to a shared output, one complete line per lock.
#[derive(Debug)]
pub struct Notifier<W> {
    out: Arc<Mutex<W>>,
}

impl<W> Clone for Notifier<W> {
    fn clone(&self) -> Self {
        Self {
            out: Arc::clone(&self.out),
        }
    }
}

impl<W: Write> Notifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }

    pub fn notify(&self, payload: &impl Serialize) -> io::Result<()> {
        let mut line = serde_json::to_vec(&(0, payload))?;
        line.push(b'\n');

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(&line)?;
        out.flush()
    }

    pub fn status(&self, text: &str) -> io::Result<()> {
        self.notify(&("status", text))
    }

    pub fn exception(&self, report: &Report) -> io::Result<()> {
        self.notify(&("exception", report))
    }
}

enum Event {
    SocketClosed(Exit),
    InputEnded,
}

pub struct Tunnel {
    connection: Connection,
}

impl Tunnel {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Bridges `input` and `output` to the connection until either side ends.
    ///
    /// Never exits the process; the returned [`Exit`] tells the caller how to.
    /// Threads still blocked on `input` are left behind when this returns.
    pub fn run<R, W>(self, input: R, output: W) -> Exit
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        let notifier = Notifier::new(output);
        let mut connection = self.connection;

        if let Err(err) = connection.connect() {
            error!("tunnel could not connect: {err}");
            report(notifier.status(&status_text(&err)));

            if err.is_network() {
                return Exit::ConnectFailed;
            }
            report(notifier.exception(&Report::capture(&err)));
            return Exit::SetupFailed;
        }

        bridge(connection, input, &notifier).unwrap_or_else(|err| {
            error!("tunnel setup failed: {err}");
            report(notifier.status(&err.to_string()));
            report(notifier.exception(&Report::capture(&err)));
            Exit::SetupFailed
        })
    }
}

fn bridge<R, W>(connection: Connection, input: R, notifier: &Notifier<W>) -> Result<Exit>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    let join_timeout = connection.config().join_timeout;
    let (inbound, outbound) = connection.split()?;
    notifier.status("")?;

    let (events, finished) = mpsc::channel();

    let (socket_events, socket_notifier) = (events.clone(), notifier.clone());
    thread::Builder::new()
        .name("tunnel-socket".into())
        .spawn(move || {
            let exit = pump_socket(inbound, &socket_notifier);
            socket_events.send(Event::SocketClosed(exit)).ok();
        })?;

    let input_notifier = notifier.clone();
    thread::Builder::new()
        .name("tunnel-input".into())
        .spawn(move || {
            pump_input(input, outbound, &input_notifier);
            events.send(Event::InputEnded).ok();
        })?;

    let exit = match finished.recv() {
        Ok(Event::SocketClosed(exit)) => exit,
        Ok(Event::InputEnded) => match finished.recv_timeout(join_timeout) {
            Ok(Event::SocketClosed(exit)) => exit,
            _ => Exit::Normal,
        },
        Err(_) => Exit::Normal,
    };
    debug!("tunnel finished: {exit:?}");

    Ok(exit)
}

/// Socket to output, until the socket ends or fails.
fn pump_socket<W: Write>(mut inbound: Inbound, notifier: &Notifier<W>) -> Exit {
    loop {
        let err = match inbound.receive() {
            Ok(message) => match notifier.notify(&message) {
                Ok(()) => continue,
                Err(err) => Error::from(err),
            },
            Err(err) => err,
        };

        if err.is_eof() || err.is_detached() {
            debug!("socket side of tunnel done: {err}");
            return Exit::Normal;
        }

        error!("socket side of tunnel failed: {err}");
        report(notifier.exception(&Report::capture(&err)));
        return Exit::ReceiveFailed;
    }
}

/// Input to socket, line by line. A bad line is reported and skipped.
fn pump_input<R: BufRead, W: Write>(input: R, mut outbound: Outbound, notifier: &Notifier<W>) {
    for line in input.lines() {
        let result = match line {
            Ok(line) => forward(&line, &mut outbound),
            Err(err) => {
                warn!("tunnel input unreadable: {err}");
                report(notifier.exception(&Report::capture(&err.into())));
                return;
            }
        };

        if let Err(err) = result {
            warn!("skipping tunnel input line: {err}");
            report(notifier.exception(&Report::capture(&err)));
        }
    }
}

fn forward(line: &str, outbound: &mut Outbound) -> Result<()> {
    let payload = match serde_json::from_str::<Value>(line)? {
        Value::Array(items) => items
            .into_iter()
            .nth(1)
            .ok_or_else(|| ErrorKind::Argument(line.to_owned()))?,
        bare => bare,
    };

    outbound.send(&Entry::try_from(payload)?)
}

/// Error text for a status envelope: OS errors without their `(os error N)` suffix.
fn status_text(err: &Error) -> String {
    let text = err.to_string();

    match err.kind() {
        ErrorKind::Network(inner) => match inner.raw_os_error() {
            Some(code) => text
                .strip_suffix(&format!(" (os error {code})"))
                .map_or_else(|| text.clone(), str::to_owned),
            None => text,
        },
        _ => text,
    }
}

/// Output failures have nowhere left to be reported but the log.
fn report(result: io::Result<()>) {
    if let Err(err) = result {
        error!("tunnel output failed: {err}");
    }
}
