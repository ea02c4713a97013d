use std::{
    io::{self, BufReader, BufWriter, Write},
    mem,
    net::{TcpStream, ToSocketAddrs},
};

use bufstream::BufStream;
use log::{debug, trace};

use crate::{
    bencoded::{BDecode, BEncode, Entry},
    config::Config,
    error::{ErrorKind, Result},
    poll::{Pollable, Poller},
};

enum State {
    Idle,
    Open(BufStream<TcpStream>),
    Closed,
}

impl State {
    /// Opens the socket on first use. A closed connection stays closed.
    fn open(&mut self, config: &Config) -> Result<&mut BufStream<TcpStream>> {
        if let State::Idle = self {
            *self = State::Open(BufStream::new(open_tcp(config)?));
        }

        match self {
            State::Open(stream) => Ok(stream),
            _ => Err(io::Error::new(io::ErrorKind::NotConnected, "connection is closed").into()),
        }
    }
}

/// A single nREPL connection.
///
/// ### Note
///
/// `new()` does not connect; the socket is opened lazily by the first operation
/// that needs it (or by an explicit [`connect()`](`Connection::connect`)) and is
/// never reopened once [`close()`](`Connection::close`) has been called.
pub struct Connection {
    config: Config,
    poller: Poller,
    state: State,
}

impl Connection {
    pub fn new(config: Config) -> Self {
        let poller = Poller::from_config(&config);
        Self::with_poller(config, poller)
    }

    pub fn with_poller(config: Config, poller: Poller) -> Self {
        Self {
            config,
            poller,
            state: State::Idle,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    pub fn connect(&mut self) -> Result<()> {
        self.state.open(&self.config).map(drop)
    }

    /// Sends a payload: dictionaries are bencoded, strings are written verbatim.
    pub fn send(&mut self, payload: &Entry) -> Result<()> {
        write_payload(self.state.open(&self.config)?, payload)
    }

    /// Blocks (cooperatively, see [`Poller`]) until one complete value has been received.
    pub fn receive(&mut self) -> Result<Entry> {
        let stream = self.state.open(&self.config)?;
        receive_from(stream, &mut self.poller)
    }

    pub fn close(&mut self) {
        if let State::Open(stream) = mem::replace(&mut self.state, State::Closed) {
            debug!("closing connection to {}:{}", self.config.host, self.config.port);
            drop(stream);
        }
    }

    /// Splits an open connection into independently owned directions.
    ///
    /// Both halves share one socket; it is closed once both are dropped.
    pub fn split(mut self) -> Result<(Inbound, Outbound)> {
        let stream = self.state.open(&self.config)?;
        stream.flush()?;

        let tcp = stream.get_ref();
        let inbound = Inbound {
            reader: BufReader::new(tcp.try_clone()?),
            poller: self.poller,
        };
        let outbound = Outbound {
            writer: BufWriter::new(tcp.try_clone()?),
        };

        Ok((inbound, outbound))
    }
}

/// Receiving direction of a [split](`Connection::split`) connection.
pub struct Inbound {
    reader: BufReader<TcpStream>,
    poller: Poller,
}

impl Inbound {
    pub fn receive(&mut self) -> Result<Entry> {
        receive_from(&mut self.reader, &mut self.poller)
    }
}

/// Sending direction of a [split](`Connection::split`) connection.
pub struct Outbound {
    writer: BufWriter<TcpStream>,
}

impl Outbound {
    pub fn send(&mut self, payload: &Entry) -> Result<()> {
        write_payload(&mut self.writer, payload)
    }
}

fn open_tcp(config: &Config) -> Result<TcpStream> {
    let mut last_err = None;

    for addr in config.addr().to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(tcp) => {
                tcp.set_read_timeout(None)?;
                tcp.set_write_timeout(None)?;
                debug!("connected to {addr}");

                return Ok(tcp);
            }
            Err(err) => {
                debug!("connecting to {addr} failed: {err}");
                last_err = Some(err);
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{}:{} did not resolve", config.host, config.port),
            )
        })
        .into())
}

fn write_payload(writer: &mut impl Write, payload: &Entry) -> Result<()> {
    match payload {
        Entry::Dictionary(message) => message.encode_into_stream(writer)?,
        Entry::String(raw) => writer.write_all(raw.as_bytes())?,
        other => return Err(ErrorKind::Encoding(other.type_name()).into()),
    }
    writer.flush()?;
    trace!("sent {}", payload.to_json());

    Ok(())
}

fn receive_from(reader: &mut impl Pollable, poller: &mut Poller) -> Result<Entry> {
    poller.wait_readable(reader)?;
    let entry = Entry::decode_from(reader)?;
    trace!("received {}", entry.to_json());

    Ok(entry)
}
