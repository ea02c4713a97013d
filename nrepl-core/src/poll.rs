//! Cooperative waiting on the socket.
//!
//! Reads never block indefinitely: the socket is polled for readiness at a fixed
//! interval, and every timeout hands control to a caller-supplied hook so an
//! embedding host can pump its own event loop. A keepalive marker file lets the
//! host signal that it has gone away; the wait then ends with
//! [`ErrorKind::Detached`], which only the top-level driver acts on.
use std::{
    fmt,
    io::{self, BufRead, BufReader},
    net::TcpStream,
    path::PathBuf,
    time::Duration,
};

use bufstream::BufStream;
use log::{debug, trace};

use crate::{
    config::Config,
    error::{ErrorKind, Result},
};

pub type PollHook = Box<dyn FnMut() + Send>;

/// A buffered reader over something that supports read timeouts.
pub trait Pollable: BufRead {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Pollable for BufStream<TcpStream> {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.get_ref().set_read_timeout(timeout)
    }
}

impl Pollable for BufReader<TcpStream> {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.get_ref().set_read_timeout(timeout)
    }
}

pub struct Poller {
    hook: PollHook,
    keepalive: Option<PathBuf>,
    interval: Duration,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            hook: Box::new(|| ()),
            keepalive: None,
            interval,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.poll_interval).keepalive(config.keepalive.clone())
    }

    pub fn hook(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    pub fn keepalive(mut self, path: Option<PathBuf>) -> Self {
        self.keepalive = path;
        self
    }

    /// One idle turn: run the hook, then check the keepalive marker.
    pub fn tick(&mut self) -> Result<()> {
        (self.hook)();

        match &self.keepalive {
            Some(path) if !path.exists() => {
                debug!("keepalive file {} vanished", path.display());
                Err(ErrorKind::Detached(path.clone()).into())
            }
            _ => Ok(()),
        }
    }

    /// Blocks until `reader` has buffered bytes (or reached end of stream),
    /// ticking once per elapsed interval. The reader is left fully blocking.
    pub fn wait_readable(&mut self, reader: &mut impl Pollable) -> Result<()> {
        reader.set_read_timeout(Some(self.interval))?;
        let ready = self.wait(reader);
        reader.set_read_timeout(None)?;

        ready
    }

    fn wait(&mut self, reader: &mut impl Pollable) -> Result<()> {
        loop {
            match reader.fill_buf() {
                Ok(_) => return Ok(()),
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    trace!("socket idle, polling");
                    self.tick()?;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("keepalive", &self.keepalive)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
