//! Fixtures shared by the socket-level tests.
use std::{
    net::{TcpListener, TcpStream},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{bencoded::Entry, config::Config};

pub fn dict<const N: usize>(pairs: [(&str, Entry); N]) -> Entry {
    Entry::Dictionary(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
}

pub fn status(flags: &[&str]) -> Entry {
    Entry::List(flags.iter().map(|&flag| Entry::from(flag)).collect())
}

/// Spawns a one-shot fake server on an ephemeral port; `script` drives the accepted socket.
pub fn serve(script: impl FnOnce(TcpStream) + Send + 'static) -> (Config, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        script(stream)
    });
    let config = Config::new("127.0.0.1", port).poll_interval(Duration::from_millis(10));

    (config, handle)
}
