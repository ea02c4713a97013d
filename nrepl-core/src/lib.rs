pub mod bencoded;
pub mod config;
pub mod connection;
pub mod correlate;
pub mod dispatch;
pub mod error;
pub mod poll;
pub mod quickfix;
pub mod tunnel;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};

pub mod prelude {
    pub use crate::bencoded::{BDecode, BDictionary, BEncode, Entry, Message};
    pub use crate::connection::Connection;
    pub use crate::dispatch::{decode_argument, dispatch, Command, Outcome};
    pub use crate::poll::Poller;
    pub use crate::quickfix::Report;
    pub use crate::tunnel::{Exit, Tunnel};
}
