//! Request/response correlation.
//!
//! A request is answered by a stream of responses, the last of which carries a
//! terminal flag in its `status` list.
use log::debug;
use uuid::Uuid;

use crate::{
    bencoded::{BDictionary, Entry, Message},
    connection::Connection,
    error::Result,
};

pub const DEFAULT_TERMINATORS: &[&str] = &["done"];

/// Field values that responses to a given request are expected to carry.
pub type Selector = BDictionary;

impl Connection {
    /// Sends `message` and collects every response up to and including the
    /// first one whose `status` intersects `terminators`.
    ///
    /// Without an explicit selector the message is tagged with an `id` (a fresh
    /// UUID, unless it already has one) and responses are matched against it.
    ///
    /// # Note
    ///
    /// Responses that do not match the selector are still returned. Servers and
    /// hosts in the wild rely on seeing everything that arrives on the socket.
    pub fn call(
        &mut self,
        message: Message,
        terminators: &[&str],
        selector: Option<Selector>,
    ) -> Result<Vec<Entry>> {
        let (message, selector) = match selector {
            Some(selector) => (message, selector),
            None => tag(message),
        };

        self.send(&Entry::Dictionary(message))?;

        let mut responses = vec![];
        loop {
            let response = self.receive()?;
            if !matches(&response, &selector) {
                debug!("response {} does not match selector", response.to_json());
            }

            let terminal = is_terminal(&response, terminators);
            responses.push(response);

            if terminal {
                return Ok(responses);
            }
        }
    }

    /// [`call`](`Connection::call`) with default terminators and an id selector.
    pub fn message(&mut self, message: Message) -> Result<Vec<Entry>> {
        self.call(message, DEFAULT_TERMINATORS, None)
    }
}

fn tag(mut message: Message) -> (Message, Selector) {
    let id = message
        .entry("id".to_owned())
        .or_insert_with(|| Uuid::new_v4().to_string().into())
        .clone();

    (message, Selector::from([("id".to_owned(), id)]))
}

/// A response lacking a selected field does not match.
pub fn matches(response: &Entry, selector: &Selector) -> bool {
    let fields = response.as_dictionary();

    selector
        .iter()
        .all(|(key, expected)| fields.and_then(|f| f.get(key)) == Some(expected))
}

pub fn is_terminal(response: &Entry, terminators: &[&str]) -> bool {
    response
        .as_dictionary()
        .and_then(|fields| fields.get("status"))
        .and_then(Entry::as_list)
        .is_some_and(|flags| {
            flags
                .iter()
                .filter_map(Entry::as_str)
                .any(|flag| terminators.contains(&flag))
        })
}
