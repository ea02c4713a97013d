//! Entry point for hosts: a fixed table of named operations on a fresh connection.
use std::{
    fmt,
    io::{self, BufReader},
    str::FromStr,
};

use log::debug;

use crate::{
    bencoded::{BDecode, BDictionary, BList, Entry},
    config::Config,
    connection::Connection,
    correlate::{Selector, DEFAULT_TERMINATORS},
    error::{Error, ErrorKind, Result},
    poll::Poller,
    tunnel::{Exit, Tunnel},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Send,
    Receive,
    Call,
    Message,
    Tunnel,
    Close,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Send,
        Command::Receive,
        Command::Call,
        Command::Message,
        Command::Tunnel,
        Command::Close,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Send => "send",
            Command::Receive => "receive",
            Command::Call => "call",
            Command::Message => "message",
            Command::Tunnel => "tunnel",
            Command::Close => "close",
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Command::ALL
            .into_iter()
            .find(|command| command.name() == name)
            .ok_or_else(|| ErrorKind::UnknownCommand(name.to_owned()).into())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a dispatched command handed back to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Entry),
    Nothing,
    /// The tunnel ran to completion; the host should exit accordingly.
    Tunnel(Exit),
}

/// A command with its arguments checked, ready to run.
#[derive(Debug, Clone, PartialEq)]
enum Invocation {
    Send(Entry),
    Receive,
    Call {
        message: BDictionary,
        terminators: Vec<String>,
        selector: Option<Selector>,
    },
    Tunnel,
    Close,
}

impl Invocation {
    fn new(command: Command, args: Vec<Entry>) -> Result<Self> {
        let mut args = Args::new(command, args);

        let invocation = match command {
            Command::Send => Invocation::Send(args.required("payload")?),
            Command::Receive => Invocation::Receive,
            Command::Call => Invocation::Call {
                message: args.required_as("message", "dict")?,
                terminators: match args.optional_as::<BList>("terminators", "list")? {
                    Some(flags) => flags
                        .into_iter()
                        .map(|flag| flag.parse_or_err(args.invalid("terminators must be strings")))
                        .collect::<Result<_>>()?,
                    None => DEFAULT_TERMINATORS.iter().map(|&flag| flag.to_owned()).collect(),
                },
                selector: args.optional_as("selectors", "dict")?,
            },
            Command::Message => Invocation::Call {
                message: args.required_as("message", "dict")?,
                terminators: DEFAULT_TERMINATORS.iter().map(|&flag| flag.to_owned()).collect(),
                selector: None,
            },
            Command::Tunnel => Invocation::Tunnel,
            Command::Close => Invocation::Close,
        };
        args.finish()?;

        Ok(invocation)
    }

    fn run(self, mut connection: Connection) -> Result<Outcome> {
        let outcome = match self {
            Invocation::Send(payload) => connection
                .send(&payload)
                .map(|()| Outcome::Value(Entry::from(""))),
            Invocation::Receive => connection.receive().map(Outcome::Value),
            Invocation::Call {
                message,
                terminators,
                selector,
            } => {
                let terminators: Vec<&str> = terminators.iter().map(String::as_str).collect();
                connection
                    .call(message, &terminators, selector)
                    .map(|responses| Outcome::Value(Entry::List(responses)))
            }
            Invocation::Tunnel => {
                let exit = Tunnel::new(connection).run(BufReader::new(io::stdin()), io::stdout());
                return Ok(Outcome::Tunnel(exit));
            }
            Invocation::Close => Ok(Outcome::Nothing),
        };
        connection.close();

        outcome
    }
}

/// Positional argument cursor for one command.
struct Args {
    command: Command,
    args: std::vec::IntoIter<Entry>,
}

impl Args {
    fn new(command: Command, args: Vec<Entry>) -> Self {
        Self {
            command,
            args: args.into_iter(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::new(ErrorKind::InvalidArguments {
            command: self.command.name(),
            reason: reason.into(),
        })
    }

    fn required(&mut self, name: &str) -> Result<Entry> {
        self.args
            .next()
            .ok_or_else(|| self.invalid(format!("missing {name}")))
    }

    fn required_as<T: TryFrom<Entry>>(&mut self, name: &str, kind: &str) -> Result<T> {
        let arg = self.required(name)?;
        self.convert(arg, name, kind)
    }

    fn optional_as<T: TryFrom<Entry>>(&mut self, name: &str, kind: &str) -> Result<Option<T>> {
        self.args
            .next()
            .map(|arg| self.convert(arg, name, kind))
            .transpose()
    }

    fn convert<T: TryFrom<Entry>>(&self, arg: Entry, name: &str, kind: &str) -> Result<T> {
        let got = arg.type_name();
        arg.parse_or_err(self.invalid(format!("{name} must be a {kind}, not {got}")))
    }

    fn finish(self) -> Result<()> {
        match self.args.len() {
            0 => Ok(()),
            extra => Err(self.invalid(format!("{extra} unexpected argument(s)"))),
        }
    }
}

/// Decodes a command-line argument literal.
///
/// `{`, `[` or `"` start a JSON literal; a digit, `d` or `l` starts a bencoded one.
pub fn decode_argument(literal: &str) -> Result<Entry> {
    match literal.as_bytes().first() {
        Some(b'{' | b'[' | b'"') => Entry::from_json(literal),
        Some(b'd' | b'l' | b'0'..=b'9') => Entry::decode(literal.as_bytes()),
        _ => Err(ErrorKind::Argument(literal.to_owned()).into()),
    }
}

/// Runs `command` against a new connection, closing it afterwards.
///
/// Arguments are validated before anything touches the network.
pub fn dispatch(config: Config, poller: Poller, command: &str, args: Vec<Entry>) -> Result<Outcome> {
    let command: Command = command.parse()?;
    let invocation = Invocation::new(command, args)?;
    debug!("dispatching {command} to {}:{}", config.host, config.port);

    invocation.run(Connection::with_poller(config, poller))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dict, serve, status};
    use rstest::*;
    use std::{io::Write, net::TcpStream, time::Duration};

    fn offline() -> (Config, Poller) {
        let config = Config::new("127.0.0.1", 1);
        let poller = Poller::new(Duration::from_millis(10));
        (config, poller)
    }

    #[rstest]
    #[case::send("send", Command::Send)]
    #[case::receive("receive", Command::Receive)]
    #[case::call("call", Command::Call)]
    #[case::message("message", Command::Message)]
    #[case::tunnel("tunnel", Command::Tunnel)]
    #[case::close("close", Command::Close)]
    fn command_names(#[case] name: &str, #[case] command: Command) {
        assert_eq!(name.parse::<Command>().unwrap(), command);
        assert_eq!(command.to_string(), name);
    }

    #[rstest]
    #[case::method_that_is_not_a_command("socket")]
    #[case::case_sensitive("Call")]
    #[case::empty("")]
    fn unknown_commands(#[case] name: &str) {
        let (config, poller) = offline();
        let err = dispatch(config, poller, name, vec![]).unwrap_err();

        assert!(matches!(err.kind(), ErrorKind::UnknownCommand(n) if n == name));
    }

    #[rstest]
    #[case::json_object(r#"{"op":"eval"}"#, dict([("op", "eval".into())]))]
    #[case::json_list(r#"["done","error"]"#, status(&["done", "error"]))]
    #[case::json_string(r#""d2:op4:evale""#, Entry::from("d2:op4:evale"))]
    #[case::bencode_dict("d2:op4:evale", dict([("op", "eval".into())]))]
    #[case::bencode_list("l4:donee", status(&["done"]))]
    #[case::bencode_string("4:spam", Entry::from("spam"))]
    fn argument_literals(#[case] literal: &str, #[case] expected: Entry) {
        assert_eq!(decode_argument(literal).unwrap(), expected);
    }

    #[rstest]
    #[case::bare_word("eval")]
    #[case::integer_literal("i5e")]
    #[case::empty("")]
    fn unclassifiable_literals(#[case] literal: &str) {
        let err = decode_argument(literal).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Argument(l) if l == literal));
    }

    #[rstest]
    #[case::send_without_payload("send", vec![])]
    #[case::receive_with_args("receive", vec![Entry::from(1)])]
    #[case::call_with_list(Command::Call.name(), vec![status(&["done"])])]
    #[case::call_bad_terminators("call", vec![dict([]), Entry::from("done")])]
    #[case::call_numeric_terminators("call", vec![dict([]), Entry::List(vec![Entry::from(1)])])]
    #[case::call_too_many("call", vec![dict([]), status(&[]), dict([]), dict([])])]
    #[case::message_with_string("message", vec![Entry::from("x")])]
    #[case::tunnel_with_args("tunnel", vec![dict([])])]
    fn argument_validation(#[case] command: &str, #[case] args: Vec<Entry>) {
        let (config, poller) = offline();
        let err = dispatch(config, poller, command, args).unwrap_err();

        assert!(
            matches!(err.kind(), ErrorKind::InvalidArguments { command: c, .. } if *c == command),
            "{err}"
        );
    }

    #[test]
    fn close_without_connecting() {
        let (config, poller) = offline();
        assert_eq!(dispatch(config, poller, "close", vec![]).unwrap(), Outcome::Nothing);
    }

    #[test]
    fn send_returns_empty_string() {
        let (config, server) = serve(|mut stream| {
            let request = Entry::decode_from(&mut stream).unwrap();
            assert_eq!(request, dict([("op", "close".into())]));
        });
        let poller = Poller::from_config(&config);

        let outcome = dispatch(config, poller, "send", vec![dict([("op", "close".into())])]).unwrap();

        assert_eq!(outcome, Outcome::Value(Entry::from("")));
        server.join().unwrap();
    }

    #[test]
    fn call_with_custom_terminators() {
        let (config, server) = serve(|mut stream: TcpStream| {
            let request: BDictionary = Entry::decode_from(&mut stream).unwrap().parse().unwrap();
            assert_eq!(request["id"], Entry::from("x1"));
            stream
                .write_all(b"d2:id2:x13:out2:hie")
                .and_then(|()| stream.write_all(b"d2:id2:x16:statusl10:need-inputee"))
                .unwrap();
        });
        let poller = Poller::from_config(&config);
        let args = vec![
            decode_argument(r#"{"op":"eval","code":"(read-line)","id":"x1"}"#).unwrap(),
            decode_argument("l10:need-inpute").unwrap(),
        ];

        let outcome = dispatch(config, poller, "call", args).unwrap();

        let Outcome::Value(Entry::List(responses)) = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1], dict([("id", "x1".into()), ("status", status(&["need-input"]))]));
        server.join().unwrap();
    }
}
