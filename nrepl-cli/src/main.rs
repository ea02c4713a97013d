use std::{path::PathBuf, process, time::Duration};

use clap::Parser;
use log::*;
use nrepl_core::{
    prelude::*,
    Config, Error, Result,
};

/// Talk to an nREPL server: one command per process.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[arg(env = "NREPL_HOST")]
    host: String,
    #[arg(env = "NREPL_PORT")]
    port: u16,
    /// Stop waiting on the server once this file disappears.
    #[arg(long, env = "NREPL_KEEPALIVE")]
    keepalive: Option<PathBuf>,
    /// Seconds allowed for the TCP connect.
    #[arg(long = "connect-timeout", env = "NREPL_CONNECT_TIMEOUT", default_value_t = 8)]
    connect_timeout: u64,
    /// Milliseconds between keepalive checks while blocked on the socket.
    #[arg(long = "poll-interval", env = "NREPL_POLL_INTERVAL", default_value_t = 100)]
    poll_interval: u64,
    /// One of send, receive, call, message, tunnel, close.
    command: String,
    /// JSON (`{`, `[`, `"`) or bencode (`d`, `l`, digit) literals.
    #[arg(allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Cli {
    fn config(&self) -> Config {
        Config::new(self.host.clone(), self.port)
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .poll_interval(Duration::from_millis(self.poll_interval))
            .keepalive(self.keepalive.clone())
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(Outcome::Value(value)) => println!("{}", value.to_json()),
        Ok(Outcome::Nothing) => (),
        Ok(Outcome::Tunnel(exit)) => process::exit(exit.code()),
        Err(err) if err.is_detached() => {
            debug!("{err}, exiting");
        }
        Err(err) => {
            error!("{} failed: {err}", cli.command);
            println!("{}", exception(&err));
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    let args = cli
        .args
        .iter()
        .map(|literal| decode_argument(literal))
        .collect::<Result<Vec<_>>>()?;
    let config = cli.config();
    let poller = Poller::from_config(&config);

    dispatch(config, poller, &cli.command, args)
}

#[track_caller]
fn exception(err: &Error) -> serde_json::Value {
    serde_json::json!([0, ["exception", Report::capture(err)]])
}
