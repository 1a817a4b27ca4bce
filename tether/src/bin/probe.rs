//! Failover probe.
//!
//! Runs one connect cycle against a list of hosts with the restart-at-primary
//! strategy and reports which host accepted.
//!
//! # Usage
//!
//! ```sh
//! tether-probe --host 10.0.0.1:9000 --host 10.0.0.2:9000 --pause-ms 200
//! ```

use std::num::ParseIntError;
use std::process::ExitCode;
use std::time::Duration;

use tether::connect::AddressError;
use tether::{AddressCursor, AddressList, AlwaysStartOnPrimary, ConnectionStrategy};

const SESSION_NAME: &str = "tether-probe";

#[derive(Debug, thiserror::Error)]
enum ProbeError {
    #[error("missing value for {0}")]
    MissingValue(&'static str),

    #[error("invalid value {value:?} for {flag}: {source}")]
    InvalidNumber {
        flag: &'static str,
        value: String,
        source: ParseIntError,
    },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("no host accepted the connection")]
    Exhausted,
}

/// Parsed command line. Unset options keep the environment-derived defaults.
#[derive(Debug, Default)]
struct Args {
    hosts: Vec<String>,
    buffer_size: Option<usize>,
    pause: Option<Duration>,
    connect_timeout: Option<Duration>,
    logged_in: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tether-probe: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), ProbeError> {
    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args)?;
    tether::init_tracing();

    let mut addresses = AddressList::new(args.hosts)?;
    let mut strategy = AlwaysStartOnPrimary::new();
    if let Some(size) = args.buffer_size {
        strategy = strategy.tcp_buffer_size(size);
    }
    if let Some(pause) = args.pause {
        strategy = strategy.pause_period(pause);
    }
    if let Some(timeout) = args.connect_timeout {
        strategy = strategy.socket_connection_timeout(timeout);
    }

    eprintln!("tether-probe: trying {}", addresses.all_addresses());
    let channel = strategy
        .connect(SESSION_NAME, &mut addresses, args.logged_in, &mut |name: &str, msg: &str| {
            eprintln!("{name}: {msg}");
        })
        .ok_or(ProbeError::Exhausted)?;

    match channel.peer_addr() {
        Ok(peer) => println!("connected to {peer} ({})", addresses.current_host()),
        Err(_) => println!("connected to {}", addresses.current_host()),
    }
    channel.close_quietly();
    Ok(())
}

fn value<'a>(args: &'a [String], i: usize, flag: &'static str) -> Result<&'a str, ProbeError> {
    args.get(i).map(String::as_str).ok_or(ProbeError::MissingValue(flag))
}

fn number<T>(args: &[String], i: usize, flag: &'static str) -> Result<T, ProbeError>
where
    T: std::str::FromStr<Err = ParseIntError>,
{
    let raw = value(args, i, flag)?;
    raw.trim().parse().map_err(|source| ProbeError::InvalidNumber {
        flag,
        value: raw.to_owned(),
        source,
    })
}

fn parse_args(args: &[String]) -> Result<Args, ProbeError> {
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-H" => {
                i += 1;
                parsed.hosts.push(value(args, i, "--host")?.to_owned());
            }
            "--buffer-size" | "-b" => {
                i += 1;
                parsed.buffer_size = Some(number(args, i, "--buffer-size")?);
            }
            "--pause-ms" | "-p" => {
                i += 1;
                parsed.pause = Some(Duration::from_millis(number(args, i, "--pause-ms")?));
            }
            "--connect-timeout-ms" | "-t" => {
                i += 1;
                parsed.connect_timeout =
                    Some(Duration::from_millis(number(args, i, "--connect-timeout-ms")?));
            }
            "--logged-in" => parsed.logged_in = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => return Err(ProbeError::UnknownArgument(arg.to_owned())),
        }
        i += 1;
    }

    Ok(parsed)
}

fn print_usage() {
    eprintln!(
        r#"tether-probe - one failover connect cycle

USAGE:
    tether-probe --host <HOST:PORT>... [OPTIONS]

OPTIONS:
    -H, --host <HOST:PORT>          Candidate host, primary first (repeatable)
    -b, --buffer-size <BYTES>       Socket send/receive buffer size
    -p, --pause-ms <MS>             Per-host attempt window and retry pause
    -t, --connect-timeout-ms <MS>   Timeout of a single connect attempt
        --logged-in                 Treat the previous session as logged in
    -h, --help                      Print this help message

ENVIRONMENT:
    TETHER_TCP_BUFFER_SIZE, TETHER_CLIENT_TIMEOUT_MS,
    TETHER_SOCKET_CONNECTION_TIMEOUT_MS, TETHER_PAUSE_BEFORE_RECONNECT_MS
    RUST_LOG (with the `tracing` feature)

EXAMPLE:
    tether-probe --host 10.0.0.1:9000 --host 10.0.0.2:9000 --pause-ms 200
"#
    );
}
