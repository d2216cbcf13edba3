use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ws_relay::relay::{DEFAULT_QUIT_COMMAND, DEFAULT_URL};
use ws_relay::session::options::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_MAX_RETRIES, DEFAULT_OUTBOUND_CAPACITY,
};
use ws_relay::{
    Backoff, InputSource, Relay, RelayConfig, RelayExit, ReconnectPolicy, SessionOptions,
};

#[derive(Parser, Debug)]
#[command(name = "ws-relay")]
#[command(about = "Relay terminal lines to a WebSocket chat server, reconnecting on failure")]
#[command(version)]
struct Args {
    /// WebSocket URL (ws://, or wss:// when built with `native-tls`)
    #[arg(default_value = DEFAULT_URL)]
    url: String,

    /// Consecutive failed connection attempts tolerated (0 = unlimited)
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Delay before the first retry, in milliseconds
    #[arg(long, default_value_t = 500)]
    backoff_base_ms: u64,

    /// Upper bound on a single retry delay, in milliseconds
    #[arg(long, default_value_t = 30_000)]
    backoff_cap_ms: u64,

    /// Growth factor between retry delays
    #[arg(long, default_value_t = DEFAULT_BACKOFF_MULTIPLIER)]
    backoff_multiplier: f64,

    /// Exit on the first connection failure or loss instead of reconnecting
    #[arg(long)]
    no_reconnect: bool,

    /// Handshake timeout, in milliseconds
    #[arg(long, default_value_t = 10_000)]
    connect_timeout_ms: u64,

    /// Keepalive ping interval, in milliseconds
    #[arg(long, default_value_t = 30_000)]
    heartbeat_ms: u64,

    /// Outbound queue capacity
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    outbound_capacity: usize,

    /// Input line that closes the connection and exits
    #[arg(long, default_value = DEFAULT_QUIT_COMMAND)]
    quit: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn relay_config(&self) -> RelayConfig {
        let backoff = Backoff::new(
            Duration::from_millis(self.backoff_base_ms),
            self.backoff_multiplier,
            Duration::from_millis(self.backoff_cap_ms),
        );
        let reconnect = ReconnectPolicy {
            enabled: !self.no_reconnect,
            max_retries: self.max_retries,
            backoff,
        };
        let session = SessionOptions::new()
            .with_reconnect(reconnect)
            .with_outbound_capacity(self.outbound_capacity)
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .with_heartbeat_interval(Duration::from_millis(self.heartbeat_ms));

        RelayConfig::new(self.url.clone())
            .with_session(session)
            .with_quit_command(self.quit.clone())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Diagnostics go to stderr; stdout carries only received messages.
    let default_level = if args.debug {
        "ws_relay=debug"
    } else {
        "ws_relay=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = args.relay_config();
    info!(url = %config.url, max_retries = args.max_retries, "Starting relay");

    let relay = match Relay::new(config) {
        Ok(relay) => relay,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return RelayExit::from_error(&e).into();
        }
    };

    let input = match InputSource::stdin(args.outbound_capacity) {
        Ok(input) => input,
        Err(e) => {
            error!(error = %e, "Cannot read stdin");
            return RelayExit::InputUnavailable.into();
        }
    };

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    relay
        .run(input, tokio::io::stdout(), interrupt)
        .await
        .into()
}
