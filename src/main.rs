//! Command-line entry point for the commissioning bridge.
//!
//! - `run [ENDPOINT]`: bridge a device link to stdout until it closes
//! - `check <HEX>`: verify one hex-encoded key registration offline
//! - `example-config`: print a default configuration file

use clap::{Parser, Subcommand};
use keyreg_bridge::config::BridgeConfig;
use keyreg_bridge::core::encoding::decode_frame;
use keyreg_bridge::error::{BridgeError, Result};
use keyreg_bridge::protocol::bridge::LineBridge;
use keyreg_bridge::protocol::message::interpret;
use keyreg_bridge::protocol::verifier::{message_digest, signed_prefix, verify};
use keyreg_bridge::transport;
use keyreg_bridge::utils::clock::ClockMode;
use keyreg_bridge::utils::logging::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "keyreg-bridge", version)]
#[command(about = "Bridge a commissioning device's serial line and verify its key registration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Bridge a device link until it closes
    Run {
        /// serial:<device>, tcp:<host:port> or unix:<path>
        endpoint: Option<String>,

        /// Serial link speed
        #[arg(short, long)]
        baud: Option<u32>,

        /// Clock used to answer TIME: requests (local or utc)
        #[arg(long)]
        clock: Option<ClockMode>,

        /// Print the raw hex before each decoded frame
        #[arg(long)]
        echo_raw_hex: bool,

        /// Give up after this many milliseconds without a line (0 waits forever)
        #[arg(long)]
        read_timeout_ms: Option<u64>,

        /// Reject registrations outside their validity window
        #[arg(long)]
        enforce_validity: bool,
    },

    /// Verify a hex-encoded key registration
    Check {
        /// The registration frame as printed by the device
        hex: String,
    },

    /// Print a default configuration file
    ExampleConfig,
}

fn main() -> ExitCode {
    let Cli {
        command,
        verbose,
        config,
    } = Cli::parse();

    let outcome = match command {
        Command::ExampleConfig => {
            print!("{}", BridgeConfig::example_config());
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { hex } => check(&hex),
        Command::Run {
            endpoint,
            baud,
            clock,
            echo_raw_hex,
            read_timeout_ms,
            enforce_validity,
        } => load_config(config.as_deref(), verbose).and_then(|mut config| {
            if let Some(endpoint) = endpoint {
                config.transport.endpoint = endpoint;
            }
            if let Some(baud) = baud {
                config.transport.baud_rate = baud;
            }
            if let Some(clock) = clock {
                config.bridge.clock = clock;
            }
            if let Some(millis) = read_timeout_ms {
                config.transport.read_timeout = Duration::from_millis(millis);
            }
            config.bridge.echo_raw_hex |= echo_raw_hex;
            config.bridge.enforce_validity |= enforce_validity;
            run(config)
        }),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&std::path::Path>, verbose: bool) -> Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    config.apply_env()?;
    if verbose {
        config.logging.log_level = Level::DEBUG;
    }
    Ok(config)
}

fn run(config: BridgeConfig) -> Result<ExitCode> {
    config.validate_strict()?;
    init_logging(&config.logging)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(bridge_session(config));
    // A serial read parked on the blocking pool never returns once the device is silent
    runtime.shutdown_timeout(Duration::from_millis(100));
    result.map(|()| ExitCode::SUCCESS)
}

async fn bridge_session(config: BridgeConfig) -> Result<()> {
    let bridge =
        LineBridge::new(config.bridge.clone()).with_read_timeout(config.transport.read_timeout());
    let mut link = transport::connect(&config.transport).await?;
    let mut stdout = tokio::io::stdout();

    tokio::select! {
        result = bridge.run(&mut link, &mut stdout) => result,
        _ = shutdown_signal() => {
            info!("Shutdown requested");
            bridge.metrics().log_metrics();
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
            return;
        }
    }
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn check(hex_text: &str) -> Result<ExitCode> {
    let raw = hex::decode(hex_text.trim())
        .map_err(|e| BridgeError::MalformedEncoding(format!("invalid hex: {e}")))?;
    let frame = decode_frame(raw)?;
    println!("decoded: {}", frame.value);

    let registration = interpret(frame.value.clone())?;
    if let Ok(prefix) = signed_prefix(&frame.raw, registration.signature_index()) {
        println!("message hash: {}", hex::encode(message_digest(prefix)));
    }

    let verdict = verify(&frame.raw, &registration);
    if verdict.is_valid() {
        println!("key registration is valid");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("key registration is {verdict}");
        Ok(ExitCode::from(2))
    }
}
