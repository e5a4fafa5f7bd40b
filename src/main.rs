//! # GSM CMUX
//!
//! Switches a modem into GSM 07.10 multiplexed mode, opens the configured
//! channels and logs every frame it receives until Ctrl+C, then closes the
//! multiplexer down cleanly.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use gsm_cmux::cmux::Multiplexer;
use gsm_cmux::config::{Config, Negotiation};
use gsm_cmux::logging::init_logging;
use gsm_cmux::serial::port_trait::{SerialPortIO, TokioSerialPort};
use gsm_cmux::serial::{
    close_session, flush_link, open_port, pump, send_at_command, PendingCommand, SerialLink,
};
use gsm_cmux::telemetry::FrameLog;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "gsm-cmux", version, about = "GSM 07.10 serial multiplexer")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "GSM_CMUX_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,
}

/// Main entry point
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration and set up logging
///    - Open the modem's serial port
///
/// 2. **Negotiation**
///    - `negotiation = "at"`: send AT+CMUX, wait for OK, then establish DLCI 0
///    - `negotiation = "frames"`: establish DLCI 0 directly
///    - Open every configured channel
///
/// 3. **Main Loop**
///    - Read from the port and dispatch decoded frames to the frame log
///    - Handle Ctrl+C for graceful shutdown
///
/// 4. **Shutdown**
///    - Disconnect open channels and send the multiplexer close-down
///    - Log decoder statistics
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let _log_guard = init_logging(&config.logging, cli.log_level.as_deref())?;

    info!("gsm-cmux v{} starting...", env!("CARGO_PKG_VERSION"));

    let stream = open_port(&config.serial.port, config.serial.baud_rate)?;
    let mut port = TokioSerialPort::new(stream);
    let mut link = SerialLink::new();
    let mut mux = Multiplexer::with_config(config.mux.to_mux_config())?;
    let mut frame_log = FrameLog::new(&config.capture)?;

    negotiate(&mut port, &mut link, &mut mux, &config).await?;

    for &channel in &config.mux.channels {
        mux.open(channel, &mut link)?;
    }
    flush_link(&mut port, &mut link).await?;
    info!("Channels open: {:?}", mux.open_channels());
    info!("Press Ctrl+C to exit");

    let outcome = loop {
        tokio::select! {
            pumped = pump(&mut port, &mut link, &mut mux, &mut frame_log) => {
                if let Err(e) = pumped {
                    break Err(e);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break Ok(());
            }
        }
    };

    let outcome = close_session(&mut port, &mut link, &mut mux, outcome).await;

    let stats = mux.stats();
    info!(
        "Frames received: {}, delivered: {}, checksum errors: {}, malformed: {}",
        frame_log.frames_seen(),
        stats.frames_delivered,
        stats.checksum_errors,
        stats.malformed_frames
    );

    outcome.context("Serial link failed")
}

/// Bring the modem into multiplexed mode and establish the control channel
async fn negotiate<P: SerialPortIO>(
    port: &mut P,
    link: &mut SerialLink,
    mux: &mut Multiplexer,
    config: &Config,
) -> gsm_cmux::Result<()> {
    let mut pending = PendingCommand::new();

    if config.mux.negotiation == Negotiation::At {
        mux.startup(true, &mut pending, link)?;
        if let Some(command) = pending.take() {
            let timeout = Duration::from_millis(config.serial.at_timeout_ms);
            send_at_command(port, &command, timeout).await?;
            info!("Modem accepted {}", command);
        }
    }

    mux.startup(false, &mut pending, link)?;
    flush_link(port, link).await
}
