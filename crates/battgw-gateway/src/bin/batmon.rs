use std::io::{BufReader, IsTerminal};
use std::time::Duration;

use battgw_can::Telemetry;
use battgw_gateway::pipeline::{self, DecodeLatch, StopFlag};
use battgw_gateway::session::GatewayConfig;
use clap::Parser;

/// Monitor battery telemetry reported over a CAN-to-Ethernet gateway
///
#[derive(Debug, Parser)]
#[clap(version, verbatim_doc_comment)]
struct Args {
    #[clap(short, long, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,

    /// Gateway hostname or address
    #[clap(long, default_value = "192.168.1.20")]
    host: String,

    /// Gateway TCP port
    #[clap(long, default_value_t = 19228)]
    port: u16,

    /// CAN interface index on the gateway
    #[clap(long, default_value_t = 1)]
    can_port: u8,

    /// CAN bitrate in kbit/s
    #[clap(long, default_value_t = 250)]
    bitrate: u32,
}

/// Socket reads wake up this often to notice a raised stop flag
const READ_POLL_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> eyre::Result<()> {
    let use_color = std::io::stderr().is_terminal();
    if use_color {
        color_eyre::install()?;
    }

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(args.log_level.into())
        .with_env_var("BATTGW_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(use_color)
        .with_writer(std::io::stderr)
        .init();

    let config = GatewayConfig {
        host: args.host,
        port: args.port,
        can_port: args.can_port,
        bitrate: args.bitrate,
    };
    let stream = config.configure()?;
    stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;

    let (line_tx, line_rx) = crossbeam_channel::unbounded();
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let stop = StopFlag::new();

    let receiver = pipeline::spawn_receiver(BufReader::new(stream), line_tx, stop.clone());
    let router = pipeline::spawn_router(line_rx, event_tx, stop.clone(), DecodeLatch::new());

    tracing::info!("Waiting for battery frames...");
    for event in event_rx.iter() {
        match event.telemetry {
            Telemetry::Summary(summary) => tracing::info!(
                "Pack summary: voltage={} current={} state_of_charge={} state_of_health={}",
                summary.voltage,
                summary.current,
                summary.state_of_charge,
                summary.state_of_health
            ),
            Telemetry::Status(status) => tracing::info!(
                "Pack status: contactor={} charge={} heater={} temps board/bank1/bank2: {}/{}/{} C",
                status.power_contactor,
                status.end_of_charge,
                status.heater,
                status.bms_board_temp,
                status.battery_bank_1_temp,
                status.battery_bank_2_temp
            ),
            // The router never emits these
            Telemetry::Unhandled { .. } => {}
        }
    }

    // The event stream only ends once the connection is gone; make sure both
    // units notice before joining them
    stop.raise();
    if receiver.join().is_err() {
        tracing::error!("Receiver thread panicked");
    }
    if router.join().is_err() {
        tracing::error!("Router thread panicked");
    }

    Ok(())
}
