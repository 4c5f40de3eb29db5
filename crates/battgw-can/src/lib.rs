pub mod frame;
pub mod telemetry;

pub use frame::{FrameError, GatewayFrame, GatewayParser};
pub use telemetry::{
    ChargeState, ContactorState, DecodeError, HeaterState, PackStatus, PackSummary, Telemetry,
    decode, is_battery_id,
};

#[cfg(test)]
#[ctor::ctor]
fn setup_test_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .with_ansi(true)
        .init();
}
