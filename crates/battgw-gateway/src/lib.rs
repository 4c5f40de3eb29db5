pub mod pipeline;
pub mod session;

pub use pipeline::{DecodeLatch, StopFlag, TelemetryEvent, spawn_receiver, spawn_router};
pub use session::GatewayConfig;
