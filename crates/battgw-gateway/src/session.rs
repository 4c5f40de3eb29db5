//! TCP session bring-up for the CAN-to-Ethernet gateway
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use eyre::WrapErr;

/// Gateway acknowledgements fit in a single read of this size
const RESPONSE_BUF_SIZE: usize = 1024;
/// Bound on the initial connection attempt
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on waiting for a command acknowledgement
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters for one CAN port on the gateway
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// CAN interface index on the gateway
    pub can_port: u8,
    /// CAN bitrate in kbit/s
    pub bitrate: u32,
}

impl GatewayConfig {
    /// Connect and run the fixed configuration sequence: stop the CAN port,
    /// reinitialize it at the configured bitrate, install a pass-all filter,
    /// start the port, and query its status.
    ///
    /// Returns the stream the frame notifications will arrive on.
    pub fn configure(&self) -> eyre::Result<TcpStream> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .wrap_err(format!("Failed to resolve {}:{}", self.host, self.port))?
            .next()
            .ok_or_else(|| eyre::eyre!("No addresses for {}:{}", self.host, self.port))?;

        tracing::info!("Connecting to the gateway at {addr}...");
        let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .wrap_err(format!("Failed to connect to {addr}"))?;
        stream
            .set_read_timeout(Some(RESPONSE_TIMEOUT))
            .wrap_err("Failed to set a read timeout")?;
        tracing::info!("Connected to {addr}");

        let n = self.can_port;
        // The device wants CRLF on the opening command of a session
        send_command(&mut stream, &format!("CAN {n} STOP\r\n"))?;
        send_command(&mut stream, &format!("CAN {n} INIT STD {}\n", self.bitrate))?;
        send_command(&mut stream, &format!("CAN {n} FILTER ADD EXT 0x000 0x000\n"))?;
        send_command(&mut stream, &format!("CAN {n} START\n"))?;
        tracing::info!("Gateway configured");

        let status = send_command(&mut stream, &format!("CAN {n} STATUS\n"))?;
        tracing::info!("CAN port status: {status}");

        Ok(stream)
    }
}

/// Send one command and read its acknowledgement text
fn send_command(stream: &mut TcpStream, command: &str) -> eyre::Result<String> {
    stream
        .write_all(command.as_bytes())
        .wrap_err(format!("Failed to send command: {}", command.trim()))?;

    let mut buf = [0u8; RESPONSE_BUF_SIZE];
    let n = stream
        .read(&mut buf)
        .wrap_err(format!("No response to command: {}", command.trim()))?;
    let response = String::from_utf8_lossy(&buf[..n]).trim().to_string();

    tracing::info!("Sent: {}", command.trim());
    tracing::info!("Received: {response}");
    Ok(response)
}
