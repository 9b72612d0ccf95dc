//! udp_tx.rs: Line output for simulated range reports
//!
//! Sends one epoch of lines to the tracker as a single UDP datagram
//! (newline-separated), or appends them to a replay log. Send and write errors
//! are logged and never stop the simulator.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::UdpSocket;
use std::path::Path;

use tracing::{debug, warn};

pub struct UdpTransmitter {
    socket: UdpSocket,
    hub_addr: String,
}

impl UdpTransmitter {
    pub fn new(hub_addr: &str) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self { socket, hub_addr: hub_addr.to_string() })
    }

    pub fn send_epoch(&self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        let mut payload = lines.join("\n");
        payload.push('\n');

        match self.socket.send_to(payload.as_bytes(), &self.hub_addr) {
            Ok(n) => debug!("UDP → {} {} lines ({n} bytes)", self.hub_addr, lines.len()),
            Err(e) => warn!("UDP: send to {} failed: {e}", self.hub_addr),
        }
    }
}

/// Where the simulator writes its lines.
pub enum LineSink {
    Udp(UdpTransmitter),
    Log(BufWriter<File>),
}

impl LineSink {
    pub fn udp(hub_addr: &str) -> Result<Self, std::io::Error> {
        UdpTransmitter::new(hub_addr).map(Self::Udp)
    }

    pub fn log_file(path: &Path) -> Result<Self, std::io::Error> {
        File::create(path).map(|f| Self::Log(BufWriter::new(f)))
    }

    pub fn emit(&mut self, lines: &[String]) {
        match self {
            Self::Udp(tx) => tx.send_epoch(lines),
            Self::Log(out) => {
                for line in lines {
                    if let Err(e) = writeln!(out, "{line}") {
                        warn!("Replay log write failed: {e}");
                        return;
                    }
                }
            }
        }
    }

    pub fn flush(&mut self) {
        if let Self::Log(out) = self {
            if let Err(e) = out.flush() {
                warn!("Replay log flush failed: {e}");
            }
        }
    }
}
