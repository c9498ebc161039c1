//! Live bus adapters.

use std::io;
use std::time::{Duration, Instant};

use log::{debug, info};
use socketcan::{CanSocket, EmbeddedFrame, Socket};

use crate::error::AdapterError;
use crate::types::BusFrame;

/// Something frames can be pulled from one at a time.
pub trait FrameSource {
    /// Next frame, `None` when nothing arrived within `timeout`.
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<BusFrame>, AdapterError>;
}

/// Linux SocketCAN interface such as `can0` or `vcan0`.
pub struct SocketCanSource {
    socket: CanSocket,
    started: Instant,
}

impl SocketCanSource {
    pub fn open(bus: &str) -> Result<Self, AdapterError> {
        let socket = CanSocket::open(bus).map_err(|source| AdapterError::Connection {
            bus: bus.to_string(),
            source,
        })?;
        info!("Opened SocketCAN interface {}", bus);
        Ok(Self {
            socket,
            started: Instant::now(),
        })
    }
}

impl FrameSource for SocketCanSource {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<BusFrame>, AdapterError> {
        self.socket.set_read_timeout(timeout)?;
        match self.socket.read_frame() {
            Ok(frame) => {
                let cob_id = match frame.id() {
                    socketcan::Id::Standard(id) => u32::from(id.as_raw()),
                    socketcan::Id::Extended(id) => id.as_raw(),
                };
                Ok(Some(BusFrame {
                    timestamp: self.started.elapsed().as_secs_f64(),
                    channel: 0,
                    cob_id,
                    data: frame.data().to_vec(),
                }))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Opens adapter `adapter` on `bus`.
///
/// The bitrate of a SocketCAN interface is a property of the link
/// (`ip link set can0 type can bitrate 500000`), so it is only reported here.
pub fn open_adapter(adapter: &str, bus: &str, bitrate: u32) -> Result<Box<dyn FrameSource>, AdapterError> {
    match adapter.to_ascii_lowercase().as_str() {
        "socketcan" => {
            debug!("{}: expecting link bitrate {}", bus, bitrate);
            Ok(Box::new(SocketCanSource::open(bus)?))
        }
        _ => Err(AdapterError::Unsupported(adapter.to_string())),
    }
}
