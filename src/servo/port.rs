// Serial channel to the servo board
//
// The transmission loop only needs "open" and "write these bytes"; keeping that
// behind two small traits lets the loop run against an in-memory sink.

use serialport::SerialPort;
use std::io::Write;
use std::time::Duration;
use tracing::info;

use super::protocol::ServoError;

/// Write timeout; a frame is ~1 ms of line time at the default baud
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 20;

/// An open channel that accepts raw frame bytes
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ServoError>;
}

/// Opens (and reopens) the channel
pub trait Connector: Send {
    fn open(&mut self) -> Result<Box<dyn FrameSink>, ServoError>;

    /// Human-readable channel name for logs
    fn describe(&self) -> String;
}

impl FrameSink for Box<dyn SerialPort> {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ServoError> {
        self.write_all(frame)?;
        self.flush()?;
        Ok(())
    }
}

/// Connector for a real serial port
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port_name: String,
    baudrate: u32,
    timeout: Duration,
}

impl SerialConnector {
    pub fn new(port_name: impl Into<String>, baudrate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baudrate,
            timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
        }
    }
}

impl Connector for SerialConnector {
    fn open(&mut self) -> Result<Box<dyn FrameSink>, ServoError> {
        let port = serialport::new(&self.port_name, self.baudrate)
            .timeout(self.timeout)
            .open()?;
        info!("Opened {} @ {} baud", self.port_name, self.baudrate);
        Ok(Box::new(port))
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.port_name, self.baudrate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_port_fails_to_open() {
        let mut connector = SerialConnector::new("/dev/this-port-does-not-exist", 460_800);
        assert!(matches!(connector.open(), Err(ServoError::Serial(_))));
        assert_eq!(connector.describe(), "/dev/this-port-does-not-exist @ 460800");
    }
}
