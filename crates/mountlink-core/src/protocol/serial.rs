//! Serial port handling
//!
//! Provides the default [`Transport`] over a local serial port.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{ProtocolError, Transport, DEFAULT_BAUD_RATE};
use crate::config::DriverSettings;

/// Interval between polls while waiting for response bytes
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// Sort USB serial adapters (ttyUSB*, then ttyACM*) ahead of other ports, numerically
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Linux-only: USB adapters the enumeration API missed
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyUSB") || fname.starts_with("ttyACM") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo {
                        name: full,
                        vid: None,
                        pid: None,
                        product: None,
                    });
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open a serial port configured 8N1 without flow control
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

    if name.is_empty() {
        return Err(ProtocolError::PortNotFound("no port configured".to_string()));
    }

    // Short per-read timeout; receive_until enforces the overall bound itself
    serialport::new(name, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(50))
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(name.to_string()),
            _ => ProtocolError::SerialError(e.to_string()),
        })
}

/// Clear the serial port buffers
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))
}

/// [`Transport`] over a serial port
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    /// Overall bound for one `receive_until`
    timeout: Duration,
    /// Bytes read past the last terminator
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Open the port named in the settings
    pub fn open(settings: &DriverSettings) -> Result<Self, ProtocolError> {
        let port = open_port(&settings.port_name, Some(settings.baud_rate))?;
        debug!(
            port = %settings.port_name,
            baud = settings.baud_rate,
            "serial transport opened"
        );
        Ok(Self::from_port(
            port,
            Duration::from_millis(settings.command_timeout_ms),
        ))
    }

    /// Wrap an already opened port
    pub fn from_port(port: Box<dyn SerialPort>, timeout: Duration) -> Self {
        Self {
            port,
            timeout,
            pending: Vec::new(),
        }
    }

    /// Name of the underlying port, if known
    pub fn port_name(&self) -> Option<String> {
        self.port.name()
    }

    fn take_through_terminator(&mut self, terminator: u8) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|b| *b == terminator)?;
        let rest = self.pending.split_off(end + 1);
        Some(std::mem::replace(&mut self.pending, rest))
    }
}

impl Transport for SerialTransport {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let map_err = |e: std::io::Error| match e.kind() {
            std::io::ErrorKind::TimedOut => ProtocolError::TransportTimeout,
            _ => ProtocolError::TransportFault(e.to_string()),
        };
        self.port.write_all(bytes).map_err(map_err)?;
        self.port.flush().map_err(map_err)
    }

    fn receive_until(&mut self, terminator: u8) -> Result<Vec<u8>, ProtocolError> {
        let start = Instant::now();
        let mut buffer = [0u8; 256];

        loop {
            if let Some(frame) = self.take_through_terminator(terminator) {
                return Ok(frame);
            }
            if start.elapsed() > self.timeout {
                debug!(
                    partial = %String::from_utf8_lossy(&self.pending),
                    "receive bound reached before terminator"
                );
                return Err(ProtocolError::TransportTimeout);
            }

            let available = self
                .port
                .bytes_to_read()
                .map_err(|e| ProtocolError::TransportFault(e.to_string()))?;
            if available == 0 {
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }

            let to_read = std::cmp::min(available as usize, buffer.len());
            match self.port.read(&mut buffer[..to_read]) {
                Ok(0) => {
                    warn!("serial read returned EOF");
                    return Err(ProtocolError::TransportFault("port closed".to_string()));
                }
                Ok(n) => self.pending.extend_from_slice(&buffer[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(ProtocolError::TransportFault(e.to_string())),
            }
        }
    }

    fn clear_buffers(&mut self) -> Result<(), ProtocolError> {
        self.pending.clear();
        clear_buffers(self.port.as_mut())
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.port.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
