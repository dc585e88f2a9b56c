//! Digital output collaborator boundary
//!
//! The auxiliary I/O hardware exposes one 8-bit output port; sessions drive
//! their claimed bit high for the duration of a capture. `SimDio` stands in
//! for the kernel driver.

pub mod arbiter;

pub use arbiter::OutputLineArbiter;

use tracing::info;

use crate::error::{Result, ViewerError};

/// Number of addressable output lines on the port.
pub const PORT_WIDTH: u8 = 8;

/// One opened digital-output device.
pub trait DigitalOutput: Send {
    /// Configure every line of the port as an output.
    fn configure_outputs(&mut self) -> Result<()>;

    /// Drive a single line.
    fn write_bit(&mut self, bit: u8, value: bool) -> Result<()>;

    /// Read back the whole port.
    fn read_port(&mut self) -> Result<u8>;
}

/// In-memory stand-in for the DIO driver, addressed by minor number.
pub struct SimDio {
    minor: u32,
    port: u8,
    outputs: bool,
}

impl SimDio {
    /// Open the device node for the given minor number.
    pub fn open(minor: u32) -> Result<Self> {
        if minor > 3 {
            // mirrors a missing /dev node
            return Err(ViewerError::DioUnavailable);
        }
        info!(minor, "opened simulated DIO device");
        Ok(Self {
            minor,
            port: 0,
            outputs: false,
        })
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }
}

impl DigitalOutput for SimDio {
    fn configure_outputs(&mut self) -> Result<()> {
        self.outputs = true;
        self.port = 0;
        Ok(())
    }

    fn write_bit(&mut self, bit: u8, value: bool) -> Result<()> {
        if bit >= PORT_WIDTH {
            return Err(ViewerError::camera("write bit", format!("bit {bit} out of range")));
        }
        if value {
            self.port |= 1 << bit;
        } else {
            self.port &= !(1 << bit);
        }
        Ok(())
    }

    fn read_port(&mut self) -> Result<u8> {
        Ok(self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_set_and_clear_independently() {
        let mut dio = SimDio::open(0).expect("open");
        dio.configure_outputs().expect("configure");
        dio.write_bit(0, true).expect("write");
        dio.write_bit(5, true).expect("write");
        assert_eq!(dio.read_port().expect("read"), 0b0010_0001);
        dio.write_bit(0, false).expect("write");
        assert_eq!(dio.read_port().expect("read"), 0b0010_0000);
    }

    #[test]
    fn out_of_range_bit_is_rejected() {
        let mut dio = SimDio::open(1).expect("open");
        assert!(dio.write_bit(PORT_WIDTH, true).is_err());
    }

    #[test]
    fn missing_device_node_fails_open() {
        assert!(matches!(SimDio::open(9), Err(ViewerError::DioUnavailable)));
    }
}
