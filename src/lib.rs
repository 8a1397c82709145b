#![cfg_attr(not(test), no_std)]

//! Software UART on the RP2040 PIO and an NMEA 0183 parser for serial GPS
//! modules.
//!
//! The receive path runs pin -> PIO state machine -> [`UartPio::on_interrupt`]
//! -> [`rb::Ringbuf`] -> [`nmea::NmeaParser::read`] -> typed records. The
//! transmit path runs command string -> [`uart::UartTx`] -> pin.

use core::fmt::{self, Write};
use tinyvec::ArrayVec;

#[macro_use]
mod log;

pub mod gps;
pub mod nmea;
pub mod pio;
pub mod rb;
pub mod uart;

pub use gps::{decimal_degrees, Gps, GpsError};
pub use nmea::{Enabled, GpsData, NmeaParser, SentenceKind, DEFAULT_FIFO_SIZE};
pub use uart::{UartConfig, UartError, UartPio};

/// Source of the monotonic millisecond tick stamped into `last_time`.
pub trait Clock {
    fn millis(&self) -> u32;
}

impl<F: Fn() -> u32> Clock for F {
    fn millis(&self) -> u32 {
        self()
    }
}

pub struct FmtBuf<const N: usize = 256>(pub ArrayVec<[u8; N]>);

impl<const N: usize> Write for FmtBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if self.0.try_push(b).is_some() {
                return Err(fmt::Error);
            }
        }
        Ok(())
    }
}

impl<const N: usize> FmtBuf<N> {
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.0.as_slice()).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn new() -> Self {
        Self(Default::default())
    }
}

impl<const N: usize> Default for FmtBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

// These aren't in core for some reason, so do this to avoid pulling in a dependency
pub trait FloatExt {
    fn trunc(self) -> Self;
}

impl FloatExt for f64 {
    // Only exact for |self| < 2^63, which covers every coordinate and rate we see
    fn trunc(self) -> Self {
        (self as i64) as f64
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_buf_reports_overflow() {
        let mut buf = FmtBuf::<4>::new();
        assert!(write!(buf, "abcd").is_ok());
        assert!(write!(buf, "e").is_err());
        assert_eq!(buf.as_str(), Some("abcd"));
    }

    #[test]
    fn float_helpers() {
        assert_eq!(FloatExt::trunc(48.9f64), 48.0);
        assert_eq!(FloatExt::trunc(-48.9f64), -48.0);
    }

    #[test]
    fn closures_are_clocks() {
        let clock = || 42u32;
        assert_eq!(clock.millis(), 42);
    }
}
