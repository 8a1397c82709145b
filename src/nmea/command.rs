//! PMTK commands for MediaTek-based receivers.

use core::fmt::Write;

use thiserror::Error;

use crate::FmtBuf;

/// Room for the longest command this module builds.
pub const COMMAND_CAPACITY: usize = 64;

pub type Command = FmtBuf<COMMAND_CAPACITY>;

/// Enter standby; any byte on the line wakes the receiver.
pub const STANDBY: &str = "$PMTK161,0*28";
pub const WAKEUP: &str = "$PMTK161,0*29";

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    #[error("update rate must be positive and finite")]
    InvalidRate,
    #[error("command does not fit the buffer")]
    TooLong,
}

impl From<core::fmt::Error> for CommandError {
    fn from(_: core::fmt::Error) -> Self {
        Self::TooLong
    }
}

/// XOR of every payload byte.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, b| acc ^ b)
}

/// Whether `sentence` is `$payload*HH` with a matching checksum. A trailing
/// line ending is ignored.
pub fn verify(sentence: &str) -> bool {
    let sentence = sentence.trim_end_matches(['\r', '\n']);
    let Some(rest) = sentence.strip_prefix('$') else {
        return false;
    };
    let Some((payload, hex)) = rest.split_once('*') else {
        return false;
    };
    hex.len() == 2 && u8::from_str_radix(hex, 16).is_ok_and(|sum| sum == checksum(payload.as_bytes()))
}

/// Sentence kinds the receiver emits on each fix.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Intervals {
    pub gll: bool,
    pub rmc: bool,
    pub vtg: bool,
    pub gga: bool,
    pub gsa: bool,
    pub gsv: bool,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            gll: true,
            rmc: true,
            vtg: true,
            gga: true,
            gsa: false,
            gsv: false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IntervalMode {
    Disable,
    Enable,
}

impl IntervalMode {
    /// The receiver accepts these fixed suffixes for the two forms of the
    /// output command rather than a computed checksum.
    fn suffix(self) -> &'static str {
        match self {
            IntervalMode::Disable => "28",
            IntervalMode::Enable => "29",
        }
    }
}

/// `PMTK314`, set NMEA output. Six kind flags followed by thirteen reserved
/// zero fields.
pub fn output_intervals(intervals: &Intervals, mode: IntervalMode) -> Result<Command, CommandError> {
    let mut cmd = Command::new();
    write!(cmd, "$PMTK314")?;
    for on in [
        intervals.gll,
        intervals.rmc,
        intervals.vtg,
        intervals.gga,
        intervals.gsa,
        intervals.gsv,
    ] {
        write!(cmd, ",{}", on as u8)?;
    }
    for _ in 0..13 {
        write!(cmd, ",0")?;
    }
    write!(cmd, "*{}", mode.suffix())?;
    Ok(cmd)
}

/// `PMTK220`, position fix interval in milliseconds.
pub fn pos_fix_interval(interval_ms: u32) -> Result<Command, CommandError> {
    let mut payload = Command::new();
    write!(payload, "PMTK220,{}", interval_ms)?;

    let mut cmd = Command::new();
    write!(
        cmd,
        "${}*{:02X}",
        payload.as_str().ok_or(CommandError::TooLong)?,
        checksum(payload.as_bytes())
    )?;
    Ok(cmd)
}

/// Fix interval for an update rate, truncated to whole milliseconds.
pub fn interval_for_rate(hz: f64) -> Result<u32, CommandError> {
    if !hz.is_finite() || hz <= 0.0 {
        return Err(CommandError::InvalidRate);
    }
    Ok((1000.0 / hz) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_xor() {
        assert_eq!(checksum(b"PMTK220,200"), 0x2C);
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(b"AA"), 0);
    }

    #[test]
    fn fix_interval_command() {
        let cmd = pos_fix_interval(200).unwrap();
        assert_eq!(cmd.as_str(), Some("$PMTK220,200*2C"));
        assert!(verify(cmd.as_str().unwrap()));
        assert_eq!(pos_fix_interval(1000).unwrap().as_str(), Some("$PMTK220,1000*1F"));
    }

    #[test]
    fn output_intervals_command() {
        let intervals = Intervals::default();
        let cmd = output_intervals(&intervals, IntervalMode::Enable).unwrap();
        assert_eq!(
            cmd.as_str(),
            Some("$PMTK314,1,1,1,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0*29")
        );

        let cmd = output_intervals(&intervals, IntervalMode::Disable).unwrap();
        assert!(cmd.as_str().unwrap().ends_with(",0*28"));

        let all = Intervals {
            gsa: true,
            gsv: true,
            ..intervals
        };
        let cmd = output_intervals(&all, IntervalMode::Enable).unwrap();
        assert!(cmd.as_str().unwrap().starts_with("$PMTK314,1,1,1,1,1,1,0"));
    }

    #[test]
    fn verifies_sentences() {
        assert!(verify("$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n"));
        assert!(verify(STANDBY));
        assert!(!verify("$PMTK220,200*2D"));
        assert!(!verify("PMTK220,200*2C"));
        assert!(!verify("$PMTK220,200"));
        assert!(!verify("$PMTK220,200*2"));
    }

    #[test]
    fn rates() {
        assert_eq!(interval_for_rate(5.0), Ok(200));
        assert_eq!(interval_for_rate(1.0 / 10.0), Ok(10000));
        assert_eq!(interval_for_rate(3.0), Ok(333));
        assert_eq!(interval_for_rate(0.0), Err(CommandError::InvalidRate));
        assert_eq!(interval_for_rate(-1.0), Err(CommandError::InvalidRate));
        assert_eq!(interval_for_rate(f64::INFINITY), Err(CommandError::InvalidRate));
        assert_eq!(interval_for_rate(f64::NAN), Err(CommandError::InvalidRate));
    }
}
