//! Application-facing GPS receiver: an [`NmeaParser`] plus a clock and the
//! PMTK configuration the receiver should run with.

use chrono::NaiveDate;
use thiserror::Error;

use crate::{
    nmea::{
        command::{self, CommandError, IntervalMode, Intervals},
        GpsData, NmeaParser, ParseError, DEFAULT_FIFO_SIZE,
    },
    pio::PioBlock,
    uart::UartError,
    Clock, FloatExt, Position,
};

/// Two-digit years in RMC dates count from here.
pub const START_YEAR: i32 = 2000;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpsError {
    #[error("uart: {0}")]
    Uart(#[from] UartError),
    #[error("command: {0}")]
    Command(#[from] CommandError),
}

/// Converts `DDMM.MMMM` (or `DDDMM.MMMM`) to signed decimal degrees.
/// `S` and `W` are negative.
pub fn decimal_degrees(value: f64, hemisphere: &str) -> f64 {
    let degrees = FloatExt::trunc(value / 100.0);
    let minutes = value - degrees * 100.0;
    let dd = degrees + minutes / 60.0;
    match hemisphere {
        "S" | "W" => -dd,
        _ => dd,
    }
}

pub struct Gps<'a, P: PioBlock, C: Clock, const N: usize = DEFAULT_FIFO_SIZE> {
    parser: NmeaParser<'a, P, N>,
    clock: C,
    intervals: Intervals,
}

impl<'a, P: PioBlock, C: Clock, const N: usize> Gps<'a, P, C, N> {
    pub fn new(parser: NmeaParser<'a, P, N>, clock: C, intervals: Intervals) -> Self {
        Self {
            parser,
            clock,
            intervals,
        }
    }

    /// Activates the channels, starts the block's receive interrupts and
    /// pushes the configured output intervals.
    ///
    /// Other channels sharing the PIO block must be activated before this.
    pub fn init(&mut self) -> Result<(), GpsError> {
        self.parser.activate()?;
        self.parser.start();
        self.update_intervals()
    }

    pub fn is_available(&self) -> bool {
        self.parser.available() > 0
    }

    /// Next complete line, decoded into [`Gps::data`] on the way. See
    /// [`NmeaParser::read`].
    pub fn read(&mut self) -> Option<Result<&str, ParseError>> {
        let now = self.clock.millis();
        self.parser.read(now)
    }

    pub fn write(&mut self, command: &str) -> Result<(), GpsError> {
        Ok(self.parser.send(command)?)
    }

    pub fn data(&self) -> &GpsData {
        self.parser.data()
    }

    pub fn data_mut(&mut self) -> &mut GpsData {
        self.parser.data_mut()
    }

    pub fn parser_mut(&mut self) -> &mut NmeaParser<'a, P, N> {
        &mut self.parser
    }

    pub fn intervals(&self) -> &Intervals {
        &self.intervals
    }

    /// Latitude of the last GGA fix, 0 when there is none.
    pub fn latitude(&self) -> f64 {
        let gga = &self.data().gga;
        if gga.latitude > 0.0 {
            decimal_degrees(gga.latitude, gga.latitude_dir.as_str())
        } else {
            0.0
        }
    }

    /// Longitude of the last GGA fix, 0 when there is none.
    pub fn longitude(&self) -> f64 {
        let gga = &self.data().gga;
        if gga.longitude > 0.0 {
            decimal_degrees(gga.longitude, gga.longitude_dir.as_str())
        } else {
            0.0
        }
    }

    pub fn position(&self) -> Position {
        Position {
            lat: self.latitude(),
            lon: self.longitude(),
        }
    }

    /// RMC date as the integer `DDMMYY`, 0 before the first RMC.
    pub fn date(&self) -> u32 {
        self.data().rmc.date.as_str().parse().unwrap_or(0)
    }

    pub fn year(&self) -> i32 {
        (self.date() % 100) as i32 + START_YEAR
    }

    pub fn month(&self) -> u32 {
        (self.date() / 100) % 100
    }

    pub fn day(&self) -> u32 {
        self.date() / 10000
    }

    /// `None` until an RMC with a real date arrived.
    pub fn naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year(), self.month(), self.day())
    }

    /// Ground speed in knots.
    pub fn speed(&self) -> f32 {
        self.data().rmc.speed
    }

    /// Turns the configured output intervals off, then on again.
    pub fn update_intervals(&mut self) -> Result<(), GpsError> {
        for mode in [IntervalMode::Disable, IntervalMode::Enable] {
            let cmd = command::output_intervals(&self.intervals, mode)?;
            self.write(cmd.as_str().ok_or(CommandError::TooLong)?)?;
        }
        Ok(())
    }

    pub fn set_intervals(&mut self, intervals: Intervals) -> Result<(), GpsError> {
        self.intervals = intervals;
        self.update_intervals()
    }

    /// Position fix rate in Hz.
    pub fn set_frequency(&mut self, hz: f64) -> Result<(), GpsError> {
        let cmd = command::pos_fix_interval(command::interval_for_rate(hz)?)?;
        self.write(cmd.as_str().ok_or(CommandError::TooLong)?)
    }

    /// Seconds between position fixes. The receiver tops out at 10.
    pub fn set_delay(&mut self, seconds: u16) -> Result<(), GpsError> {
        self.set_frequency(1.0 / seconds as f64)
    }

    pub fn standby(&mut self) -> Result<(), GpsError> {
        self.write(command::STANDBY)
    }

    pub fn wakeup(&mut self) -> Result<(), GpsError> {
        self.write(command::WAKEUP)
    }

    pub fn free(self) {
        self.parser.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pio::mock::{capture_frame, MockPio},
        rb::Ringbuf,
        uart::{UartConfig, UartPio},
    };
    use core::cell::Cell;

    const GGA: &[u8] = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
    const RMC: &[u8] = b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";

    fn ring() -> &'static Ringbuf<256> {
        Box::leak(Box::new(Ringbuf::new()))
    }

    fn uart() -> UartPio<MockPio> {
        UartPio::new(MockPio::new(125_000_000), UartConfig::PICO)
    }

    /// Bytes the transmit state machine (sm 0) was handed, split into lines.
    fn sent_lines(uart: &UartPio<MockPio>) -> Vec<String> {
        let bytes: Vec<u8> = uart
            .pio()
            .tx_words(0)
            .into_iter()
            .map(|w| ((w >> 1) & 0xff) as u8)
            .collect();
        String::from_utf8(bytes)
            .unwrap()
            .split_terminator("\r\n")
            .map(String::from)
            .collect()
    }

    fn feed(uart: &UartPio<MockPio>, sm: u8, bytes: &[u8]) {
        for &b in bytes {
            uart.pio().inject_rx(sm, capture_frame(b, uart.config()));
        }
        uart.on_interrupt();
    }

    #[test]
    fn converts_to_decimal_degrees() {
        assert!((decimal_degrees(4807.038, "N") - 48.1173).abs() < 1e-4);
        assert!((decimal_degrees(4807.038, "S") + 48.1173).abs() < 1e-4);
        assert!((decimal_degrees(1131.0, "E") - 11.516_666).abs() < 1e-4);
        assert!((decimal_degrees(12311.12, "W") + 123.185_333).abs() < 1e-4);
    }

    #[test]
    fn init_sends_interval_commands() {
        let uart = uart();
        let parser = NmeaParser::init(&uart, 9, Some(8), ring()).unwrap();
        let mut gps = Gps::new(parser, || 0u32, Intervals::default());
        gps.init().unwrap();
        assert!(uart.is_started());
        assert!(uart.pio().sm(1).rx_irq);

        assert_eq!(
            sent_lines(&uart),
            vec![
                "$PMTK314,1,1,1,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0*28",
                "$PMTK314,1,1,1,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0*29",
            ]
        );
    }

    #[test]
    fn init_without_transmitter_fails() {
        let uart = uart();
        let parser = NmeaParser::init(&uart, 9, None, ring()).unwrap();
        let mut gps = Gps::new(parser, || 0u32, Intervals::default());
        assert_eq!(gps.init(), Err(GpsError::Uart(UartError::NoTransmitter)));
    }

    #[test]
    fn decodes_position_and_date() {
        let uart = uart();
        let parser = NmeaParser::init(&uart, 9, Some(8), ring()).unwrap();
        let tick = Cell::new(1000u32);
        let mut gps = Gps::new(parser, || tick.get(), Intervals::default());
        gps.init().unwrap();

        assert!(!gps.is_available());
        assert_eq!(gps.latitude(), 0.0);
        assert_eq!(gps.naive_date(), None);

        // Receive channel runs on sm 1, below the transmitter
        feed(&uart, 1, GGA);
        feed(&uart, 1, RMC);
        assert!(gps.is_available());
        assert!(matches!(gps.read(), Some(Ok(line)) if line.starts_with("$GPGGA")));
        tick.set(2000);
        assert!(matches!(gps.read(), Some(Ok(_))));
        assert!(gps.read().is_none());
        assert!(!gps.is_available());

        assert_eq!(gps.data().gga.last_time, 1000);
        assert_eq!(gps.data().rmc.last_time, 2000);
        assert!((gps.latitude() - 48.1173).abs() < 1e-4);
        assert!((gps.longitude() - 11.5167).abs() < 1e-4);
        assert_eq!(gps.date(), 230394);
        assert_eq!((gps.year(), gps.month(), gps.day()), (2094, 3, 23));
        assert_eq!(gps.naive_date(), NaiveDate::from_ymd_opt(2094, 3, 23));
        assert_eq!(gps.speed(), 22.4);

        let fresh = gps.data_mut().rmc.take_fresh();
        assert!(fresh.is_some());
        assert_eq!(gps.data().rmc.last_time, 0);
    }

    #[test]
    fn southern_fix_is_negative() {
        let uart = uart();
        let parser = NmeaParser::init(&uart, 9, None, ring()).unwrap();
        let mut gps = Gps::new(parser, || 5u32, Intervals::default());
        gps.parser_mut().activate().unwrap();

        feed(&uart, 0, b"$GPGGA,000000,3351.000,S,15112.000,W,1,05,1.0,10.0,M,0.0,M,,\n");
        gps.read();
        assert!((gps.latitude() + 33.85).abs() < 1e-6);
        assert!((gps.longitude() + 151.2).abs() < 1e-6);
    }

    #[test]
    fn rate_commands() {
        let uart = uart();
        let parser = NmeaParser::init(&uart, 9, Some(8), ring()).unwrap();
        let mut gps = Gps::new(parser, || 0u32, Intervals::default());
        gps.parser_mut().activate().unwrap();

        gps.set_frequency(5.0).unwrap();
        gps.set_delay(2).unwrap();
        gps.standby().unwrap();
        gps.wakeup().unwrap();
        assert_eq!(gps.set_frequency(0.0), Err(GpsError::Command(CommandError::InvalidRate)));
        assert_eq!(gps.set_delay(0), Err(GpsError::Command(CommandError::InvalidRate)));

        assert_eq!(
            sent_lines(&uart),
            vec![
                "$PMTK220,200*2C",
                "$PMTK220,2000*1C",
                command::STANDBY,
                command::WAKEUP
            ]
        );
    }

    #[test]
    fn changing_intervals_resends_them() {
        let uart = uart();
        let parser = NmeaParser::init(&uart, 9, Some(8), ring()).unwrap();
        let mut gps = Gps::new(parser, || 0u32, Intervals::default());
        gps.parser_mut().activate().unwrap();

        gps.set_intervals(Intervals {
            gsv: true,
            ..Intervals::default()
        })
        .unwrap();
        let lines = sent_lines(&uart);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("$PMTK314,1,1,1,1,0,1,0"));
        assert!(gps.intervals().gsv);
    }
}
