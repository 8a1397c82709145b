//! NMEA 0183 sentence parsing on top of a PIO UART.

pub mod command;
mod parser;
pub mod records;

pub use command::{CommandError, IntervalMode, Intervals};
pub use parser::ParseError;
pub use records::GpsData;

use crate::{
    pio::PioBlock,
    rb::Ringbuf,
    uart::{UartError, UartPio, UartRx, UartTx},
};

/// Ring buffer capacity used unless a channel picks its own.
pub const DEFAULT_FIFO_SIZE: usize = 128;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SentenceKind {
    Gga,
    Gll,
    Rmc,
    Gsa,
    Vtg,
    Gsv,
}

impl SentenceKind {
    pub const ALL: [SentenceKind; 6] = [
        SentenceKind::Gga,
        SentenceKind::Gll,
        SentenceKind::Rmc,
        SentenceKind::Gsa,
        SentenceKind::Vtg,
        SentenceKind::Gsv,
    ];

    pub const fn header(self) -> &'static str {
        match self {
            SentenceKind::Gga => "$GPGGA",
            SentenceKind::Gll => "$GPGLL",
            SentenceKind::Rmc => "$GPRMC",
            SentenceKind::Gsa => "$GPGSA",
            SentenceKind::Vtg => "$GPVTG",
            SentenceKind::Gsv => "$GPGSV",
        }
    }

    pub fn from_header(header: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.header() == header)
    }
}

/// Which sentence kinds the parser decodes. Lines of a disabled kind are
/// still returned by [`NmeaParser::read`], their record is left alone.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Enabled {
    pub gga: bool,
    pub gll: bool,
    pub rmc: bool,
    pub gsa: bool,
    pub vtg: bool,
    pub gsv: bool,
}

impl Default for Enabled {
    fn default() -> Self {
        Self {
            gga: true,
            gll: true,
            rmc: true,
            gsa: true,
            vtg: true,
            gsv: true,
        }
    }
}

impl Enabled {
    fn flag(&mut self, kind: SentenceKind) -> &mut bool {
        match kind {
            SentenceKind::Gga => &mut self.gga,
            SentenceKind::Gll => &mut self.gll,
            SentenceKind::Rmc => &mut self.rmc,
            SentenceKind::Gsa => &mut self.gsa,
            SentenceKind::Vtg => &mut self.vtg,
            SentenceKind::Gsv => &mut self.gsv,
        }
    }

    pub fn get(&self, kind: SentenceKind) -> bool {
        match kind {
            SentenceKind::Gga => self.gga,
            SentenceKind::Gll => self.gll,
            SentenceKind::Rmc => self.rmc,
            SentenceKind::Gsa => self.gsa,
            SentenceKind::Vtg => self.vtg,
            SentenceKind::Gsv => self.gsv,
        }
    }

    pub fn set(&mut self, kind: SentenceKind, on: bool) {
        *self.flag(kind) = on;
    }
}

/// Reads lines off a receive channel and keeps the latest record of each
/// sentence kind. Commands go out over the optional transmit channel.
pub struct NmeaParser<'a, P: PioBlock, const N: usize = DEFAULT_FIFO_SIZE> {
    rx: UartRx<'a, P, N>,
    tx: Option<UartTx<'a, P>>,
    data: GpsData,
    enabled: Enabled,
}

impl<'a, P: PioBlock, const N: usize> NmeaParser<'a, P, N> {
    pub fn new(rx: UartRx<'a, P, N>, tx: Option<UartTx<'a, P>>) -> Self {
        Self {
            rx,
            tx,
            data: GpsData::default(),
            enabled: Enabled::default(),
        }
    }

    /// Sets up both channels on `uart` without touching the hardware.
    pub fn init(
        uart: &'a UartPio<P>,
        rx_pin: u8,
        tx_pin: Option<u8>,
        ring: &'static Ringbuf<N>,
    ) -> Result<Self, UartError> {
        let tx = tx_pin.map(|pin| UartTx::init(uart, pin)).transpose()?;
        let rx = UartRx::init(uart, rx_pin, ring)?;
        Ok(Self::new(rx, tx))
    }

    /// Activates the transmit channel, if any, then the receive channel.
    pub fn activate(&mut self) -> Result<(), UartError> {
        if let Some(tx) = self.tx.as_mut() {
            tx.activate()?;
        }
        self.rx.activate()
    }

    /// Enables the receive interrupts of the block this parser runs on. With
    /// several channels on one block, activate all of them first.
    pub fn start(&self) {
        self.rx.uart().start();
    }

    /// Bytes waiting in the receive buffer.
    pub fn available(&self) -> usize {
        self.rx.available()
    }

    /// Takes the next complete line, updates the matching record stamped
    /// with `now_ms`, and returns the line (`\r` included).
    ///
    /// `None` means no complete line is queued. Sentences that cannot be
    /// decoded are logged and still returned; a line that is not UTF-8 is
    /// consumed and reported as [`ParseError::NotUtf8`].
    pub fn read(&mut self, now_ms: u32) -> Option<Result<&str, ParseError>> {
        let line = self.rx.read_line(b'\n')?;
        let Ok(line) = core::str::from_utf8(line) else {
            log_debug!("dropping line: {}", ParseError::NotUtf8);
            return Some(Err(ParseError::NotUtf8));
        };
        match self.data.update(line, &self.enabled, now_ms) {
            Ok(Some(kind)) => log_trace!("{:?} updated at {}", kind, now_ms),
            Ok(None) => {}
            Err(e) => log_debug!("ignoring sentence: {}", e),
        }
        Some(Ok(line))
    }

    /// Sends `command` followed by CR LF.
    pub fn send(&mut self, command: &str) -> Result<(), UartError> {
        let tx = self.tx.as_mut().ok_or(UartError::NoTransmitter)?;
        log_debug!("sending {}", command);
        tx.println(command)
    }

    pub fn data(&self) -> &GpsData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut GpsData {
        &mut self.data
    }

    pub fn enabled(&self) -> &Enabled {
        &self.enabled
    }

    pub fn enabled_mut(&mut self) -> &mut Enabled {
        &mut self.enabled
    }

    pub fn rx(&self) -> &UartRx<'a, P, N> {
        &self.rx
    }

    pub fn tx(&self) -> Option<&UartTx<'a, P>> {
        self.tx.as_ref()
    }

    /// Releases both channels.
    pub fn free(self) {
        if let Some(tx) = self.tx {
            tx.free();
        }
        self.rx.free();
    }
}
