//! Typed NMEA sentence records.
//!
//! Every record carries `last_time`, the tick of its last complete update.
//! `0` means "not updated since the last consumer reset". The parser only
//! ever sets a non-zero value; consumers reset it to 0 once they have taken
//! the data (see `take_fresh`).

use core::fmt;

use tinyvec::ArrayVec;

/// Fixed-capacity copy of a text field. Longer input is cut at the last
/// character boundary that fits.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Text<const N: usize>(ArrayVec<[u8; N]>);

impl<const N: usize> Text<N> {
    pub fn from_str_truncated(s: &str) -> Self {
        let mut end = s.len().min(N);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut buf = ArrayVec::new();
        buf.extend_from_slice(&s.as_bytes()[..end]);
        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.0.as_slice()).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> PartialEq<&str> for Text<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl<const N: usize> fmt::Debug for Text<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for Text<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl<const N: usize> defmt::Format for Text<N> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}

/// `hhmmss.sss`
pub type UtcTime = Text<10>;
/// Single letter: hemisphere, status, unit or mode.
pub type Letter = Text<1>;

/// GGA, time, position and fix related data.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gga {
    pub utc_time: UtcTime,
    /// `DDMM.MMMM`
    pub latitude: f64,
    pub latitude_dir: Letter,
    /// `DDDMM.MMMM`
    pub longitude: f64,
    pub longitude_dir: Letter,
    /// 0 invalid, 1 GPS fix, 2 differential, 4/5 RTK, 6 dead reckoning.
    pub fix_quality: u8,
    pub satellites: u8,
    pub hdop: f32,
    /// Above mean sea level.
    pub altitude: f32,
    pub altitude_unit: Letter,
    pub geoid_separation: f32,
    pub geoid_unit: Letter,
    pub last_time: u32,
}

/// GLL, geographic position.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gll {
    pub latitude: f64,
    pub latitude_dir: Letter,
    pub longitude: f64,
    pub longitude_dir: Letter,
    pub utc_time: UtcTime,
    /// `A` valid, `V` not valid.
    pub status: Letter,
    pub last_time: u32,
}

/// RMC, recommended minimum data.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rmc {
    pub utc_time: UtcTime,
    /// `A` active, `V` void.
    pub status: Letter,
    pub latitude: f64,
    pub latitude_dir: Letter,
    pub longitude: f64,
    pub longitude_dir: Letter,
    /// Knots over ground.
    pub speed: f32,
    /// Degrees true.
    pub track: f32,
    /// `DDMMYY`
    pub date: Text<6>,
    pub variation: f32,
    /// `E`/`W`, empty when the sentence omits it.
    pub variation_dir: Letter,
    pub last_time: u32,
}

/// Satellite slots in one GSA sentence.
pub const GSA_SLOTS: usize = 12;

/// GSA, DOP and active satellites.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gsa {
    /// `M` manual, `A` automatic.
    pub mode: Letter,
    /// 1 no fix, 2 2D, 3 3D.
    pub fix_type: u8,
    pub prns: [Option<u8>; GSA_SLOTS],
    pub pdop: f32,
    pub hdop: f32,
    pub vdop: f32,
    pub last_time: u32,
}

impl Gsa {
    pub fn active(&self) -> impl Iterator<Item = u8> + '_ {
        self.prns.iter().flatten().copied()
    }
}

/// VTG, track made good and ground speed.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vtg {
    pub track_true: f32,
    pub track_true_id: Letter,
    pub track_magnetic: f32,
    pub track_magnetic_id: Letter,
    pub speed_knots: f32,
    pub speed_knots_id: Letter,
    pub speed_kph: f32,
    pub speed_kph_id: Letter,
    pub last_time: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Satellite {
    pub prn: u8,
    /// Degrees, 90 max.
    pub elevation: u8,
    /// Degrees from true north.
    pub azimuth: u16,
    /// dB, 0 when not tracking.
    pub snr: u8,
}

/// Satellite blocks in one GSV sentence.
pub const GSV_BLOCKS: usize = 4;

/// GSV, satellites in view. One sentence of a multi-sentence cycle.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gsv {
    pub total: u8,
    pub number: u8,
    pub in_view: u8,
    pub blocks: [Satellite; GSV_BLOCKS],
    pub block_count: u8,
    pub last_time: u32,
}

impl Gsv {
    pub fn satellites(&self) -> &[Satellite] {
        &self.blocks[..self.block_count as usize]
    }
}

macro_rules! impl_take_fresh {
    ($($record:ty),*) => {$(
        impl $record {
            pub fn is_fresh(&self) -> bool {
                self.last_time != 0
            }

            /// Copy of the record if it changed since the last take. Marks it
            /// as consumed.
            pub fn take_fresh(&mut self) -> Option<Self> {
                if !self.is_fresh() {
                    return None;
                }
                let record = *self;
                self.last_time = 0;
                Some(record)
            }
        }
    )*};
}

impl_take_fresh!(Gga, Gll, Rmc, Gsa, Vtg, Gsv);

/// The latest record of every sentence kind.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpsData {
    pub gga: Gga,
    pub gll: Gll,
    pub rmc: Rmc,
    pub gsa: Gsa,
    pub vtg: Vtg,
    pub gsv: Gsv,
}
