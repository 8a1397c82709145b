//! Sentence dispatcher: one line in, at most one record updated.

use core::str::{FromStr, Split};

use thiserror::Error;

use super::{
    records::{Gga, Gll, GpsData, Gsa, Gsv, Rmc, Satellite, Text, Vtg, GSA_SLOTS, GSV_BLOCKS},
    Enabled, SentenceKind,
};

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// The sentence ended before field `index` (1-based, header excluded).
    #[error("{kind:?} sentence is missing field {index}")]
    MissingField { kind: SentenceKind, index: u8 },
    #[error("line is not valid UTF-8")]
    NotUtf8,
}

/// Comma-separated fields of one sentence, header already consumed.
struct Fields<'a> {
    iter: Split<'a, char>,
    kind: SentenceKind,
    index: u8,
}

impl<'a> Fields<'a> {
    fn next(&mut self) -> Result<&'a str, ParseError> {
        self.index += 1;
        self.iter.next().ok_or(ParseError::MissingField {
            kind: self.kind,
            index: self.index,
        })
    }

    /// Empty or malformed numbers read as zero.
    fn num<T: FromStr + Default>(&mut self) -> Result<T, ParseError> {
        Ok(self.next()?.trim().parse().unwrap_or_default())
    }

    fn text<const N: usize>(&mut self) -> Result<Text<N>, ParseError> {
        Ok(Text::from_str_truncated(self.next()?))
    }

    fn remaining(&mut self) -> Option<&'a str> {
        self.iter.next()
    }
}

/// Strips the line ending and `*hh` checksum.
fn sentence_body(line: &str) -> &str {
    let line = line.trim_end_matches(['\r', '\n']);
    match line.split_once('*') {
        Some((body, _)) => body,
        None => line,
    }
}

impl GpsData {
    /// Parses one line into the matching record.
    ///
    /// Returns the kind that was updated, or `None` for unknown headers and
    /// disabled kinds. A record is written only once every field it needs
    /// was present; `last_time` becomes `now` (at least 1, 0 is reserved for
    /// "consumed").
    pub fn update(
        &mut self,
        line: &str,
        enabled: &Enabled,
        now: u32,
    ) -> Result<Option<SentenceKind>, ParseError> {
        let mut iter = sentence_body(line).split(',');
        let Some(kind) = iter.next().and_then(SentenceKind::from_header) else {
            return Ok(None);
        };
        if !enabled.get(kind) {
            return Ok(None);
        }

        let mut f = Fields { iter, kind, index: 0 };
        let stamp = now.max(1);
        match kind {
            SentenceKind::Gga => self.gga = parse_gga(&mut f, stamp)?,
            SentenceKind::Gll => self.gll = parse_gll(&mut f, stamp)?,
            SentenceKind::Rmc => self.rmc = parse_rmc(&mut f, stamp)?,
            SentenceKind::Gsa => self.gsa = parse_gsa(&mut f, stamp)?,
            SentenceKind::Vtg => self.vtg = parse_vtg(&mut f, stamp)?,
            SentenceKind::Gsv => self.gsv = parse_gsv(&mut f, stamp)?,
        }
        Ok(Some(kind))
    }
}

fn parse_gga(f: &mut Fields, last_time: u32) -> Result<Gga, ParseError> {
    Ok(Gga {
        utc_time: f.text()?,
        latitude: f.num()?,
        latitude_dir: f.text()?,
        longitude: f.num()?,
        longitude_dir: f.text()?,
        fix_quality: f.num()?,
        satellites: f.num()?,
        hdop: f.num()?,
        altitude: f.num()?,
        altitude_unit: f.text()?,
        geoid_separation: f.num()?,
        geoid_unit: f.text()?,
        last_time,
    })
}

fn parse_gll(f: &mut Fields, last_time: u32) -> Result<Gll, ParseError> {
    Ok(Gll {
        latitude: f.num()?,
        latitude_dir: f.text()?,
        longitude: f.num()?,
        longitude_dir: f.text()?,
        utc_time: f.text()?,
        status: f.text()?,
        last_time,
    })
}

fn parse_rmc(f: &mut Fields, last_time: u32) -> Result<Rmc, ParseError> {
    Ok(Rmc {
        utc_time: f.text()?,
        status: f.text()?,
        latitude: f.num()?,
        latitude_dir: f.text()?,
        longitude: f.num()?,
        longitude_dir: f.text()?,
        speed: f.num()?,
        track: f.num()?,
        date: f.text()?,
        variation: f.num()?,
        variation_dir: f.remaining().map(Text::from_str_truncated).unwrap_or_default(),
        last_time,
    })
}

fn parse_gsa(f: &mut Fields, last_time: u32) -> Result<Gsa, ParseError> {
    let mode = f.text()?;
    let fix_type = f.num()?;
    let mut prns = [None; GSA_SLOTS];
    for slot in prns.iter_mut() {
        *slot = f.next()?.trim().parse().ok();
    }
    Ok(Gsa {
        mode,
        fix_type,
        prns,
        pdop: f.num()?,
        hdop: f.num()?,
        vdop: f.num()?,
        last_time,
    })
}

fn parse_vtg(f: &mut Fields, last_time: u32) -> Result<Vtg, ParseError> {
    Ok(Vtg {
        track_true: f.num()?,
        track_true_id: f.text()?,
        track_magnetic: f.num()?,
        track_magnetic_id: f.text()?,
        speed_knots: f.num()?,
        speed_knots_id: f.text()?,
        speed_kph: f.num()?,
        speed_kph_id: f.text()?,
        last_time,
    })
}

fn parse_gsv(f: &mut Fields, last_time: u32) -> Result<Gsv, ParseError> {
    let mut gsv = Gsv {
        total: f.num()?,
        number: f.num()?,
        in_view: f.num()?,
        last_time,
        ..Gsv::default()
    };
    // The last sentence of a cycle carries fewer than four blocks
    while (gsv.block_count as usize) < GSV_BLOCKS {
        let Some(prn) = f.remaining() else {
            break;
        };
        f.index += 1;
        gsv.blocks[gsv.block_count as usize] = Satellite {
            prn: prn.trim().parse().unwrap_or_default(),
            elevation: f.num()?,
            azimuth: f.num()?,
            snr: f.num()?,
        };
        gsv.block_count += 1;
    }
    Ok(gsv)
}
