//! ## acmsim-link::modcod
//! **Modulation and coding profiles**
//!
//! A [`ModcodTable`] is built once and never mutated. Construction checks that
//! profiles come in non-decreasing bit-rate order, so every consumer may rely
//! on "higher index ⇒ at least as fast, and at most as robust".
//!
//! The DVB-S2 helpers derive payload and frame duration from the standard's
//! BCH block sizes (EN 302 307, tables 5a/5b): the BBFRAME data field is
//! `K_bch - 80` bits, and a PLFRAME is one 90-symbol header plus
//! `N_ldpc / bits_per_symbol` symbols, plus 36 pilot symbols every 16 slots
//! when pilots are on.

use std::fmt;
use std::ops::Index;

use serde::Serialize;

use crate::error::LinkError;
use acmsim_core::SimTime;

/// Index of a MODCOD in its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModcodId(usize);

impl ModcodId {
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for ModcodId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for ModcodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MC{}", self.0)
    }
}

/// One transmission profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Modcod {
    name: String,
    payload_bits: u64,
    transmission_time: SimTime,
}

impl Modcod {
    pub fn new(name: impl Into<String>, payload_bits: u64, transmission_time: SimTime) -> Self {
        Self {
            name: name.into(),
            payload_bits,
            transmission_time,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bits of user payload a frame carries.
    #[inline]
    pub fn payload_bits(&self) -> u64 {
        self.payload_bits
    }

    /// Whole bytes of user payload a frame carries.
    #[inline]
    pub fn payload_bytes(&self) -> usize {
        (self.payload_bits / 8) as usize
    }

    /// Time to put one frame on the air.
    #[inline]
    pub fn transmission_time(&self) -> SimTime {
        self.transmission_time
    }

    /// Useful bit rate when frames of this profile are sent back to back.
    #[inline]
    pub fn bit_rate(&self) -> f64 {
        self.payload_bits as f64 / self.transmission_time
    }
}

/// DVB-S2 frame length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameSize {
    #[default]
    Normal,
    Short,
}

impl FrameSize {
    /// LDPC codeword length in bits.
    pub const fn n_ldpc(self) -> u32 {
        match self {
            FrameSize::Normal => 64_800,
            FrameSize::Short => 16_200,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            FrameSize::Normal => "normal",
            FrameSize::Short => "short",
        }
    }
}

struct DvbS2Entry {
    name: &'static str,
    bits_per_symbol: u32,
    k_bch_normal: u32,
    k_bch_short: Option<u32>,
}

const BBHEADER_BITS: u32 = 80;
const PLHEADER_SYMBOLS: u32 = 90;
const SLOT_SYMBOLS: u32 = 90;
const PILOT_BLOCK_SYMBOLS: u32 = 36;

const fn entry(name: &'static str, bps: u32, normal: u32, short: Option<u32>) -> DvbS2Entry {
    DvbS2Entry {
        name,
        bits_per_symbol: bps,
        k_bch_normal: normal,
        k_bch_short: short,
    }
}

#[rustfmt::skip]
const DVB_S2_TABLE: &[DvbS2Entry] = &[
    entry("QPSK 1/4",    2, 16_008, Some(3_072)),
    entry("QPSK 1/3",    2, 21_408, Some(5_232)),
    entry("QPSK 2/5",    2, 25_728, Some(6_312)),
    entry("QPSK 1/2",    2, 32_208, Some(7_032)),
    entry("QPSK 3/5",    2, 38_688, Some(9_552)),
    entry("QPSK 2/3",    2, 43_040, Some(10_632)),
    entry("QPSK 3/4",    2, 48_408, Some(11_712)),
    entry("QPSK 4/5",    2, 51_648, Some(12_432)),
    entry("QPSK 5/6",    2, 53_840, Some(13_152)),
    entry("QPSK 8/9",    2, 57_472, Some(14_232)),
    entry("QPSK 9/10",   2, 58_192, None),
    entry("8PSK 3/5",    3, 38_688, Some(9_552)),
    entry("8PSK 2/3",    3, 43_040, Some(10_632)),
    entry("8PSK 3/4",    3, 48_408, Some(11_712)),
    entry("8PSK 5/6",    3, 53_840, Some(13_152)),
    entry("8PSK 8/9",    3, 57_472, Some(14_232)),
    entry("8PSK 9/10",   3, 58_192, None),
    entry("16APSK 2/3",  4, 43_040, Some(10_632)),
    entry("16APSK 3/4",  4, 48_408, Some(11_712)),
    entry("16APSK 4/5",  4, 51_648, Some(12_432)),
    entry("16APSK 5/6",  4, 53_840, Some(13_152)),
    entry("16APSK 8/9",  4, 57_472, Some(14_232)),
    entry("16APSK 9/10", 4, 58_192, None),
    entry("32APSK 3/4",  5, 48_408, Some(11_712)),
    entry("32APSK 4/5",  5, 51_648, Some(12_432)),
    entry("32APSK 5/6",  5, 53_840, Some(13_152)),
    entry("32APSK 8/9",  5, 57_472, Some(14_232)),
    entry("32APSK 9/10", 5, 58_192, None),
];

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Names of every DVB-S2 MODCOD known to [`dvb_s2_modcod`].
pub fn dvb_s2_names() -> impl Iterator<Item = &'static str> {
    DVB_S2_TABLE.iter().map(|e| e.name)
}

/// Builds a DVB-S2 profile from its name (e.g. `"8PSK 3/4"`).
pub fn dvb_s2_modcod(
    name: &str,
    symbol_rate: f64,
    frame: FrameSize,
    pilots: bool,
) -> Result<Modcod, LinkError> {
    if !(symbol_rate > 0.0) {
        return Err(LinkError::InvalidRate(symbol_rate));
    }
    let wanted = normalize(name);
    let entry = DVB_S2_TABLE
        .iter()
        .find(|e| normalize(e.name) == wanted)
        .ok_or_else(|| LinkError::UnknownModcod(name.to_string()))?;

    let k_bch = match frame {
        FrameSize::Normal => entry.k_bch_normal,
        FrameSize::Short => entry.k_bch_short.ok_or(LinkError::UnsupportedFrameSize {
            name: entry.name.to_string(),
            frame: frame.label(),
        })?,
    };

    let slots = frame.n_ldpc() / (entry.bits_per_symbol * SLOT_SYMBOLS);
    let mut symbols = PLHEADER_SYMBOLS + slots * SLOT_SYMBOLS;
    if pilots {
        symbols += PILOT_BLOCK_SYMBOLS * ((slots - 1) / 16);
    }

    Ok(Modcod::new(
        entry.name,
        u64::from(k_bch - BBHEADER_BITS),
        f64::from(symbols) / symbol_rate,
    ))
}

/// Immutable, bit-rate ordered list of MODCODs.
#[derive(Debug, Clone, PartialEq)]
pub struct ModcodTable {
    modcods: Vec<Modcod>,
}

impl ModcodTable {
    /// Builds a table, rejecting empty tables, degenerate profiles and any
    /// profile slower than the one before it.
    pub fn new(modcods: Vec<Modcod>) -> Result<Self, LinkError> {
        if modcods.is_empty() {
            return Err(LinkError::EmptyTable);
        }
        for m in &modcods {
            if m.payload_bits == 0 || !(m.transmission_time > 0.0) {
                return Err(LinkError::InvalidModcod {
                    name: m.name.clone(),
                });
            }
        }
        for (index, pair) in modcods.windows(2).enumerate() {
            let (previous, current) = (pair[0].bit_rate(), pair[1].bit_rate());
            if current < previous {
                return Err(LinkError::ModcodOrder {
                    index: index + 1,
                    name: pair[1].name.clone(),
                    bit_rate: current,
                    previous,
                });
            }
        }
        Ok(Self { modcods })
    }

    /// Builds a table of DVB-S2 profiles, in the given order.
    pub fn dvb_s2<S: AsRef<str>>(
        names: &[S],
        symbol_rate: f64,
        frame: FrameSize,
        pilots: bool,
    ) -> Result<Self, LinkError> {
        let modcods = names
            .iter()
            .map(|n| dvb_s2_modcod(n.as_ref(), symbol_rate, frame, pilots))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(modcods)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.modcods.len()
    }

    /// Always `false`: construction rejects empty tables.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.modcods.is_empty()
    }

    pub fn get(&self, id: ModcodId) -> Option<&Modcod> {
        self.modcods.get(id.index())
    }

    /// Identifiers from the most robust to the fastest profile.
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = ModcodId> + ExactSizeIterator {
        (0..self.modcods.len()).map(ModcodId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModcodId, &Modcod)> {
        self.modcods
            .iter()
            .enumerate()
            .map(|(i, m)| (ModcodId(i), m))
    }

    #[inline]
    pub fn payload_bits(&self, id: ModcodId) -> u64 {
        self[id].payload_bits
    }

    #[inline]
    pub fn transmission_time(&self, id: ModcodId) -> SimTime {
        self[id].transmission_time
    }
}

impl Index<ModcodId> for ModcodTable {
    type Output = Modcod;

    fn index(&self, id: ModcodId) -> &Modcod {
        &self.modcods[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qpsk_quarter_normal_frame() {
        let m = dvb_s2_modcod("QPSK 1/4", 27.5e6, FrameSize::Normal, false).unwrap();
        assert_eq!(m.payload_bits(), 15_928);
        // 360 slots of 90 symbols plus the PL header.
        let expected = 32_490.0 / 27.5e6;
        assert!((m.transmission_time() - expected).abs() < 1e-12);
    }

    #[test]
    fn pilots_lengthen_the_frame() {
        let plain = dvb_s2_modcod("8PSK 3/4", 1e6, FrameSize::Normal, false).unwrap();
        let piloted = dvb_s2_modcod("8psk3/4", 1e6, FrameSize::Normal, true).unwrap();
        // 240 slots -> 14 pilot blocks of 36 symbols.
        let extra = (piloted.transmission_time() - plain.transmission_time()) * 1e6;
        assert!((extra - 504.0).abs() < 1e-6);
        assert_eq!(plain.payload_bits(), piloted.payload_bits());
    }

    #[test]
    fn short_frames_lack_nine_tenths() {
        let err = dvb_s2_modcod("QPSK 9/10", 1e6, FrameSize::Short, false).unwrap_err();
        assert!(matches!(err, LinkError::UnsupportedFrameSize { .. }));
        let short = dvb_s2_modcod("QPSK 1/2", 1e6, FrameSize::Short, false).unwrap();
        assert_eq!(short.payload_bits(), 6_952);
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(
            dvb_s2_modcod("64APSK 1/2", 1e6, FrameSize::Normal, false).unwrap_err(),
            LinkError::UnknownModcod("64APSK 1/2".into())
        );
    }

    #[test]
    fn table_enforces_bit_rate_order() {
        let table =
            ModcodTable::dvb_s2(&["QPSK 1/2", "QPSK 3/4", "8PSK 3/4"], 1e6, FrameSize::Normal, false)
                .unwrap();
        assert_eq!(table.len(), 3);

        // 8PSK 3/5 is marginally less efficient than QPSK 9/10.
        let err = ModcodTable::dvb_s2(&["QPSK 9/10", "8PSK 3/5"], 1e6, FrameSize::Normal, false)
            .unwrap_err();
        assert!(matches!(err, LinkError::ModcodOrder { index: 1, .. }));
    }

    #[test]
    fn explicit_profiles() {
        let table = ModcodTable::new(vec![
            Modcod::new("robust", 1900 * 8, 1e-3),
            Modcod::new("fast", 3800 * 8, 1e-3),
        ])
        .unwrap();
        let fast = ModcodId::new(1);
        assert_eq!(table[fast].payload_bytes(), 3800);
        assert_eq!(table.payload_bits(fast), 30_400);
        assert_eq!(table.ids().collect::<Vec<_>>(), [ModcodId::new(0), fast]);

        assert_eq!(ModcodTable::new(Vec::new()).unwrap_err(), LinkError::EmptyTable);
        assert!(ModcodTable::new(vec![Modcod::new("dead", 0, 1.0)]).is_err());
    }

    #[test]
    fn known_names_all_build() {
        for name in dvb_s2_names() {
            assert!(dvb_s2_modcod(name, 1e6, FrameSize::Normal, true).is_ok(), "{name}");
        }
    }
}
