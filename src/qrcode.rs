//! QR code encoding.
//!
//! Turns text or bytes into a [`QrMatrix`]: a square grid of dark and light modules following
//! QR Code Model 2 (versions 1 to 40, four error correction levels, numeric, alphanumeric, byte
//! and ECI segments). The matrix owns its modules, so it can be kept inside a long-lived render
//! instance and re-encoded whenever the content changes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while encoding data into a matrix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A segment's character count does not fit the count field of any version in range.
    #[error("segment too long")]
    SegmentTooLong,
    #[error("data length = {bits} bits, max capacity = {capacity} bits")]
    DataTooLong { bits: usize, capacity: usize },
    #[error("character {0:?} cannot be encoded in {1:?} mode")]
    InvalidCharacter(char, SegmentMode),
    #[error("ECI assignment value {0} out of range")]
    EciOutOfRange(u32),
    #[error("invalid version range {min}..={max}")]
    InvalidVersionRange { min: u8, max: u8 },
}

/// Error correction level.
///
/// Serialized with the single-letter names used by design options (`"L"`, `"M"`, `"Q"`, `"H"`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default, Serialize, Deserialize)]
pub enum ErrorCorrection {
    /// Tolerates ~7% erroneous codewords.
    #[serde(rename = "L")]
    Low,
    /// Tolerates ~15% erroneous codewords.
    #[serde(rename = "M")]
    Medium,
    /// Tolerates ~25% erroneous codewords.
    #[default]
    #[serde(rename = "Q")]
    Quartile,
    /// Tolerates ~30% erroneous codewords.
    #[serde(rename = "H")]
    High,
}

impl ErrorCorrection {
    fn ordinal(self) -> usize {
        use ErrorCorrection::*;
        match self {
            Low => 0,
            Medium => 1,
            Quartile => 2,
            High => 3,
        }
    }

    fn format_bits(self) -> u32 {
        use ErrorCorrection::*;
        match self {
            Low => 1,
            Medium => 0,
            Quartile => 3,
            High => 2,
        }
    }
}

/// A QR code version (1–40).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Version(u8);

impl Version {
    pub const MIN: Version = Version(1);
    pub const MAX: Version = Version(40);

    /// Creates a version from its number.
    ///
    /// # Panics
    ///
    /// Panics if the number is outside the range [1, 40]. Use [`Version::checked`] for
    /// untrusted input.
    pub const fn new(ver: u8) -> Self {
        assert!(
            Version::MIN.value() <= ver && ver <= Version::MAX.value(),
            "Version number out of range"
        );
        Self(ver)
    }

    pub fn checked(ver: u8) -> Option<Self> {
        (Self::MIN.0..=Self::MAX.0).contains(&ver).then_some(Self(ver))
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Side length in modules, `version * 4 + 17`.
    pub const fn side(self) -> i32 {
        self.0 as i32 * 4 + 17
    }
}

/// A mask pattern (0–7).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Mask(u8);

impl Mask {
    /// # Panics
    ///
    /// Panics if the number is outside the range [0, 7].
    pub const fn new(mask: u8) -> Self {
        assert!(mask <= 7, "Mask value out of range");
        Self(mask)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    fn inverts(self, x: i32, y: i32) -> bool {
        match self.0 {
            0 => (x + y) % 2 == 0,
            1 => y % 2 == 0,
            2 => x % 3 == 0,
            3 => (x + y) % 3 == 0,
            4 => (x / 3 + y / 2) % 2 == 0,
            5 => ((x * y) % 2) + ((x * y) % 3) == 0,
            6 => (((x * y) % 2) + ((x * y) % 3)) % 2 == 0,
            _ => (((x + y) % 2) + ((x * y) % 3)) % 2 == 0,
        }
    }
}

/// Data mode of a segment.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SegmentMode {
    Numeric,
    Alphanumeric,
    Byte,
    Eci,
}

impl SegmentMode {
    fn mode_bits(self) -> u32 {
        use SegmentMode::*;
        match self {
            Numeric => 0x1,
            Alphanumeric => 0x2,
            Byte => 0x4,
            Eci => 0x7,
        }
    }

    fn char_count_bits(self, ver: Version) -> u8 {
        use SegmentMode::*;
        let widths = match self {
            Numeric => [10, 12, 14],
            Alphanumeric => [9, 11, 13],
            Byte => [8, 16, 16],
            Eci => [0, 0, 0],
        };
        widths[usize::from((ver.value() + 7) / 17)]
    }
}

static ALPHANUMERIC_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

/// Append-only bit sequence, most significant bit first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct BitBuffer(Vec<bool>);

impl BitBuffer {
    fn append_bits(&mut self, val: u32, len: u8) {
        debug_assert!(len <= 31 && (val >> len) == 0);
        self.0.extend((0..len).rev().map(|i| get_bit(val, i)));
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// A run of data encoded in a single mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    mode: SegmentMode,
    num_chars: usize,
    data: BitBuffer,
}

impl Segment {
    pub fn make_bytes(data: &[u8]) -> Self {
        let mut bb = BitBuffer::default();
        for &b in data {
            bb.append_bits(u32::from(b), 8);
        }
        Segment { mode: SegmentMode::Byte, num_chars: data.len(), data: bb }
    }

    /// Digits only, packed three per 10 bits.
    pub fn make_numeric(text: &str) -> Result<Self, EncodeError> {
        let mut bb = BitBuffer::default();
        let mut accum: u32 = 0;
        let mut count: u8 = 0;
        for c in text.chars() {
            let digit = c
                .to_digit(10)
                .ok_or(EncodeError::InvalidCharacter(c, SegmentMode::Numeric))?;
            accum = accum * 10 + digit;
            count += 1;
            if count == 3 {
                bb.append_bits(accum, 10);
                accum = 0;
                count = 0;
            }
        }
        if count > 0 {
            bb.append_bits(accum, count * 3 + 1);
        }
        Ok(Segment { mode: SegmentMode::Numeric, num_chars: text.len(), data: bb })
    }

    /// Uppercase letters, digits and ` $%*+-./:`, packed two per 11 bits.
    pub fn make_alphanumeric(text: &str) -> Result<Self, EncodeError> {
        let mut bb = BitBuffer::default();
        let mut accum: u32 = 0;
        let mut count: u8 = 0;
        for c in text.chars() {
            let index = ALPHANUMERIC_CHARSET
                .find(c)
                .ok_or(EncodeError::InvalidCharacter(c, SegmentMode::Alphanumeric))?;
            accum = accum * 45 + index as u32;
            count += 1;
            if count == 2 {
                bb.append_bits(accum, 11);
                accum = 0;
                count = 0;
            }
        }
        if count > 0 {
            bb.append_bits(accum, 6);
        }
        Ok(Segment { mode: SegmentMode::Alphanumeric, num_chars: text.chars().count(), data: bb })
    }

    /// Extended Channel Interpretation designator.
    pub fn make_eci(assign_val: u32) -> Result<Self, EncodeError> {
        let mut bb = BitBuffer::default();
        if assign_val < 1 << 7 {
            bb.append_bits(assign_val, 8);
        } else if assign_val < 1 << 14 {
            bb.append_bits(0b10, 2);
            bb.append_bits(assign_val, 14);
        } else if assign_val < 1_000_000 {
            bb.append_bits(0b110, 3);
            bb.append_bits(assign_val, 21);
        } else {
            return Err(EncodeError::EciOutOfRange(assign_val));
        }
        Ok(Segment { mode: SegmentMode::Eci, num_chars: 0, data: bb })
    }

    /// Picks the most compact single mode able to hold `text`.
    pub fn make_text(text: &str) -> Self {
        if Self::is_numeric(text) {
            if let Ok(seg) = Self::make_numeric(text) {
                return seg;
            }
        }
        if Self::is_alphanumeric(text) {
            if let Ok(seg) = Self::make_alphanumeric(text) {
                return seg;
            }
        }
        Self::make_bytes(text.as_bytes())
    }

    pub fn mode(&self) -> SegmentMode {
        self.mode
    }

    pub fn num_chars(&self) -> usize {
        self.num_chars
    }

    pub fn is_numeric(text: &str) -> bool {
        text.chars().all(|c| c.is_ascii_digit())
    }

    pub fn is_alphanumeric(text: &str) -> bool {
        text.chars().all(|c| ALPHANUMERIC_CHARSET.contains(c))
    }

    fn total_bits(segs: &[Segment], version: Version) -> Option<usize> {
        let mut result: usize = 0;
        for seg in segs {
            let ccbits = seg.mode.char_count_bits(version);
            if let Some(limit) = 1usize.checked_shl(ccbits.into()) {
                if seg.num_chars >= limit {
                    return None;
                }
            }
            result = result.checked_add(4 + usize::from(ccbits))?;
            result = result.checked_add(seg.data.len())?;
        }
        Some(result)
    }
}

/// An encoded QR symbol.
///
/// Coordinates are `(x, y)` with the origin at the top-left module. Reads outside the symbol
/// return light.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QrMatrix {
    size: i32,
    version: Version,
    ecc: ErrorCorrection,
    mask: Mask,
    modules: Vec<bool>,
    function: Vec<bool>,
}

impl QrMatrix {
    /// Encodes text at the smallest version that fits, boosting the error correction level when
    /// that does not grow the symbol.
    pub fn encode_text(text: &str, ecc: ErrorCorrection) -> Result<Self, EncodeError> {
        let segs: Vec<Segment> = if text.is_empty() {
            Vec::new()
        } else {
            vec![Segment::make_text(text)]
        };
        Self::encode_segments(&segs, ecc, Version::MIN, Version::MAX, None, true)
    }

    pub fn encode_binary(data: &[u8], ecc: ErrorCorrection) -> Result<Self, EncodeError> {
        let seg = Segment::make_bytes(data);
        Self::encode_segments(&[seg], ecc, Version::MIN, Version::MAX, None, true)
    }

    /// Encodes segments into a symbol.
    ///
    /// The smallest version within `min..=max` that holds the data is chosen. A `mask` of `None`
    /// selects the pattern with the lowest penalty score.
    pub fn encode_segments(
        segs: &[Segment],
        mut ecc: ErrorCorrection,
        min: Version,
        max: Version,
        mask: Option<Mask>,
        boost_ecc: bool,
    ) -> Result<Self, EncodeError> {
        if min > max {
            return Err(EncodeError::InvalidVersionRange { min: min.value(), max: max.value() });
        }

        let mut version = min;
        let used_bits = loop {
            let capacity = num_data_codewords(version, ecc) * 8;
            let used = Segment::total_bits(segs, version);
            match used {
                Some(n) if n <= capacity => break n,
                _ if version >= max => {
                    return Err(match used {
                        None => EncodeError::SegmentTooLong,
                        Some(bits) => EncodeError::DataTooLong { bits, capacity },
                    });
                }
                _ => version = Version::new(version.value() + 1),
            }
        };

        if boost_ecc {
            let stronger = [
                ErrorCorrection::Medium,
                ErrorCorrection::Quartile,
                ErrorCorrection::High,
            ];
            for candidate in stronger {
                if candidate > ecc && used_bits <= num_data_codewords(version, candidate) * 8 {
                    ecc = candidate;
                }
            }
        }

        let capacity = num_data_codewords(version, ecc) * 8;
        let mut bb = BitBuffer::default();
        for seg in segs {
            bb.append_bits(seg.mode.mode_bits(), 4);
            bb.append_bits(seg.num_chars as u32, seg.mode.char_count_bits(version));
            bb.0.extend_from_slice(&seg.data.0);
        }
        debug_assert_eq!(bb.len(), used_bits);

        // Terminator, then pad to a byte boundary.
        let terminator = (capacity - bb.len()).min(4);
        bb.append_bits(0, terminator as u8);
        let padding = bb.len().wrapping_neg() & 7;
        bb.append_bits(0, padding as u8);

        for &pad in [0xEC, 0x11].iter().cycle() {
            if bb.len() >= capacity {
                break;
            }
            bb.append_bits(pad, 8);
        }

        let codewords: Vec<u8> = bb
            .0
            .chunks(8)
            .map(|byte| byte.iter().fold(0u8, |acc, &bit| (acc << 1) | u8::from(bit)))
            .collect();
        Ok(Self::from_codewords(version, ecc, &codewords, mask))
    }

    fn from_codewords(
        version: Version,
        ecc: ErrorCorrection,
        data: &[u8],
        mask: Option<Mask>,
    ) -> Self {
        let size = version.side();
        let area = (size * size) as usize;
        let mut matrix = QrMatrix {
            size,
            version,
            ecc,
            mask: Mask(0),
            modules: vec![false; area],
            function: vec![false; area],
        };
        matrix.draw_function_patterns();
        let all = add_ecc_and_interleave(data, version, ecc);
        matrix.draw_codewords(&all);

        let mask = mask.unwrap_or_else(|| {
            let mut best = Mask(0);
            let mut min_penalty = i32::MAX;
            for candidate in (0..8).map(Mask) {
                matrix.apply_mask(candidate);
                matrix.draw_format_bits(candidate);
                let penalty = matrix.penalty_score();
                if penalty < min_penalty {
                    best = candidate;
                    min_penalty = penalty;
                }
                // XOR undoes the mask
                matrix.apply_mask(candidate);
            }
            best
        });
        matrix.apply_mask(mask);
        matrix.draw_format_bits(mask);
        matrix.mask = mask;
        matrix
    }

    /// Width and height in modules, between 21 and 177.
    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn error_correction(&self) -> ErrorCorrection {
        self.ecc
    }

    pub fn mask(&self) -> Mask {
        self.mask
    }

    /// `true` for dark modules.
    pub fn is_dark(&self, x: i32, y: i32) -> bool {
        self.index(x, y).map_or(false, |i| self.modules[i])
    }

    /// `true` when the module belongs to one of the three 7x7 finder patterns.
    pub fn is_finder(&self, x: i32, y: i32) -> bool {
        self.finder_origins()
            .iter()
            .any(|&(fx, fy)| (fx..fx + 7).contains(&x) && (fy..fy + 7).contains(&y))
    }

    /// Top-left corners of the finder patterns: top-left, top-right, bottom-left.
    pub fn finder_origins(&self) -> [(i32, i32); 3] {
        [(0, 0), (self.size - 7, 0), (0, self.size - 7)]
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let range = 0..self.size;
        (range.contains(&x) && range.contains(&y)).then(|| (y * self.size + x) as usize)
    }

    fn set_function_module(&mut self, x: i32, y: i32, dark: bool) {
        if let Some(i) = self.index(x, y) {
            self.modules[i] = dark;
            self.function[i] = true;
        }
    }

    fn draw_function_patterns(&mut self) {
        let size = self.size;
        for i in 0..size {
            self.set_function_module(6, i, i % 2 == 0);
            self.set_function_module(i, 6, i % 2 == 0);
        }

        self.draw_finder_pattern(3, 3);
        self.draw_finder_pattern(size - 4, 3);
        self.draw_finder_pattern(3, size - 4);

        let positions = self.alignment_pattern_positions();
        let last = positions.len().saturating_sub(1);
        for (i, &px) in positions.iter().enumerate() {
            for (j, &py) in positions.iter().enumerate() {
                let overlaps_finder =
                    (i == 0 && j == 0) || (i == 0 && j == last) || (i == last && j == 0);
                if !overlaps_finder {
                    self.draw_alignment_pattern(px, py);
                }
            }
        }

        // Reserved now, overwritten once the mask is known.
        self.draw_format_bits(Mask(0));
        self.draw_version();
    }

    fn draw_finder_pattern(&mut self, x: i32, y: i32) {
        for dy in -4i32..=4 {
            for dx in -4i32..=4 {
                let dist = dx.abs().max(dy.abs());
                self.set_function_module(x + dx, y + dy, dist != 2 && dist != 4);
            }
        }
    }

    fn draw_alignment_pattern(&mut self, x: i32, y: i32) {
        for dy in -2i32..=2 {
            for dx in -2i32..=2 {
                self.set_function_module(x + dx, y + dy, dx.abs().max(dy.abs()) != 1);
            }
        }
    }

    fn draw_format_bits(&mut self, mask: Mask) {
        let bits = {
            let data = (self.ecc.format_bits() << 3) | u32::from(mask.value());
            let mut rem = data;
            for _ in 0..10 {
                rem = (rem << 1) ^ ((rem >> 9) * 0x537);
            }
            ((data << 10) | rem) ^ 0x5412
        };

        for i in 0..6 {
            self.set_function_module(8, i, get_bit(bits, i as u8));
        }
        self.set_function_module(8, 7, get_bit(bits, 6));
        self.set_function_module(8, 8, get_bit(bits, 7));
        self.set_function_module(7, 8, get_bit(bits, 8));
        for i in 9..15 {
            self.set_function_module(14 - i, 8, get_bit(bits, i as u8));
        }

        let size = self.size;
        for i in 0..8 {
            self.set_function_module(size - 1 - i, 8, get_bit(bits, i as u8));
        }
        for i in 8..15 {
            self.set_function_module(8, size - 15 + i, get_bit(bits, i as u8));
        }
        self.set_function_module(8, size - 8, true);
    }

    fn draw_version(&mut self) {
        let ver = u32::from(self.version.value());
        if ver < 7 {
            return;
        }
        let bits = {
            let mut rem = ver;
            for _ in 0..12 {
                rem = (rem << 1) ^ ((rem >> 11) * 0x1F25);
            }
            (ver << 12) | rem
        };
        for i in 0u8..18 {
            let bit = get_bit(bits, i);
            let a = self.size - 11 + i32::from(i % 3);
            let b = i32::from(i / 3);
            self.set_function_module(a, b, bit);
            self.set_function_module(b, a, bit);
        }
    }

    fn draw_codewords(&mut self, data: &[u8]) {
        debug_assert_eq!(data.len(), num_raw_data_modules(self.version) / 8);
        let size = self.size;
        let total_bits = data.len() * 8;
        let mut i = 0usize;
        let mut right = size - 1;
        while right >= 1 {
            if right == 6 {
                right = 5;
            }
            for vert in 0..size {
                for j in 0..2 {
                    let x = right - j;
                    let upward = ((right + 1) & 2) == 0;
                    let y = if upward { size - 1 - vert } else { vert };
                    let idx = (y * size + x) as usize;
                    if !self.function[idx] && i < total_bits {
                        self.modules[idx] = get_bit(u32::from(data[i >> 3]), 7 - (i & 7) as u8);
                        i += 1;
                    }
                }
            }
            right -= 2;
        }
        debug_assert_eq!(i, total_bits);
    }

    fn apply_mask(&mut self, mask: Mask) {
        for y in 0..self.size {
            for x in 0..self.size {
                let idx = (y * self.size + x) as usize;
                if !self.function[idx] && mask.inverts(x, y) {
                    self.modules[idx] ^= true;
                }
            }
        }
    }

    fn penalty_score(&self) -> i32 {
        let size = self.size;
        let mut result = 0;

        for horizontal in [true, false] {
            for a in 0..size {
                let mut run_color = false;
                let mut run_len = 0;
                let mut history = FinderPenalty::new(size);
                for b in 0..size {
                    let color = if horizontal { self.is_dark(b, a) } else { self.is_dark(a, b) };
                    if color == run_color {
                        run_len += 1;
                        if run_len == 5 {
                            result += PENALTY_N1;
                        } else if run_len > 5 {
                            result += 1;
                        }
                    } else {
                        history.add_history(run_len);
                        if !run_color {
                            result += history.count_patterns() * PENALTY_N3;
                        }
                        run_color = color;
                        run_len = 1;
                    }
                }
                result += history.terminate_and_count(run_color, run_len) * PENALTY_N3;
            }
        }

        for y in 0..size - 1 {
            for x in 0..size - 1 {
                let color = self.is_dark(x, y);
                if color == self.is_dark(x + 1, y)
                    && color == self.is_dark(x, y + 1)
                    && color == self.is_dark(x + 1, y + 1)
                {
                    result += PENALTY_N2;
                }
            }
        }

        let dark = self.modules.iter().filter(|&&m| m).count() as i32;
        let total = size * size;
        let k = ((dark * 20 - total * 10).abs() + total - 1) / total - 1;
        result + k * PENALTY_N4
    }

    fn alignment_pattern_positions(&self) -> Vec<i32> {
        let ver = i32::from(self.version.value());
        if ver == 1 {
            return Vec::new();
        }
        let num_align = ver / 7 + 2;
        let step = if ver == 32 {
            26
        } else {
            (ver * 4 + num_align * 2 + 1) / (num_align * 2 - 2) * 2
        };
        let mut result: Vec<i32> = (0..num_align - 1).map(|i| self.size - 7 - i * step).collect();
        result.push(6);
        result.reverse();
        result
    }
}

fn add_ecc_and_interleave(data: &[u8], ver: Version, ecc: ErrorCorrection) -> Vec<u8> {
    debug_assert_eq!(data.len(), num_data_codewords(ver, ecc));
    let num_blocks = table_get(&NUM_ERROR_CORRECTION_BLOCKS, ver, ecc);
    let block_ecc_len = table_get(&ECC_CODEWORDS_PER_BLOCK, ver, ecc);
    let raw_codewords = num_raw_data_modules(ver) / 8;
    let num_short_blocks = num_blocks - raw_codewords % num_blocks;
    let short_block_len = raw_codewords / num_blocks;
    let short_data_len = short_block_len - block_ecc_len;

    let rs = ReedSolomonGenerator::new(block_ecc_len);
    let mut blocks: Vec<Vec<u8>> = Vec::with_capacity(num_blocks);
    let mut offset = 0;
    for i in 0..num_blocks {
        let len = short_data_len + usize::from(i >= num_short_blocks);
        let mut block = data[offset..offset + len].to_vec();
        offset += len;
        let remainder = rs.remainder(&block);
        if i < num_short_blocks {
            // placeholder keeps every block the same length; skipped below
            block.push(0);
        }
        block.extend_from_slice(&remainder);
        blocks.push(block);
    }

    let mut result = Vec::with_capacity(raw_codewords);
    for i in 0..=short_block_len {
        for (j, block) in blocks.iter().enumerate() {
            if i != short_data_len || j >= num_short_blocks {
                result.push(block[i]);
            }
        }
    }
    result
}

fn num_raw_data_modules(ver: Version) -> usize {
    let ver = usize::from(ver.value());
    let mut result = (16 * ver + 128) * ver + 64;
    if ver >= 2 {
        let num_align = ver / 7 + 2;
        result -= (25 * num_align - 10) * num_align - 55;
        if ver >= 7 {
            result -= 36;
        }
    }
    result
}

fn num_data_codewords(ver: Version, ecc: ErrorCorrection) -> usize {
    num_raw_data_modules(ver) / 8
        - table_get(&ECC_CODEWORDS_PER_BLOCK, ver, ecc)
            * table_get(&NUM_ERROR_CORRECTION_BLOCKS, ver, ecc)
}

fn table_get(table: &'static [[i8; 41]; 4], ver: Version, ecc: ErrorCorrection) -> usize {
    table[ecc.ordinal()][usize::from(ver.value())] as usize
}

struct ReedSolomonGenerator {
    divisor: Vec<u8>,
}

impl ReedSolomonGenerator {
    fn new(degree: usize) -> Self {
        debug_assert!((1..=30).contains(&degree), "Degree out of range");
        let mut divisor = vec![0u8; degree];
        divisor[degree - 1] = 1;
        let mut root: u8 = 1;
        for _ in 0..degree {
            for j in 0..degree {
                divisor[j] = Self::multiply(divisor[j], root);
                if j + 1 < degree {
                    divisor[j] ^= divisor[j + 1];
                }
            }
            root = Self::multiply(root, 0x02);
        }
        Self { divisor }
    }

    fn remainder(&self, data: &[u8]) -> Vec<u8> {
        let mut result = vec![0u8; self.divisor.len()];
        for &b in data {
            let factor = b ^ result.remove(0);
            result.push(0);
            for (x, &y) in result.iter_mut().zip(&self.divisor) {
                *x ^= Self::multiply(y, factor);
            }
        }
        result
    }

    // GF(2^8) with modulus 0x11D
    fn multiply(x: u8, y: u8) -> u8 {
        let mut z: u8 = 0;
        for i in (0..8).rev() {
            z = (z << 1) ^ ((z >> 7) * 0x1D);
            z ^= ((y >> i) & 1) * x;
        }
        z
    }
}

struct FinderPenalty {
    qr_size: i32,
    run_history: [i32; 7],
}

impl FinderPenalty {
    fn new(size: i32) -> Self {
        Self { qr_size: size, run_history: [0; 7] }
    }

    fn add_history(&mut self, mut run_length: i32) {
        if self.run_history[0] == 0 {
            run_length += self.qr_size;
        }
        self.run_history.copy_within(0..6, 1);
        self.run_history[0] = run_length;
    }

    fn count_patterns(&self) -> i32 {
        let rh = &self.run_history;
        let n = rh[1];
        let core = n > 0 && rh[2] == n && rh[3] == n * 3 && rh[4] == n && rh[5] == n;
        i32::from(core && rh[0] >= n * 4 && rh[6] >= n)
            + i32::from(core && rh[6] >= n * 4 && rh[0] >= n)
    }

    fn terminate_and_count(mut self, run_color: bool, mut run_length: i32) -> i32 {
        if run_color {
            self.add_history(run_length);
            run_length = 0;
        }
        run_length += self.qr_size;
        self.add_history(run_length);
        self.count_patterns()
    }
}

const PENALTY_N1: i32 = 3;
const PENALTY_N2: i32 = 3;
const PENALTY_N3: i32 = 40;
const PENALTY_N4: i32 = 10;

static ECC_CODEWORDS_PER_BLOCK: [[i8; 41]; 4] = [
    [
        -1, 7, 10, 15, 20, 26, 18, 20, 24, 30, 18, 20, 24, 26, 30, 22, 24, 28, 30, 28, 28, 28, 28,
        30, 30, 26, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // Low
    [
        -1, 10, 16, 26, 18, 24, 16, 18, 22, 22, 26, 30, 22, 22, 24, 24, 28, 28, 26, 26, 26, 26, 28,
        28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28,
    ], // Medium
    [
        -1, 13, 22, 18, 26, 18, 24, 18, 22, 20, 24, 28, 26, 24, 20, 30, 24, 28, 28, 26, 30, 28, 30,
        30, 30, 30, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // Quartile
    [
        -1, 17, 28, 22, 16, 22, 28, 26, 26, 24, 28, 24, 28, 22, 24, 24, 30, 28, 28, 26, 28, 30, 24,
        30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // High
];

static NUM_ERROR_CORRECTION_BLOCKS: [[i8; 41]; 4] = [
    [
        -1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 4, 4, 4, 4, 4, 6, 6, 6, 6, 7, 8, 8, 9, 9, 10, 12, 12, 12, 13,
        14, 15, 16, 17, 18, 19, 19, 20, 21, 22, 24, 25,
    ], // Low
    [
        -1, 1, 1, 1, 2, 2, 4, 4, 4, 5, 5, 5, 8, 9, 9, 10, 10, 11, 13, 14, 16, 17, 17, 18, 20, 21,
        23, 25, 26, 28, 29, 31, 33, 35, 37, 38, 40, 43, 45, 47, 49,
    ], // Medium
    [
        -1, 1, 1, 2, 2, 4, 4, 6, 6, 8, 8, 8, 10, 12, 16, 12, 17, 16, 18, 21, 20, 23, 23, 25, 27, 29,
        34, 34, 35, 38, 40, 43, 45, 48, 51, 53, 56, 59, 62, 65, 68,
    ], // Quartile
    [
        -1, 1, 1, 2, 4, 4, 4, 5, 6, 8, 8, 11, 11, 16, 16, 18, 16, 19, 21, 25, 25, 25, 34, 30, 32,
        35, 37, 40, 42, 45, 48, 51, 54, 57, 60, 63, 66, 70, 74, 77, 81,
    ], // High
];

fn get_bit(x: u32, i: u8) -> bool {
    ((x >> i) & 1) != 0
}
