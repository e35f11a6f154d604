//! Request masks and the field layouts they select
//!
//! A mask is a fixed-width big-endian bitset sent as uppercase hex. Each set
//! bit asks the server for one more `|`-separated field in the reply, in
//! byte order and, within a byte, from bit 7 down to bit 0.

pub mod tables;
pub mod walker;

pub use tables::{
    ANIME_AMASK, AnimeField, EpisodeField, FILE_AMASK, FILE_FMASK, FileAnimeField,
    FileAnimeTarget, FileField, MaskLayout, Slot,
};
pub use walker::{demanded_tokens, split_fields, walk};

use crate::error::ValidationError;
use std::fmt;

/// Widest mask any command uses (ANIME amask is 7 bytes)
pub const MAX_MASK_BYTES: usize = 8;

/// Fixed-width request mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mask {
    bytes: [u8; MAX_MASK_BYTES],
    width: usize,
}

impl Mask {
    /// All-zero mask of `width` bytes
    pub const fn new(width: usize) -> Self {
        let width = if width > MAX_MASK_BYTES {
            MAX_MASK_BYTES
        } else {
            width
        };
        Self {
            bytes: [0; MAX_MASK_BYTES],
            width,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        if bytes.len() > MAX_MASK_BYTES {
            return Err(ValidationError::invalid_mask(
                &format!("{bytes:02X?}"),
                MAX_MASK_BYTES,
            ));
        }
        let mut mask = Self::new(bytes.len());
        mask.bytes[..bytes.len()].copy_from_slice(bytes);
        Ok(mask)
    }

    /// Parse hex text; short input is padded with trailing zero bytes
    ///
    /// `"FC"` read as a 7-byte mask is `FC000000000000`: the digits given
    /// always describe the leading bytes.
    pub fn from_hex(hex: &str, width: usize) -> Result<Self, ValidationError> {
        let hex = hex.trim();
        let invalid = || ValidationError::invalid_mask(hex, width);

        if width > MAX_MASK_BYTES || hex.len() > width * 2 || !hex.is_ascii() {
            return Err(invalid());
        }

        let mut mask = Self::new(width);
        for (index, pair) in hex.as_bytes().chunks(2).enumerate() {
            let text = std::str::from_utf8(pair).map_err(|_| invalid())?;
            // A lone trailing digit is the high nibble: "F" means "F0"
            let value = if text.len() == 1 {
                u8::from_str_radix(text, 16).map_err(|_| invalid())? << 4
            } else {
                u8::from_str_radix(text, 16).map_err(|_| invalid())?
            };
            mask.bytes[index] = value;
        }
        Ok(mask)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.width]
    }

    /// `byte` counts from the most significant byte, `bit` is 7..=0
    pub fn is_set(&self, byte: usize, bit: u8) -> bool {
        byte < self.width && bit < 8 && self.bytes[byte] & (1 << bit) != 0
    }

    pub fn set(&mut self, byte: usize, bit: u8) {
        if byte < self.width && bit < 8 {
            self.bytes[byte] |= 1 << bit;
        }
    }

    pub fn clear(&mut self, byte: usize, bit: u8) {
        if byte < self.width && bit < 8 {
            self.bytes[byte] &= !(1 << bit);
        }
    }

    pub fn popcount(&self) -> usize {
        self.bytes().iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().iter().all(|b| *b == 0)
    }

    /// Set bits in wire order as `(byte, bit)` pairs
    pub fn set_bits(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        (0..self.width).flat_map(move |byte| {
            (0..8u8)
                .rev()
                .filter(move |bit| self.is_set(byte, *bit))
                .map(move |bit| (byte, bit))
        })
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.bytes() {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}
