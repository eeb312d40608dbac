//! SLIP-39 share codec
//!
//! Lossless mapping between (metadata, encrypted secret) and the
//! checksummed word sequence. Wire layout:
//!
//! ```text
//! word 0   identifier[14:5]
//! word 1   identifier[4:0] ‖ extendable ‖ iteration exponent (4)
//! word 2   group index (4) ‖ group threshold − 1 (4) ‖ (group count − 1)[3:2]
//! word 3   (group count − 1)[1:0] ‖ member index (4) ‖ member threshold − 1 (4)
//! ...      share value, base 1024, most significant digit first,
//!          zero-padded at the high end to a 10-bit boundary
//! last 3   RS1024 checksum over customization ‖ all preceding words
//! ```
//!
//! A 16-byte secret yields 20 words, a 32-byte secret 33 words; no
//! other shapes exist on the wire.

use crate::rs1024;
use crate::wordlist::{index_to_word, word_to_index};
use crate::Slip39Error;

/// Words in a 128-bit share.
pub const SHORT_MNEMONIC_WORDS: usize = 20;
/// Words in a 256-bit share.
pub const LONG_MNEMONIC_WORDS: usize = 33;

const METADATA_WORDS: usize = 4;
const CHECKSUM_WORDS: usize = 3;

/// Decoded share header.
///
/// The full multi-group SLIP-39 header is representable; this wallet
/// only ever emits (and accepts) the single 1-of-1 shape, see
/// [`ShareMetadata::is_single_share`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareMetadata {
    /// Random 15-bit share set identifier.
    pub identifier: u16,
    /// Extendable backup flag; selects the checksum customization and
    /// drops the identifier from the cipher salt.
    pub extendable: bool,
    /// PBKDF2 work factor exponent (0-15).
    pub iteration_exponent: u8,
    pub group_index: u8,
    pub group_threshold: u8,
    pub group_count: u8,
    pub member_index: u8,
    pub member_threshold: u8,
}

impl ShareMetadata {
    /// Header for a fresh single-share (1 group, 1-of-1) backup.
    pub fn single_share(identifier: u16) -> Self {
        Self {
            identifier: identifier & 0x7FFF,
            extendable: false,
            iteration_exponent: 0,
            group_index: 0,
            group_threshold: 1,
            group_count: 1,
            member_index: 0,
            member_threshold: 1,
        }
    }

    /// Whether this header describes the only supported shape.
    pub fn is_single_share(&self) -> bool {
        self.group_count == 1
            && self.group_threshold == 1
            && self.member_threshold == 1
            && self.group_index == 0
            && self.member_index == 0
    }

    fn pack(&self) -> [u16; METADATA_WORDS] {
        let id = self.identifier & 0x7FFF;
        let gt = u16::from(self.group_threshold - 1);
        let gc = u16::from(self.group_count - 1);
        let mt = u16::from(self.member_threshold - 1);
        [
            id >> 5,
            ((id & 0x1F) << 5)
                | (u16::from(self.extendable) << 4)
                | u16::from(self.iteration_exponent & 0xF),
            (u16::from(self.group_index) << 6) | (gt << 2) | (gc >> 2),
            ((gc & 0x3) << 8) | (u16::from(self.member_index) << 4) | mt,
        ]
    }

    fn unpack(words: &[u16]) -> Self {
        let (w0, w1, w2, w3) = (words[0], words[1], words[2], words[3]);
        Self {
            identifier: (w0 << 5) | (w1 >> 5),
            extendable: (w1 >> 4) & 1 == 1,
            iteration_exponent: (w1 & 0xF) as u8,
            group_index: (w2 >> 6) as u8,
            group_threshold: ((w2 >> 2) & 0xF) as u8 + 1,
            group_count: (((w2 & 0x3) << 2) | (w3 >> 8)) as u8 + 1,
            member_index: ((w3 >> 4) & 0xF) as u8,
            member_threshold: (w3 & 0xF) as u8 + 1,
        }
    }
}

/// Re-express the secret in base 1024, most significant digit first,
/// zero-padding the high end to a whole number of 10-bit digits.
fn value_words(secret: &[u8]) -> Vec<u16> {
    let word_count = (8 * secret.len() + 9) / 10;
    let pad_bits = 10 * word_count - 8 * secret.len();

    let mut words = Vec::with_capacity(word_count);
    let mut acc: u32 = 0;
    let mut acc_bits = pad_bits; // leading zero padding
    for &byte in secret {
        acc = (acc << 8) | u32::from(byte);
        acc_bits += 8;
        while acc_bits >= 10 {
            acc_bits -= 10;
            words.push(((acc >> acc_bits) & 0x3FF) as u16);
            acc &= (1 << acc_bits) - 1;
        }
    }
    debug_assert_eq!(acc_bits, 0);
    words
}

/// Reassemble the secret bytes, rejecting nonzero padding bits.
fn value_bytes(words: &[u16]) -> Result<Vec<u8>, Slip39Error> {
    let total_bits = 10 * words.len();
    let pad_bits = total_bits % 16;
    let byte_len = (total_bits - pad_bits) / 8;

    // Padding occupies the most significant bits of the first digit and
    // must be zero by construction.
    if pad_bits > 0 && words[0] >> (10 - pad_bits) != 0 {
        return Err(Slip39Error::InvalidPadding);
    }

    let mut bytes = Vec::with_capacity(byte_len);
    let mut acc: u32 = 0;
    let mut acc_bits = 0usize;
    for (i, &word) in words.iter().enumerate() {
        let bits = if i == 0 { 10 - pad_bits } else { 10 };
        acc = (acc << bits) | (u32::from(word) & ((1u32 << bits) - 1));
        acc_bits += bits;
        while acc_bits >= 8 {
            acc_bits -= 8;
            bytes.push((acc >> acc_bits) as u8);
            acc &= (1 << acc_bits) - 1;
        }
    }
    debug_assert_eq!(bytes.len(), byte_len);
    Ok(bytes)
}

/// Encode a header and encrypted secret into mnemonic words.
pub fn encode(metadata: &ShareMetadata, encrypted_secret: &[u8]) -> Vec<&'static str> {
    let mut data: Vec<u16> = metadata.pack().to_vec();
    data.extend(value_words(encrypted_secret));

    let cs = rs1024::customization(metadata.extendable);
    let checksum = rs1024::create_checksum(cs, &data);
    data.extend_from_slice(&checksum);

    data.into_iter()
        .map(|i| index_to_word(i).expect("10-bit index is always in the table"))
        .collect()
}

/// Convert words to their table indices, surfacing the first unknown.
fn word_indices(words: &[&str]) -> Result<Vec<u16>, Slip39Error> {
    words
        .iter()
        .map(|w| word_to_index(w).ok_or_else(|| Slip39Error::InvalidWord((*w).to_string())))
        .collect()
}

/// Decode mnemonic words into the header and encrypted secret.
pub fn decode(words: &[&str]) -> Result<(ShareMetadata, Vec<u8>), Slip39Error> {
    if words.len() != SHORT_MNEMONIC_WORDS && words.len() != LONG_MNEMONIC_WORDS {
        return Err(Slip39Error::InvalidMnemonicLength(words.len()));
    }
    let indices = word_indices(words)?;

    let extendable = (indices[1] >> 4) & 1 == 1;
    if !rs1024::verify_checksum(rs1024::customization(extendable), &indices) {
        return Err(Slip39Error::ChecksumMismatch);
    }

    let metadata = ShareMetadata::unpack(&indices[..METADATA_WORDS]);
    let value = value_bytes(&indices[METADATA_WORDS..indices.len() - CHECKSUM_WORDS])?;
    Ok((metadata, value))
}

/// Recompute the checksum over the full word sequence.
///
/// The extendable flag is read from word 1 to pick the customization
/// string, mirroring what `decode` does.
pub fn verify_checksum(words: &[&str]) -> Result<bool, Slip39Error> {
    if words.len() != SHORT_MNEMONIC_WORDS && words.len() != LONG_MNEMONIC_WORDS {
        return Err(Slip39Error::InvalidMnemonicLength(words.len()));
    }
    let indices = word_indices(words)?;
    let extendable = (indices[1] >> 4) & 1 == 1;
    Ok(rs1024::verify_checksum(
        rs1024::customization(extendable),
        &indices,
    ))
}
