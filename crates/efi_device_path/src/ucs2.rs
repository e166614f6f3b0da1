//! UCS-2 text helpers.
//!
//! Variable names, load option descriptions and file path nodes all store text as little-endian UTF-16 code units
//! followed by a null terminator.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::{string::String, vec::Vec};
use core::char;

/// Encodes `text` as little-endian UTF-16 with a trailing null code unit.
pub fn encode(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(encoded_len(text));
    for unit in text.encode_utf16().chain(core::iter::once(0)) {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

/// Number of bytes [`encode`] produces for `text`, terminator included.
pub fn encoded_len(text: &str) -> usize {
    (text.encode_utf16().count() + 1) * 2
}

/// Decodes little-endian UTF-16 up to the first null code unit or the end of `bytes`.
///
/// A trailing odd byte is ignored and unpaired surrogates become U+FFFD.
pub fn decode(bytes: &[u8]) -> String {
    let units = bytes.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).take_while(|unit| *unit != 0);
    char::decode_utf16(units).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)).collect()
}

/// Byte length of the null-terminated string at the start of `bytes`, terminator included.
///
/// Returns `None` if no terminator is present.
pub fn terminated_len(bytes: &[u8]) -> Option<usize> {
    bytes.chunks_exact(2).position(|pair| pair == [0, 0]).map(|index| (index + 1) * 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_appends_terminator() {
        assert_eq!(encode("Boot"), [b'B', 0, b'o', 0, b'o', 0, b't', 0, 0, 0]);
        assert_eq!(encode(""), [0, 0]);
        assert_eq!(encoded_len("BootOrder"), 20);
    }

    #[test]
    fn decode_stops_at_terminator() {
        assert_eq!(decode(&[b'A', 0, b'B', 0, 0, 0, b'C', 0]), "AB");
        assert_eq!(decode(&[b'A', 0, b'B']), "A");
        assert_eq!(decode(&[]), "");
    }

    #[test]
    fn non_ascii_survives_round_trip() {
        let text = "\\EFI\\Bööt\\grubaa64.efi";
        assert_eq!(decode(&encode(text)), text);
    }

    #[test]
    fn terminated_len_counts_terminator() {
        assert_eq!(terminated_len(&[b'x', 0, 0, 0, 0xAA, 0xBB]), Some(4));
        assert_eq!(terminated_len(&[b'x', 0, b'y', 0]), None);
    }
}
