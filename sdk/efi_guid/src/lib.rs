//! GUID codec for EDK2 variable stores
//!
//! Types for converting 128-bit UEFI identifiers between their canonical string form and the little-endian binary
//! layout used inside firmware volumes, variable records and device path nodes.
//!
//! ## Type Overview
//!
//! - [`Guid`] - An immutable, `Copy` GUID value wrapping [`r_efi::efi::Guid`]
//! - [`GuidError`] - Error type for GUID parsing and decoding
//! - [`KnownGuids`] - An immutable registry of the well-known GUIDs the variable store recognizes
//!
//! ## Examples
//!
//! ```rust
//! use efi_guid::{Guid, GuidError, KnownGuids, WellKnown};
//!
//! let guid = Guid::try_from_string("{8BE4DF61-93CA-11D2-AA0D-00E098032B8C}")?;
//! assert_eq!(guid.to_string(), "8be4df61-93ca-11d2-aa0d-00e098032b8c");
//!
//! let known = KnownGuids::standard();
//! assert_eq!(known.get(WellKnown::GlobalVariable), guid);
//! assert_eq!(known.name_of(&guid), Some("EfiGlobalVariable"));
//!
//! let bytes = guid.encode();
//! assert_eq!(Guid::decode(&bytes, 0)?, guid);
//! # Ok::<(), GuidError>(())
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod known;

pub use known::{
    AUTHENTICATED_VARIABLE, EFI_GLOBAL_VARIABLE, FIRMWARE_FILE_SYSTEM, IMAGE_SECURITY_DATABASE, KnownGuids, MICROSOFT,
    NV_DATA_FV, WellKnown,
};

use core::{cmp::Ordering, fmt, hash, str::FromStr};
use r_efi::efi;

/// The expected number of hexadecimal characters in a valid GUID string representation
const EXPECTED_HEX_CHARS: usize = 32;

/// Size in bytes of a binary GUID.
pub const GUID_SIZE: usize = 16;

/// Error type for GUID parsing operations
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum GuidError {
    /// The provided string does not contain exactly 32 hexadecimal characters
    InvalidLength {
        /// Expected number of hex characters
        expected: usize,
        /// Actual number of hex characters found
        actual: usize,
    },
    /// The provided string contains invalid hexadecimal characters
    InvalidHexCharacter {
        /// Position of the invalid character in the string (1 based)
        position: usize,
        /// The invalid character that was found
        character: char,
    },
    /// Fewer than 16 bytes remain at the requested offset
    Truncated {
        /// Offset the GUID was to be read from
        offset: usize,
        /// Length of the buffer
        len: usize,
    },
}

impl fmt::Display for GuidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuidError::InvalidLength { expected, actual } => {
                write!(f, "Invalid GUID length: expected {expected} hex characters, found {actual}")
            }
            GuidError::InvalidHexCharacter { position, character } => {
                write!(f, "Invalid hex character '{character}' at position {position}")
            }
            GuidError::Truncated { offset, len } => {
                write!(f, "Truncated GUID at offset {offset:#x}: buffer is only {len:#x} bytes")
            }
        }
    }
}

impl core::error::Error for GuidError {}

/// A 128-bit UEFI GUID.
///
/// The value is stored as an [`efi::Guid`], so [`Guid::encode`] is simply the in-memory layout: the first three
/// fields little-endian, the trailing eight bytes verbatim.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Guid(efi::Guid);

impl Guid {
    /// The all-zero GUID.
    pub const ZERO: Guid = Guid::from_fields(0, 0, 0, [0; 8]);

    /// Create a GUID from its four canonical fields.
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Guid(efi::Guid::from_fields(
            data1,
            data2,
            data3,
            data4[0],
            data4[1],
            &[data4[2], data4[3], data4[4], data4[5], data4[6], data4[7]],
        ))
    }

    /// Create a GUID from its 16-byte little-endian binary layout.
    pub const fn from_bytes(bytes: &[u8; GUID_SIZE]) -> Self {
        Guid(efi::Guid::from_bytes(bytes))
    }

    /// Returns the four canonical fields `(data1, data2, data3, data4)`.
    pub fn fields(&self) -> (u32, u16, u16, [u8; 8]) {
        let (data1, data2, data3, hi, lo, node) = self.0.as_fields();
        let mut data4 = [0u8; 8];
        data4[0] = hi;
        data4[1] = lo;
        data4[2..].copy_from_slice(node);
        (data1, data2, data3, data4)
    }

    /// Reads a GUID from `bytes` at `offset`.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<Self, GuidError> {
        let raw = offset
            .checked_add(GUID_SIZE)
            .and_then(|end| bytes.get(offset..end))
            .ok_or(GuidError::Truncated { offset, len: bytes.len() })?;
        let mut buffer = [0u8; GUID_SIZE];
        buffer.copy_from_slice(raw);
        Ok(Self::from_bytes(&buffer))
    }

    /// Returns the 16-byte little-endian binary layout.
    pub fn encode(&self) -> [u8; GUID_SIZE] {
        *self.0.as_bytes()
    }

    /// Returns a reference to the underlying [`efi::Guid`].
    pub const fn as_efi_guid(&self) -> &efi::Guid {
        &self.0
    }

    /// Parses a GUID from text.
    ///
    /// Braces, hyphens and whitespace are ignored, and exactly 32 hex digits (either case) must remain.
    pub fn try_from_string(s: &str) -> Result<Self, GuidError> {
        let mut digits = [0u8; EXPECTED_HEX_CHARS];
        let mut count = 0;

        for (index, c) in s.chars().enumerate() {
            if matches!(c, '{' | '}' | '-') || c.is_ascii_whitespace() {
                continue;
            }
            let Some(value) = c.to_digit(16) else {
                return Err(GuidError::InvalidHexCharacter { position: index + 1, character: c });
            };
            if count == EXPECTED_HEX_CHARS {
                return Err(GuidError::InvalidLength { expected: EXPECTED_HEX_CHARS, actual: count + 1 });
            }
            digits[count] = value as u8;
            count += 1;
        }

        if count != EXPECTED_HEX_CHARS {
            return Err(GuidError::InvalidLength { expected: EXPECTED_HEX_CHARS, actual: count });
        }

        let fold = |range: core::ops::Range<usize>| digits[range].iter().fold(0u32, |acc, d| (acc << 4) | *d as u32);

        let mut data4 = [0u8; 8];
        for (i, byte) in data4.iter_mut().enumerate() {
            let at = 16 + i * 2;
            *byte = fold(at..at + 2) as u8;
        }

        Ok(Self::from_fields(fold(0..8), fold(8..12) as u16, fold(12..16) as u16, data4))
    }
}

impl Default for Guid {
    fn default() -> Self {
        Guid::ZERO
    }
}

impl hash::Hash for Guid {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.0.as_bytes().hash(state);
    }
}

impl PartialOrd for Guid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Guid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (data1, data2, data3, d) = self.fields();
        write!(
            f,
            "{data1:08x}-{data2:04x}-{data3:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

impl FromStr for Guid {
    type Err = GuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Guid::try_from_string(s)
    }
}

impl TryFrom<&str> for Guid {
    type Error = GuidError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Guid::try_from_string(value)
    }
}

impl From<efi::Guid> for Guid {
    fn from(guid: efi::Guid) -> Self {
        Guid(guid)
    }
}

impl From<Guid> for efi::Guid {
    fn from(guid: Guid) -> Self {
        guid.0
    }
}

impl PartialEq<efi::Guid> for Guid {
    fn eq(&self, other: &efi::Guid) -> bool {
        self.0.as_bytes() == other.as_bytes()
    }
}
