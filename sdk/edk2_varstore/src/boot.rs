//! Boot option (`EFI_LOAD_OPTION`) codec and `Boot####` naming.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::{format, string::String, vec, vec::Vec};
use core::fmt::{self, Display};

use efi_device_path::{DevicePath, ucs2};
use scroll::{Pread, Pwrite};

use crate::err::VarStoreError;

/// The firmware may boot this option.
pub const LOAD_OPTION_ACTIVE: u32 = 0x0000_0001;

/// Name of the variable holding the boot order.
pub const BOOT_ORDER: &str = "BootOrder";

const BOOT_PREFIX: &str = "Boot";
const FIXED_HEADER_SIZE: usize = 6;

/// Name of the variable holding boot option `id`, e.g. `Boot000A`.
pub fn boot_variable_name(id: u16) -> String {
    format!("{BOOT_PREFIX}{id:04X}")
}

/// Boot option id encoded in `name`.
///
/// Only `Boot` followed by exactly four hex digits is accepted, so `BootOrder`, `BootNext` and `Boot12345` are not
/// boot options.
pub fn parse_boot_variable_name(name: &str) -> Option<u16> {
    let suffix = name.strip_prefix(BOOT_PREFIX)?;
    if suffix.len() != 4 || !suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(suffix, 16).ok()
}

/// A decoded `Boot####` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEntry {
    /// Load option attributes, see [`LOAD_OPTION_ACTIVE`].
    pub attr: u32,
    /// Human readable title.
    pub description: String,
    /// Where the firmware finds the image to boot.
    pub device_path: DevicePath,
    /// Opaque bytes passed to the loaded image.
    pub optional_data: Vec<u8>,
}

impl BootEntry {
    /// Builds an entry from its parts.
    pub fn new(attr: u32, description: impl Into<String>, device_path: DevicePath, optional_data: Vec<u8>) -> Self {
        Self { attr, description: description.into(), device_path, optional_data }
    }

    /// True if [`LOAD_OPTION_ACTIVE`] is set.
    pub fn is_active(&self) -> bool {
        self.attr & LOAD_OPTION_ACTIVE != 0
    }

    /// Sets or clears [`LOAD_OPTION_ACTIVE`], leaving the other attribute bits alone.
    pub fn set_active(&mut self, active: bool) {
        if active {
            self.attr |= LOAD_OPTION_ACTIVE;
        } else {
            self.attr &= !LOAD_OPTION_ACTIVE;
        }
    }

    /// Decodes an `EFI_LOAD_OPTION`.
    pub fn decode(bytes: &[u8]) -> Result<Self, VarStoreError> {
        let mut offset = 0;
        let attr: u32 = bytes.gread_with(&mut offset, scroll::LE)?;
        let path_len = bytes.gread_with::<u16>(&mut offset, scroll::LE)? as usize;

        let description_len = ucs2::terminated_len(&bytes[offset..])
            .ok_or(VarStoreError::Malformed("unterminated boot option description"))?;
        let description = ucs2::decode(&bytes[offset..offset + description_len]);
        offset += description_len;

        let path = bytes
            .get(offset..offset + path_len)
            .ok_or(VarStoreError::Malformed("boot option device path runs past the payload"))?;
        offset += path_len;

        Ok(Self { attr, description, device_path: DevicePath::decode(path), optional_data: bytes[offset..].to_vec() })
    }

    /// Encodes the entry as an `EFI_LOAD_OPTION`.
    pub fn encode(&self) -> Result<Vec<u8>, VarStoreError> {
        let description = ucs2::encode(&self.description);
        let path = self.device_path.encode()?;
        let path_len =
            u16::try_from(path.len()).map_err(|_| VarStoreError::Malformed("boot option device path too long"))?;

        let mut bytes = vec![0u8; FIXED_HEADER_SIZE + description.len() + path.len() + self.optional_data.len()];
        let mut offset = 0;
        bytes.gwrite_with(self.attr, &mut offset, scroll::LE)?;
        bytes.gwrite_with(path_len, &mut offset, scroll::LE)?;
        bytes.gwrite_with(description.as_slice(), &mut offset, ())?;
        bytes.gwrite_with(path.as_slice(), &mut offset, ())?;
        bytes.gwrite_with(self.optional_data.as_slice(), &mut offset, ())?;
        Ok(bytes)
    }
}

impl Display for BootEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "title=\"{}\" devpath={}", self.description, self.device_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use efi_guid::Guid;
    use std::error::Error;

    // Load option captured from a Raspberry Pi 4 firmware image.
    const SD_CARD_OPTION: &str = "010000001800530044002f004d004d00430020006f006e002000410072006100730061006e002000530044004800430049000000010414\
                                  00fa2c0c1086b598419b4c1683d195b1da7fff04004eac0881119f594d850ee21a522c59b2";

    fn hex(text: &str) -> Vec<u8> {
        (0..text.len()).step_by(2).map(|i| u8::from_str_radix(&text[i..i + 2], 16).unwrap()).collect()
    }

    #[test]
    fn boot_names() {
        assert_eq!(boot_variable_name(0), "Boot0000");
        assert_eq!(boot_variable_name(0x1a), "Boot001A");
        assert_eq!(parse_boot_variable_name("Boot001A"), Some(0x1a));
        assert_eq!(parse_boot_variable_name("Boot001a"), Some(0x1a));
        assert_eq!(parse_boot_variable_name("BootOrder"), None);
        assert_eq!(parse_boot_variable_name("BootNext"), None);
        assert_eq!(parse_boot_variable_name("Boot12345"), None);
        assert_eq!(parse_boot_variable_name("Boot12"), None);
        assert_eq!(parse_boot_variable_name("Boot+123"), None);
        assert_eq!(parse_boot_variable_name("Driver0001"), None);
    }

    #[test]
    fn decodes_firmware_load_option() -> Result<(), Box<dyn Error>> {
        let bytes = hex(SD_CARD_OPTION);
        let entry = BootEntry::decode(&bytes)?;

        assert_eq!(entry.attr, LOAD_OPTION_ACTIVE);
        assert!(entry.is_active());
        assert_eq!(entry.description, "SD/MMC on Arasan SDHCI");
        assert_eq!(entry.device_path.to_string(), "VendorHW(100c2cfa-b586-4198-9b4c-1683d195b1da)");
        assert_eq!(Guid::decode(&entry.optional_data, 0)?.to_string(), "8108ac4e-9f11-4d59-850e-e21a522c59b2");
        assert_eq!(
            entry.to_string(),
            "title=\"SD/MMC on Arasan SDHCI\" devpath=VendorHW(100c2cfa-b586-4198-9b4c-1683d195b1da)"
        );

        assert_eq!(entry.encode()?, bytes);
        Ok(())
    }

    #[test]
    fn built_entry_round_trips() -> Result<(), Box<dyn Error>> {
        let mut entry = BootEntry::new(0, "netboot", DevicePath::uri("http://10.0.50.1/grubaa64.efi"), Vec::new());
        assert!(!entry.is_active());
        entry.set_active(true);
        assert_eq!(entry.attr, LOAD_OPTION_ACTIVE);

        let bytes = entry.encode()?;
        assert_eq!(bytes[4..6], 37u16.to_le_bytes());
        assert_eq!(BootEntry::decode(&bytes)?, entry);

        entry.set_active(false);
        assert_eq!(entry.attr, 0);
        Ok(())
    }

    #[test]
    fn rejects_short_payloads() {
        assert!(matches!(BootEntry::decode(&[1, 0, 0]), Err(VarStoreError::Malformed(_))));
        // Description without a terminator.
        assert!(matches!(BootEntry::decode(&[1, 0, 0, 0, 4, 0, b'A', 0]), Err(VarStoreError::Malformed(_))));
        // Device path longer than the payload.
        assert!(matches!(
            BootEntry::decode(&[1, 0, 0, 0, 0x20, 0, b'A', 0, 0, 0, 0x7F, 0xFF, 4, 0]),
            Err(VarStoreError::Malformed(_))
        ));
    }
}
