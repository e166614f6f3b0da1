//! Device path node types and subtypes understood by the renderer.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use r_efi::efi::protocols::device_path;

/// Device path node types.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[repr(u8)]
pub enum DevicePathType {
    Hardware = device_path::TYPE_HARDWARE,
    Acpi = 0x02,
    Messaging = 0x03,
    Media = device_path::TYPE_MEDIA,
    End = device_path::TYPE_END,
}

impl DevicePathType {
    /// Maps a raw type byte, `None` for types the renderer treats as unknown.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            device_path::TYPE_HARDWARE => Some(Self::Hardware),
            0x02 => Some(Self::Acpi),
            0x03 => Some(Self::Messaging),
            device_path::TYPE_MEDIA => Some(Self::Media),
            device_path::TYPE_END => Some(Self::End),
            _ => None,
        }
    }
}

/// Hardware node subtypes.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[repr(u8)]
pub enum HardwareSubType {
    Pci = device_path::Hardware::SUBTYPE_PCI,
    Vendor = device_path::Hardware::SUBTYPE_VENDOR,
}

/// ACPI node subtypes.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[repr(u8)]
pub enum AcpiSubType {
    /// `_HID`/`_UID` pair.
    Acpi = 1,
    /// `_ADR` of a display output.
    Adr = 3,
}

/// Messaging node subtypes.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[repr(u8)]
pub enum MessagingSubType {
    Scsi = 2,
    Usb = 5,
    MacAddress = 11,
    IpV4 = 12,
    IpV6 = 13,
    Sata = 18,
    Iscsi = 19,
    Uri = 24,
    Dns = 31,
}

/// Media node subtypes.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[repr(u8)]
pub enum MediaSubType {
    HardDrive = 1,
    FilePath = device_path::Media::SUBTYPE_FILE_PATH,
    PiwgFirmwareFile = device_path::Media::SUBTYPE_PIWG_FIRMWARE_FILE,
    PiwgFirmwareVolume = device_path::Media::SUBTYPE_PIWG_FIRMWARE_VOLUME,
}

/// Subtype of the end-of-path node terminating a complete device path.
pub const END_ENTIRE: u8 = device_path::End::SUBTYPE_ENTIRE;

/// EISA ID of the PCI root bridge (`PNP0A03`).
pub const PCI_ROOT_HID: u32 = 0x0a03_41d0;

/// Length of the IPv4 node payload (addresses, ports, protocol, origin, gateway and mask).
pub const IPV4_DATA_LEN: usize = 23;

/// `MBRType` value for a GPT partition in a hard drive node.
pub const MBR_TYPE_GPT: u8 = 0x02;

/// `SignatureType` value for a GUID signature in a hard drive node.
pub const SIGNATURE_TYPE_GUID: u8 = 0x02;

/// Offset of the target name inside an iSCSI node payload.
pub const ISCSI_TARGET_OFFSET: usize = 14;
