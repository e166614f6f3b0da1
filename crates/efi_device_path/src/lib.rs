//! Device Path Codec
//!
//! This library parses, builds, serializes and renders the device paths stored inside EDK2 boot options. Unlike the
//! pointer based walkers used while firmware is running, everything here operates on owned byte buffers taken from an
//! offline variable store.
//!
//! Decoding is deliberately forgiving: a truncated buffer yields the end-of-path sentinel and a node whose length
//! field is out of range yields an empty payload, so scans over partially readable data always terminate.
//!
//! ## Examples
//!
//! ```
//! use efi_device_path::{DevicePath, DevicePathElement};
//!
//! let path = DevicePath::uri("http://10.0.50.1/grubaa64.efi");
//! let bytes = path.encode().unwrap();
//! assert_eq!(bytes[..2], [0x03, 0x18]);
//! assert_eq!(DevicePath::decode(&bytes), path);
//! assert_eq!(path.to_string(), "URI(http://10.0.50.1/grubaa64.efi)");
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

pub mod nodes;
pub mod ucs2;

use alloc::{
    string::{String, ToString},
    vec,
    vec::Vec,
};
use core::fmt::{self, Display};

use efi_guid::Guid;
use scroll::{
    Endian, Pread, Pwrite,
    ctx::{TryFromCtx, TryIntoCtx},
};

use nodes::{AcpiSubType, DevicePathType, HardwareSubType, MediaSubType, MessagingSubType};

/// Errors produced while serializing a device path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePathError {
    /// The node does not fit the 16-bit length field.
    NodeTooLarge {
        /// Size the node would need, header included.
        size: usize,
    },
    /// Writing into the output buffer failed.
    Write,
}

impl Display for DevicePathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePathError::NodeTooLarge { size } => write!(f, "device path node of {size} bytes exceeds 0xffff"),
            DevicePathError::Write => write!(f, "failed to write device path node"),
        }
    }
}

impl core::error::Error for DevicePathError {}

impl From<scroll::Error> for DevicePathError {
    fn from(_: scroll::Error) -> Self {
        DevicePathError::Write
    }
}

/// Common header of device path nodes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Header {
    /// Type of the device path node.
    pub r#type: u8,
    /// Subtype of the device path node.
    pub sub_type: u8,
    /// Total length in bytes of the device path node, including the header.
    pub length: usize,
}

impl Header {
    /// Size of the header in bytes.
    pub const SIZE: usize = 4;
}

impl TryIntoCtx<Endian> for Header {
    type Error = scroll::Error;

    fn try_into_ctx(self, dest: &mut [u8], ctx: Endian) -> Result<usize, Self::Error> {
        let mut offset = 0;
        dest.gwrite_with(self.r#type, &mut offset, ctx)?;
        dest.gwrite_with(self.sub_type, &mut offset, ctx)?;
        dest.gwrite_with(self.length as u16, &mut offset, ctx)?;
        Ok(offset)
    }
}

impl TryFromCtx<'_, Endian> for Header {
    type Error = scroll::Error;

    fn try_from_ctx(from: &[u8], ctx: Endian) -> Result<(Self, usize), Self::Error> {
        let mut offset = 0;
        Ok((
            Header {
                r#type: from.gread_with(&mut offset, ctx)?,
                sub_type: from.gread_with(&mut offset, ctx)?,
                length: from.gread_with::<u16>(&mut offset, ctx)? as usize,
            },
            offset,
        ))
    }
}

/// One node of a device path.
#[derive(Debug, Clone)]
pub struct DevicePathElement {
    /// Node type.
    pub dev_type: u8,
    /// Node subtype.
    pub sub_type: u8,
    /// Node payload, header excluded.
    pub data: Vec<u8>,
}

impl DevicePathElement {
    /// Creates a node from its parts.
    pub fn new(dev_type: u8, sub_type: u8, data: &[u8]) -> Self {
        Self { dev_type, sub_type, data: data.to_vec() }
    }

    /// The end-of-path sentinel.
    pub const fn end() -> Self {
        Self { dev_type: DevicePathType::End as u8, sub_type: nodes::END_ENTIRE, data: Vec::new() }
    }

    /// True for the end-of-path sentinel (any end subtype).
    pub fn is_end(&self) -> bool {
        self.dev_type == DevicePathType::End as u8
    }

    /// Serialized size, header included.
    pub fn size(&self) -> usize {
        self.data.len() + Header::SIZE
    }

    /// Messaging URI node holding the raw text of `uri`.
    pub fn uri(uri: &str) -> Self {
        Self::new(DevicePathType::Messaging as u8, MessagingSubType::Uri as u8, uri.as_bytes())
    }

    /// Media file path node holding `path` as null terminated UCS-2.
    pub fn file_path(path: &str) -> Self {
        Self::new(DevicePathType::Media as u8, MediaSubType::FilePath as u8, &ucs2::encode(path))
    }

    /// Messaging IPv4 node with every field zeroed, which asks the firmware to use DHCP.
    pub fn ipv4_dhcp() -> Self {
        Self::new(DevicePathType::Messaging as u8, MessagingSubType::IpV4 as u8, &[0u8; nodes::IPV4_DATA_LEN])
    }

    /// Media hard drive node describing a GPT partition.
    pub fn gpt_partition(partition_number: u32, start_lba: u64, size_lba: u64, signature: Guid) -> Self {
        let mut data = vec![0u8; 4 + 8 + 8 + 16 + 2];
        data[0..4].copy_from_slice(&partition_number.to_le_bytes());
        data[4..12].copy_from_slice(&start_lba.to_le_bytes());
        data[12..20].copy_from_slice(&size_lba.to_le_bytes());
        data[20..36].copy_from_slice(&signature.encode());
        data[36] = nodes::MBR_TYPE_GPT;
        data[37] = nodes::SIGNATURE_TYPE_GUID;
        Self { dev_type: DevicePathType::Media as u8, sub_type: MediaSubType::HardDrive as u8, data }
    }

    /// Decodes the node at the start of `bytes`.
    ///
    /// Fewer than four bytes yield [`DevicePathElement::end`]. A length field below four or beyond the buffer yields
    /// the node with an empty payload.
    pub fn decode(bytes: &[u8]) -> Self {
        let Ok(header) = bytes.pread_with::<Header>(0, scroll::LE) else {
            return Self::end();
        };
        let data = if header.length < Header::SIZE || header.length > bytes.len() {
            Vec::new()
        } else {
            bytes[Header::SIZE..header.length].to_vec()
        };
        Self { dev_type: header.r#type, sub_type: header.sub_type, data }
    }

    /// Serializes the node.
    pub fn encode(&self) -> Result<Vec<u8>, DevicePathError> {
        if self.size() > u16::MAX as usize {
            return Err(DevicePathError::NodeTooLarge { size: self.size() });
        }
        let mut bytes = vec![0u8; self.size()];
        bytes.pwrite_with(self, 0, scroll::LE)?;
        Ok(bytes)
    }

    /// Text of a media file path node.
    pub fn file_path_text(&self) -> Option<String> {
        self.is_file_path().then(|| ucs2::decode(&self.data))
    }

    fn is_file_path(&self) -> bool {
        self.dev_type == DevicePathType::Media as u8 && self.sub_type == MediaSubType::FilePath as u8
    }

    fn guid_at(&self, offset: usize) -> Option<Guid> {
        Guid::decode(&self.data, offset).ok()
    }

    fn fmt_hardware(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub_type {
            s if s == HardwareSubType::Pci as u8 && self.data.len() >= 2 => {
                write!(f, "PCI(dev={:02x}:{:x})", self.data[1], self.data[0])
            }
            s if s == HardwareSubType::Vendor as u8 => match self.guid_at(0) {
                Some(guid) => write!(f, "VendorHW({guid})"),
                None => write!(f, "HW(subtype={s:#x})"),
            },
            s => write!(f, "HW(subtype={s:#x})"),
        }
    }

    fn fmt_acpi(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.as_slice();
        match self.sub_type {
            s if s == AcpiSubType::Acpi as u8 => {
                match (data.pread_with::<u32>(0, scroll::LE), data.pread_with::<u32>(4, scroll::LE)) {
                    (Ok(nodes::PCI_ROOT_HID), Ok(_)) => write!(f, "PciRoot()"),
                    (Ok(hid), Ok(uid)) => write!(f, "ACPI(hid={hid:#x},uid={uid:#x})"),
                    _ => write!(f, "ACPI(subtype={s:#x})"),
                }
            }
            s if s == AcpiSubType::Adr as u8 => match data.pread_with::<u32>(0, scroll::LE) {
                Ok(adr) => write!(f, "GOP(adr={adr:#x})"),
                Err(_) => write!(f, "ACPI(subtype={s:#x})"),
            },
            s => write!(f, "ACPI(subtype={s:#x})"),
        }
    }

    fn fmt_messaging(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.as_slice();
        match self.sub_type {
            s if s == MessagingSubType::Scsi as u8 && data.len() >= 4 => {
                let pun = data.pread_with::<u16>(0, scroll::LE).unwrap_or_default();
                let lun = data.pread_with::<u16>(2, scroll::LE).unwrap_or_default();
                write!(f, "SCSI(pun={pun},lun={lun})")
            }
            s if s == MessagingSubType::Usb as u8 && data.len() >= 2 => write!(f, "USB(port={})", data[0]),
            s if s == MessagingSubType::MacAddress as u8 => write!(f, "MAC()"),
            s if s == MessagingSubType::IpV4 as u8 => write!(f, "IPv4()"),
            s if s == MessagingSubType::IpV6 as u8 => write!(f, "IPv6()"),
            s if s == MessagingSubType::Sata as u8 && data.len() >= 6 => {
                write!(f, "SATA(port={})", data.pread_with::<u16>(0, scroll::LE).unwrap_or_default())
            }
            s if s == MessagingSubType::Iscsi as u8 && data.len() >= nodes::ISCSI_TARGET_OFFSET => {
                write!(f, "ISCSI({})", String::from_utf8_lossy(&data[nodes::ISCSI_TARGET_OFFSET..]))
            }
            s if s == MessagingSubType::Uri as u8 => write!(f, "URI({})", String::from_utf8_lossy(data)),
            s if s == MessagingSubType::Dns as u8 => write!(f, "DNS()"),
            s => write!(f, "Msg(subtype={s:#x})"),
        }
    }

    fn fmt_media(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub_type {
            s if s == MediaSubType::HardDrive as u8 && self.data.len() >= 20 => {
                write!(f, "Partition(nr={})", self.data.pread_with::<u32>(0, scroll::LE).unwrap_or_default())
            }
            s if s == MediaSubType::FilePath as u8 => write!(f, "FilePath({})", ucs2::decode(&self.data)),
            s if s == MediaSubType::PiwgFirmwareFile as u8 && self.guid_at(0).is_some() => {
                write!(f, "FvFileName({})", self.guid_at(0).unwrap_or_default())
            }
            s if s == MediaSubType::PiwgFirmwareVolume as u8 && self.guid_at(0).is_some() => {
                write!(f, "FvName({})", self.guid_at(0).unwrap_or_default())
            }
            s => write!(f, "Media(subtype={s:#x})"),
        }
    }
}

impl TryIntoCtx<Endian> for &DevicePathElement {
    type Error = scroll::Error;

    fn try_into_ctx(self, dest: &mut [u8], ctx: Endian) -> Result<usize, Self::Error> {
        let size = self.size();
        if size > u16::MAX as usize {
            return Err(scroll::Error::TooBig { size, len: u16::MAX as usize });
        }
        let mut offset = 0;
        dest.gwrite_with(Header { r#type: self.dev_type, sub_type: self.sub_type, length: size }, &mut offset, ctx)?;
        dest.gwrite_with(self.data.as_slice(), &mut offset, ())?;
        Ok(offset)
    }
}

impl PartialEq for DevicePathElement {
    fn eq(&self, other: &Self) -> bool {
        if self.dev_type != other.dev_type || self.sub_type != other.sub_type {
            return false;
        }
        match (self.file_path_text(), other.file_path_text()) {
            (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
            _ => self.data == other.data,
        }
    }
}

impl Eq for DevicePathElement {}

impl Display for DevicePathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DevicePathType::from_raw(self.dev_type) {
            Some(DevicePathType::Hardware) => self.fmt_hardware(f),
            Some(DevicePathType::Acpi) => self.fmt_acpi(f),
            Some(DevicePathType::Messaging) => self.fmt_messaging(f),
            Some(DevicePathType::Media) => self.fmt_media(f),
            _ => write!(f, "Unknown(type={:#x},subtype={:#x})", self.dev_type, self.sub_type),
        }
    }
}

/// An ordered sequence of device path nodes, end sentinel excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevicePath {
    elements: Vec<DevicePathElement>,
}

impl DevicePath {
    /// Creates an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a path from nodes. End nodes are dropped.
    pub fn from_elements(elements: impl IntoIterator<Item = DevicePathElement>) -> Self {
        Self { elements: elements.into_iter().filter(|e| !e.is_end()).collect() }
    }

    /// Single node path for an HTTP(S) boot URI.
    pub fn uri(uri: &str) -> Self {
        Self::from_elements([DevicePathElement::uri(uri)])
    }

    /// Single node path for a file on the boot device.
    pub fn file_path(path: &str) -> Self {
        Self::from_elements([DevicePathElement::file_path(path)])
    }

    /// Single node path for a DHCP configured IPv4 network boot.
    pub fn ipv4_dhcp() -> Self {
        Self::from_elements([DevicePathElement::ipv4_dhcp()])
    }

    /// Single node path for a GPT partition.
    pub fn gpt_partition(partition_number: u32, start_lba: u64, size_lba: u64, signature: Guid) -> Self {
        Self::from_elements([DevicePathElement::gpt_partition(partition_number, start_lba, size_lba, signature)])
    }

    /// Appends a node. An end node is ignored.
    pub fn push(&mut self, element: DevicePathElement) {
        if !element.is_end() {
            self.elements.push(element);
        }
    }

    /// The nodes of the path.
    pub fn elements(&self) -> &[DevicePathElement] {
        &self.elements
    }

    /// Number of nodes, end sentinel excluded.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True if the path has no nodes.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Decodes nodes until the end sentinel or the end of `bytes`.
    pub fn decode(bytes: &[u8]) -> Self {
        let mut elements = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let element = DevicePathElement::decode(&bytes[offset..]);
            if element.is_end() {
                break;
            }
            offset += element.size();
            elements.push(element);
        }
        Self { elements }
    }

    /// Serialized size, end sentinel included.
    pub fn size(&self) -> usize {
        self.elements.iter().map(DevicePathElement::size).sum::<usize>() + Header::SIZE
    }

    /// Serializes the path followed by one end sentinel.
    pub fn encode(&self) -> Result<Vec<u8>, DevicePathError> {
        let mut bytes = vec![0u8; self.size()];
        let mut offset = 0;
        for element in self.elements.iter().chain(core::iter::once(&DevicePathElement::end())) {
            if element.size() > u16::MAX as usize {
                return Err(DevicePathError::NodeTooLarge { size: element.size() });
            }
            bytes.gwrite_with(element, &mut offset, scroll::LE)?;
        }
        Ok(bytes)
    }
}

impl Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, element) in self.elements.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

impl From<DevicePathElement> for DevicePath {
    fn from(element: DevicePathElement) -> Self {
        Self::from_elements([element])
    }
}

impl<'a> IntoIterator for &'a DevicePath {
    type Item = &'a DevicePathElement;
    type IntoIter = core::slice::Iter<'a, DevicePathElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// Renders raw device path `bytes` the same way [`DevicePath`]'s `Display` does, for callers holding raw bytes.
pub fn render(bytes: &[u8]) -> String {
    DevicePath::decode(bytes).to_string()
}
