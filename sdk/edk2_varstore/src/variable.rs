//! Variable record codec.
//!
//! Records are laid out back to back inside the variable region, each one an authenticated variable header followed
//! by the UCS-2 name and the payload, padded to a 4 byte boundary:
//!
//! ```text
//! 0x00 StartId (0x55AA)   0x02 State   0x03 Reserved   0x04 Attributes
//! 0x08 MonotonicCount     0x10 TimeStamp (EFI_TIME)
//! 0x20 PubKeyIndex        0x24 NameSize   0x28 DataSize   0x2C VendorGuid
//! 0x3C Name[NameSize]     Data[DataSize]  0xFF padding
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::{format, string::String, vec, vec::Vec};
use core::fmt::{self, Display};

use efi_device_path::ucs2;
use efi_guid::{Guid, KnownGuids};
use r_efi::efi;
use scroll::{
    Endian, Pread, Pwrite,
    ctx::{TryFromCtx, TryIntoCtx},
};

use crate::{
    boot::{self, BootEntry},
    err::VarStoreError,
};

/// Marks the start of a variable record.
pub const RECORD_MAGIC: u16 = 0x55AA;
/// State of a fully written, live record.
pub const VAR_ADDED: u8 = 0x3F;
/// Size of the authenticated variable header.
pub const HEADER_SIZE: usize = 60;
/// Record alignment inside the variable region.
pub const ALIGNMENT: usize = 4;
/// Value of erased flash, used for padding and free space.
pub const ERASED: u8 = 0xFF;

/// Variable attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attributes(pub u32);

impl Attributes {
    /// Kept across resets (`NV`).
    pub const NON_VOLATILE: u32 = efi::VARIABLE_NON_VOLATILE;
    /// Visible to boot services (`BS`).
    pub const BOOTSERVICE_ACCESS: u32 = efi::VARIABLE_BOOTSERVICE_ACCESS;
    /// Visible at runtime (`RT`).
    pub const RUNTIME_ACCESS: u32 = efi::VARIABLE_RUNTIME_ACCESS;
    /// Hardware error record (`HR`).
    pub const HARDWARE_ERROR_RECORD: u32 = efi::VARIABLE_HARDWARE_ERROR_RECORD;
    /// Count based authenticated writes (`AU`).
    pub const AUTHENTICATED_WRITE_ACCESS: u32 = efi::VARIABLE_AUTHENTICATED_WRITE_ACCESS;
    /// Time based authenticated writes (`AT`).
    pub const TIME_BASED_AUTHENTICATED_WRITE_ACCESS: u32 = efi::VARIABLE_TIME_BASED_AUTHENTICATED_WRITE_ACCESS;
    /// Writes append to the data (`AW`).
    pub const APPEND_WRITE: u32 = efi::VARIABLE_APPEND_WRITE;

    /// Attributes of the architectural boot variables.
    pub const BOOT_VARIABLE: u32 = Self::NON_VOLATILE | Self::BOOTSERVICE_ACCESS | Self::RUNTIME_ACCESS;

    const NAMES: [(u32, &'static str); 7] = [
        (Self::NON_VOLATILE, "NV"),
        (Self::BOOTSERVICE_ACCESS, "BS"),
        (Self::RUNTIME_ACCESS, "RT"),
        (Self::HARDWARE_ERROR_RECORD, "HR"),
        (Self::AUTHENTICATED_WRITE_ACCESS, "AU"),
        (Self::TIME_BASED_AUTHENTICATED_WRITE_ACCESS, "AT"),
        (Self::APPEND_WRITE, "AW"),
    ];

    /// True if every bit of `flags` is set.
    pub const fn contains(self, flags: u32) -> bool {
        self.0 & flags == flags
    }
}

impl Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.0 & flag != 0 {
                if !first {
                    f.write_str("+")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// A decoded variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Variable name, unique within a store.
    pub name: String,
    /// Vendor namespace.
    pub guid: Guid,
    /// Attribute bits, see [`Attributes`].
    pub attr: u32,
    /// Payload.
    pub data: Vec<u8>,
    /// Monotonic count of authenticated variables.
    pub count: u64,
    /// Public key index of authenticated variables.
    pub pk_idx: u32,
    /// Raw `EFI_TIME` of time based authenticated variables.
    pub time: [u8; 16],
}

impl Variable {
    /// Creates a variable with zeroed authentication fields.
    pub fn new(name: impl Into<String>, guid: Guid, attr: u32, data: Vec<u8>) -> Self {
        Self { name: name.into(), guid, attr, data, count: 0, pk_idx: 0, time: [0; 16] }
    }

    /// Attribute bits as a displayable value.
    pub fn attributes(&self) -> Attributes {
        Attributes(self.attr)
    }

    /// Vendor namespace and attributes, e.g. `EfiGlobalVariable NV+BS+RT`.
    ///
    /// The namespace is the registry name of the GUID, or the GUID itself when `known` has no name for it.
    pub fn origin(&self, known: &KnownGuids) -> String {
        match known.name_of(&self.guid) {
            Some(name) => format!("{name} {}", self.attributes()),
            None => format!("{} {}", self.guid, self.attributes()),
        }
    }

    /// Size of the encoded record, padding included.
    pub fn encoded_len(&self) -> usize {
        (HEADER_SIZE + ucs2::encoded_len(&self.name) + self.data.len()).next_multiple_of(ALIGNMENT)
    }

    /// Decodes the live record at the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, VarStoreError> {
        match read_record(bytes, 0) {
            Record::Live { variable, .. } => Ok(variable),
            Record::Inactive { .. } => Err(VarStoreError::Malformed("record is not live")),
            Record::Truncated => Err(VarStoreError::Malformed("truncated record")),
            Record::Free => Err(VarStoreError::Malformed("missing record magic")),
        }
    }

    /// Encodes the variable as a live record padded with `0xFF` to the record alignment.
    ///
    /// Names are stored null terminated, so a name containing `'\0'` is rejected.
    pub fn encode(&self) -> Result<Vec<u8>, VarStoreError> {
        if self.name.contains('\0') {
            Err(VarStoreError::Malformed("variable name contains a null character"))?;
        }
        let name = ucs2::encode(&self.name);
        let header = RecordHeader {
            magic: RECORD_MAGIC,
            state: VAR_ADDED,
            attr: self.attr,
            count: self.count,
            time: self.time,
            pk_idx: self.pk_idx,
            name_size: u32::try_from(name.len()).map_err(|_| VarStoreError::Malformed("variable name too long"))?,
            data_size: u32::try_from(self.data.len())
                .map_err(|_| VarStoreError::Malformed("variable data too long"))?,
            guid: self.guid,
        };

        let mut bytes = vec![ERASED; self.encoded_len()];
        let mut offset = 0;
        bytes.gwrite_with(&header, &mut offset, scroll::LE)?;
        bytes.gwrite_with(name.as_slice(), &mut offset, ())?;
        bytes.gwrite_with(self.data.as_slice(), &mut offset, ())?;
        Ok(bytes)
    }
}

impl Display for Variable {
    /// One line summary: boot entries, 16 and 32 bit values, or the payload size.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<20} : ", self.name)?;
        if boot::parse_boot_variable_name(&self.name).is_some() {
            if let Ok(entry) = BootEntry::decode(&self.data) {
                return write!(f, "boot entry: {entry}");
            }
        }
        match self.data.as_slice() {
            [a, b] => write!(f, "word: {:#06x}", u16::from_le_bytes([*a, *b])),
            [a, b, c, d] => write!(f, "dword: {:#010x}", u32::from_le_bytes([*a, *b, *c, *d])),
            data => write!(f, "blob: {} bytes", data.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordHeader {
    magic: u16,
    state: u8,
    attr: u32,
    count: u64,
    time: [u8; 16],
    pk_idx: u32,
    name_size: u32,
    data_size: u32,
    guid: Guid,
}

impl TryFromCtx<'_, Endian> for RecordHeader {
    type Error = scroll::Error;

    fn try_from_ctx(from: &[u8], ctx: Endian) -> Result<(Self, usize), Self::Error> {
        let mut offset = 0;
        let magic = from.gread_with(&mut offset, ctx)?;
        let state = from.gread_with(&mut offset, ctx)?;
        let _reserved: u8 = from.gread_with(&mut offset, ctx)?;
        let attr = from.gread_with(&mut offset, ctx)?;
        let count = from.gread_with(&mut offset, ctx)?;
        let mut time = [0u8; 16];
        from.gread_inout_with(&mut offset, &mut time[..], ctx)?;
        let pk_idx = from.gread_with(&mut offset, ctx)?;
        let name_size = from.gread_with(&mut offset, ctx)?;
        let data_size = from.gread_with(&mut offset, ctx)?;
        let mut guid = [0u8; 16];
        from.gread_inout_with(&mut offset, &mut guid[..], ctx)?;
        Ok((
            RecordHeader {
                magic,
                state,
                attr,
                count,
                time,
                pk_idx,
                name_size,
                data_size,
                guid: Guid::from_bytes(&guid),
            },
            offset,
        ))
    }
}

impl TryIntoCtx<Endian> for &RecordHeader {
    type Error = scroll::Error;

    fn try_into_ctx(self, dest: &mut [u8], ctx: Endian) -> Result<usize, Self::Error> {
        let mut offset = 0;
        dest.gwrite_with(self.magic, &mut offset, ctx)?;
        dest.gwrite_with(self.state, &mut offset, ctx)?;
        dest.gwrite_with(0u8, &mut offset, ctx)?;
        dest.gwrite_with(self.attr, &mut offset, ctx)?;
        dest.gwrite_with(self.count, &mut offset, ctx)?;
        dest.gwrite_with(&self.time[..], &mut offset, ())?;
        dest.gwrite_with(self.pk_idx, &mut offset, ctx)?;
        dest.gwrite_with(self.name_size, &mut offset, ctx)?;
        dest.gwrite_with(self.data_size, &mut offset, ctx)?;
        dest.gwrite_with(&self.guid.encode()[..], &mut offset, ())?;
        Ok(offset)
    }
}

enum Record {
    /// No record magic: the rest of the region is free space.
    Free,
    /// The record claims more bytes than the region holds.
    Truncated,
    /// A record in any state other than added.
    Inactive { state: u8, span: usize },
    Live { variable: Variable, span: usize },
}

fn read_record(region: &[u8], offset: usize) -> Record {
    let rest = region.get(offset..).unwrap_or_default();
    if !matches!(rest.pread_with::<u16>(0, scroll::LE), Ok(RECORD_MAGIC)) {
        return Record::Free;
    }
    let Ok(header) = rest.pread_with::<RecordHeader>(0, scroll::LE) else {
        return Record::Truncated;
    };

    let name_end = HEADER_SIZE.checked_add(header.name_size as usize);
    let data_end = name_end.and_then(|end| end.checked_add(header.data_size as usize));
    let (Some(name_end), Some(data_end)) = (name_end, data_end.filter(|end| *end <= rest.len())) else {
        return Record::Truncated;
    };
    let span = data_end.next_multiple_of(ALIGNMENT);

    if header.state != VAR_ADDED {
        return Record::Inactive { state: header.state, span };
    }

    let variable = Variable {
        name: ucs2::decode(&rest[HEADER_SIZE..name_end]),
        guid: header.guid,
        attr: header.attr,
        data: rest[name_end..data_end].to_vec(),
        count: header.count,
        pk_idx: header.pk_idx,
        time: header.time,
    };
    Record::Live { variable, span }
}

/// Decodes the live records of a variable region, in storage order.
///
/// Decoding stops without error at the first offset that does not hold the record magic, and at a record whose sizes
/// run past the end of `region`.
pub fn decode_records(region: &[u8]) -> Vec<Variable> {
    let mut variables = Vec::new();
    let mut offset = 0;
    while offset < region.len() {
        match read_record(region, offset) {
            Record::Free => break,
            Record::Truncated => {
                log::warn!("Variable record at {:#x} runs past the end of the store, stopping.", offset);
                break;
            }
            Record::Inactive { state, span } => {
                log::debug!("Skipping variable record at {:#x} in state {:#04x}.", offset, state);
                offset += span;
            }
            Record::Live { variable, span } => {
                log::debug!(
                    "Variable {} ({}) at {:#x}: attr {}, {} bytes.",
                    variable.name,
                    variable.guid,
                    offset,
                    variable.attributes(),
                    variable.data.len()
                );
                variables.push(variable);
                offset += span;
            }
        }
    }
    variables
}

/// Encodes `variables` back to back.
pub fn encode_records<'a>(variables: impl IntoIterator<Item = &'a Variable>) -> Result<Vec<u8>, VarStoreError> {
    let mut bytes = Vec::new();
    for variable in variables {
        bytes.extend_from_slice(&variable.encode()?);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use efi_device_path::DevicePath;
    use efi_guid::EFI_GLOBAL_VARIABLE;
    use std::error::Error;

    fn timeout() -> Variable {
        Variable::new("Timeout", EFI_GLOBAL_VARIABLE, Attributes::BOOT_VARIABLE, vec![0x05, 0x00])
    }

    #[test]
    fn encode_lays_out_the_header() -> Result<(), Box<dyn Error>> {
        let mut variable = timeout();
        variable.count = 0x1122_3344_5566_7788;
        variable.pk_idx = 7;
        variable.time = [0xA5; 16];

        let bytes = variable.encode()?;
        // 60 byte header, 16 byte name, 2 byte payload, 2 bytes of padding.
        assert_eq!(bytes.len(), 80);
        assert_eq!(bytes.len(), variable.encoded_len());
        assert_eq!(bytes[0..2], [0xAA, 0x55]);
        assert_eq!(bytes[2], VAR_ADDED);
        assert_eq!(bytes[3], 0);
        assert_eq!(bytes[4..8], 7u32.to_le_bytes());
        assert_eq!(bytes[8..16], 0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(bytes[16..32], [0xA5; 16]);
        assert_eq!(bytes[32..36], 7u32.to_le_bytes());
        assert_eq!(bytes[36..40], 16u32.to_le_bytes());
        assert_eq!(bytes[40..44], 2u32.to_le_bytes());
        assert_eq!(bytes[44..60], EFI_GLOBAL_VARIABLE.encode());
        assert_eq!(bytes[60..76], ucs2::encode("Timeout"));
        assert_eq!(bytes[76..78], [0x05, 0x00]);
        assert_eq!(bytes[78..], [ERASED, ERASED]);

        assert_eq!(Variable::decode(&bytes)?, variable);
        Ok(())
    }

    #[test]
    fn records_are_always_aligned() -> Result<(), Box<dyn Error>> {
        for len in 0..8 {
            let variable = Variable::new("X", EFI_GLOBAL_VARIABLE, 0, vec![0x42; len]);
            let bytes = variable.encode()?;
            assert_eq!(bytes.len() % ALIGNMENT, 0);
            assert_eq!(Variable::decode(&bytes)?, variable);
        }
        Ok(())
    }

    #[test]
    fn decode_stops_at_free_space() -> Result<(), Box<dyn Error>> {
        let mut region = encode_records(&[timeout(), Variable::new("Lang", EFI_GLOBAL_VARIABLE, 7, b"eng".to_vec())])?;
        region.extend_from_slice(&[0x12, 0x34, 0xAA, 0x55]);
        region.resize(region.len() + 64, ERASED);

        let names: Vec<String> = decode_records(&region).into_iter().map(|v| v.name).collect();
        assert_eq!(names, ["Timeout", "Lang"]);
        assert!(decode_records(&[ERASED; 128]).is_empty());
        assert!(decode_records(&[]).is_empty());
        Ok(())
    }

    #[test]
    fn inactive_records_are_skipped() -> Result<(), Box<dyn Error>> {
        let mut deleted = timeout().encode()?;
        deleted[2] = 0x3C;
        let mut region = deleted;
        region.extend_from_slice(&Variable::new("Timeout", EFI_GLOBAL_VARIABLE, 7, vec![0x0A, 0x00]).encode()?);

        let variables = decode_records(&region);
        assert_eq!(variables.len(), 1);
        assert_eq!(variables[0].data, [0x0A, 0x00]);
        assert_eq!(Variable::decode(&region), Err(VarStoreError::Malformed("record is not live")));
        Ok(())
    }

    #[test]
    fn truncated_record_ends_the_scan() -> Result<(), Box<dyn Error>> {
        let mut region = timeout().encode()?;
        let mut oversized = Variable::new("Big", EFI_GLOBAL_VARIABLE, 7, vec![1; 32]).encode()?;
        oversized[40..44].copy_from_slice(&0x1000u32.to_le_bytes());
        region.extend_from_slice(&oversized);

        assert_eq!(decode_records(&region), [timeout()]);
        assert_eq!(Variable::decode(&oversized), Err(VarStoreError::Malformed("truncated record")));
        assert_eq!(Variable::decode(&region[..30]), Err(VarStoreError::Malformed("truncated record")));
        assert_eq!(Variable::decode(&[ERASED; 64]), Err(VarStoreError::Malformed("missing record magic")));
        Ok(())
    }

    #[test]
    fn names_with_a_null_are_rejected() {
        let variable = Variable::new("A\u{0}B", EFI_GLOBAL_VARIABLE, 7, vec![1]);
        assert_eq!(variable.encode(), Err(VarStoreError::Malformed("variable name contains a null character")));
        assert!(encode_records(&[timeout(), variable]).is_err());
    }

    #[test]
    fn origin_names_the_namespace() {
        let known = KnownGuids::standard();
        assert_eq!(timeout().origin(&known), "EfiGlobalVariable NV+BS+RT");

        let vendor = Guid::from_fields(0xd9bee56e, 0x75dc, 0x49d9, [0xb4, 0xd7, 0xb5, 0x34, 0x21, 0x0f, 0x63, 0x7a]);
        let certdb = Variable::new("certdb", vendor, 0x27, vec![0; 4]);
        assert_eq!(certdb.origin(&known), "d9bee56e-75dc-49d9-b4d7-b534210f637a NV+BS+RT+AT");
        assert_eq!(certdb.origin(&known.with_name("Shim", vendor)), "Shim NV+BS+RT+AT");
    }

    #[test]
    fn attributes_render_as_flags() {
        assert_eq!(Attributes(Attributes::BOOT_VARIABLE).to_string(), "NV+BS+RT");
        assert_eq!(
            Attributes(Attributes::NON_VOLATILE | Attributes::TIME_BASED_AUTHENTICATED_WRITE_ACCESS).to_string(),
            "NV+AT"
        );
        assert_eq!(Attributes(0).to_string(), "-");
        assert!(Attributes(0x27).contains(Attributes::BOOT_VARIABLE));
        assert!(!Attributes(0x3).contains(Attributes::BOOT_VARIABLE));
    }

    #[test]
    fn summary_lines() -> Result<(), Box<dyn Error>> {
        assert_eq!(timeout().to_string(), "Timeout              : word: 0x0005");

        let certdb = Variable::new("certdb", EFI_GLOBAL_VARIABLE, 0x27, vec![0x04, 0, 0, 0]);
        assert_eq!(certdb.to_string(), "certdb               : dword: 0x00000004");

        let blob = Variable::new("PlatformLangCodes", EFI_GLOBAL_VARIABLE, 6, b"en-US\0".to_vec());
        assert_eq!(blob.to_string(), "PlatformLangCodes    : blob: 6 bytes");

        let entry = BootEntry::new(1, "UEFI Shell", DevicePath::file_path("\\Shell.efi"), Vec::new());
        let boot = Variable::new("Boot0002", EFI_GLOBAL_VARIABLE, 7, entry.encode()?);
        assert_eq!(
            boot.to_string(),
            "Boot0002             : boot entry: title=\"UEFI Shell\" devpath=FilePath(\\Shell.efi)"
        );

        let not_an_entry = Variable::new("Boot0003", EFI_GLOBAL_VARIABLE, 7, vec![0xFF; 3]);
        assert_eq!(not_an_entry.to_string(), "Boot0003             : blob: 3 bytes");
        Ok(())
    }
}
