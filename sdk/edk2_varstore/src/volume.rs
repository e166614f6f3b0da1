//! Firmware volume and variable store header support.
//!
//! Locates the NVRAM firmware volume inside a flash image and derives the byte range that holds variable records:
//!
//! ```text
//! +----------------------------------------+ fv offset
//! | EFI_FIRMWARE_VOLUME_HEADER             |
//! +----------------------------------------+ fv offset + HeaderLength
//! | VARIABLE_STORE_HEADER (28 bytes)       |
//! +----------------------------------------+ start
//! | variable records, then 0xFF            |
//! +----------------------------------------+ end = store header + Size
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::{vec, vec::Vec};
use core::ops::Range;

use efi_guid::{Guid, KnownGuids, WellKnown};
use scroll::{
    Endian, Pread, Pwrite,
    ctx::{TryFromCtx, TryIntoCtx},
};

use crate::{err::VarStoreError, variable::ERASED};

/// `_FVH`
pub const FV_SIGNATURE: u32 = 0x4856_465F;
/// Stride of the firmware volume scan.
pub const SCAN_STRIDE: usize = 1024;
/// Size of the variable store header.
pub const STORE_HEADER_SIZE: usize = 28;
/// Format byte of a formatted variable store.
pub const STORE_FORMATTED: u8 = 0x5A;
/// State byte of a healthy variable store.
pub const STORE_HEALTHY: u8 = 0xFE;

const FV_GUID_OFFSET: usize = 0x10;
const FV_LENGTH_OFFSET: usize = 0x20;
// One block map entry plus the terminating entry.
const FV_FORMAT_HEADER_LENGTH: u16 = 0x48;
const FV_CHECKSUM_OFFSET: usize = 0x32;
const FV_REVISION: u8 = 0x02;
const FV_NV_ATTRIBUTES: u32 = 0x0004_FEFF;

/// Returns the offset of the first NVRAM firmware volume in `image`.
///
/// Firmware file system volumes are skipped by their length; anything else is stepped over in [`SCAN_STRIDE`] chunks.
pub fn find_firmware_volume(image: &[u8], known: &KnownGuids) -> Result<usize, VarStoreError> {
    let nv_data = known.get(WellKnown::NvData);
    let ffs = known.get(WellKnown::FirmwareFileSystem);

    let mut offset: usize = 0;
    while offset.checked_add(64).is_some_and(|end| end < image.len()) {
        let guid = Guid::decode(image, offset + FV_GUID_OFFSET)?;
        if guid == nv_data {
            log::debug!("Found NV data volume at {:#x}.", offset);
            return Ok(offset);
        }

        if guid == ffs {
            let length: u64 = image.pread_with(offset + FV_LENGTH_OFFSET, scroll::LE)?;
            match usize::try_from(length).ok().filter(|len| *len > 0).and_then(|len| offset.checked_add(len)) {
                Some(next) => {
                    log::debug!("Skipping firmware file system volume at {:#x} ({:#x} bytes).", offset, length);
                    offset = next;
                    continue;
                }
                None => log::warn!("Firmware file system volume at {:#x} has unusable length {:#x}.", offset, length),
            }
        }
        offset += SCAN_STRIDE;
    }
    Err(VarStoreError::NotFound)
}

/// True if `image` holds an NVRAM firmware volume.
pub fn probe_image(image: &[u8], known: &KnownGuids) -> bool {
    find_firmware_volume(image, known).is_ok()
}

/// First entry of the firmware volume block map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockMapEntry {
    /// Number of blocks in the run.
    pub num_blocks: u32,
    /// Size of each block in bytes.
    pub length: u32,
}

/// Fixed part of an `EFI_FIRMWARE_VOLUME_HEADER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeHeader {
    /// Offset of the volume within the image.
    pub offset: usize,
    /// Identifies the volume format, the NV data GUID for an NVRAM volume.
    pub file_system_guid: Guid,
    /// Length of the whole volume, header included.
    pub fv_length: u64,
    /// [`FV_SIGNATURE`] for a valid header.
    pub signature: u32,
    /// `EFI_FVB_ATTRIBUTES_2` bits.
    pub attributes: u32,
    /// Length of the header, block map included. The variable store header follows it.
    pub header_length: u16,
    /// Makes the 16 bit words of the header sum to zero.
    pub checksum: u16,
    /// Offset of the extended header, zero if there is none.
    pub ext_header_offset: u16,
    pub revision: u8,
    /// First entry of the block map.
    pub block_map: BlockMapEntry,
}

impl TryFromCtx<'_, Endian> for VolumeHeader {
    type Error = scroll::Error;

    fn try_from_ctx(from: &[u8], ctx: Endian) -> Result<(Self, usize), Self::Error> {
        let mut offset = FV_GUID_OFFSET;
        let mut guid = [0u8; 16];
        from.gread_inout_with(&mut offset, &mut guid[..], ctx)?;
        let fv_length = from.gread_with(&mut offset, ctx)?;
        let signature = from.gread_with(&mut offset, ctx)?;
        let attributes = from.gread_with(&mut offset, ctx)?;
        let header_length = from.gread_with(&mut offset, ctx)?;
        let checksum = from.gread_with(&mut offset, ctx)?;
        let ext_header_offset = from.gread_with(&mut offset, ctx)?;
        let _reserved: u8 = from.gread_with(&mut offset, ctx)?;
        let revision = from.gread_with(&mut offset, ctx)?;
        let num_blocks = from.gread_with(&mut offset, ctx)?;
        let length = from.gread_with(&mut offset, ctx)?;
        let block_map = BlockMapEntry { num_blocks, length };
        Ok((
            VolumeHeader {
                offset: 0,
                file_system_guid: Guid::from_bytes(&guid),
                fv_length,
                signature,
                attributes,
                header_length,
                checksum,
                ext_header_offset,
                revision,
                block_map,
            },
            offset,
        ))
    }
}

impl TryIntoCtx<Endian> for &VolumeHeader {
    type Error = scroll::Error;

    fn try_into_ctx(self, dest: &mut [u8], ctx: Endian) -> Result<usize, Self::Error> {
        let mut offset = 0;
        dest.gwrite_with(&[0u8; FV_GUID_OFFSET][..], &mut offset, ())?;
        dest.gwrite_with(&self.file_system_guid.encode()[..], &mut offset, ())?;
        dest.gwrite_with(self.fv_length, &mut offset, ctx)?;
        dest.gwrite_with(self.signature, &mut offset, ctx)?;
        dest.gwrite_with(self.attributes, &mut offset, ctx)?;
        dest.gwrite_with(self.header_length, &mut offset, ctx)?;
        dest.gwrite_with(self.checksum, &mut offset, ctx)?;
        dest.gwrite_with(self.ext_header_offset, &mut offset, ctx)?;
        dest.gwrite_with(0u8, &mut offset, ctx)?;
        dest.gwrite_with(self.revision, &mut offset, ctx)?;
        dest.gwrite_with(self.block_map.num_blocks, &mut offset, ctx)?;
        dest.gwrite_with(self.block_map.length, &mut offset, ctx)?;
        Ok(offset)
    }
}

impl VolumeHeader {
    /// Parses the volume header at `offset` and checks that it describes an NVRAM volume.
    pub fn parse(image: &[u8], offset: usize, known: &KnownGuids) -> Result<Self, VarStoreError> {
        let bytes = image.get(offset..).ok_or(VarStoreError::NotAFirmwareVolume)?;
        let mut header: VolumeHeader = bytes.pread_with(0, scroll::LE)?;
        header.offset = offset;

        if header.signature != FV_SIGNATURE {
            Err(VarStoreError::NotAFirmwareVolume)?;
        }
        if header.file_system_guid != known.get(WellKnown::NvData) {
            Err(VarStoreError::NotAVariableStore)?;
        }

        log::info!(
            "Firmware volume at {:#x}: guid {}, length {:#x}, revision {}, attributes {:#x}.",
            offset,
            header.file_system_guid,
            header.fv_length,
            header.revision,
            header.attributes
        );
        log::info!(
            "Block map: {} blocks of {:#x} bytes, header length {:#x}.",
            header.block_map.num_blocks,
            header.block_map.length,
            header.header_length
        );
        if !header.checksum_valid(image) {
            log::warn!("Firmware volume header checksum {:#06x} does not verify.", header.checksum);
        }
        Ok(header)
    }

    /// Offset of the variable store header within the image.
    pub fn store_header_offset(&self) -> usize {
        self.offset + self.header_length as usize
    }

    /// True if the 16 bit words of the header sum to zero.
    pub fn checksum_valid(&self, image: &[u8]) -> bool {
        let Some(header) = image.get(self.offset..self.store_header_offset()) else {
            return false;
        };
        header.chunks(2).fold(0u16, |sum, word| {
            sum.wrapping_add(u16::from_le_bytes([word[0], word.get(1).copied().unwrap_or(0)]))
        }) == 0
    }
}

/// `VARIABLE_STORE_HEADER` and the variable region it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableStoreHeader {
    /// Offset of the header within the image.
    pub offset: usize,
    pub signature: Guid,
    /// Size of the store, header included.
    pub size: u32,
    pub format: u8,
    pub state: u8,
    /// First byte of the variable region.
    pub start: usize,
    /// One past the last byte of the variable region.
    pub end: usize,
}

impl VariableStoreHeader {
    /// Parses the authenticated variable store header at `offset`.
    pub fn parse(image: &[u8], offset: usize, known: &KnownGuids) -> Result<Self, VarStoreError> {
        if !offset.checked_add(STORE_HEADER_SIZE).is_some_and(|end| end <= image.len()) {
            Err(VarStoreError::Malformed("variable store header runs past the image"))?;
        }
        let signature = Guid::decode(image, offset)?;
        let size: u32 = image.pread_with(offset + 16, scroll::LE)?;
        let format = image[offset + 20];
        let state = image[offset + 21];

        if signature != known.get(WellKnown::AuthenticatedVariables) {
            Err(VarStoreError::Malformed("variable store is not an authenticated store"))?;
        }
        if format != STORE_FORMATTED || state != STORE_HEALTHY {
            log::warn!("Variable store format {:#04x}, state {:#04x}.", format, state);
            Err(VarStoreError::Malformed("variable store is not formatted and healthy"))?;
        }

        let start = offset + STORE_HEADER_SIZE;
        let end = offset + size as usize;
        if end < start || end > image.len() {
            Err(VarStoreError::Malformed("variable store size does not fit the image"))?;
        }

        log::info!("Variable store range: {:#x} -> {:#x}.", start, end);
        Ok(Self { offset, signature, size, format, state, start, end })
    }

    /// Byte range of the variable region.
    pub fn region(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Finds the NVRAM volume and returns its variable store header.
pub fn locate(image: &[u8], known: &KnownGuids) -> Result<VariableStoreHeader, VarStoreError> {
    let offset = find_firmware_volume(image, known)?;
    let volume = VolumeHeader::parse(image, offset, known)?;
    VariableStoreHeader::parse(image, volume.store_header_offset(), known)
}

/// Builds an empty NVRAM firmware volume of `length` bytes: volume header, store header, then erased flash.
///
/// The store spans the whole volume after the volume header.
pub fn format_volume(length: usize, known: &KnownGuids) -> Result<Vec<u8>, VarStoreError> {
    let header_length = FV_FORMAT_HEADER_LENGTH as usize;
    let length_u32 = u32::try_from(length)
        .map_err(|_| VarStoreError::Capacity { required: length, available: u32::MAX as usize })?;
    if length < header_length + STORE_HEADER_SIZE {
        Err(VarStoreError::Capacity { required: header_length + STORE_HEADER_SIZE, available: length })?;
    }

    let mut image = vec![ERASED; length];
    image[..header_length].fill(0);

    let mut header = VolumeHeader {
        offset: 0,
        file_system_guid: known.get(WellKnown::NvData),
        fv_length: length as u64,
        signature: FV_SIGNATURE,
        attributes: FV_NV_ATTRIBUTES,
        header_length: FV_FORMAT_HEADER_LENGTH,
        checksum: 0,
        ext_header_offset: 0,
        revision: FV_REVISION,
        block_map: BlockMapEntry { num_blocks: 1, length: length_u32 },
    };
    image.pwrite_with(&header, 0, scroll::LE)?;
    header.checksum = image[..header_length]
        .chunks(2)
        .fold(0u16, |sum, word| sum.wrapping_add(u16::from_le_bytes([word[0], word[1]])))
        .wrapping_neg();
    image.pwrite_with(header.checksum, FV_CHECKSUM_OFFSET, scroll::LE)?;

    let mut offset = header_length;
    image.gwrite_with(&known.get(WellKnown::AuthenticatedVariables).encode()[..], &mut offset, ())?;
    image.gwrite_with(length_u32 - header_length as u32, &mut offset, scroll::LE)?;
    image.gwrite_with(STORE_FORMATTED, &mut offset, scroll::LE)?;
    image.gwrite_with(STORE_HEALTHY, &mut offset, scroll::LE)?;
    image.gwrite_with(&[0u8; 6][..], &mut offset, ())?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use efi_guid::{AUTHENTICATED_VARIABLE, FIRMWARE_FILE_SYSTEM, NV_DATA_FV};
    use log::{self, Level, LevelFilter, Metadata, Record};
    use std::error::Error;

    // Sample logger for log crate to dump stuff in tests
    struct SimpleLogger;
    impl log::Log for SimpleLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Info
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                println!("{}", record.args());
            }
        }

        fn flush(&self) {}
    }
    static LOGGER: SimpleLogger = SimpleLogger;

    fn set_logger() {
        let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info));
    }

    /// Volume at `offset` with header length 0x48 and a store header of `size` bytes.
    fn nv_volume(image: &mut [u8], offset: usize, size: u32) {
        image[offset..offset + 0x48].fill(0);
        image[offset + 0x10..offset + 0x20].copy_from_slice(&NV_DATA_FV.encode());
        image[offset + 0x28..offset + 0x2C].copy_from_slice(&FV_SIGNATURE.to_le_bytes());
        image[offset + 0x30..offset + 0x32].copy_from_slice(&0x48u16.to_le_bytes());
        let store = offset + 0x48;
        image[store..store + 16].copy_from_slice(&AUTHENTICATED_VARIABLE.encode());
        image[store + 16..store + 20].copy_from_slice(&size.to_le_bytes());
        image[store + 20] = STORE_FORMATTED;
        image[store + 21] = STORE_HEALTHY;
    }

    fn ffs_volume(image: &mut [u8], offset: usize, length: u64) {
        image[offset + 0x10..offset + 0x20].copy_from_slice(&FIRMWARE_FILE_SYSTEM.encode());
        image[offset + 0x20..offset + 0x28].copy_from_slice(&length.to_le_bytes());
        image[offset + 0x28..offset + 0x2C].copy_from_slice(&FV_SIGNATURE.to_le_bytes());
    }

    #[test]
    fn locates_store_at_start_of_image() -> Result<(), Box<dyn Error>> {
        set_logger();
        let mut image = vec![ERASED; 0x2000];
        nv_volume(&mut image, 0, 0x1000);

        let known = KnownGuids::standard();
        assert_eq!(find_firmware_volume(&image, &known)?, 0);
        let store = locate(&image, &known)?;
        assert_eq!(store.start, 0x48 + 28);
        assert_eq!(store.end, 0x48 + 0x1000);
        assert_eq!(store.region(), 0x64..0x1048);
        Ok(())
    }

    #[test]
    fn skips_firmware_file_system_volumes() -> Result<(), Box<dyn Error>> {
        let mut image = vec![0u8; 0x6000];
        ffs_volume(&mut image, 0, 0x3000);
        nv_volume(&mut image, 0x3000, 0x1000);

        let known = KnownGuids::standard();
        assert_eq!(find_firmware_volume(&image, &known)?, 0x3000);
        assert_eq!(locate(&image, &known)?.start, 0x3000 + 0x48 + 28);
        Ok(())
    }

    #[test]
    fn zero_length_ffs_falls_back_to_stride() -> Result<(), Box<dyn Error>> {
        let mut image = vec![0u8; 0x3000];
        ffs_volume(&mut image, 0, 0);
        ffs_volume(&mut image, 0x400, u64::MAX);
        nv_volume(&mut image, 0x800, 0x100);

        assert_eq!(find_firmware_volume(&image, &KnownGuids::standard())?, 0x800);
        Ok(())
    }

    #[test]
    fn ffs_length_near_address_limit_ends_the_scan() {
        let mut image = vec![0u8; 0x3000];
        ffs_volume(&mut image, 0, u64::MAX - 10);
        nv_volume(&mut image, 0x800, 0x100);

        assert_eq!(find_firmware_volume(&image, &KnownGuids::standard()), Err(VarStoreError::NotFound));
        assert!(!probe_image(&image, &KnownGuids::standard()));
    }

    #[test]
    fn unaligned_volume_is_not_found() {
        let mut image = vec![0u8; 0x3000];
        nv_volume(&mut image, 0x200, 0x100);
        assert_eq!(find_firmware_volume(&image, &KnownGuids::standard()), Err(VarStoreError::NotFound));
        assert!(!probe_image(&image, &KnownGuids::standard()));
        assert_eq!(find_firmware_volume(&[0u8; 64], &KnownGuids::standard()), Err(VarStoreError::NotFound));
    }

    #[test]
    fn substituted_nv_guid_is_honored() -> Result<(), Box<dyn Error>> {
        let vendor = Guid::from_fields(0xfff12b8d, 0x7696, 0x4c8b, [0xa9, 0x85, 0x27, 0x47, 0x07, 0x5b, 0x4f, 0x50]);
        let known = KnownGuids::standard().with_role(WellKnown::NvData, vendor);
        let mut image = vec![ERASED; 0x2000];
        nv_volume(&mut image, 0, 0x1000);
        image[0x10..0x20].copy_from_slice(&vendor.encode());

        assert!(!probe_image(&image, &KnownGuids::standard()));
        assert!(probe_image(&image, &known));
        assert_eq!(locate(&image, &known)?.end, 0x1048);
        Ok(())
    }

    #[test]
    fn volume_header_checks() {
        let known = KnownGuids::standard();
        let mut image = vec![ERASED; 0x2000];
        nv_volume(&mut image, 0, 0x1000);

        image[0x28] = 0;
        assert_eq!(VolumeHeader::parse(&image, 0, &known), Err(VarStoreError::NotAFirmwareVolume));

        nv_volume(&mut image, 0, 0x1000);
        image[0x10..0x20].copy_from_slice(&FIRMWARE_FILE_SYSTEM.encode());
        assert_eq!(VolumeHeader::parse(&image, 0, &known), Err(VarStoreError::NotAVariableStore));
    }

    #[test]
    fn store_header_checks() {
        let known = KnownGuids::standard();
        let mut image = vec![ERASED; 0x2000];

        nv_volume(&mut image, 0, 0x1000);
        image[0x48 + 20] = 0x00;
        assert!(matches!(locate(&image, &known), Err(VarStoreError::Malformed(_))));

        nv_volume(&mut image, 0, 0x1000);
        image[0x48 + 21] = 0xFF;
        assert!(matches!(locate(&image, &known), Err(VarStoreError::Malformed(_))));

        nv_volume(&mut image, 0, 0x1000);
        image[0x48..0x58].copy_from_slice(&NV_DATA_FV.encode());
        assert!(matches!(locate(&image, &known), Err(VarStoreError::Malformed(_))));

        nv_volume(&mut image, 0, 0x4000);
        assert!(matches!(locate(&image, &known), Err(VarStoreError::Malformed(_))));

        nv_volume(&mut image, 0, 8);
        assert!(matches!(locate(&image, &known), Err(VarStoreError::Malformed(_))));

        assert!(matches!(VariableStoreHeader::parse(&image, 0x1FF0, &known), Err(VarStoreError::Malformed(_))));
    }

    #[test]
    fn formatted_volume_parses_back() -> Result<(), Box<dyn Error>> {
        let known = KnownGuids::standard();
        let image = format_volume(0x4000, &known)?;
        assert_eq!(image.len(), 0x4000);

        let volume = VolumeHeader::parse(&image, 0, &known)?;
        assert!(volume.checksum_valid(&image));
        assert_eq!(volume.fv_length, 0x4000);
        assert_eq!(volume.block_map, BlockMapEntry { num_blocks: 1, length: 0x4000 });

        let store = locate(&image, &known)?;
        assert_eq!(store.region(), 0x64..0x4000);
        assert!(image[store.region()].iter().all(|b| *b == ERASED));

        assert!(matches!(format_volume(0x40, &known), Err(VarStoreError::Capacity { .. })));
        Ok(())
    }
}
