//! Error types and conversions for the variable store crate.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use core::fmt;

use efi_device_path::DevicePathError;
use efi_guid::GuidError;
use r_efi::efi;

/// Error definitions for the variable store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarStoreError {
    /// The requested variable, boot entry or firmware volume does not exist.
    NotFound,
    /// The volume header signature is not `_FVH`.
    NotAFirmwareVolume,
    /// The firmware volume is not an NVRAM volume.
    NotAVariableStore,
    /// A header, record or variable payload could not be decoded.
    Malformed(&'static str),
    /// The encoded variables do not fit the variable region.
    Capacity {
        /// Bytes the encoded variables need.
        required: usize,
        /// Bytes available between the start and the end of the region.
        available: usize,
    },
    /// Reading or writing the backing image failed.
    #[cfg(feature = "std")]
    Io(std::io::ErrorKind),
}

impl fmt::Display for VarStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarStoreError::NotFound => write!(f, "not found"),
            VarStoreError::NotAFirmwareVolume => write!(f, "not a firmware volume"),
            VarStoreError::NotAVariableStore => write!(f, "firmware volume is not a variable store"),
            VarStoreError::Malformed(reason) => write!(f, "malformed variable store: {reason}"),
            VarStoreError::Capacity { required, available } => {
                write!(f, "variables need {required} bytes but the store holds {available}")
            }
            #[cfg(feature = "std")]
            VarStoreError::Io(kind) => write!(f, "i/o error: {kind}"),
        }
    }
}

impl core::error::Error for VarStoreError {}

impl From<GuidError> for VarStoreError {
    fn from(_: GuidError) -> Self {
        VarStoreError::Malformed("invalid guid")
    }
}

impl From<scroll::Error> for VarStoreError {
    fn from(_: scroll::Error) -> Self {
        VarStoreError::Malformed("truncated header")
    }
}

impl From<DevicePathError> for VarStoreError {
    fn from(_: DevicePathError) -> Self {
        VarStoreError::Malformed("device path too large")
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for VarStoreError {
    fn from(value: std::io::Error) -> Self {
        VarStoreError::Io(value.kind())
    }
}

impl From<VarStoreError> for efi::Status {
    fn from(value: VarStoreError) -> Self {
        match value {
            VarStoreError::NotFound => efi::Status::NOT_FOUND,
            VarStoreError::NotAFirmwareVolume | VarStoreError::NotAVariableStore | VarStoreError::Malformed(_) => {
                efi::Status::VOLUME_CORRUPTED
            }
            VarStoreError::Capacity { .. } => efi::Status::VOLUME_FULL,
            #[cfg(feature = "std")]
            VarStoreError::Io(_) => efi::Status::DEVICE_ERROR,
        }
    }
}
