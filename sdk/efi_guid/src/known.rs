//! Registry of well-known GUIDs.
//!
//! The locator and the display code look GUIDs up through a [`KnownGuids`] value rather than through free-standing
//! statics, so callers can substitute a role's GUID (for example a vendor volume GUID) or register extra names.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::{string::String, vec::Vec};

use crate::Guid;

/// `EFI_GLOBAL_VARIABLE`: namespace of `BootOrder`, `Boot####` and the other architectural variables.
pub const EFI_GLOBAL_VARIABLE: Guid =
    Guid::from_fields(0x8be4df61, 0x93ca, 0x11d2, [0xaa, 0x0d, 0x00, 0xe0, 0x98, 0x03, 0x2b, 0x8c]);

/// `EFI_IMAGE_SECURITY_DATABASE_GUID`: namespace of `db`, `dbx` and friends.
pub const IMAGE_SECURITY_DATABASE: Guid =
    Guid::from_fields(0xd719b2cb, 0x3d3a, 0x4596, [0xa3, 0xbc, 0xda, 0xd0, 0x0e, 0x67, 0x65, 0x6f]);

/// Microsoft vendor GUID.
pub const MICROSOFT: Guid =
    Guid::from_fields(0x77fa9abd, 0x0359, 0x4d32, [0xbd, 0x60, 0x28, 0xf4, 0xe7, 0x8f, 0x78, 0x4b]);

/// File system GUID of the NVRAM firmware volume.
pub const NV_DATA_FV: Guid =
    Guid::from_fields(0x8d1b55ed, 0xbebf, 0x40b7, [0x82, 0x46, 0xd8, 0xbd, 0x7d, 0x64, 0xed, 0xbe]);

/// `EFI_FIRMWARE_FILE_SYSTEM2_GUID`: firmware volumes holding FFS files.
pub const FIRMWARE_FILE_SYSTEM: Guid =
    Guid::from_fields(0x8c8ce578, 0x8a3d, 0x4f1c, [0x99, 0x35, 0x89, 0x61, 0x85, 0xc3, 0x2d, 0xd3]);

/// `EFI_AUTHENTICATED_VARIABLE_GUID`: signature of an authenticated variable store header.
pub const AUTHENTICATED_VARIABLE: Guid =
    Guid::from_fields(0xaaf32c78, 0x947b, 0x439a, [0xa1, 0x80, 0x2e, 0x14, 0x4e, 0xc3, 0x77, 0x92]);

/// Roles a GUID plays in the variable store format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WellKnown {
    /// Namespace for the architectural boot variables.
    GlobalVariable,
    /// Namespace for the secure boot signature databases.
    ImageSecurityDatabase,
    /// Microsoft vendor namespace.
    Microsoft,
    /// Volume GUID identifying the NVRAM firmware volume.
    NvData,
    /// Volume GUID identifying a firmware file system volume, skipped while scanning.
    FirmwareFileSystem,
    /// Signature GUID of the authenticated variable store header.
    AuthenticatedVariables,
}

impl WellKnown {
    /// Every role, in registry order.
    pub const ALL: [WellKnown; 6] = [
        WellKnown::GlobalVariable,
        WellKnown::ImageSecurityDatabase,
        WellKnown::Microsoft,
        WellKnown::NvData,
        WellKnown::FirmwareFileSystem,
        WellKnown::AuthenticatedVariables,
    ];

    /// Display name of the role.
    pub const fn name(self) -> &'static str {
        match self {
            WellKnown::GlobalVariable => "EfiGlobalVariable",
            WellKnown::ImageSecurityDatabase => "EfiImageSecurityDatabase",
            WellKnown::Microsoft => "Microsoft",
            WellKnown::NvData => "NvData",
            WellKnown::FirmwareFileSystem => "Ffs",
            WellKnown::AuthenticatedVariables => "AuthVars",
        }
    }

    /// GUID the role carries in stock EDK2 images.
    pub const fn default_guid(self) -> Guid {
        match self {
            WellKnown::GlobalVariable => EFI_GLOBAL_VARIABLE,
            WellKnown::ImageSecurityDatabase => IMAGE_SECURITY_DATABASE,
            WellKnown::Microsoft => MICROSOFT,
            WellKnown::NvData => NV_DATA_FV,
            WellKnown::FirmwareFileSystem => FIRMWARE_FILE_SYSTEM,
            WellKnown::AuthenticatedVariables => AUTHENTICATED_VARIABLE,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Immutable lookup table from names to GUIDs.
///
/// Built with [`KnownGuids::standard`] and refined with the consuming builder methods; there is no way to mutate a
/// registry that is already shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownGuids {
    roles: [Guid; WellKnown::ALL.len()],
    extra: Vec<(String, Guid)>,
}

impl KnownGuids {
    /// Registry holding the stock EDK2 GUID for every [`WellKnown`] role.
    pub fn standard() -> Self {
        Self { roles: WellKnown::ALL.map(WellKnown::default_guid), extra: Vec::new() }
    }

    /// Returns a registry where `role` maps to `guid` instead.
    pub fn with_role(mut self, role: WellKnown, guid: Guid) -> Self {
        self.roles[role.index()] = guid;
        self
    }

    /// Returns a registry with an additional named GUID. A name registered twice keeps the newer GUID.
    pub fn with_name(mut self, name: impl Into<String>, guid: Guid) -> Self {
        let name = name.into();
        self.extra.retain(|(existing, _)| *existing != name);
        self.extra.push((name, guid));
        self
    }

    /// GUID currently assigned to `role`.
    pub fn get(&self, role: WellKnown) -> Guid {
        self.roles[role.index()]
    }

    /// Name of `guid`, if registered. Roles win over extra names.
    pub fn name_of(&self, guid: &Guid) -> Option<&str> {
        WellKnown::ALL
            .iter()
            .find(|role| self.roles[role.index()] == *guid)
            .map(|role| role.name())
            .or_else(|| self.extra.iter().find(|(_, g)| g == guid).map(|(name, _)| name.as_str()))
    }

    /// GUID registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Guid> {
        WellKnown::ALL
            .iter()
            .find(|role| role.name() == name)
            .map(|role| self.roles[role.index()])
            .or_else(|| self.extra.iter().find(|(n, _)| n == name).map(|(_, guid)| *guid))
    }
}

impl Default for KnownGuids {
    fn default() -> Self {
        Self::standard()
    }
}
