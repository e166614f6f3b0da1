//! EDK2 Variable Store Support
//!
//! This library reads and rewrites the NVRAM variable store that EDK2 firmware keeps inside its flash image, without
//! booting the image. It locates the NVRAM firmware volume, decodes the authenticated variable records it holds, and
//! exposes the boot configuration (`BootOrder` and the `Boot####` load options) for inspection and modification.
//!
//! The modified store is written back by re-encoding every variable into the original variable region; every byte of
//! the image outside that region is preserved.
//!
//! ## Examples and Usage
//!
//! ```
//! use edk2_varstore::{BootEntry, VariableStore, boot::LOAD_OPTION_ACTIVE, volume};
//! use efi_device_path::DevicePath;
//! use efi_guid::KnownGuids;
//!
//! let image = volume::format_volume(0x4000, &KnownGuids::standard())?;
//! let mut store = VariableStore::from_image(image)?;
//!
//! let entry = BootEntry::new(LOAD_OPTION_ACTIVE, "netboot", DevicePath::uri("http://10.0.50.1/grubaa64.efi"), vec![]);
//! store.set_boot_entry(1, &entry)?;
//! store.set_boot_order(&[1]);
//!
//! let reloaded = VariableStore::from_image(store.serialize_image()?)?;
//! assert_eq!(reloaded.ordered_boot_entries()?, vec![(1, entry)]);
//! # Ok::<(), edk2_varstore::VarStoreError>(())
//! ```
//!
//! With the `std` feature the store can be loaded from and persisted to a file with [`VariableStore::load`] and
//! [`VariableStore::persist`], and the `varstore_tool` binary is built.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod boot;
pub mod err;
pub mod store;
pub mod variable;
pub mod volume;

pub use boot::BootEntry;
pub use err::VarStoreError;
pub use store::VariableStore;
pub use variable::{Attributes, Variable};
