//! Load, edit and persist a variable store through the filesystem.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use edk2_varstore::{BootEntry, VarStoreError, Variable, VariableStore, boot::LOAD_OPTION_ACTIVE, volume};
use efi_device_path::DevicePath;
use efi_guid::{EFI_GLOBAL_VARIABLE, KnownGuids};
use std::{env, error::Error, fs, path::PathBuf};

// Firmware code ahead of and behind the NVRAM volume.
const CODE_SIZE: usize = 0x2000;
const VOLUME_SIZE: usize = 0x4000;

fn scratch_file(name: &str) -> PathBuf {
    env::temp_dir().join(format!("edk2_varstore_{}_{name}.fd", std::process::id()))
}

fn firmware_image() -> Result<Vec<u8>, Box<dyn Error>> {
    let mut image = vec![0x90u8; CODE_SIZE];
    image.extend(volume::format_volume(VOLUME_SIZE, &KnownGuids::standard())?);
    image.extend(vec![0xCCu8; CODE_SIZE]);
    Ok(image)
}

#[test]
fn persist_round_trips_through_the_file() -> Result<(), Box<dyn Error>> {
    let path = scratch_file("persist");
    let original = firmware_image()?;
    fs::write(&path, &original)?;

    let mut store = VariableStore::load(&path)?;
    assert_eq!(store.path(), Some(path.as_path()));
    assert!(store.list().is_empty());

    let http = BootEntry::new(LOAD_OPTION_ACTIVE, "HTTP Boot", DevicePath::uri("http://10.0.50.1/shim.efi"), vec![]);
    let shell = BootEntry::new(LOAD_OPTION_ACTIVE, "UEFI Shell", DevicePath::file_path("\\EFI\\Shell.efi"), vec![]);
    store.set_boot_entry(3, &http)?;
    store.set_boot_entry(0, &shell)?;
    store.set_boot_order(&[3, 0]);
    store.set(Variable::new("Timeout", EFI_GLOBAL_VARIABLE, 7, 5u16.to_le_bytes().to_vec()));
    store.persist()?;

    let written = fs::read(&path)?;
    assert_eq!(written.len(), original.len());
    assert_eq!(written[..store.start()], original[..store.start()]);
    assert_eq!(written[store.end()..], original[store.end()..]);

    let mut reloaded = VariableStore::load(&path)?;
    assert_eq!(reloaded.ordered_boot_entries()?, vec![(3, http), (0, shell.clone())]);
    assert_eq!(reloaded.get("Timeout")?.data, vec![5, 0]);

    reloaded.remove_boot_entry(3)?;
    let copy = scratch_file("persist_copy");
    reloaded.persist_to(&copy)?;

    // The source file is untouched by persist_to.
    assert_eq!(fs::read(&path)?, written);
    let copied = VariableStore::load(&copy)?;
    assert_eq!(copied.boot_order()?, vec![0]);
    assert_eq!(copied.ordered_boot_entries()?, vec![(0, shell)]);
    assert!(matches!(copied.boot_entry(3), Err(VarStoreError::NotFound)));

    fs::remove_file(&path)?;
    fs::remove_file(&copy)?;
    Ok(())
}

#[test]
fn probe_reports_the_nvram_volume() -> Result<(), Box<dyn Error>> {
    let with_store = scratch_file("probe_store");
    let without_store = scratch_file("probe_plain");
    fs::write(&with_store, firmware_image()?)?;
    fs::write(&without_store, vec![0u8; 0x8000])?;

    assert!(VariableStore::probe(&with_store)?);
    assert!(!VariableStore::probe(&without_store)?);
    assert!(matches!(VariableStore::load(&without_store), Err(VarStoreError::NotFound)));

    fs::remove_file(&with_store)?;
    fs::remove_file(&without_store)?;
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let result = VariableStore::load(scratch_file("does_not_exist"));
    assert!(matches!(result, Err(VarStoreError::Io(std::io::ErrorKind::NotFound))));
}

#[test]
fn store_without_a_path_cannot_persist() -> Result<(), Box<dyn Error>> {
    let store = VariableStore::from_image(firmware_image()?)?;
    assert_eq!(store.path(), None);
    assert!(matches!(store.persist(), Err(VarStoreError::NotFound)));
    Ok(())
}
