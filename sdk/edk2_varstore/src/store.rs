//! Variable store aggregate.
//!
//! A [`VariableStore`] owns a whole firmware image, the bounds of its variable region and the live variables decoded
//! from it. Variables are kept in a map ordered by name, so listing and re-encoding are deterministic. Changes are
//! applied in memory; [`VariableStore::serialize_image`] re-encodes every variable and splices the result between the
//! untouched head and tail of the image.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use alloc::{
    collections::BTreeMap,
    format,
    string::{String, ToString},
    vec::Vec,
};

use efi_guid::{Guid, KnownGuids, WellKnown};

use crate::{
    boot::{self, BOOT_ORDER, BootEntry},
    err::VarStoreError,
    variable::{self, Attributes, ERASED, Variable},
    volume,
};

#[cfg(feature = "std")]
use std::path::{Path, PathBuf};

/// In-memory view of the variable store of one firmware image.
#[derive(Debug, Clone)]
pub struct VariableStore {
    file_data: Vec<u8>,
    start: usize,
    end: usize,
    vars: BTreeMap<String, Variable>,
    known: KnownGuids,
    #[cfg(feature = "std")]
    path: Option<PathBuf>,
}

impl VariableStore {
    /// Locates and decodes the variable store of `image` using the standard GUIDs.
    pub fn from_image(image: Vec<u8>) -> Result<Self, VarStoreError> {
        Self::from_image_with(image, &KnownGuids::standard())
    }

    /// Locates and decodes the variable store of `image` using the GUIDs of `known`.
    pub fn from_image_with(image: Vec<u8>, known: &KnownGuids) -> Result<Self, VarStoreError> {
        let header = volume::locate(&image, known)?;

        let mut vars = BTreeMap::new();
        for variable in variable::decode_records(&image[header.region()]) {
            vars.insert(variable.name.clone(), variable);
        }
        log::info!("Decoded {} variables.", vars.len());

        Ok(Self {
            file_data: image,
            start: header.start,
            end: header.end,
            vars,
            known: known.clone(),
            #[cfg(feature = "std")]
            path: None,
        })
    }

    /// First byte of the variable region.
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last byte of the variable region.
    pub fn end(&self) -> usize {
        self.end
    }

    /// The image as loaded.
    pub fn image(&self) -> &[u8] {
        &self.file_data
    }

    /// Variable called `name`, or [`VarStoreError::NotFound`].
    pub fn get(&self, name: &str) -> Result<&Variable, VarStoreError> {
        self.vars.get(name).ok_or(VarStoreError::NotFound)
    }

    /// Inserts `variable`, replacing any variable of the same name.
    pub fn set(&mut self, variable: Variable) {
        self.vars.insert(variable.name.clone(), variable);
    }

    /// Removes the variable called `name`, if present.
    pub fn delete(&mut self, name: &str) {
        self.vars.remove(name);
    }

    /// All variables, sorted by name.
    pub fn list(&self) -> Vec<&Variable> {
        self.vars.values().collect()
    }

    /// Encodes every variable in name order.
    ///
    /// Fails with [`VarStoreError::Capacity`] if the records do not fit the variable region.
    pub fn serialize_variables(&self) -> Result<Vec<u8>, VarStoreError> {
        let bytes = variable::encode_records(self.vars.values())?;
        let available = self.end - self.start;
        if bytes.len() > available {
            Err(VarStoreError::Capacity { required: bytes.len(), available })?;
        }
        Ok(bytes)
    }

    /// The image with its variable region replaced by the current variables.
    ///
    /// The result has the length of the loaded image and differs from it only inside the variable region.
    pub fn serialize_image(&self) -> Result<Vec<u8>, VarStoreError> {
        let variables = self.serialize_variables()?;
        let mut image = Vec::with_capacity(self.file_data.len());
        image.extend_from_slice(&self.file_data[..self.start]);
        image.extend_from_slice(&variables);
        image.resize(self.end, ERASED);
        image.extend_from_slice(&self.file_data[self.end..]);
        Ok(image)
    }

    /// Boot option ids in boot order.
    pub fn boot_order(&self) -> Result<Vec<u16>, VarStoreError> {
        let data = &self.get(BOOT_ORDER)?.data;
        if data.len() % 2 != 0 {
            Err(VarStoreError::Malformed("BootOrder has an odd length"))?;
        }
        Ok(data.chunks_exact(2).map(|id| u16::from_le_bytes([id[0], id[1]])).collect())
    }

    /// Replaces the boot order.
    pub fn set_boot_order(&mut self, ids: &[u16]) {
        let data = ids.iter().flat_map(|id| id.to_le_bytes()).collect();
        self.set(Variable::new(BOOT_ORDER, self.global_guid(), Attributes::BOOT_VARIABLE, data));
    }

    /// Decoded `Boot####` entry for `id`.
    ///
    /// Fails with [`VarStoreError::NotFound`] if the variable is absent and [`VarStoreError::Malformed`] if its payload
    /// is not a load option.
    pub fn boot_entry(&self, id: u16) -> Result<BootEntry, VarStoreError> {
        BootEntry::decode(&self.get(&boot::boot_variable_name(id))?.data)
    }

    /// Stores `entry` as `Boot####`. The boot order is left alone.
    pub fn set_boot_entry(&mut self, id: u16, entry: &BootEntry) -> Result<(), VarStoreError> {
        let data = entry.encode()?;
        self.set(Variable::new(boot::boot_variable_name(id), self.global_guid(), Attributes::BOOT_VARIABLE, data));
        Ok(())
    }

    /// Removes `Boot####`. The boot order is left alone.
    pub fn delete_boot_entry(&mut self, id: u16) {
        self.delete(&boot::boot_variable_name(id));
    }

    /// Removes `Boot####` and drops `id` from the boot order.
    pub fn remove_boot_entry(&mut self, id: u16) -> Result<(), VarStoreError> {
        self.delete_boot_entry(id);
        match self.boot_order() {
            Ok(order) => {
                let order: Vec<u16> = order.into_iter().filter(|entry| *entry != id).collect();
                self.set_boot_order(&order);
                Ok(())
            }
            Err(VarStoreError::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Every decodable `Boot####` variable, keyed by id.
    pub fn boot_entries(&self) -> BTreeMap<u16, BootEntry> {
        self.vars
            .iter()
            .filter_map(|(name, variable)| {
                let id = boot::parse_boot_variable_name(name)?;
                match BootEntry::decode(&variable.data) {
                    Ok(entry) => Some((id, entry)),
                    Err(err) => {
                        log::debug!("Skipping {}: {}", name, err);
                        None
                    }
                }
            })
            .collect()
    }

    /// Boot entries in boot order. Ids without an entry are left out.
    pub fn ordered_boot_entries(&self) -> Result<Vec<(u16, BootEntry)>, VarStoreError> {
        let entries = self.boot_entries();
        Ok(self.boot_order()?.into_iter().filter_map(|id| entries.get(&id).map(|entry| (id, entry.clone()))).collect())
    }

    /// Smallest id without a `Boot####` variable.
    pub fn next_free_boot_id(&self) -> Option<u16> {
        (0..=u16::MAX).find(|id| !self.vars.contains_key(&boot::boot_variable_name(*id)))
    }

    /// One summary line per variable, sorted by name.
    pub fn summary(&self) -> Vec<String> {
        self.vars.values().map(|variable| variable.to_string()).collect()
    }

    /// Like [`VariableStore::summary`], with the namespace and attributes of each variable appended.
    pub fn detailed_summary(&self) -> Vec<String> {
        self.vars.values().map(|variable| format!("{variable}  [{}]", variable.origin(&self.known))).collect()
    }

    fn global_guid(&self) -> Guid {
        self.known.get(WellKnown::GlobalVariable)
    }

    /// GUID registry the store was decoded with.
    pub fn known_guids(&self) -> &KnownGuids {
        &self.known
    }
}

#[cfg(feature = "std")]
impl VariableStore {
    /// Reads the image at `path` and decodes its variable store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VarStoreError> {
        Self::load_with(path, &KnownGuids::standard())
    }

    /// Like [`VariableStore::load`], with the GUIDs of `known`.
    pub fn load_with(path: impl AsRef<Path>, known: &KnownGuids) -> Result<Self, VarStoreError> {
        let path = path.as_ref();
        log::info!("Reading raw edk2 varstore from {}.", path.display());
        let mut store = Self::from_image_with(std::fs::read(path)?, known)?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// True if the file at `path` holds an NVRAM firmware volume.
    pub fn probe(path: impl AsRef<Path>) -> Result<bool, VarStoreError> {
        Ok(volume::probe_image(&std::fs::read(path)?, &KnownGuids::standard()))
    }

    /// File the store was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Overwrites the file the store was loaded from.
    pub fn persist(&self) -> Result<(), VarStoreError> {
        let path = self.path.as_deref().ok_or(VarStoreError::NotFound)?;
        self.persist_to(path)
    }

    /// Writes the serialized image to `path`.
    pub fn persist_to(&self, path: impl AsRef<Path>) -> Result<(), VarStoreError> {
        let image = self.serialize_image()?;
        log::info!("Writing raw edk2 varstore to {}.", path.as_ref().display());
        std::fs::write(path, image)?;
        Ok(())
    }
}
