//! Executable for inspecting and editing the boot configuration stored in an EDK2 firmware image.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use clap::{ArgAction, Parser, Subcommand};
use edk2_varstore::{BootEntry, VarStoreError, VariableStore, boot::LOAD_OPTION_ACTIVE};
use efi_device_path::DevicePath;
use log::{LevelFilter, Metadata, Record};
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

#[derive(Parser, Debug)]
struct Args {
    /// Path for the firmware image holding the variable store.
    image: PathBuf,
    /// Optional path for the modified image. If not specified, the input image is overwritten.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Log more details to stderr. Repeat for more.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a summary line for every variable.
    Print {
        /// Append the vendor namespace and attributes of each variable.
        #[arg(short, long)]
        long: bool,
    },
    /// List the boot entries in boot order. Active entries are marked with `*`.
    List,
    /// Show the boot order.
    Order,
    /// Replace the boot order.
    SetOrder {
        /// Boot option ids, in hex (`1`, `0001` or `Boot0001`).
        #[arg(required = true, value_parser = parse_id)]
        ids: Vec<u16>,
    },
    /// Show one boot entry.
    Get {
        #[arg(value_parser = parse_id)]
        id: u16,
    },
    /// Mark a boot entry active.
    Active {
        #[arg(value_parser = parse_id)]
        id: u16,
    },
    /// Mark a boot entry inactive.
    Inactive {
        #[arg(value_parser = parse_id)]
        id: u16,
    },
    /// Delete a boot entry and drop it from the boot order.
    Delete {
        #[arg(value_parser = parse_id)]
        id: u16,
    },
    /// Add an active HTTP boot entry and append it to the boot order.
    AddUri { title: String, uri: String },
    /// Report whether the image contains an NVRAM firmware volume.
    Probe,
}

fn parse_id(text: &str) -> Result<u16, String> {
    let digits = text.strip_prefix("Boot").unwrap_or(text);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid boot option id '{text}': {e}"))
}

struct StderrLogger;
impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}
static LOGGER: StderrLogger = StderrLogger;

fn main() -> Result<(), VarStoreError> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(level));

    let mut out = io::stdout().lock();
    if let Command::Probe = args.command {
        let found = VariableStore::probe(&args.image)?;
        let verdict = if found { "variable store found" } else { "no variable store" };
        writeln!(out, "{}: {verdict}", args.image.display())?;
        return Ok(());
    }

    let mut store = VariableStore::load(&args.image)?;
    match args.command {
        Command::Print { long } => {
            let lines = if long { store.detailed_summary() } else { store.summary() };
            for line in lines {
                writeln!(out, "{line}")?;
            }
        }
        Command::List => {
            let entries = match store.ordered_boot_entries() {
                Ok(entries) => entries,
                Err(VarStoreError::NotFound) => {
                    log::warn!("No BootOrder variable, listing every boot entry.");
                    store.boot_entries().into_iter().collect()
                }
                Err(err) => return Err(err),
            };
            for (id, entry) in entries {
                write_entry(&mut out, id, &entry)?;
            }
        }
        Command::Order => {
            let order: Vec<String> = store.boot_order()?.iter().map(|id| format!("{id:04X}")).collect();
            writeln!(out, "BootOrder: {}", order.join(","))?;
        }
        Command::SetOrder { ids } => {
            for id in &ids {
                if !store.boot_entries().contains_key(id) {
                    log::warn!("Boot{:04X} does not exist.", id);
                }
            }
            store.set_boot_order(&ids);
            save(&store, args.output.as_deref())?;
        }
        Command::Get { id } => {
            let entry = store.boot_entry(id)?;
            write_entry(&mut out, id, &entry)?;
            writeln!(out, "  attributes: {:#010x}", entry.attr)?;
            writeln!(out, "  optional data: {} bytes", entry.optional_data.len())?;
        }
        Command::Active { id } => {
            set_active(&mut store, id, true)?;
            save(&store, args.output.as_deref())?;
        }
        Command::Inactive { id } => {
            set_active(&mut store, id, false)?;
            save(&store, args.output.as_deref())?;
        }
        Command::Delete { id } => {
            store.remove_boot_entry(id)?;
            save(&store, args.output.as_deref())?;
        }
        Command::AddUri { title, uri } => {
            let id = store.next_free_boot_id().ok_or(VarStoreError::NotFound)?;
            let entry = BootEntry::new(LOAD_OPTION_ACTIVE, title, DevicePath::uri(&uri), Vec::new());
            store.set_boot_entry(id, &entry)?;

            let mut order = match store.boot_order() {
                Ok(order) => order,
                Err(VarStoreError::NotFound) => Vec::new(),
                Err(err) => return Err(err),
            };
            order.push(id);
            store.set_boot_order(&order);
            save(&store, args.output.as_deref())?;
            writeln!(out, "Added Boot{id:04X}")?;
        }
        Command::Probe => unreachable!("handled before loading the store"),
    }

    Ok(())
}

fn write_entry<W: Write>(out: &mut W, id: u16, entry: &BootEntry) -> io::Result<()> {
    let marker = if entry.is_active() { '*' } else { ' ' };
    writeln!(out, "{marker} Boot{id:04X} {entry}")
}

fn set_active(store: &mut VariableStore, id: u16, active: bool) -> Result<(), VarStoreError> {
    let mut entry = store.boot_entry(id)?;
    entry.set_active(active);
    store.set_boot_entry(id, &entry)
}

fn save(store: &VariableStore, output: Option<&Path>) -> Result<(), VarStoreError> {
    match output {
        Some(path) => store.persist_to(path),
        None => store.persist(),
    }
}
