pub mod dump;
pub mod info;

use miette::{miette, Result};
use std::{path::Path, sync::Arc};
use uab_io::Tag;
use uab_registry::{Container, DecoderRegistry, ObjectRegistry, RegistryOptions, TypeTreeDecoder};

#[derive(clap::Subcommand)]
pub enum SerializedCommands {
    /// Show the header and tables of serialized files
    Info(info::InfoArgs),
    /// Decode objects through their type trees and print them as JSON
    Dump(dump::DumpArgs),
}

impl SerializedCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            SerializedCommands::Info(info) => info.handle(),
            SerializedCommands::Dump(dump) => dump.handle(),
        }
    }
}

/// Load a loose serialized file, or every serialized entry of a bundle
pub(crate) fn load(path: &Path) -> Result<(ObjectRegistry, Vec<Arc<Container>>)> {
    let mut decoders = DecoderRegistry::new();
    decoders.set_fallback(TypeTreeDecoder);
    let registry = ObjectRegistry::new(decoders, RegistryOptions::default());

    let containers = registry.load(&Tag::path(path))?;
    if containers.is_empty() {
        return Err(miette!("{} holds no serialized files", path.display()));
    }
    Ok((registry, containers))
}
