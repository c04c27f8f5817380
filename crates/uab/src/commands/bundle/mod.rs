pub mod extract;
pub mod list;
pub mod pack;
pub mod rebuild;

use clap::ValueEnum;
use uab_bundle::{BundleVariant, CompressionKind};

#[derive(clap::Subcommand)]
pub enum BundleCommands {
    /// List the header, chunks and entries of a bundle
    List(list::ListArgs),
    /// Extract every entry of a bundle into a directory
    Extract(extract::ExtractArgs),
    /// Pack a directory into a new bundle
    Pack(pack::PackArgs),
    /// Rewrite a bundle with other compression or replaced entries
    Rebuild(rebuild::RebuildArgs),
}

impl BundleCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            BundleCommands::List(list) => list.handle(),
            BundleCommands::Extract(extract) => extract.handle(),
            BundleCommands::Pack(pack) => pack.handle(),
            BundleCommands::Rebuild(rebuild) => rebuild.handle(),
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Compression {
    None,
    Lzma,
    Lz4,
    #[default]
    Lz4hc,
}

impl From<Compression> for CompressionKind {
    fn from(compression: Compression) -> Self {
        match compression {
            Compression::None => CompressionKind::None,
            Compression::Lzma => CompressionKind::Lzma,
            Compression::Lz4 => CompressionKind::Lz4,
            Compression::Lz4hc => CompressionKind::Lz4Hc,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    #[default]
    Fs,
    Raw,
    Web,
}

impl From<Variant> for BundleVariant {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Fs => BundleVariant::Fs,
            Variant::Raw => BundleVariant::Raw,
            Variant::Web => BundleVariant::Web,
        }
    }
}

/// Entry flag marking a serialized file
pub const SERIALIZED_ENTRY: u32 = 4;
