use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use std::{io::Read, path::PathBuf};
use tracing::info;
use uab_bundle::{BundleWriter, BundleWriterOptions};
use uab_serialized::looks_like_serialized;
use walkdir::WalkDir;

use super::{Compression, Variant, SERIALIZED_ENTRY};
use crate::commands::create_output;

#[derive(Args)]
pub struct PackArgs {
    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// A target bundle
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Container layout to write
    #[arg(long, value_enum, default_value_t)]
    variant: Variant,

    /// Compression of the data chunks
    #[arg(long, value_enum, default_value_t)]
    compression: Compression,

    /// Engine version stored in the header
    #[arg(long)]
    engine_version: Option<String>,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl PackArgs {
    pub fn handle(&self) -> Result<()> {
        info!("creating {}", &self.file.display());

        let mut files = WalkDir::new(&self.directory)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
            .collect::<Vec<_>>();
        files.sort_by(|a, b| a.path().cmp(b.path()));

        if files.is_empty() {
            return Err(miette!("directory is empty"));
        }

        let mut options = BundleWriterOptions::builder()
            .variant(self.variant.into())
            .block_compression(self.compression.into())
            .build();
        if let Some(engine_version) = &self.engine_version {
            options.engine_version = engine_version.clone();
        }

        let mut out = create_output(&self.file, self.overwrite)?;
        let mut bundle = BundleWriter::new(&mut out, options);

        for file in files {
            let name = file
                .path()
                .strip_prefix(&self.directory)
                .into_diagnostic()?;
            let name = name
                .to_str()
                .ok_or(miette!("unable to convert {} to a string", name.display()))?
                .replace('\\', "/");
            info!("packing {}", name);

            let mut bytes = Vec::new();
            std::fs::File::open(file.path())
                .and_then(|mut f| f.read_to_end(&mut bytes))
                .into_diagnostic()
                .context(format!("reading {}", file.path().display()))?;

            let flags = if looks_like_serialized(&bytes) {
                SERIALIZED_ENTRY
            } else {
                0
            };
            bundle
                .add_entry(&name, flags, &bytes)
                .context(format!("adding entry {name}"))?;
        }

        bundle.finish().context("finalizing bundle")?;

        Ok(())
    }
}
