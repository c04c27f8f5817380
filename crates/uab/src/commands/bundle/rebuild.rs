use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use std::{fs::File, io::BufReader, path::PathBuf};
use tracing::{info, warn};
use uab_bundle::{rebuild, BundleFile, BundleWriterOptions, RebuildEntry, RebuildSource};
use uab_io::CancellationToken;

use super::Compression;
use crate::commands::create_output;

#[derive(Args)]
pub struct RebuildArgs {
    /// An input bundle
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// The rebuilt bundle
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Compression of the data chunks
    #[arg(long, value_enum, default_value_t)]
    compression: Compression,

    /// Replace an entry with the contents of a file, as NAME=PATH
    #[arg(long, value_name = "NAME=PATH")]
    replace: Vec<String>,

    /// Drop an entry
    #[arg(long, value_name = "NAME")]
    remove: Vec<String>,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl RebuildArgs {
    pub fn handle(&self) -> Result<()> {
        let f = File::open(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", &self.file.display()))?;
        let mut bundle = BundleFile::new(BufReader::new(f))?;

        let mut entries = RebuildEntry::keep_all(&bundle);
        entries.retain(|entry| !self.remove.contains(&entry.path));

        for replacement in &self.replace {
            let (name, path) = replacement
                .split_once('=')
                .ok_or(miette!("expected NAME=PATH, got {replacement}"))?;
            let bytes = std::fs::read(path)
                .into_diagnostic()
                .context(format!("reading {path}"))?;
            match entries.iter_mut().find(|entry| entry.path == name) {
                Some(entry) => entry.source = RebuildSource::Bytes(bytes),
                None => {
                    warn!("{name} is not in the bundle, appending it");
                    entries.push(RebuildEntry {
                        path: name.to_string(),
                        flags: 0,
                        source: RebuildSource::Bytes(bytes),
                    });
                }
            }
        }

        let options = BundleWriterOptions::matching(bundle.header(), self.compression.into());
        let mut out = create_output(&self.output, self.overwrite)?;
        info!("rebuilding into {}", self.output.display());
        let written = rebuild(&mut bundle, entries, options, &mut out, &CancellationToken::new())
            .context("rebuilding bundle")?;
        if !written {
            return Err(miette!("rebuild was cancelled"));
        }
        Ok(())
    }
}
