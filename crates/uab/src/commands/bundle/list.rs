use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use std::{fs::File, io::BufReader, path::PathBuf};
use uab_bundle::BundleFile;

#[derive(Args)]
pub struct ListArgs {
    /// An input bundle
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Also list the compressed chunks
    #[arg(long, default_value_t = false)]
    chunks: bool,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let f = File::open(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", &self.file.display()))?;
        let bundle = BundleFile::new(BufReader::new(f))?;

        let header = bundle.header();
        println!(
            "{} {} version {} ({}, {})",
            self.file.display().bold(),
            header.signature.cyan(),
            header.version,
            header.player_version,
            header.engine_version
        );
        println!(
            "{} entries, {} bytes decompressed",
            bundle.len(),
            bundle.decompressed_size()
        );

        if self.chunks {
            for (index, info) in bundle.block_infos().iter().enumerate() {
                let kind = info
                    .flags
                    .compression()
                    .map(|kind| format!("{kind:?}"))
                    .unwrap_or_else(|_| "unknown".to_string());
                println!(
                    "  chunk {index:>4} {:>10} -> {:>10} {}",
                    info.compressed_size,
                    info.decompressed_size,
                    kind.dimmed()
                );
            }
        }

        for block in bundle.blocks() {
            println!(
                "  {:>10} {:>10} {:#06x} {}",
                block.offset,
                block.size,
                block.flags,
                block.path.green()
            );
        }
        Ok(())
    }
}
