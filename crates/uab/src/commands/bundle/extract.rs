use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use std::{fs::File, io::BufReader, path::PathBuf};
use tracing::info;
use uab_bundle::BundleFile;

use crate::commands::create_output;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input bundle
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let f = File::open(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", &self.file.display()))?;
        let mut bundle = BundleFile::new(BufReader::new(f))?;

        for index in 0..bundle.len() {
            let entry = bundle.by_index(index)?;

            let p = self.directory.join(entry.name());
            info!("writing {}", p.display());

            let parent = p
                .parent()
                .ok_or(miette!("{} has no parent directory", p.display()))?;
            std::fs::create_dir_all(parent)
                .into_diagnostic()
                .context(format!("creating {}", parent.display()))?;

            let mut out = create_output(&p, self.overwrite)?;
            std::io::copy(&mut entry.into_bytes().as_slice(), &mut out).into_diagnostic()?;
        }
        Ok(())
    }
}
