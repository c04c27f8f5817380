pub mod bundle;
pub mod serialized;

use std::{fs::File, path::Path};

use miette::{Context, IntoDiagnostic, Result};

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Handle bundle files
    Bundle {
        #[command(subcommand)]
        command: bundle::BundleCommands,
    },
    /// Handle serialized files, loose or inside a bundle
    Serialized {
        #[command(subcommand)]
        command: serialized::SerializedCommands,
    },
}

impl Commands {
    pub fn handle(&self) -> Result<()> {
        match self {
            Commands::Bundle { command } => command.handle(),
            Commands::Serialized { command } => command.handle(),
        }
    }
}

/// Create `path`, refusing to replace an existing file unless `overwrite` is set
pub(crate) fn create_output(path: &Path, overwrite: bool) -> Result<File> {
    if overwrite {
        File::create(path)
    } else {
        File::create_new(path)
    }
    .into_diagnostic()
    .context(format!("creating {}", path.display()))
}
