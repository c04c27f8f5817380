use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::{info, warn};
use uab_registry::{ClassId, Value};

use crate::commands::create_output;

#[derive(Args)]
pub struct DumpArgs {
    /// A serialized file or a bundle holding some
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Only dump objects of this class, by number or name
    #[arg(short, long)]
    class: Option<ClassId>,

    /// Only dump the object with this identifier
    #[arg(short, long)]
    path_id: Option<i64>,

    /// Write one JSON file per object into this directory instead of printing
    #[arg(short, long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Allow overwriting files in the target directory
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl DumpArgs {
    pub fn handle(&self) -> Result<()> {
        let (registry, containers) = super::load(&self.file)?;

        let mut dumped = 0;
        for container in containers {
            for handle in container.objects() {
                if self.class.is_some_and(|class| class != handle.class_id())
                    || self.path_id.is_some_and(|path_id| path_id != handle.path_id())
                {
                    continue;
                }

                let value = match registry.decode_as::<Value>(&handle) {
                    Ok(value) => value,
                    Err(error) => {
                        warn!(path_id = handle.path_id(), %error, "skipping object");
                        continue;
                    }
                };
                let json = serde_json::to_string_pretty(&*value).into_diagnostic()?;

                match &self.directory {
                    Some(directory) => {
                        let dir = directory.join(container.name());
                        std::fs::create_dir_all(&dir)
                            .into_diagnostic()
                            .context(format!("creating {}", dir.display()))?;
                        let p = dir.join(format!("{}.json", handle.path_id()));
                        info!("writing {}", p.display());
                        let mut out = create_output(&p, self.overwrite)?;
                        std::io::Write::write_all(&mut out, json.as_bytes()).into_diagnostic()?;
                    }
                    None => println!("{json}"),
                }
                registry.free(&handle);
                dumped += 1;
            }
        }

        if dumped == 0 {
            return Err(miette!("no objects matched"));
        }
        Ok(())
    }
}
