use clap::Args;
use miette::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use uab_registry::ClassId;
use uab_serialized::{SerializedFile, TreeNode, TypeTree};

#[derive(Args)]
pub struct InfoArgs {
    /// A serialized file or a bundle holding some
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Print the type tree of every type
    #[arg(long, default_value_t = false)]
    trees: bool,

    /// Print every row of the object table
    #[arg(long, default_value_t = false)]
    objects: bool,
}

impl InfoArgs {
    pub fn handle(&self) -> Result<()> {
        let (_, containers) = super::load(&self.file)?;

        for container in containers {
            let file = container.file();
            println!("{}", container.name().bold());
            print_header(file);

            println!("  {}", "types".underline());
            for (index, ty) in file.types.iter().enumerate() {
                let nodes = ty.tree.as_ref().map_or(0, |tree| tree.nodes.len());
                println!(
                    "  {index:>4} {} ({} nodes)",
                    ClassId(ty.class_id).cyan(),
                    nodes
                );
                if let Some(tree) = ty.tree.as_ref().filter(|_| self.trees) {
                    for root in tree.outline() {
                        print_tree(tree, &root, 3);
                    }
                }
            }

            if self.objects {
                println!("  {}", "objects".underline());
                for object in &file.objects {
                    println!(
                        "  {:>20} {:>10} {:>8} {}",
                        object.path_id,
                        object.byte_start,
                        object.byte_size,
                        ClassId(object.class_id).cyan()
                    );
                }
            } else {
                println!("  {} objects", file.objects.len());
            }

            if !file.externals.is_empty() {
                println!("  {}", "externals".underline());
                for (index, external) in file.externals.iter().enumerate() {
                    println!("  {:>4} {}", index + 1, external.path.green());
                }
            }

            for ty in &file.ref_types {
                let name = [ty.namespace.as_deref(), ty.class_name.as_deref()]
                    .into_iter()
                    .flatten()
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join(".");
                println!(
                    "  ref type {} in {}",
                    name.yellow(),
                    ty.assembly.as_deref().unwrap_or("?")
                );
            }
        }
        Ok(())
    }
}

fn print_header(file: &SerializedFile) {
    let header = &file.header;
    println!(
        "  version {} {:?} engine {} platform {}",
        file.version(),
        header.endian,
        file.unity_version,
        file.target_platform
    );
    println!(
        "  metadata {} bytes, data at {}, {} bytes total",
        header.metadata_size, header.data_offset, header.file_size
    );
}

fn print_tree(tree: &TypeTree, node: &TreeNode, indent: usize) {
    let entry = &tree.nodes[node.index];
    println!(
        "{:indent$}{} {} {}",
        "",
        entry.type_name.dimmed(),
        entry.name,
        entry.byte_size,
        indent = indent * 2
    );
    for child in &node.children {
        print_tree(tree, child, indent + 1);
    }
}
