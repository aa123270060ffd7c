//! `migra init` — creates the migration directory and a starter `migra.toml`.

use std::path::Path;

use anyhow::Context;

use crate::cli::InitArgs;
use crate::config::{DEFAULT_FILE_FORMAT, DEFAULT_MIGRATION_TABLE};

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    std::fs::create_dir_all(&args.dir)
        .with_context(|| format!("failed to create {}", args.dir.display()))?;
    println!("created migration directory: {}", args.dir.display());

    write_config_template(&args.config, &args.dir)?;
    Ok(())
}

fn write_config_template(path: &Path, migration_dir: &Path) -> anyhow::Result<()> {
    if path.exists() {
        println!("config file already exists, leaving it alone: {}", path.display());
        return Ok(());
    }

    let content = format!(
        "\
dsn = \"${{DATABASE_URL}}\"
migration_dir = \"{}\"
file_format = \"{DEFAULT_FILE_FORMAT}\"
migration_table = \"{DEFAULT_MIGRATION_TABLE}\"
",
        migration_dir.display()
    );

    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}
