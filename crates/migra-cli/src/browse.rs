//! `migra browse` — a read-only interactive viewer over the combined applied/pending listing.
//!
//! Selecting an entry shows its detail; there is no action here that mutates state, matching
//! the browse query layer's (C6) read-only contract.

use anyhow::Context;
use dialoguer::Select;
use dialoguer::theme::ColorfulTheme;

use migra::provider::connect;
use migra::{BrowseEntry, Coordinator, MigrationGraph, RevisionFilter};

use crate::cli::BrowseArgs;
use crate::config::Config;

pub async fn run(args: BrowseArgs) -> anyhow::Result<()> {
    let cfg = Config::load(&args.config, args.dsn)?;
    let graph = MigrationGraph::build(&cfg.migration_dir)
        .with_context(|| format!("failed to load migrations from {}", cfg.migration_dir.display()))?;
    let provider = connect(&cfg.dsn, &cfg.migration_table).await?;
    let coordinator = Coordinator::new(graph, provider);

    let entries = coordinator.combined_view(&RevisionFilter::default()).await?;
    if entries.is_empty() {
        println!("no migrations found");
        return Ok(());
    }

    let labels: Vec<String> = entries.iter().map(describe).collect();

    loop {
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("browse migrations (esc/q to quit)")
            .items(&labels)
            .default(0)
            .interact_opt()?;

        let Some(index) = selection else { break };
        print_detail(&entries[index]);
    }

    Ok(())
}

fn describe(entry: &BrowseEntry) -> String {
    let status = if entry.is_applied() { "applied" } else { "pending" };
    format!("[{status}] {} ({})", entry.revision_id(), entry.created_at().to_rfc3339())
}

fn print_detail(entry: &BrowseEntry) {
    match entry {
        BrowseEntry::Applied(r) => {
            println!("revision_id:      {}", r.revision_id);
            println!("down_revision_id: {:?}", r.down_revision_id);
            println!("author:           {:?}", r.author);
            println!("tags:             {:?}", r.tags);
            println!("created_at:       {}", r.created_at.to_rfc3339());
            println!("message:          {}", r.message);
            println!("status:           applied");
        }
        BrowseEntry::NotApplied(r) => {
            println!("revision_id:      {}", r.revision_id);
            println!("down_revision_id: {:?}", r.down_revision_id);
            println!("author:           {:?}", r.author);
            println!("tags:             {:?}", r.tags);
            println!("created_at:       {}", r.created_at.to_rfc3339());
            println!("message:          {}", r.message);
            println!("status:           pending");
            if let Some(up) = &r.up_sql {
                println!("up_sql:\n{up}");
            }
            if let Some(down) = &r.down_sql {
                println!("down_sql:\n{down}");
            }
        }
    }
    println!();
}
