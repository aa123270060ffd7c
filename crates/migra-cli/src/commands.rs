//! Implementations of `new`, `up`, `down`, and `status` — the CLI front-end's collaboration
//! with the core's [`migra::Coordinator`], [`migra::MigrationGraph`], and provider layer.

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use comfy_table::{Table, presets::UTF8_FULL};

use migra::filename::slugify;
use migra::filter::tags_from_csv;
use migra::provider::connect;
use migra::{BrowseEntry, Coordinator, MigrationGraph, Revision, RevisionFilter};

use crate::cli::{DownArgs, NewArgs, StatusArgs, UpArgs};
use crate::config::Config;
use crate::generator::{Generator, UnconfiguredGenerator};

fn resolve_filter(author: Option<String>, tags: Option<String>) -> RevisionFilter {
    RevisionFilter {
        author,
        tags: tags.map(|t| tags_from_csv(&t)),
        since: None,
    }
}

/// Generates an opaque, unique revision id: a 12-character slug of the message plus the
/// instant it was authored. Unlike `{slug}` in the filename pattern (C2), this value becomes
/// the revision's permanent identity (§3 "Lifecycle"), not just a rendering detail.
fn generate_revision_id(message: &str, created_at: chrono::DateTime<Utc>) -> String {
    slugify(&format!("{message}:{}", created_at.timestamp_nanos_opt().unwrap_or_default()), 12)
}

pub async fn run_new(args: NewArgs) -> anyhow::Result<()> {
    // `migra new` only touches `migration_dir` and `file_format`; a missing dsn should not
    // block authoring a revision offline, so an empty placeholder stands in for it here.
    let cfg = Config::load(&args.config, Some(String::new()))?;

    std::fs::create_dir_all(&cfg.migration_dir)
        .with_context(|| format!("failed to create {}", cfg.migration_dir.display()))?;

    let graph = if cfg.migration_dir.exists() {
        MigrationGraph::build(&cfg.migration_dir)?
    } else {
        MigrationGraph::default()
    };
    let down_revision_id = graph.last()?.map(|r| r.revision_id.clone());

    let created_at = Utc::now();

    let (message, up_sql, down_sql) = match &args.ai_prompt {
        Some(prompt) => {
            let generated = UnconfiguredGenerator.generate(prompt).await?;
            (generated.message, generated.up_sql, generated.down_sql)
        }
        None => (
            args.message.clone(),
            Some("-- TODO: write the forward migration here".to_string()),
            args.with_down
                .then(|| "-- TODO: write the reverse migration here".to_string()),
        ),
    };

    let revision_id = generate_revision_id(&args.message, created_at);

    let revision = Revision {
        revision_id,
        down_revision_id,
        message,
        author: args.author,
        tags: args.tags.map(|t| tags_from_csv(&t)),
        up_sql,
        down_sql,
        created_at,
    };

    let path = Coordinator::save_revision(&cfg.migration_dir, &cfg.file_format, &revision)?;
    println!("wrote {}", path.display());
    Ok(())
}

async fn build_coordinator(config: &PathBuf, dsn: Option<String>) -> anyhow::Result<(Coordinator, Config)> {
    let cfg = Config::load(config, dsn)?;
    let graph = MigrationGraph::build(&cfg.migration_dir)
        .with_context(|| format!("failed to load migrations from {}", cfg.migration_dir.display()))?;
    let provider = connect(&cfg.dsn, &cfg.migration_table).await?;
    Ok((Coordinator::new(graph, provider), cfg))
}

pub async fn run_up(args: UpArgs) -> anyhow::Result<()> {
    let (coordinator, _cfg) = build_coordinator(&args.config, args.dsn).await?;
    let filter = resolve_filter(args.author, args.tags);

    if args.dry_run {
        let planned = coordinator.plan_upgrade(&filter, args.steps).await?;
        if planned.is_empty() {
            println!("no pending migrations");
        } else {
            println!("would apply {} migration(s):", planned.len());
            for r in planned {
                println!("  {} {}", r.revision_id, r.message);
            }
        }
        return Ok(());
    }

    let applied = coordinator.upgrade(&filter, args.steps).await?;
    if applied.is_empty() {
        println!("no pending migrations");
    } else {
        println!("applied {} migration(s):", applied.len());
        for id in applied {
            println!("  {id}");
        }
    }
    Ok(())
}

pub async fn run_down(args: DownArgs) -> anyhow::Result<()> {
    let (coordinator, _cfg) = build_coordinator(&args.config, args.dsn).await?;
    let steps = args.steps.or(Some(1));

    if args.dry_run {
        let planned = coordinator.plan_downgrade(steps).await?;
        if planned.is_empty() {
            println!("no migrations to roll back");
        } else {
            println!("would roll back {} migration(s):", planned.len());
            for r in planned {
                println!("  {} {}", r.revision_id, r.message);
            }
        }
        return Ok(());
    }

    let rolled_back = coordinator.downgrade(steps).await?;
    if rolled_back.is_empty() {
        println!("no migrations rolled back");
    } else {
        println!("rolled back {} migration(s):", rolled_back.len());
        for id in rolled_back {
            println!("  {id}");
        }
    }
    Ok(())
}

pub async fn run_status(args: StatusArgs) -> anyhow::Result<()> {
    let (coordinator, cfg) = build_coordinator(&args.config, args.dsn).await?;
    let filter = resolve_filter(args.author, args.tags);

    let entries = coordinator.combined_view(&filter).await?;
    println!("migration directory: {}", cfg.migration_dir.display());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["revision_id", "status", "created_at", "message"]);

    for entry in &entries {
        table.add_row(vec![
            entry.revision_id().to_string(),
            status_label(entry).to_string(),
            entry.created_at().to_rfc3339(),
            message_of(entry),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn status_label(entry: &BrowseEntry) -> &'static str {
    if entry.is_applied() { "applied" } else { "pending" }
}

fn message_of(entry: &BrowseEntry) -> String {
    match entry {
        BrowseEntry::Applied(r) => r.message.clone(),
        BrowseEntry::NotApplied(r) => r.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::NewArgs;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("migra-cli-commands-test-{label}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn new_args(dir: &std::path::Path, message: &str, ai_prompt: Option<String>) -> NewArgs {
        NewArgs {
            config: dir.join("migra.toml"),
            message: message.to_string(),
            author: Some("ada".to_string()),
            tags: Some("feature".to_string()),
            with_down: true,
            ai_prompt,
        }
    }

    #[tokio::test]
    async fn run_new_writes_a_root_revision_with_todo_bodies() {
        let dir = scratch_dir("root");
        run_new(new_args(&dir, "create users table", None)).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.join("migrations")).unwrap().collect();
        assert_eq!(files.len(), 1);

        let graph = MigrationGraph::build(dir.join("migrations")).unwrap();
        let root = graph.root().unwrap();
        assert!(root.is_root());
        assert_eq!(root.message, "create users table");
        assert!(root.up_sql.as_deref().unwrap().contains("TODO"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn run_new_chains_off_the_existing_leaf() {
        let dir = scratch_dir("chain");
        run_new(new_args(&dir, "first", None)).await.unwrap();
        run_new(new_args(&dir, "second", None)).await.unwrap();

        let graph = MigrationGraph::build(dir.join("migrations")).unwrap();
        let chain = graph.iter().unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].down_revision_id.as_deref(), Some(chain[0].revision_id.as_str()));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn run_new_with_ai_surfaces_the_unconfigured_generator_error() {
        let dir = scratch_dir("ai");
        let err = run_new(new_args(&dir, "ignored", Some("add a users table".to_string())))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no migration generator is configured"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
