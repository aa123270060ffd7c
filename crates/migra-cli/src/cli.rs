//! Hand-rolled argv parsing, in the style of the core's teacher CLI: no external arg-parsing
//! crate, a `Command` enum, and a `parse_args`/`print_help` pair.

use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Init,
    New,
    Up,
    Down,
    Status,
    Browse,
}

#[derive(Debug, Clone)]
pub enum Command {
    Help(HelpTopic),
    Init(InitArgs),
    New(NewArgs),
    Up(UpArgs),
    Down(DownArgs),
    Status(StatusArgs),
    Browse(BrowseArgs),
}

#[derive(Debug, Clone)]
pub struct InitArgs {
    pub dir: PathBuf,
    pub config: PathBuf,
}

#[derive(Debug, Clone)]
pub struct NewArgs {
    pub config: PathBuf,
    pub message: String,
    pub author: Option<String>,
    pub tags: Option<String>,
    pub with_down: bool,
    pub ai_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpArgs {
    pub config: PathBuf,
    pub dsn: Option<String>,
    pub steps: Option<usize>,
    pub author: Option<String>,
    pub tags: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct DownArgs {
    pub config: PathBuf,
    pub dsn: Option<String>,
    pub steps: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct StatusArgs {
    pub config: PathBuf,
    pub dsn: Option<String>,
    pub author: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BrowseArgs {
    pub config: PathBuf,
    pub dsn: Option<String>,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1);
    let Some(first) = it.next() else {
        return Ok(Command::Help(HelpTopic::Root));
    };

    match first.as_str() {
        "-h" | "--help" => Ok(Command::Help(HelpTopic::Root)),
        "init" => parse_init(it.map(|s| s.as_str())),
        "new" => parse_new(it.map(|s| s.as_str())),
        "up" => parse_up(it.map(|s| s.as_str())),
        "down" => parse_down(it.map(|s| s.as_str())),
        "status" => parse_status(it.map(|s| s.as_str())),
        "browse" => parse_browse(it.map(|s| s.as_str())),
        other => anyhow::bail!("unknown command: {other}"),
    }
}

fn default_config() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn parse_init<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut dir = PathBuf::from("migrations");
    let mut config = default_config();

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Init)),
            "--dir" => dir = PathBuf::from(require_value(&mut it, "--dir")?),
            _ if token.starts_with("--dir=") => dir = PathBuf::from(token.trim_start_matches("--dir=")),
            "--config" => config = PathBuf::from(require_value(&mut it, "--config")?),
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="))
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(Command::Init(InitArgs { dir, config }))
}

fn parse_new<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = default_config();
    let mut author: Option<String> = None;
    let mut tags: Option<String> = None;
    let mut with_down = true;
    let mut message: Option<String> = None;
    let mut ai_prompt: Option<String> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::New)),
            "--config" => config = PathBuf::from(require_value(&mut it, "--config")?),
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="))
            }
            "--author" => author = Some(require_value(&mut it, "--author")?.to_string()),
            _ if token.starts_with("--author=") => {
                author = Some(token.trim_start_matches("--author=").to_string())
            }
            "--tags" => tags = Some(require_value(&mut it, "--tags")?.to_string()),
            _ if token.starts_with("--tags=") => tags = Some(token.trim_start_matches("--tags=").to_string()),
            "--no-down" => with_down = false,
            "--ai" => ai_prompt = Some(require_value(&mut it, "--ai")?.to_string()),
            _ if token.starts_with("--ai=") => ai_prompt = Some(token.trim_start_matches("--ai=").to_string()),
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other => {
                if message.is_some() {
                    anyhow::bail!("unexpected positional argument: {other}");
                }
                message = Some(other.to_string());
            }
        }
    }

    let Some(message) = message else {
        anyhow::bail!("missing migration message: usage `migra new <message>`");
    };

    Ok(Command::New(NewArgs { config, message, author, tags, with_down, ai_prompt }))
}

fn parse_up<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = default_config();
    let mut dsn: Option<String> = None;
    let mut steps: Option<usize> = None;
    let mut author: Option<String> = None;
    let mut tags: Option<String> = None;
    let mut dry_run = false;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Up)),
            "--config" => config = PathBuf::from(require_value(&mut it, "--config")?),
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="))
            }
            "--dsn" => dsn = Some(require_value(&mut it, "--dsn")?.to_string()),
            _ if token.starts_with("--dsn=") => dsn = Some(token.trim_start_matches("--dsn=").to_string()),
            "--steps" => steps = Some(parse_usize(require_value(&mut it, "--steps")?)?),
            _ if token.starts_with("--steps=") => {
                steps = Some(parse_usize(token.trim_start_matches("--steps="))?)
            }
            "--author" => author = Some(require_value(&mut it, "--author")?.to_string()),
            _ if token.starts_with("--author=") => {
                author = Some(token.trim_start_matches("--author=").to_string())
            }
            "--tags" => tags = Some(require_value(&mut it, "--tags")?.to_string()),
            _ if token.starts_with("--tags=") => tags = Some(token.trim_start_matches("--tags=").to_string()),
            "--dry-run" => dry_run = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(Command::Up(UpArgs { config, dsn, steps, author, tags, dry_run }))
}

fn parse_down<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = default_config();
    let mut dsn: Option<String> = None;
    let mut steps: Option<usize> = None;
    let mut dry_run = false;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Down)),
            "--config" => config = PathBuf::from(require_value(&mut it, "--config")?),
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="))
            }
            "--dsn" => dsn = Some(require_value(&mut it, "--dsn")?.to_string()),
            _ if token.starts_with("--dsn=") => dsn = Some(token.trim_start_matches("--dsn=").to_string()),
            "--steps" => steps = Some(parse_usize(require_value(&mut it, "--steps")?)?),
            _ if token.starts_with("--steps=") => {
                steps = Some(parse_usize(token.trim_start_matches("--steps="))?)
            }
            "--dry-run" => dry_run = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(Command::Down(DownArgs { config, dsn, steps, dry_run }))
}

fn parse_status<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = default_config();
    let mut dsn: Option<String> = None;
    let mut author: Option<String> = None;
    let mut tags: Option<String> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Status)),
            "--config" => config = PathBuf::from(require_value(&mut it, "--config")?),
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="))
            }
            "--dsn" => dsn = Some(require_value(&mut it, "--dsn")?.to_string()),
            _ if token.starts_with("--dsn=") => dsn = Some(token.trim_start_matches("--dsn=").to_string()),
            "--author" => author = Some(require_value(&mut it, "--author")?.to_string()),
            _ if token.starts_with("--author=") => {
                author = Some(token.trim_start_matches("--author=").to_string())
            }
            "--tags" => tags = Some(require_value(&mut it, "--tags")?.to_string()),
            _ if token.starts_with("--tags=") => tags = Some(token.trim_start_matches("--tags=").to_string()),
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(Command::Status(StatusArgs { config, dsn, author, tags }))
}

fn parse_browse<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = default_config();
    let mut dsn: Option<String> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Browse)),
            "--config" => config = PathBuf::from(require_value(&mut it, "--config")?),
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="))
            }
            "--dsn" => dsn = Some(require_value(&mut it, "--dsn")?.to_string()),
            _ if token.starts_with("--dsn=") => dsn = Some(token.trim_start_matches("--dsn=").to_string()),
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(Command::Browse(BrowseArgs { config, dsn }))
}

fn require_value<'a>(it: &mut impl Iterator<Item = &'a str>, flag: &str) -> anyhow::Result<&'a str> {
    it.next().ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

fn parse_usize(raw: &str) -> anyhow::Result<usize> {
    raw.parse::<usize>().map_err(|_| anyhow::anyhow!("invalid numeric value: {raw}"))
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => println!(
            "\
migra - a linear schema migration tool

USAGE:
  migra <COMMAND> [OPTIONS]

COMMANDS:
  init          Create a migration directory and a starter config file
  new <msg>     Author a new revision file
  up            Apply pending migrations
  down          Roll back applied migrations
  status        Show local, applied, and pending revisions
  browse        Interactively browse applied and unapplied revisions

Run `migra <command> --help` for more."
        ),
        HelpTopic::Init => println!(
            "\
USAGE:
  migra init [OPTIONS]

OPTIONS:
  --dir <DIR>       Migration directory to create (default: migrations)
  --config <FILE>   Config file to write (default: migra.toml)
  -h, --help        Print help"
        ),
        HelpTopic::New => println!(
            "\
USAGE:
  migra new <message> [OPTIONS]

OPTIONS:
  --config <FILE>   Config file path (default: migra.toml)
  --author <NAME>   Author recorded in the revision header
  --tags <CSV>      Comma-separated tags recorded in the revision header
  --no-down         Omit the DOWN section body (still emits the marker)
  --ai <PROMPT>     Generate up/down SQL from PROMPT via the configured generator
  -h, --help        Print help"
        ),
        HelpTopic::Up => println!(
            "\
USAGE:
  migra up [OPTIONS]

OPTIONS:
  --config <FILE>   Config file path (default: migra.toml)
  --dsn <DSN>       Database connection string (overrides config/env)
  --steps <N>       Apply at most N pending revisions
  --author <NAME>   Only apply revisions authored by NAME
  --tags <CSV>      Only apply revisions tagged with any of CSV
  --dry-run         Print the plan without applying it
  -h, --help        Print help"
        ),
        HelpTopic::Down => println!(
            "\
USAGE:
  migra down [OPTIONS]

OPTIONS:
  --config <FILE>   Config file path (default: migra.toml)
  --dsn <DSN>       Database connection string (overrides config/env)
  --steps <N>       Roll back at most N applied revisions (default: 1)
  --dry-run         Print the plan without rolling it back
  -h, --help        Print help"
        ),
        HelpTopic::Status => println!(
            "\
USAGE:
  migra status [OPTIONS]

OPTIONS:
  --config <FILE>   Config file path (default: migra.toml)
  --dsn <DSN>       Database connection string (overrides config/env)
  --author <NAME>   Only show revisions authored by NAME
  --tags <CSV>      Only show revisions tagged with any of CSV
  -h, --help        Print help"
        ),
        HelpTopic::Browse => println!(
            "\
USAGE:
  migra browse [OPTIONS]

OPTIONS:
  --config <FILE>   Config file path (default: migra.toml)
  --dsn <DSN>       Database connection string (overrides config/env)
  -h, --help        Print help"
        ),
    }
}
