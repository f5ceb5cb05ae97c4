//! Metafix - find and safely repair whitespace in DHIS2 metadata.
//!
//! Every command starts from a fresh scan of the server, so `check` and `fix`
//! always operate on current data.

mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metafix_core::config::BatchConfig;
use metafix_core::{
    CollectionType, Credentials, Dhis2Client, EngineConfig, FieldSelection, ServerConfig, Session,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "metafix")]
#[command(about = "Find and repair leading, trailing, and double spaces in DHIS2 metadata")]
struct Args {
    /// Base URL of the DHIS2 instance
    #[arg(long, env = "METAFIX_BASE_URL")]
    base_url: String,

    /// Username for basic authentication
    #[arg(long, env = "METAFIX_USERNAME", requires = "password")]
    username: Option<String>,

    /// Password for basic authentication
    #[arg(long, env = "METAFIX_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Personal access token (takes precedence over username/password)
    #[arg(long, env = "METAFIX_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Fields to check and repair
    #[arg(long, default_value = "name,shortName,code,description")]
    fields: FieldSelection,

    /// Maximum concurrent requests per batch
    #[arg(long, default_value_t = BatchConfig::BATCH_SIZE)]
    batch_size: usize,

    /// Give up on a single record after this many seconds
    #[arg(long)]
    item_timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List records that need cleaning
    Scan,
    /// Check records for conflicts with other records
    Check(Target),
    /// Check records, then repair every record without conflicts
    Fix {
        #[command(flatten)]
        target: Target,

        /// Print the patches instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(clap::Args, Debug)]
struct Target {
    /// Only this metadata type, e.g. dataElements
    #[arg(long = "type", value_parser = parse_collection)]
    kind: Option<CollectionType>,

    /// Only these record ids
    #[arg(long = "id")]
    ids: Vec<String>,
}

fn parse_collection(s: &str) -> std::result::Result<CollectionType, String> {
    CollectionType::from_api_name(s).ok_or_else(|| format!("unknown metadata type '{}'", s))
}

impl Args {
    fn credentials(&self) -> Credentials {
        match (&self.token, &self.username, &self.password) {
            (Some(token), _, _) => Credentials::Token(token.clone()),
            (None, Some(username), Some(password)) => Credentials::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => Credentials::None,
        }
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_batch_size(self.batch_size)
            .with_item_timeout(self.item_timeout.map(Duration::from_secs))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .compact();
    if std::env::var_os("RUST_LOG").is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
    } else {
        let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
        builder.with_max_level(log_level).init();
    }

    let server = ServerConfig::new(&args.base_url, args.credentials())
        .context("Invalid server configuration")?;
    info!("Connecting to {}", server.base());

    let client = Dhis2Client::new(server)?;
    let mut session = Session::new(Arc::new(client), args.engine_config())
        .with_selection(args.fields)
        .with_progress_observer(Box::new(|progress| {
            debug!(
                "Batch {}/{} done ({:.0}%)",
                progress.chunk_index,
                progress.chunk_count,
                progress.fraction() * 100.0
            );
        }));

    let report = session.scan().await.context("Scan failed")?;
    if report.failed_requests > 0 {
        println!(
            "Warning: {} of {} scan requests failed, results may be incomplete.",
            report.failed_requests, report.requests
        );
    }

    match &args.command {
        Command::Scan => scan(&session),
        Command::Check(target) => check(&mut session, target).await,
        Command::Fix { target, dry_run } => fix(&mut session, target, *dry_run).await,
    }

    Ok(())
}

fn scan(session: &Session) {
    if session.is_empty() {
        println!("No metadata with whitespace problems found.");
        return;
    }
    for collection in session.working_set().collections() {
        print!("{}", render::collection(collection));
    }
    println!(
        "{} objects in {} collections need cleaning.",
        session.working_set().total_objects(),
        session.working_set().kinds().len()
    );
}

/// Resolve the collections and ids a command applies to.
fn targets(session: &Session, target: &Target) -> Vec<(CollectionType, Vec<String>)> {
    let kinds = match target.kind {
        Some(kind) => vec![kind],
        None => session.working_set().kinds(),
    };

    kinds
        .into_iter()
        .map(|kind| {
            let ids = if target.ids.is_empty() {
                session.ids(kind)
            } else if target.kind.is_some() {
                target.ids.clone()
            } else {
                session
                    .ids(kind)
                    .into_iter()
                    .filter(|id| target.ids.contains(id))
                    .collect()
            };
            (kind, ids)
        })
        .filter(|(_, ids)| !ids.is_empty())
        .collect()
}

async fn check(session: &mut Session, target: &Target) {
    let targets = targets(session, target);
    if targets.is_empty() {
        println!("Nothing to check.");
        return;
    }

    for (kind, ids) in targets {
        let summary = session.check_many(kind, &ids).await;
        println!("{}: {}", kind.title(), summary.message());
        if !summary.conflicts.is_empty() {
            print!("{}", render::conflicts(&summary.conflicts));
        }
        if !summary.failures.is_empty() {
            print!("{}", render::failures(&summary.failures));
        }
    }
}

async fn fix(session: &mut Session, target: &Target, dry_run: bool) {
    let targets = targets(session, target);
    if targets.is_empty() {
        println!("Nothing to fix.");
        return;
    }

    let mut fixed = 0;
    let mut failed = 0;
    for (kind, ids) in targets {
        let checked = session.check_many(kind, &ids).await;
        if checked.conflicted > 0 {
            println!(
                "{}: skipping {} objects with conflicts.",
                kind.title(),
                checked.conflicted
            );
            print!("{}", render::conflicts(&checked.conflicts));
        }

        let ready: Vec<String> = ids
            .into_iter()
            .filter(|id| session.can_repair(kind, id))
            .collect();

        if dry_run {
            for (id, operations) in session.plan(kind, &ready) {
                print!("{}", render::planned(&id, &operations));
            }
            continue;
        }

        let summary = session.fix_many(kind, &ready).await;
        println!("{}: {}", kind.title(), summary.message());
        if !summary.failures.is_empty() {
            print!("{}", render::failures(&summary.failures));
        }
        fixed += summary.succeeded();
        failed += summary.failed;
    }

    if !dry_run {
        println!("{} objects fixed, {} objects failed.", fixed, failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_engine_config() {
        let args = Args::try_parse_from(["metafix", "--base-url", "http://localhost:8080", "scan"])
            .unwrap();
        assert_eq!(args.batch_size, BatchConfig::BATCH_SIZE);
        assert_eq!(args.engine_config().batch_size, BatchConfig::BATCH_SIZE);
        assert_eq!(args.fields, FieldSelection::all());
    }

    #[test]
    fn test_token_takes_precedence_over_basic_auth() {
        let args = Args::try_parse_from([
            "metafix",
            "--base-url",
            "http://localhost:8080",
            "--username",
            "admin",
            "--password",
            "district",
            "--token",
            "d2pat_abc",
            "fix",
            "--type",
            "dataElements",
            "--dry-run",
        ])
        .unwrap();

        assert!(matches!(args.credentials(), Credentials::Token(ref t) if t == "d2pat_abc"));
        match args.command {
            Command::Fix { target, dry_run } => {
                assert!(dry_run);
                assert_eq!(target.kind, Some(CollectionType::DataElements));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
