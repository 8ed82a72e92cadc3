//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `create-bucket`, `list` and `download`.
//!
//! Examples:
//! ```bash
//! storage-cli create-bucket my-bucket --if-exists update --label team=data
//! storage-cli list     gs://my-bucket/dir/ --filter files --reg-exp '.*\.csv'
//! storage-cli list     gs://my-bucket/ --listing-type flat
//! storage-cli download gs://my-bucket/dir/file.csv --artifact-dir ./out
//!
//! # Serve every address from a local directory tree instead of GCS
//! storage-cli --fs-root /srv/buckets list gs://my-bucket/
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use storage_tasks::{
    connection_for, BlobFilter, BucketSpec, CreateBucket, DownloadBlob, ExecutionContext,
    ExistencePolicy, ListBlobs, ListingMode, LocalRunContext, TaskConfig,
};

/// Parse a `key=value` pair.
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .with_context(|| format!("invalid KEY=VALUE: no `=` found in `{}`", s))?;
    Ok((key.to_string(), value.to_string()))
}

// -- Commands

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Serve every address from this local directory tree (one sub-directory per bucket).
    #[arg(long = "fs-root", value_name = "DIR", global = true)]
    fs_root: Option<PathBuf>,

    /// Directory where downloads allocate their temp files.
    #[arg(long = "temp-dir", value_name = "DIR", global = true)]
    temp_dir: Option<PathBuf>,

    /// Template variable, usable as `{{ name }}` in any input. Repeatable.
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_val, global = true)]
    vars: Vec<(String, String)>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a bucket, or update / skip it if it already exists.
    CreateBucket {
        /// Bucket name (e.g. my-new-bucket)
        name: String,

        /// What to do when the bucket already exists.
        #[arg(long = "if-exists", value_enum, default_value_t = ExistencePolicy::Error)]
        if_exists: ExistencePolicy,

        #[arg(long)]
        location: Option<String>,

        #[arg(long = "storage-class")]
        storage_class: Option<String>,

        #[arg(long)]
        versioning: Option<bool>,

        #[arg(long = "requester-pays")]
        requester_pays: Option<bool>,

        /// Bucket label. Repeatable.
        #[arg(long = "label", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        labels: Vec<(String, String)>,
    },

    /// List blobs under an address, e.g. gs://my-bucket/dir/
    List {
        from: String,

        /// Include every version of each object.
        #[arg(long = "all-versions")]
        all_versions: Option<bool>,

        #[arg(long = "listing-type", value_enum, default_value_t = ListingMode::Directory)]
        listing_type: ListingMode,

        #[arg(long, value_enum, default_value_t = BlobFilter::Both)]
        filter: BlobFilter,

        /// Regular expression that the full blob address must match.
        #[arg(long = "reg-exp")]
        reg_exp: Option<String>,
    },

    /// Download one blob, e.g. gs://my-bucket/dir/file.csv
    Download {
        from: String,

        /// Where the downloaded file is kept.
        #[arg(long = "artifact-dir", value_name = "DIR")]
        artifact_dir: Option<PathBuf>,
    },
}

/// Print `value` as pretty JSON on stdout, exiting quietly on a broken pipe.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match writeln!(io::stdout(), "{}", json) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => std::process::exit(0),
        Err(e) => Err(e.into()),
    }
}

/// Main CLI function
#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",        // no -v: WARN level
        1 => "info",        // -v: INFO level
        _ => "debug",       // -vv or more: DEBUG level
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    // Command-line flags override the environment
    let mut config = TaskConfig::from_env();
    if cli.fs_root.is_some() {
        config.fs_root = cli.fs_root;
    }
    if cli.temp_dir.is_some() {
        config.temp_dir = cli.temp_dir;
    }

    match cli.cmd {
        Command::CreateBucket {
            name,
            if_exists,
            location,
            storage_class,
            versioning,
            requester_pays,
            labels,
        } => {
            let ctx = LocalRunContext::new(config.artifact_dir_or_default()).with_variables(cli.vars);
            let task = CreateBucket {
                spec: BucketSpec {
                    name,
                    location,
                    storage_class,
                    versioning_enabled: versioning,
                    requester_pays,
                    labels: (!labels.is_empty()).then(|| labels.into_iter().collect()),
                },
                if_exists,
            };

            let conn = connection_for(&format!("gs://{}", ctx.render(&task.spec.name)?), &config).await?;
            let output = task.run(&ctx, &conn).await?;
            print_json(&output)?;
        }

        Command::List {
            from,
            all_versions,
            listing_type,
            filter,
            reg_exp,
        } => {
            let ctx = LocalRunContext::new(config.artifact_dir_or_default()).with_variables(cli.vars);
            let mut task = ListBlobs::new(from);
            task.options.include_all_versions = all_versions;
            task.options.listing_mode = listing_type;
            task.options.filter = filter;
            task.options.match_pattern = reg_exp;

            let conn = connection_for(&ctx.render(&task.from)?, &config).await?;
            let output = task.run(&ctx, &conn).await?;
            for counter in ctx.metrics() {
                info!("{}={}", counter.name, counter.value);
            }
            print_json(&output)?;
        }

        Command::Download { from, artifact_dir } => {
            let artifact_dir = artifact_dir.unwrap_or_else(|| config.artifact_dir_or_default());
            let ctx = LocalRunContext::new(artifact_dir).with_variables(cli.vars);
            let mut task = DownloadBlob::new(from);
            task.temp_dir = config.temp_dir.clone();

            let conn = connection_for(&ctx.render(&task.from)?, &config).await?;
            let output = task.run(&ctx, &conn).await?;
            print_json(&output)?;
        }
    }

    Ok(())
}
