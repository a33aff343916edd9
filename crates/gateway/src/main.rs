//! DirGate
//!
//! Command-line front end for the confined file gateway.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gateway::audit::{AuditSink, FileAuditSink, TracingAuditSink};
use gateway::config::Config;
use gateway::files::PathResolver;
use gateway::protocol::{Entry, Principal};
use gateway::{AccessControl, FileGateway, ListOptions, ReadOptions, SessionStore};
use serde_json::Value;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// DirGate - confined, audited file browsing.
#[derive(Parser, Debug)]
#[command(name = "dirgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Load and validate the configuration
    CheckConfig,

    /// List a directory through the gateway
    Ls {
        /// Path relative to the allowed directories
        #[arg(default_value = ".")]
        path: String,

        /// Return the whole tree
        #[arg(long, short)]
        recursive: bool,

        /// Page size (defaults to the configured listing limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Number of entries to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        identity: IdentityArgs,
    },

    /// Print a file through the gateway
    Cat {
        /// Path relative to the allowed directories
        path: String,

        /// Text encoding: utf-8, ascii or latin-1
        #[arg(long, short)]
        encoding: Option<String>,

        /// Byte limit (defaults to the configured read limit)
        #[arg(long)]
        limit: Option<u64>,

        #[command(flatten)]
        identity: IdentityArgs,
    },

    /// Evaluate the configured policies for one request
    Can {
        /// Principal identifier
        principal: String,

        /// Resource, e.g. file:reports/q1.txt or directory:reports
        resource: String,

        /// Action, e.g. read or list
        action: String,

        /// Principal attribute (repeatable)
        #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_attr)]
        attrs: Vec<(String, Value)>,
    },
}

/// Principal the CLI acts as.
#[derive(Args, Debug, Clone)]
pub struct IdentityArgs {
    /// Principal identifier
    #[arg(long, default_value = "cli")]
    pub principal: String,

    /// Principal attribute (repeatable)
    #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_attr)]
    pub attrs: Vec<(String, Value)>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    // Initialize tracing; RUST_LOG takes precedence over the config
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckConfig => {
            let resolver = PathResolver::new(config.paths.allowed_directories.iter().cloned());

            println!("Configuration OK");
            println!("Allowed directories:");
            for dir in &config.paths.allowed_directories {
                let status = match resolver.roots().iter().find(|r| r.configured() == dir) {
                    Some(root) => format!("-> {}", root.canonical().display()),
                    None => "(unavailable)".to_string(),
                };
                println!("  {} {}", dir.display(), status);
            }
            println!("Policies: {}", config.policies.len());
            match &config.audit.log_file {
                Some(path) => println!("Audit log: {}", audit_log_path(&config, path).display()),
                None => println!("Audit log: tracing"),
            }
        }
        Commands::Ls {
            path,
            recursive,
            limit,
            offset,
            json,
            identity,
        } => {
            let sessions = session_store(&config);
            let (gateway, _guard) = build_gateway(&config, Arc::clone(&sessions))?;
            let token = open_cli_session(&sessions, &identity);

            let options = ListOptions {
                recursive,
                limit,
                offset,
            };
            let listing = gateway
                .list_directory(&token, &path, options)
                .await
                .with_context(|| format!("Failed to list {}", path))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                for entry in &listing.contents {
                    print_entry(entry, 0);
                }
                println!();
                println!(
                    "{} of {} item(s){}",
                    listing.contents.len(),
                    listing.total_count,
                    if listing.has_more {
                        format!(", more with --offset {}", offset + listing.contents.len())
                    } else {
                        String::new()
                    }
                );
            }
        }
        Commands::Cat {
            path,
            encoding,
            limit,
            identity,
        } => {
            let sessions = session_store(&config);
            let (gateway, _guard) = build_gateway(&config, Arc::clone(&sessions))?;
            let token = open_cli_session(&sessions, &identity);

            let content = gateway
                .read_file(&token, &path, ReadOptions { encoding, limit })
                .await
                .with_context(|| format!("Failed to read {}", path))?;
            print!("{}", content);
        }
        Commands::Can {
            principal,
            resource,
            action,
            attrs,
        } => {
            let access = AccessControl::from_documents(config.policies.iter().cloned())
                .context("Failed to load access policies")?;
            let principal = attrs
                .into_iter()
                .fold(Principal::new("cli", principal, u64::MAX), |p, (key, value)| {
                    p.with_attribute(key, value)
                });

            match access.matching_policy(&principal, &resource, &action) {
                Some(policy) => println!("allow (policy {:?})", policy.id()),
                None => println!("deny"),
            }
        }
    }

    Ok(())
}

/// Build a gateway with the configured audit sink.
///
/// The returned guard must outlive the gateway so buffered audit records are
/// flushed.
fn build_gateway(
    config: &Config,
    sessions: Arc<SessionStore>,
) -> anyhow::Result<(FileGateway<Arc<SessionStore>>, Option<WorkerGuard>)> {
    let (sink, guard): (Arc<dyn AuditSink>, Option<WorkerGuard>) = match &config.audit.log_file {
        Some(path) => {
            let (sink, guard) = FileAuditSink::open(&audit_log_path(config, path))?;
            (Arc::new(sink), Some(guard))
        }
        None => (Arc::new(TracingAuditSink), None),
    };

    let gateway = FileGateway::from_config(config, sessions, sink)?;
    Ok((gateway, guard))
}

/// Relative audit log paths live under the data directory.
fn audit_log_path(config: &Config, path: &std::path::Path) -> PathBuf {
    config.daemon.data_dir.join(path)
}

/// Session store issuing sessions for the configured duration.
fn session_store(config: &Config) -> Arc<SessionStore> {
    Arc::new(SessionStore::new().with_default_duration(config.session.duration()))
}

/// Issue a session for the CLI identity.
fn open_cli_session(sessions: &SessionStore, identity: &IdentityArgs) -> String {
    let token = sessions.issue_session(&identity.principal, Vec::new());
    for (key, value) in &identity.attrs {
        sessions.set_attribute(&token, key.clone(), value.clone());
    }
    token
}

/// Parse a `key=value` attribute. JSON values (numbers, booleans) keep their
/// type; anything else is a string.
fn parse_attr(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", s))?;
    if key.is_empty() {
        return Err(format!("empty attribute key in {:?}", s));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn print_entry(entry: &Entry, depth: usize) {
    match entry {
        Entry::File(file) => {
            println!(
                "{} {:>10}  {}{}",
                file.permissions,
                file.size,
                "  ".repeat(depth),
                file.name
            );
        }
        Entry::Directory(dir) => {
            println!(
                "{} {:>10}  {}{}/{}",
                dir.permissions,
                "-",
                "  ".repeat(depth),
                dir.name,
                if dir.truncated { " ..." } else { "" }
            );
            for child in &dir.contents {
                print_entry(child, depth + 1);
            }
        }
    }
}
