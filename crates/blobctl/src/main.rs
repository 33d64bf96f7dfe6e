//! blobctl - offline maintenance for a blobstore storage directory
//!
//! Subcommands:
//! - `blobctl migrate <names>` - Bring metadata up to the current schema
//! - `blobctl purge <names>` - Remove expired items matching all given criteria
//! - `blobctl consistency <names>` - Compare stored size and hash with the data
//! - `blobctl info <names>` - Print every metadata key
//! - `blobctl set <names>` - Force the lock or completion flags
//!
//! Every subcommand takes one or more item names, or `*` for all items.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use blobstore::maintenance::{self, ConsistencyOptions, PurgeCriteria};
use blobstore::{Clock, FileStore, ItemName, Storage, StoreConfig, SystemClock};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "blobctl")]
#[command(about = "Maintenance CLI for blobstore storage")]
#[command(version)]
struct Cli {
    /// TOML file with a [storage] section (default: BLOBSTORE_* environment)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate metadata to the current schema
    Migrate(Targets),

    /// Remove items whose lifetime is over and that match all criteria
    Purge {
        #[command(flatten)]
        targets: Targets,

        /// Only report what would be removed
        #[arg(short = 'D', long)]
        dry_run: bool,

        /// Uploaded more than this many days ago
        #[arg(short = 'A', long, value_name = "DAYS")]
        age: Option<i64>,

        /// Not downloaded for more than this many days
        #[arg(short = 'I', long, value_name = "DAYS")]
        inactivity: Option<i64>,

        /// Larger than this many MiB
        #[arg(short = 'S', long, value_name = "MIB")]
        size: Option<u64>,

        /// Content type starting with this prefix
        #[arg(short = 'T', long = "type", value_name = "PREFIX")]
        type_prefix: Option<String>,
    },

    /// Check stored size and hash against the data
    Consistency {
        #[command(flatten)]
        targets: Targets,

        /// Fill in an empty hash
        #[arg(short = 'C', long)]
        compute: bool,

        /// Overwrite wrong size and hash
        #[arg(short = 'F', long)]
        fix: bool,

        /// Remove items that are still inconsistent
        #[arg(short = 'R', long)]
        remove: bool,
    },

    /// Print all metadata of items
    Info(Targets),

    /// Set or clear the lock and completion flags
    Set {
        #[command(flatten)]
        targets: Targets,

        /// Lock the items
        #[arg(short = 'L', long, conflicts_with = "unlock")]
        lock: bool,

        /// Unlock the items
        #[arg(short = 'l', long)]
        unlock: bool,

        /// Mark the items complete
        #[arg(short = 'C', long, conflicts_with = "incomplete")]
        complete: bool,

        /// Mark the items incomplete
        #[arg(short = 'c', long)]
        incomplete: bool,
    },
}

#[derive(Args)]
struct Targets {
    /// Item names, or `*` for every item
    #[arg(required = true)]
    names: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::from_env()?,
    };
    tracing::debug!(storage_dir = %config.storage_dir.display(), "Opening storage");
    let storage = FileStore::new(config).context("failed to open storage")?;

    let failed = run(&storage, cli.command)?;
    if failed > 0 {
        bail!("{failed} item(s) failed");
    }
    Ok(())
}

/// Apply a command to each target, logging per-item failures and continuing.
///
/// Returns the number of items that failed.
fn run(storage: &dyn Storage, command: Commands) -> Result<usize> {
    let now = SystemClock.now();
    let (targets, action): (Targets, Box<dyn Fn(&ItemName) -> Result<()> + '_>) = match command {
        Commands::Migrate(targets) => (
            targets,
            Box::new(move |name: &ItemName| {
                let migration = maintenance::migrate(storage, name, now)?;
                if !migration.is_noop() {
                    println!(
                        "{name}: filled [{}] dropped [{}]",
                        migration.filled.join(", "),
                        migration.dropped.join(", ")
                    );
                }
                Ok(())
            }),
        ),
        Commands::Purge {
            targets,
            dry_run,
            age,
            inactivity,
            size,
            type_prefix,
        } => {
            let criteria = PurgeCriteria {
                age_days: age,
                inactivity_days: inactivity,
                size_mib: size,
                type_prefix,
                dry_run,
            };
            (
                targets,
                Box::new(move |name: &ItemName| {
                    let decision = maintenance::purge(storage, name, &criteria, now)?;
                    if decision.purge {
                        let verb = if decision.removed { "removed" } else { "would remove" };
                        println!(
                            "{verb} {name} {:?} {} bytes {}",
                            decision.filename, decision.size, decision.content_type
                        );
                    }
                    Ok(())
                }),
            )
        }
        Commands::Consistency {
            targets,
            compute,
            fix,
            remove,
        } => {
            let options = ConsistencyOptions {
                compute,
                fix,
                remove,
            };
            (
                targets,
                Box::new(move |name: &ItemName| {
                    let report = maintenance::consistency(storage, name, options)?;
                    let state = if report.removed {
                        "removed"
                    } else if report.is_consistent() {
                        "ok"
                    } else {
                        "INCONSISTENT"
                    };
                    let hash = if report.hash_written {
                        "written"
                    } else if report.hash_consistent {
                        "ok"
                    } else {
                        "mismatch"
                    };
                    println!(
                        "{name}: {state} size {}/{} hash {hash}",
                        report.meta_size, report.data_size
                    );
                    Ok(())
                }),
            )
        }
        Commands::Info(targets) => (
            targets,
            Box::new(move |name: &ItemName| {
                let map = maintenance::info(storage, name)?;
                println!("{name}: {}", serde_json::to_string_pretty(&map)?);
                Ok(())
            }),
        ),
        Commands::Set {
            targets,
            lock,
            unlock,
            complete,
            incomplete,
        } => {
            let locked = flag(lock, unlock);
            let complete = flag(complete, incomplete);
            if locked.is_none() && complete.is_none() {
                bail!("set needs at least one of --lock, --unlock, --complete, --incomplete");
            }
            (
                targets,
                Box::new(move |name: &ItemName| {
                    let meta = maintenance::set_flags(storage, name, complete, locked)?;
                    println!("{name}: complete={} locked={}", meta.complete, meta.locked);
                    Ok(())
                }),
            )
        }
    };

    let names = maintenance::resolve_names(storage, &targets.names)?;
    let mut failed = 0;
    for name in &names {
        if let Err(e) = action(name) {
            tracing::error!(item.name = %name, error = %e, "Maintenance failed");
            failed += 1;
        }
    }
    Ok(failed)
}

fn flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_purge() {
        let cli = Cli::try_parse_from([
            "blobctl", "purge", "-D", "-A", "30", "-T", "image/", "*",
        ])
        .unwrap();
        match cli.command {
            Commands::Purge {
                targets,
                dry_run,
                age,
                inactivity,
                type_prefix,
                ..
            } => {
                assert_eq!(targets.names, vec!["*"]);
                assert!(dry_run);
                assert_eq!(age, Some(30));
                assert_eq!(inactivity, None);
                assert_eq!(type_prefix.as_deref(), Some("image/"));
            }
            _ => panic!("expected purge"),
        }
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let cli =
            Cli::try_parse_from(["blobctl", "info", "abcdefgh", "--config", "/etc/blob.toml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/blob.toml")));
        assert!(matches!(cli.command, Commands::Info(t) if t.names == vec!["abcdefgh"]));
    }

    #[test]
    fn test_names_required() {
        assert!(Cli::try_parse_from(["blobctl", "migrate"]).is_err());
    }

    #[test]
    fn test_set_flags_conflict() {
        assert!(Cli::try_parse_from(["blobctl", "set", "-L", "-l", "abcdefgh"]).is_err());
        assert!(Cli::try_parse_from(["blobctl", "set", "-C", "-c", "abcdefgh"]).is_err());

        let cli = Cli::try_parse_from(["blobctl", "set", "-L", "-c", "abcdefgh"]).unwrap();
        match cli.command {
            Commands::Set {
                lock,
                unlock,
                complete,
                incomplete,
                ..
            } => {
                assert_eq!(flag(lock, unlock), Some(true));
                assert_eq!(flag(complete, incomplete), Some(false));
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn test_consistency_flags() {
        let cli = Cli::try_parse_from(["blobctl", "consistency", "-C", "-R", "a", "b"]).unwrap();
        match cli.command {
            Commands::Consistency {
                targets,
                compute,
                fix,
                remove,
            } => {
                assert_eq!(targets.names, vec!["a", "b"]);
                assert!(compute && remove && !fix);
            }
            _ => panic!("expected consistency"),
        }
    }
}
