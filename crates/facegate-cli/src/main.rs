use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{IntegrityScanner, ScanMode};
use facegate_store::SqliteTemplateStore;
use std::path::PathBuf;

// `#[zbus::proxy]` generates `FacegateProxy` (async) and
// `FacegateProxyBlocking`; the CLI uses the async one.
#[zbus::proxy(
    interface = "org.facegate.Facegate1",
    default_service = "org.facegate.Facegate1",
    default_path = "/org/facegate/Facegate1"
)]
trait Facegate {
    async fn enroll(&self, subject_id: &str, image: &[u8]) -> zbus::Result<String>;
    async fn verify(&self, subject_id: &str, image: &[u8]) -> zbus::Result<String>;
    async fn verify_with_threshold(
        &self,
        subject_id: &str,
        image: &[u8],
        threshold: f64,
    ) -> zbus::Result<String>;
    async fn repair(&self, dry_run: bool) -> zbus::Result<String>;
    async fn template_state(&self, subject_id: &str) -> zbus::Result<String>;
    async fn remove_template(&self, subject_id: &str) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facegate", about = "Facegate biometric template CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll (or re-enroll) a subject from an aligned face crop
    Enroll {
        /// Subject (employee) id
        subject: String,
        /// Path to the 112x112 grayscale face crop
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Verify a face crop against a subject's template
    Verify {
        /// Subject (employee) id
        subject: String,
        /// Path to the 112x112 grayscale face crop
        #[arg(short, long)]
        image: PathBuf,
        /// Override the daemon's similarity threshold
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Show whether a subject's template is absent, valid or corrupted
    State {
        /// Subject (employee) id
        subject: String,
    },
    /// Remove a subject's template
    Remove {
        /// Subject (employee) id
        subject: String,
    },
    /// Repair or clear corrupted templates
    Repair {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
        /// Scan this database directly instead of asking the daemon
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Offline repair needs no daemon.
    if let Commands::Repair {
        dry_run,
        db: Some(path),
    } = &cli.command
    {
        return repair_offline(path, *dry_run);
    }

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("connecting to D-Bus")?;
    let proxy = FacegateProxy::new(&conn)
        .await
        .context("facegated is not reachable")?;

    match cli.command {
        Commands::Enroll { subject, image } => {
            let bytes = read_image(&image)?;
            print_json(&proxy.enroll(&subject, &bytes).await?)?;
        }
        Commands::Verify {
            subject,
            image,
            threshold,
        } => {
            let bytes = read_image(&image)?;
            let body = match threshold {
                Some(t) => proxy.verify_with_threshold(&subject, &bytes, t).await?,
                None => proxy.verify(&subject, &bytes).await?,
            };
            print_json(&body)?;
        }
        Commands::State { subject } => {
            println!("{subject}: {}", proxy.template_state(&subject).await?);
        }
        Commands::Remove { subject } => {
            if proxy.remove_template(&subject).await? {
                println!("Removed template for {subject}");
            } else {
                println!("No template on file for {subject}");
            }
        }
        Commands::Repair { dry_run, .. } => {
            print_json(&proxy.repair(dry_run).await?)?;
        }
        Commands::Status => {
            print_json(&proxy.status().await?)?;
        }
    }

    Ok(())
}

/// Scan a template database in place, without the daemon or a model.
fn repair_offline(path: &std::path::Path, dry_run: bool) -> Result<()> {
    // Opening would create an empty database at a mistyped path.
    if !path.is_file() {
        anyhow::bail!("template database {} does not exist", path.display());
    }
    let store = SqliteTemplateStore::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mode = if dry_run {
        ScanMode::DryRun
    } else {
        ScanMode::Repair
    };
    tracing::debug!(path = %path.display(), ?mode, "offline integrity scan");
    let report = IntegrityScanner::new(&store).scan(mode)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_image(path: &std::path::Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading image {}", path.display()))
}

/// Pretty-print a JSON body from the daemon.
fn print_json(body: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(body).context("daemon sent invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verify_with_threshold() {
        let cli =
            Cli::try_parse_from(["facegate", "verify", "E1", "-i", "crop.raw", "-t", "0.8"]).unwrap();
        match cli.command {
            Commands::Verify {
                subject, threshold, ..
            } => {
                assert_eq!(subject, "E1");
                assert_eq!(threshold, Some(0.8));
            }
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn test_parse_offline_repair() {
        let cli = Cli::try_parse_from(["facegate", "repair", "--dry-run", "--db", "/tmp/t.db"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Repair { dry_run: true, db: Some(_) }
        ));
        assert!(!cli.system);
    }

    #[test]
    fn test_offline_repair_refuses_missing_database() {
        let dir = std::env::temp_dir().join(format!("facegate-cli-missing-{}", std::process::id()));
        let path = dir.join("templates.db");
        let err = repair_offline(&path, true).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(!dir.exists());
    }

    #[test]
    fn test_enroll_requires_image() {
        assert!(Cli::try_parse_from(["facegate", "enroll", "E1"]).is_err());
    }
}
