use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mien_assets::source::{DEFAULT_CDN_BASE, DEFAULT_MANIFESTS};
use mien_assets::{mirror_assets, probe_model_base, MirrorPlan, SourceCatalog};
use mien_hw::{CameraPlatform, StreamConstraints, StreamStatus, V4l2Platform, VideoStream};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "mien", about = "Mien asset and camera maintenance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror the classification library and model weights to a local directory
    Mirror {
        /// CDN base URL to mirror from
        #[arg(long, default_value = DEFAULT_CDN_BASE)]
        base_url: String,
        /// Destination directory
        #[arg(short, long)]
        dest: PathBuf,
        /// Manifest files to walk for weight shards (relative to <base-url>/weights/)
        #[arg(long)]
        manifest: Vec<String>,
    },
    /// Probe every model source in a catalog and report which are reachable
    Probe {
        /// Source catalog (TOML); omit to probe the built-in CDN cascade
        #[arg(short, long)]
        catalog: Option<PathBuf>,
        /// Cache directory the default cascade's local mirror lives in
        #[arg(long, default_value = "/var/cache/mien")]
        cache_dir: PathBuf,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available video capture devices
    Devices,
    /// Grab a single frame from a device and report its geometry and brightness
    Capture {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Mirror {
            base_url,
            dest,
            manifest,
        } => {
            let mut plan = MirrorPlan::new(base_url, dest);
            if !manifest.is_empty() {
                plan.manifests = manifest;
            }
            let report = mirror_assets(&plan)
                .await
                .context("asset mirroring failed")?;
            println!(
                "Mirrored {} files ({} bytes) to {}",
                report.files_written,
                report.bytes_written,
                plan.dest_dir.display()
            );
        }
        Commands::Probe {
            catalog,
            cache_dir,
            json,
        } => {
            let catalog = match catalog {
                Some(path) => SourceCatalog::load(&path)
                    .await
                    .with_context(|| format!("failed to load catalog {}", path.display()))?,
                None => SourceCatalog::default_cascade(&cache_dir),
            };
            let manifests: Vec<String> = DEFAULT_MANIFESTS.iter().map(|m| m.to_string()).collect();
            let http = reqwest::Client::new();

            let mut results = Vec::new();
            for source in catalog.model_sources() {
                let reachable = probe_model_base(&http, &source.location, &manifests).await;
                results.push((source, reachable));
            }

            if json {
                let report: Vec<serde_json::Value> = results
                    .iter()
                    .map(|(source, reachable)| {
                        serde_json::json!({
                            "id": source.id,
                            "location": source.location,
                            "reachable": reachable,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for (source, reachable) in &results {
                    let mark = if *reachable { "ok" } else { "unreachable" };
                    println!("{:<12} {:<12} {}", source.id, mark, source.location);
                }
            }

            if results.iter().all(|(_, reachable)| !reachable) {
                anyhow::bail!("no model source is reachable");
            }
        }
        Commands::Devices => {
            let devices = V4l2Platform::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for dev in devices {
                println!("{:<14} {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Capture { device } => {
            let platform = V4l2Platform::new(&device);
            let mut stream = platform
                .acquire(&StreamConstraints::default())
                .await
                .with_context(|| format!("failed to open {device}"))?;

            // The capture thread needs a moment to dequeue the first frame.
            let deadline = Instant::now() + Duration::from_secs(5);
            while stream.status() != StreamStatus::Playable {
                if stream.status() == StreamStatus::Ended || Instant::now() >= deadline {
                    stream.stop();
                    anyhow::bail!("no frame from {device} within 5s");
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }

            let frame = stream
                .grab()
                .context("failed to capture frame")?;
            stream.stop();
            println!(
                "Captured {}x{} frame, avg brightness {:.1}",
                frame.width,
                frame.height,
                frame.avg_brightness()
            );
        }
    }

    Ok(())
}
