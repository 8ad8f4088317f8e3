//! One-shot asset mirroring job.
//!
//! Downloads the classification library bundle plus every weight manifest
//! and the shards each manifest declares, writing them under a destination
//! directory that mirrors the CDN layout. Runs entirely outside the live
//! runtime; its only effect is to populate a local source the loader's
//! cascade can later find.

use crate::loader::join_location;
use crate::source::{DEFAULT_CDN_BASE, DEFAULT_MANIFESTS, LIBRARY_BUNDLE_PATH};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("request failed for {url}: {source}")]
    Http { url: String, source: reqwest::Error },
    #[error("request failed for {url} with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("manifest {name} is not valid JSON: {source}")]
    Manifest {
        name: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What to mirror and where to put it.
#[derive(Debug, Clone)]
pub struct MirrorPlan {
    /// CDN base URL the assets are fetched from.
    pub base_url: String,
    /// Destination directory; the CDN's relative layout is reproduced below it.
    pub dest_dir: PathBuf,
    /// Library bundle path relative to the base URL.
    pub library_bundle: String,
    /// Weight manifests relative to `<base_url>/weights/`.
    pub manifests: Vec<String>,
}

impl MirrorPlan {
    pub fn new(base_url: impl Into<String>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            dest_dir: dest_dir.into(),
            library_bundle: LIBRARY_BUNDLE_PATH.to_string(),
            manifests: DEFAULT_MANIFESTS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl Default for MirrorPlan {
    fn default() -> Self {
        Self::new(DEFAULT_CDN_BASE, PathBuf::from("mirror"))
    }
}

#[derive(Debug, Default)]
pub struct MirrorReport {
    pub files_written: usize,
    pub bytes_written: u64,
}

/// Weight manifest as served by the CDN. Observed in two shapes: a bare
/// array of weight groups, or an object wrapping the same array under a
/// `weights` key. Shard paths are relative to the manifest's directory.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WeightsManifest {
    Groups(Vec<WeightGroup>),
    Wrapped { weights: Vec<WeightGroup> },
}

#[derive(Debug, Deserialize)]
struct WeightGroup {
    #[serde(default)]
    paths: Vec<String>,
}

impl WeightsManifest {
    fn shard_paths(self) -> Vec<String> {
        let groups = match self {
            WeightsManifest::Groups(groups) => groups,
            WeightsManifest::Wrapped { weights } => weights,
        };
        groups.into_iter().flat_map(|g| g.paths).collect()
    }
}

/// Run the mirroring job to completion. Fails on the first unrecoverable
/// download; partially written files are removed.
pub async fn mirror_assets(plan: &MirrorPlan) -> Result<MirrorReport, MirrorError> {
    let client = reqwest::Client::new();
    let mut report = MirrorReport::default();

    tracing::info!(base = %plan.base_url, dest = %plan.dest_dir.display(), "mirroring classification assets");

    // Library bundle first.
    let bundle_url = join_location(&plan.base_url, &plan.library_bundle);
    let bundle_dest = plan.dest_dir.join(&plan.library_bundle);
    report.bytes_written += download(&client, &bundle_url, &bundle_dest).await?;
    report.files_written += 1;

    // Then every manifest and the shards it declares.
    for manifest_name in &plan.manifests {
        let rel = format!("weights/{manifest_name}");
        let manifest_url = join_location(&plan.base_url, &rel);
        let manifest_dest = plan.dest_dir.join(&rel);
        tracing::info!(url = %manifest_url, "fetching manifest");
        report.bytes_written += download(&client, &manifest_url, &manifest_dest).await?;
        report.files_written += 1;

        let manifest_bytes = tokio::fs::read(&manifest_dest).await?;
        let manifest: WeightsManifest =
            serde_json::from_slice(&manifest_bytes).map_err(|source| MirrorError::Manifest {
                name: manifest_name.clone(),
                source,
            })?;

        for shard in manifest.shard_paths() {
            let shard_rel = format!("weights/{shard}");
            let shard_url = join_location(&plan.base_url, &shard_rel);
            let shard_dest = plan.dest_dir.join(&shard_rel);
            tracing::info!(url = %shard_url, "fetching shard");
            report.bytes_written += download(&client, &shard_url, &shard_dest).await?;
            report.files_written += 1;
        }
    }

    tracing::info!(
        files = report.files_written,
        bytes = report.bytes_written,
        "mirror complete"
    );
    Ok(report)
}

/// Fetch one URL to one file, creating parent directories. A partial file
/// left behind by a failed write is removed before the error propagates.
async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64, MirrorError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| MirrorError::Http {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(MirrorError::Status {
            url: url.to_string(),
            status,
        });
    }

    let bytes = response.bytes().await.map_err(|source| MirrorError::Http {
        url: url.to_string(),
        source,
    })?;

    if let Err(e) = tokio::fs::write(dest, &bytes).await {
        let _ = tokio::fs::remove_file(dest).await;
        return Err(e.into());
    }

    tracing::debug!(url, dest = %dest.display(), bytes = bytes.len(), "wrote asset");
    Ok(bytes.len() as u64)
}
