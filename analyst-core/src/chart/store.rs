use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use super::ChartError;

const EXTENSION: &str = "svg";
const PREFIX: &str = "chart_";

/// Directory of rendered charts. Only the newest `keep_latest` files are
/// kept; older ones are removed after every save.
#[derive(Debug, Clone)]
pub struct ChartStore {
    dir: PathBuf,
    keep_latest: usize,
}

impl ChartStore {
    pub fn new(dir: impl Into<PathBuf>, keep_latest: usize) -> Self {
        Self {
            dir: dir.into(),
            keep_latest: keep_latest.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<(), ChartError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Write `svg` under a fresh timestamped name and prune old charts.
    pub async fn save(&self, svg: &str) -> Result<PathBuf, ChartError> {
        self.ensure_dir().await?;

        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}{}_{}.{}",
            PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S_%6f"),
            &suffix[..4],
            EXTENSION
        );
        let path = self.dir.join(&name);
        tokio::fs::write(&path, svg).await?;
        tracing::info!(path = %path.display(), "Chart saved");

        if let Err(e) = self.prune().await {
            tracing::warn!(error = %e, "Failed to prune old charts");
        }
        Ok(path)
    }

    /// Remove all but the newest charts. Returns how many were deleted.
    pub async fn prune(&self) -> Result<usize, ChartError> {
        let charts = self.list().await?;
        let mut removed = 0;
        for name in charts.iter().skip(self.keep_latest) {
            match tokio::fs::remove_file(self.dir.join(name)).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(chart = %name, error = %e, "Could not remove chart"),
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "Pruned old charts");
        }
        Ok(removed)
    }

    /// Chart file names, newest first. Names embed the creation time, so
    /// lexical order is chronological order.
    pub async fn list(&self) -> Result<Vec<String>, ChartError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if is_chart_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Map a public chart name to its path. Names that could escape the
    /// directory are refused.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        is_chart_name(name).then(|| self.dir.join(name))
    }

    pub async fn read(&self, name: &str) -> Result<Option<String>, ChartError> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(svg) => Ok(Some(svg)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_chart_name(name: &str) -> bool {
    name.starts_with(PREFIX)
        && name.ends_with(&format!(".{}", EXTENSION))
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !name.contains("..")
}
