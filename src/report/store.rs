use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::RunReport;

/// Run reports stored as JSON files in one directory.
pub struct ReportStore {
    runs_dir: PathBuf,
}

impl ReportStore {
    pub fn new(runs_dir: &Path) -> Self {
        Self {
            runs_dir: runs_dir.to_path_buf(),
        }
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    pub fn save(&self, report: &RunReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.runs_dir).with_context(|| {
            format!("Failed to create runs directory: {}", self.runs_dir.display())
        })?;
        let path = self.runs_dir.join(report.file_name());
        let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;
        Ok(path)
    }

    /// Report files, most recent first.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(&self.runs_dir)
            .with_context(|| format!("Failed to read {}", self.runs_dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .collect();

        runs.sort();
        runs.reverse();
        Ok(runs)
    }

    pub fn load(&self, path: &Path) -> Result<RunReport> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run report: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run report: {}", path.display()))
    }

    /// Resolve a path, a file name, or a unique prefix of a file name.
    pub fn find(&self, needle: &str) -> Result<PathBuf> {
        let direct = Path::new(needle);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        let matches: Vec<PathBuf> = self
            .list()?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(needle) || n.contains(&format!("_{needle}")))
            })
            .collect();

        match matches.as_slice() {
            [single] => Ok(single.clone()),
            [] => anyhow::bail!("No run report matches '{}'", needle),
            _ => anyhow::bail!(
                "'{}' matches {} run reports; use a longer prefix",
                needle,
                matches.len()
            ),
        }
    }
}
