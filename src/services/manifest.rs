use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;

/// Extensions of files recorded in the download manifest.
pub const PACKAGE_EXTENSIONS: &[&str] = &["msu", "cab", "exe"];

/// Extensions the offline installer knows how to apply.
pub const INSTALLABLE_EXTENSIONS: &[&str] = &["msu", "cab"];

/// One downloaded package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub size: u64,
    /// Last modification time, RFC 3339 in UTC
    pub modified: String,
}

/// Record of what a download run left in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub download_date: String,
    pub files: Vec<ManifestEntry>,
    pub count: usize,
}

impl UpdateManifest {
    /// Describe every package file in `dir`, sorted by name.
    pub fn from_directory(dir: &Utf8Path) -> Result<Self> {
        let mut files = Vec::new();
        for path in package_files(dir, PACKAGE_EXTENSIONS)? {
            let metadata = fs::metadata(&path)
                .with_context(|| format!("Failed to read metadata: {}", path))?;
            let modified = metadata
                .modified()
                .map(|time| DateTime::<Utc>::from(time).to_rfc3339())
                .unwrap_or_default();
            files.push(ManifestEntry {
                filename: path.file_name().unwrap_or_default().to_string(),
                size: metadata.len(),
                modified,
            });
        }

        Ok(Self {
            download_date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            count: files.len(),
            files,
        })
    }

    pub fn write(&self, path: &Utf8Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize update manifest")?;
        fs::write(path, json).with_context(|| format!("Failed to write manifest: {}", path))?;
        tracing::info!("Wrote update manifest with {} files to {}", self.count, path);
        Ok(())
    }

    pub fn load(path: &Utf8Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path))?;
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse manifest: {}", path))
    }
}

/// Files in `dir` whose extension is in `extensions` (case-insensitive), sorted by name.
pub fn package_files(dir: &Utf8Path, extensions: &[&str]) -> Result<Vec<Utf8PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to list directory: {}", dir))?;

    let mut files: Vec<Utf8PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
        .filter(|path| {
            path.extension().is_some_and(|ext| {
                extensions
                    .iter()
                    .any(|wanted| ext.eq_ignore_ascii_case(wanted))
            })
        })
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, path)
    }

    #[test]
    fn test_package_files_filters_and_sorts() {
        let (_temp_dir, dir) = repo();
        for name in ["b.msu", "a.CAB", "notes.txt", "c.exe"] {
            fs::write(dir.join(name), b"x").unwrap();
        }
        fs::create_dir(dir.join("sub.msu")).unwrap();

        let names: Vec<String> = package_files(&dir, INSTALLABLE_EXTENSIONS)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["a.CAB", "b.msu"]);
    }

    #[test]
    fn test_manifest_describes_directory() {
        let (_temp_dir, dir) = repo();
        fs::write(dir.join("kb1.msu"), vec![0u8; 128]).unwrap();
        fs::write(dir.join("setup.exe"), vec![0u8; 16]).unwrap();
        fs::write(dir.join("readme.md"), b"ignored").unwrap();

        let manifest = UpdateManifest::from_directory(&dir).unwrap();

        assert_eq!(manifest.count, 2);
        assert_eq!(manifest.files[0].filename, "kb1.msu");
        assert_eq!(manifest.files[0].size, 128);
        assert!(!manifest.files[0].modified.is_empty());
        assert_eq!(manifest.files[1].filename, "setup.exe");
    }

    #[test]
    fn test_manifest_written_as_json() {
        let (_temp_dir, dir) = repo();
        fs::write(dir.join("kb2.cab"), b"abc").unwrap();
        let manifest = UpdateManifest::from_directory(&dir).unwrap();
        let path = dir.join("updates_manifest.json");

        manifest.write(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["count"], 1);
        assert_eq!(raw["files"][0]["filename"], "kb2.cab");
        assert_eq!(UpdateManifest::load(&path).unwrap(), manifest);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let (_temp_dir, dir) = repo();
        assert!(package_files(&dir.join("Downloads"), PACKAGE_EXTENSIONS).is_err());
    }
}
