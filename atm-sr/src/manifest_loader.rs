//! Manifest discovery and generation
//!
//! At startup the runner tries an ordered list of candidate locations and
//! uses the first one that yields a valid, non-empty manifest. Candidates are
//! either `http(s)://` URLs or local file paths.

use std::path::{Path, PathBuf};

use atm_common::{Item, Manifest};
use tracing::{debug, info, warn};

use crate::error::{Result, RunnerError};

/// Default candidate locations, relative paths first, then the service
pub fn default_candidates(server_url: &str) -> Vec<String> {
    vec![
        "alpha_data/manifest.json".to_string(),
        "../alpha_data/manifest.json".to_string(),
        format!("{}/alpha_data/manifest.json", server_url.trim_end_matches('/')),
    ]
}

fn is_url(candidate: &str) -> bool {
    candidate.starts_with("http://") || candidate.starts_with("https://")
}

async fn fetch(client: &reqwest::Client, candidate: &str) -> std::result::Result<Vec<u8>, String> {
    if is_url(candidate) {
        let response = client
            .get(candidate)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    } else {
        tokio::fs::read(candidate).await.map_err(|e| e.to_string())
    }
}

/// Load the first candidate that parses as a non-empty manifest
pub async fn load_manifest(client: &reqwest::Client, candidates: &[String]) -> Result<Manifest> {
    let mut last_error = String::from("no manifest candidates configured");

    for candidate in candidates {
        let loaded = fetch(client, candidate)
            .await
            .and_then(|bytes| Manifest::from_json(&bytes).map_err(|e| e.to_string()));
        match loaded {
            Ok(manifest) => {
                info!("Loaded {} manifest items from {}", manifest.len(), candidate);
                return Ok(manifest);
            }
            Err(e) => {
                debug!("Manifest candidate {} failed: {}", candidate, e);
                last_error = format!("{candidate}: {e}");
            }
        }
    }

    warn!("No manifest candidate could be loaded");
    Err(RunnerError::ManifestUnavailable(last_error))
}

/// First non-empty line of a transcription file, trimmed
fn read_label(lab_path: &Path) -> String {
    let Ok(bytes) = std::fs::read(lab_path) else {
        return String::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Build manifest items from the `.wav` files in `data_dir`.
///
/// Files are taken in name order. Each item's label is read from the sibling
/// `.lab` file (empty when missing) and its audio URI is
/// `<dir name>/<file name>`.
pub fn scan_directory(data_dir: &Path) -> Result<Vec<Item>> {
    let dir_name = data_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut wav_files: Vec<PathBuf> = std::fs::read_dir(data_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        })
        .collect();
    wav_files.sort();

    let items = wav_files
        .iter()
        .map(|wav| {
            let stem = wav
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let file_name = wav
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Item {
                label: read_label(&wav.with_file_name(format!("{stem}.lab"))),
                audio: format!("{dir_name}/{file_name}"),
                filename: Some(file_name),
                id: stem,
            }
        })
        .collect();
    Ok(items)
}

/// Scan `data_dir` and write the manifest to `out` (default
/// `<data_dir>/manifest.json`). Returns the path written and the item count.
pub fn write_manifest(data_dir: &Path, out: Option<&Path>) -> Result<(PathBuf, usize)> {
    if !data_dir.is_dir() {
        return Err(RunnerError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("data folder not found: {}", data_dir.display()),
        )));
    }

    let items = scan_directory(data_dir)?;
    let out_path = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| data_dir.join("manifest.json"));
    std::fs::write(&out_path, serde_json::to_string_pretty(&items)?)?;
    Ok((out_path, items.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_default_candidates() {
        let candidates = default_candidates("http://127.0.0.1:8000/");
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0], "alpha_data/manifest.json");
        assert_eq!(candidates[2], "http://127.0.0.1:8000/alpha_data/manifest.json");
    }

    #[tokio::test]
    async fn test_first_valid_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.json");
        let broken = dir.path().join("broken.json");
        let good = dir.path().join("good.json");
        write(&empty, "[]");
        write(&broken, "{");
        write(&good, r#"[{"id": "a", "audio": "alpha_data/a.wav", "label": "hi"}]"#);

        let candidates: Vec<String> = [
            dir.path().join("missing.json"),
            empty,
            broken,
            good,
        ]
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();

        let manifest = load_manifest(&reqwest::Client::new(), &candidates)
            .await
            .unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.items()[0].label, "hi");
    }

    #[tokio::test]
    async fn test_all_candidates_failing_is_manifest_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = vec![dir.path().join("missing.json").to_string_lossy().into_owned()];

        let err = load_manifest(&reqwest::Client::new(), &candidates)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::ManifestUnavailable(_)));
    }

    #[test]
    fn test_scan_directory_builds_items() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("alpha_data");
        std::fs::create_dir(&data).unwrap();
        write(&data.join("b.wav"), "");
        write(&data.join("a.WAV"), "");
        write(&data.join("notes.txt"), "");
        write(&data.join("a.lab"), "\n  first line  \nsecond line\n");

        let items = scan_directory(&data).unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].id, "a");
        assert_eq!(items[0].audio, "alpha_data/a.WAV");
        assert_eq!(items[0].label, "first line");
        assert_eq!(items[0].filename.as_deref(), Some("a.WAV"));

        // Missing transcription gives an empty label
        assert_eq!(items[1].id, "b");
        assert_eq!(items[1].label, "");
    }

    #[test]
    fn test_write_manifest_default_location() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("alpha_data");
        std::fs::create_dir(&data).unwrap();
        write(&data.join("clip.wav"), "");
        write(&data.join("clip.lab"), "hello world");

        let (path, count) = write_manifest(&data, None).unwrap();
        assert_eq!(path, data.join("manifest.json"));
        assert_eq!(count, 1);

        let manifest = Manifest::from_json(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(manifest.items()[0].label, "hello world");
        assert_eq!(manifest.items()[0].display_filename(), "clip.wav");
    }

    #[test]
    fn test_write_manifest_missing_folder() {
        let root = tempfile::tempdir().unwrap();
        assert!(write_manifest(&root.path().join("nope"), None).is_err());
    }
}
