//! Offline golden evidence: per-supplier fixture files read in place of
//! network fetches

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use url::Url;

use crate::model::{EvidenceDocument, EvidenceSource};

use super::cache::content_hash;

/// Loads supplier evidence from local fixture files instead of the web.
///
/// Fixtures live under `{dir}/cases/` as `{supplier_id}*.txt` and are read
/// in name order, so a supplier's case files form a stable document set.
pub struct GoldenEvidence {
    dir: PathBuf,
}

impl GoldenEvidence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load every case file for `supplier_id`, tagged INTERNAL_GOLDEN.
    ///
    /// A missing case directory or unreadable file reduces the evidence
    /// set instead of failing, mirroring how blocked web fetches behave.
    pub fn load(&self, supplier_id: &str) -> Vec<EvidenceDocument> {
        let cases = self.dir.join("cases");
        let mut paths: Vec<PathBuf> = match fs::read_dir(&cases) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| is_case_for(path, supplier_id))
                .collect(),
            Err(e) => {
                tracing::warn!(
                    dir = %cases.display(),
                    error = %e,
                    "Golden case directory unavailable"
                );
                return Vec::new();
            }
        };
        paths.sort();

        let mut documents = Vec::new();
        for path in paths {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read golden case file");
                    continue;
                }
            };
            let Some(url) = file_url(&path) else {
                continue;
            };
            documents.push(EvidenceDocument {
                url,
                domain: "localhost".to_string(),
                content_hash: content_hash(&content),
                content,
                http_status: 200,
                retrieved_at: Utc::now(),
                from_cache: false,
                source: EvidenceSource::InternalGolden,
            });
        }
        tracing::info!(
            supplier_id = %supplier_id,
            documents = documents.len(),
            "Golden evidence loaded"
        );
        documents
    }
}

fn is_case_for(path: &Path, supplier_id: &str) -> bool {
    path.extension().is_some_and(|ext| ext == "txt")
        && path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.starts_with(supplier_id))
}

fn file_url(path: &Path) -> Option<Url> {
    let absolute = path.canonicalize().ok()?;
    match Url::from_file_path(&absolute) {
        Ok(url) => Some(url),
        Err(()) => {
            tracing::warn!(path = %path.display(), "Golden case path has no file URL");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let cases = dir.path().join("cases");
        fs::create_dir_all(&cases).unwrap();
        for (name, content) in files {
            fs::write(cases.join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn case_files_load_sorted_and_tagged_internal_golden() {
        let dir = fixture_dir(&[
            ("SUP-001_b_registry.txt", "Registry extract for the supplier."),
            ("SUP-001_a_annual.txt", "Annual report shows declining margins."),
        ]);
        let golden = GoldenEvidence::new(dir.path());

        let documents = golden.load("SUP-001");

        assert_eq!(documents.len(), 2);
        assert!(documents[0].content.starts_with("Annual report"));
        assert!(documents[1].content.starts_with("Registry extract"));
        for doc in &documents {
            assert_eq!(doc.source, EvidenceSource::InternalGolden);
            assert_eq!(doc.domain, "localhost");
            assert_eq!(doc.http_status, 200);
            assert_eq!(doc.url.scheme(), "file");
            assert_eq!(doc.content_hash, content_hash(&doc.content));
        }
    }

    #[test]
    fn only_the_requested_supplier_matches() {
        let dir = fixture_dir(&[
            ("SUP-001_case.txt", "first supplier"),
            ("SUP-002_case.txt", "second supplier"),
            ("SUP-001_notes.md", "wrong extension"),
        ]);
        let golden = GoldenEvidence::new(dir.path());

        let documents = golden.load("SUP-002");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].content, "second supplier");

        assert_eq!(golden.load("SUP-001").len(), 1);
    }

    #[test]
    fn missing_case_directory_yields_no_documents() {
        let dir = TempDir::new().unwrap();
        let golden = GoldenEvidence::new(dir.path());
        assert!(golden.load("SUP-001").is_empty());
    }
}
