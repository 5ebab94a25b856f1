//! Golden-fixture comparison.
//!
//! The output tree of a run is compared against `<expected_root>/<name>`:
//!
//! - the sets of relative file paths must be equal
//! - JSON files are compared as values after excluded fields are omitted
//! - everything else is compared byte for byte
//!
//! Two optional download checks ride along: a file count under
//! `download_dir`, and a `directory_structure.json` record in the expected
//! tree listing the top-level downloaded files.
//!
//! In overwrite mode the expected tree is replaced by the actual output and
//! the check passes.
//!
//! Filesystem work runs on the blocking pool.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::VerifyError;

/// Record of the top-level files of the download directory.
pub const DIRECTORY_STRUCTURE_FILE: &str = "directory_structure.json";

/// Inputs of one fixture comparison.
#[derive(Debug, Clone)]
pub struct FixtureCheck {
    pub output_dir: PathBuf,
    pub expected_dir: PathBuf,
    pub download_dir: PathBuf,
    pub expected_num_files: Option<usize>,
    pub exclude_fields: Vec<String>,
    pub overwrite: bool,
}

/// Result of a fixture comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureReport {
    /// Number of files compared.
    pub compared: usize,
    /// One line per mismatch.
    pub differences: Vec<String>,
    /// The expected tree was rewritten from the output.
    pub overwritten: bool,
}

impl FixtureReport {
    pub fn is_match(&self) -> bool {
        self.differences.is_empty()
    }
}

impl FixtureCheck {
    /// Compare, or overwrite, on the blocking pool.
    pub async fn run(self) -> Result<FixtureReport, VerifyError> {
        tokio::task::spawn_blocking(move || {
            if self.overwrite {
                self.overwrite_fixtures()
            } else {
                self.compare()
            }
        })
        .await
        .map_err(|e| VerifyError::Task(e.to_string()))?
    }

    fn compare(&self) -> Result<FixtureReport, VerifyError> {
        let mut report = FixtureReport::default();

        if let Some(expected) = self.expected_num_files {
            let found = count_files(&self.download_dir)?;
            if found != expected {
                report
                    .differences
                    .push(format!("expected {expected} downloaded files, found {found}"));
            }
        }

        if !self.expected_dir.is_dir() {
            report.differences.push(format!(
                "no expected fixtures at {}",
                self.expected_dir.display()
            ));
            return Ok(report);
        }

        let mut expected = list_files(&self.expected_dir)?;
        let had_structure = expected.remove(DIRECTORY_STRUCTURE_FILE);
        let actual = list_files(&self.output_dir)?;

        for missing in expected.difference(&actual) {
            report.differences.push(format!("missing output: {missing}"));
        }
        for extra in actual.difference(&expected) {
            report.differences.push(format!("unexpected output: {extra}"));
        }
        for rel in expected.intersection(&actual) {
            report.compared += 1;
            let expected_path = self.expected_dir.join(rel);
            let actual_path = self.output_dir.join(rel);
            if !self.same_content(&expected_path, &actual_path)? {
                debug!(file = %rel, "fixture mismatch");
                report.differences.push(format!(
                    "content differs: {rel} (expected {})",
                    expected_path.display()
                ));
            }
        }

        if had_structure {
            self.compare_directory_structure(&mut report)?;
        }

        info!(
            compared = report.compared,
            differences = report.differences.len(),
            "fixture comparison finished"
        );
        Ok(report)
    }

    fn same_content(&self, expected: &Path, actual: &Path) -> Result<bool, VerifyError> {
        let expected_bytes = fs::read(expected).map_err(|e| VerifyError::io(expected, e))?;
        let actual_bytes = fs::read(actual).map_err(|e| VerifyError::io(actual, e))?;

        let is_json = expected.extension().is_some_and(|ext| ext == "json");
        if is_json
            && let (Ok(mut want), Ok(mut got)) = (
                serde_json::from_slice::<Value>(&expected_bytes),
                serde_json::from_slice::<Value>(&actual_bytes),
            )
        {
            omit_fields(&mut want, &self.exclude_fields);
            omit_fields(&mut got, &self.exclude_fields);
            return Ok(want == got);
        }
        Ok(expected_bytes == actual_bytes)
    }

    fn compare_directory_structure(&self, report: &mut FixtureReport) -> Result<(), VerifyError> {
        let path = self.expected_dir.join(DIRECTORY_STRUCTURE_FILE);
        let raw = fs::read(&path).map_err(|e| VerifyError::io(&path, e))?;
        let record: Value = serde_json::from_slice(&raw).map_err(|e| invalid(&path, e))?;
        let expected: Vec<String> = record
            .get("directory_structure")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| invalid(&path, e))?
            .ok_or_else(|| VerifyError::InvalidFixture {
                path: path.clone(),
                reason: "missing \"directory_structure\"".to_owned(),
            })?;

        let found = top_level_files(&self.download_dir)?;
        if expected != found {
            report.differences.push(format!(
                "download directory structure differs: expected {expected:?}, found {found:?}"
            ));
        }
        Ok(())
    }

    fn overwrite_fixtures(&self) -> Result<FixtureReport, VerifyError> {
        warn!(
            expected = %self.expected_dir.display(),
            "overwriting fixtures with actual output"
        );
        match fs::remove_dir_all(&self.expected_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(VerifyError::io(&self.expected_dir, e)),
        }
        fs::create_dir_all(&self.expected_dir)
            .map_err(|e| VerifyError::io(&self.expected_dir, e))?;

        let files = list_files(&self.output_dir)?;
        for rel in &files {
            let to = self.expected_dir.join(rel);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|e| VerifyError::io(parent, e))?;
            }
            let from = self.output_dir.join(rel);
            fs::copy(&from, &to).map_err(|e| VerifyError::io(&from, e))?;
        }

        if self.download_dir.is_dir() {
            let record = serde_json::json!({
                "directory_structure": top_level_files(&self.download_dir)?,
            });
            let path = self.expected_dir.join(DIRECTORY_STRUCTURE_FILE);
            let body = serde_json::to_vec_pretty(&record).map_err(|e| invalid(&path, e))?;
            fs::write(&path, body).map_err(|e| VerifyError::io(&path, e))?;
        }

        Ok(FixtureReport {
            compared: files.len(),
            differences: Vec::new(),
            overwritten: true,
        })
    }
}

/// Remove excluded fields from a document.
///
/// Paths are dotted (`metadata.date_processed`). A final `*` clears the parent
/// object. Missing intermediate keys are ignored. A top-level array has the
/// exclusions applied to each element.
pub fn omit_fields(value: &mut Value, fields: &[String]) {
    if let Value::Array(items) = value {
        for item in items {
            omit_fields(item, fields);
        }
        return;
    }
    for field in fields {
        omit_field(value, field);
    }
}

fn omit_field(value: &mut Value, path: &str) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut current = value;
    for segment in segments {
        current = match current.get_mut(segment) {
            Some(next) => next,
            None => return,
        };
    }
    if let Value::Object(map) = current {
        if last == "*" {
            map.clear();
        } else {
            map.remove(last);
        }
    }
}

/// Relative paths (`/`-separated) of every file under `root`. Empty when
/// `root` does not exist. Symlinked directories are not descended into.
fn list_files(root: &Path) -> Result<BTreeSet<String>, VerifyError> {
    let mut files = BTreeSet::new();
    if !root.is_dir() {
        return Ok(files);
    }
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).map_err(|e| VerifyError::io(&dir, e))? {
            let entry = entry.map_err(|e| VerifyError::io(&dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| VerifyError::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_symlink() && path.is_dir() {
                debug!(path = %path.display(), "skipping symlinked directory");
            } else if let Ok(rel) = path.strip_prefix(root) {
                let rel: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                files.insert(rel.join("/"));
            }
        }
    }
    Ok(files)
}

fn count_files(root: &Path) -> Result<usize, VerifyError> {
    Ok(list_files(root)?.len())
}

/// Sorted names of the regular files directly under `dir`.
fn top_level_files(dir: &Path) -> Result<Vec<String>, VerifyError> {
    let mut names = Vec::new();
    if !dir.is_dir() {
        return Ok(names);
    }
    for entry in fs::read_dir(dir).map_err(|e| VerifyError::io(dir, e))? {
        let entry = entry.map_err(|e| VerifyError::io(dir, e))?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn invalid(path: &Path, reason: impl std::fmt::Display) -> VerifyError {
    VerifyError::InvalidFixture {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn fields(list: &[&str]) -> Vec<String> {
        list.iter().map(|f| (*f).to_owned()).collect()
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    struct Trees {
        _root: TempDir,
        output: PathBuf,
        expected: PathBuf,
        download: PathBuf,
    }

    fn trees() -> Trees {
        let root = TempDir::new().unwrap();
        let output = root.path().join("out");
        let expected = root.path().join("expected");
        let download = root.path().join("download");
        fs::create_dir_all(&output).unwrap();
        fs::create_dir_all(&download).unwrap();
        Trees {
            _root: root,
            output,
            expected,
            download,
        }
    }

    fn check(t: &Trees, exclude: &[&str]) -> FixtureCheck {
        FixtureCheck {
            output_dir: t.output.clone(),
            expected_dir: t.expected.clone(),
            download_dir: t.download.clone(),
            expected_num_files: None,
            exclude_fields: fields(exclude),
            overwrite: false,
        }
    }

    #[test]
    fn omit_nested_field() {
        let mut doc = json!({"metadata": {"date_processed": "now", "filename": "a.pdf"}});
        omit_fields(&mut doc, &fields(&["metadata.date_processed"]));
        assert_eq!(doc, json!({"metadata": {"filename": "a.pdf"}}));
    }

    #[test]
    fn omit_applies_to_every_array_element() {
        let mut doc = json!([
            {"text": "a", "metadata": {"date_processed": 1}},
            {"text": "b", "metadata": {"date_processed": 2}},
        ]);
        omit_fields(&mut doc, &fields(&["metadata.date_processed"]));
        assert_eq!(
            doc,
            json!([{"text": "a", "metadata": {}}, {"text": "b", "metadata": {}}])
        );
    }

    #[test]
    fn omit_wildcard_clears_parent() {
        let mut doc = json!({"metadata": {"data_source": {"url": "x", "version": "1"}}});
        omit_fields(&mut doc, &fields(&["metadata.data_source.*"]));
        assert_eq!(doc, json!({"metadata": {"data_source": {}}}));
    }

    #[test]
    fn omit_ignores_missing_paths() {
        let mut doc = json!({"text": "a"});
        omit_fields(&mut doc, &fields(&["metadata.date_processed", "local_download_path"]));
        assert_eq!(doc, json!({"text": "a"}));
    }

    #[tokio::test]
    async fn excluded_fields_do_not_cause_a_mismatch() {
        let t = trees();
        write(
            &t.expected.join("a.pdf.json"),
            r#"[{"text":"hello","metadata":{"date_processed":"2024-01-01"}}]"#,
        );
        write(
            &t.output.join("a.pdf.json"),
            r#"[{"text":"hello","metadata":{"date_processed":"2026-10-14"}}]"#,
        );

        let report = check(&t, &["metadata.date_processed"]).run().await.unwrap();
        assert!(report.is_match(), "{:?}", report.differences);
        assert_eq!(report.compared, 1);
    }

    #[tokio::test]
    async fn differing_and_missing_files_are_reported() {
        let t = trees();
        write(&t.expected.join("a.json"), r#"{"text":"one"}"#);
        write(&t.expected.join("nested/b.json"), r#"{"text":"two"}"#);
        write(&t.output.join("a.json"), r#"{"text":"uno"}"#);
        write(&t.output.join("c.json"), r#"{"text":"three"}"#);

        let report = check(&t, &[]).run().await.unwrap();

        assert!(!report.is_match());
        assert!(report.differences.contains(&"missing output: nested/b.json".to_owned()));
        assert!(report.differences.contains(&"unexpected output: c.json".to_owned()));
        assert!(
            report
                .differences
                .iter()
                .any(|d| d.starts_with("content differs: a.json"))
        );
    }

    #[tokio::test]
    async fn non_json_files_compare_bytewise() {
        let t = trees();
        write(&t.expected.join("notes.txt"), "alpha");
        write(&t.output.join("notes.txt"), "alpha ");

        let report = check(&t, &[]).run().await.unwrap();
        assert_eq!(report.differences.len(), 1);
    }

    #[tokio::test]
    async fn missing_expected_tree_fails() {
        let t = trees();
        write(&t.output.join("a.json"), "{}");
        let report = check(&t, &[]).run().await.unwrap();
        assert!(report.differences[0].starts_with("no expected fixtures at"));
    }

    #[tokio::test]
    async fn download_count_is_checked() {
        let t = trees();
        fs::create_dir_all(&t.expected).unwrap();
        write(&t.download.join("one.pdf"), "x");
        write(&t.download.join("sub/two.pdf"), "y");

        let mut c = check(&t, &[]);
        c.expected_num_files = Some(2);
        assert!(c.clone().run().await.unwrap().is_match());

        c.expected_num_files = Some(3);
        let report = c.run().await.unwrap();
        assert_eq!(report.differences, vec!["expected 3 downloaded files, found 2"]);
    }

    #[tokio::test]
    async fn overwrite_then_compare_passes() {
        let t = trees();
        write(&t.expected.join("stale.json"), "{}");
        write(&t.output.join("a.pdf.json"), r#"[{"text":"hi"}]"#);
        write(&t.download.join("a.pdf"), "pdf");

        let mut c = check(&t, &[]);
        c.overwrite = true;
        let report = c.clone().run().await.unwrap();
        assert!(report.overwritten);
        assert!(!t.expected.join("stale.json").exists());
        assert!(t.expected.join(DIRECTORY_STRUCTURE_FILE).exists());

        c.overwrite = false;
        let report = c.run().await.unwrap();
        assert!(report.is_match(), "{:?}", report.differences);
    }

    #[tokio::test]
    async fn directory_structure_mismatch_is_reported() {
        let t = trees();
        write(
            &t.expected.join(DIRECTORY_STRUCTURE_FILE),
            r#"{"directory_structure": ["a.pdf", "b.pdf"]}"#,
        );
        write(&t.download.join("a.pdf"), "pdf");

        let report = check(&t, &[]).run().await.unwrap();
        assert_eq!(report.differences.len(), 1);
        assert!(report.differences[0].starts_with("download directory structure differs"));
    }

    #[cfg(unix)]
    #[test]
    fn listing_does_not_follow_symlink_cycles() {
        // Given: A tree with a link back to its own root
        let root = TempDir::new().unwrap();
        write(&root.path().join("nested/a.json"), "{}");
        std::os::unix::fs::symlink(root.path(), root.path().join("nested/loop"))
            .expect("should create symlink");

        // When
        let files = list_files(root.path()).expect("listing should finish");

        // Then: Only the real file is listed
        assert_eq!(files.into_iter().collect::<Vec<_>>(), vec!["nested/a.json"]);
    }
}
