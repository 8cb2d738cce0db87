//! Assemble already-produced artifacts into the directory layout the site
//! deploy step publishes.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::files;

/// Subpath of the rendered test report inside the site.
pub const REPORT_SUBDIR: &str = "test-report";
/// Subpath of project documentation inside the site.
pub const DOCS_SUBDIR: &str = "docs";
/// Subpath holding the raw results JSON inside the site.
pub const RESULTS_SUBDIR: &str = "test-results";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PagesOptions {
    pub report_dir: Option<PathBuf>,
    pub docs_dir: Option<PathBuf>,
    pub results_json: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for PagesOptions {
    fn default() -> Self {
        Self {
            report_dir: None,
            docs_dir: None,
            results_json: None,
            output_dir: PathBuf::from("site"),
        }
    }
}

impl PagesOptions {
    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            anyhow::bail!("prepare-pages: output_dir must not be empty");
        }
        let output = resolve(&self.output_dir)?;
        for input in [&self.report_dir, &self.docs_dir].into_iter().flatten() {
            let resolved = resolve(input)?;
            if output.starts_with(&resolved) || resolved.starts_with(&output) {
                anyhow::bail!(
                    "prepare-pages: input {} overlaps the output directory {}",
                    input.display(),
                    self.output_dir.display()
                );
            }
        }
        Ok(())
    }
}

/// Absolute form of `path` with symlinks resolved for the part that exists.
fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
    let mut resolved = existing
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", existing.display()))?;
    resolved.extend(rest.iter().rev());
    Ok(resolved)
}

#[derive(Debug, Default)]
pub struct PreparedPages {
    pub output_dir: PathBuf,
    /// Subpaths (relative to `output_dir`) that were written.
    pub written: Vec<PathBuf>,
    /// Inputs that were configured but missing on disk.
    pub skipped: Vec<PathBuf>,
}

/// Copy each present input into its conventional subpath of `output_dir`.
pub fn prepare(opts: &PagesOptions) -> Result<PreparedPages> {
    opts.validate()?;

    fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("Failed to create {}", opts.output_dir.display()))?;

    let mut prepared = PreparedPages {
        output_dir: opts.output_dir.clone(),
        ..PreparedPages::default()
    };

    if let Some(dir) = present(&opts.report_dir, &mut prepared.skipped) {
        copy_into(&opts.output_dir, REPORT_SUBDIR, dir, &mut prepared)?;
    }
    if let Some(dir) = present(&opts.docs_dir, &mut prepared.skipped) {
        copy_into(&opts.output_dir, DOCS_SUBDIR, dir, &mut prepared)?;
    }
    if let Some(json) = present(&opts.results_json, &mut prepared.skipped) {
        let file_name = json
            .file_name()
            .with_context(|| format!("{} has no file name", json.display()))?;
        let rel = Path::new(RESULTS_SUBDIR).join(file_name);
        let dest = opts.output_dir.join(&rel);
        fs::create_dir_all(opts.output_dir.join(RESULTS_SUBDIR))?;
        fs::copy(json, &dest)
            .with_context(|| format!("Failed to copy {} to {}", json.display(), dest.display()))?;
        tracing::info!(from = %json.display(), to = %dest.display(), "copied results JSON");
        prepared.written.push(rel);
    }

    Ok(prepared)
}

/// Return the input if it was given and exists; record it as skipped if given but missing.
fn present<'a>(input: &'a Option<PathBuf>, skipped: &mut Vec<PathBuf>) -> Option<&'a Path> {
    let path = input.as_deref()?;
    if path.exists() {
        Some(path)
    } else {
        tracing::warn!(path = %path.display(), "input not found, skipping");
        skipped.push(path.to_path_buf());
        None
    }
}

fn copy_into(output_dir: &Path, subdir: &str, src: &Path, prepared: &mut PreparedPages) -> Result<()> {
    let dest = output_dir.join(subdir);
    if src.is_dir() {
        files::copy_dir_recursive(src, &dest)?;
    } else {
        anyhow::bail!("{} is not a directory", src.display());
    }
    tracing::info!(from = %src.display(), to = %dest.display(), "copied directory");
    prepared.written.push(PathBuf::from(subdir));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inputs {
        _root: tempfile::TempDir,
        report: PathBuf,
        docs: PathBuf,
        json: PathBuf,
        output: PathBuf,
    }

    fn inputs() -> Inputs {
        let root = tempfile::tempdir().unwrap();
        let report = root.path().join("allure-report");
        let docs = root.path().join("site-docs");
        let json = root.path().join("results.json");
        fs::create_dir_all(report.join("data")).unwrap();
        fs::write(report.join("index.html"), "<html/>").unwrap();
        fs::write(report.join("data/suites.json"), "{}").unwrap();
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join("index.md"), "# docs").unwrap();
        fs::write(&json, r#"{"testResults":{}}"#).unwrap();
        let output = root.path().join("out/site");
        Inputs { report, docs, json, output, _root: root }
    }

    fn top_level(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_every_subset_of_inputs() {
        for mask in 0..8u8 {
            let i = inputs();
            let opts = PagesOptions {
                report_dir: (mask & 1 != 0).then(|| i.report.clone()),
                docs_dir: (mask & 2 != 0).then(|| i.docs.clone()),
                results_json: (mask & 4 != 0).then(|| i.json.clone()),
                output_dir: i.output.clone(),
            };

            let prepared = prepare(&opts).unwrap();

            let mut expected = Vec::new();
            if mask & 2 != 0 {
                expected.push(DOCS_SUBDIR.to_string());
            }
            if mask & 1 != 0 {
                expected.push(REPORT_SUBDIR.to_string());
            }
            if mask & 4 != 0 {
                expected.push(RESULTS_SUBDIR.to_string());
            }
            expected.sort();
            assert_eq!(top_level(&i.output), expected, "mask {mask}");
            assert_eq!(prepared.written.len(), expected.len());
            assert!(prepared.skipped.is_empty());
        }
    }

    #[test]
    fn test_contents_land_in_conventional_subpaths() {
        let i = inputs();
        let opts = PagesOptions {
            report_dir: Some(i.report.clone()),
            docs_dir: Some(i.docs.clone()),
            results_json: Some(i.json.clone()),
            output_dir: i.output.clone(),
        };

        prepare(&opts).unwrap();

        assert!(i.output.join("test-report/index.html").exists());
        assert!(i.output.join("test-report/data/suites.json").exists());
        assert!(i.output.join("docs/index.md").exists());
        assert!(i.output.join("test-results/results.json").exists());
    }

    #[test]
    fn test_missing_input_is_skipped() {
        let i = inputs();
        let opts = PagesOptions {
            report_dir: Some(i.report.clone()),
            docs_dir: Some(i.output.join("../does-not-exist")),
            results_json: None,
            output_dir: i.output.clone(),
        };

        let prepared = prepare(&opts).unwrap();

        assert_eq!(top_level(&i.output), vec![REPORT_SUBDIR.to_string()]);
        assert_eq!(prepared.skipped.len(), 1);
    }

    #[test]
    fn test_second_run_overwrites() {
        let i = inputs();
        let opts = PagesOptions {
            report_dir: Some(i.report.clone()),
            output_dir: i.output.clone(),
            ..PagesOptions::default()
        };
        prepare(&opts).unwrap();
        fs::write(i.report.join("index.html"), "<html>v2</html>").unwrap();
        prepare(&opts).unwrap();

        let index = fs::read_to_string(i.output.join("test-report/index.html")).unwrap();
        assert_eq!(index, "<html>v2</html>");
    }

    #[test]
    fn test_output_as_input_rejected() {
        let opts = PagesOptions {
            report_dir: Some(PathBuf::from("site")),
            ..PagesOptions::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_output_nested_in_input_rejected() {
        let i = inputs();
        let opts = PagesOptions {
            docs_dir: Some(i.docs.clone()),
            output_dir: i.docs.join("site"),
            ..PagesOptions::default()
        };

        let err = prepare(&opts).unwrap_err();

        assert!(format!("{err:#}").contains("overlaps the output directory"));
        assert_eq!(top_level(&i.docs), vec!["index.md"]);
    }

    #[test]
    fn test_input_nested_in_output_rejected() {
        let i = inputs();
        let opts = PagesOptions {
            report_dir: Some(i.output.join("test-report")),
            output_dir: i.output.clone(),
            ..PagesOptions::default()
        };
        assert!(opts.validate().is_err());
    }
}
