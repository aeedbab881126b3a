use std::fs;
use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use similar::TextDiff;

use crate::config::DocsConfig;
use crate::scan::{image_pattern, markdown_files, picture_snapshot};

/// Fuzzy-match key for a broken reference: the leading segments up to and
/// including the marker token and its numeric identifier, i.e. everything
/// before the final `_`-delimited segment. `invariants_cs_study_001_shield.png`
/// yields `invariants_cs_study_001`.
pub fn prefix_pattern(marker: &str) -> Result<Regex> {
    Regex::new(&format!(r"^(.*_{}_\d+)_", regex::escape(marker)))
        .context("failed to compile filename prefix pattern")
}

#[derive(Debug, Clone, Default)]
pub struct RepairOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Rewrite {
    pub file: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentDiff {
    pub file: String,
    pub diff: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub root: String,
    pub root_exists: bool,
    pub dry_run: bool,
    pub documents_scanned: usize,
    pub documents_modified: usize,
    pub rewrites: Vec<Rewrite>,
    pub skipped_missing_picture_dir: usize,
    pub unrecognized_filenames: usize,
    pub unmatched_prefixes: usize,
    pub diffs: Vec<DocumentDiff>,
    pub errors: Vec<String>,
}

impl RepairReport {
    fn new(root: &Path, dry_run: bool) -> Self {
        Self {
            root: root.to_string_lossy().replace('\\', "/"),
            root_exists: root.exists(),
            dry_run,
            documents_scanned: 0,
            documents_modified: 0,
            rewrites: Vec::new(),
            skipped_missing_picture_dir: 0,
            unrecognized_filenames: 0,
            unmatched_prefixes: 0,
            diffs: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Repair broken picture links under `root`.
///
/// Every markdown document is scanned for image references into the
/// conventional picture folder. References whose target file is absent are
/// rewritten to the first snapshot entry sharing the derived filename
/// prefix. Documents are only written back when at least one rewrite was
/// computed; everything else stays byte-for-byte untouched. A missing root
/// is reported on the returned value, not raised.
pub fn repair_tree(
    root: &Path,
    config: &DocsConfig,
    options: &RepairOptions,
) -> Result<RepairReport> {
    let mut report = RepairReport::new(root, options.dry_run);
    if !report.root_exists {
        return Ok(report);
    }

    let image = image_pattern(config.picture_dir())?;
    let prefix = prefix_pattern(config.prefix_marker())?;

    for document in markdown_files(root)? {
        report.documents_scanned += 1;
        // Failures stay scoped to the one document; the batch continues.
        if let Err(error) =
            repair_document(&document, root, &image, &prefix, config, options, &mut report)
        {
            report.errors.push(format!(
                "{}: {error:#}",
                document.to_string_lossy().replace('\\', "/")
            ));
        }
    }

    Ok(report)
}

fn repair_document(
    path: &Path,
    root: &Path,
    image: &Regex,
    prefix: &Regex,
    config: &DocsConfig,
    options: &RepairOptions,
    report: &mut RepairReport,
) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let references: Vec<_> = image.captures_iter(&content).collect();
    if references.is_empty() {
        return Ok(());
    }

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let picture_dir = parent.join(config.picture_dir());
    if !picture_dir.exists() {
        report.skipped_missing_picture_dir += 1;
        return Ok(());
    }

    let snapshot = picture_snapshot(&picture_dir, config.image_extension())?;
    let display = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");

    let mut replacements: Vec<(Range<usize>, String)> = Vec::new();
    for captures in &references {
        let (Some(link), Some(filename)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let filename = filename.as_str();

        if snapshot.iter().any(|name| name == filename)
            || picture_dir.join(filename).exists()
        {
            continue;
        }

        let Some(key) = prefix
            .captures(filename)
            .and_then(|prefix_captures| prefix_captures.get(1))
            .map(|key| key.as_str())
        else {
            report.unrecognized_filenames += 1;
            continue;
        };

        // First prefix-sharing entry of the sorted snapshot wins; there is
        // deliberately no ranking beyond the prefix test.
        let Some(candidate) = snapshot.iter().find(|name| name.starts_with(key)) else {
            report.unmatched_prefixes += 1;
            continue;
        };

        report.rewrites.push(Rewrite {
            file: display.clone(),
            from: filename.to_string(),
            to: candidate.clone(),
        });
        replacements.push((
            link.range(),
            format!("./{}/{}", config.picture_dir(), candidate),
        ));
    }

    if replacements.is_empty() {
        return Ok(());
    }

    let mut updated = String::with_capacity(content.len());
    let mut cursor = 0usize;
    for (range, replacement) in &replacements {
        updated.push_str(&content[cursor..range.start]);
        updated.push_str(replacement);
        cursor = range.end;
    }
    updated.push_str(&content[cursor..]);

    report.documents_modified += 1;
    if options.dry_run {
        let diff = TextDiff::from_lines(content.as_str(), updated.as_str())
            .unified_diff()
            .context_radius(2)
            .header(&display, &display)
            .to_string();
        report.diffs.push(DocumentDiff {
            file: display,
            diff,
        });
    } else {
        fs::write(path, updated)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}
