use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

use crate::config::DocsConfig;

// Backtick-quoted payload of a `**Prompt**:` line.
static PROMPT_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`(.+)`").unwrap());

pub const PROMPT_PLACEHOLDER: &str = "{PROMPT}";

/// Image bullets of a generation plan, e.g. `* **cqrs_cs_study_001_bus.png**`.
fn plan_entry_pattern(image_extension: &str) -> Result<Regex> {
    Regex::new(&format!(
        r"\*\s+\*\*(.+?\.{})\*\*",
        regex::escape(image_extension)
    ))
    .context("failed to compile plan entry pattern")
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub image: String,
    pub prompt_file: String,
    pub prompt: Option<String>,
}

/// Parse a generation-plan markdown file into its image entries. An entry is
/// an image bullet; the first following `**Prompt**:` line supplies its
/// prompt text. Entries keep plan order.
pub fn parse_plan(plan_path: &Path, config: &DocsConfig) -> Result<Vec<PlanEntry>> {
    let content = fs::read_to_string(plan_path)
        .with_context(|| format!("failed to read {}", plan_path.display()))?;
    let entry_pattern = plan_entry_pattern(config.image_extension())?;

    let mut entries: Vec<PlanEntry> = Vec::new();
    let mut awaiting_prompt = false;
    for line in content.lines() {
        if let Some(image) = entry_pattern
            .captures(line)
            .and_then(|captures| captures.get(1))
        {
            let image = image.as_str().to_string();
            let prompt_file = prompt_filename(&image, config);
            entries.push(PlanEntry {
                image,
                prompt_file,
                prompt: None,
            });
            awaiting_prompt = true;
            continue;
        }
        if awaiting_prompt
            && line.contains("**Prompt**:")
            && let Some(payload) = PROMPT_PAYLOAD
                .captures(line)
                .and_then(|captures| captures.get(1))
        {
            if let Some(entry) = entries.last_mut() {
                entry.prompt = Some(payload.as_str().to_string());
            }
            awaiting_prompt = false;
        }
    }
    Ok(entries)
}

fn prompt_filename(image: &str, config: &DocsConfig) -> String {
    let suffix = format!(".{}", config.image_extension());
    let stem = image.strip_suffix(&suffix).unwrap_or(image);
    format!("{stem}.{}", config.prompt_extension())
}

/// Prompt files currently present in a picture directory, sorted.
pub fn prompt_files(dir: &Path, config: &DocsConfig) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        if !entry.file_type().is_ok_and(|ft| ft.is_file()) {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if Path::new(name).extension().and_then(|ext| ext.to_str())
            == Some(config.prompt_extension())
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptVerifyReport {
    pub plan: String,
    pub dir: String,
    pub planned: usize,
    pub generated: usize,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    pub in_sync: bool,
}

/// Compare the prompt files on disk against the plan without touching
/// anything.
pub fn verify_prompts(
    plan_path: &Path,
    dir: &Path,
    config: &DocsConfig,
) -> Result<PromptVerifyReport> {
    let entries = parse_plan(plan_path, config)?;
    let generated = prompt_files(dir, config)?;
    let expected: BTreeSet<&str> = entries.iter().map(|entry| entry.prompt_file.as_str()).collect();
    let present: BTreeSet<&str> = generated.iter().map(String::as_str).collect();

    let missing: Vec<String> = entries
        .iter()
        .filter(|entry| !present.contains(entry.prompt_file.as_str()))
        .map(|entry| entry.prompt_file.clone())
        .collect();
    let extra: Vec<String> = generated
        .iter()
        .filter(|name| !expected.contains(name.as_str()))
        .cloned()
        .collect();

    Ok(PromptVerifyReport {
        plan: plan_path.to_string_lossy().replace('\\', "/"),
        dir: dir.to_string_lossy().replace('\\', "/"),
        planned: entries.len(),
        generated: generated.len(),
        in_sync: missing.is_empty() && extra.is_empty(),
        missing,
        extra,
    })
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptAction {
    pub action: String,
    pub file: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptSyncReport {
    pub plan: String,
    pub dir: String,
    pub dry_run: bool,
    pub planned: usize,
    pub created: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub skipped_missing_prompt: usize,
    pub actions: Vec<PromptAction>,
    pub errors: Vec<String>,
}

pub fn render_prompt(template: &str, prompt: &str) -> String {
    template.replace(PROMPT_PLACEHOLDER, prompt)
}

/// Reconcile the prompt files in `dir` against the plan: delete files the
/// plan no longer lists, create missing ones from the template. Planned
/// files already present are left untouched, so a second run is a no-op.
/// Per-file I/O failures are collected and the batch continues.
pub fn sync_prompts(
    plan_path: &Path,
    dir: &Path,
    config: &DocsConfig,
    template: &str,
    options: &SyncOptions,
) -> Result<PromptSyncReport> {
    let entries = parse_plan(plan_path, config)?;
    let generated = prompt_files(dir, config)?;
    let expected: BTreeSet<&str> = entries.iter().map(|entry| entry.prompt_file.as_str()).collect();

    let mut report = PromptSyncReport {
        plan: plan_path.to_string_lossy().replace('\\', "/"),
        dir: dir.to_string_lossy().replace('\\', "/"),
        dry_run: options.dry_run,
        planned: entries.len(),
        created: 0,
        deleted: 0,
        unchanged: 0,
        skipped_missing_prompt: 0,
        actions: Vec::new(),
        errors: Vec::new(),
    };

    for name in &generated {
        if expected.contains(name.as_str()) {
            continue;
        }
        if !options.dry_run
            && let Err(error) = fs::remove_file(dir.join(name))
        {
            report.errors.push(format!("failed to delete {name}: {error}"));
            continue;
        }
        report.deleted += 1;
        report.actions.push(PromptAction {
            action: "delete".to_string(),
            file: name.clone(),
        });
    }

    for entry in &entries {
        let path = dir.join(&entry.prompt_file);
        if path.exists() {
            report.unchanged += 1;
            continue;
        }
        let Some(prompt) = entry.prompt.as_deref() else {
            report.skipped_missing_prompt += 1;
            continue;
        };
        if !options.dry_run
            && let Err(error) = fs::write(&path, render_prompt(template, prompt))
        {
            report
                .errors
                .push(format!("failed to write {}: {error}", entry.prompt_file));
            continue;
        }
        report.created += 1;
        report.actions.push(PromptAction {
            action: "create".to_string(),
            file: entry.prompt_file.clone(),
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::tempdir;

    use super::{SyncOptions, parse_plan, render_prompt, sync_prompts, verify_prompts};
    use crate::config::DocsConfig;

    const PLAN: &str = "\
# 画像生成計画

* **cqrs_cs_study_001_bus.png**
  - Style: flat vector
  - **Prompt**: `Draw a command bus. Text/Labels: Use ENGLISH for code terms, Use JAPANESE for concepts`

* **cqrs_cs_study_002_store.png**
  - **Prompt**: `Draw an event store. Text/Labels: Use ENGLISH for code terms, Use JAPANESE for concepts`

* **cqrs_cs_study_003_nodesc.png**
  - no prompt line for this one
";

    fn write_plan(dir: &Path) -> PathBuf {
        let plan = dir.join("image_generation_plan.md");
        fs::write(&plan, PLAN).expect("write plan");
        plan
    }

    #[test]
    fn parse_plan_extracts_entries_and_prompts() {
        let temp = tempdir().expect("tempdir");
        let plan = write_plan(temp.path());

        let entries = parse_plan(&plan, &DocsConfig::default()).expect("parse");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].image, "cqrs_cs_study_001_bus.png");
        assert_eq!(entries[0].prompt_file, "cqrs_cs_study_001_bus.txt");
        assert!(
            entries[0]
                .prompt
                .as_deref()
                .is_some_and(|prompt| prompt.starts_with("Draw a command bus"))
        );
        assert!(entries[1].prompt.is_some());
        assert!(entries[2].prompt.is_none());
    }

    #[test]
    fn verify_reports_missing_and_extra() {
        let temp = tempdir().expect("tempdir");
        let plan = write_plan(temp.path());
        fs::write(temp.path().join("cqrs_cs_study_001_bus.txt"), "ok").expect("write");
        fs::write(temp.path().join("stale.txt"), "old").expect("write");

        let report =
            verify_prompts(&plan, temp.path(), &DocsConfig::default()).expect("verify");
        assert_eq!(report.planned, 3);
        assert_eq!(report.generated, 2);
        assert_eq!(
            report.missing,
            vec!["cqrs_cs_study_002_store.txt", "cqrs_cs_study_003_nodesc.txt"]
        );
        assert_eq!(report.extra, vec!["stale.txt"]);
        assert!(!report.in_sync);
    }

    #[test]
    fn sync_creates_missing_and_deletes_extra() {
        let temp = tempdir().expect("tempdir");
        let plan = write_plan(temp.path());
        fs::write(temp.path().join("cqrs_cs_study_001_bus.txt"), "keep me").expect("write");
        fs::write(temp.path().join("stale.txt"), "old").expect("write");

        let template = "header\n\n{PROMPT}\n\nfooter\n";
        let report = sync_prompts(
            &plan,
            temp.path(),
            &DocsConfig::default(),
            template,
            &SyncOptions::default(),
        )
        .expect("sync");

        assert_eq!(report.created, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.skipped_missing_prompt, 1);
        assert!(report.errors.is_empty());

        assert!(!temp.path().join("stale.txt").exists());
        assert_eq!(
            fs::read_to_string(temp.path().join("cqrs_cs_study_001_bus.txt")).expect("read"),
            "keep me"
        );
        let created =
            fs::read_to_string(temp.path().join("cqrs_cs_study_002_store.txt")).expect("read");
        assert!(created.starts_with("header"));
        assert!(created.contains("Draw an event store"));
        assert!(!created.contains("{PROMPT}"));
    }

    #[test]
    fn sync_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let plan = write_plan(temp.path());
        let config = DocsConfig::default();

        let first = sync_prompts(&plan, temp.path(), &config, "{PROMPT}", &SyncOptions::default())
            .expect("first sync");
        assert_eq!(first.created, 2);

        let second =
            sync_prompts(&plan, temp.path(), &config, "{PROMPT}", &SyncOptions::default())
                .expect("second sync");
        assert_eq!(second.created, 0);
        assert_eq!(second.deleted, 0);
        assert_eq!(second.unchanged, 2);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let temp = tempdir().expect("tempdir");
        let plan = write_plan(temp.path());
        fs::write(temp.path().join("stale.txt"), "old").expect("write");

        let report = sync_prompts(
            &plan,
            temp.path(),
            &DocsConfig::default(),
            "{PROMPT}",
            &SyncOptions { dry_run: true },
        )
        .expect("dry run");

        assert_eq!(report.created, 2);
        assert_eq!(report.deleted, 1);
        assert!(temp.path().join("stale.txt").exists());
        assert!(!temp.path().join("cqrs_cs_study_001_bus.txt").exists());
    }

    #[test]
    fn render_prompt_substitutes_placeholder() {
        assert_eq!(render_prompt("a {PROMPT} b", "x"), "a x b");
        assert_eq!(render_prompt("no placeholder", "x"), "no placeholder");
    }
}
