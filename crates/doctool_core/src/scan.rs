use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::config::DocsConfig;

/// Markdown image tags pointing at the conventional sibling picture folder,
/// e.g. `![alt](./picture/foo.png)`. Group 1 is the relative link, group 2
/// the bare filename. Absolute URLs and other folders do not match.
pub fn image_pattern(picture_dir: &str) -> Result<Regex> {
    Regex::new(&format!(
        r"!\[.*?\]\((\./{}/(.*?))\)",
        regex::escape(picture_dir)
    ))
    .context("failed to compile image link pattern")
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannedDocument {
    pub relative_path: String,
    pub bytes: u64,
    pub content_hash: String,
    pub image_refs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanStats {
    pub total_documents: usize,
    pub documents_with_images: usize,
    pub image_refs: usize,
    pub picture_dirs: usize,
    pub picture_files: usize,
    pub missing_dirs: Vec<String>,
    pub by_dir: BTreeMap<String, usize>,
}

/// All markdown files under `root`, sorted by path so runs over identical
/// filesystem state enumerate identically. A missing root yields an empty
/// list.
pub fn markdown_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|ext| ext.to_str()) != Some("md") {
            continue;
        }
        files.push(entry.path().to_path_buf());
    }
    files.sort();
    Ok(files)
}

/// Filenames with the expected image extension currently present in a
/// picture directory, sorted. The sort makes first-candidate selection
/// in the link repairer reproducible.
pub fn picture_snapshot(picture_dir: &Path, extension: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = fs::read_dir(picture_dir)
        .with_context(|| format!("failed to list {}", picture_dir.display()))?;
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to list {}", picture_dir.display()))?;
        if !entry.file_type().is_ok_and(|ft| ft.is_file()) {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if Path::new(name).extension().and_then(|ext| ext.to_str()) == Some(extension) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

pub fn scan_documents(root: &Path, config: &DocsConfig) -> Result<Vec<ScannedDocument>> {
    let pattern = image_pattern(config.picture_dir())?;
    let mut documents = Vec::new();
    for path in markdown_files(root)? {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        documents.push(ScannedDocument {
            relative_path: relative,
            bytes: content.len() as u64,
            content_hash: compute_hash(&content),
            image_refs: pattern.find_iter(&content).count(),
        });
    }
    Ok(documents)
}

pub fn scan_stats(docs_dir: &Path, config: &DocsConfig, dirs: &[String]) -> Result<ScanStats> {
    let mut stats = ScanStats {
        total_documents: 0,
        documents_with_images: 0,
        image_refs: 0,
        picture_dirs: 0,
        picture_files: 0,
        missing_dirs: Vec::new(),
        by_dir: BTreeMap::new(),
    };

    let roots: Vec<(Option<String>, PathBuf)> = if dirs.is_empty() {
        vec![(None, docs_dir.to_path_buf())]
    } else {
        dirs.iter()
            .map(|dir| (Some(dir.clone()), docs_dir.join(dir)))
            .collect()
    };

    for (label, root) in roots {
        if !root.exists() {
            stats
                .missing_dirs
                .push(label.unwrap_or_else(|| root.to_string_lossy().replace('\\', "/")));
            continue;
        }

        for document in scan_documents(&root, config)? {
            stats.total_documents += 1;
            if document.image_refs > 0 {
                stats.documents_with_images += 1;
                stats.image_refs += document.image_refs;
            }
            let key = label.clone().unwrap_or_else(|| {
                match document.relative_path.split_once('/') {
                    Some((first, _)) => first.to_string(),
                    None => ".".to_string(),
                }
            });
            *stats.by_dir.entry(key).or_insert(0) += 1;
        }

        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
            if entry.file_type().is_dir()
                && entry.file_name().to_str() == Some(config.picture_dir())
            {
                stats.picture_dirs += 1;
                stats.picture_files +=
                    picture_snapshot(entry.path(), config.image_extension())?.len();
            }
        }
    }

    Ok(stats)
}

/// Generation-plan files under the selected roots, sorted. Plans live inside
/// the picture folders, one per documented section.
pub fn find_plan_files(
    docs_dir: &Path,
    config: &DocsConfig,
    dirs: &[String],
) -> Result<Vec<PathBuf>> {
    let roots: Vec<PathBuf> = if dirs.is_empty() {
        vec![docs_dir.to_path_buf()]
    } else {
        dirs.iter().map(|dir| docs_dir.join(dir)).collect()
    };

    let mut plans = Vec::new();
    for root in roots {
        if !root.exists() {
            continue;
        }
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
            if entry.file_type().is_file()
                && entry.file_name().to_str() == Some(config.plan_filename())
            {
                plans.push(entry.path().to_path_buf());
            }
        }
    }
    plans.sort();
    Ok(plans)
}

pub fn compute_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{compute_hash, image_pattern, markdown_files, picture_snapshot, scan_stats};
    use crate::config::DocsConfig;

    #[test]
    fn image_pattern_matches_conventional_links_only() {
        let pattern = image_pattern("picture").expect("pattern");
        let content = "intro ![shield](./picture/foo_study_001_shield.png) and \
                       ![ext](https://example.org/x.png) and ![other](./images/y.png)";
        let captures: Vec<_> = pattern.captures_iter(content).collect();
        assert_eq!(captures.len(), 1);
        assert_eq!(&captures[0][1], "./picture/foo_study_001_shield.png");
        assert_eq!(&captures[0][2], "foo_study_001_shield.png");
    }

    #[test]
    fn markdown_files_are_sorted_and_recursive() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("b_dir")).expect("dir");
        fs::write(root.join("b_dir").join("page.md"), "b").expect("write");
        fs::write(root.join("a.md"), "a").expect("write");
        fs::write(root.join("notes.txt"), "skip").expect("write");

        let files = markdown_files(root).expect("walk");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], root.join("a.md"));
        assert_eq!(files[1], root.join("b_dir").join("page.md"));
    }

    #[test]
    fn markdown_files_on_missing_root_is_empty() {
        let temp = tempdir().expect("tempdir");
        let files = markdown_files(&temp.path().join("absent")).expect("walk");
        assert!(files.is_empty());
    }

    #[test]
    fn picture_snapshot_filters_extension_and_sorts() {
        let temp = tempdir().expect("tempdir");
        let picture = temp.path().join("picture");
        fs::create_dir_all(&picture).expect("dir");
        fs::write(picture.join("z.png"), "").expect("write");
        fs::write(picture.join("a.png"), "").expect("write");
        fs::write(picture.join("plan.md"), "").expect("write");
        fs::write(picture.join("script.py"), "").expect("write");

        let snapshot = picture_snapshot(&picture, "png").expect("snapshot");
        assert_eq!(snapshot, vec!["a.png", "z.png"]);
    }

    #[test]
    fn scan_stats_counts_documents_and_pictures() {
        let temp = tempdir().expect("tempdir");
        let docs = temp.path().join("docs");
        let section = docs.join("cqrs_cs");
        fs::create_dir_all(section.join("picture")).expect("dirs");
        fs::write(
            section.join("intro.md"),
            "![a](./picture/a_study_001_x.png)\n![b](./picture/a_study_002_y.png)\n",
        )
        .expect("write");
        fs::write(section.join("plain.md"), "no images here\n").expect("write");
        fs::write(section.join("picture").join("a_study_001_x.png"), "").expect("write");

        let config = DocsConfig::default();
        let stats =
            scan_stats(&docs, &config, &["cqrs_cs".to_string(), "missing".to_string()])
                .expect("stats");
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.documents_with_images, 1);
        assert_eq!(stats.image_refs, 2);
        assert_eq!(stats.picture_dirs, 1);
        assert_eq!(stats.picture_files, 1);
        assert_eq!(stats.missing_dirs, vec!["missing"]);
        assert_eq!(stats.by_dir.get("cqrs_cs"), Some(&2));
    }

    #[test]
    fn hash_is_stable_for_identical_content() {
        assert_eq!(compute_hash("alpha"), compute_hash("alpha"));
        assert_ne!(compute_hash("alpha"), compute_hash("beta"));
        assert_eq!(compute_hash("alpha").len(), 16);
    }
}
