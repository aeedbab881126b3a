use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PICTURE_DIR: &str = "picture";
pub const DEFAULT_IMAGE_EXTENSION: &str = "png";
pub const DEFAULT_PREFIX_MARKER: &str = "study";
pub const DEFAULT_PLAN_FILENAME: &str = "image_generation_plan.md";
pub const DEFAULT_PROMPT_EXTENSION: &str = "txt";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DocsConfig {
    #[serde(default)]
    pub docs: DocsSection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DocsSection {
    #[serde(default)]
    pub dirs: Vec<String>,
    pub picture_dir: Option<String>,
    pub image_extension: Option<String>,
    pub prefix_marker: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PromptsSection {
    pub plan_filename: Option<String>,
    pub prompt_extension: Option<String>,
}

impl DocsConfig {
    pub fn picture_dir(&self) -> &str {
        self.docs.picture_dir.as_deref().unwrap_or(DEFAULT_PICTURE_DIR)
    }

    pub fn image_extension(&self) -> &str {
        self.docs
            .image_extension
            .as_deref()
            .unwrap_or(DEFAULT_IMAGE_EXTENSION)
    }

    pub fn prefix_marker(&self) -> &str {
        self.docs
            .prefix_marker
            .as_deref()
            .unwrap_or(DEFAULT_PREFIX_MARKER)
    }

    pub fn plan_filename(&self) -> &str {
        self.prompts
            .plan_filename
            .as_deref()
            .unwrap_or(DEFAULT_PLAN_FILENAME)
    }

    pub fn prompt_extension(&self) -> &str {
        self.prompts
            .prompt_extension
            .as_deref()
            .unwrap_or(DEFAULT_PROMPT_EXTENSION)
    }

    /// Subdirectories selected for a run: CLI arguments win over the
    /// configured list; an empty result means "the whole docs tree".
    pub fn effective_dirs(&self, cli_dirs: &[String]) -> Vec<String> {
        if !cli_dirs.is_empty() {
            return cli_dirs.to_vec();
        }
        self.docs.dirs.clone()
    }
}

/// Load a DocsConfig from a TOML file. Returns defaults if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<DocsConfig> {
    if !config_path.exists() {
        return Ok(DocsConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: DocsConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_uses_conventions() {
        let config = DocsConfig::default();
        assert!(config.docs.dirs.is_empty());
        assert_eq!(config.picture_dir(), "picture");
        assert_eq!(config.image_extension(), "png");
        assert_eq!(config.prefix_marker(), "study");
        assert_eq!(config.plan_filename(), "image_generation_plan.md");
        assert_eq!(config.prompt_extension(), "txt");
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert!(config.docs.dirs.is_empty());
    }

    #[test]
    fn load_config_parses_docs_section() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[docs]
dirs = ["cqrs_cs", "invariants_cs"]
picture_dir = "images"
image_extension = "webp"
prefix_marker = "fig"

[prompts]
plan_filename = "plan.md"
prompt_extension = "prompt"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.docs.dirs, vec!["cqrs_cs", "invariants_cs"]);
        assert_eq!(config.picture_dir(), "images");
        assert_eq!(config.image_extension(), "webp");
        assert_eq!(config.prefix_marker(), "fig");
        assert_eq!(config.plan_filename(), "plan.md");
        assert_eq!(config.prompt_extension(), "prompt");
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[docs]\ndirs = [\"err_model_cs\"]\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.docs.dirs, vec!["err_model_cs"]);
        assert_eq!(config.picture_dir(), "picture");
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[docs\ndirs = [").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn cli_dirs_override_configured_dirs() {
        let config = DocsConfig {
            docs: DocsSection {
                dirs: vec!["a".to_string(), "b".to_string()],
                ..DocsSection::default()
            },
            ..DocsConfig::default()
        };
        assert_eq!(config.effective_dirs(&[]), vec!["a", "b"]);
        assert_eq!(
            config.effective_dirs(&["c".to_string()]),
            vec!["c".to_string()]
        );
    }
}
