use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

// Annotation conventions checked on every prompt line of a generation plan.
const ENGLISH_RULE: &str = "Use ENGLISH for code terms";
const ENGLISH_RULE_MIXED_CASE: &str = "Use English for code terms";
const JAPANESE_RULE: &str = "Use JAPANESE for concepts";
const LABELS_FIELD: &str = "Text/Labels";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelIssueKind {
    MissingJapaneseRule,
    MissingEnglishRule,
    MissingLabelsField,
}

impl LabelIssueKind {
    pub fn describe(self) -> &'static str {
        match self {
            Self::MissingJapaneseRule => "English rule present but Japanese rule missing",
            Self::MissingEnglishRule => "Text/Labels present but English rule missing",
            Self::MissingLabelsField => "prompt line without Text/Labels field",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelIssue {
    pub line: usize,
    pub kind: LabelIssueKind,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelAuditReport {
    pub plan: String,
    pub prompt_lines: usize,
    pub issues: Vec<LabelIssue>,
    pub clean: bool,
}

/// Audit a generation-plan markdown file for prompt lines whose label
/// annotations deviate from the conventions: every prompt that instructs
/// English code terms must also instruct Japanese concept labels, and every
/// inline prompt needs a Text/Labels field.
pub fn audit_plan(plan_path: &Path) -> Result<LabelAuditReport> {
    let content = fs::read_to_string(plan_path)
        .with_context(|| format!("failed to read {}", plan_path.display()))?;

    let mut prompt_lines = 0usize;
    let mut issues = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if !line.contains("**Prompt**") {
            continue;
        }
        prompt_lines += 1;
        let number = index + 1;

        let has_english =
            line.contains(ENGLISH_RULE) || line.contains(ENGLISH_RULE_MIXED_CASE);
        let has_japanese = line.contains(JAPANESE_RULE);

        if has_english && !has_japanese {
            issues.push(LabelIssue {
                line: number,
                kind: LabelIssueKind::MissingJapaneseRule,
                content: line.trim().to_string(),
            });
        } else if !has_english && line.contains(LABELS_FIELD) {
            issues.push(LabelIssue {
                line: number,
                kind: LabelIssueKind::MissingEnglishRule,
                content: line.trim().to_string(),
            });
        }

        if line.contains("- **Prompt**:") && !line.contains("Text/Labels:") {
            issues.push(LabelIssue {
                line: number,
                kind: LabelIssueKind::MissingLabelsField,
                content: line.trim().to_string(),
            });
        }
    }

    Ok(LabelAuditReport {
        plan: plan_path.to_string_lossy().replace('\\', "/"),
        prompt_lines,
        clean: issues.is_empty(),
        issues,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{LabelIssueKind, audit_plan};

    fn audit(content: &str) -> super::LabelAuditReport {
        let temp = tempdir().expect("tempdir");
        let plan = temp.path().join("image_generation_plan.md");
        fs::write(&plan, content).expect("write plan");
        audit_plan(&plan).expect("audit")
    }

    #[test]
    fn clean_plan_has_no_issues() {
        let report = audit(
            "* **a_study_001_x.png**\n- **Prompt**: `draw a box. Text/Labels: Use ENGLISH for code terms, Use JAPANESE for concepts`\n",
        );
        assert_eq!(report.prompt_lines, 1);
        assert!(report.clean);
    }

    #[test]
    fn missing_japanese_rule_is_flagged() {
        let report = audit(
            "- **Prompt**: `draw. Text/Labels: Use ENGLISH for code terms only`\n",
        );
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, LabelIssueKind::MissingJapaneseRule);
        assert_eq!(report.issues[0].line, 1);
        assert!(!report.clean);
    }

    #[test]
    fn mixed_case_english_rule_counts_as_present() {
        let report = audit(
            "- **Prompt**: `draw. Text/Labels: Use English for code terms, Use JAPANESE for concepts`\n",
        );
        assert!(report.clean);
    }

    #[test]
    fn labels_without_english_rule_is_flagged() {
        let report = audit("- **Prompt**: `draw. Text/Labels: 日本語のみ`\n");
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, LabelIssueKind::MissingEnglishRule);
    }

    #[test]
    fn prompt_line_without_labels_field_is_flagged() {
        let report = audit("- **Prompt**: `just draw something`\n");
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, LabelIssueKind::MissingLabelsField);
    }

    #[test]
    fn non_prompt_lines_are_ignored() {
        let report = audit("# Plan\n\nsome text about Text/Labels\n* **a.png**\n");
        assert_eq!(report.prompt_lines, 0);
        assert!(report.clean);
    }

    #[test]
    fn line_numbers_are_one_based() {
        let report = audit("# Plan\n\n- **Prompt**: `no labels here`\n");
        assert_eq!(report.issues[0].line, 3);
    }
}
