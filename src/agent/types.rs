use serde::{Deserialize, Serialize};

/// The reviewer's categorical judgment of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    ChangesRequested,
    Comment,
}

impl Verdict {
    /// Lenient parse of model output. Anything unrecognized is a plain comment.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Verdict::Approved,
            "changes_requested" | "request_changes" => Verdict::ChangesRequested,
            _ => Verdict::Comment,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::ChangesRequested => "changes_requested",
            Verdict::Comment => "comment",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Modify,
    Delete,
}

impl ChangeOperation {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "create" => Some(ChangeOperation::Create),
            "modify" => Some(ChangeOperation::Modify),
            "delete" => Some(ChangeOperation::Delete),
            _ => None,
        }
    }
}

/// One file-level edit produced by the code agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChange {
    pub file_path: String,
    pub operation: ChangeOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_content: Option<String>,
    /// 1-based, inclusive. Set together with `line_end` for a ranged modify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<usize>,
}

impl CodeChange {
    pub fn line_range(&self) -> Option<(usize, usize)> {
        match (self.line_start, self.line_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

/// Outcome of one code-agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionResult {
    pub success: bool,
    pub message: String,
    pub pr_number: Option<u64>,
    pub branch: Option<String>,
    pub changes: Vec<CodeChange>,
}

impl AgentExecutionResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            pr_number: None,
            branch: None,
            changes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub file_path: String,
    pub line_number: u64,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub verdict: Verdict,
    pub summary: String,
    pub comments: Vec<ReviewComment>,
    pub general_feedback: Option<String>,
    /// Set when no model verdict was reached (reviewer error or timeout).
    #[serde(default)]
    pub degraded: bool,
}

impl ReviewResult {
    /// A non-blocking result used when the review itself could not be carried out.
    pub fn comment_only(summary: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Comment,
            summary: summary.into(),
            comments: Vec::new(),
            general_feedback: None,
            degraded: true,
        }
    }
}

/// Input to one code-agent invocation.
#[derive(Debug, Clone)]
pub struct CodeRequest {
    pub repo: String,
    pub issue_number: u64,
    pub branch: Option<String>,
    pub pr_number: Option<u64>,
    pub previous_feedback: Option<String>,
    pub iteration: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_normalize() {
        assert_eq!(Verdict::normalize("approve"), Verdict::Approved);
        assert_eq!(Verdict::normalize("APPROVED"), Verdict::Approved);
        assert_eq!(Verdict::normalize(" Changes_Requested "), Verdict::ChangesRequested);
        assert_eq!(Verdict::normalize("request_changes"), Verdict::ChangesRequested);
        assert_eq!(Verdict::normalize("comment"), Verdict::Comment);
        assert_eq!(Verdict::normalize("lgtm"), Verdict::Comment);
        assert_eq!(Verdict::normalize(""), Verdict::Comment);
    }

    #[test]
    fn test_verdict_serde_names() {
        let json = serde_json::to_string(&Verdict::ChangesRequested).unwrap();
        assert_eq!(json, "\"changes_requested\"");
        assert_eq!(Verdict::ChangesRequested.to_string(), "changes_requested");
    }

    #[test]
    fn test_change_operation_parse() {
        assert_eq!(ChangeOperation::parse("Create"), Some(ChangeOperation::Create));
        assert_eq!(ChangeOperation::parse("modify"), Some(ChangeOperation::Modify));
        assert_eq!(ChangeOperation::parse("DELETE"), Some(ChangeOperation::Delete));
        assert_eq!(ChangeOperation::parse("rename"), None);
    }

    #[test]
    fn test_line_range_requires_both_bounds() {
        let mut change = CodeChange {
            file_path: "src/lib.rs".to_string(),
            operation: ChangeOperation::Modify,
            content: Some("fn main() {}".to_string()),
            old_content: None,
            line_start: Some(3),
            line_end: None,
        };
        assert_eq!(change.line_range(), None);
        change.line_end = Some(5);
        assert_eq!(change.line_range(), Some((3, 5)));
    }
}
