use crate::core::analyzer::AnalysisResult;
use crate::error::AnalysisError;

/// Renders the three-section human-readable report.
pub fn render_report(result: &AnalysisResult) -> String {
    let mut output = String::new();

    output.push_str(&format!("Summary: {}\n\n", result.summary));
    output.push_str("Impact and Considerations:\n");
    output.push_str(&result.impact);
    output.push_str("\n\nFiles Changed:\n");
    for file in &result.files_changed {
        output.push_str(&format!("- {}\n", file));
    }

    output.trim_end().to_string()
}

/// Boundary conversion: non-streaming callers receive a single descriptive
/// line instead of a raw fault.
pub fn render_failure(err: &AnalysisError) -> String {
    format!("Error analyzing diff: {}", err)
}

/// The files section appended after streamed model output.
pub fn render_files_section(files: &[String]) -> String {
    let mut output = String::from("\n\nFiles Changed:\n");
    for file in files {
        output.push_str(&format!("- {}\n", file));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_has_three_sections_with_bullets() {
        let result = AnalysisResult {
            summary: "Adds retry logic.".to_string(),
            impact: "Callers see fewer transient failures.\nNo API change.".to_string(),
            files_changed: vec!["src/client.rs".to_string(), "src/lib.rs".to_string()],
        };

        let report = render_report(&result);

        assert!(report.starts_with("Summary: Adds retry logic."));
        assert!(report.contains("Impact and Considerations:\nCallers see fewer"));
        assert!(report.contains("Files Changed:\n- src/client.rs\n- src/lib.rs"));
    }

    #[test]
    fn report_with_no_files_ends_after_the_heading() {
        let result = AnalysisResult {
            summary: "Docs only.".to_string(),
            impact: "None.".to_string(),
            files_changed: vec![],
        };

        let report = render_report(&result);
        assert!(report.ends_with("Files Changed:"));
    }

    #[test]
    fn failure_is_a_single_descriptive_line() {
        let rendered = render_failure(&AnalysisError::Service("boom".to_string()));
        assert_eq!(rendered, "Error analyzing diff: completion service error: boom");
    }

    #[test]
    fn files_section_lists_one_bullet_per_file() {
        let section = render_files_section(&["a.rs".to_string(), "b.rs".to_string()]);
        assert_eq!(section, "\n\nFiles Changed:\n- a.rs\n- b.rs\n");
    }
}
