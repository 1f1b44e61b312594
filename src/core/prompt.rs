use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub system_prompt: String,
    pub user_prompt_template: String,
    pub max_diff_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a code review assistant. Analyze the provided git diff \
and explain the changes, their potential impact, and any important considerations."
                .to_string(),
            user_prompt_template:
                "Please analyze this git diff and provide a structured response:\n\n{diff}"
                    .to_string(),
            max_diff_chars: 60000,
        }
    }
}

pub struct PromptBuilder {
    config: PromptConfig,
}

impl PromptBuilder {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// Builds the two-role prompt: fixed reviewer instructions plus a user
    /// message embedding the literal diff text.
    pub fn build_analysis_prompt(&self, diff: &str) -> (String, String) {
        let diff_text = self.bounded_diff(diff);
        let user_prompt = self.config.user_prompt_template.replace("{diff}", &diff_text);
        (self.config.system_prompt.clone(), user_prompt)
    }

    fn bounded_diff(&self, diff: &str) -> String {
        if self.config.max_diff_chars == 0 || diff.len() <= self.config.max_diff_chars {
            return diff.to_string();
        }

        // Cut on a char boundary at or below the budget.
        let mut cut = self.config.max_diff_chars;
        while !diff.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\n[diff truncated]\n", &diff[..cut])
    }
}
