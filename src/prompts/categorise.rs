//! Sentence categorisation prompt.

use super::fill;

/// System prompt for sentence categorisation
pub const SYSTEM_PROMPT: &str = "You are an expert botanist.";

/// Placeholders: {sentence}, {subjects}
pub const USER_PROMPT_TEMPLATE: &str = r#"Categorise this sentence "{sentence}" into one of
the following categories {subjects}.
Respond only with the category name.
The category name that you return MUST be one of the categories supplied"#;

/// Build the categorisation prompt for one sentence
pub fn build_user_prompt(sentence: &str, subjects: &[String]) -> String {
    fill(
        USER_PROMPT_TEMPLATE,
        &[("sentence", sentence), ("subjects", &subjects.join(","))],
    )
}
