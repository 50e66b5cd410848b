//! Prompts for merging per-trait sentences into monograph prose.

use super::fill;

/// System prompt for combining sentences
pub const SYSTEM_PROMPT: &str = r#"You are an expert in botanical monography and concise writing.
Always refer to plant parts or traits directly, avoiding pronouns like 'it' or 'they'.
Clarity and specificity are essential. Ensure the style is concise and technical. Avoid narrative or explanatory language.
Follow the style and tone of formal taxonomic monographs."#;

/// Placeholder: {sentences}
pub const USER_PROMPT_TEMPLATE: &str = r#"Combine the following sentences / clauses as concisely as possible:
 {sentences}
This must be written in the style of a botanical monograph.
Avoid excessive negations or long lists of features that are not present unless those absences are crucial for species identification.
Retain all measurements. Return the combination with NO EXTRA TEXT.
"#;

/// Build the combination prompt from a JSON array of sentences
pub fn build_user_prompt(sentences_json: &str) -> String {
    fill(USER_PROMPT_TEMPLATE, &[("sentences", sentences_json)])
}
