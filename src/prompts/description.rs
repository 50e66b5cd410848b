//! Description generation prompts (trait data to sentences).

use super::fill;

/// System prompt for appendix 1 sentences
pub const QUANTITATIVE_SYSTEM_PROMPT: &str = "You are an expert botanist.";

/// System prompt for appendix 2 sentences
pub const QUALITATIVE_SYSTEM_PROMPT: &str = "You are an expert botanist. You have created a trait data matrix from herbarium specimens. You are writing species descriptions based on the data matrix.";

/// Placeholders: {definition}, {values}
pub const QUANTITATIVE_PROMPT: &str = r#"### Instructions ###
Use the "description" and "unit" in {definition} and the
corresponding "value" in {values} to create a simple sentence
describing that particular trait. Your output should be one
sentence. Blank values should return an empty string. Include no
extra text.

### Example ###
Using {"code":"rachislen","description":"Rachis length","unit":"cm"}
and {"code":"rachislen","value":"41.0(25.5-70.0)"}, the output
would be 'Rachis length is 41.0(25.5-70.0)cm'.
"#;

/// Placeholders: {rules}, {values}
pub const SINGLE_VALUE_PROMPT: &str = r#"### Instructions ###
Using the "rules" in {rules} and the corresponding "value"
in {values} output the rule that matches the value.
Return only an output sentence, NO EXTRA TEXT.

### Example ###
Using {"code":"rachil","rules":"Petioles and rachises with at
least some long, straight, flat, usually grouped spines
abaxially (0); petioles and rachises with whorls of long,
straight, flat spines (1); rachises without long, straight,
flat spines abaxially (2)"} and {"code":"rachil","value":"2"},
the output would be 'rachises without long, straight, flat
spines abaxially' only.
"#;

/// Placeholders: {rules}, {values}, {frequency}, {num_specimens_scored}, {other_values}
pub const MULTI_VALUE_PROMPT: &str = r#"### Instructions ###
Use the rules and the value provided to produce a concise,
natural-sounding sentence that reflects the dominant trait observed.

Each set of rules is a string of semicolon-separated options in the format:
"Trait description (value)". Match the trait code in the 'value' to
its description in the rules.

- 'frequency': Number of times the dominant trait was observed.
- 'num_specimens_scored': Total specimens observed.
- 'other_values': Other trait codes observed in remaining specimens.

Use the frequency and specimen count to adjust your wording:
- If the dominant trait was found in all or nearly all specimens, state it directly.
- If it was found in most but not all, use qualifiers like "usually", "sometimes".
- If found in a very small proportion of specimens, use "rarely".

**Output a single sentence only. No labels, no extra text.**

### Materials ###
- Rules: {rules}
- Value: {values}
- frequency: {frequency}
- num_specimens_scored: {num_specimens_scored}
- other_values: {other_values}

Use the following examples to guide your response:

### Example 1 ###
Input:
- Rules: "Stems solitary (0); stems clustered (1)"
- Value: {"code": "solclu", "value": "1"}
- frequency: 3
- num_specimens_scored: 4
- other_values: [0]

Output: "Stems clustered, rarely solitary."

### Example 2 ###
Input:
- Rules: "Proximalmost pinnae swept back across the sheath (on adult plants only) (0);
  proximalmost pinnae not swept back across the sheath (1)"
- Value: {"code": "sweptb", "value": 1.0}
- frequency: 19
- num_specimens_scored: 29
- other_values: [0]

Output: "Proximalmost pinnae sometimes swept back across the sheath."
"#;

/// Build the appendix 1 sentence prompt from JSON records
pub fn build_quantitative_prompt(definition_json: &str, values_json: &str) -> String {
    fill(
        QUANTITATIVE_PROMPT,
        &[("definition", definition_json), ("values", values_json)],
    )
}

/// Build the appendix 2 single-value prompt from JSON records
pub fn build_single_value_prompt(rules_json: &str, values_json: &str) -> String {
    fill(
        SINGLE_VALUE_PROMPT,
        &[("rules", rules_json), ("values", values_json)],
    )
}

/// Counts for the multi-value prompt
#[derive(Debug, Clone)]
pub struct MultiValueMaterials<'a> {
    pub rules_json: &'a str,
    pub values_json: &'a str,
    pub frequency: u32,
    pub num_specimens_scored: u32,
    pub other_values: &'a str,
}

/// Build the appendix 2 multi-value prompt
pub fn build_multi_value_prompt(materials: &MultiValueMaterials<'_>) -> String {
    let frequency = materials.frequency.to_string();
    let scored = materials.num_specimens_scored.to_string();
    let other_values = format!("[{}]", materials.other_values);
    fill(
        MULTI_VALUE_PROMPT,
        &[
            ("rules", materials.rules_json),
            ("values", materials.values_json),
            ("frequency", &frequency),
            ("num_specimens_scored", &scored),
            ("other_values", &other_values),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantitative_prompt_keeps_example() {
        let prompt = build_quantitative_prompt(
            r#"[{"code":"numpin","description":"Number of pinnae","unit":""}]"#,
            r#"[{"code":"numpin","value":"12(10-14)"}]"#,
        );
        assert!(prompt.contains(r#""value":"12(10-14)""#));
        assert!(prompt.contains(r#"{"code":"rachislen","description":"Rachis length","unit":"cm"}"#));
    }

    #[test]
    fn test_multi_value_prompt_materials() {
        let prompt = build_multi_value_prompt(&MultiValueMaterials {
            rules_json: r#"[{"code":"solclu","rules":"Stems solitary (0); stems clustered (1)"}]"#,
            values_json: r#"[{"code":"solclu","value":"1"}]"#,
            frequency: 7,
            num_specimens_scored: 9,
            other_values: "0",
        });
        assert!(prompt.contains("- frequency: 7\n"));
        assert!(prompt.contains("- num_specimens_scored: 9\n"));
        assert!(prompt.contains("- other_values: [0]\n\nUse the following"));
    }
}
