//! Trait extraction prompts (text to JSON).
//!
//! Appendix 1 traits are measurements and get a single few-shot prompt per
//! code. Appendix 2 traits are scored against rule sets in batches, with four
//! prompt styles to choose from.

use super::fill;
use crate::error::{MonographError, Result};
use std::fmt;
use std::str::FromStr;

/// System prompt for both extraction stages
pub const SYSTEM_PROMPT: &str =
    "You are an expert botanist. You can extract and encode data from text to JSON.";

/// Appendix 1 prompt. Placeholders: {subject_para}, {code}
pub const QUANTITATIVE_PROMPT: &str = r#"You are an expert botanist. You can extract and encode data
from text. You are supplied with the description of a
species ("description"), a code for a trait ("code").
Make a JSON dictionary with the key code and the
corresponding value from the description. Do not fabricate
data and ensure the values correspond to the correct code.
If you cannot score the variable, set the value to null.
Your answer must be as complete and accurate as possible.
Ensure your output is strictly in valid JSON format, and do
not include any extra text. Follow the format of the
following examples.

### Example 1:
description: "Stems clustered, climbing, 3.0 m long."
code: "stemlength"
response: {"stemlength": "3.0 m"}

### Example 2:
description: "pinnae 5(5–6) per side of rachis."
code: "numpin"
response: {"numpin": "5(5-6)"}

### Example 3:
description: "pistillate rachillae 3.3(1.8–4.5) cm long."
code: "psraclen"
response: {"psraclen": "3.3(1.8–4.5) cm"}

Generate the JSON for the following:

description: {subject_para}

code: {code}
"#;

const TASK_HEADER: &str = r#"### Task ###
Create a JSON object where the key is the "code" and its corresponding value is a numeric score derived by applying the given rules to the respective descriptions.
Ensure the JSON object includes all specified codes, with scores accurately matching their respective codes.
If a score cannot be determined for a code, assign a value of null.
Provide a complete and accurate JSON object without any extra text or fabricated data, and export it as a JSON object with no whitespace or trailing commas.

### Materials ###
A description of a species: {subject_para}

A JSON dictionary of trait codes ("code") and sets of rules ("rules") for encoding trait values:

{rules_batch}
Carefully analyse the description and apply the rules systematically before generating the JSON response.
"#;

const COT_STEPS: &str = r#"1. List the questions that you would ask to score a plant according to the "rules" in this rubric. Ensure that each question is atomic and concerns only a single character (shape, structure, etc):

{rules_batch}
2. Now apply those questions to this description:

{subject_para}
3. Now combine the answers to give me a rubric score. If you cannot give a score, set the value to null.
4. Export the answers as a JSON object. Use the code as the key. Ensure no white space or trailing commas.
"#;

const WORKED_EXAMPLES: &str = r#"
### Example 1 ###
description: "rachises 36.2(28.5–45.0) cm long, the apices extended into an elongate cirrus, without reduced or vestigial pinnae, adaxially flat, abaxially with more or less regularly arranged (at least proximally), distantly spaced clusters of dark–tipped, recurved spines, terminating in a stub, without a shallow groove adaxially"
rules: "Petioles and rachises with long, straight, yellowish or brownish, black-tipped, usually solitary spines abaxially and laterally (0); petioles and rachises without long, straight, spines abaxially and laterally (1)"
code: "rachis"
rule "0" doesn't apply here, therefore it must be rule "1". output: "{"rachis": "1"}"

### Example 2 ###
description: "seeds 1 per fruit"
rules: "Seeds 1 per fruit (0); seeds 2-3 per fruit (1)"
code: "seeded"
The description clearly states that there is 1 seed per fruit, therefore assign rule "0". output: "{"seeded": "0"}"

### Example 3 ###
description: "leaf sheaths with numerous spicules borne on short, low, horizontal ridges, easily detached and leaving the sheaths with ridges only"
rules: "Leaf sheath spines slender to stout, triangular, concave at the base proximally, horizontally spreading or downward pointing, scattered to dense, rarely in horizontal rows, yellowish-brown to dark brown (0); leaf sheath spines short to long, triangular, concave at the base proximally, usually horizontally spreading, scattered to dense, yellowish-brown to dark brown, slightly swollen-based or with an adjacent swelling (1); leaf sheath spines not as above (2)"
code: "dactyl"
The description does not match rules "0" or "1", therefore we must assign rule "2". output: "{"dactyl": "2"}"

### Example 4 ###
description: " "
rules: "Staminate sepals as long as the petals, splitting almost to the base (0); staminate sepals usually shorter than the petals, cupular, 3-lobed at the apex (1); staminate sepals as long as petals (splitting not recorded) (2)"
code: "sepals"
There is no mention of sepals in the description, therefore we must assign "null". output: "{"sepals": null}"

### Example 5 ### where the value is multiple numbers
description: "Stems clustered, rarely solitary"
rules: "Stems solitary (0); stems clustered (1)"
code: "solclu"
This description applied to multiple rules, therefore assign both rules. output: "{"solclu": "0,1"}"
"#;

/// Prompt style for qualitative extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// No examples or intermediate reasoning
    ZeroShot,
    /// Worked examples guide the answer
    FewShot,
    /// Chain of thought: questions, answers, then a score
    ChainOfThought,
    /// Chain of thought followed by worked examples
    ChainOfThoughtFewShot,
}

impl PromptStyle {
    pub const NAMES: [&'static str; 4] = ["zeroshot", "fewshot", "cot", "cot-fewshot"];

    fn template(self) -> String {
        match self {
            PromptStyle::ZeroShot => TASK_HEADER.to_string(),
            PromptStyle::FewShot => format!("{}{}", TASK_HEADER, WORKED_EXAMPLES),
            PromptStyle::ChainOfThought => COT_STEPS.to_string(),
            PromptStyle::ChainOfThoughtFewShot => {
                format!("### Instructions ###\n{}{}", COT_STEPS, WORKED_EXAMPLES)
            }
        }
    }
}

impl FromStr for PromptStyle {
    type Err = MonographError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zeroshot" => Ok(PromptStyle::ZeroShot),
            "fewshot" => Ok(PromptStyle::FewShot),
            "cot" => Ok(PromptStyle::ChainOfThought),
            "cot-fewshot" => Ok(PromptStyle::ChainOfThoughtFewShot),
            other => Err(MonographError::Config(format!(
                "Unknown prompt style {:?}, expected one of {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for PromptStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PromptStyle::ZeroShot => Self::NAMES[0],
            PromptStyle::FewShot => Self::NAMES[1],
            PromptStyle::ChainOfThought => Self::NAMES[2],
            PromptStyle::ChainOfThoughtFewShot => Self::NAMES[3],
        };
        f.write_str(name)
    }
}

/// Build the appendix 1 prompt for one code
pub fn build_quantitative_prompt(subject_para: &str, code: &str) -> String {
    fill(
        QUANTITATIVE_PROMPT,
        &[("subject_para", subject_para), ("code", code)],
    )
}

/// Build an appendix 2 prompt for a batch of `{code, rules}` records (JSON)
pub fn build_qualitative_prompt(style: PromptStyle, subject_para: &str, rules_batch: &str) -> String {
    fill(
        &style.template(),
        &[("rules_batch", rules_batch), ("subject_para", subject_para)],
    )
}
