//! Story context and prompt assembly for continuation requests.

use serde::Deserialize;
use serde::Serialize;

/// How much of the outline is embedded in the system prompt, in characters.
const OUTLINE_PROMPT_BUDGET: usize = 500;

/// How much of the draft tail is sent as the user prompt, in characters.
const DRAFT_TAIL_BUDGET: usize = 1000;

/// Read-only bundle supplied by earlier planning stages. Consumed verbatim
/// when prompts are assembled; the prediction loop never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryContext {
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub outline: String,
    #[serde(default)]
    pub detailed_outline: String,
    #[serde(default)]
    pub characters: String,
}

/// First `max_chars` characters of `s`, cut on a char boundary.
pub(crate) fn take_first_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Last `max_chars` characters of `s`, cut on a char boundary.
pub(crate) fn take_last_chars(s: &str, max_chars: usize) -> &str {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s;
    }
    match s.char_indices().nth(char_count - max_chars) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

pub(crate) fn system_prompt(story: &StoryContext, prediction_length: u16) -> String {
    let mut requirements: Vec<String> = vec![
        format!("Tone and style: {}", story.style),
        format!(
            "Stay close to the outline: {}...",
            take_first_chars(&story.outline, OUTLINE_PROMPT_BUDGET)
        ),
    ];
    if !story.detailed_outline.is_empty() {
        requirements.push(format!(
            "Current chapter beats: {}...",
            take_first_chars(&story.detailed_outline, OUTLINE_PROMPT_BUDGET)
        ));
    }
    if !story.characters.is_empty() {
        requirements.push(format!("Cast and key elements: {}", story.characters));
    }
    requirements.push(format!(
        "Target length: about {prediction_length} characters."
    ));
    requirements.push(
        "Output only the continuation itself, with no commentary and no \
         repetition of earlier text."
            .to_string(),
    );

    let mut prompt = String::from(
        "You are an inline writing copilot for serialized fiction.\n\
         Continue the manuscript from where it leaves off.\n\
         Requirements:",
    );
    for (index, requirement) in requirements.iter().enumerate() {
        prompt.push_str(&format!("\n{}. {requirement}", index + 1));
    }
    prompt
}

pub(crate) fn user_prompt(draft: &str) -> String {
    format!(
        "The manuscript so far:\n{}\n\nContinue:",
        take_last_chars(draft, DRAFT_TAIL_BUDGET)
    )
}
