//! Structured data from free-form model text.
//!
//! Models wrap JSON in prose or code fences often enough that the response
//! is scanned for the outermost object (or array) instead of being parsed
//! whole.

use serde::{Deserialize, Serialize};

/// Parse the outermost `{..}` span of `text`, falling back to `[..]`.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    span(text, '{', '}')
        .and_then(parse_span)
        .or_else(|| span(text, '[', ']').and_then(parse_span))
}

fn span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn parse_span(candidate: &str) -> Option<serde_json::Value> {
    match serde_json::from_str(candidate) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "Model response span is not valid JSON");
            None
        }
    }
}

/// Positive/negative prompt pair derived for a shot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDerivation {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub aspect_ratio: String,
}

impl PromptDerivation {
    /// Read `positivePrompt`/`negativePrompt`/`aspectRatio` from the model
    /// reply. A reply without a usable `positivePrompt` is taken verbatim
    /// as the positive prompt.
    pub fn from_response(text: &str, default_aspect: &str) -> Self {
        let json = extract_json(text);
        let field = |name: &str| {
            json.as_ref()
                .and_then(|v| v.get(name))
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        match field("positivePrompt") {
            Some(positive_prompt) => Self {
                positive_prompt,
                negative_prompt: field("negativePrompt").unwrap_or_default(),
                aspect_ratio: field("aspectRatio").unwrap_or_else(|| default_aspect.to_string()),
            },
            None => Self {
                positive_prompt: text.to_string(),
                negative_prompt: String::new(),
                aspect_ratio: default_aspect.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Script breakdown
// ---------------------------------------------------------------------------

/// Duration given to every shot of a fresh breakdown.
pub const DEFAULT_SHOT_DURATION: &str = "15s";

/// One shot of a script breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptShot {
    pub scene_number: String,
    pub shot_number: String,
    pub original_text: String,
    pub visual_description: String,
    pub camera_action: String,
    pub dialogue_or_audio: String,
    pub duration: String,
}

impl ScriptShot {
    fn numbered(index: usize) -> Self {
        Self {
            scene_number: "1".to_string(),
            shot_number: (index + 1).to_string(),
            original_text: String::new(),
            visual_description: String::new(),
            camera_action: String::new(),
            dialogue_or_audio: String::new(),
            duration: DEFAULT_SHOT_DURATION.to_string(),
        }
    }
}

/// Read the segment array a model returned for a script breakdown.
///
/// Accepts a bare array, or an object holding the array under any key
/// (what JSON-object response modes produce). Returns `None` when no
/// array of segments is found.
pub fn parse_breakdown(text: &str) -> Option<Vec<ScriptShot>> {
    let array_first = match (text.find('['), text.find('{')) {
        (Some(a), Some(o)) => a < o,
        (Some(_), None) => true,
        _ => false,
    };
    let json = if array_first {
        span(text, '[', ']').and_then(parse_span)
    } else {
        extract_json(text)
    }?;

    let segments = match json {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => map.into_iter().find_map(|(_, v)| match v {
            serde_json::Value::Array(items) => Some(items),
            _ => None,
        })?,
        _ => return None,
    };

    Some(
        segments
            .iter()
            .enumerate()
            .map(|(index, item)| ScriptShot {
                original_text: first_str(item, &["segment_text"]),
                visual_description: first_str(item, &["visual_description", "visual_cue"]),
                camera_action: first_str(item, &["composition"]),
                dialogue_or_audio: first_str(item, &["audio_cue"]),
                ..ScriptShot::numbered(index)
            })
            .collect(),
    )
}

/// The first non-empty string under `keys`.
fn first_str(item: &serde_json::Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// One shot per non-blank script line, without calling a model.
pub fn break_down_by_line(script: &str) -> Vec<ScriptShot> {
    script
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| ScriptShot {
            original_text: line.to_string(),
            visual_description: line.to_string(),
            ..ScriptShot::numbered(index)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let text = "Sure!\n```json\n{\"a\": {\"b\": 1}}\n```\nDone.";
        assert_eq!(extract_json(text), Some(serde_json::json!({"a": {"b": 1}})));
    }

    #[test]
    fn falls_back_to_array() {
        let text = "Shots: [1, 2, 3]";
        assert_eq!(extract_json(text), Some(serde_json::json!([1, 2, 3])));
    }

    #[test]
    fn returns_none_for_plain_text() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn derivation_reads_fields() {
        let text = r#"{"positivePrompt":"a cat","negativePrompt":"blur","aspectRatio":"16:9"}"#;
        let d = PromptDerivation::from_response(text, "1:1");
        assert_eq!(d.positive_prompt, "a cat");
        assert_eq!(d.negative_prompt, "blur");
        assert_eq!(d.aspect_ratio, "16:9");
    }

    #[test]
    fn derivation_falls_back_to_raw_text() {
        let d = PromptDerivation::from_response("a cinematic wide shot", "9:16");
        assert_eq!(d.positive_prompt, "a cinematic wide shot");
        assert!(d.negative_prompt.is_empty());
        assert_eq!(d.aspect_ratio, "9:16");
    }

    #[test]
    fn derivation_uses_default_aspect_when_missing() {
        let d = PromptDerivation::from_response(r#"{"positivePrompt":"x"}"#, "4:3");
        assert_eq!(d.aspect_ratio, "4:3");
    }

    #[test]
    fn breakdown_reads_array_segments() {
        let text = r#"Here you go:
[{"segment_text":"He opens the door","visual_cue":"dim hallway","composition":"low angle","audio_cue":"creak"},
 {"segment_text":"She turns","visual_description":"close-up"}]"#;
        let shots = parse_breakdown(text).unwrap();
        assert_eq!(shots.len(), 2);
        assert_eq!(shots[0].original_text, "He opens the door");
        assert_eq!(shots[0].visual_description, "dim hallway");
        assert_eq!(shots[0].camera_action, "low angle");
        assert_eq!(shots[0].dialogue_or_audio, "creak");
        assert_eq!(shots[1].shot_number, "2");
        assert_eq!(shots[1].visual_description, "close-up");
        assert_eq!(shots[1].duration, DEFAULT_SHOT_DURATION);
    }

    #[test]
    fn breakdown_with_one_segment_is_still_an_array() {
        let shots = parse_breakdown(r#"[{"segment_text":"only"}]"#).unwrap();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].original_text, "only");
    }

    #[test]
    fn breakdown_unwraps_json_object_mode() {
        let shots = parse_breakdown(r#"{"segments":[{"segment_text":"a"},{"segment_text":"b"}]}"#)
            .unwrap();
        assert_eq!(shots.len(), 2);
        assert_eq!(shots[1].original_text, "b");
    }

    #[test]
    fn breakdown_rejects_non_arrays() {
        assert_eq!(parse_breakdown(r#"{"segment_text":"a"}"#), None);
        assert_eq!(parse_breakdown("I cannot help with that."), None);
    }

    #[test]
    fn line_breakdown_skips_blank_lines() {
        let shots = break_down_by_line("First line\n\n  Second line  \n");
        assert_eq!(shots.len(), 2);
        assert_eq!(shots[1].shot_number, "2");
        assert_eq!(shots[1].original_text, "Second line");
        assert_eq!(shots[1].visual_description, "Second line");
        assert_eq!(shots[0].scene_number, "1");
    }
}
