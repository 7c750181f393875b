//! The structured reply contract between the tutor and the completion engine.
//!
//! The engine is asked for JSON of exactly this shape, but instruction following
//! is not guaranteed. [`parse_reply`] therefore never fails: output that does not
//! fit the shape is replaced by [`StructuredReply::fallback`].

use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

/// The tutor's answer to one learner utterance.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct StructuredReply {
    /// The learner's utterance with corrections applied.
    pub corrected_german: String,
    pub english_translation: String,
    /// In order of occurrence in the utterance.
    pub corrections: Vec<Correction>,
    pub pronunciation_assessment: PronunciationAssessment,
    /// The tutor's next conversational line.
    pub continue_german: String,
    /// English meaning of `continue_german`, when the engine supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_english: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Correction {
    #[serde(rename = "type")]
    pub kind: CorrectionKind,
    pub original: String,
    pub corrected: String,
    pub reason: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    Grammar,
    Vocabulary,
    #[serde(other)]
    Other,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct PronunciationAssessment {
    pub quality: PronunciationQuality,
    #[serde(default)]
    pub issue: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PronunciationQuality {
    Clear,
    Acceptable,
    NeedsWork,
}

/// Tutor line used when the engine's reply cannot be understood.
pub const FALLBACK_CONTINUATION: &str = "Interessant! Erzähl mir mehr.";

impl StructuredReply {
    /// The deterministic substitute for an unparseable engine reply.
    pub fn fallback(transcript: &str) -> Self {
        Self {
            corrected_german: transcript.to_string(),
            english_translation: format!("(Your input: {transcript})"),
            corrections: Vec::new(),
            pronunciation_assessment: PronunciationAssessment {
                quality: PronunciationQuality::Acceptable,
                issue: None,
            },
            continue_german: FALLBACK_CONTINUATION.to_string(),
            continue_english: None,
        }
    }

    pub fn correction_count(&self) -> usize {
        self.corrections.len()
    }
}

#[derive(Debug, thiserror::Error)]
enum ReplyShapeError {
    #[error("engine reply was empty")]
    Empty,
    #[error("engine reply does not match the reply shape: {0}")]
    Shape(#[from] serde_json::Error),
}

fn try_parse(raw: &str) -> Result<StructuredReply, ReplyShapeError> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return Err(ReplyShapeError::Empty);
    }
    Ok(serde_json::from_str(body)?)
}

/// Accepts a reply wrapped in a Markdown code fence (```json ... ```).
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim()
}

/// Parses the engine's raw output, substituting the fallback for anything
/// that is not a complete [`StructuredReply`].
pub fn parse_reply(raw: &str, transcript: &str) -> StructuredReply {
    match try_parse(raw) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "Engine reply not usable, substituting fallback");
            StructuredReply::fallback(transcript)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "corrected_german": "Ich habe gut Deutsch gesprochen.",
        "english_translation": "I spoke German well.",
        "corrections": [
            {"type": "grammar", "original": "gutes", "corrected": "gut",
             "reason": "Adverb, not adjective"}
        ],
        "pronunciation_assessment": {"quality": "clear", "issue": null},
        "continue_german": "Super! Was hast du heute gemacht?"
    }"#;

    #[test]
    fn test_valid_reply_keeps_every_field() {
        let reply = parse_reply(VALID, "Ich habe gutes Deutsch gesprochen");
        assert_eq!(reply.corrected_german, "Ich habe gut Deutsch gesprochen.");
        assert_eq!(reply.english_translation, "I spoke German well.");
        assert_eq!(reply.correction_count(), 1);
        assert_eq!(reply.corrections[0].kind, CorrectionKind::Grammar);
        assert_eq!(reply.corrections[0].original, "gutes");
        assert_eq!(
            reply.pronunciation_assessment.quality,
            PronunciationQuality::Clear
        );
        assert_eq!(reply.pronunciation_assessment.issue, None);
        assert_eq!(reply.continue_german, "Super! Was hast du heute gemacht?");
        assert_eq!(reply.continue_english, None);
    }

    #[test]
    fn test_reserialized_reply_parses_identically() {
        let reply = parse_reply(VALID, "x");
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(parse_reply(&json, "y"), reply);
    }

    #[test]
    fn test_non_json_yields_fallback() {
        let reply = parse_reply("Sure! Here is my answer: Hallo!", "Hallo wie geht");
        assert_eq!(reply, StructuredReply::fallback("Hallo wie geht"));
        assert_eq!(reply.corrected_german, "Hallo wie geht");
        assert_eq!(reply.english_translation, "(Your input: Hallo wie geht)");
        assert!(reply.corrections.is_empty());
        assert_eq!(
            reply.pronunciation_assessment.quality,
            PronunciationQuality::Acceptable
        );
        assert_eq!(reply.continue_german, FALLBACK_CONTINUATION);
    }

    #[test]
    fn test_missing_required_field_yields_fallback() {
        let json = r#"{
            "corrected_german": "Hallo.",
            "english_translation": "Hello.",
            "corrections": [],
            "pronunciation_assessment": {"quality": "clear"}
        }"#;
        let reply = parse_reply(json, "Hallo");
        assert_eq!(reply.corrected_german, "Hallo");
        assert_eq!(reply.continue_german, FALLBACK_CONTINUATION);
    }

    #[test]
    fn test_empty_output_yields_fallback() {
        assert_eq!(
            parse_reply("   ", "Guten Tag"),
            StructuredReply::fallback("Guten Tag")
        );
    }

    #[test]
    fn test_unknown_quality_yields_fallback() {
        let json = VALID.replace("\"clear\"", "\"perfect\"");
        assert_eq!(parse_reply(&json, "t").corrected_german, "t");
    }

    #[test]
    fn test_code_fenced_reply_is_accepted() {
        let fenced = format!("```json\n{VALID}\n```");
        let reply = parse_reply(&fenced, "x");
        assert_eq!(reply.correction_count(), 1);
    }

    #[test]
    fn test_unknown_correction_kind_maps_to_other() {
        let json = VALID.replace("\"grammar\"", "\"spelling\"");
        let reply = parse_reply(&json, "x");
        assert_eq!(reply.corrections[0].kind, CorrectionKind::Other);
    }

    #[test]
    fn test_optional_continue_english() {
        let json = VALID.replace(
            "\"continue_german\"",
            "\"continue_english\": \"Great! What did you do today?\", \"continue_german\"",
        );
        let reply = parse_reply(&json, "x");
        assert_eq!(
            reply.continue_english.as_deref(),
            Some("Great! What did you do today?")
        );
    }
}
