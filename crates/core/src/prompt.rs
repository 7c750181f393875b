//! Prompt Composer
//!
//! Builds the instruction text and dialogue history sent to the completion
//! engine. Composition is a pure function of the profile and the recent turns.

use crate::{profile::LearnerProfile, records::ConversationTurn};
use std::fmt::Write;

/// Number of prior turns replayed to the engine as dialogue history.
pub const CONTEXT_TURNS: usize = 3;

/// How many weaknesses / pronunciation issues are named in the prompt.
const FOCUS_ITEMS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// The composed prompt: system instructions plus alternating prior dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub instructions: String,
    pub history: Vec<ChatMessage>,
}

/// Composes the prompt for the next turn from the profile and the session so far.
pub fn compose(profile: &LearnerProfile, transcript: &[ConversationTurn]) -> Prompt {
    let recent = &transcript[transcript.len().saturating_sub(CONTEXT_TURNS)..];
    Prompt {
        instructions: instructions(profile),
        history: recent.iter().flat_map(history_entries).collect(),
    }
}

fn history_entries(turn: &ConversationTurn) -> [ChatMessage; 2] {
    // The reply is replayed in the same JSON shape the engine must produce.
    let assistant = serde_json::to_string(&turn.reply)
        .unwrap_or_else(|_| turn.reply.continue_german.clone());
    [
        ChatMessage {
            role: ChatRole::User,
            content: turn.user_input.clone(),
        },
        ChatMessage {
            role: ChatRole::Assistant,
            content: assistant,
        },
    ]
}

fn focus_list(items: &[String], empty_marker: &str) -> String {
    if items.is_empty() {
        empty_marker.to_string()
    } else {
        items
            .iter()
            .take(FOCUS_ITEMS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn instructions(profile: &LearnerProfile) -> String {
    let weaknesses = focus_list(&profile.weaknesses, "none identified yet");
    let pronunciation = focus_list(&profile.pronunciation_issues, "none yet");
    let topics = if profile.preferred_topics.is_empty() {
        "none given yet".to_string()
    } else {
        profile.preferred_topics.join(", ")
    };
    let level = &profile.current_level;

    let mut prompt = String::new();
    // Writing into a String cannot fail.
    let _ = write!(
        prompt,
        "You are an expert German language tutor designed for immersive conversation-based learning.

LEARNER PROFILE:
- Name: {name}
- Current Level: {level}
- Sessions Completed: {sessions}
- Topics of Interest: {topics}
- Known Weaknesses: {weaknesses}
- Pronunciation Issues: {pronunciation}
",
        name = profile.name,
        sessions = profile.session_count,
    );
    if !profile.personality_context.is_empty() {
        let _ = writeln!(prompt, "- Background: {}", profile.personality_context);
    }
    let _ = write!(
        prompt,
        r#"
YOUR ROLE:
1. Engage in natural German conversation.
2. When the learner speaks, REPEAT BACK what they said with corrections applied.
3. Provide an English translation of the corrected sentence [like this].
4. Keep corrections MINIMAL and clear. Only flag real errors, not minor ones.
5. Continue the conversation naturally. Do not interrupt the learning flow.
6. Gradually steer toward the learner's weak areas ({weaknesses}) and their topics of interest.
7. Keep your German simple and appropriate for level {level}.
8. This is conversation #{number}. Reference earlier topics if the learner mentions them.

RESPONSE FORMAT - ABSOLUTELY CRITICAL:
Return ONLY one valid JSON object. No markdown, no code blocks, no text before or after it.

Required JSON structure:
{{
  "corrected_german": "<their sentence with corrections applied>",
  "english_translation": "<English meaning of the corrected sentence>",
  "corrections": [
    {{"type": "grammar", "original": "<word>", "corrected": "<word>", "reason": "<explanation>"}},
    {{"type": "vocabulary", "original": "<word>", "corrected": "<word>", "reason": "<explanation>"}}
  ],
  "pronunciation_assessment": {{"quality": "clear | acceptable | needs_work", "issue": "<specific sound, or null>"}},
  "continue_german": "<your next line, continuing the conversation in German>",
  "continue_english": "<optional English meaning of your next line>"
}}

"type" is one of "grammar", "vocabulary" or "other". List corrections in the order they occur in the learner's sentence. Use an empty list when nothing needs correcting."#,
        number = profile.next_session_number(),
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::StructuredReply;

    fn profile() -> LearnerProfile {
        let mut profile = LearnerProfile::new("Anna");
        profile.session_count = 4;
        profile.preferred_topics = vec!["music_production".into(), "pcb_design".into()];
        profile
    }

    fn turn(text: &str) -> ConversationTurn {
        ConversationTurn::new(text.to_string(), StructuredReply::fallback(text))
    }

    #[test]
    fn test_instructions_embed_profile() {
        let prompt = compose(&profile(), &[]);
        let text = &prompt.instructions;
        assert!(text.contains("Name: Anna"));
        assert!(text.contains("Current Level: A1"));
        assert!(text.contains("Sessions Completed: 4"));
        assert!(text.contains("music_production, pcb_design"));
        assert!(text.contains("Known Weaknesses: none identified yet"));
        assert!(text.contains("Pronunciation Issues: none yet"));
        assert!(text.contains("conversation #5"));
        assert!(text.contains("\"continue_german\""));
        assert!(prompt.history.is_empty());
    }

    #[test]
    fn test_only_top_three_focus_items() {
        let mut profile = profile();
        profile.weaknesses = vec!["w1".into(), "w2".into(), "w3".into(), "w4".into()];
        profile.pronunciation_issues = vec!["ü".into(), "ch".into()];

        let text = compose(&profile, &[]).instructions;
        assert!(text.contains("Known Weaknesses: w1, w2, w3\n"));
        assert!(!text.contains("w4"));
        assert!(text.contains("Pronunciation Issues: ü, ch"));
    }

    #[test]
    fn test_history_alternates_and_keeps_last_three_turns() {
        let transcript: Vec<_> = ["eins", "zwei", "drei", "vier"]
            .into_iter()
            .map(turn)
            .collect();

        let history = compose(&profile(), &transcript).history;
        assert_eq!(history.len(), 6);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[0].content, "zwei");
        assert_eq!(history[1].role, ChatRole::Assistant);
        let replayed = &history[1].content;
        assert!(replayed.contains("\"corrected_german\":\"zwei\""));
        assert_eq!(history[4].content, "vier");
        assert_eq!(history[5].role, ChatRole::Assistant);
    }

    #[test]
    fn test_compose_is_deterministic() {
        let transcript = vec![turn("Hallo")];
        assert_eq!(
            compose(&profile(), &transcript),
            compose(&profile(), &transcript)
        );
    }
}
