//! crates/cognify_core/src/dialogue.rs
//!
//! The dialogue sub-protocol layered on the model's free-text channel.
//!
//! A tutor reply may end with up to two trailing markers, in this fixed order:
//! an evaluation marker (`[EVAL:correct]` or `[EVAL:incorrect]`) followed by a
//! suggestions marker (`[REC: <phrase> | <phrase>]`). Model output is treated
//! as adversarial input to this small grammar: decomposition is a total
//! function, and anything that does not match a marker literal exactly is left
//! in the display text rather than rejected.

/// Literal marker the model emits when the learner's answer was correct.
pub const EVAL_CORRECT: &str = "[EVAL:correct]";
/// Literal marker the model emits when the learner's answer was incorrect.
pub const EVAL_INCORRECT: &str = "[EVAL:incorrect]";
/// Opening literal of the suggestions marker.
pub const REC_OPEN: &str = "[REC:";
/// Delimiter between the two suggested phrases inside the suggestions marker.
pub const REC_DELIMITER: char = '|';

/// The model's verdict on the learner's previous answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Correct,
    Incorrect,
}

/// The result of decomposing one raw tutor reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecomposedReply {
    /// The reply with any recognized trailing markers stripped. This is what
    /// gets persisted, displayed, and spoken.
    pub display_text: String,
    /// `None` means the model did not evaluate this turn.
    pub evaluation: Option<Evaluation>,
    /// Exactly two suggested next learner replies, when present.
    pub suggestions: Option<[String; 2]>,
}

/// Decomposes a raw model reply into display text, evaluation, and suggestions.
///
/// Matching is anchored at the end of the string: a marker only counts if it is
/// the literal tail of the reply (after the suggestions marker, if any, has been
/// stripped). A marker-like phrase in the middle of ordinary prose is never
/// misread as a marker. Malformed markers (wrong arity, unknown verdict, no
/// closing bracket) are treated as absent and stay in the display text.
pub fn decompose_reply(raw: &str) -> DecomposedReply {
    let mut rest = raw.trim_end();

    let suggestions = match split_trailing_suggestions(rest) {
        Some((prose, pair)) => {
            rest = prose.trim_end();
            Some(pair)
        }
        None => None,
    };

    // If several evaluation markers are stacked at the tail, strip them all;
    // the earliest one in the string is the one that counts.
    let mut evaluation = None;
    loop {
        if let Some(prose) = rest.strip_suffix(EVAL_CORRECT) {
            evaluation = Some(Evaluation::Correct);
            rest = prose.trim_end();
        } else if let Some(prose) = rest.strip_suffix(EVAL_INCORRECT) {
            evaluation = Some(Evaluation::Incorrect);
            rest = prose.trim_end();
        } else {
            break;
        }
    }

    DecomposedReply {
        display_text: rest.trim().to_string(),
        evaluation,
        suggestions,
    }
}

/// Splits a trailing, well-formed suggestions marker off `text`.
///
/// Returns the prose before the marker and the two trimmed phrases, or `None`
/// when the tail is not a suggestions marker with exactly two non-empty phrases.
fn split_trailing_suggestions(text: &str) -> Option<(&str, [String; 2])> {
    let text = text.strip_suffix(']')?;
    let open = text.rfind(REC_OPEN)?;
    let interior = &text[open + REC_OPEN.len()..];

    let mut phrases = interior.split(REC_DELIMITER).map(str::trim);
    let first = phrases.next()?;
    let second = phrases.next()?;
    if phrases.next().is_some() || first.is_empty() || second.is_empty() {
        return None;
    }

    Some((&text[..open], [first.to_string(), second.to_string()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_reply_with_both_markers() {
        let reply = "Great job! [EVAL:correct][REC: Ask another question | I'd like a summary]";
        let decomposed = decompose_reply(reply);
        assert_eq!(decomposed.display_text, "Great job!");
        assert_eq!(decomposed.evaluation, Some(Evaluation::Correct));
        assert_eq!(
            decomposed.suggestions,
            Some([
                "Ask another question".to_string(),
                "I'd like a summary".to_string()
            ])
        );
    }

    #[test]
    fn plain_prose_passes_through_untouched() {
        let decomposed = decompose_reply("Let's start with chapter one.");
        assert_eq!(decomposed.display_text, "Let's start with chapter one.");
        assert_eq!(decomposed.evaluation, None);
        assert_eq!(decomposed.suggestions, None);
    }

    #[test]
    fn incorrect_marker_alone_is_recognized() {
        let decomposed = decompose_reply("Not quite, the answer was osmosis. [EVAL:incorrect]");
        assert_eq!(decomposed.display_text, "Not quite, the answer was osmosis.");
        assert_eq!(decomposed.evaluation, Some(Evaluation::Incorrect));
        assert_eq!(decomposed.suggestions, None);
    }

    #[test]
    fn suggestions_alone_are_recognized() {
        let decomposed = decompose_reply("What would you like next? [REC: Quiz me | Summarize chapter two]");
        assert_eq!(decomposed.display_text, "What would you like next?");
        assert_eq!(decomposed.evaluation, None);
        assert_eq!(
            decomposed.suggestions,
            Some(["Quiz me".to_string(), "Summarize chapter two".to_string()])
        );
    }

    #[test]
    fn marker_like_prose_mid_sentence_is_not_a_marker() {
        // Anchored matching: only a literal tail counts.
        let reply = "The token [EVAL:correct] signals a right answer, as we discussed.";
        let decomposed = decompose_reply(reply);
        assert_eq!(decomposed.display_text, reply);
        assert_eq!(decomposed.evaluation, None);
    }

    #[test]
    fn malformed_suggestion_arity_is_treated_as_absent() {
        let one = decompose_reply("Next? [REC: Only one option]");
        assert_eq!(one.suggestions, None);
        assert_eq!(one.display_text, "Next? [REC: Only one option]");

        let three = decompose_reply("Next? [REC: a | b | c]");
        assert_eq!(three.suggestions, None);
        assert_eq!(three.display_text, "Next? [REC: a | b | c]");
    }

    #[test]
    fn unknown_verdict_is_treated_as_absent() {
        let decomposed = decompose_reply("Hmm. [EVAL:maybe]");
        assert_eq!(decomposed.evaluation, None);
        assert_eq!(decomposed.display_text, "Hmm. [EVAL:maybe]");
    }

    #[test]
    fn stacked_evaluation_markers_first_literal_wins() {
        let decomposed = decompose_reply("Well. [EVAL:correct][EVAL:incorrect]");
        assert_eq!(decomposed.evaluation, Some(Evaluation::Correct));
        assert_eq!(decomposed.display_text, "Well.");
    }

    #[test]
    fn decomposition_is_total_on_hostile_input() {
        for raw in [
            "",
            "   ",
            "]",
            "[REC:",
            "[REC: | ]",
            "[EVAL:correct",
            "[[EVAL:correct]]",
            "[REC: a | b] trailing prose after marker",
        ] {
            // Must never panic, whatever the shape of the input.
            let _ = decompose_reply(raw);
        }
    }

    #[test]
    fn stripping_canonical_markers_leaves_no_residue() {
        let decomposed =
            decompose_reply("Photosynthesis happens in the chloroplast. [EVAL:incorrect][REC: Try again | Give me a hint]");
        assert!(!decomposed.display_text.contains("[EVAL:"));
        assert!(!decomposed.display_text.contains("[REC:"));
        assert_eq!(
            decomposed.display_text,
            "Photosynthesis happens in the chloroplast."
        );
    }
}
