//! Word-count based transcript quality notes.

pub const NO_SPEECH: &str = "Low confidence: no speech detected.";
pub const VERY_SHORT: &str = "Low confidence: transcript is very short; try clearer audio.";
pub const LIMITED_CONTEXT: &str = "Medium confidence: transcript captured limited context.";
pub const SUFFICIENT: &str = "Higher confidence: transcript length is sufficient for summary quality.";

const SHORT_WORDS: usize = 12;
const MEDIUM_WORDS: usize = 35;

/// Classify a transcript by the number of whitespace-separated words.
pub fn classify(transcript: &str) -> &'static str {
    match transcript.split_whitespace().count() {
        0 => NO_SPEECH,
        n if n < SHORT_WORDS => VERY_SHORT,
        n if n < MEDIUM_WORDS => LIMITED_CONTEXT,
        _ => SUFFICIENT,
    }
}
