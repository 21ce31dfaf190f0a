//! Lexicon/rule-based sentiment scoring.
//!
//! The scorer is pure, deterministic and total: any input maps to a value in
//! [-1.0, 1.0], unrecognized tokens are ignored, and malformed or empty text
//! scores 0.0 rather than erroring. Keeping this function total removes an
//! entire failure class from ingestion.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Tokens after a negation have their polarity flipped, up to this many.
const NEGATION_WINDOW: usize = 3;

static POSITIVE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "good", "great", "excellent", "happy", "satisfied", "love", "loved", "wonderful",
        "amazing", "fantastic", "awesome", "enjoy", "enjoyed", "enjoying", "supportive",
        "support", "supported", "helpful", "appreciate", "appreciated", "motivated",
        "motivating", "excited", "exciting", "growth", "fair", "friendly", "balanced",
        "recognized", "rewarding", "valued", "positive", "fun", "flexible", "calm",
        "thriving", "proud", "respected", "engaged",
    ]
    .into_iter()
    .collect()
});

static NEGATIVE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "bad", "terrible", "awful", "sad", "frustrated", "frustrating", "hate", "hated",
        "angry", "stress", "stressed", "stressful", "burnout", "burned", "exhausted",
        "exhausting", "overworked", "overwhelmed", "tired", "toxic", "unfair", "underpaid",
        "micromanaged", "micromanagement", "quit", "quitting", "resign", "resigning",
        "bored", "boring", "ignored", "undervalued", "disrespected", "anxious", "anxiety",
        "depressed", "miserable", "complaint", "complaints", "complain", "worried",
        "worse", "worst", "pressure", "unhappy", "disappointed", "hostile", "chaotic",
        "unsupported", "unappreciated",
    ]
    .into_iter()
    .collect()
});

static NEGATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "not", "never", "no", "nothing", "cannot", "cant", "dont", "wont", "didnt",
        "doesnt", "isnt", "arent", "wasnt", "werent", "without",
    ]
    .into_iter()
    .collect()
});

/// Score a free-text answer. Always in [-1.0, 1.0].
pub fn score(text: &str) -> f64 {
    let mut sentence_scores = Vec::new();
    for sentence in text.split(['.', '!', '?', '\n']) {
        if let Some(s) = score_sentence(sentence) {
            sentence_scores.push(s);
        }
    }
    if sentence_scores.is_empty() {
        return 0.0;
    }
    sentence_scores.iter().sum::<f64>() / sentence_scores.len() as f64
}

/// Per-response score persisted on SurveyResponse: the mean of the per-answer
/// scores. Answers are pre-validated to align 1:1 with questions.
pub fn score_response(answers: &[String]) -> f64 {
    if answers.is_empty() {
        return 0.0;
    }
    answers.iter().map(|a| score(a)).sum::<f64>() / answers.len() as f64
}

fn score_sentence(sentence: &str) -> Option<f64> {
    let tokens = tokenize(sentence);
    if tokens.is_empty() {
        return None;
    }

    let mut sum = 0.0;
    let mut negation_left = 0usize;
    for token in &tokens {
        if NEGATIONS.contains(token.as_str()) {
            negation_left = NEGATION_WINDOW;
            continue;
        }
        let hit = if POSITIVE.contains(token.as_str()) {
            1.0
        } else if NEGATIVE.contains(token.as_str()) {
            -1.0
        } else {
            0.0
        };
        if negation_left > 0 {
            sum -= hit;
            negation_left -= 1;
        } else {
            sum += hit;
        }
    }

    // sqrt-of-length normalization dampens length bias without washing out
    // short emphatic sentences; clamp keeps each sentence bounded.
    Some((sum / (tokens.len() as f64).sqrt()).clamp(-1.0, 1.0))
}

fn tokenize(sentence: &str) -> Vec<String> {
    // Apostrophes are dropped (don't -> dont) so contractions hit the
    // negation list; everything else non-alphanumeric separates tokens.
    sentence
        .to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
