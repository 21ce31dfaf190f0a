//! Risk-factor extraction: recurring phrases mined from negative-sentiment
//! responses, used as the explanatory signal on the dashboard.

use crate::config::AnalyticsConfig;
use crate::db;
use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::collections::HashSet;
use uuid::Uuid;

const MAX_PHRASE_LEN: usize = 3;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "i", "me", "my", "we", "our", "you", "your", "he", "she", "it", "its", "they",
        "them", "their", "a", "an", "the", "this", "that", "these", "those", "am", "is",
        "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
        "did", "will", "would", "should", "could", "can", "and", "or", "but", "if", "so",
        "as", "of", "at", "by", "for", "with", "to", "from", "in", "on", "too", "very",
        "just", "here", "there", "then", "than", "when", "while", "what", "which", "who",
        "how", "all", "any", "some", "no", "not", "never", "dont", "cant", "wont",
        "really", "feel", "feels", "felt", "get", "gets", "got", "much", "more", "most",
    ]
    .into_iter()
    .collect()
});

struct PhraseStat {
    count: usize,
    first_seen: usize,
}

/// Top-k recurring phrases across the company's negative responses. Ordered
/// by frequency, ties broken by first appearance so equal counts stay stable
/// under replay. Zero qualifying responses yields an empty list.
pub async fn top_factors(
    pool: &SqlitePool,
    cfg: &AnalyticsConfig,
    company_id: Uuid,
    k: usize,
) -> Result<Vec<String>, sqlx::Error> {
    let responses =
        db::list_negative_responses(pool, company_id, cfg.negativity_threshold).await?;

    let mut stats: HashMap<String, PhraseStat> = HashMap::new();
    let mut order = 0usize;
    for response in &responses {
        for answer in response.answers.iter() {
            for phrase in candidate_phrases(answer) {
                order += 1;
                stats
                    .entry(phrase)
                    .and_modify(|s| s.count += 1)
                    .or_insert(PhraseStat {
                        count: 1,
                        first_seen: order,
                    });
            }
        }
    }

    let mut ranked: Vec<(String, PhraseStat)> = stats.into_iter().collect();
    ranked.sort_by(|(_, a), (_, b)| {
        b.count
            .cmp(&a.count)
            .then(a.first_seen.cmp(&b.first_seen))
    });

    Ok(ranked.into_iter().take(k).map(|(phrase, _)| phrase).collect())
}

/// Contiguous runs of 1..=3 non-stopword tokens.
fn candidate_phrases(text: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut run: Vec<String> = Vec::new();

    let mut flush = |run: &mut Vec<String>| {
        for start in 0..run.len() {
            for len in 1..=MAX_PHRASE_LEN.min(run.len() - start) {
                phrases.push(run[start..start + len].join(" "));
            }
        }
        run.clear();
    };

    for token in text
        .to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .split(|c: char| !c.is_alphanumeric())
    {
        if token.is_empty() || STOPWORDS.contains(token) {
            flush(&mut run);
        } else {
            run.push(token.to_string());
        }
    }
    flush(&mut run);
    phrases
}
