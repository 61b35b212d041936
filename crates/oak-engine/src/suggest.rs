//! Parent-session suggestion: vector search over session summaries,
//! optionally refined with an LLM similarity pass, to propose a parent
//! for a session the user never explicitly linked.

use rusqlite::Connection;
use serde::Serialize;

use oak_index::queries::{observations, sessions};
use oak_providers::{LlmChain, LlmRequest};
use oak_types::Timestamp;
use oak_vector::VectorStore;

use crate::error::Result;

const SUGGESTION_VECTOR_WEIGHT: f32 = 0.6;
const SUGGESTION_LLM_WEIGHT: f32 = 0.4;
const SUGGESTION_TIME_BONUS_1H_SECONDS: i64 = 3_600;
const SUGGESTION_TIME_BONUS_1H_VALUE: f32 = 0.05;
const SUGGESTION_TIME_BONUS_6H_SECONDS: i64 = 21_600;
const SUGGESTION_TIME_BONUS_6H_VALUE: f32 = 0.02;
const SUGGESTION_HIGH_THRESHOLD: f32 = 0.75;
const SUGGESTION_MEDIUM_THRESHOLD: f32 = 0.5;
const SUGGESTION_LOW_THRESHOLD: f32 = 0.3;
const SUGGESTION_MAX_CANDIDATES: usize = 10;
const SUGGESTION_MAX_AGE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    fn from_score(score: f32) -> Self {
        if score >= SUGGESTION_HIGH_THRESHOLD {
            Confidence::High
        } else if score >= SUGGESTION_MEDIUM_THRESHOLD {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestedParent {
    pub session_id: String,
    pub title: Option<String>,
    pub confidence: Confidence,
    pub confidence_score: f32,
    pub reason: String,
}

struct Candidate {
    session_id: String,
    title: Option<String>,
    summary: Option<String>,
    vector_similarity: f32,
    llm_score: Option<f32>,
    time_gap_seconds: Option<i64>,
    final_score: f32,
}

pub async fn compute_suggested_parent(
    conn: &Connection,
    vector_store: &VectorStore,
    llm: Option<&LlmChain>,
    session_id: &str,
) -> Result<Option<SuggestedParent>> {
    let Some(session) = sessions::get(conn, session_id)? else { return Ok(None) };
    if session.parent_session_id.is_some() || session.suggested_parent_dismissed {
        return Ok(None);
    }
    let Some(summary_obs) = observations::latest_session_summary(conn, session_id)? else { return Ok(None) };

    let query_text = format!("{}\n\n{}", session.title.clone().unwrap_or_default(), summary_obs.observation);
    let now_epoch = Timestamp::now().epoch();
    let similar = vector_store
        .find_similar_sessions(&query_text, &session.project_root, Some(session_id), SUGGESTION_MAX_CANDIDATES, SUGGESTION_MAX_AGE_DAYS, now_epoch)
        .await?;
    if similar.is_empty() {
        return Ok(None);
    }

    let mut candidates = Vec::new();
    for (candidate_id, vector_similarity) in similar {
        let Some(candidate_session) = sessions::get(conn, &candidate_id)? else { continue };
        if candidate_session.parent_session_id.as_deref() == Some(session_id) {
            continue;
        }
        let candidate_summary = observations::latest_session_summary(conn, &candidate_id)?.map(|o| o.observation);

        let time_gap_seconds = if let Some(ended_at) = candidate_session.ended_at {
            Some(session.started_at.seconds_since(&ended_at))
        } else {
            Some(session.started_at.seconds_since(&candidate_session.started_at))
        };

        candidates.push(Candidate {
            session_id: candidate_id,
            title: candidate_session.title,
            summary: candidate_summary,
            vector_similarity,
            llm_score: None,
            time_gap_seconds,
            final_score: 0.0,
        });
    }
    if candidates.is_empty() {
        return Ok(None);
    }

    let has_llm = llm.is_some();
    if let Some(llm) = llm {
        for candidate in &mut candidates {
            candidate.llm_score = Some(match &candidate.summary {
                Some(candidate_summary) => compute_llm_similarity(llm, &summary_obs.observation, candidate_summary).await,
                None => 0.0,
            });
        }
    }

    for candidate in &mut candidates {
        candidate.final_score = final_score(candidate, has_llm);
    }
    candidates.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));

    let best = &candidates[0];
    if best.final_score < SUGGESTION_LOW_THRESHOLD {
        return Ok(None);
    }

    Ok(Some(SuggestedParent {
        session_id: best.session_id.clone(),
        title: best.title.clone(),
        confidence: Confidence::from_score(best.final_score),
        confidence_score: best.final_score,
        reason: build_reason(best, has_llm),
    }))
}

async fn compute_llm_similarity(llm: &LlmChain, session_a_summary: &str, session_b_summary: &str) -> f32 {
    let prompt = format!(
        "Rate how related these two coding sessions are on a scale of 0.0 to 1.0.\n\n\
         Session A:\n{}\n\nSession B:\n{}\n\n\
         Consider:\n- Are they working on the same feature/bug?\n\
         - Do they reference the same files or components?\n- Is one a continuation of the other?\n\n\
         Respond with ONLY a number between 0.0 and 1.0.",
        truncate_chars(session_a_summary, 1_500),
        truncate_chars(session_b_summary, 1_500),
    );
    let request = LlmRequest { system_prompt: String::new(), user_prompt: prompt, want_json: false };
    match llm.complete(request).await {
        Ok(response) => parse_similarity_score(&response.raw),
        Err(_) => 0.0,
    }
}

fn parse_similarity_score(raw: &str) -> f32 {
    let mut text = raw.trim();
    for prefix in ["Score:", "Rating:", "Similarity:"] {
        if let Some(stripped) = text.strip_prefix(prefix) {
            text = stripped.trim();
        }
    }
    text.parse::<f32>().map(|score| score.clamp(0.0, 1.0)).unwrap_or(0.0)
}

fn final_score(candidate: &Candidate, has_llm: bool) -> f32 {
    let base_score = match (has_llm, candidate.llm_score) {
        (true, Some(llm_score)) => SUGGESTION_VECTOR_WEIGHT * candidate.vector_similarity + SUGGESTION_LLM_WEIGHT * llm_score,
        _ => candidate.vector_similarity,
    };

    let time_bonus = match candidate.time_gap_seconds {
        Some(gap) if gap >= 0 && gap < SUGGESTION_TIME_BONUS_1H_SECONDS => SUGGESTION_TIME_BONUS_1H_VALUE,
        Some(gap) if gap >= 0 && gap < SUGGESTION_TIME_BONUS_6H_SECONDS => SUGGESTION_TIME_BONUS_6H_VALUE,
        _ => 0.0,
    };

    (base_score + time_bonus).min(1.0)
}

fn build_reason(candidate: &Candidate, has_llm: bool) -> String {
    let mut parts = vec![format!("Vector similarity: {:.0}%", candidate.vector_similarity * 100.0)];

    if has_llm && let Some(llm_score) = candidate.llm_score {
        parts.push(format!("LLM score: {:.0}%", llm_score * 100.0));
    }

    if let Some(gap) = candidate.time_gap_seconds
        && gap >= 0
    {
        let hours = gap as f64 / 3_600.0;
        if hours < 1.0 {
            parts.push(format!("Time gap: {}m", gap / 60));
        } else if hours < 24.0 {
            parts.push(format!("Time gap: {hours:.1}h"));
        } else {
            parts.push(format!("Time gap: {:.1}d", hours / 24.0));
        }
    }

    parts.join(" | ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars { text.to_string() } else { text.chars().take(max_chars).collect() }
}

pub fn dismiss_suggestion(conn: &Connection, session_id: &str) -> Result<()> {
    Ok(sessions::dismiss_suggested_parent(conn, session_id)?)
}

pub fn reset_suggestion_dismissal(conn: &Connection, session_id: &str) -> Result<()> {
    Ok(sessions::reset_suggested_parent_dismissal(conn, session_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_float() {
        assert_eq!(parse_similarity_score("0.82"), 0.82);
    }

    #[test]
    fn strips_known_prefixes() {
        assert_eq!(parse_similarity_score("Score: 0.5"), 0.5);
        assert_eq!(parse_similarity_score("Rating: 1.0"), 1.0);
    }

    #[test]
    fn unparseable_response_falls_back_to_zero() {
        assert_eq!(parse_similarity_score("not a number"), 0.0);
    }

    #[test]
    fn clamps_out_of_range_scores() {
        assert_eq!(parse_similarity_score("5.0"), 1.0);
        assert_eq!(parse_similarity_score("-5.0"), 0.0);
    }

    #[test]
    fn confidence_buckets_match_thresholds() {
        assert_eq!(Confidence::from_score(0.9), Confidence::High);
        assert_eq!(Confidence::from_score(0.6), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.31), Confidence::Low);
    }
}
