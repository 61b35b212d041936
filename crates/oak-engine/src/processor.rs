//! Turns a completed prompt batch into stored observations.
//!
//! Dispatches on `source_type`: only `user` batches go through the full
//! LLM extraction pipeline. Everything else is marked processed with a
//! fixed classification and otherwise left alone.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;

use oak_index::queries::{activities, observations, prompt_batches, sessions};
use oak_providers::{LlmChain, LlmRequest, extract_json};
use oak_types::{Activity, MemoryType, PromptBatch, SourceType, StoredObservation};
use oak_vector::{RecordKind, VectorRecord, VectorStore};

use crate::error::Result;
use crate::retrieval::{RetrievalConfig, RetrievalEngine};

const CLASSIFICATIONS: &[&str] = &["exploration", "implementation", "debugging", "refactoring"];
const DEFAULT_CLASSIFICATION: &str = "exploration";

/// Observations extracted from a single batch beyond this count are
/// dropped; a runaway extraction shouldn't flood the memory store.
const MAX_OBSERVATIONS_PER_BATCH: usize = 20;

/// The tool an agent calls to lay out a task plan. A batch with one of
/// these but no explicit plan file gets a plan synthesized from them.
const TASK_CREATE_TOOL: &str = "TaskCreate";

#[derive(Debug, Clone)]
pub struct ContextBudget {
    pub max_activities: usize,
    pub max_user_prompt_chars: usize,
    pub max_oak_context_chars: usize,
    pub max_output_tokens_floor: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self { max_activities: 50, max_user_prompt_chars: 4_000, max_oak_context_chars: 2_000, max_output_tokens_floor: 2_000 }
    }
}

impl ContextBudget {
    /// At least `max_output_tokens_floor`, otherwise a quarter of the
    /// rendered context size.
    pub fn max_output_tokens(&self, context_tokens: usize) -> usize {
        (context_tokens / 4).max(self.max_output_tokens_floor)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub session_id: String,
    pub prompt_batch_id: String,
    pub activities_processed: usize,
    pub observations_extracted: usize,
    pub success: bool,
    pub error: Option<String>,
    pub classification: String,
}

#[derive(Debug, Clone)]
struct RawObservation {
    memory_type: String,
    observation: String,
    importance: Option<String>,
    context: Option<String>,
}

/// Runs the batch dispatch table and, for `user` batches, the LLM
/// extraction pipeline.
pub struct BatchProcessor<'a> {
    llm: &'a LlmChain,
    budget: ContextBudget,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(llm: &'a LlmChain, budget: ContextBudget) -> Self {
        Self { llm, budget }
    }

    pub async fn process_batch(
        &self,
        conn: &Connection,
        vector_store: &VectorStore,
        batch: &PromptBatch,
        batch_activities: &[Activity],
    ) -> Result<ProcessingResult> {
        match batch.source_type {
            SourceType::AgentNotification => self.skip(conn, batch, batch_activities, "agent_work"),
            SourceType::System => self.skip(conn, batch, batch_activities, "system"),
            SourceType::Plan => self.skip(conn, batch, batch_activities, "plan"),
            SourceType::DerivedPlan => self.skip(conn, batch, batch_activities, "derived_plan"),
            SourceType::User => self.process_user_batch(conn, vector_store, batch, batch_activities).await,
        }
    }

    fn skip(&self, conn: &Connection, batch: &PromptBatch, batch_activities: &[Activity], classification: &str) -> Result<ProcessingResult> {
        mark_processed(conn, batch, batch_activities, classification)?;
        Ok(ProcessingResult {
            session_id: batch.session_id.clone(),
            prompt_batch_id: batch.id.clone(),
            activities_processed: batch_activities.len(),
            observations_extracted: 0,
            success: true,
            error: None,
            classification: classification.to_string(),
        })
    }

    async fn process_user_batch(
        &self,
        conn: &Connection,
        vector_store: &VectorStore,
        batch: &PromptBatch,
        batch_activities: &[Activity],
    ) -> Result<ProcessingResult> {
        if should_synthesize_plan(batch, batch_activities) {
            let tasks = synthesize_derived_plan(batch_activities);
            if !tasks.is_empty() {
                match store_derived_plan(conn, batch, &tasks) {
                    Ok(()) => tracing::info!(batch_id = %batch.id, task_count = tasks.len(), "synthesized derived plan"),
                    Err(err) => tracing::warn!(batch_id = %batch.id, error = %err, "failed to store derived plan"),
                }
            }
        }

        let tool_names: Vec<&str> = batch_activities.iter().map(|a| a.tool_name.as_str()).collect();
        let files_read = unique_files(batch_activities, "Read");
        let files_modified = unique_files(batch_activities, "Edit");
        let files_created = unique_files(batch_activities, "Write");
        let errors: Vec<&str> = batch_activities.iter().filter_map(|a| a.error_message.as_deref()).collect();
        let has_errors = !errors.is_empty();

        let classification = self.classify(&tool_names, &files_read, &files_modified, &files_created, has_errors).await;
        let oak_context = self.gather_oak_context(vector_store, batch).await;

        let prompt = self.render_extraction_prompt(batch, batch_activities, &files_read, &files_modified, &files_created, &errors, &oak_context);
        let request = LlmRequest {
            system_prompt: extraction_system_prompt(&classification),
            user_prompt: prompt,
            want_json: true,
        };

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(err) => {
                return Ok(ProcessingResult {
                    session_id: batch.session_id.clone(),
                    prompt_batch_id: batch.id.clone(),
                    activities_processed: batch_activities.len(),
                    observations_extracted: 0,
                    success: false,
                    error: Some(err.to_string()),
                    classification,
                });
            }
        };

        let raw_observations = parse_extracted_observations(&response.raw);
        let mut stored = 0usize;
        for raw in raw_observations.into_iter().take(MAX_OBSERVATIONS_PER_BATCH) {
            match self.store_observation(conn, vector_store, batch, &raw, &classification).await {
                Ok(()) => stored += 1,
                Err(err) => tracing::warn!(batch_id = %batch.id, error = %err, "failed to store extracted observation"),
            }
        }

        mark_processed(conn, batch, batch_activities, &classification)?;

        Ok(ProcessingResult {
            session_id: batch.session_id.clone(),
            prompt_batch_id: batch.id.clone(),
            activities_processed: batch_activities.len(),
            observations_extracted: stored,
            success: true,
            error: None,
            classification,
        })
    }

    async fn classify(&self, tool_names: &[&str], files_read: &[String], files_modified: &[String], files_created: &[String], has_errors: bool) -> String {
        let prompt = format!(
            "Classify this coding session batch as exactly one of: exploration, implementation, debugging, refactoring.\n\n\
             Tools used: {}\nFiles read: {}\nFiles modified: {}\nFiles created: {}\nHad errors: {has_errors}\n\n\
             Respond with ONLY the classification word.",
            tool_names.join(", "),
            files_read.join(", "),
            files_modified.join(", "),
            files_created.join(", "),
        );
        let request = LlmRequest { system_prompt: String::new(), user_prompt: prompt, want_json: false };
        match self.llm.complete(request).await {
            Ok(response) => {
                let word = response.raw.trim().trim_matches('.').to_ascii_lowercase();
                if CLASSIFICATIONS.contains(&word.as_str()) { word } else { DEFAULT_CLASSIFICATION.to_string() }
            }
            Err(_) => DEFAULT_CLASSIFICATION.to_string(),
        }
    }

    /// In-process curated retrieval over code and memory, relevant to
    /// the batch's user prompt. Errors are swallowed to an empty string;
    /// a retrieval hiccup shouldn't block extraction.
    async fn gather_oak_context(&self, vector_store: &VectorStore, batch: &PromptBatch) -> String {
        if batch.user_prompt.is_empty() {
            return String::new();
        }
        let engine = RetrievalEngine::new(vector_store, RetrievalConfig::default());
        let context = match engine.get_task_context(&batch.user_prompt, None).await {
            Ok(context) => context,
            Err(err) => {
                tracing::debug!(batch_id = %batch.id, error = %err, "oak-ci context retrieval failed");
                return String::new();
            }
        };

        let mut sections = Vec::new();
        for item in &context.code_context {
            sections.push(format!("### {} ({})\n{}", item.filepath, item.lines, item.content));
        }
        for item in &context.memory_context {
            sections.push(format!("- [{}] {}", item.kind, item.observation));
        }
        sections.join("\n\n")
    }

    fn render_extraction_prompt(
        &self,
        batch: &PromptBatch,
        batch_activities: &[Activity],
        files_read: &[String],
        files_modified: &[String],
        files_created: &[String],
        errors: &[&str],
        oak_context: &str,
    ) -> String {
        let mut lines = Vec::new();
        for activity in batch_activities.iter().take(self.budget.max_activities) {
            lines.push(format!(
                "- {} {}{}",
                activity.tool_name,
                activity.file_path.as_deref().unwrap_or(""),
                activity.error_message.as_deref().map(|e| format!(" (error: {e})")).unwrap_or_default(),
            ));
        }

        let mut prompt = format!(
            "Extract durable observations (gotchas, bug fixes, decisions, discoveries, trade-offs) from this batch \
             of tool calls. Respond as JSON: {{\"observations\": [{{\"type\": \"gotcha|bug_fix|decision|discovery|trade_off\", \
             \"observation\": \"...\", \"importance\": 1-10, \"context\": \"...\"}}]}}.\n\n\
             Files read: {}\nFiles modified: {}\nFiles created: {}\nErrors: {}\n\nActivities:\n{}",
            files_read.join(", "),
            files_modified.join(", "),
            files_created.join(", "),
            errors.join("; "),
            lines.join("\n"),
        );

        if !batch.user_prompt.is_empty() {
            let truncated = truncate_chars(&batch.user_prompt, self.budget.max_user_prompt_chars);
            prompt.push_str(&format!("\n\n## User Request\n\n{truncated}"));
        }

        if !oak_context.is_empty() {
            let truncated = truncate_chars(oak_context, self.budget.max_oak_context_chars);
            prompt.push_str(&format!("\n\n## Related Code & Memory\n\n{truncated}"));
        }

        prompt
    }

    async fn store_observation(&self, conn: &Connection, vector_store: &VectorStore, batch: &PromptBatch, raw: &RawObservation, classification: &str) -> Result<()> {
        let memory_type = MemoryType::parse(&raw.memory_type).unwrap_or(MemoryType::Discovery);
        let importance = raw.importance.as_deref().and_then(parse_importance).unwrap_or(5);
        let digest = oak_types::sha256_hex(&raw.observation);
        let id = format!("{}-{}", batch.id, &digest[..12]);

        let mut observation = StoredObservation::new(id, batch.session_id.clone(), raw.observation.clone(), memory_type, importance, batch.source_machine_id.clone());
        observation.prompt_batch_id = Some(batch.id.clone());
        observation.context = raw.context.clone();
        observation.tags = vec![classification.to_string()];
        observation.recompute_content_hash();

        observations::store(conn, &observation)?;

        let project_root = sessions::get(conn, &observation.session_id)?.map(|s| s.project_root);
        let record = VectorRecord {
            id: observation.id.clone(),
            kind: RecordKind::Memory,
            text: observation.observation.clone(),
            metadata: serde_json::json!({"project_root": project_root, "memory_type": observation.memory_type.as_str()}),
            tags: observation.tags.clone(),
            status: Some(observation.status.as_str().to_string()),
            archived: false,
            created_at_epoch: observation.created_at.epoch(),
        };
        match observation.memory_type {
            MemoryType::SessionSummary => vector_store.add_session_summary(&record).await?,
            MemoryType::Plan => vector_store.add_plan(&record).await?,
            _ => vector_store.add_memory(&record).await?,
        }
        observations::mark_embedded(conn, std::slice::from_ref(&observation.id))?;
        Ok(())
    }
}

fn mark_processed(conn: &Connection, batch: &PromptBatch, batch_activities: &[Activity], classification: &str) -> Result<()> {
    let ids: Vec<String> = batch_activities.iter().map(|a| a.id.clone()).collect();
    if !ids.is_empty() {
        activities::mark_processed(conn, &ids)?;
    }
    prompt_batches::mark_processed(conn, &batch.id, classification)?;
    Ok(())
}

/// A batch has task-planning intent worth capturing but wrote no
/// explicit plan file to index.
fn should_synthesize_plan(batch: &PromptBatch, batch_activities: &[Activity]) -> bool {
    batch.plan_file_path.is_none() && batch_activities.iter().any(|a| a.tool_name == TASK_CREATE_TOOL)
}

/// Pulls a human-readable task line out of each `TaskCreate` call's
/// input, falling back to its output summary if the input shape is
/// unrecognized.
fn synthesize_derived_plan(batch_activities: &[Activity]) -> Vec<String> {
    batch_activities.iter().filter(|a| a.tool_name == TASK_CREATE_TOOL).filter_map(task_description).collect()
}

fn task_description(activity: &Activity) -> Option<String> {
    let from_input = activity.tool_input.as_ref().and_then(|input| {
        input
            .get("content")
            .or_else(|| input.get("description"))
            .or_else(|| input.get("subject"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    });
    from_input.or_else(|| activity.tool_output_summary.clone())
}

/// Stores the synthesized plan as its own `derived_plan` batch, linked
/// back to the originating user batch via `source_plan_batch_id`. This
/// is what actually produces `SourceType::DerivedPlan` rows; the
/// dispatch table's `skip()` branch only ever consumes them.
fn store_derived_plan(conn: &Connection, batch: &PromptBatch, tasks: &[String]) -> Result<()> {
    let plan_content = tasks.iter().map(|t| format!("- [ ] {t}")).collect::<Vec<_>>().join("\n");
    let id = format!("{}-derived-plan", batch.id);
    let mut derived = PromptBatch::new(&id, batch.session_id.clone(), batch.prompt_number, String::new(), SourceType::DerivedPlan, batch.source_machine_id.clone());
    derived.plan_content = Some(plan_content);
    derived.source_plan_batch_id = Some(batch.id.clone());
    prompt_batches::upsert(conn, &derived)?;
    Ok(())
}

fn unique_files(batch_activities: &[Activity], tool_name: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    batch_activities
        .iter()
        .filter(|a| a.tool_name == tool_name)
        .filter_map(|a| a.file_path.clone())
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("\n... (prompt truncated for context budget)");
    truncated
}

fn extraction_system_prompt(classification: &str) -> String {
    format!("You are analyzing a {classification} session. Extract only durable, reusable observations.")
}

fn parse_importance(raw: &str) -> Option<u8> {
    if let Ok(n) = raw.parse::<u8>() {
        return Some(n);
    }
    match raw.to_ascii_lowercase().as_str() {
        "low" => Some(3),
        "medium" => Some(5),
        "high" => Some(8),
        _ => None,
    }
}

/// Parses the `{"observations": [...]}` shape out of an LLM response,
/// falling back to a regex scan for individual complete observation
/// objects when the whole payload won't parse as JSON (a model that got
/// truncated mid-output still yields whatever came before the cutoff).
fn parse_extracted_observations(raw: &str) -> Vec<RawObservation> {
    if let Ok(value) = extract_json(raw)
        && let Some(items) = value.get("observations").and_then(|v| v.as_array())
    {
        let parsed: Vec<RawObservation> = items.iter().filter_map(observation_from_json).collect();
        if !parsed.is_empty() {
            return parsed;
        }
    }
    regex_fallback_observations(raw)
}

fn observation_from_json(value: &serde_json::Value) -> Option<RawObservation> {
    let observation = value.get("observation")?.as_str()?.to_string();
    let memory_type = value.get("type").and_then(|v| v.as_str()).unwrap_or("discovery").to_string();
    let importance = value.get("importance").map(|v| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    let context = value.get("context").and_then(|v| v.as_str()).map(String::from);
    Some(RawObservation { memory_type, observation, importance, context })
}

fn regex_fallback_observations(raw_text: &str) -> Vec<RawObservation> {
    static OBSERVATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r#"(?s)\{\s*"type"\s*:\s*"([^"]+)"\s*,\s*"observation"\s*:\s*"((?:[^"\\]|\\.)*)"\s*(?:,\s*"importance"\s*:\s*"?([^",}]+)"?)?\s*(?:,\s*"context"\s*:\s*"((?:[^"\\]|\\.)*)")?\s*\}"#,
        )
        .expect("fallback observation pattern is a valid regex")
    });

    OBSERVATION_PATTERN
        .captures_iter(raw_text)
        .map(|captures| RawObservation {
            memory_type: captures.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
            observation: unescape_json_string(captures.get(2).map(|m| m.as_str()).unwrap_or("")),
            importance: captures.get(3).map(|m| m.as_str().to_string()),
            context: captures.get(4).map(|m| unescape_json_string(m.as_str())),
        })
        .collect()
}

fn unescape_json_string(text: &str) -> String {
    text.replace("\\\"", "\"").replace("\\n", "\n").replace("\\\\", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_extraction_json() {
        let raw = r#"{"observations": [{"type": "gotcha", "observation": "watch for off-by-one", "importance": 7}]}"#;
        let observations = parse_extracted_observations(raw);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].memory_type, "gotcha");
        assert_eq!(observations[0].importance.as_deref(), Some("7"));
    }

    #[test]
    fn recovers_observations_from_truncated_json_via_regex_fallback() {
        let raw = r#"not valid json but contains {"type": "bug_fix", "observation": "fixed the race condition", "context": "in the ingestor"} and trailing gar"#;
        let observations = parse_extracted_observations(raw);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].observation, "fixed the race condition");
        assert_eq!(observations[0].context.as_deref(), Some("in the ingestor"));
    }

    #[test]
    fn unknown_classification_falls_back_to_default() {
        assert!(CLASSIFICATIONS.contains(&DEFAULT_CLASSIFICATION));
    }

    #[test]
    fn context_budget_respects_floor() {
        let budget = ContextBudget { max_output_tokens_floor: 2_000, ..ContextBudget::default() };
        assert_eq!(budget.max_output_tokens(1_000), 2_000);
        assert_eq!(budget.max_output_tokens(40_000), 10_000);
    }

    fn task_create_activity(id: &str, content: &str) -> Activity {
        let mut activity = Activity::new(id, "s1", TASK_CREATE_TOOL, "m1");
        activity.tool_input = Some(serde_json::json!({"content": content}));
        activity
    }

    #[test]
    fn should_synthesize_plan_requires_task_create_and_no_plan_file() {
        let batch = PromptBatch::new("b1", "s1", 1, "add auth", SourceType::User, "m1");
        let activities = vec![task_create_activity("a1", "wire up login")];
        assert!(should_synthesize_plan(&batch, &activities));

        let mut with_plan_file = batch.clone();
        with_plan_file.plan_file_path = Some("PLAN.md".to_string());
        assert!(!should_synthesize_plan(&with_plan_file, &activities));

        let no_task_create = vec![Activity::new("a2", "s1", "Edit", "m1")];
        assert!(!should_synthesize_plan(&batch, &no_task_create));
    }

    #[test]
    fn synthesize_derived_plan_pulls_content_from_task_create_input() {
        let activities = vec![task_create_activity("a1", "wire up login"), task_create_activity("a2", "add tests")];
        let tasks = synthesize_derived_plan(&activities);
        assert_eq!(tasks, vec!["wire up login".to_string(), "add tests".to_string()]);
    }

    #[test]
    fn store_derived_plan_creates_linked_batch() {
        use oak_index::Database;

        let db = Database::open_in_memory().unwrap();
        oak_index::queries::sessions::upsert(db.conn(), &oak_types::Session::new("s1", "claude-code", "/repo", "m1")).unwrap();
        let batch = PromptBatch::new("b1", "s1", 1, "plan a feature", SourceType::User, "m1");
        prompt_batches::upsert(db.conn(), &batch).unwrap();

        store_derived_plan(db.conn(), &batch, &["wire up login".to_string()]).unwrap();

        let derived = prompt_batches::get(db.conn(), "b1-derived-plan").unwrap().unwrap();
        assert_eq!(derived.source_type, SourceType::DerivedPlan);
        assert_eq!(derived.source_plan_batch_id.as_deref(), Some("b1"));
        assert_eq!(derived.plan_content.as_deref(), Some("- [ ] wire up login"));
    }
}
