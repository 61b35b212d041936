//! Translates inbound hook events into session/batch/activity rows. Holds
//! the in-memory activity buffer described in the concurrency model: a
//! single mutex guards a `Vec<Activity>`, swapped out wholesale and bulk
//! inserted on flush so the lock is never held across the transaction.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rusqlite::Connection;

use oak_index::queries::{activities, prompt_batches, relationships, session_link_events, sessions};
use oak_types::{Activity, CreatedBy, ParentReason, PromptBatch, RelationshipType, Session, SessionLinkEvent, SessionLinkEventType, SessionRelationship, SourceType, Timestamp};

use crate::{Error, Result};

/// Ancestor chains longer than this are refused rather than walked -
/// nothing legitimate nests sessions this deep, and it bounds
/// `would_create_cycle` without recursion.
const MAX_ANCESTOR_DEPTH: usize = 64;

/// A linkable-parent candidate ends "immediately" before the new session
/// if the gap is within this window.
const IMMEDIATE_GAP_SECONDS: i64 = 5 * 60;

/// Otherwise a completed session is still linkable within this much wider
/// fallback window.
const FALLBACK_GAP_SECONDS: i64 = 24 * 60 * 60;

pub struct Ingestor {
    machine_id: String,
    buffer: Mutex<Vec<Activity>>,
    buffer_threshold: AtomicUsize,
}

impl Ingestor {
    pub fn new(machine_id: impl Into<String>, buffer_threshold: usize) -> Self {
        Self { machine_id: machine_id.into(), buffer: Mutex::new(Vec::new()), buffer_threshold: AtomicUsize::new(buffer_threshold.max(1)) }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Idempotent: returns the existing session on a repeat call rather
    /// than mutating its parent link.
    pub fn ensure_session(&self, conn: &Connection, session_id: &str, agent: &str, project_root: &str) -> Result<(Session, bool)> {
        if let Some(existing) = sessions::get(conn, session_id)? {
            return Ok((existing, false));
        }
        let session = Session::new(session_id, agent, project_root, &self.machine_id);
        sessions::upsert(conn, &session)?;
        tracing::info!(session_id, agent, project_root, "session created");
        Ok((session, true))
    }

    pub fn set_session_parent(&self, conn: &Connection, session_id: &str, parent_id: &str, reason: ParentReason) -> Result<()> {
        if session_id == parent_id {
            return Err(Error::Cycle(format!("session {session_id} cannot be its own parent")));
        }
        if would_create_cycle(conn, parent_id, session_id)? {
            return Err(Error::Cycle(format!("linking {session_id} to {parent_id} would create a cycle")));
        }
        let old_parent_id = sessions::get(conn, session_id)?.and_then(|s| s.parent_session_id);
        sessions::set_parent(conn, session_id, parent_id, reason)?;
        if let Some(relationship) =
            SessionRelationship::new(format!("{session_id}-{parent_id}-link"), session_id, parent_id, RelationshipType::Related, CreatedBy::Manual)
        {
            relationships::add(conn, &relationship)?;
        }

        let mut link_event = SessionLinkEvent::new(session_id, link_event_type(reason));
        link_event.old_parent_id = old_parent_id;
        link_event.new_parent_id = Some(parent_id.to_string());
        link_event.link_reason = Some(reason.as_str().to_string());
        session_link_events::record(conn, &link_event)?;

        tracing::debug!(session_id, parent_id, reason = reason.as_str(), "session parent set");
        Ok(())
    }

    /// Finds a candidate parent by this precedence: a session that ended
    /// within the immediate gap window, then a currently-active session
    /// in the same project (covers the session-end race), then the most
    /// recent completed session within the wider fallback window. Never
    /// returns `exclude` itself.
    pub fn find_linkable_parent(&self, conn: &Connection, agent: &str, project_root: &str, exclude: &str, started_at: Timestamp) -> Result<Option<Session>> {
        let recent = sessions::list_recent(conn, 200)?;
        let mut immediate: Option<Session> = None;
        let mut active: Option<Session> = None;
        let mut fallback: Option<Session> = None;

        for candidate in recent {
            if candidate.id == exclude || candidate.agent != agent || candidate.project_root != project_root {
                continue;
            }
            match (candidate.status, candidate.ended_at) {
                (oak_types::SessionStatus::Completed, Some(ended_at)) => {
                    let gap = started_at.seconds_since(&ended_at);
                    if gap >= 0 && gap <= IMMEDIATE_GAP_SECONDS && newer(&immediate, &candidate, ended_at) {
                        immediate = Some(candidate.clone());
                    } else if gap >= 0 && gap <= FALLBACK_GAP_SECONDS && newer(&fallback, &candidate, ended_at) {
                        fallback = Some(candidate.clone());
                    }
                }
                (oak_types::SessionStatus::Active, _) => {
                    if newer(&active, &candidate, candidate.started_at) {
                        active = Some(candidate.clone());
                    }
                }
                _ => {}
            }
        }

        Ok(immediate.or(active).or(fallback))
    }

    /// Ends any previously-active batch for the session, then creates the
    /// next one with the next `prompt_number`.
    pub fn create_prompt_batch(&self, conn: &Connection, session_id: &str, user_prompt: &str, source_type: SourceType) -> Result<PromptBatch> {
        let existing = prompt_batches::list_for_session(conn, session_id)?;
        if let Some(active) = existing.iter().find(|b| b.status == oak_types::BatchStatus::Active) {
            self.end_prompt_batch(conn, &active.id)?;
        }
        let prompt_number = existing.len() as i64 + 1;
        let id = format!("{session_id}-batch-{prompt_number}");
        let batch = PromptBatch::new(&id, session_id, prompt_number, user_prompt, source_type, &self.machine_id);
        prompt_batches::upsert(conn, &batch)?;
        sessions::increment_prompt_count(conn, session_id)?;
        tracing::debug!(session_id, batch_id = %batch.id, prompt_number, "prompt batch created");
        Ok(batch)
    }

    pub fn end_prompt_batch(&self, conn: &Connection, batch_id: &str) -> Result<()> {
        let Some(mut batch) = prompt_batches::get(conn, batch_id)? else { return Ok(()) };
        if batch.status == oak_types::BatchStatus::Completed {
            return Ok(());
        }
        batch.ended_at = Some(Timestamp::now());
        batch.status = oak_types::BatchStatus::Completed;
        prompt_batches::upsert(conn, &batch)?;
        Ok(())
    }

    /// Appends to the buffer; flushes when it reaches `buffer_threshold`
    /// or `force_flush` is set. Returns the written id only when a flush
    /// actually happened - an unflushed append has nothing to return yet.
    pub fn add_activity_buffered(&self, conn: &mut Connection, activity: Activity, force_flush: bool) -> Result<Option<String>> {
        let id = activity.id.clone();
        let should_flush = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push(activity);
            force_flush || buffer.len() >= self.buffer_threshold.load(Ordering::Relaxed)
        };
        if should_flush {
            self.flush_activity_buffer(conn)?;
            return Ok(Some(id));
        }
        Ok(None)
    }

    /// Atomically swaps the buffer out and bulk-inserts the drained
    /// activities, so the mutex is never held across the write.
    pub fn flush_activity_buffer(&self, conn: &mut Connection) -> Result<usize> {
        let drained = {
            let mut buffer = self.buffer.lock().unwrap();
            std::mem::take(&mut *buffer)
        };
        if drained.is_empty() {
            return Ok(0);
        }
        self.add_activities(conn, drained)
    }

    /// Bulk path: one transaction with a counter-bumping fallback to
    /// per-row inserts on an FK violation, so a single bad row never
    /// drops the rest of the batch.
    pub fn add_activities(&self, conn: &mut Connection, mut activities_to_add: Vec<Activity>) -> Result<usize> {
        for activity in &mut activities_to_add {
            if activity.source_machine_id.is_empty() {
                activity.source_machine_id = self.machine_id.clone();
            }
        }
        let written = activities::insert_many(conn, &activities_to_add)?;
        bump_counters(conn, &activities_to_add)?;
        Ok(written)
    }

    pub fn add_activity(&self, conn: &Connection, mut activity: Activity) -> Result<()> {
        if activity.source_machine_id.is_empty() {
            activity.source_machine_id = self.machine_id.clone();
        }
        activities::insert(conn, &activity)?;
        bump_counters(conn, std::slice::from_ref(&activity))?;
        Ok(())
    }

    pub fn mark_activities_processed(&self, conn: &Connection, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        activities::mark_processed(conn, ids)?;
        Ok(())
    }

    pub fn mark_prompt_batch_processed(&self, conn: &Connection, batch_id: &str, classification: &str) -> Result<()> {
        prompt_batches::mark_processed(conn, batch_id, classification)?;
        Ok(())
    }
}

/// Bumps `sessions.tool_count` and `prompt_batches.activity_count` with one
/// aggregated `UPDATE` per affected row, not one per activity, by tallying
/// the batch first.
fn bump_counters(conn: &Connection, written: &[Activity]) -> Result<()> {
    let mut per_session: std::collections::HashMap<&str, i64> = std::collections::HashMap::new();
    let mut per_batch: std::collections::HashMap<&str, i64> = std::collections::HashMap::new();
    for activity in written {
        *per_session.entry(activity.session_id.as_str()).or_insert(0) += 1;
        if let Some(batch_id) = activity.prompt_batch_id.as_deref() {
            *per_batch.entry(batch_id).or_insert(0) += 1;
        }
    }
    for (session_id, count) in per_session {
        sessions::increment_tool_count(conn, session_id, count)?;
    }
    for (batch_id, count) in per_batch {
        prompt_batches::increment_activity_count(conn, batch_id, count)?;
    }
    Ok(())
}

/// `Explicit` is the agent (or user) declaring a parent directly; every
/// other `ParentReason` is this crate inferring the link on its own.
fn link_event_type(reason: ParentReason) -> SessionLinkEventType {
    match reason {
        ParentReason::Explicit => SessionLinkEventType::ManualLinked,
        ParentReason::Clear | ParentReason::Compact | ParentReason::Resume | ParentReason::Inferred => SessionLinkEventType::AutoLinked,
    }
}

fn newer(current: &Option<Session>, candidate: &Session, candidate_ts: Timestamp) -> bool {
    match current {
        None => true,
        Some(existing) => {
            let existing_ts = existing.ended_at.unwrap_or(existing.started_at);
            candidate_ts.epoch() > existing_ts.epoch()
        }
    }
}

/// Walks `descendant`'s ancestor chain looking for `ancestor_candidate`.
/// Iterative and depth-bounded rather than recursive, per the depth-64
/// cap on pathological chains.
fn would_create_cycle(conn: &Connection, descendant: &str, ancestor_candidate: &str) -> Result<bool> {
    let mut current = descendant.to_string();
    for _ in 0..MAX_ANCESTOR_DEPTH {
        let Some(session) = sessions::get(conn, &current)? else { return Ok(false) };
        let Some(parent_id) = session.parent_session_id else { return Ok(false) };
        if parent_id == ancestor_candidate {
            return Ok(true);
        }
        current = parent_id;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oak_index::Database;

    fn ingestor() -> Ingestor {
        Ingestor::new("m1", 3)
    }

    #[test]
    fn ensure_session_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let ingestor = ingestor();
        let (first, created_first) = ingestor.ensure_session(db.conn(), "s1", "claude-code", "/repo").unwrap();
        let (second, created_second) = ingestor.ensure_session(db.conn(), "s1", "claude-code", "/repo").unwrap();
        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn set_session_parent_rejects_self_parent() {
        let db = Database::open_in_memory().unwrap();
        let ingestor = ingestor();
        ingestor.ensure_session(db.conn(), "s1", "claude-code", "/repo").unwrap();
        let err = ingestor.set_session_parent(db.conn(), "s1", "s1", ParentReason::Inferred).unwrap_err();
        assert!(matches!(err, Error::Cycle(_)));
    }

    #[test]
    fn set_session_parent_records_a_link_event() {
        let db = Database::open_in_memory().unwrap();
        let ingestor = ingestor();
        ingestor.ensure_session(db.conn(), "s1", "claude-code", "/repo").unwrap();
        ingestor.ensure_session(db.conn(), "s2", "claude-code", "/repo").unwrap();
        ingestor.set_session_parent(db.conn(), "s2", "s1", ParentReason::Explicit).unwrap();

        let events = oak_index::queries::session_link_events::list_for_session(db.conn(), "s2").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, oak_types::SessionLinkEventType::ManualLinked);
        assert_eq!(events[0].new_parent_id.as_deref(), Some("s1"));
        assert!(events[0].old_parent_id.is_none());
    }

    #[test]
    fn set_session_parent_rejects_cycles() {
        let db = Database::open_in_memory().unwrap();
        let ingestor = ingestor();
        ingestor.ensure_session(db.conn(), "s1", "claude-code", "/repo").unwrap();
        ingestor.ensure_session(db.conn(), "s2", "claude-code", "/repo").unwrap();
        ingestor.set_session_parent(db.conn(), "s2", "s1", ParentReason::Explicit).unwrap();

        let err = ingestor.set_session_parent(db.conn(), "s1", "s2", ParentReason::Inferred).unwrap_err();
        assert!(matches!(err, Error::Cycle(_)));
    }

    #[test]
    fn create_prompt_batch_ends_previous_active_batch() {
        let db = Database::open_in_memory().unwrap();
        let ingestor = ingestor();
        ingestor.ensure_session(db.conn(), "s1", "claude-code", "/repo").unwrap();
        let first = ingestor.create_prompt_batch(db.conn(), "s1", "do a thing", SourceType::User).unwrap();
        let second = ingestor.create_prompt_batch(db.conn(), "s1", "do another thing", SourceType::User).unwrap();

        let reloaded_first = prompt_batches::get(db.conn(), &first.id).unwrap().unwrap();
        assert_eq!(reloaded_first.status, oak_types::BatchStatus::Completed);
        assert_eq!(second.prompt_number, 2);
    }

    #[test]
    fn buffered_activity_flushes_at_threshold() {
        let mut db = Database::open_in_memory().unwrap();
        let ingestor = ingestor();
        ingestor.ensure_session(db.conn(), "s1", "claude-code", "/repo").unwrap();

        let id1 = ingestor.add_activity_buffered(db.conn_mut(), Activity::new("a1", "s1", "Edit", "m1"), false).unwrap();
        let id2 = ingestor.add_activity_buffered(db.conn_mut(), Activity::new("a2", "s1", "Edit", "m1"), false).unwrap();
        assert!(id1.is_none());
        assert!(id2.is_none());

        let id3 = ingestor.add_activity_buffered(db.conn_mut(), Activity::new("a3", "s1", "Edit", "m1"), false).unwrap();
        assert_eq!(id3, Some("a3".to_string()));
        assert!(activities::get(db.conn(), "a1").unwrap().is_some());
    }

    #[test]
    fn buffered_activities_bump_session_and_batch_counters() {
        let mut db = Database::open_in_memory().unwrap();
        let ingestor = ingestor();
        ingestor.ensure_session(db.conn(), "s1", "claude-code", "/repo").unwrap();
        let batch = ingestor.create_prompt_batch(db.conn(), "s1", "do a thing", SourceType::User).unwrap();

        for i in 0..3 {
            let mut activity = Activity::new(format!("a{i}"), "s1", "Edit", "m1");
            activity.prompt_batch_id = Some(batch.id.clone());
            ingestor.add_activity_buffered(db.conn_mut(), activity, i == 2).unwrap();
        }

        let session = sessions::get(db.conn(), "s1").unwrap().unwrap();
        assert_eq!(session.tool_count, 3);
        let reloaded_batch = prompt_batches::get(db.conn(), &batch.id).unwrap().unwrap();
        assert_eq!(reloaded_batch.activity_count, 3);
    }

    #[test]
    fn create_prompt_batch_bumps_session_prompt_count() {
        let db = Database::open_in_memory().unwrap();
        let ingestor = ingestor();
        ingestor.ensure_session(db.conn(), "s1", "claude-code", "/repo").unwrap();
        ingestor.create_prompt_batch(db.conn(), "s1", "first", SourceType::User).unwrap();
        ingestor.create_prompt_batch(db.conn(), "s1", "second", SourceType::User).unwrap();

        let session = sessions::get(db.conn(), "s1").unwrap().unwrap();
        assert_eq!(session.prompt_count, 2);
    }

    #[test]
    fn force_flush_writes_a_partial_buffer() {
        let mut db = Database::open_in_memory().unwrap();
        let ingestor = ingestor();
        ingestor.ensure_session(db.conn(), "s1", "claude-code", "/repo").unwrap();
        let id = ingestor.add_activity_buffered(db.conn_mut(), Activity::new("a1", "s1", "Read", "m1"), true).unwrap();
        assert_eq!(id, Some("a1".to_string()));
    }

    #[test]
    fn find_linkable_parent_prefers_immediate_gap_over_fallback() {
        let db = Database::open_in_memory().unwrap();
        let ingestor = ingestor();

        let mut old_session = Session::new("old", "claude-code", "/repo", "m1");
        old_session.status = oak_types::SessionStatus::Completed;
        old_session.ended_at = Some(Timestamp::from_epoch(1_000));
        sessions::upsert(db.conn(), &old_session).unwrap();

        let mut recent_session = Session::new("recent", "claude-code", "/repo", "m1");
        recent_session.status = oak_types::SessionStatus::Completed;
        recent_session.ended_at = Some(Timestamp::from_epoch(1_200));
        sessions::upsert(db.conn(), &recent_session).unwrap();

        let started_at = Timestamp::from_epoch(1_210);
        let found = ingestor.find_linkable_parent(db.conn(), "claude-code", "/repo", "new", started_at).unwrap().unwrap();
        assert_eq!(found.id, "recent");
    }
}
