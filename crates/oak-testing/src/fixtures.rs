//! Sample row builders for sessions, observations, and activities, used to
//! seed a [`crate::TestWorld`]'s database without hand-writing SQL in every
//! test.

use oak_types::{Activity, MemoryType, Session, StoredObservation};

/// Builds a session row with a deterministic id derived from `name`, so
/// repeated calls in the same test produce stable, readable fixtures.
pub fn sample_session(name: &str, project_root: &str) -> Session {
    Session::new(format!("session-{name}"), "claude-code", project_root, "test-machine")
}

/// Builds an observation row attached to `session_id`.
pub fn sample_observation(name: &str, session_id: &str, memory_type: MemoryType, text: &str) -> StoredObservation {
    StoredObservation::new(format!("obs-{name}"), session_id, text, memory_type, 5, "test-machine")
}

/// Builds a successful tool-call activity row attached to `session_id`.
pub fn sample_activity(name: &str, session_id: &str, tool_name: &str) -> Activity {
    Activity::new(format!("activity-{name}"), session_id, tool_name, "test-machine")
}
