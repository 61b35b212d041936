pub mod activities;
pub mod agent_runs;
pub mod agent_schedules;
pub mod observations;
pub mod prompt_batches;
pub mod relationships;
pub mod resolution;
pub mod session_link_events;
pub mod sessions;
pub mod stats;
