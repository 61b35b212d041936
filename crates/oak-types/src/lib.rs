//! Core data model for the oak-ci activity/memory daemon.
//!
//! These types are shared by every layer of the daemon: the relational
//! store (`oak-index`), the vector store (`oak-vector`), the ingestor and
//! scheduler (`oak-runtime`), the batch processor and retrieval engine
//! (`oak-engine`), and the tool-call surface (`oak-sdk`). Nothing in this
//! crate talks to SQLite, HTTP, or an LLM — it only defines the shapes
//! that cross those boundaries.

mod activity;
mod agent_run;
mod agent_schedule;
mod hash;
mod observation;
mod prompt_batch;
mod relationship;
mod resolution;
mod session;
mod session_link_event;
mod timestamp;

pub use activity::Activity;
pub use agent_run::{AgentRun, AgentRunStatus};
pub use agent_schedule::AgentSchedule;
pub use hash::sha256_hex;
pub use observation::{MemoryType, ObservationStatus, SessionOriginType, StoredObservation};
pub use prompt_batch::{BatchStatus, PromptBatch, SourceType};
pub use relationship::{CreatedBy, RelationshipType, SessionRelationship};
pub use resolution::{ResolutionAction, ResolutionEvent};
pub use session::{ParentReason, Session, SessionStatus};
pub use session_link_event::{SessionLinkEvent, SessionLinkEventType};
pub use timestamp::Timestamp;
