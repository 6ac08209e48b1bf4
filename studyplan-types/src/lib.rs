//! Core type definitions for the studyplan sync engine.
//!
//! This crate defines the fundamental, storage-agnostic types shared by the
//! local store, the remote adapters and the sync managers:
//! - Document and user identifiers (UUID v7 / v4)
//! - `MetadataModel` and the pure last-write-wins comparator
//! - The `SyncedDocument` trait every synced payload implements
//! - The concrete per-collection payload types of the application
//!
//! Nothing in here performs I/O; the engine crates build on top of these.

mod entities;
mod ids;
mod metadata;

pub use entities::{
    AiUsage, Employee, FriendRequest, Goal, Homework, InviteStatus, Organization, Schedule,
    ScheduleInvitation, Subject, Todo, keys,
};
pub use ids::{DocumentId, SourceSyncKey, UserId};
pub use metadata::{MetadataModel, SyncDecision, SyncedDocument, compare};
