//! Concrete payload types for the application's synced collections.
//!
//! One small serde struct per collection, each carrying its `id` and
//! `updated_at` alongside a handful of domain fields. The sync engine treats
//! them uniformly through [`SyncedDocument`]; nothing here is
//! storage-specific.

use crate::ids::{DocumentId, SourceSyncKey, UserId};
use crate::metadata::SyncedDocument;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Source keys for every registered collection, one per entity type.
pub mod keys {
    use crate::ids::SourceSyncKey;

    pub const SCHEDULES: SourceSyncKey = SourceSyncKey::new("schedules");
    pub const HOMEWORK: SourceSyncKey = SourceSyncKey::new("homework");
    pub const TODOS: SourceSyncKey = SourceSyncKey::new("todos");
    pub const GOALS: SourceSyncKey = SourceSyncKey::new("goals");
    pub const ORGANIZATIONS: SourceSyncKey = SourceSyncKey::new("organizations");
    pub const SUBJECTS: SourceSyncKey = SourceSyncKey::new("subjects");
    pub const EMPLOYEES: SourceSyncKey = SourceSyncKey::new("employees");
    pub const SCHEDULE_INVITATIONS: SourceSyncKey = SourceSyncKey::new("schedule_invitations");
    pub const FRIEND_REQUESTS: SourceSyncKey = SourceSyncKey::new("friend_requests");
    pub const AI_USAGE: SourceSyncKey = SourceSyncKey::new("ai_usage");
}

macro_rules! synced_document {
    ($ty:ty) => {
        impl SyncedDocument for $ty {
            fn document_id(&self) -> DocumentId {
                self.id
            }

            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }
        }
    };
}

/// A recurring lesson slot in the user's weekly schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: DocumentId,
    pub title: String,
    /// ISO weekday, 1 = Monday.
    pub weekday: u8,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    pub subject_id: Option<DocumentId>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(title: impl Into<String>, weekday: u8, starts_at: NaiveTime, ends_at: NaiveTime) -> Self {
        Self {
            id: DocumentId::new(),
            title: title.into(),
            weekday,
            starts_at,
            ends_at,
            subject_id: None,
            updated_at: Utc::now(),
        }
    }
}

synced_document!(Schedule);

/// A homework assignment with a due date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Homework {
    pub id: DocumentId,
    pub title: String,
    pub note: String,
    pub due_date: NaiveDate,
    pub subject_id: Option<DocumentId>,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl Homework {
    pub fn new(title: impl Into<String>, due_date: NaiveDate) -> Self {
        Self {
            id: DocumentId::new(),
            title: title.into(),
            note: String::new(),
            due_date,
            subject_id: None,
            completed: false,
            updated_at: Utc::now(),
        }
    }
}

synced_document!(Homework);

/// A free-form todo item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: DocumentId,
    pub title: String,
    pub completed: bool,
    pub due_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            title: title.into(),
            completed: false,
            due_date: None,
            updated_at: Utc::now(),
        }
    }
}

synced_document!(Todo);

/// A longer-term study goal with a progress percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: DocumentId,
    pub title: String,
    pub target_date: Option<NaiveDate>,
    /// 0..=100.
    pub progress: u8,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            title: title.into(),
            target_date: None,
            progress: 0,
            updated_at: Utc::now(),
        }
    }
}

synced_document!(Goal);

/// A school or company the user belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: DocumentId,
    pub name: String,
    pub role: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            name: name.into(),
            role: None,
            updated_at: Utc::now(),
        }
    }
}

synced_document!(Organization);

/// A subject/course, referenced by schedules and homework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: DocumentId,
    pub name: String,
    /// Display color as a hex string, e.g. `#ff7043`.
    pub color: Option<String>,
    pub instructor: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            name: name.into(),
            color: None,
            instructor: None,
            updated_at: Utc::now(),
        }
    }
}

synced_document!(Subject);

/// A staff member of one of the user's organizations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: DocumentId,
    pub name: String,
    pub organization_id: Option<DocumentId>,
    pub email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            name: name.into(),
            organization_id: None,
            email: None,
            updated_at: Utc::now(),
        }
    }
}

synced_document!(Employee);

/// Status of an invitation or friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

/// An invitation to view another user's shared schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleInvitation {
    pub id: DocumentId,
    pub schedule_id: DocumentId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub status: InviteStatus,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleInvitation {
    pub fn new(schedule_id: DocumentId, from_user: UserId, to_user: UserId) -> Self {
        Self {
            id: DocumentId::new(),
            schedule_id,
            from_user,
            to_user,
            status: InviteStatus::Pending,
            updated_at: Utc::now(),
        }
    }
}

synced_document!(ScheduleInvitation);

/// A friend request between two accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: DocumentId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub status: InviteStatus,
    pub updated_at: DateTime<Utc>,
}

impl FriendRequest {
    pub fn new(from_user: UserId, to_user: UserId) -> Self {
        Self {
            id: DocumentId::new(),
            from_user,
            to_user,
            status: InviteStatus::Pending,
            updated_at: Utc::now(),
        }
    }
}

synced_document!(FriendRequest);

/// Per-user AI feature usage counter. Single document per account; its id is
/// derived from the user id so both devices and the backend agree on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiUsage {
    pub id: DocumentId,
    pub prompt_count: u32,
    pub period_start: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

impl AiUsage {
    pub fn new(user_id: UserId, period_start: NaiveDate) -> Self {
        Self {
            id: Self::document_id_for(user_id),
            prompt_count: 0,
            period_start,
            updated_at: Utc::now(),
        }
    }

    /// The fixed singleton document id for a given account.
    #[must_use]
    pub const fn document_id_for(user_id: UserId) -> DocumentId {
        DocumentId::from_uuid(user_id.as_uuid())
    }
}

synced_document!(AiUsage);
