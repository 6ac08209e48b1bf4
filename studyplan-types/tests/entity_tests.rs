use chrono::{NaiveDate, Utc};
use pretty_assertions::assert_eq;
use studyplan_types::{
    AiUsage, DocumentId, FriendRequest, Goal, Homework, InviteStatus, SourceSyncKey, Subject,
    SyncedDocument, Todo, UserId, keys,
};

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn todo_round_trips_through_json() {
    let mut todo = Todo::new("read chapter 4");
    todo.completed = true;
    todo.due_date = NaiveDate::from_ymd_opt(2026, 9, 1);

    let json = serde_json::to_string(&todo).unwrap();
    let back: Todo = serde_json::from_str(&json).unwrap();

    assert_eq!(back, todo);
}

#[test]
fn homework_round_trips_through_json() {
    let mut hw = Homework::new("essay draft", NaiveDate::from_ymd_opt(2026, 10, 15).unwrap());
    hw.note = "at least 1500 words".into();

    let json = serde_json::to_value(&hw).unwrap();
    let back: Homework = serde_json::from_value(json).unwrap();

    assert_eq!(back, hw);
}

#[test]
fn invite_status_uses_lowercase_wire_names() {
    assert_eq!(
        serde_json::to_string(&InviteStatus::Pending).unwrap(),
        "\"pending\""
    );
    assert_eq!(
        serde_json::from_str::<InviteStatus>("\"declined\"").unwrap(),
        InviteStatus::Declined
    );
}

#[test]
fn document_id_serializes_as_bare_uuid_string() {
    let id = DocumentId::new();
    let json = serde_json::to_string(&id).unwrap();

    assert_eq!(json, format!("\"{id}\""));
    assert_eq!(serde_json::from_str::<DocumentId>(&json).unwrap(), id);
}

// ── SyncedDocument ───────────────────────────────────────────────

#[test]
fn metadata_mirrors_identity_and_freshness() {
    let goal = Goal::new("pass the finals");
    let meta = goal.metadata();

    assert_eq!(meta.document_id, goal.id);
    assert_eq!(meta.updated_at, goal.updated_at);
}

#[test]
fn friend_request_starts_pending() {
    let req = FriendRequest::new(UserId::new(), UserId::new());

    assert_eq!(req.status, InviteStatus::Pending);
    assert!(req.updated_at <= Utc::now());
}

#[test]
fn ai_usage_document_id_is_derived_from_the_account() {
    let user = UserId::new();
    let usage = AiUsage::new(user, NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());

    assert_eq!(usage.document_id(), AiUsage::document_id_for(user));
    // Stable across calls, distinct across accounts.
    assert_eq!(AiUsage::document_id_for(user), AiUsage::document_id_for(user));
    assert_ne!(AiUsage::document_id_for(user), AiUsage::document_id_for(UserId::new()));
}

// ── Keys ─────────────────────────────────────────────────────────

#[test]
fn source_keys_are_unique() {
    let all = [
        keys::SCHEDULES,
        keys::HOMEWORK,
        keys::TODOS,
        keys::GOALS,
        keys::ORGANIZATIONS,
        keys::SUBJECTS,
        keys::EMPLOYEES,
        keys::SCHEDULE_INVITATIONS,
        keys::FRIEND_REQUESTS,
        keys::AI_USAGE,
    ];
    let unique: std::collections::HashSet<SourceSyncKey> = all.iter().copied().collect();

    assert_eq!(unique.len(), all.len());
    assert_eq!(keys::TODOS.as_str(), "todos");
    assert_eq!(keys::TODOS.to_string(), "todos");
}

#[test]
fn subject_defaults_have_no_instructor() {
    let subject = Subject::new("Linear Algebra");

    assert_eq!(subject.instructor, None);
    assert_eq!(subject.color, None);
}
