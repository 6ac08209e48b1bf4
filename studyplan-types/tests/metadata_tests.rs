use chrono::DateTime;
use proptest::prelude::*;
use studyplan_types::{DocumentId, MetadataModel, SyncDecision, compare};

fn meta(id: DocumentId, millis: i64) -> MetadataModel {
    MetadataModel::new(id, DateTime::from_timestamp_millis(millis).unwrap())
}

// ── Fixed cases ──────────────────────────────────────────────────

#[test]
fn both_absent() {
    assert_eq!(compare(None, None), SyncDecision::BothAbsent);
}

#[test]
fn present_side_wins_over_absent() {
    let id = DocumentId::new();
    let m = meta(id, 100);

    assert_eq!(compare(Some(&m), None), SyncDecision::UseLocal);
    assert_eq!(compare(None, Some(&m)), SyncDecision::UseRemote);
}

#[test]
fn strictly_newer_local_wins() {
    let id = DocumentId::new();
    let local = meta(id, 200);
    let remote = meta(id, 100);

    assert_eq!(compare(Some(&local), Some(&remote)), SyncDecision::UseLocal);
}

#[test]
fn strictly_newer_remote_wins() {
    let id = DocumentId::new();
    let local = meta(id, 100);
    let remote = meta(id, 200);

    assert_eq!(compare(Some(&local), Some(&remote)), SyncDecision::UseRemote);
}

#[test]
fn equal_timestamps_mean_no_work() {
    let id = DocumentId::new();
    let local = meta(id, 150);
    let remote = meta(id, 150);

    assert_eq!(compare(Some(&local), Some(&remote)), SyncDecision::Equal);
}

#[test]
fn millisecond_difference_is_enough() {
    let id = DocumentId::new();
    let local = meta(id, 1000);
    let remote = meta(id, 1001);

    assert_eq!(compare(Some(&local), Some(&remote)), SyncDecision::UseRemote);
}

// ── Properties ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn total_and_deterministic(
        local in proptest::option::of(0i64..1_000_000_000),
        remote in proptest::option::of(0i64..1_000_000_000),
    ) {
        let id = DocumentId::new();
        let lm = local.map(|ts| meta(id, ts));
        let rm = remote.map(|ts| meta(id, ts));

        let first = compare(lm.as_ref(), rm.as_ref());
        let second = compare(lm.as_ref(), rm.as_ref());
        prop_assert_eq!(first, second);

        let expected = match (local, remote) {
            (None, None) => SyncDecision::BothAbsent,
            (Some(_), None) => SyncDecision::UseLocal,
            (None, Some(_)) => SyncDecision::UseRemote,
            (Some(l), Some(r)) => {
                if l > r {
                    SyncDecision::UseLocal
                } else if r > l {
                    SyncDecision::UseRemote
                } else {
                    SyncDecision::Equal
                }
            }
        };
        prop_assert_eq!(first, expected);
    }

    #[test]
    fn swapping_sides_mirrors_the_verdict(
        l in 0i64..1_000_000_000,
        r in 0i64..1_000_000_000,
    ) {
        let id = DocumentId::new();
        let lm = meta(id, l);
        let rm = meta(id, r);

        let forward = compare(Some(&lm), Some(&rm));
        let backward = compare(Some(&rm), Some(&lm));

        let mirrored = match forward {
            SyncDecision::UseLocal => SyncDecision::UseRemote,
            SyncDecision::UseRemote => SyncDecision::UseLocal,
            other => other,
        };
        prop_assert_eq!(backward, mirrored);
    }
}
