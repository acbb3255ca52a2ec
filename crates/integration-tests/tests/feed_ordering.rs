//! Ordering behaviour of the feed engine over both store backends.

mod support;

use cf_core::error::AppError;
use rstest::rstest;
use support::{assert_dense, lecture, Backend, Harness};
use uuid::Uuid;

fn pairs(items: &[(&str, i64)]) -> Vec<(String, i64)> {
    items.iter().map(|(t, p)| (t.to_string(), *p)).collect()
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn appends_take_the_next_dense_position(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    for title in ["Week 1", "Week 2", "Week 3"] {
        h.append(title).await;
    }

    assert_eq!(h.titles().await, ["Week 1", "Week 2", "Week 3"]);
    assert_eq!(h.unpinned().await, pairs(&[("Week 1", 1), ("Week 2", 2), ("Week 3", 3)]));

    let created = h.audit.actions();
    assert_eq!(created, ["post.create", "post.create", "post.create"]);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn pinning_lifts_a_post_and_leaves_a_gap(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    h.append("A").await;
    let b = h.append("B").await;
    let c = h.append("C").await;

    let pinned = h.feed.pin(h.course_id, b.id, h.teacher_id).await.unwrap();
    assert!(pinned.pinned);
    assert_eq!(pinned.pinned_at, Some(support::start_of_term()));
    assert_eq!(pinned.position, 2);

    assert_eq!(h.titles().await, ["B", "A", "C"]);
    // The gap stays until the next compaction.
    assert_eq!(h.unpinned().await, pairs(&[("A", 1), ("C", 3)]));

    // Most recent pin on top.
    h.clock.advance_seconds(60);
    h.feed.pin(h.course_id, c.id, h.teacher_id).await.unwrap();
    assert_eq!(h.titles().await, ["C", "B", "A"]);

    // Re-pinning refreshes the pin time.
    h.clock.advance_seconds(60);
    h.feed.pin(h.course_id, b.id, h.teacher_id).await.unwrap();
    assert_eq!(h.titles().await, ["B", "C", "A"]);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn unpin_compacts_then_appends_at_the_end(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    h.append("A").await;
    let b = h.append("B").await;
    h.append("C").await;
    h.feed.pin(h.course_id, b.id, h.teacher_id).await.unwrap();

    let unpinned = h.feed.unpin(h.course_id, b.id, h.teacher_id).await.unwrap();
    assert!(!unpinned.pinned);
    assert_eq!(unpinned.pinned_at, None);
    assert_eq!(unpinned.position, 3);

    assert_eq!(h.titles().await, ["A", "C", "B"]);
    assert_eq!(h.unpinned().await, pairs(&[("A", 1), ("C", 2), ("B", 3)]));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn unpin_of_an_unpinned_post_changes_nothing(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    let a = h.append("A").await;

    let same = h.feed.unpin(h.course_id, a.id, h.teacher_id).await.unwrap();
    assert_eq!(same, a);
    assert_eq!(h.audit.actions(), ["post.create"]);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn delete_compacts_the_unpinned_sequence(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    h.append("A").await;
    let b = h.append("B").await;
    h.append("C").await;
    h.append("D").await;

    h.feed.delete(h.course_id, b.id, h.teacher_id).await.unwrap();

    assert_eq!(h.unpinned().await, pairs(&[("A", 1), ("C", 2), ("D", 3)]));
    let err = h.feed.get(h.course_id, b.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(..)));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn deleting_the_first_post_shifts_the_rest_up(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    let first = h.append("A").await;
    h.append("B").await;
    h.append("C").await;

    h.feed.delete(h.course_id, first.id, h.teacher_id).await.unwrap();

    assert_eq!(h.unpinned().await, pairs(&[("B", 1), ("C", 2)]));
    assert_eq!(h.audit.actions().last().map(String::as_str), Some("post.delete"));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn delete_after_pin_closes_the_pin_gap_too(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    h.append("A").await;
    let b = h.append("B").await;
    let c = h.append("C").await;
    h.append("D").await;
    h.feed.pin(h.course_id, b.id, h.teacher_id).await.unwrap();

    h.feed.delete(h.course_id, c.id, h.teacher_id).await.unwrap();

    assert_eq!(h.titles().await, ["B", "A", "D"]);
    assert_eq!(h.unpinned().await, pairs(&[("A", 1), ("D", 2)]));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn deleting_a_pinned_post_leaves_positions_alone(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    h.append("A").await;
    let b = h.append("B").await;
    h.append("C").await;
    h.feed.pin(h.course_id, b.id, h.teacher_id).await.unwrap();

    h.feed.delete(h.course_id, b.id, h.teacher_id).await.unwrap();

    assert_eq!(h.unpinned().await, pairs(&[("A", 1), ("C", 3)]));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn moves_swap_with_the_adjacent_post(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    let a = h.append("A").await;
    let b = h.append("B").await;
    let c = h.append("C").await;

    let moved = h.feed.move_up(h.course_id, c.id, h.teacher_id).await.unwrap();
    assert_eq!(moved.position, 2);
    assert_eq!(h.titles().await, ["A", "C", "B"]);

    let moved = h.feed.move_down(h.course_id, a.id, h.teacher_id).await.unwrap();
    assert_eq!(moved.position, 2);
    assert_eq!(h.titles().await, ["C", "A", "B"]);
    assert_dense(&h.unpinned().await);

    assert_eq!(h.feed.get(h.course_id, b.id).await.unwrap().position, 3);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn moves_at_the_boundary_are_no_ops(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    let first = h.append("First").await;
    let last = h.append("Last").await;

    assert_eq!(h.feed.move_up(h.course_id, first.id, h.teacher_id).await.unwrap(), first);
    assert_eq!(h.feed.move_down(h.course_id, last.id, h.teacher_id).await.unwrap(), last);
    assert_eq!(h.unpinned().await, pairs(&[("First", 1), ("Last", 2)]));
    assert_eq!(h.audit.actions(), ["post.create", "post.create"]);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn moves_across_a_pin_gap_do_nothing(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    h.append("A").await;
    let b = h.append("B").await;
    let c = h.append("C").await;
    h.feed.pin(h.course_id, b.id, h.teacher_id).await.unwrap();

    // No post holds position 2 any more.
    let unchanged = h.feed.move_up(h.course_id, c.id, h.teacher_id).await.unwrap();
    assert_eq!(unchanged.position, 3);
    assert_eq!(h.unpinned().await, pairs(&[("A", 1), ("C", 3)]));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn pinned_posts_cannot_be_moved(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    h.append("A").await;
    let b = h.append("B").await;
    h.feed.pin(h.course_id, b.id, h.teacher_id).await.unwrap();

    let err = h.feed.move_up(h.course_id, b.id, h.teacher_id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn edit_keeps_ordering_state(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    h.append("A").await;
    let b = h.append("B").await;
    h.feed.pin(h.course_id, b.id, h.teacher_id).await.unwrap();
    h.clock.advance_seconds(30);

    let edited = h
        .feed
        .edit(h.course_id, b.id, h.teacher_id, lecture("  B (revised)  "))
        .await
        .unwrap();
    assert_eq!(edited.title, "B (revised)");
    assert!(edited.pinned);
    assert_eq!(edited.position, b.position);
    assert!(edited.updated_at > b.updated_at);

    let stored = h.feed.get(h.course_id, b.id).await.unwrap();
    assert_eq!(stored, edited);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn posts_are_scoped_to_their_course(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    let a = h.append("A").await;

    for err in [
        h.feed.get(h.other_course_id, a.id).await.unwrap_err(),
        h.feed.pin(h.other_course_id, a.id, h.teacher_id).await.unwrap_err(),
        h.feed.delete(h.other_course_id, a.id, h.teacher_id).await.unwrap_err(),
        h.feed.move_up(h.course_id, Uuid::now_v7(), h.teacher_id).await.unwrap_err(),
    ] {
        assert!(matches!(err, AppError::NotFound(..)), "unexpected {err:?}");
    }
    assert!(h.feed.list(h.other_course_id).await.unwrap().is_empty());

    let err = h
        .feed
        .append(Uuid::now_v7(), h.teacher_id, lecture("Orphan"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(..)));
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn audit_records_name_the_acting_user(#[case] backend: Backend) {
    let h = Harness::new(backend).await;
    let assistant = Uuid::now_v7();
    let a = h.append("A").await;
    let b = h.append("B").await;

    h.feed.pin(h.course_id, b.id, assistant).await.unwrap();
    h.feed.unpin(h.course_id, b.id, assistant).await.unwrap();
    h.feed.move_up(h.course_id, b.id, assistant).await.unwrap();
    h.feed.edit(h.course_id, a.id, assistant, lecture("A2")).await.unwrap();
    h.feed.delete(h.course_id, a.id, assistant).await.unwrap();

    let trail: Vec<(String, Option<Uuid>)> = h
        .audit
        .records()
        .into_iter()
        .map(|r| (r.action, r.user_id))
        .collect();
    let expected: Vec<(String, Option<Uuid>)> = [
        ("post.create", h.teacher_id),
        ("post.create", h.teacher_id),
        ("post.pin", assistant),
        ("post.unpin", assistant),
        ("post.move_up", assistant),
        ("post.edit", assistant),
        ("post.delete", assistant),
    ]
    .into_iter()
    .map(|(action, user)| (action.to_string(), Some(user)))
    .collect();
    assert_eq!(trail, expected);
}
