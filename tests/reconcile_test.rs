//! Change-detection laws of the reconciler, exercised through the public API.

use chrono::{TimeZone, Utc};

use forum_monitor::reconcile::{reconcile, DiffOutcome, NewItem};
use forum_monitor::snapshot::{
    ListingOrder, PostSummary, SectionSnapshot, Snapshot, ThreadSnapshot, ThreadSummary,
};
use forum_monitor::state::{MonitorState, SectionState, ThreadState};

fn thread(id: &str) -> ThreadSummary {
    ThreadSummary {
        thread_id: id.to_string(),
        title: format!("Tema {id}"),
        author_name: "Kael".to_string(),
        url: format!("https://rol.foroactivo.com/{id}-tema"),
        is_pinned: false,
        created_at: None,
    }
}

fn pinned(id: &str) -> ThreadSummary {
    ThreadSummary {
        is_pinned: true,
        ..thread(id)
    }
}

fn post(id: &str) -> PostSummary {
    PostSummary {
        post_id: id.to_string(),
        author_name: "Lyra".to_string(),
        body_preview: format!("Mensaje {id}"),
        url: format!("https://rol.foroactivo.com/t31-hilo#{id}"),
        posted_at: None,
    }
}

fn section(order: ListingOrder, threads: Vec<ThreadSummary>) -> Snapshot {
    Snapshot::Section(SectionSnapshot::new(order, threads))
}

fn posts(ids: &[&str]) -> Snapshot {
    Snapshot::Thread(ThreadSnapshot::new(ids.iter().map(|id| post(id)).collect()))
}

fn thread_marker(last: &str) -> MonitorState {
    MonitorState::Thread(ThreadState {
        last_post_id: Some(last.to_string()),
        last_checked_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        total_posts_seen: 3,
    })
}

fn seen(state: &MonitorState) -> &[String] {
    match state {
        MonitorState::Section(s) => &s.seen_thread_ids,
        MonitorState::Thread(_) => panic!("expected section state"),
    }
}

fn last_post(state: &MonitorState) -> Option<&str> {
    match state {
        MonitorState::Thread(t) => t.last_post_id.as_deref(),
        MonitorState::Section(_) => panic!("expected thread state"),
    }
}

fn ids(items: &[NewItem]) -> Vec<&str> {
    items.iter().map(NewItem::id).collect()
}

#[test]
fn test_first_section_run_is_silent_baseline() {
    let snapshot = section(
        ListingOrder::NewestFirst,
        vec![thread("t3"), thread("t2"), thread("t1")],
    );

    let diff = reconcile(&snapshot, None, Utc::now()).unwrap();

    assert!(diff.new_items.is_empty());
    assert_eq!(diff.outcome, DiffOutcome::Baseline);
    let next = diff.next_state.unwrap();
    assert_eq!(seen(&next), ["t1", "t2", "t3"]);
}

#[test]
fn test_first_thread_run_is_silent_baseline() {
    let diff = reconcile(&posts(&["p1", "p2", "p3"]), None, Utc::now()).unwrap();

    assert!(diff.new_items.is_empty());
    assert_eq!(diff.outcome, DiffOutcome::Baseline);
    assert_eq!(last_post(&diff.next_state.unwrap()), Some("p3"));
}

#[test]
fn test_seen_set_only_grows_across_runs() {
    let runs = [
        vec![thread("t2"), thread("t1")],
        vec![thread("t3"), thread("t2")],
        // t1 and t2 fell off the first page
        vec![thread("t5"), thread("t4"), thread("t3")],
        vec![],
    ];

    let mut state: Option<MonitorState> = None;
    let mut previous: Vec<String> = Vec::new();
    for threads in runs {
        let diff = reconcile(
            &section(ListingOrder::NewestFirst, threads),
            state.as_ref(),
            Utc::now(),
        )
        .unwrap();
        if let Some(next) = diff.next_state {
            state = Some(next);
        }
        let current = seen(state.as_ref().unwrap()).to_vec();
        assert!(previous.iter().all(|id| current.contains(id)));
        previous = current;
    }

    assert_eq!(previous, ["t1", "t2", "t3", "t4", "t5"]);
}

#[test]
fn test_new_threads_announced_in_creation_order() {
    let at = |day| Some(Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap());
    let prior = MonitorState::Section(SectionState {
        seen_thread_ids: vec!["t1".to_string()],
        last_checked_at: Utc::now(),
        total_threads: 1,
    });

    // Listing sorted by last activity, not creation
    let snapshot = section(
        ListingOrder::NewestFirst,
        vec![
            ThreadSummary { created_at: at(2), ..thread("t7") },
            ThreadSummary { created_at: at(4), ..thread("t9") },
            ThreadSummary { created_at: at(1), ..thread("t1") },
            ThreadSummary { created_at: at(3), ..thread("t8") },
        ],
    );

    let diff = reconcile(&snapshot, Some(&prior), Utc::now()).unwrap();
    assert_eq!(ids(&diff.new_items), vec!["t7", "t8", "t9"]);
}

#[test]
fn test_scrape_order_fallback_for_both_listing_orders() {
    let prior = MonitorState::Section(SectionState {
        seen_thread_ids: vec![],
        last_checked_at: Utc::now(),
        total_threads: 0,
    });

    let newest_first = section(
        ListingOrder::NewestFirst,
        vec![thread("t3"), thread("t2"), thread("t1")],
    );
    let oldest_first = section(
        ListingOrder::OldestFirst,
        vec![thread("t1"), thread("t2"), thread("t3")],
    );

    for snapshot in [newest_first, oldest_first] {
        let diff = reconcile(&snapshot, Some(&prior), Utc::now()).unwrap();
        assert_eq!(ids(&diff.new_items), vec!["t1", "t2", "t3"]);
    }
}

#[test]
fn test_pinned_threads_never_tracked() {
    let snapshot = section(
        ListingOrder::NewestFirst,
        vec![pinned("t100"), thread("t2"), pinned("t101"), thread("t1")],
    );

    let baseline = reconcile(&snapshot, None, Utc::now()).unwrap();
    let state = baseline.next_state.unwrap();
    assert_eq!(seen(&state), ["t1", "t2"]);

    let snapshot = section(
        ListingOrder::NewestFirst,
        vec![pinned("t102"), thread("t3"), thread("t2"), thread("t1")],
    );
    let diff = reconcile(&snapshot, Some(&state), Utc::now()).unwrap();
    assert_eq!(ids(&diff.new_items), vec!["t3"]);
    assert!(!seen(&diff.next_state.unwrap()).contains(&"t102".to_string()));
}

#[test]
fn test_replies_resume_after_marker() {
    let prior = thread_marker("p3");

    let diff = reconcile(&posts(&["p1", "p2", "p3", "p4", "p5"]), Some(&prior), Utc::now())
        .unwrap();

    assert_eq!(ids(&diff.new_items), vec!["p4", "p5"]);
    assert_eq!(diff.outcome, DiffOutcome::Resumed);
    let MonitorState::Thread(next) = diff.next_state.unwrap() else {
        panic!("expected thread state");
    };
    assert_eq!(next.last_post_id.as_deref(), Some("p5"));
    assert_eq!(next.total_posts_seen, 5);
}

#[test]
fn test_missing_marker_rebaselines_silently() {
    let prior = thread_marker("p2");

    let diff = reconcile(&posts(&["p4", "p5", "p6"]), Some(&prior), Utc::now()).unwrap();

    assert!(diff.new_items.is_empty());
    assert_eq!(
        diff.outcome,
        DiffOutcome::ReconciliationMiss {
            missing_post_id: "p2".to_string()
        }
    );
    assert_eq!(last_post(&diff.next_state.unwrap()), Some("p6"));
}

#[test]
fn test_empty_snapshot_keeps_prior_state() {
    let prior_section = MonitorState::Section(SectionState {
        seen_thread_ids: vec!["t1".to_string()],
        last_checked_at: Utc::now(),
        total_threads: 1,
    });
    let diff = reconcile(
        &section(ListingOrder::NewestFirst, vec![]),
        Some(&prior_section),
        Utc::now(),
    )
    .unwrap();
    assert!(diff.new_items.is_empty());
    assert!(diff.next_state.is_none());
    assert_eq!(diff.outcome, DiffOutcome::EmptySnapshot);

    let diff = reconcile(&posts(&[]), Some(&thread_marker("p3")), Utc::now()).unwrap();
    assert!(diff.new_items.is_empty());
    assert!(diff.next_state.is_none());
}

#[test]
fn test_replay_with_updated_state_is_quiet() {
    let section_prior = MonitorState::Section(SectionState {
        seen_thread_ids: vec!["t1".to_string()],
        last_checked_at: Utc::now(),
        total_threads: 1,
    });
    let section_snapshot = section(
        ListingOrder::NewestFirst,
        vec![thread("t3"), thread("t2"), thread("t1")],
    );
    let thread_snapshot = posts(&["p3", "p4", "p5"]);

    for (snapshot, prior) in [
        (section_snapshot, section_prior),
        (thread_snapshot, thread_marker("p3")),
    ] {
        let first = reconcile(&snapshot, Some(&prior), Utc::now()).unwrap();
        assert_eq!(first.new_items.len(), 2);

        let updated = first.next_state.unwrap();
        let second = reconcile(&snapshot, Some(&updated), Utc::now()).unwrap();
        assert!(second.new_items.is_empty());
    }
}

#[test]
fn test_partial_delivery_leaves_rest_pending() {
    let prior = thread_marker("p3");
    let snapshot = posts(&["p3", "p4", "p5", "p6"]);
    let diff = reconcile(&snapshot, Some(&prior), Utc::now()).unwrap();

    let committed = diff.state_after_delivery(1).unwrap();
    assert_eq!(last_post(&committed), Some("p4"));

    let retry = reconcile(&snapshot, Some(&committed), Utc::now()).unwrap();
    assert_eq!(ids(&retry.new_items), vec!["p5", "p6"]);

    assert!(diff.state_after_delivery(0).is_none());
}

#[test]
fn test_state_of_other_kind_is_rejected() {
    let prior = MonitorState::Section(SectionState {
        seen_thread_ids: vec![],
        last_checked_at: Utc::now(),
        total_threads: 0,
    });
    assert!(reconcile(&posts(&["p1"]), Some(&prior), Utc::now()).is_err());
}
