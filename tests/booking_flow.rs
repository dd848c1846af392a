use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use slotwise::config::{BookingPolicy, Config};
use slotwise::directory::{Candidate, InMemoryDirectory, InterviewerProfile};
use slotwise::engine::{Engine, EngineError};
use slotwise::model::*;
use slotwise::notify::{Notification, NotificationKind, NotifyHub};

const H: Ms = 3_600_000; // 1 hour in ms
const DAY0: Ms = 2_000_000_000_000;

// ── Test infrastructure ──────────────────────────────────────

struct Setup {
    config: Config,
    dir: Arc<InMemoryDirectory>,
    hub: Arc<NotifyHub>,
}

fn setup(policy: BookingPolicy) -> Setup {
    let data_dir: PathBuf = std::env::temp_dir().join(format!("slotwise_int_test_{}", Ulid::new()));
    Setup {
        config: Config {
            data_dir,
            policy,
            compact_threshold: 1000,
        },
        dir: Arc::new(InMemoryDirectory::new()),
        hub: Arc::new(NotifyHub::new()),
    }
}

impl Setup {
    fn open(&self) -> Engine {
        Engine::open(&self.config, self.dir.clone(), self.hub.clone()).unwrap()
    }

    fn interviewer(&self, name: &str) -> Ulid {
        let id = Ulid::new();
        self.dir.insert_interviewer(InterviewerProfile {
            id,
            full_name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            department_id: None,
            designation_id: None,
            years_of_experience: Some(5),
            technologies: Vec::new(),
        });
        id
    }

    fn candidate(&self, name: &str) -> Ulid {
        let id = Ulid::new();
        self.dir.insert_candidate(Candidate {
            id,
            name: name.into(),
            email: "candidate@example.com".into(),
            status: CandidateStatus::Screening,
        });
        id
    }
}

fn for_candidate(id: Ulid) -> CandidateInfo {
    CandidateInfo {
        candidate_id: Some(id),
        ..Default::default()
    }
}

fn whole_day() -> Span {
    Span::new(DAY0, DAY0 + 24 * H)
}

/// Wait for a notification with timeout.
async fn recv_notification(rx: &mut broadcast::Receiver<Notification>, timeout: Duration) -> Option<Notification> {
    tokio::time::timeout(timeout, rx.recv()).await.ok().and_then(Result::ok)
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn book_cancel_rebook() {
    let s = setup(BookingPolicy::AutoAccept);
    let engine = s.open();
    let hr = Ulid::new();
    let ada = s.interviewer("Ada");
    let grace = s.candidate("Grace Hopper");
    let alan = s.candidate("Alan Turing");

    let slot = assert_ok!(
        engine
            .create_slot(ada, Span::new(DAY0 + 9 * H, DAY0 + 12 * H), Some("Morning".into()))
            .await
    );

    let first = assert_ok!(
        engine
            .book(
                hr,
                BookingInput {
                    slot_id: slot.id,
                    span: Some(Span::new(DAY0 + 10 * H, DAY0 + 11 * H)),
                    candidate: for_candidate(grace),
                    urgent: true,
                    notes: Some("Bring laptop".into()),
                },
            )
            .await
    );
    assert_eq!(first.candidate_name, "Grace Hopper");
    assert!(first.urgent);

    // The original slot is gone; its remainders are bookable.
    let err = assert_err!(
        engine
            .book(
                hr,
                BookingInput {
                    slot_id: slot.id,
                    span: None,
                    candidate: for_candidate(alan),
                    urgent: false,
                    notes: None,
                },
            )
            .await
    );
    assert!(matches!(err, EngineError::Conflict(..)));

    assert_ok!(engine.cancel(hr, CancelTarget::Request(first.id)).await);
    assert_eq!(
        assert_ok!(engine.available_coverage(ada, whole_day()).await),
        vec![Span::new(DAY0 + 9 * H, DAY0 + 12 * H)]
    );

    // The freed middle piece can be booked again.
    let middle = assert_ok!(engine.list_slots(ada, whole_day()).await)
        .into_iter()
        .find(|s| s.span.start == DAY0 + 10 * H)
        .unwrap();
    let second = assert_ok!(
        engine
            .book(
                hr,
                BookingInput {
                    slot_id: middle.id,
                    span: None,
                    candidate: for_candidate(alan),
                    urgent: false,
                    notes: None,
                },
            )
            .await
    );
    assert_eq!(second.slot_id, Some(middle.id));
    assert_eq!(engine.candidate_status(&grace).await, Some(CandidateStatus::Screening));
    assert_eq!(engine.candidate_status(&alan).await, Some(CandidateStatus::Scheduled));
    assert!(engine.audit().await.is_empty());
}

#[tokio::test]
async fn notifications_follow_the_lifecycle() {
    let s = setup(BookingPolicy::ManualApproval);
    let engine = s.open();
    let hr = Ulid::new();
    let ada = s.interviewer("Ada");
    let mut ada_rx = s.hub.subscribe(ada);
    let mut hr_rx = s.hub.subscribe(hr);

    let slot = assert_ok!(engine.create_slot(ada, Span::new(DAY0 + 9 * H, DAY0 + 10 * H), None).await);
    let request = assert_ok!(
        engine
            .book(
                hr,
                BookingInput {
                    slot_id: slot.id,
                    span: None,
                    candidate: CandidateInfo {
                        name: Some("Grace Hopper".into()),
                        ..Default::default()
                    },
                    urgent: false,
                    notes: None,
                },
            )
            .await
    );
    assert_eq!(request.status, RequestStatus::Pending);

    let requested = recv_notification(&mut ada_rx, Duration::from_secs(5))
        .await
        .expect("expected notification");
    assert_eq!(requested.kind, NotificationKind::Requested);
    assert_eq!(requested.payload["status"], "PENDING");

    assert_ok!(engine.respond(ada, request.id, Decision::Accept, None).await);
    let responded = recv_notification(&mut hr_rx, Duration::from_secs(5))
        .await
        .expect("expected notification");
    assert_eq!(responded.kind, NotificationKind::Responded);
    assert_eq!(responded.payload["status"], "ACCEPTED");
    assert_eq!(responded.payload["candidate_name"], "Grace Hopper");

    assert_ok!(engine.cancel(hr, CancelTarget::Request(request.id)).await);
    let cancelled = recv_notification(&mut ada_rx, Duration::from_secs(5))
        .await
        .expect("expected notification");
    assert_eq!(cancelled.kind, NotificationKind::Cancelled);
}

#[tokio::test]
async fn torn_tail_is_ignored_on_reopen() {
    let s = setup(BookingPolicy::AutoAccept);
    let hr = Ulid::new();
    let ada = s.interviewer("Ada");
    let bob = s.interviewer("Bob");
    let grace = s.candidate("Grace Hopper");

    let (slots_before, panel) = {
        let engine = s.open();
        let a = assert_ok!(engine.create_slot(ada, Span::new(DAY0 + 9 * H, DAY0 + 11 * H), None).await);
        let b = assert_ok!(engine.create_slot(bob, Span::new(DAY0 + 9 * H, DAY0 + 11 * H), None).await);
        let panel = assert_ok!(
            engine
                .book_panel(
                    hr,
                    PanelInput {
                        slot_ids: vec![a.id, b.id],
                        span: Span::new(DAY0 + 10 * H, DAY0 + 11 * H),
                        candidate: for_candidate(grace),
                        urgent: false,
                        notes: None,
                    },
                )
                .await
        );
        (assert_ok!(engine.list_slots(ada, whole_day()).await), panel)
    };

    // Simulate a crash halfway through writing the next record.
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(s.config.wal_path())
        .unwrap();
    file.write_all(&512u32.to_le_bytes()).unwrap();
    file.write_all(&[0xAB; 17]).unwrap();
    drop(file);

    let engine = s.open();
    assert_eq!(engine.replayed_records(), 3);
    assert_eq!(assert_ok!(engine.list_slots(ada, whole_day()).await), slots_before);
    assert_eq!(engine.get_panel(&panel.id), Some(panel.clone()));
    assert_eq!(engine.candidate_status(&grace).await, Some(CandidateStatus::Scheduled));
    assert!(engine.audit().await.is_empty());

    let cancelled = assert_ok!(engine.cancel_panel(hr, panel.id).await);
    assert_eq!(cancelled.len(), 2);
}

#[tokio::test]
async fn search_spans_interviewers() {
    let s = setup(BookingPolicy::AutoAccept);
    let engine = s.open();
    let ada = s.interviewer("Ada");
    let bob = s.interviewer("Bob");
    assert_ok!(engine.create_slot(bob, Span::new(DAY0 + 9 * H, DAY0 + 10 * H), None).await);
    assert_ok!(engine.create_slot(ada, Span::new(DAY0 + 9 * H, DAY0 + 10 * H), None).await);
    assert_ok!(engine.create_slot(ada, Span::new(DAY0 + 8 * H, DAY0 + 9 * H), None).await);

    let filter = slotwise::engine::AvailabilityFilter {
        range: Some(whole_day()),
        min_years_experience: Some(5),
        ..Default::default()
    };
    let hits = assert_ok!(engine.search_availability(&filter).await);
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].interviewer_name, "Ada");
    assert!(hits.windows(2).all(|w| w[0].start <= w[1].start));
}
