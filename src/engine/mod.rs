mod availability;
mod booking;
mod cancel;
mod conflict;
mod error;
mod panel;
mod queries;
mod search;
mod slots;

pub use availability::merge_overlapping;
pub use booking::{plan_split, SplitPlan};
pub use error::{Entity, EngineError};
pub use queries::AuditIssue;
pub use search::{AvailabilityFilter, SeniorityBound};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::warn;
use ulid::Ulid;

use crate::config::{BookingPolicy, Config};
use crate::directory::Directory;
use crate::model::*;
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::wal::Wal;

pub type SharedInterviewerState = Arc<RwLock<InterviewerState>>;

/// The engine's own view of a candidate's status. Seeded from the directory
/// the first time a booking touches the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct CandidateRecord {
    pub id: Ulid,
    pub status: CandidateStatus,
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        snapshot: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches transactions for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { events, response } => {
                let mut batch = vec![(events, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { events, response }) => {
                            batch.push((events, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                flush_and_respond(&mut wal, &mut batch);
                if let Some(cmd) = deferred {
                    handle_compact(&mut wal, cmd);
                }
            }
            other => handle_compact(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (events, _) in batch {
        if let Err(e) = wal.append_buffered(events) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_compact(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { snapshot, response } => {
            let result = Wal::write_compact_file(wal.path(), &snapshot)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::Append { response, .. } => {
            let _ = response.send(Err(io::Error::other("append routed to compaction")));
        }
    }
}

// ── Transactions ─────────────────────────────────────────

/// Locks held by one write operation plus the events it has staged.
///
/// Interviewer guards are kept sorted by id. Events are only applied after the
/// whole batch is durable in the WAL, so a failed commit leaves no trace.
pub(super) struct Txn {
    _gate: OwnedRwLockReadGuard<()>,
    interviewers: Vec<OwnedRwLockWriteGuard<InterviewerState>>,
    candidate: Option<OwnedMutexGuard<CandidateRecord>>,
    events: Vec<Event>,
}

impl Txn {
    pub(super) fn interviewer(&self, id: &Ulid) -> Option<&InterviewerState> {
        self.interviewers
            .binary_search_by_key(id, |g| g.id)
            .ok()
            .map(|i| &*self.interviewers[i])
    }

    /// Clone of a slot owned by a locked interviewer.
    pub(super) fn slot(&self, owner: &Ulid, slot_id: &Ulid) -> Result<Slot, EngineError> {
        self.interviewer(owner)
            .and_then(|rs| rs.slot(slot_id))
            .cloned()
            .ok_or(EngineError::NotFound(Entity::Slot, *slot_id))
    }

    pub(super) fn candidate_status(&self) -> Option<CandidateStatus> {
        self.candidate.as_ref().map(|c| c.status)
    }

    pub(super) fn push(&mut self, event: Event) {
        self.events.push(event);
    }
}

pub struct Engine {
    pub(super) interviewers: DashMap<Ulid, SharedInterviewerState>,
    /// Reverse lookup: slot id → interviewer id.
    pub(super) slot_owner: DashMap<Ulid, Ulid>,
    pub(super) requests: DashMap<Ulid, BookingRequest>,
    pub(super) schedules: DashMap<Ulid, Schedule>,
    /// request id → schedule id.
    pub(super) request_schedule: DashMap<Ulid, Ulid>,
    pub(super) panels: DashMap<Ulid, Panel>,
    pub(super) candidates: DashMap<Ulid, Arc<Mutex<CandidateRecord>>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Held shared by every transaction until its commit applies, exclusively by compaction.
    commit_gate: Arc<RwLock<()>>,
    pub(super) directory: Arc<dyn Directory>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) policy: BookingPolicy,
    replayed_records: usize,
}

/// Apply a slot event to its interviewer's state (caller holds the lock).
fn apply_to_interviewer(rs: &mut InterviewerState, event: &Event, slot_owner: &DashMap<Ulid, Ulid>) {
    match event {
        Event::SlotCreated { slot } => {
            slot_owner.insert(slot.id, slot.interviewer_id);
            rs.insert_slot(slot.clone());
        }
        Event::SlotWithdrawn { id, .. } => {
            rs.remove_slot(*id);
            slot_owner.remove(id);
        }
        Event::SlotBooked { id, description, .. } => {
            if let Some(slot) = rs.slot_mut(id) {
                slot.state = SlotState::Booked { schedule_id: None };
                slot.description = Some(description.clone());
            }
        }
        Event::SlotSuperseded { id, .. } => {
            if let Some(slot) = rs.slot_mut(id) {
                slot.state = SlotState::Superseded;
            }
        }
        Event::ScheduleLinked {
            slot_id,
            schedule_id,
            ..
        } => {
            if let Some(slot) = rs.slot_mut(slot_id) {
                slot.state = SlotState::Booked {
                    schedule_id: Some(*schedule_id),
                };
            }
        }
        Event::ScheduleUnlinked { slot_id, .. } => {
            if let Some(slot) = rs.slot_mut(slot_id)
                && let SlotState::Booked { .. } = slot.state
            {
                slot.state = SlotState::Booked { schedule_id: None };
            }
        }
        Event::SlotReleased { id, .. } => {
            if let Some(slot) = rs.slot_mut(id) {
                slot.state = SlotState::Available;
                slot.description = None;
            }
        }
        // Ledger and candidate events are handled at the engine level, not here
        _ => {}
    }
}

/// Extract the interviewer whose slots an event touches.
fn event_interviewer_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::SlotCreated { slot } => Some(slot.interviewer_id),
        Event::SlotWithdrawn { interviewer_id, .. }
        | Event::SlotBooked { interviewer_id, .. }
        | Event::SlotSuperseded { interviewer_id, .. }
        | Event::ScheduleLinked { interviewer_id, .. }
        | Event::ScheduleUnlinked { interviewer_id, .. }
        | Event::SlotReleased { interviewer_id, .. } => Some(*interviewer_id),
        _ => None,
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
    ) -> io::Result<Self> {
        let records = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            interviewers: DashMap::new(),
            slot_owner: DashMap::new(),
            requests: DashMap::new(),
            schedules: DashMap::new(),
            request_schedule: DashMap::new(),
            panels: DashMap::new(),
            candidates: DashMap::new(),
            wal_tx,
            commit_gate: Arc::new(RwLock::new(())),
            directory,
            notifier,
            policy: BookingPolicy::default(),
            replayed_records: records.len(),
        };

        // We're the sole owner of every lock here, so try_write/try_lock always
        // succeed. Never block: this may run inside an async context.
        for event in records.iter().flatten() {
            engine.replay_event(event);
        }

        Ok(engine)
    }

    /// Open the engine described by `config`: WAL under its data dir, its booking policy.
    pub fn open(
        config: &Config,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self::new(config.wal_path(), directory, notifier)?.with_policy(config.policy))
    }

    pub fn with_policy(mut self, policy: BookingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> BookingPolicy {
        self.policy
    }

    /// Number of WAL records (transactions) replayed on open.
    pub fn replayed_records(&self) -> usize {
        self.replayed_records
    }

    fn replay_event(&self, event: &Event) {
        if let Some(interviewer_id) = event_interviewer_id(event) {
            let rs = self
                .interviewers
                .entry(interviewer_id)
                .or_insert_with(|| Arc::new(RwLock::new(InterviewerState::new(interviewer_id))))
                .clone();
            if let Ok(mut guard) = rs.try_write() {
                apply_to_interviewer(&mut guard, event, &self.slot_owner);
            }
            return;
        }
        match event {
            Event::CandidateStatusChanged {
                candidate_id,
                status,
            } => {
                let record = self.candidate_record(*candidate_id);
                if let Ok(mut guard) = record.try_lock() {
                    guard.status = *status;
                }
            }
            other => self.apply_to_ledger(other),
        }
    }

    /// Apply a request/schedule/panel event to the id-keyed tables.
    fn apply_to_ledger(&self, event: &Event) {
        match event {
            Event::RequestCreated { request } => {
                self.requests.insert(request.id, request.clone());
            }
            Event::RequestResponded {
                id,
                status,
                response_notes,
                at,
            } => {
                if let Some(mut r) = self.requests.get_mut(id) {
                    r.status = *status;
                    r.response_notes = response_notes.clone();
                    r.responded_at = Some(*at);
                    r.updated_at = *at;
                    if status.is_terminal() {
                        r.slot_id = None;
                    }
                }
            }
            Event::RequestCancelled { id, at } => {
                if let Some(mut r) = self.requests.get_mut(id) {
                    r.status = RequestStatus::Cancelled;
                    r.slot_id = None;
                    r.updated_at = *at;
                }
            }
            Event::ScheduleCreated { schedule } => {
                self.request_schedule.insert(schedule.request_id, schedule.id);
                self.schedules.insert(schedule.id, schedule.clone());
            }
            Event::ScheduleStatusChanged { id, status } => {
                if let Some(mut s) = self.schedules.get_mut(id) {
                    s.status = *status;
                }
            }
            Event::PanelCreated { panel } => {
                self.panels.insert(panel.id, panel.clone());
            }
            _ => {}
        }
    }

    fn candidate_record(&self, candidate_id: Ulid) -> Arc<Mutex<CandidateRecord>> {
        self.candidates
            .entry(candidate_id)
            .or_insert_with(|| {
                let status = self
                    .directory
                    .candidate(&candidate_id)
                    .map(|c| c.status)
                    .unwrap_or(CandidateStatus::Applied);
                Arc::new(Mutex::new(CandidateRecord {
                    id: candidate_id,
                    status,
                }))
            })
            .clone()
    }

    pub(super) fn get_interviewer(&self, id: &Ulid) -> Option<SharedInterviewerState> {
        self.interviewers.get(id).map(|e| e.value().clone())
    }

    /// Make sure an interviewer has a state entry, so its slots can be locked.
    pub(super) fn ensure_interviewer(&self, id: Ulid) {
        self.interviewers
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(InterviewerState::new(id))));
    }

    pub(super) fn slot_owner_of(&self, slot_id: &Ulid) -> Result<Ulid, EngineError> {
        self.slot_owner
            .get(slot_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(Entity::Slot, *slot_id))
    }

    /// Start a transaction: write-lock every listed interviewer in ascending id order.
    pub(super) async fn begin(
        &self,
        interviewer_ids: impl IntoIterator<Item = Ulid>,
    ) -> Result<Txn, EngineError> {
        let gate = self.commit_gate.clone().read_owned().await;
        let interviewers = self.lock_interviewers(interviewer_ids).await?;
        Ok(Txn {
            _gate: gate,
            interviewers,
            candidate: None,
            events: Vec::new(),
        })
    }

    /// Write-lock interviewers in id order.
    async fn lock_interviewers(
        &self,
        interviewer_ids: impl IntoIterator<Item = Ulid>,
    ) -> Result<Vec<OwnedRwLockWriteGuard<InterviewerState>>, EngineError> {
        let mut ids: Vec<Ulid> = interviewer_ids.into_iter().collect();
        ids.sort();
        ids.dedup();

        let mut interviewers = Vec::with_capacity(ids.len());
        for id in ids {
            let rs = self
                .get_interviewer(&id)
                .ok_or(EngineError::NotFound(Entity::Interviewer, id))?;
            interviewers.push(rs.write_owned().await);
        }
        Ok(interviewers)
    }

    /// Add the candidate's ledger lock to a transaction. Always taken after
    /// the interviewer locks.
    pub(super) async fn lock_candidate(&self, txn: &mut Txn, candidate_id: Ulid) {
        let record = self.candidate_record(candidate_id);
        txn.candidate = Some(record.lock_owned().await);
    }

    /// Append the staged events as one WAL record, then apply them.
    pub(super) async fn commit(&self, txn: Txn) -> Result<(), EngineError> {
        let Txn {
            _gate,
            mut interviewers,
            mut candidate,
            events,
        } = txn;
        if events.is_empty() {
            return Ok(());
        }
        self.wal_append(events.clone()).await?;

        for event in &events {
            if let Some(iid) = event_interviewer_id(event) {
                if let Ok(i) = interviewers.binary_search_by_key(&iid, |g| g.id) {
                    apply_to_interviewer(&mut interviewers[i], event, &self.slot_owner);
                }
                continue;
            }
            match event {
                Event::CandidateStatusChanged { status, .. } => {
                    if let Some(record) = candidate.as_deref_mut() {
                        record.status = *status;
                    }
                }
                other => self.apply_to_ledger(other),
            }
        }
        Ok(())
    }

    /// Write one transaction to the WAL via the background group-commit writer.
    async fn wal_append(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Rewrite the WAL as a single snapshot record of the current state.
    ///
    /// Holds every interviewer's write lock while the snapshot is taken and
    /// swapped in, so no transaction can commit in between.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // With the gate held no transaction is in flight, so the id scan is complete.
        let gate = self.commit_gate.write().await;
        let ids: Vec<Ulid> = self.interviewers.iter().map(|e| *e.key()).collect();
        let interviewers = self.lock_interviewers(ids).await?;

        let mut snapshot = Vec::new();
        for rs in &interviewers {
            for slot in &rs.slots {
                snapshot.push(Event::SlotCreated { slot: slot.clone() });
            }
        }
        for r in self.requests.iter() {
            snapshot.push(Event::RequestCreated {
                request: r.value().clone(),
            });
        }
        for s in self.schedules.iter() {
            snapshot.push(Event::ScheduleCreated {
                schedule: s.value().clone(),
            });
        }
        for p in self.panels.iter() {
            snapshot.push(Event::PanelCreated {
                panel: p.value().clone(),
            });
        }
        let records: Vec<_> = self.candidates.iter().map(|e| e.value().clone()).collect();
        for record in records {
            let c = record.lock().await;
            snapshot.push(Event::CandidateStatusChanged {
                candidate_id: c.id,
                status: c.status,
            });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                snapshot,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()));
        drop(interviewers);
        drop(gate);
        result
    }

    /// Best-effort delivery: failures are logged and counted, never returned.
    pub(super) async fn notify(&self, kind: NotificationKind, recipient: Ulid, payload: serde_json::Value) {
        let notification = Notification {
            kind,
            recipient,
            payload,
        };
        if let Err(e) = self.notifier.send(notification).await {
            warn!("{} notification to {recipient} failed: {e}", kind.as_str());
            metrics::counter!(crate::observability::NOTIFY_FAILURES_TOTAL).increment(1);
        }
    }

    /// JSON payload describing a request, for notifications.
    pub(super) fn request_payload(&self, request: &BookingRequest) -> serde_json::Value {
        let designation = request
            .designation_id
            .and_then(|id| self.directory.designation(&id))
            .map(|d| d.name);
        serde_json::json!({
            "request_id": request.id.to_string(),
            "candidate_name": request.candidate_name,
            "start": request.span.start,
            "end": request.span.end,
            "designation": designation,
            "status": format!("{:?}", request.status).to_uppercase(),
        })
    }
}
