use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// `[a,b)` and `[c,d)` overlap iff `a < d && c < b`. Touching endpoints do not.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Slots ────────────────────────────────────────────────────────

/// Lifecycle of an availability slot. One tagged state, no side flags:
/// a schedule link can only exist on a booked slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Available,
    /// `schedule_id` is the authoritative booking reference. It is `None`
    /// while a manually-approved request is pending, and briefly during
    /// cancellation after the link is dropped.
    Booked { schedule_id: Option<Ulid> },
    /// Replaced by the slots produced from a partial booking. Kept for
    /// history, invisible to every availability query.
    Superseded,
}

impl SlotState {
    pub fn is_active(&self) -> bool {
        !matches!(self, SlotState::Superseded)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SlotState::Available => "AVAILABLE",
            SlotState::Booked { .. } => "BOOKED",
            SlotState::Superseded => "SUPERSEDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Ulid,
    pub interviewer_id: Ulid,
    pub span: Span,
    pub state: SlotState,
    pub description: Option<String>,
    pub created_at: Ms,
}

impl Slot {
    pub fn schedule_id(&self) -> Option<Ulid> {
        match self.state {
            SlotState::Booked { schedule_id } => schedule_id,
            _ => None,
        }
    }
}

/// All slots of one interviewer. This is the unit of locking.
#[derive(Debug, Clone)]
pub struct InterviewerState {
    pub id: Ulid,
    /// Every slot ever created (superseded ones included), sorted by `span.start`.
    pub slots: Vec<Slot>,
}

impl InterviewerState {
    pub fn new(id: Ulid) -> Self {
        Self {
            id,
            slots: Vec::new(),
        }
    }

    /// Insert slot maintaining sort order by span.start.
    pub fn insert_slot(&mut self, slot: Slot) {
        let pos = self
            .slots
            .binary_search_by_key(&slot.span.start, |s| s.span.start)
            .unwrap_or_else(|e| e);
        self.slots.insert(pos, slot);
    }

    /// Remove slot by id.
    pub fn remove_slot(&mut self, id: Ulid) -> Option<Slot> {
        let pos = self.slots.iter().position(|s| s.id == id)?;
        Some(self.slots.remove(pos))
    }

    pub fn slot(&self, id: &Ulid) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == *id)
    }

    pub fn slot_mut(&mut self, id: &Ulid) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == *id)
    }

    /// Return only slots whose span overlaps the query window, superseded included.
    /// Uses binary search to skip slots starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Slot> {
        let right_bound = self.slots.partition_point(|s| s.span.start < query.end);
        self.slots[..right_bound]
            .iter()
            .filter(move |s| s.span.end > query.start)
    }

    /// Non-superseded slots overlapping the query window.
    pub fn active_overlapping(&self, query: &Span) -> impl Iterator<Item = &Slot> {
        self.overlapping(query).filter(|s| s.state.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state.is_active()).count()
    }
}

// ── Requests, schedules, panels ──────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Rejected | RequestStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: Ulid,
    pub candidate_name: String,
    pub candidate_id: Option<Ulid>,
    pub designation_id: Option<Ulid>,
    pub technology_ids: Vec<Ulid>,
    pub span: Span,
    pub requested_by: Ulid,
    pub interviewer_id: Ulid,
    /// Cleared once the request is cancelled or rejected.
    pub slot_id: Option<Ulid>,
    pub panel_id: Option<Ulid>,
    pub status: RequestStatus,
    pub urgent: bool,
    pub notes: Option<String>,
    pub response_notes: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
    pub responded_at: Option<Ms>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleStatus {
    Scheduled,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Ulid,
    pub request_id: Ulid,
    pub interviewer_id: Ulid,
    pub span: Span,
    pub status: ScheduleStatus,
    pub created_at: Ms,
}

/// One candidate, one window, several interviewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Panel {
    pub id: Ulid,
    pub candidate_id: Option<Ulid>,
    pub candidate_name: String,
    pub span: Span,
    pub requested_by: Ulid,
    /// Child requests, in the order the slots were given.
    pub request_ids: Vec<Ulid>,
    pub urgent: bool,
    pub notes: Option<String>,
    pub created_at: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateStatus {
    Applied,
    Screening,
    Scheduled,
    Interviewed,
    Selected,
    Rejected,
    Withdrawn,
}

// ── Operation inputs ─────────────────────────────────────────────

/// Who the interview is for and what it is about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateInfo {
    /// Required unless `candidate_id` resolves to a candidate with a name.
    pub name: Option<String>,
    pub candidate_id: Option<Ulid>,
    pub designation_id: Option<Ulid>,
    pub technology_ids: Vec<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInput {
    pub slot_id: Ulid,
    /// Defaults to the slot's own interval.
    pub span: Option<Span>,
    pub candidate: CandidateInfo,
    pub urgent: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelInput {
    /// One slot per interviewer.
    pub slot_ids: Vec<Ulid>,
    pub span: Span,
    pub candidate: CandidateInfo,
    pub urgent: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelTarget {
    Request(Ulid),
    Panel(Ulid),
}

/// The event types, flat, no nesting. One committed transaction is a
/// `Vec<Event>` and is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SlotCreated {
        slot: Slot,
    },
    SlotWithdrawn {
        id: Ulid,
        interviewer_id: Ulid,
    },
    /// Full-interval booking: the slot itself becomes BOOKED.
    SlotBooked {
        id: Ulid,
        interviewer_id: Ulid,
        description: String,
    },
    SlotSuperseded {
        id: Ulid,
        interviewer_id: Ulid,
    },
    ScheduleLinked {
        slot_id: Ulid,
        interviewer_id: Ulid,
        schedule_id: Ulid,
    },
    ScheduleUnlinked {
        slot_id: Ulid,
        interviewer_id: Ulid,
    },
    /// Back to AVAILABLE with the description cleared.
    SlotReleased {
        id: Ulid,
        interviewer_id: Ulid,
    },
    RequestCreated {
        request: BookingRequest,
    },
    RequestResponded {
        id: Ulid,
        status: RequestStatus,
        response_notes: Option<String>,
        at: Ms,
    },
    RequestCancelled {
        id: Ulid,
        at: Ms,
    },
    ScheduleCreated {
        schedule: Schedule,
    },
    ScheduleStatusChanged {
        id: Ulid,
        status: ScheduleStatus,
    },
    PanelCreated {
        panel: Panel,
    },
    CandidateStatusChanged {
        candidate_id: Ulid,
        status: CandidateStatus,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotCounts {
    pub available: usize,
    pub booked: usize,
}

/// One row of the HR availability view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityRecord {
    pub slot_id: Ulid,
    pub interviewer_id: Ulid,
    pub interviewer_name: String,
    pub interviewer_email: String,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub technologies: Vec<String>,
    pub years_of_experience: Option<u32>,
    pub start: Ms,
    pub end: Ms,
    pub state: &'static str,
    pub schedule_id: Option<Ulid>,
    pub candidate_name: Option<String>,
}
