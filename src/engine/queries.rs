use std::fmt;

use ulid::Ulid;

use crate::model::*;

use super::availability::overlapping_pairs;
use super::Engine;

/// A broken cross-record invariant found by `Engine::audit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditIssue {
    OverlappingSlots {
        interviewer_id: Ulid,
        first: Ulid,
        second: Ulid,
    },
    /// A BOOKED slot points at a schedule that is missing or cancelled.
    DanglingScheduleLink { slot_id: Ulid, schedule_id: Ulid },
    AcceptedWithoutBookedSlot { request_id: Ulid },
    /// A cancelled or rejected request still references a slot.
    TerminalRequestHoldsSlot { request_id: Ulid, slot_id: Ulid },
    /// A SCHEDULED schedule whose request is missing or not ACCEPTED.
    OrphanSchedule { schedule_id: Ulid, request_id: Ulid },
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditIssue::OverlappingSlots {
                interviewer_id,
                first,
                second,
            } => write!(f, "interviewer {interviewer_id}: active slots {first} and {second} overlap"),
            AuditIssue::DanglingScheduleLink { slot_id, schedule_id } => {
                write!(f, "slot {slot_id} is linked to missing or cancelled schedule {schedule_id}")
            }
            AuditIssue::AcceptedWithoutBookedSlot { request_id } => {
                write!(f, "accepted request {request_id} has no booked slot")
            }
            AuditIssue::TerminalRequestHoldsSlot { request_id, slot_id } => {
                write!(f, "closed request {request_id} still references slot {slot_id}")
            }
            AuditIssue::OrphanSchedule { schedule_id, request_id } => {
                write!(f, "schedule {schedule_id} is active but request {request_id} is not accepted")
            }
        }
    }
}

impl Engine {
    pub fn get_request(&self, id: &Ulid) -> Option<BookingRequest> {
        self.requests.get(id).map(|r| r.value().clone())
    }

    pub fn get_schedule(&self, id: &Ulid) -> Option<Schedule> {
        self.schedules.get(id).map(|s| s.value().clone())
    }

    pub fn get_panel(&self, id: &Ulid) -> Option<Panel> {
        self.panels.get(id).map(|p| p.value().clone())
    }

    pub fn schedule_for_request(&self, request_id: &Ulid) -> Option<Schedule> {
        let schedule_id = *self.request_schedule.get(request_id)?;
        self.get_schedule(&schedule_id)
    }

    /// All requests assigned to an interviewer, newest first.
    pub fn requests_for_interviewer(&self, interviewer_id: &Ulid) -> Vec<BookingRequest> {
        self.collect_requests(|r| r.interviewer_id == *interviewer_id)
    }

    /// Requests waiting for the interviewer's answer, newest first.
    pub fn pending_requests_for_interviewer(&self, interviewer_id: &Ulid) -> Vec<BookingRequest> {
        self.collect_requests(|r| r.interviewer_id == *interviewer_id && r.status == RequestStatus::Pending)
    }

    /// Accepted interviews starting at or after `now`, soonest first.
    pub fn upcoming_interviews(&self, interviewer_id: &Ulid, now: Ms) -> Vec<BookingRequest> {
        let mut upcoming: Vec<BookingRequest> = self
            .requests
            .iter()
            .filter(|r| {
                r.interviewer_id == *interviewer_id
                    && r.status == RequestStatus::Accepted
                    && r.span.start >= now
            })
            .map(|r| r.value().clone())
            .collect();
        upcoming.sort_by_key(|r| r.span.start);
        upcoming
    }

    /// Requests raised by one requester, newest first.
    pub fn requests_by_requester(&self, requester_id: &Ulid) -> Vec<BookingRequest> {
        self.collect_requests(|r| r.requested_by == *requester_id)
    }

    pub fn panels_for_candidate(&self, candidate_id: &Ulid) -> Vec<Panel> {
        self.collect_panels(|p| p.candidate_id == Some(*candidate_id))
    }

    pub fn panels_by_requester(&self, requester_id: &Ulid) -> Vec<Panel> {
        self.collect_panels(|p| p.requested_by == *requester_id)
    }

    /// The candidate's status as tracked here, falling back to the directory.
    pub async fn candidate_status(&self, candidate_id: &Ulid) -> Option<CandidateStatus> {
        let record = self.candidates.get(candidate_id).map(|e| e.value().clone());
        match record {
            Some(record) => Some(record.lock().await.status),
            None => self.directory.candidate(candidate_id).map(|c| c.status),
        }
    }

    fn collect_requests(&self, keep: impl Fn(&BookingRequest) -> bool) -> Vec<BookingRequest> {
        let mut found: Vec<BookingRequest> = self
            .requests
            .iter()
            .filter(|r| keep(r.value()))
            .map(|r| r.value().clone())
            .collect();
        // ULIDs sort by creation time.
        found.sort_by(|a, b| b.id.cmp(&a.id));
        found
    }

    fn collect_panels(&self, keep: impl Fn(&Panel) -> bool) -> Vec<Panel> {
        let mut found: Vec<Panel> = self
            .panels
            .iter()
            .filter(|p| keep(p.value()))
            .map(|p| p.value().clone())
            .collect();
        found.sort_by(|a, b| b.id.cmp(&a.id));
        found
    }

    /// Check every cross-record invariant. Empty means consistent.
    pub async fn audit(&self) -> Vec<AuditIssue> {
        let mut issues = Vec::new();
        let states: Vec<_> = self.interviewers.iter().map(|e| e.value().clone()).collect();

        for rs in states {
            let guard = rs.read().await;
            for (first, second) in overlapping_pairs(&guard) {
                issues.push(AuditIssue::OverlappingSlots {
                    interviewer_id: guard.id,
                    first,
                    second,
                });
            }
            for slot in &guard.slots {
                if let Some(schedule_id) = slot.schedule_id() {
                    let live = self
                        .get_schedule(&schedule_id)
                        .is_some_and(|s| s.status != ScheduleStatus::Cancelled);
                    if !live {
                        issues.push(AuditIssue::DanglingScheduleLink {
                            slot_id: slot.id,
                            schedule_id,
                        });
                    }
                }
            }
            drop(guard);
        }

        let requests: Vec<BookingRequest> = self.requests.iter().map(|r| r.value().clone()).collect();
        for request in &requests {
            match (request.status, request.slot_id) {
                (RequestStatus::Accepted, slot_id) => {
                    let booked = match slot_id {
                        Some(id) => self
                            .get_slot(&id)
                            .await
                            .is_some_and(|s| matches!(s.state, SlotState::Booked { .. })),
                        None => false,
                    };
                    if !booked {
                        issues.push(AuditIssue::AcceptedWithoutBookedSlot {
                            request_id: request.id,
                        });
                    }
                }
                (RequestStatus::Cancelled | RequestStatus::Rejected, Some(slot_id)) => {
                    issues.push(AuditIssue::TerminalRequestHoldsSlot {
                        request_id: request.id,
                        slot_id,
                    });
                }
                _ => {}
            }
        }

        for schedule in self.schedules.iter() {
            if schedule.status != ScheduleStatus::Scheduled {
                continue;
            }
            let accepted = self
                .requests
                .get(&schedule.request_id)
                .is_some_and(|r| r.status == RequestStatus::Accepted);
            if !accepted {
                issues.push(AuditIssue::OrphanSchedule {
                    schedule_id: schedule.id,
                    request_id: schedule.request_id,
                });
            }
        }

        issues
    }
}
