use tracing::info;
use ulid::Ulid;

use crate::config::BookingPolicy;
use crate::limits::*;
use crate::model::*;
use crate::notify::NotificationKind;
use crate::observability::{observe, BOOKINGS_TOTAL};

use super::conflict::{check_bookable, check_text, now_ms, validate_span};
use super::{Engine, EngineError, Entity, Txn};

/// Description prefix given to a slot booked for a single interview.
pub(super) const INTERVIEW_LABEL: &str = "Interview: ";
/// Description prefix given to a slot booked as part of a panel.
pub(super) const PANEL_LABEL: &str = "Panel Interview: ";

/// Events that carve a booking out of an AVAILABLE slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    /// The slot that ends up BOOKED: the original on a full match, otherwise a new one.
    pub booked_slot_id: Ulid,
    pub events: Vec<Event>,
}

/// Split `slot` around `booked`, which must lie inside it.
///
/// Full match books the slot in place. Otherwise the original is superseded
/// and replaced by an optional AVAILABLE prefix, the BOOKED interval and an
/// optional AVAILABLE suffix. Remainders keep the original description.
pub fn plan_split(slot: &Slot, booked: Span, label: &str, now: Ms) -> SplitPlan {
    if booked == slot.span {
        return SplitPlan {
            booked_slot_id: slot.id,
            events: vec![Event::SlotBooked {
                id: slot.id,
                interviewer_id: slot.interviewer_id,
                description: label.to_string(),
            }],
        };
    }

    let piece = |span: Span, state: SlotState, description: Option<String>| Slot {
        id: Ulid::new(),
        interviewer_id: slot.interviewer_id,
        span,
        state,
        description,
        created_at: now,
    };

    let mut events = vec![Event::SlotSuperseded {
        id: slot.id,
        interviewer_id: slot.interviewer_id,
    }];
    if booked.start > slot.span.start {
        let prefix = piece(
            Span::new(slot.span.start, booked.start),
            SlotState::Available,
            slot.description.clone(),
        );
        events.push(Event::SlotCreated { slot: prefix });
    }
    let booked_slot = piece(
        booked,
        SlotState::Booked { schedule_id: None },
        Some(label.to_string()),
    );
    let booked_slot_id = booked_slot.id;
    events.push(Event::SlotCreated { slot: booked_slot });
    if booked.end < slot.span.end {
        let suffix = piece(
            Span::new(booked.end, slot.span.end),
            SlotState::Available,
            slot.description.clone(),
        );
        events.push(Event::SlotCreated { slot: suffix });
    }

    SplitPlan {
        booked_slot_id,
        events,
    }
}

/// Candidate details after directory validation.
#[derive(Debug, Clone)]
pub(super) struct ResolvedCandidate {
    pub id: Option<Ulid>,
    pub name: String,
    pub designation_id: Option<Ulid>,
    pub technology_ids: Vec<Ulid>,
}

/// Everything about one booking that is shared between the single and panel paths.
pub(super) struct BookingDraft<'a> {
    pub request_id: Ulid,
    pub candidate: &'a ResolvedCandidate,
    pub requested_by: Ulid,
    pub panel_id: Option<Ulid>,
    pub accept: bool,
    pub urgent: bool,
    pub notes: Option<String>,
    pub label: String,
    pub now: Ms,
}

/// Stage the split, the request and (when accepted) the linked schedule.
/// The caller has already checked that `slot` can take `span`.
pub(super) fn stage_booking(
    txn: &mut Txn,
    slot: &Slot,
    span: Span,
    draft: &BookingDraft<'_>,
) -> (BookingRequest, Option<Schedule>) {
    let plan = plan_split(slot, span, &draft.label, draft.now);
    for event in plan.events {
        txn.push(event);
    }

    let request = BookingRequest {
        id: draft.request_id,
        candidate_name: draft.candidate.name.clone(),
        candidate_id: draft.candidate.id,
        designation_id: draft.candidate.designation_id,
        technology_ids: draft.candidate.technology_ids.clone(),
        span,
        requested_by: draft.requested_by,
        interviewer_id: slot.interviewer_id,
        slot_id: Some(plan.booked_slot_id),
        panel_id: draft.panel_id,
        status: if draft.accept {
            RequestStatus::Accepted
        } else {
            RequestStatus::Pending
        },
        urgent: draft.urgent,
        notes: draft.notes.clone(),
        response_notes: None,
        created_at: draft.now,
        updated_at: draft.now,
        responded_at: None,
    };
    txn.push(Event::RequestCreated {
        request: request.clone(),
    });

    if !draft.accept {
        return (request, None);
    }
    let schedule = Schedule {
        id: Ulid::new(),
        request_id: request.id,
        interviewer_id: slot.interviewer_id,
        span,
        status: ScheduleStatus::Scheduled,
        created_at: draft.now,
    };
    txn.push(Event::ScheduleCreated {
        schedule: schedule.clone(),
    });
    txn.push(Event::ScheduleLinked {
        slot_id: plan.booked_slot_id,
        interviewer_id: slot.interviewer_id,
        schedule_id: schedule.id,
    });
    (request, Some(schedule))
}

impl Engine {
    /// Check candidate details against the directory and settle the display name.
    pub(super) fn resolve_candidate(&self, info: &CandidateInfo) -> Result<ResolvedCandidate, EngineError> {
        let known = match info.candidate_id {
            Some(id) => Some(
                self.directory
                    .candidate(&id)
                    .ok_or(EngineError::NotFound(Entity::Candidate, id))?,
            ),
            None => None,
        };
        let name = info
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| known.map(|c| c.name).filter(|n| !n.trim().is_empty()))
            .ok_or(EngineError::Validation("candidate name is required"))?;
        check_text(Some(&name), MAX_CANDIDATE_NAME_LEN, "candidate name too long")?;

        if let Some(id) = info.designation_id
            && self.directory.designation(&id).is_none()
        {
            return Err(EngineError::NotFound(Entity::Designation, id));
        }
        if info.technology_ids.len() > MAX_TECHNOLOGIES_PER_REQUEST {
            return Err(EngineError::LimitExceeded("too many technologies"));
        }
        for id in &info.technology_ids {
            if self.directory.technology(id).is_none() {
                return Err(EngineError::NotFound(Entity::Technology, *id));
            }
        }

        Ok(ResolvedCandidate {
            id: info.candidate_id,
            name,
            designation_id: info.designation_id,
            technology_ids: info.technology_ids.clone(),
        })
    }

    /// Book all or part of one slot for a candidate.
    ///
    /// Under auto-accept the request is ACCEPTED with a linked schedule and the
    /// candidate moves to SCHEDULED. Under manual approval the slot is held
    /// the same way but the request stays PENDING until `respond`.
    pub async fn book(&self, caller: Ulid, input: BookingInput) -> Result<BookingRequest, EngineError> {
        observe("book", async {
            check_text(input.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;
            let candidate = self.resolve_candidate(&input.candidate)?;
            let owner = self.slot_owner_of(&input.slot_id)?;

            let mut txn = self.begin([owner]).await?;
            let slot = txn.slot(&owner, &input.slot_id)?;
            let span = input.span.unwrap_or(slot.span);
            validate_span(&span)?;
            check_bookable(&slot, &span)?;

            let accept = self.policy == BookingPolicy::AutoAccept;
            if accept && let Some(cid) = candidate.id {
                self.lock_candidate(&mut txn, cid).await;
            }

            let draft = BookingDraft {
                request_id: Ulid::new(),
                candidate: &candidate,
                requested_by: caller,
                panel_id: None,
                accept,
                urgent: input.urgent,
                notes: input.notes.clone(),
                label: format!("{INTERVIEW_LABEL}{}", candidate.name),
                now: now_ms(),
            };
            let (request, schedule) = stage_booking(&mut txn, &slot, span, &draft);
            if accept && let Some(cid) = candidate.id {
                txn.push(Event::CandidateStatusChanged {
                    candidate_id: cid,
                    status: CandidateStatus::Scheduled,
                });
            }
            self.commit(txn).await?;

            metrics::counter!(BOOKINGS_TOTAL, "kind" => "single").increment(1);
            info!(
                "booked [{}, {}) on slot {} for {} (request {})",
                span.start, span.end, input.slot_id, request.candidate_name, request.id
            );
            let kind = if schedule.is_some() {
                NotificationKind::Scheduled
            } else {
                NotificationKind::Requested
            };
            self.notify(kind, request.interviewer_id, self.request_payload(&request))
                .await;
            Ok(request)
        })
        .await
    }

    /// The assigned interviewer accepts or declines a PENDING request.
    ///
    /// Accept creates and links the schedule. Decline releases the held slot
    /// back to AVAILABLE and rejects the request.
    pub async fn respond(
        &self,
        caller: Ulid,
        request_id: Ulid,
        decision: Decision,
        notes: Option<String>,
    ) -> Result<BookingRequest, EngineError> {
        observe("respond", async {
            check_text(notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;
            let interviewer_id = self
                .requests
                .get(&request_id)
                .map(|r| r.interviewer_id)
                .ok_or(EngineError::NotFound(Entity::Request, request_id))?;
            if caller != interviewer_id {
                return Err(EngineError::Unauthorized(caller));
            }

            let mut txn = self.begin([interviewer_id]).await?;
            let request = self.request_snapshot(&request_id)?;
            if request.status != RequestStatus::Pending {
                return Err(EngineError::Conflict(request_id, "request is not pending"));
            }
            let now = now_ms();

            match decision {
                Decision::Accept => {
                    let slot_id = request
                        .slot_id
                        .ok_or(EngineError::Conflict(request_id, "request holds no slot"))?;
                    if let Some(cid) = request.candidate_id {
                        self.lock_candidate(&mut txn, cid).await;
                    }
                    let schedule = Schedule {
                        id: Ulid::new(),
                        request_id,
                        interviewer_id,
                        span: request.span,
                        status: ScheduleStatus::Scheduled,
                        created_at: now,
                    };
                    txn.push(Event::RequestResponded {
                        id: request_id,
                        status: RequestStatus::Accepted,
                        response_notes: notes,
                        at: now,
                    });
                    let schedule_id = schedule.id;
                    txn.push(Event::ScheduleCreated { schedule });
                    txn.push(Event::ScheduleLinked {
                        slot_id,
                        interviewer_id,
                        schedule_id,
                    });
                    if let Some(cid) = request.candidate_id {
                        txn.push(Event::CandidateStatusChanged {
                            candidate_id: cid,
                            status: CandidateStatus::Scheduled,
                        });
                    }
                }
                Decision::Decline => {
                    if let Some(slot_id) = request.slot_id
                        && let Ok(slot) = txn.slot(&interviewer_id, &slot_id)
                        && matches!(slot.state, SlotState::Booked { .. })
                    {
                        txn.push(Event::SlotReleased {
                            id: slot_id,
                            interviewer_id,
                        });
                    }
                    txn.push(Event::RequestResponded {
                        id: request_id,
                        status: RequestStatus::Rejected,
                        response_notes: notes,
                        at: now,
                    });
                }
            }
            self.commit(txn).await?;

            let updated = self.request_snapshot(&request_id)?;
            info!("interviewer {caller} answered request {request_id}: {:?}", updated.status);
            self.notify(
                NotificationKind::Responded,
                updated.requested_by,
                self.request_payload(&updated),
            )
            .await;
            Ok(updated)
        })
        .await
    }

    /// The assigned interviewer marks an interview as held.
    pub async fn complete_interview(&self, caller: Ulid, request_id: Ulid) -> Result<Schedule, EngineError> {
        observe("complete_interview", async {
            let interviewer_id = self
                .requests
                .get(&request_id)
                .map(|r| r.interviewer_id)
                .ok_or(EngineError::NotFound(Entity::Request, request_id))?;
            if caller != interviewer_id {
                return Err(EngineError::Unauthorized(caller));
            }

            let mut txn = self.begin([interviewer_id]).await?;
            let schedule = self
                .schedule_for_request(&request_id)
                .ok_or(EngineError::NotFound(Entity::Schedule, request_id))?;
            if schedule.status != ScheduleStatus::Scheduled {
                return Err(EngineError::Conflict(schedule.id, "interview is not scheduled"));
            }
            txn.push(Event::ScheduleStatusChanged {
                id: schedule.id,
                status: ScheduleStatus::Completed,
            });
            self.commit(txn).await?;

            self.schedules
                .get(&schedule.id)
                .map(|s| s.value().clone())
                .ok_or(EngineError::NotFound(Entity::Schedule, schedule.id))
        })
        .await
    }

    pub(super) fn request_snapshot(&self, id: &Ulid) -> Result<BookingRequest, EngineError> {
        self.requests
            .get(id)
            .map(|r| r.value().clone())
            .ok_or(EngineError::NotFound(Entity::Request, *id))
    }
}
