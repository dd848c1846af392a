use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotificationKind;
use crate::observability::{observe, CANCELLATIONS_TOTAL};

use super::conflict::now_ms;
use super::{Engine, EngineError, Entity, Txn};

impl Engine {
    /// Cancel a single booking or a whole panel on behalf of the original requester.
    pub async fn cancel(&self, caller: Ulid, target: CancelTarget) -> Result<(), EngineError> {
        match target {
            CancelTarget::Request(id) => self.cancel_request(caller, id).await.map(|_| ()),
            CancelTarget::Panel(id) => self.cancel_panel(caller, id).await.map(|_| ()),
        }
    }

    /// Reverse one booking: its slot becomes AVAILABLE again with no schedule
    /// link, its schedule and request are cancelled, and the candidate drops
    /// back to SCREENING once nothing else is accepted for them.
    pub async fn cancel_request(&self, caller: Ulid, request_id: Ulid) -> Result<BookingRequest, EngineError> {
        observe("cancel_request", async {
            let interviewer_id = self
                .requests
                .get(&request_id)
                .map(|r| r.interviewer_id)
                .ok_or(EngineError::NotFound(Entity::Request, request_id))?;

            let mut txn = self.begin([interviewer_id]).await?;
            let request = self.request_snapshot(&request_id)?;
            if caller != request.requested_by {
                return Err(EngineError::Unauthorized(caller));
            }
            match request.status {
                RequestStatus::Cancelled => return Err(EngineError::AlreadyCancelled(request_id)),
                RequestStatus::Rejected => return Err(EngineError::Conflict(request_id, "request was rejected")),
                RequestStatus::Pending | RequestStatus::Accepted => {}
            }
            if let Some(cid) = request.candidate_id {
                self.lock_candidate(&mut txn, cid).await;
            }

            self.stage_cancellation(&mut txn, &request, now_ms())?;
            self.stage_candidate_reset(&mut txn, request.candidate_id, &[request_id]);
            self.commit(txn).await?;

            metrics::counter!(CANCELLATIONS_TOTAL).increment(1);
            info!("request {request_id} cancelled by {caller}");
            let cancelled = self.request_snapshot(&request_id)?;
            self.notify(
                NotificationKind::Cancelled,
                cancelled.interviewer_id,
                self.request_payload(&cancelled),
            )
            .await;
            Ok(cancelled)
        })
        .await
    }

    /// Cancel every child booking of a panel that is still live, in one transaction.
    pub async fn cancel_panel(&self, caller: Ulid, panel_id: Ulid) -> Result<Vec<BookingRequest>, EngineError> {
        observe("cancel_panel", async {
            let panel = self
                .panels
                .get(&panel_id)
                .map(|p| p.value().clone())
                .ok_or(EngineError::NotFound(Entity::Panel, panel_id))?;
            if caller != panel.requested_by {
                return Err(EngineError::Unauthorized(caller));
            }

            let interviewer_ids: Vec<Ulid> = panel
                .request_ids
                .iter()
                .filter_map(|id| self.requests.get(id).map(|r| r.interviewer_id))
                .collect();
            let mut txn = self.begin(interviewer_ids).await?;

            let live: Vec<BookingRequest> = panel
                .request_ids
                .iter()
                .filter_map(|id| self.requests.get(id).map(|r| r.value().clone()))
                .filter(|r| !r.status.is_terminal())
                .collect();
            if live.is_empty() {
                return Err(EngineError::AlreadyCancelled(panel_id));
            }
            if let Some(cid) = panel.candidate_id {
                self.lock_candidate(&mut txn, cid).await;
            }

            let now = now_ms();
            for request in &live {
                self.stage_cancellation(&mut txn, request, now)?;
            }
            let cancelled_ids: Vec<Ulid> = live.iter().map(|r| r.id).collect();
            self.stage_candidate_reset(&mut txn, panel.candidate_id, &cancelled_ids);
            self.commit(txn).await?;

            metrics::counter!(CANCELLATIONS_TOTAL).increment(cancelled_ids.len() as u64);
            info!("panel {panel_id} cancelled by {caller} ({} booking(s))", cancelled_ids.len());
            let mut cancelled = Vec::with_capacity(cancelled_ids.len());
            for id in &cancelled_ids {
                let request = self.request_snapshot(id)?;
                self.notify(
                    NotificationKind::Cancelled,
                    request.interviewer_id,
                    self.request_payload(&request),
                )
                .await;
                cancelled.push(request);
            }
            Ok(cancelled)
        })
        .await
    }

    /// Stage the restoration of one live request, in order: drop the slot's
    /// schedule link, release the slot, cancel the schedule, cancel the request.
    fn stage_cancellation(&self, txn: &mut Txn, request: &BookingRequest, now: Ms) -> Result<(), EngineError> {
        let schedule = self.schedule_for_request(&request.id);
        if let Some(s) = &schedule
            && s.status == ScheduleStatus::Completed
        {
            return Err(EngineError::Conflict(request.id, "interview already completed"));
        }

        if let Some(slot_id) = request.slot_id
            && let Ok(slot) = txn.slot(&request.interviewer_id, &slot_id)
        {
            if slot.schedule_id().is_some() {
                txn.push(Event::ScheduleUnlinked {
                    slot_id,
                    interviewer_id: request.interviewer_id,
                });
            }
            if let SlotState::Booked { .. } = slot.state {
                txn.push(Event::SlotReleased {
                    id: slot_id,
                    interviewer_id: request.interviewer_id,
                });
            }
        }
        if let Some(s) = schedule
            && s.status == ScheduleStatus::Scheduled
        {
            txn.push(Event::ScheduleStatusChanged {
                id: s.id,
                status: ScheduleStatus::Cancelled,
            });
        }
        txn.push(Event::RequestCancelled { id: request.id, at: now });
        Ok(())
    }

    /// Move a SCHEDULED candidate back to SCREENING when no ACCEPTED request
    /// remains besides the ones being cancelled. Caller holds the candidate lock.
    fn stage_candidate_reset(&self, txn: &mut Txn, candidate_id: Option<Ulid>, cancelling: &[Ulid]) {
        let Some(cid) = candidate_id else {
            return;
        };
        if txn.candidate_status() != Some(CandidateStatus::Scheduled) {
            return;
        }
        let remaining = self
            .requests
            .iter()
            .filter(|r| {
                r.candidate_id == Some(cid)
                    && r.status == RequestStatus::Accepted
                    && !cancelling.contains(&r.id)
            })
            .count();
        if remaining == 0 {
            txn.push(Event::CandidateStatusChanged {
                candidate_id: cid,
                status: CandidateStatus::Screening,
            });
        }
    }
}
