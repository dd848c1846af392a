use std::collections::HashSet;

use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::NotificationKind;
use crate::observability::{observe, BOOKINGS_TOTAL};

use super::booking::{stage_booking, BookingDraft, PANEL_LABEL};
use super::conflict::{check_bookable, check_text, now_ms, validate_span};
use super::{Engine, EngineError};

impl Engine {
    /// Book one window across several interviewers for one candidate.
    ///
    /// Every slot is checked before anything is staged, and the panel with all
    /// of its child bookings commits as one WAL record: either every
    /// interviewer is booked or none is. Panel bookings are always accepted.
    pub async fn book_panel(&self, caller: Ulid, input: PanelInput) -> Result<Panel, EngineError> {
        observe("book_panel", async {
            if input.slot_ids.is_empty() {
                return Err(EngineError::Validation("panel needs at least one slot"));
            }
            if input.slot_ids.len() > MAX_PANEL_SIZE {
                return Err(EngineError::LimitExceeded("panel too large"));
            }
            let mut seen = HashSet::with_capacity(input.slot_ids.len());
            if !input.slot_ids.iter().all(|id| seen.insert(*id)) {
                return Err(EngineError::Validation("duplicate slot in panel"));
            }
            validate_span(&input.span)?;
            check_text(input.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;
            let candidate = self.resolve_candidate(&input.candidate)?;

            let mut owners = Vec::with_capacity(input.slot_ids.len());
            for slot_id in &input.slot_ids {
                owners.push(self.slot_owner_of(slot_id)?);
            }
            let mut distinct = HashSet::with_capacity(owners.len());
            if !owners.iter().all(|id| distinct.insert(*id)) {
                return Err(EngineError::Validation("panel needs one slot per interviewer"));
            }

            let mut txn = self.begin(owners.iter().copied()).await?;

            // Validate every slot before staging anything.
            let mut slots = Vec::with_capacity(input.slot_ids.len());
            for (slot_id, owner) in input.slot_ids.iter().zip(&owners) {
                let slot = txn.slot(owner, slot_id)?;
                check_bookable(&slot, &input.span)?;
                slots.push(slot);
            }

            if let Some(cid) = candidate.id {
                self.lock_candidate(&mut txn, cid).await;
            }

            let now = now_ms();
            let request_ids: Vec<Ulid> = slots.iter().map(|_| Ulid::new()).collect();
            let panel = Panel {
                id: Ulid::new(),
                candidate_id: candidate.id,
                candidate_name: candidate.name.clone(),
                span: input.span,
                requested_by: caller,
                request_ids: request_ids.clone(),
                urgent: input.urgent,
                notes: input.notes.clone(),
                created_at: now,
            };
            txn.push(Event::PanelCreated {
                panel: panel.clone(),
            });

            let mut requests = Vec::with_capacity(slots.len());
            for (slot, request_id) in slots.iter().zip(request_ids) {
                let draft = BookingDraft {
                    request_id,
                    candidate: &candidate,
                    requested_by: caller,
                    panel_id: Some(panel.id),
                    accept: true,
                    urgent: input.urgent,
                    notes: input.notes.clone(),
                    label: format!("{PANEL_LABEL}{}", candidate.name),
                    now,
                };
                let (request, _) = stage_booking(&mut txn, slot, input.span, &draft);
                requests.push(request);
            }
            if let Some(cid) = candidate.id {
                txn.push(Event::CandidateStatusChanged {
                    candidate_id: cid,
                    status: CandidateStatus::Scheduled,
                });
            }
            self.commit(txn).await?;

            metrics::counter!(BOOKINGS_TOTAL, "kind" => "panel").increment(requests.len() as u64);
            info!(
                "panel {} booked [{}, {}) with {} interviewer(s) for {}",
                panel.id,
                panel.span.start,
                panel.span.end,
                requests.len(),
                panel.candidate_name
            );
            for request in &requests {
                self.notify(
                    NotificationKind::Scheduled,
                    request.interviewer_id,
                    self.request_payload(request),
                )
                .await;
            }
            Ok(panel)
        })
        .await
    }
}
