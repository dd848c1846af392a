use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::observe;

use super::availability;
use super::conflict::{check_no_overlap, check_text, now_ms, validate_span, validate_window};
use super::{Engine, EngineError, Entity};

impl Engine {
    /// Publish one availability slot for an interviewer.
    pub async fn create_slot(
        &self,
        interviewer_id: Ulid,
        span: Span,
        description: Option<String>,
    ) -> Result<Slot, EngineError> {
        let mut created = self
            .create_slots(interviewer_id, vec![(span, description)])
            .await?;
        created
            .pop()
            .ok_or(EngineError::Validation("no slot created"))
    }

    /// Publish several slots at once. All-or-nothing: one conflict (with an
    /// existing slot or another slot in the batch) rejects the whole batch.
    pub async fn create_slots(
        &self,
        interviewer_id: Ulid,
        slots: Vec<(Span, Option<String>)>,
    ) -> Result<Vec<Slot>, EngineError> {
        observe("create_slots", async {
            if slots.is_empty() {
                return Ok(Vec::new());
            }
            if slots.len() > MAX_BULK_SLOTS {
                return Err(EngineError::LimitExceeded("too many slots in one batch"));
            }
            for (span, description) in &slots {
                validate_span(span)?;
                check_text(description.as_deref(), MAX_DESCRIPTION_LEN, "description too long")?;
            }
            if self.directory.interviewer(&interviewer_id).is_none() {
                return Err(EngineError::NotFound(Entity::Interviewer, interviewer_id));
            }

            let now = now_ms();
            let mut new_slots: Vec<Slot> = slots
                .into_iter()
                .map(|(span, description)| Slot {
                    id: Ulid::new(),
                    interviewer_id,
                    span,
                    state: SlotState::Available,
                    description,
                    created_at: now,
                })
                .collect();
            new_slots.sort_by_key(|s| s.span.start);
            for pair in new_slots.windows(2) {
                if pair[0].span.overlaps(&pair[1].span) {
                    return Err(EngineError::Conflict(pair[1].id, "overlaps another slot in the batch"));
                }
            }

            self.ensure_interviewer(interviewer_id);
            let mut txn = self.begin([interviewer_id]).await?;
            let rs = txn
                .interviewer(&interviewer_id)
                .ok_or(EngineError::NotFound(Entity::Interviewer, interviewer_id))?;
            if rs.active_count() + new_slots.len() > MAX_SLOTS_PER_INTERVIEWER {
                return Err(EngineError::LimitExceeded("too many slots for interviewer"));
            }
            for slot in &new_slots {
                check_no_overlap(rs, &slot.span)?;
            }

            for slot in &new_slots {
                txn.push(Event::SlotCreated { slot: slot.clone() });
            }
            self.commit(txn).await?;
            info!("interviewer {interviewer_id} published {} slot(s)", new_slots.len());
            Ok(new_slots)
        })
        .await
    }

    /// The owning interviewer takes back a slot nobody has booked.
    pub async fn withdraw_slot(&self, caller: Ulid, slot_id: Ulid) -> Result<(), EngineError> {
        observe("withdraw_slot", async {
            let owner = self.slot_owner_of(&slot_id)?;
            if caller != owner {
                return Err(EngineError::Unauthorized(caller));
            }
            let mut txn = self.begin([owner]).await?;
            let slot = txn.slot(&owner, &slot_id)?;
            match slot.state {
                SlotState::Available => {}
                SlotState::Booked { .. } => return Err(EngineError::Conflict(slot_id, "slot is booked")),
                SlotState::Superseded => return Err(EngineError::Conflict(slot_id, "slot was superseded")),
            }
            txn.push(Event::SlotWithdrawn {
                id: slot_id,
                interviewer_id: owner,
            });
            self.commit(txn).await
        })
        .await
    }

    pub async fn get_slot(&self, id: &Ulid) -> Option<Slot> {
        let owner = self.slot_owner_of(id).ok()?;
        let rs = self.get_interviewer(&owner)?;
        let guard = rs.read().await;
        guard.slot(id).cloned()
    }

    /// Active (non-superseded) slots of one interviewer overlapping `range`, ordered by start.
    pub async fn list_slots(&self, interviewer_id: Ulid, range: Span) -> Result<Vec<Slot>, EngineError> {
        validate_window(&range)?;
        let Some(rs) = self.get_interviewer(&interviewer_id) else {
            return Ok(Vec::new());
        };
        let guard = rs.read().await;
        Ok(guard.active_overlapping(&range).cloned().collect())
    }

    /// Upcoming AVAILABLE and BOOKED slots of one interviewer.
    pub async fn slot_counts(&self, interviewer_id: Ulid, now: Ms) -> SlotCounts {
        let mut counts = SlotCounts::default();
        let Some(rs) = self.get_interviewer(&interviewer_id) else {
            return counts;
        };
        let guard = rs.read().await;
        for slot in guard.slots.iter().filter(|s| s.span.start >= now) {
            match slot.state {
                SlotState::Available => counts.available += 1,
                SlotState::Booked { .. } => counts.booked += 1,
                SlotState::Superseded => {}
            }
        }
        counts
    }

    /// Merged AVAILABLE intervals of one interviewer inside `range`.
    pub async fn available_coverage(&self, interviewer_id: Ulid, range: Span) -> Result<Vec<Span>, EngineError> {
        validate_window(&range)?;
        let Some(rs) = self.get_interviewer(&interviewer_id) else {
            return Ok(Vec::new());
        };
        let guard = rs.read().await;
        Ok(availability::available_coverage(&guard, &range))
    }
}
