use std::collections::HashSet;

use tracing::{debug, error};
use ulid::Ulid;

use crate::directory::InterviewerProfile;
use crate::model::*;
use crate::observability::{observe, SEARCH_SKIPPED_TOTAL};

use super::booking::{INTERVIEW_LABEL, PANEL_LABEL};
use super::conflict::{now_ms, validate_window};
use super::{Engine, EngineError, Entity};

/// Minimum seniority, scoped to one department. Inert unless it names a
/// department and at least one of the two minimums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeniorityBound {
    /// The bound only applies when a department is named.
    pub department_id: Option<Ulid>,
    pub min_tier_order: Option<u32>,
    pub min_level_order: Option<u32>,
}

impl SeniorityBound {
    /// "At least as senior": a lower tier order wins outright; on the same
    /// tier the level order decides. Lower numbers are more senior.
    /// A tier minimum needs a tier order; a level-only bound ignores the tier.
    pub fn admits(&self, tier_order: Option<u32>, level_order: Option<u32>) -> bool {
        match (self.min_tier_order, self.min_level_order) {
            (Some(min_tier), min_level) => tier_order.is_some_and(|tier_order| {
                tier_order < min_tier
                    || (tier_order == min_tier
                        && match min_level {
                            None => true,
                            Some(min_level) => level_order.is_some_and(|l| l <= min_level),
                        })
            }),
            (None, Some(min_level)) => level_order.is_some_and(|l| l <= min_level),
            (None, None) => true,
        }
    }

    fn is_active(&self) -> bool {
        self.department_id.is_some() && (self.min_tier_order.is_some() || self.min_level_order.is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityFilter {
    /// Slots fully inside this window. Without it, slots starting from now on.
    pub range: Option<Span>,
    pub department_ids: Vec<Ulid>,
    /// Matches interviewers with at least one of these as an active technology.
    pub technology_ids: Vec<Ulid>,
    pub min_years_experience: Option<u32>,
    pub seniority: Option<SeniorityBound>,
    /// Also list BOOKED slots, unfiltered, for calendar views.
    pub include_booked: bool,
}

struct SlotHit {
    slot: Slot,
    profile: Option<InterviewerProfile>,
}

impl Engine {
    pub async fn search_availability(&self, filter: &AvailabilityFilter) -> Result<Vec<AvailabilityRecord>, EngineError> {
        self.search_availability_at(filter, now_ms()).await
    }

    /// Availability search with an explicit "now" for the open-ended case.
    pub async fn search_availability_at(
        &self,
        filter: &AvailabilityFilter,
        now: Ms,
    ) -> Result<Vec<AvailabilityRecord>, EngineError> {
        observe("search_availability", async {
            if let Some(range) = &filter.range {
                validate_window(range)?;
            }
            for id in &filter.department_ids {
                if self.directory.department(id).is_none() {
                    return Err(EngineError::NotFound(Entity::Department, *id));
                }
            }
            for id in &filter.technology_ids {
                if self.directory.technology(id).is_none() {
                    return Err(EngineError::NotFound(Entity::Technology, *id));
                }
            }

            let (available, booked) = self.base_set(filter, now).await;
            let total = available.len();
            let available = self.filter_available(filter, available);
            debug!(
                "availability search kept {} of {total} available slot(s), {} booked",
                available.len(),
                booked.len()
            );

            let mut records = Vec::with_capacity(available.len() + booked.len());
            for c in available.iter().chain(booked.iter()) {
                match self.project(&c.slot, c.profile.as_ref()) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        error!("skipping slot {} in availability listing: {e}", c.slot.id);
                        metrics::counter!(SEARCH_SKIPPED_TOTAL).increment(1);
                    }
                }
            }
            records.sort_by(|a, b| a.start.cmp(&b.start).then(a.interviewer_id.cmp(&b.interviewer_id)));
            Ok(records)
        })
        .await
    }

    /// AVAILABLE slots in the window and, if asked, the BOOKED ones too.
    async fn base_set(&self, filter: &AvailabilityFilter, now: Ms) -> (Vec<SlotHit>, Vec<SlotHit>) {
        let states: Vec<_> = self.interviewers.iter().map(|e| e.value().clone()).collect();
        let mut available = Vec::new();
        let mut booked = Vec::new();

        for rs in states {
            let guard = rs.read().await;
            let in_window = |slot: &&Slot| match &filter.range {
                Some(range) => range.contains_span(&slot.span),
                None => slot.span.start >= now,
            };
            let mut profile = None;
            for slot in guard.slots.iter().filter(in_window) {
                let bucket = match slot.state {
                    SlotState::Available => &mut available,
                    SlotState::Booked { .. } if filter.include_booked => &mut booked,
                    _ => continue,
                };
                let p = profile.get_or_insert_with(|| self.directory.interviewer(&guard.id));
                bucket.push(SlotHit {
                    slot: slot.clone(),
                    profile: p.clone(),
                });
            }
        }
        (available, booked)
    }

    /// Department → technology → experience → seniority, each narrowing the last.
    fn filter_available(&self, filter: &AvailabilityFilter, mut slots: Vec<SlotHit>) -> Vec<SlotHit> {
        if !filter.department_ids.is_empty() {
            slots.retain(|c| {
                c.profile
                    .as_ref()
                    .and_then(|p| p.department_id)
                    .is_some_and(|d| filter.department_ids.contains(&d))
            });
            debug!("after department filter: {}", slots.len());
        }

        if !filter.technology_ids.is_empty() {
            let wanted: HashSet<Ulid> = filter.technology_ids.iter().copied().collect();
            slots.retain(|c| {
                c.profile
                    .as_ref()
                    .is_some_and(|p| p.active_technology_ids().any(|t| wanted.contains(&t)))
            });
            debug!("after technology filter: {}", slots.len());
        }

        if let Some(min_years) = filter.min_years_experience {
            slots.retain(|c| {
                c.profile
                    .as_ref()
                    .is_some_and(|p| p.years_of_experience.unwrap_or(0) >= min_years)
            });
            debug!("after experience filter: {}", slots.len());
        }

        if let Some(bound) = filter.seniority.as_ref().filter(|b| b.is_active())
            && let Some(department_id) = bound.department_id
        {
            slots.retain(|c| {
                c.profile
                    .as_ref()
                    .is_some_and(|p| p.department_id == Some(department_id) && self.meets_seniority(p, bound))
            });
            debug!("after seniority filter: {}", slots.len());
        }

        slots
    }

    fn meets_seniority(&self, profile: &InterviewerProfile, bound: &SeniorityBound) -> bool {
        let Some(designation) = profile.designation_id.and_then(|id| self.directory.designation(&id)) else {
            return false;
        };
        // The tier path compares within a tier, so it needs a level order too.
        if bound.min_tier_order.is_some() && designation.level_order.is_none() {
            return false;
        }
        let tier_order = designation
            .tier_id
            .and_then(|id| self.directory.tier(&id))
            .map(|t| t.order);
        bound.admits(tier_order, designation.level_order)
    }

    fn project(&self, slot: &Slot, profile: Option<&InterviewerProfile>) -> Result<AvailabilityRecord, EngineError> {
        let profile = profile.ok_or(EngineError::NotFound(Entity::Interviewer, slot.interviewer_id))?;
        let department = match profile.department_id {
            Some(id) => Some(
                self.directory
                    .department(&id)
                    .ok_or(EngineError::NotFound(Entity::Department, id))?
                    .name,
            ),
            None => None,
        };
        let designation = match profile.designation_id {
            Some(id) => Some(
                self.directory
                    .designation(&id)
                    .ok_or(EngineError::NotFound(Entity::Designation, id))?
                    .name,
            ),
            None => None,
        };
        let technologies = profile
            .active_technology_ids()
            .filter_map(|id| self.directory.technology(&id))
            .map(|t| t.name)
            .collect();

        let candidate_name = match slot.state {
            SlotState::Booked { schedule_id } => self
                .candidate_via_schedule(schedule_id)
                .or_else(|| slot.description.as_deref().and_then(candidate_from_label)),
            _ => None,
        };

        Ok(AvailabilityRecord {
            slot_id: slot.id,
            interviewer_id: slot.interviewer_id,
            interviewer_name: profile.full_name.clone(),
            interviewer_email: profile.email.clone(),
            department,
            designation,
            technologies,
            years_of_experience: profile.years_of_experience,
            start: slot.span.start,
            end: slot.span.end,
            state: slot.state.label(),
            schedule_id: slot.schedule_id(),
            candidate_name,
        })
    }

    /// Authoritative candidate name: slot → schedule → request.
    fn candidate_via_schedule(&self, schedule_id: Option<Ulid>) -> Option<String> {
        let request_id = self.schedules.get(&schedule_id?)?.request_id;
        self.requests.get(&request_id).map(|r| r.candidate_name.clone())
    }
}

/// Display-only fallback: recover the name from a booked slot's label.
fn candidate_from_label(description: &str) -> Option<String> {
    description
        .strip_prefix(PANEL_LABEL)
        .or_else(|| description.strip_prefix(INTERVIEW_LABEL))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(min_tier: Option<u32>, min_level: Option<u32>) -> SeniorityBound {
        SeniorityBound {
            department_id: Some(Ulid::new()),
            min_tier_order: min_tier,
            min_level_order: min_level,
        }
    }

    #[test]
    fn more_senior_tier_wins_regardless_of_level() {
        assert!(bound(Some(2), Some(1)).admits(Some(1), Some(5)));
    }

    #[test]
    fn same_tier_compares_level() {
        assert!(bound(Some(2), Some(5)).admits(Some(2), Some(5)));
        assert!(!bound(Some(2), Some(4)).admits(Some(2), Some(5)));
    }

    #[test]
    fn less_senior_tier_fails() {
        assert!(!bound(Some(2), Some(9)).admits(Some(3), Some(1)));
    }

    #[test]
    fn tier_bound_needs_a_tier() {
        assert!(!bound(Some(2), None).admits(None, Some(1)));
    }

    #[test]
    fn missing_min_level_is_unbounded_within_tier() {
        assert!(bound(Some(2), None).admits(Some(2), Some(99)));
    }

    #[test]
    fn level_only_bound() {
        assert!(bound(None, Some(3)).admits(Some(7), Some(3)));
        assert!(bound(None, Some(3)).admits(None, Some(2)));
        assert!(!bound(None, Some(3)).admits(Some(1), Some(4)));
        assert!(!bound(None, Some(3)).admits(Some(1), None));
    }

    #[test]
    fn bound_without_minimums_is_inert() {
        assert!(!bound(None, None).is_active());
        assert!(bound(None, Some(1)).is_active());
        let unscoped = SeniorityBound {
            department_id: None,
            ..bound(Some(1), Some(1))
        };
        assert!(!unscoped.is_active());
    }

    #[test]
    fn label_fallback() {
        assert_eq!(candidate_from_label("Interview: Grace Hopper"), Some("Grace Hopper".into()));
        assert_eq!(candidate_from_label("Panel Interview: Alan"), Some("Alan".into()));
        assert_eq!(candidate_from_label("Office hours"), None);
        assert_eq!(candidate_from_label("Interview: "), None);
    }
}
