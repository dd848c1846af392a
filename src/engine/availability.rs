use crate::model::*;

// ── Coverage ──────────────────────────────────────────────────────

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Time inside `query` covered by the interviewer's AVAILABLE slots, as
/// disjoint intervals. Adjacent slots merge, so a booking followed by its
/// cancellation yields the same coverage as before the booking.
pub(crate) fn available_coverage(rs: &InterviewerState, query: &Span) -> Vec<Span> {
    let mut covered: Vec<Span> = rs
        .active_overlapping(query)
        .filter(|s| s.state == SlotState::Available)
        .map(|s| Span::new(s.span.start.max(query.start), s.span.end.min(query.end)))
        .collect();
    covered.sort_by_key(|s| s.start);
    merge_overlapping(&covered)
}

/// Pairs of active slots that overlap each other. Empty in a consistent store.
pub(crate) fn overlapping_pairs(rs: &InterviewerState) -> Vec<(ulid::Ulid, ulid::Ulid)> {
    let active: Vec<&Slot> = rs.slots.iter().filter(|s| s.state.is_active()).collect();
    let mut pairs = Vec::new();
    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            // Sorted by start: once b starts at or after a ends, later ones do too.
            if b.span.start >= a.span.end {
                break;
            }
            pairs.push((a.id, b.id));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const H: Ms = 3_600_000;
    const M: Ms = 60_000;

    fn make_interviewer(slots: Vec<(Ms, Ms, SlotState)>) -> InterviewerState {
        let id = Ulid::new();
        let mut rs = InterviewerState::new(id);
        for (start, end, state) in slots {
            rs.insert_slot(Slot {
                id: Ulid::new(),
                interviewer_id: id,
                span: Span::new(start, end),
                state,
                description: None,
                created_at: 0,
            });
        }
        rs
    }

    #[test]
    fn merge_overlapping_basic() {
        let spans = vec![Span::new(0, 10), Span::new(5, 15), Span::new(20, 30)];
        assert_eq!(merge_overlapping(&spans), vec![Span::new(0, 15), Span::new(20, 30)]);
    }

    #[test]
    fn merge_adjacent() {
        let spans = vec![Span::new(0, 10), Span::new(10, 20)];
        assert_eq!(merge_overlapping(&spans), vec![Span::new(0, 20)]);
    }

    #[test]
    fn merge_empty() {
        assert!(merge_overlapping(&[]).is_empty());
    }

    #[test]
    fn coverage_merges_adjacent_available_slots() {
        let rs = make_interviewer(vec![
            (9 * H, 10 * H, SlotState::Superseded),
            (9 * H, 9 * H + 15 * M, SlotState::Available),
            (9 * H + 15 * M, 9 * H + 45 * M, SlotState::Available),
            (9 * H + 45 * M, 10 * H, SlotState::Available),
        ]);
        assert_eq!(
            available_coverage(&rs, &Span::new(8 * H, 11 * H)),
            vec![Span::new(9 * H, 10 * H)]
        );
    }

    #[test]
    fn coverage_excludes_booked_and_clamps() {
        let rs = make_interviewer(vec![
            (9 * H, 9 * H + 15 * M, SlotState::Available),
            (9 * H + 15 * M, 9 * H + 45 * M, SlotState::Booked { schedule_id: None }),
            (9 * H + 45 * M, 10 * H, SlotState::Available),
        ]);
        assert_eq!(
            available_coverage(&rs, &Span::new(9 * H + 5 * M, 10 * H)),
            vec![
                Span::new(9 * H + 5 * M, 9 * H + 15 * M),
                Span::new(9 * H + 45 * M, 10 * H)
            ]
        );
    }

    #[test]
    fn overlapping_pairs_ignores_superseded_and_touching() {
        let rs = make_interviewer(vec![
            (0, 2 * H, SlotState::Superseded),
            (0, H, SlotState::Available),
            (H, 2 * H, SlotState::Booked { schedule_id: None }),
        ]);
        assert!(overlapping_pairs(&rs).is_empty());

        let broken = make_interviewer(vec![(0, H, SlotState::Available), (30 * M, 2 * H, SlotState::Available)]);
        assert_eq!(overlapping_pairs(&broken).len(), 1);
    }
}
