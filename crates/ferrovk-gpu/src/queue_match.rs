//! Queue family assignment.
//!
//! Assignment is greedy in request order: each request takes the first
//! unclaimed family that has enough queues and shares at least one
//! capability bit with it. This is not an optimal bipartite matching. A
//! later request that only one family could serve can be starved when an
//! earlier, less picky request claimed that family first; callers should list
//! the most constrained roles first.

use crate::requirements::QueueSetup;
use crate::snapshot::QueueFamilySnapshot;

/// Where one queue setup landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueAssignment {
    pub family_index: u32,
    /// Number of queues the family exposes.
    pub queue_count: u32,
}

/// Assign every setup a distinct family, or return `false` if any setup
/// cannot be served. `out` is cleared first and only holds a complete
/// assignment (one entry per setup, in setup order) when this returns `true`.
pub fn match_queue_families(
    setups: &[QueueSetup],
    families: &[QueueFamilySnapshot],
    out: &mut Vec<QueueAssignment>,
) -> bool {
    out.clear();
    let mut claimed = vec![false; families.len()];

    for setup in setups {
        let found = (0u32..).zip(families).find(|(index, family)| {
            !claimed[*index as usize]
                && family.queue_count >= setup.required_count
                && family.capabilities.intersects(setup.capabilities)
        });

        let Some((index, family)) = found else {
            out.clear();
            return false;
        };

        claimed[index as usize] = true;
        out.push(QueueAssignment {
            family_index: index,
            queue_count: family.queue_count,
        });
    }
    true
}

/// Copy a complete assignment into the setups it was computed for.
pub fn commit_assignment(setups: &mut [QueueSetup], assignment: &[QueueAssignment]) {
    assert_eq!(
        setups.len(),
        assignment.len(),
        "queue assignment does not cover every queue setup"
    );
    for (setup, assigned) in setups.iter_mut().zip(assignment) {
        setup.cached_index = Some(assigned.family_index);
        setup.present_count = assigned.queue_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::QueueCapabilities as Q;

    fn family(capabilities: Q, queue_count: u32) -> QueueFamilySnapshot {
        QueueFamilySnapshot {
            capabilities,
            queue_count,
        }
    }

    fn run(setups: &[QueueSetup], families: &[QueueFamilySnapshot]) -> Option<Vec<u32>> {
        let mut out = Vec::new();
        match_queue_families(setups, families, &mut out)
            .then(|| out.iter().map(|a| a.family_index).collect())
    }

    #[test]
    fn intersection_is_enough() {
        let families = [family(Q::GRAPHICS | Q::COMPUTE | Q::TRANSFER, 1)];
        assert_eq!(run(&[QueueSetup::new(Q::TRANSFER, 1)], &families), Some(vec![0]));

        // A request for graphics+present is served by a graphics-only family.
        let families = [family(Q::GRAPHICS, 1)];
        assert_eq!(
            run(&[QueueSetup::new(Q::GRAPHICS | Q::PRESENT, 1)], &families),
            Some(vec![0])
        );
    }

    #[test]
    fn families_are_never_shared() {
        let families = [
            family(Q::GRAPHICS | Q::COMPUTE | Q::TRANSFER, 16),
            family(Q::COMPUTE | Q::TRANSFER, 2),
            family(Q::TRANSFER, 1),
        ];
        let setups = [
            QueueSetup::new(Q::GRAPHICS, 1),
            QueueSetup::new(Q::COMPUTE, 1),
            QueueSetup::new(Q::TRANSFER, 1),
        ];
        assert_eq!(run(&setups, &families), Some(vec![0, 1, 2]));

        let setups = [
            QueueSetup::new(Q::GRAPHICS, 1),
            QueueSetup::new(Q::GRAPHICS, 1),
        ];
        assert_eq!(run(&setups, &families[..1]), None);
    }

    #[test]
    fn queue_count_must_cover_request() {
        let families = [family(Q::COMPUTE, 1), family(Q::COMPUTE, 4)];
        assert_eq!(run(&[QueueSetup::new(Q::COMPUTE, 3)], &families), Some(vec![1]));
        assert_eq!(run(&[QueueSetup::new(Q::COMPUTE, 5)], &families), None);
    }

    #[test]
    fn greedy_order_can_starve_later_requests() {
        // Transfer alone could use family 1, but it asks first and takes
        // family 0, the only graphics-capable family.
        let families = [family(Q::GRAPHICS | Q::TRANSFER, 1), family(Q::TRANSFER, 1)];
        let starving = [
            QueueSetup::new(Q::TRANSFER, 1),
            QueueSetup::new(Q::GRAPHICS, 1),
        ];
        assert_eq!(run(&starving, &families), None);

        let ordered = [
            QueueSetup::new(Q::GRAPHICS, 1),
            QueueSetup::new(Q::TRANSFER, 1),
        ];
        assert_eq!(run(&ordered, &families), Some(vec![0, 1]));
    }

    #[test]
    fn failure_leaves_no_partial_assignment() {
        let families = [family(Q::GRAPHICS, 1)];
        let setups = [
            QueueSetup::new(Q::GRAPHICS, 1),
            QueueSetup::new(Q::COMPUTE, 1),
        ];
        let mut out = vec![QueueAssignment {
            family_index: 7,
            queue_count: 7,
        }];
        assert!(!match_queue_families(&setups, &families, &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn commit_records_index_and_available_count() {
        let families = [family(Q::GRAPHICS, 1), family(Q::TRANSFER, 2)];
        let mut setups = [QueueSetup::new(Q::TRANSFER, 1)];
        let mut out = Vec::new();
        assert!(match_queue_families(&setups, &families, &mut out));
        commit_assignment(&mut setups, &out);
        assert_eq!(setups[0].cached_index, Some(1));
        assert_eq!(setups[0].present_count, 2);
    }

    #[test]
    fn no_requests_always_match() {
        assert_eq!(run(&[], &[]), Some(vec![]));
    }
}
