//! Property tests: node readiness is a pure function of project status,
//! start mode and predecessor totals.

use pipeline_engine::readiness::evaluate;
use pipeline_types::*;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

/// Totals for one predecessor node, including empty ones.
fn arb_totals() -> impl Strategy<Value = NodeTotals> {
    (0u64..6)
        .prop_flat_map(|total| (Just(total), 0..=total))
        .prop_map(|(total, completed)| NodeTotals::new(total, completed))
}

fn arb_started() -> impl Strategy<Value = ProjectStatus> {
    prop_oneof![Just(ProjectStatus::Ongoing), Just(ProjectStatus::Completed)]
}

fn arb_mode() -> impl Strategy<Value = StartMode> {
    prop_oneof![
        Just(StartMode::AllPredecessorsComplete),
        Just(StartMode::AnyPredecessorComplete),
    ]
}

fn join_node(mode: StartMode, predecessors: usize) -> FlowNode {
    (0..predecessors)
        .fold(FlowNode::new("n-join", "join"), |node, i| node.after(format!("u{i}")))
        .with_start_mode(mode)
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    /// Nothing starts before the project does.
    #[test]
    fn ready_project_blocks_every_node(
        mode in arb_mode(),
        totals in prop::collection::vec(arb_totals(), 0..5),
    ) {
        let node = join_node(mode, totals.len());
        prop_assert_eq!(
            evaluate(ProjectStatus::Ready, &node, &totals),
            ExecutableStatus::Blocked
        );
    }

    /// Roots start as soon as the project does.
    #[test]
    fn roots_are_executable_once_started(status in arb_started(), mode in arb_mode()) {
        let node = FlowNode::new("n-root", "root").with_start_mode(mode);
        prop_assert_eq!(evaluate(status, &node, &[]), ExecutableStatus::Executable);
    }

    /// All-mode joins start exactly when every predecessor is populated and done.
    #[test]
    fn all_mode_requires_every_predecessor(
        status in arb_started(),
        totals in prop::collection::vec(arb_totals(), 1..5),
    ) {
        let node = join_node(StartMode::AllPredecessorsComplete, totals.len());
        let expected = if totals.iter().all(|t| t.total > 0 && t.completed == t.total) {
            ExecutableStatus::Executable
        } else {
            ExecutableStatus::Blocked
        };
        prop_assert_eq!(evaluate(status, &node, &totals), expected);
    }

    /// Any-mode joins start when at least one predecessor is populated and done.
    #[test]
    fn any_mode_requires_one_predecessor(
        status in arb_started(),
        totals in prop::collection::vec(arb_totals(), 1..5),
    ) {
        let node = join_node(StartMode::AnyPredecessorComplete, totals.len());
        let expected = if totals.iter().any(|t| t.total > 0 && t.completed == t.total) {
            ExecutableStatus::Executable
        } else {
            ExecutableStatus::Blocked
        };
        prop_assert_eq!(evaluate(status, &node, &totals), expected);
    }

    /// An empty predecessor never satisfies a join on its own.
    #[test]
    fn empty_predecessors_never_satisfy(
        status in arb_started(),
        mode in arb_mode(),
        count in 1usize..5,
    ) {
        let node = join_node(mode, count);
        let totals = vec![NodeTotals::default(); count];
        prop_assert_eq!(evaluate(status, &node, &totals), ExecutableStatus::Blocked);
    }

    /// Completing one more predecessor never blocks a node that was executable.
    #[test]
    fn completion_is_monotonic(
        status in arb_started(),
        mode in arb_mode(),
        totals in prop::collection::vec(arb_totals(), 1..5),
        pick in any::<prop::sample::Index>(),
    ) {
        let node = join_node(mode, totals.len());
        let before = evaluate(status, &node, &totals);

        let mut advanced = totals.clone();
        let i = pick.index(advanced.len());
        if advanced[i].total == 0 {
            advanced[i] = NodeTotals::new(1, 1);
        } else {
            advanced[i].completed = advanced[i].total;
        }
        let after = evaluate(status, &node, &advanced);

        if before == ExecutableStatus::Executable {
            prop_assert_eq!(after, ExecutableStatus::Executable);
        }
    }
}
