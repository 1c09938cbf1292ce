//! Property tests for the admission queue.
//!
//! Invariants tested:
//! - `pop_next` drains in priority order, ties resolved by the policy
//! - The overflow victim minimizes (priority, policy order), counting the
//!   incoming task as a candidate

use keywork_core::{Admitted, AdmissionPolicy, AdmissionQueue};
use proptest::prelude::*;

fn policy_strategy() -> impl Strategy<Value = AdmissionPolicy> {
    prop_oneof![Just(AdmissionPolicy::Fifo), Just(AdmissionPolicy::Lifo)]
}

proptest! {
    #[test]
    fn pops_follow_priority_then_policy(
        policy in policy_strategy(),
        priorities in proptest::collection::vec(0u8..5, 1..50),
    ) {
        let mut queue = AdmissionQueue::new(priorities.len(), policy);
        // Shadow model: (key, priority, submission sequence).
        let mut model: Vec<(u16, f64, usize)> = Vec::new();
        for (seq, prio) in priorities.iter().enumerate() {
            let key = seq as u16;
            assert!(matches!(
                queue.push(key, (), *prio as f64),
                Admitted::Enqueued
            ));
            model.push((key, *prio as f64, seq));
        }

        while let Some((key, (), priority)) = queue.pop_next() {
            let best = model
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    a.1.total_cmp(&b.1).then_with(|| match policy {
                        // FIFO prefers the oldest among ties, LIFO the newest.
                        AdmissionPolicy::Fifo => b.2.cmp(&a.2),
                        AdmissionPolicy::Lifo => a.2.cmp(&b.2),
                    })
                })
                .map(|(index, _)| index)
                .expect("model mirrors the queue");
            let expected = model.remove(best);
            prop_assert_eq!(key, expected.0);
            prop_assert_eq!(priority, expected.1);
        }
        prop_assert!(model.is_empty());
    }

    #[test]
    fn overflow_victim_minimizes_priority_and_policy_order(
        policy in policy_strategy(),
        capacity in 1usize..5,
        priorities in proptest::collection::vec(0u8..4, 1..40),
    ) {
        let mut queue = AdmissionQueue::new(capacity, policy);
        let mut model: Vec<(u16, f64, usize)> = Vec::new();

        for (seq, prio) in priorities.iter().enumerate() {
            let key = seq as u16;
            let priority = *prio as f64;
            let admitted = queue.push(key, (), priority);

            if model.len() < capacity {
                prop_assert!(matches!(admitted, Admitted::Enqueued));
                model.push((key, priority, seq));
                continue;
            }

            let min_priority = model
                .iter()
                .map(|entry| entry.1)
                .fold(f64::INFINITY, f64::min);
            let incoming_loses = priority < min_priority
                || (priority == min_priority && policy == AdmissionPolicy::Lifo);

            if incoming_loses {
                match admitted {
                    Admitted::Refused { key: refused, .. } => prop_assert_eq!(refused, key),
                    other => prop_assert!(false, "expected refusal, got {:?}", other),
                }
                continue;
            }

            let victim_index = model
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.1 == min_priority)
                .map(|(index, entry)| (index, entry.2))
                .reduce(|a, b| match policy {
                    AdmissionPolicy::Fifo => if b.1 < a.1 { b } else { a },
                    AdmissionPolicy::Lifo => if b.1 > a.1 { b } else { a },
                })
                .map(|(index, _)| index)
                .expect("a full queue has a minimum bucket");
            let expected_victim = model.remove(victim_index);
            match admitted {
                Admitted::Displaced { key: victim, .. } => {
                    prop_assert_eq!(victim, expected_victim.0)
                }
                other => prop_assert!(false, "expected displacement, got {:?}", other),
            }
            model.push((key, priority, seq));
        }

        prop_assert_eq!(queue.len(), model.len());
    }
}
