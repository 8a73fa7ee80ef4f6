//! Communication-timing summary over normalized steps.
//!
//! Each collective gets an ordinal slot key per step (`broadcast_0`,
//! `all_reduce_3`, ...); the summary is the mean duration per slot across
//! every step of every worker handed in.

use super::normalizer::StepMap;
use super::roles::{MarkerTable, Role};
use std::collections::BTreeMap;

/// Slot key -> mean duration
pub type TimingSummary = BTreeMap<String, f64>;

/// Collect positive slot durations of one worker's steps into `samples`
///
/// **Private** - broadcasts use their interval, all-reduces their `dur`
fn collect_samples(steps: &StepMap, markers: &MarkerTable, samples: &mut BTreeMap<String, Vec<f64>>) {
    for record in steps.values() {
        for (i, broadcast) in record.broadcasts.iter().enumerate() {
            let duration = broadcast.end_time - broadcast.start_time;
            if duration > 0.0 {
                samples
                    .entry(format!("{}_{}", Role::Broadcast, i))
                    .or_default()
                    .push(duration);
            }
        }

        let mut slot = 0;
        for backward in record.backward_nodes() {
            let children = backward.children.as_deref().unwrap_or(&[]);
            for child in children
                .iter()
                .filter(|c| markers.matches(Role::AllReduce, &c.name))
            {
                if child.dur > 0.0 {
                    samples
                        .entry(format!("{}_{}", Role::AllReduce, slot))
                        .or_default()
                        .push(child.dur);
                }
                slot += 1;
            }
        }
    }
}

/// Mean duration per communication slot
///
/// **Public** - main entry point for the summary
///
/// # Arguments
/// * `workers` - normalized step maps, one per worker
/// * `markers` - role marker table (all-reduce naming)
///
/// # Returns
/// Slot key -> mean rounded to 4 decimals; slots without samples are absent
pub fn communication_timing<'a, I>(workers: I, markers: &MarkerTable) -> TimingSummary
where
    I: IntoIterator<Item = &'a StepMap>,
{
    let mut samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for steps in workers {
        collect_samples(steps, markers, &mut samples);
    }

    samples
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(key, values)| {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            (key, round4(mean))
        })
        .collect()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::normalizer::TrimmedNode;
    use crate::aggregator::step::{Category, RoleNodes, StepRecord};

    fn comm(name: &str, start: f64, end: f64) -> TrimmedNode {
        TrimmedNode {
            name: name.to_string(),
            start_time: start,
            end_time: end,
            dur: end - start,
            category: Category::Communication,
            children: None,
        }
    }

    fn step(broadcasts: Vec<TrimmedNode>, all_reduces: Vec<TrimmedNode>) -> StepRecord<TrimmedNode> {
        let mut backward = comm("layer.backward", 0.0, 100.0);
        backward.category = Category::Computation;
        backward.children = Some(all_reduces);
        StepRecord {
            broadcasts,
            backward: Some(RoleNodes::Many(vec![backward])),
            ..Default::default()
        }
    }

    #[test]
    fn test_means_per_slot() {
        let markers = MarkerTable::default();
        let mut worker_a = StepMap::new();
        worker_a.insert(
            1,
            step(
                vec![comm("nccl:broadcast", 0.0, 1.0)],
                vec![comm("nccl:all_reduce", 10.0, 12.0), comm("nccl:all_reduce", 20.0, 21.0)],
            ),
        );
        let mut worker_b = StepMap::new();
        worker_b.insert(
            1,
            step(
                vec![comm("nccl:broadcast", 0.0, 2.0)],
                vec![comm("nccl:all_reduce", 10.0, 14.0)],
            ),
        );

        let summary = communication_timing([&worker_a, &worker_b], &markers);
        assert_eq!(summary["broadcast_0"], 1.5);
        assert_eq!(summary["all_reduce_0"], 3.0);
        assert_eq!(summary["all_reduce_1"], 1.0);
        assert_eq!(summary.len(), 3);
    }

    #[test]
    fn test_zero_durations_ignored_and_rounding() {
        let markers = MarkerTable::default();
        let mut steps = StepMap::new();
        steps.insert(1, step(vec![comm("nccl:broadcast", 1.0, 1.0)], vec![comm("nccl:all_reduce", 0.0, 1.0 / 3.0)]));

        let summary = communication_timing([&steps], &markers);
        assert!(!summary.contains_key("broadcast_0"));
        assert_eq!(summary["all_reduce_0"], 0.3333);
    }

    #[test]
    fn test_empty_input() {
        let summary = communication_timing(std::iter::empty(), &MarkerTable::default());
        assert!(summary.is_empty());
    }
}
