use serde::Serialize;

use crate::replicates::Replicate;
use crate::series::Observation;

/// A replicate's observations sorted ascending by `change_pct`.
///
/// Built from a borrowed [`Replicate`]; the original chronological order is
/// left untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankOrderedReplicate {
    pub replicate_id: usize,
    observations: Vec<Observation>,
}

impl RankOrderedReplicate {
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Sorted `change_pct` values.
    pub fn changes(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.change_pct).collect()
    }
}

/// Stable ascending sort by `change_pct`; equal changes keep their replicate order.
pub fn order_by_change(replicate: &Replicate) -> RankOrderedReplicate {
    let mut observations = replicate.observations.clone();
    observations.sort_by(|a, b| a.change_pct.total_cmp(&b.change_pct));
    RankOrderedReplicate {
        replicate_id: replicate.replicate_id,
        observations,
    }
}

pub fn order_all(replicates: &[Replicate]) -> Vec<RankOrderedReplicate> {
    replicates.iter().map(order_by_change).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rep(changes: &[f64]) -> Replicate {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        Replicate {
            replicate_id: 3,
            observations: changes
                .iter()
                .enumerate()
                .map(|(i, &c)| Observation {
                    date: start + chrono::Duration::days(i as i64),
                    ratio: 1.0,
                    change_pct: c,
                })
                .collect(),
        }
    }

    #[test]
    fn sorts_ascending() {
        let ordered = order_by_change(&rep(&[3.0, -1.0, 2.0, -7.5]));
        assert_eq!(ordered.replicate_id, 3);
        assert_eq!(ordered.changes(), vec![-7.5, -1.0, 2.0, 3.0]);
    }

    #[test]
    fn ties_keep_original_order() {
        let r = rep(&[1.0, 0.0, 1.0, 0.0]);
        let ordered = order_by_change(&r);
        let days: Vec<NaiveDate> = ordered.observations().iter().map(|o| o.date).collect();
        let d = |n: usize| r.observations[n].date;
        assert_eq!(days, vec![d(1), d(3), d(0), d(2)]);
    }

    #[test]
    fn original_replicate_untouched() {
        let r = rep(&[2.0, 1.0]);
        let _ = order_by_change(&r);
        assert_eq!(r.observations[0].change_pct, 2.0);
    }
}
