//! Circular block sampling and the block layout heuristic.

use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, Result};
use crate::series::Observation;

/// Upper bound on a single block; anything longer is a configuration mistake.
pub const MAX_BLOCK_LEN: usize = 1_000_000;

/// Block geometry for a series of length `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLayout {
    pub block_size: usize,
    pub block_count: usize,
}

impl BlockLayout {
    /// `block_size = round(sqrt(N))` (at least 1), `block_count = ceil(N / block_size)`.
    pub fn for_len(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(BootstrapError::EmptySeries);
        }
        let block_size = ((n as f64).sqrt().round() as usize).max(1);
        Self::with_block_size(n, block_size)
    }

    /// Layout with an explicit block size instead of the square-root heuristic.
    pub fn with_block_size(n: usize, block_size: usize) -> Result<Self> {
        if n == 0 {
            return Err(BootstrapError::EmptySeries);
        }
        check_length(block_size)?;
        Ok(Self {
            block_size,
            block_count: n.div_ceil(block_size),
        })
    }

    /// Rows in every replicate built with this layout.
    pub fn replicate_len(&self) -> usize {
        self.block_size * self.block_count
    }
}

fn check_length(length: usize) -> Result<()> {
    if length == 0 || length > MAX_BLOCK_LEN {
        return Err(BootstrapError::InvalidLength {
            length,
            max: MAX_BLOCK_LEN,
        });
    }
    Ok(())
}

/// Take `length` rows starting at `start_offset`, wrapping past the end.
///
/// Row `i` of the block is `series[(start_offset + i) % N]`. The offset is
/// chosen by the caller so the random draw stays outside this function.
pub fn sample_block(
    series: &[Observation],
    start_offset: usize,
    length: usize,
) -> Result<Vec<Observation>> {
    let n = series.len();
    if n == 0 {
        return Err(BootstrapError::EmptySeries);
    }
    check_length(length)?;
    Ok((0..length).map(|i| series[(start_offset + i) % n]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(n: usize) -> Vec<Observation> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        (0..n)
            .map(|i| Observation {
                date: start + chrono::Duration::days(i as i64),
                ratio: 1.0 + i as f64,
                change_pct: i as f64,
            })
            .collect()
    }

    #[test]
    fn block_wraps_around() {
        let s = series(5);
        let block = sample_block(&s, 3, 4).unwrap();
        let changes: Vec<f64> = block.iter().map(|o| o.change_pct).collect();
        assert_eq!(changes, vec![3.0, 4.0, 0.0, 1.0]);
    }

    #[test]
    fn block_longer_than_series_cycles() {
        let s = series(2);
        let block = sample_block(&s, 1, 5).unwrap();
        let changes: Vec<f64> = block.iter().map(|o| o.change_pct).collect();
        assert_eq!(changes, vec![1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn zero_length_rejected() {
        let err = sample_block(&series(3), 0, 0).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidLength { length: 0, .. }));
    }

    #[test]
    fn absurd_length_rejected() {
        let err = sample_block(&series(3), 0, MAX_BLOCK_LEN + 1).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidLength { .. }));
    }

    #[test]
    fn empty_series_rejected() {
        assert_eq!(sample_block(&[], 0, 3), Err(BootstrapError::EmptySeries));
    }

    #[test]
    fn layout_uses_sqrt_heuristic() {
        let l = BlockLayout::for_len(100).unwrap();
        assert_eq!((l.block_size, l.block_count), (10, 10));

        // sqrt(730) ≈ 27.02 → 27 rows, ceil(730 / 27) = 28 blocks
        let l = BlockLayout::for_len(730).unwrap();
        assert_eq!((l.block_size, l.block_count), (27, 28));
        assert_eq!(l.replicate_len(), 756);

        let l = BlockLayout::for_len(2).unwrap();
        assert_eq!((l.block_size, l.block_count), (1, 2));
    }

    #[test]
    fn layout_override() {
        let l = BlockLayout::with_block_size(10, 3).unwrap();
        assert_eq!((l.block_size, l.block_count), (3, 4));
        assert!(BlockLayout::with_block_size(10, 0).is_err());
    }
}
