//! Replicate generation: each replicate is a concatenation of independently
//! positioned circular blocks drawn from the source series.
//!
//! Randomness is always injected. [`ReplicateGenerator::generate`] takes any
//! `rand::Rng`; [`ReplicateGenerator::generate_par`] gives every replicate its
//! own `StdRng` seeded from `(master_seed, replicate_id)`, so the output does
//! not depend on how rayon schedules the work.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BootstrapError, Result};
use crate::sampler::{BlockLayout, sample_block};
use crate::series::{Observation, SourceSeries};

/// One synthetic history. Block boundaries are not retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replicate {
    pub replicate_id: usize,
    pub observations: Vec<Observation>,
}

impl Replicate {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicateGenerator {
    block_size: Option<usize>,
}

impl ReplicateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed block size instead of `round(sqrt(N))`.
    pub fn with_block_size(mut self, block_size: Option<usize>) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn layout(&self, series: &SourceSeries) -> Result<BlockLayout> {
        match self.block_size {
            Some(size) => BlockLayout::with_block_size(series.len(), size),
            None => BlockLayout::for_len(series.len()),
        }
    }

    fn validate(&self, series: &SourceSeries, n_replicates: usize) -> Result<BlockLayout> {
        if series.is_empty() {
            return Err(BootstrapError::EmptySeries);
        }
        if n_replicates == 0 {
            return Err(BootstrapError::InvalidCount(n_replicates));
        }
        let layout = self.layout(series)?;
        info!(
            "total rows: {}, block size: {}, blocks per replicate: {}, replicates: {}",
            series.len(),
            layout.block_size,
            layout.block_count,
            n_replicates
        );
        Ok(layout)
    }

    /// Build `n_replicates` replicates, drawing every block offset from `rng`
    /// in replicate-then-block order.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        series: &SourceSeries,
        n_replicates: usize,
        rng: &mut R,
    ) -> Result<Vec<Replicate>> {
        let layout = self.validate(series, n_replicates)?;
        (0..n_replicates)
            .map(|id| build_replicate(series.observations(), layout, id, rng))
            .collect()
    }

    /// Parallel generation with one derived RNG per replicate.
    pub fn generate_par(
        &self,
        series: &SourceSeries,
        n_replicates: usize,
        master_seed: u64,
    ) -> Result<Vec<Replicate>> {
        let layout = self.validate(series, n_replicates)?;
        (0..n_replicates)
            .into_par_iter()
            .map(|id| {
                let mut rng = replicate_rng(master_seed, id);
                build_replicate(series.observations(), layout, id, &mut rng)
            })
            .collect()
    }
}

/// Convenience wrapper using the default square-root block layout.
pub fn generate_replicates<R: Rng + ?Sized>(
    series: &SourceSeries,
    n_replicates: usize,
    rng: &mut R,
) -> Result<Vec<Replicate>> {
    ReplicateGenerator::new().generate(series, n_replicates, rng)
}

fn build_replicate<R: Rng + ?Sized>(
    series: &[Observation],
    layout: BlockLayout,
    replicate_id: usize,
    rng: &mut R,
) -> Result<Replicate> {
    let n = series.len();
    let mut observations = Vec::with_capacity(layout.replicate_len());
    for _ in 0..layout.block_count {
        let start = rng.gen_range(0..n);
        observations.extend(sample_block(series, start, layout.block_size)?);
    }
    Ok(Replicate {
        replicate_id,
        observations,
    })
}

/// Sub-seed for one replicate, derived by hashing so it is independent of
/// the order replicates are produced in.
pub fn replicate_seed(master_seed: u64, replicate_id: usize) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"ratio-tails/replicate");
    hasher.update(&master_seed.to_le_bytes());
    hasher.update(&(replicate_id as u64).to_le_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

pub fn replicate_rng(master_seed: u64, replicate_id: usize) -> StdRng {
    StdRng::seed_from_u64(replicate_seed(master_seed, replicate_id))
}
