use crate::error::Result;
use crate::label::LabeledRanges;
use crate::types::{Gid, Spike, Time};

/// A concatenation of per-rank vectors together with the inclusive
/// prefix-sum partition describing each rank's contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct GatheredVector<T> {
    values: Vec<T>,
    partition: Vec<u32>,
}

impl<T> GatheredVector<T> {
    pub fn new(values: Vec<T>, partition: Vec<u32>) -> Self {
        debug_assert!(!partition.is_empty());
        debug_assert_eq!(*partition.last().unwrap() as usize, values.len());
        Self { values, partition }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn partition(&self) -> &[u32] {
        &self.partition
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The subrange contributed by one rank.
    pub fn values_for(&self, rank: usize) -> &[T] {
        let begin = self.partition[rank] as usize;
        let end = self.partition[rank + 1] as usize;
        &self.values[begin..end]
    }
}

/// The narrow capability set the engine requires from the distributed
/// transport. `gather_spikes` doubles as the per-epoch collective barrier.
pub trait DistributedContext: Send + Sync {
    fn id(&self) -> usize;
    fn size(&self) -> usize;

    fn gather_spikes(&self, local: &[Spike]) -> Result<GatheredVector<Spike>>;
    fn gather_gids(&self, local: &[Gid]) -> Result<GatheredVector<Gid>>;
    fn gather_labeled_ranges(&self, local: &LabeledRanges) -> Result<LabeledRanges>;

    fn min_time(&self, value: Time) -> Result<Time>;
    fn max_time(&self, value: Time) -> Result<Time>;
    fn sum_u64(&self, value: u64) -> Result<u64>;
    fn gather_u64(&self, value: u64) -> Result<Vec<u64>>;

    fn barrier(&self) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Single-rank context: every gather is the identity with partition [0, n].
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalContext;

impl DistributedContext for LocalContext {
    fn id(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn gather_spikes(&self, local: &[Spike]) -> Result<GatheredVector<Spike>> {
        Ok(GatheredVector::new(
            local.to_vec(),
            vec![0, local.len() as u32],
        ))
    }

    fn gather_gids(&self, local: &[Gid]) -> Result<GatheredVector<Gid>> {
        Ok(GatheredVector::new(
            local.to_vec(),
            vec![0, local.len() as u32],
        ))
    }

    fn gather_labeled_ranges(&self, local: &LabeledRanges) -> Result<LabeledRanges> {
        Ok(local.clone())
    }

    fn min_time(&self, value: Time) -> Result<Time> {
        Ok(value)
    }

    fn max_time(&self, value: Time) -> Result<Time> {
        Ok(value)
    }

    fn sum_u64(&self, value: u64) -> Result<u64> {
        Ok(value)
    }

    fn gather_u64(&self, value: u64) -> Result<Vec<u64>> {
        Ok(vec![value])
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Replicates the local rank `num_ranks` times, offsetting gids by
/// `cells_per_tile` per simulated rank. Lets a single process exercise the
/// full exchange machinery of an N-rank run.
#[derive(Debug, Clone, Copy)]
pub struct DryRunContext {
    pub num_ranks: usize,
    pub cells_per_tile: u32,
}

impl DryRunContext {
    pub fn new(num_ranks: usize, cells_per_tile: u32) -> Self {
        assert!(num_ranks > 0, "dry run needs at least one rank");
        Self {
            num_ranks,
            cells_per_tile,
        }
    }

    fn replicate_partition(&self, local_size: usize) -> Vec<u32> {
        (0..=self.num_ranks)
            .map(|i| (i * local_size) as u32)
            .collect()
    }
}

impl DistributedContext for DryRunContext {
    fn id(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        self.num_ranks
    }

    fn gather_spikes(&self, local: &[Spike]) -> Result<GatheredVector<Spike>> {
        let mut gathered = Vec::with_capacity(local.len() * self.num_ranks);
        for rank in 0..self.num_ranks {
            let offset = self.cells_per_tile * rank as u32;
            gathered.extend(local.iter().map(|s| {
                let mut s = *s;
                s.source.gid += offset;
                s
            }));
        }
        let partition = self.replicate_partition(local.len());
        Ok(GatheredVector::new(gathered, partition))
    }

    fn gather_gids(&self, local: &[Gid]) -> Result<GatheredVector<Gid>> {
        let mut gathered = Vec::with_capacity(local.len() * self.num_ranks);
        for rank in 0..self.num_ranks {
            let offset = self.cells_per_tile * rank as u32;
            gathered.extend(local.iter().map(|gid| gid + offset));
        }
        let partition = self.replicate_partition(local.len());
        Ok(GatheredVector::new(gathered, partition))
    }

    fn gather_labeled_ranges(&self, local: &LabeledRanges) -> Result<LabeledRanges> {
        let mut gathered = LabeledRanges::default();
        for rank in 0..self.num_ranks {
            let offset = self.cells_per_tile * rank as u32;
            gathered.append_offset(local, offset);
        }
        Ok(gathered)
    }

    fn min_time(&self, value: Time) -> Result<Time> {
        Ok(value)
    }

    fn max_time(&self, value: Time) -> Result<Time> {
        Ok(value)
    }

    fn sum_u64(&self, value: u64) -> Result<u64> {
        Ok(value * self.num_ranks as u64)
    }

    fn gather_u64(&self, value: u64) -> Result<Vec<u64>> {
        Ok(vec![value; self.num_ranks])
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dryrun"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellMember;

    #[test]
    fn local_gather_is_identity() {
        let ctx = LocalContext;
        let spikes = vec![
            Spike::new(CellMember::new(0, 0), 0.5),
            Spike::new(CellMember::new(2, 1), 1.5),
        ];
        let gathered = ctx.gather_spikes(&spikes).unwrap();
        assert_eq!(gathered.values(), &spikes[..]);
        assert_eq!(gathered.partition(), &[0, 2]);
        assert_eq!(ctx.size(), 1);
        assert_eq!(ctx.sum_u64(3).unwrap(), 3);
    }

    #[test]
    fn dry_run_replicates_with_tile_offsets() {
        let ctx = DryRunContext::new(4, 10);
        let spikes = vec![Spike::new(CellMember::new(3, 0), 1.0)];
        let gathered = ctx.gather_spikes(&spikes).unwrap();

        assert_eq!(gathered.len(), 4);
        assert_eq!(gathered.partition(), &[0, 1, 2, 3, 4]);
        let gids: Vec<_> = gathered.values().iter().map(|s| s.source.gid).collect();
        assert_eq!(gids, [3, 13, 23, 33]);
        assert!(gathered.values().iter().all(|s| s.time == 1.0));
    }

    #[test]
    fn dry_run_gathers_gids_per_rank() {
        let ctx = DryRunContext::new(3, 4);
        let gathered = ctx.gather_gids(&[0, 1, 2, 3]).unwrap();
        assert_eq!(gathered.values_for(0), &[0, 1, 2, 3]);
        assert_eq!(gathered.values_for(1), &[4, 5, 6, 7]);
        assert_eq!(gathered.values_for(2), &[8, 9, 10, 11]);
        assert_eq!(ctx.sum_u64(5).unwrap(), 15);
    }
}
