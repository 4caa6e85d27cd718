use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::types::{Gid, Lid};

/// Half-open range of local indices covered by one label on one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LidRange {
    pub begin: Lid,
    pub end: Lid,
}

impl LidRange {
    pub fn new(begin: Lid, end: Lid) -> Self {
        debug_assert!(begin <= end);
        Self { begin, end }
    }

    pub fn len(&self) -> usize {
        (self.end - self.begin) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// Flattened (gid, label, lid range) table, gathered across ranks. Within a
/// rank's partition entries are sorted lexicographically by (gid, label).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledRanges {
    pub gids: Vec<Gid>,
    pub labels: Vec<String>,
    pub ranges: Vec<LidRange>,
    pub partition: Vec<usize>,
}

impl LabeledRanges {
    pub fn add(&mut self, gid: Gid, label: impl Into<String>, range: LidRange) {
        self.gids.push(gid);
        self.labels.push(label.into());
        self.ranges.push(range);
    }

    pub fn len(&self) -> usize {
        self.gids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gids.is_empty()
    }

    /// Sort entries lexicographically and mark the table as one partition.
    pub fn seal(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            (self.gids[a], &self.labels[a]).cmp(&(self.gids[b], &self.labels[b]))
        });
        self.gids = order.iter().map(|&i| self.gids[i]).collect();
        self.labels = order.iter().map(|&i| self.labels[i].clone()).collect();
        self.ranges = order.iter().map(|&i| self.ranges[i]).collect();
        self.partition = vec![0, self.len()];
    }

    /// Append another table's entries with gids shifted by `offset`,
    /// extending the partition by one rank.
    pub fn append_offset(&mut self, other: &LabeledRanges, offset: Gid) {
        if self.partition.is_empty() {
            self.partition.push(0);
        }
        self.gids.extend(other.gids.iter().map(|g| g + offset));
        self.labels.extend(other.labels.iter().cloned());
        self.ranges.extend(other.ranges.iter().copied());
        self.partition.push(self.gids.len());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LidSelectionPolicy {
    /// Successive resolutions cycle through the label's index range.
    RoundRobin,
    /// The label must resolve to exactly one index.
    AssertUnivalent,
}

/// Resolves (gid, label) pairs to concrete local indices. Round-robin state
/// is kept per (gid, label) entry, so resolution order is part of the
/// deterministic construction sequence.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    gids: Vec<Gid>,
    labels: Vec<String>,
    ranges: Vec<LidRange>,
    counters: Vec<u32>,
}

impl LabelResolver {
    pub fn new(mut table: LabeledRanges) -> Self {
        table.seal();
        let counters = vec![0; table.len()];
        Self {
            gids: table.gids,
            labels: table.labels,
            ranges: table.ranges,
            counters,
        }
    }

    /// All entries matching (gid, label), as a contiguous index range into
    /// the sorted table.
    fn entry_range(&self, gid: Gid, label: &str) -> std::ops::Range<usize> {
        let key = (gid, label);
        self.lower_bound(key)..self.upper_bound(key)
    }

    fn lower_bound(&self, key: (Gid, &str)) -> usize {
        let mut lo = 0;
        let mut hi = self.gids.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if (self.gids[mid], self.labels[mid].as_str()) < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn upper_bound(&self, key: (Gid, &str)) -> usize {
        let mut lo = 0;
        let mut hi = self.gids.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if (self.gids[mid], self.labels[mid].as_str()) <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    pub fn get_lid(&mut self, gid: Gid, label: &str, policy: LidSelectionPolicy) -> Result<Lid> {
        let entries = self.entry_range(gid, label);
        let total: usize = entries.clone().map(|i| self.ranges[i].len()).sum();
        if total == 0 {
            return Err(SimulationError::NoSuchLabel {
                gid,
                label: label.to_string(),
            });
        }

        match policy {
            LidSelectionPolicy::AssertUnivalent => {
                if total != 1 {
                    return Err(SimulationError::AmbiguousLabel {
                        gid,
                        label: label.to_string(),
                        count: total,
                    });
                }
                let entry = entries
                    .clone()
                    .find(|&i| !self.ranges[i].is_empty())
                    .expect("total is nonzero");
                Ok(self.ranges[entry].begin)
            }
            LidSelectionPolicy::RoundRobin => {
                // The counter lives on the first entry and cycles through the
                // concatenation of all ranges under the label.
                let first = entries.start;
                let k = self.counters[first] as usize % total;
                self.counters[first] += 1;

                let mut remaining = k;
                for i in entries {
                    let len = self.ranges[i].len();
                    if remaining < len {
                        return Ok(self.ranges[i].begin + remaining as Lid);
                    }
                    remaining -= len;
                }
                unreachable!("k < total");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> LabelResolver {
        let mut table = LabeledRanges::default();
        table.add(1, "syn", LidRange::new(0, 3));
        table.add(1, "det", LidRange::new(0, 1));
        table.add(0, "syn", LidRange::new(2, 3));
        LabelResolver::new(table)
    }

    #[test]
    fn round_robin_cycles_with_period_len() {
        let mut r = resolver();
        let picks: Vec<_> = (0..7)
            .map(|_| r.get_lid(1, "syn", LidSelectionPolicy::RoundRobin).unwrap())
            .collect();
        assert_eq!(picks, [0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn univalent_accepts_single() {
        let mut r = resolver();
        assert_eq!(
            r.get_lid(0, "syn", LidSelectionPolicy::AssertUnivalent)
                .unwrap(),
            2
        );
        assert_eq!(
            r.get_lid(1, "det", LidSelectionPolicy::AssertUnivalent)
                .unwrap(),
            0
        );
    }

    #[test]
    fn univalent_rejects_multivalent() {
        let mut r = resolver();
        let err = r
            .get_lid(1, "syn", LidSelectionPolicy::AssertUnivalent)
            .unwrap_err();
        assert_eq!(
            err,
            SimulationError::AmbiguousLabel {
                gid: 1,
                label: "syn".into(),
                count: 3
            }
        );
    }

    #[test]
    fn missing_label_fails() {
        let mut r = resolver();
        let err = r
            .get_lid(2, "syn", LidSelectionPolicy::RoundRobin)
            .unwrap_err();
        assert_eq!(
            err,
            SimulationError::NoSuchLabel {
                gid: 2,
                label: "syn".into()
            }
        );
    }

    #[test]
    fn append_offset_extends_partition() {
        let mut local = LabeledRanges::default();
        local.add(0, "syn", LidRange::new(0, 2));
        local.partition = vec![0, 1];

        let mut gathered = LabeledRanges::default();
        gathered.append_offset(&local, 0);
        gathered.append_offset(&local, 10);
        assert_eq!(gathered.gids, [0, 10]);
        assert_eq!(gathered.partition, [0, 1, 2]);
    }
}
