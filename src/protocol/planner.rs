//! Polled-address planning: contiguous range algebra, per-area coalescing
//! tables and size-bounded tag batching for multiple-service requests.
//!
//! This module contains pure planning logic which:
//! - Merges and splits contiguous numeric address ranges so each polled
//!   area is covered by the fewest possible device requests
//! - Maintains device/area keyed tables of those ranges
//! - Packs tag names into batches under a byte budget for the CIP
//!   Multiple Service Request
//!
//! It never touches the wire; session and frame layers consume the plans.

use std::{
    cmp::{max, min},
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Planner tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Largest address distance between one range's last address and the
    /// next range's start that still coalesces. `1` (the default) merges
    /// exactly-adjacent ranges only.
    pub coalesce_gap: u16,
    /// Byte budget for one multiple-service request's sub-request bodies.
    pub msr_budget_bytes: usize,
    /// Optional hard cap on tags per batch regardless of byte budget.
    pub max_tags_per_batch: Option<usize>,
}

impl PlannerConfig {
    pub fn new() -> Self {
        Self {
            coalesce_gap: 1,
            msr_budget_bytes: 480,
            max_tags_per_batch: None,
        }
    }

    /// Configure the coalescing distance. Values above 1 also swallow the
    /// uncovered addresses in between, trading read volume for fewer
    /// requests.
    #[inline]
    pub fn with_coalesce_gap(mut self, gap: u16) -> Self {
        self.coalesce_gap = max(gap, 1);
        self
    }

    /// Configure the multiple-service byte budget.
    #[inline]
    pub fn with_msr_budget_bytes(mut self, budget: usize) -> Self {
        self.msr_budget_bytes = budget;
        self
    }

    /// Configure the per-batch tag cap.
    #[inline]
    pub fn with_max_tags_per_batch(mut self, cap: Option<usize>) -> Self {
        self.max_tags_per_batch = cap;
        self
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A contiguous span of numeric device addresses treated as one polling
/// unit. `quantity` is always at least 1 and `start + quantity - 1` never
/// exceeds the 16-bit address space; both are enforced at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AddressRange {
    start: u16,
    quantity: u16,
}

impl AddressRange {
    pub fn new(start: u16, quantity: u16) -> Result<Self> {
        if quantity == 0 {
            return Err(Error::Contract {
                context: "address range quantity must not be zero",
            });
        }
        if start.checked_add(quantity - 1).is_none() {
            return Err(Error::Contract {
                context: "address range exceeds the 16-bit address space",
            });
        }
        Ok(Self { start, quantity })
    }

    #[inline]
    pub fn start(&self) -> u16 {
        self.start
    }

    #[inline]
    pub fn quantity(&self) -> u16 {
        self.quantity
    }

    /// Last address covered by the range (inclusive).
    #[inline]
    pub fn last(&self) -> u16 {
        self.start + self.quantity - 1
    }

    /// Whether the two ranges share at least one address.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.last() >= other.start && other.last() >= self.start
    }

    /// Whether the two ranges can fuse into one contiguous range:
    /// they overlap or sit within `gap` addresses of each other.
    pub fn is_mergeable_within(&self, other: &Self, gap: u16) -> bool {
        if self.overlaps(other) {
            return true;
        }
        if self.start > other.last() {
            self.start - other.last() <= gap
        } else {
            other.start - self.last() <= gap
        }
    }

    /// [`is_mergeable_within`](Self::is_mergeable_within) at the default
    /// adjacency-only distance.
    #[inline]
    pub fn is_mergeable(&self, other: &Self) -> bool {
        self.is_mergeable_within(other, 1)
    }

    /// Fuses two mergeable ranges into their covering range.
    pub fn merge_within(&self, other: &Self, gap: u16) -> Result<Self> {
        if !self.is_mergeable_within(other, gap) {
            return Err(Error::Contract {
                context: "ranges are neither overlapping nor within the merge gap",
            });
        }
        let start = min(self.start, other.start);
        let last = max(self.last(), other.last());
        Ok(Self {
            start,
            quantity: last - start + 1,
        })
    }

    #[inline]
    pub fn merge(&self, other: &Self) -> Result<Self> {
        self.merge_within(other, 1)
    }

    /// Whether `other` can be removed from this range. Removal requires a
    /// genuine overlap; mere adjacency is not enough.
    #[inline]
    pub fn is_removable(&self, other: &Self) -> bool {
        self.overlaps(other)
    }

    /// Removes `other` from this range.
    ///
    /// `other` must overlap (contract) and must be fully contained
    /// (otherwise the caller asked to remove addresses the range never
    /// held, reported as out of range).
    pub fn remove(&self, other: &Self) -> Result<RemovalOutcome> {
        if !self.is_removable(other) {
            return Err(Error::Contract {
                context: "removed range does not overlap the target",
            });
        }
        if other.start < self.start || other.last() > self.last() {
            return Err(Error::OutOfRange {
                context: "removed range crosses the target boundary",
            });
        }

        let shares_start = other.start == self.start;
        let shares_end = other.last() == self.last();
        Ok(match (shares_start, shares_end) {
            (true, true) => RemovalOutcome::Removed,
            (true, false) => RemovalOutcome::Shrunk(Self {
                start: other.last() + 1,
                quantity: self.quantity - other.quantity,
            }),
            (false, true) => RemovalOutcome::Shrunk(Self {
                start: self.start,
                quantity: other.start - self.start,
            }),
            (false, false) => RemovalOutcome::Split {
                head: Self {
                    start: self.start,
                    quantity: other.start - self.start,
                },
                tail: Self {
                    start: other.last() + 1,
                    quantity: self.last() - other.last(),
                },
            },
        })
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.last())
    }
}

/// What remained of a range after a removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The removed span covered the whole range; nothing remains.
    Removed,
    /// One contiguous span remains.
    Shrunk(AddressRange),
    /// The removed span was interior; a head and a tail remain.
    Split {
        head: AddressRange,
        tail: AddressRange,
    },
}

/// Outcome of a table mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// Entry inserted as-is.
    Updated,
    /// Entry coalesced into an existing range.
    Merged,
    /// Entry removed, possibly leaving shrunk remainders.
    Removed,
    /// Nothing to do: duplicate insert, or no entry matched a removal.
    NoData,
}

/// An ordered set of address ranges for one area, kept coalesced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: BTreeSet<AddressRange>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddressRange> {
        self.ranges.iter()
    }

    /// Inserts a range, fusing it with the first mergeable entry found.
    ///
    /// An insert into an empty set skips the consolidation pass; every
    /// other insert is followed by one so transitive adjacencies collapse.
    pub fn update(&mut self, range: AddressRange, gap: u16) -> TableStatus {
        if self.ranges.is_empty() {
            self.ranges.insert(range);
            return TableStatus::Updated;
        }

        let mergeable = self
            .ranges
            .iter()
            .find(|r| r.is_mergeable_within(&range, gap))
            .copied();

        let status = match mergeable {
            Some(existing) => {
                self.ranges.remove(&existing);
                // Mergeability was just checked, so the fuse cannot fail.
                let merged = existing
                    .merge_within(&range, gap)
                    .unwrap_or(existing);
                self.ranges.insert(merged);
                TableStatus::Merged
            }
            None => {
                if self.ranges.insert(range) {
                    TableStatus::Updated
                } else {
                    return TableStatus::NoData;
                }
            }
        };

        self.consolidate(gap);
        debug_assert!(self
            .ranges
            .iter()
            .zip(self.ranges.iter().skip(1))
            .all(|(a, b)| !a.is_mergeable_within(b, gap)));
        status
    }

    /// Removes a span from the set.
    ///
    /// Returns [`TableStatus::NoData`] when no entry overlaps the span.
    /// A span that overlaps an entry but crosses its boundary is an
    /// out-of-range error and leaves the set unchanged. Remainders are
    /// re-inserted without a consolidation pass; callers that expect
    /// merges across the new tail must run [`RangeSet::consolidate`].
    pub fn remove(&mut self, range: AddressRange) -> Result<TableStatus> {
        let target = match self.ranges.iter().find(|r| r.is_removable(&range)) {
            Some(r) => *r,
            None => return Ok(TableStatus::NoData),
        };

        let outcome = target.remove(&range)?;
        self.ranges.remove(&target);
        match outcome {
            RemovalOutcome::Removed => {}
            RemovalOutcome::Shrunk(rest) => {
                self.ranges.insert(rest);
            }
            RemovalOutcome::Split { head, tail } => {
                self.ranges.insert(head);
                self.ranges.insert(tail);
            }
        }
        Ok(TableStatus::Removed)
    }

    /// Fuses every mergeable neighbour pair, restarting the scan after
    /// each fuse until the set is stable.
    pub fn consolidate(&mut self, gap: u16) {
        loop {
            let pair = self
                .ranges
                .iter()
                .zip(self.ranges.iter().skip(1))
                .find(|(a, b)| a.is_mergeable_within(b, gap))
                .map(|(a, b)| (*a, *b));

            let (former, latter) = match pair {
                Some(p) => p,
                None => return,
            };

            self.ranges.remove(&former);
            self.ranges.remove(&latter);
            let merged = former.merge_within(&latter, gap).unwrap_or(former);
            self.ranges.insert(merged);
        }
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a AddressRange;
    type IntoIter = std::collections::btree_set::Iter<'a, AddressRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

/// Register spaces a polled device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Area {
    Coil,
    DiscreteInput,
    InputRegister,
    HoldingRegister,
}

impl Area {
    fn label(&self) -> &'static str {
        match self {
            Area::Coil => "COIL",
            Area::DiscreteInput => "D.I.",
            Area::InputRegister => "I.R.",
            Area::HoldingRegister => "H.R.",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-key collection of coalesced range sets.
///
/// The key is the polled dimension: [`Area`] for register spaces, a tag
/// name for array element spans.
#[derive(Debug, Clone)]
pub struct AreaTable<K: Ord> {
    areas: BTreeMap<K, RangeSet>,
    config: PlannerConfig,
}

impl<K: Ord + Clone> AreaTable<K> {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            areas: BTreeMap::new(),
            config,
        }
    }

    pub fn update(&mut self, key: K, range: AddressRange) -> TableStatus {
        let gap = self.config.coalesce_gap;
        self.areas.entry(key).or_default().update(range, gap)
    }

    pub fn remove(&mut self, key: &K, range: AddressRange) -> Result<TableStatus> {
        let set = match self.areas.get_mut(key) {
            Some(s) => s,
            None => return Ok(TableStatus::NoData),
        };
        let status = set.remove(range)?;
        if set.is_empty() {
            self.areas.remove(key);
        }
        Ok(status)
    }

    /// Ranges currently planned for a key, in ascending start order.
    pub fn ranges_for(&self, key: &K) -> impl Iterator<Item = &AddressRange> {
        self.areas.get(key).into_iter().flat_map(|s| s.iter())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&K, &RangeSet)> {
        self.areas.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn clear(&mut self) {
        self.areas.clear();
    }

    /// Total number of ranges across all keys.
    pub fn range_count(&self) -> usize {
        self.areas.values().map(RangeSet::len).sum()
    }
}

impl<K: Ord + Clone + fmt::Display> fmt::Display for AreaTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const DASH: &str = "----------------------------------------------";
        writeln!(f, "{DASH}")?;
        writeln!(
            f,
            "| {:<6} | {:>6} | {:>6} | {:>6} | {:>6} |",
            "Area", "Index", "Start", "Last", "Qty."
        )?;
        writeln!(f, "{DASH}")?;
        for (key, set) in &self.areas {
            for (idx, range) in set.iter().enumerate() {
                writeln!(
                    f,
                    "| {:<6} | {:>6} | {:>6} | {:>6} | {:>6} |",
                    key.to_string(),
                    idx + 1,
                    range.start(),
                    range.last(),
                    range.quantity()
                )?;
            }
        }
        write!(f, "{DASH}")
    }
}

/// Device-keyed address tables; one [`AreaTable`] per polled unit id,
/// created lazily on first use.
#[derive(Debug, Clone)]
pub struct AddressTable<K: Ord> {
    devices: BTreeMap<u8, AreaTable<K>>,
    config: PlannerConfig,
}

impl<K: Ord + Clone> AddressTable<K> {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            devices: BTreeMap::new(),
            config,
        }
    }

    pub fn update(&mut self, device: u8, key: K, range: AddressRange) -> TableStatus {
        let config = self.config;
        self.devices
            .entry(device)
            .or_insert_with(|| AreaTable::new(config))
            .update(key, range)
    }

    pub fn remove(&mut self, device: u8, key: &K, range: AddressRange) -> Result<TableStatus> {
        let table = match self.devices.get_mut(&device) {
            Some(t) => t,
            None => return Ok(TableStatus::NoData),
        };
        let status = table.remove(key, range)?;
        if table.is_empty() {
            self.devices.remove(&device);
        }
        Ok(status)
    }

    pub fn device(&self, id: u8) -> Option<&AreaTable<K>> {
        self.devices.get(&id)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }
}

/// Conservative request-size estimate for one tag inside a
/// multiple-service body: symbolic segment (marker + length + name +
/// pad to even) plus service, path-size and element-count overhead.
#[inline]
pub fn estimate_tag_request_size(tag: &str) -> usize {
    let name_len = tag.len();
    2 + name_len + (name_len % 2) + 4
}

/// One packed batch of tag names with its running size estimate.
#[derive(Debug, Clone, Default)]
pub struct TagBatch {
    tags: Vec<String>,
    total_size: usize,
}

impl TagBatch {
    #[inline]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    #[inline]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Greedy size-bounded packing of tag names into multiple-service
/// batches. Order of insertion is preserved; a tag opens a new batch
/// when the current one would exceed the byte budget or the tag cap.
#[derive(Debug, Clone)]
pub struct TagBatchSet {
    batches: Vec<TagBatch>,
    config: PlannerConfig,
}

impl TagBatchSet {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            batches: Vec::new(),
            config,
        }
    }

    #[inline]
    pub fn batches(&self) -> &[TagBatch] {
        &self.batches
    }

    pub fn tag_count(&self) -> usize {
        self.batches.iter().map(TagBatch::len).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.batches.iter().all(TagBatch::is_empty)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.batches
            .iter()
            .any(|b| b.tags.iter().any(|t| t == tag))
    }

    /// Appends a tag to the last open batch. Duplicates are ignored.
    pub fn add(&mut self, tag: &str) -> TableStatus {
        if self.contains(tag) {
            return TableStatus::NoData;
        }

        let size = estimate_tag_request_size(tag);
        let open_new = match self.batches.last() {
            None => true,
            Some(last) => {
                last.total_size + size > self.config.msr_budget_bytes
                    || self
                        .config
                        .max_tags_per_batch
                        .is_some_and(|cap| last.tags.len() >= cap)
            }
        };
        if open_new {
            self.batches.push(TagBatch::default());
        }

        let current = self
            .batches
            .last_mut()
            .expect("a batch was just ensured above");
        current.tags.push(tag.to_owned());
        current.total_size += size;
        TableStatus::Updated
    }

    /// Removes a tag by exact name, dropping its batch if it empties.
    /// Later batches are not repacked.
    pub fn remove(&mut self, tag: &str) -> TableStatus {
        for (batch_idx, batch) in self.batches.iter_mut().enumerate() {
            if let Some(pos) = batch.tags.iter().position(|t| t == tag) {
                batch.tags.remove(pos);
                batch.total_size -= estimate_tag_request_size(tag);
                if batch.tags.is_empty() {
                    self.batches.remove(batch_idx);
                }
                return TableStatus::Removed;
            }
        }
        TableStatus::NoData
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u16, quantity: u16) -> AddressRange {
        AddressRange::new(start, quantity).unwrap()
    }

    #[test]
    fn zero_quantity_is_a_contract_error() {
        assert!(matches!(
            AddressRange::new(10, 0),
            Err(Error::Contract { .. })
        ));
        assert!(matches!(
            AddressRange::new(u16::MAX, 2),
            Err(Error::Contract { .. })
        ));
    }

    #[test]
    fn mergeable_is_symmetric() {
        let cases = [
            (range(10, 5), range(15, 5)),
            (range(10, 5), range(16, 4)),
            (range(10, 5), range(12, 2)),
            (range(0, 1), range(2, 1)),
        ];
        for (a, b) in cases {
            assert_eq!(a.is_mergeable(&b), b.is_mergeable(&a), "{a} vs {b}");
            assert_eq!(
                a.is_mergeable_within(&b, 3),
                b.is_mergeable_within(&a, 3),
                "{a} vs {b} gap 3"
            );
        }
    }

    #[test]
    fn adjacent_ranges_merge() {
        let merged = range(10, 5).merge(&range(15, 5)).unwrap();
        assert_eq!(merged, range(10, 10));
        assert_eq!(merged.last(), 19);
    }

    #[test]
    fn gap_of_two_does_not_merge_by_default() {
        let a = range(10, 5);
        let b = range(16, 4);
        assert!(!a.is_mergeable(&b));
        assert!(a.merge(&b).is_err());
        // A widened gap covers the hole.
        assert!(a.is_mergeable_within(&b, 2));
        assert_eq!(a.merge_within(&b, 2).unwrap(), range(10, 10));
    }

    #[test]
    fn overlapping_ranges_merge_to_cover() {
        let merged = range(10, 10).merge(&range(15, 10)).unwrap();
        assert_eq!(merged, range(10, 15));
    }

    #[test]
    fn interior_removal_splits() {
        let outcome = range(10, 10).remove(&range(12, 2)).unwrap();
        assert_eq!(
            outcome,
            RemovalOutcome::Split {
                head: range(10, 2),
                tail: range(14, 6),
            }
        );
    }

    #[test]
    fn exact_removal_leaves_nothing() {
        let outcome = range(10, 10).remove(&range(10, 10)).unwrap();
        assert_eq!(outcome, RemovalOutcome::Removed);
    }

    #[test]
    fn edge_removals_shrink() {
        assert_eq!(
            range(10, 10).remove(&range(10, 3)).unwrap(),
            RemovalOutcome::Shrunk(range(13, 7))
        );
        assert_eq!(
            range(10, 10).remove(&range(17, 3)).unwrap(),
            RemovalOutcome::Shrunk(range(10, 7))
        );
    }

    #[test]
    fn boundary_crossing_removal_is_out_of_range() {
        assert!(matches!(
            range(10, 10).remove(&range(15, 10)),
            Err(Error::OutOfRange { .. })
        ));
        // Entirely disjoint spans violate the overlap contract instead.
        assert!(matches!(
            range(10, 10).remove(&range(30, 2)),
            Err(Error::Contract { .. })
        ));
    }

    #[test]
    fn set_update_coalesces_transitively() {
        let mut set = RangeSet::new();
        set.update(range(0, 5), 1);
        set.update(range(10, 5), 1);
        // Bridges the hole: [5,9] touches both neighbours.
        let status = set.update(range(5, 5), 1);
        assert_eq!(status, TableStatus::Merged);
        let all: Vec<_> = set.iter().copied().collect();
        assert_eq!(all, vec![range(0, 15)]);
    }

    #[test]
    fn first_insert_skips_consolidation() {
        let mut set = RangeSet::new();
        assert_eq!(set.update(range(100, 4), 1), TableStatus::Updated);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn consolidation_is_idempotent() {
        let mut set = RangeSet::new();
        set.update(range(0, 5), 1);
        set.update(range(20, 5), 1);
        set.update(range(5, 5), 1);
        let before: Vec<_> = set.iter().copied().collect();
        set.consolidate(1);
        let after: Vec<_> = set.iter().copied().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn set_remove_reports_no_data_for_unknown_span() {
        let mut set = RangeSet::new();
        set.update(range(10, 5), 1);
        assert_eq!(set.remove(range(100, 5)).unwrap(), TableStatus::NoData);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn set_remove_splits_and_keeps_pieces() {
        let mut set = RangeSet::new();
        set.update(range(10, 10), 1);
        assert_eq!(set.remove(range(12, 2)).unwrap(), TableStatus::Removed);
        let all: Vec<_> = set.iter().copied().collect();
        assert_eq!(all, vec![range(10, 2), range(14, 6)]);
    }

    #[test]
    fn area_table_keeps_areas_independent() {
        let mut table = AreaTable::new(PlannerConfig::new());
        table.update(Area::Coil, range(10, 5));
        table.update(Area::HoldingRegister, range(15, 5));
        // Different areas never coalesce with each other.
        assert_eq!(table.ranges_for(&Area::Coil).count(), 1);
        assert_eq!(table.ranges_for(&Area::HoldingRegister).count(), 1);
        assert_eq!(table.range_count(), 2);
    }

    #[test]
    fn address_table_creates_devices_lazily() {
        let mut table = AddressTable::new(PlannerConfig::new());
        assert!(table.device(3).is_none());
        table.update(3, Area::InputRegister, range(0, 8));
        assert!(table.device(3).is_some());
        assert_eq!(
            table.remove(9, &Area::InputRegister, range(0, 8)).unwrap(),
            TableStatus::NoData
        );
        assert_eq!(
            table.remove(3, &Area::InputRegister, range(0, 8)).unwrap(),
            TableStatus::Removed
        );
        assert!(table.device(3).is_none());
    }

    #[test]
    fn clear_resets_tables_completely() {
        let mut areas = AreaTable::new(PlannerConfig::new());
        areas.update(Area::Coil, range(10, 5));
        areas.update(Area::InputRegister, range(0, 8));
        areas.clear();
        assert!(areas.is_empty());
        assert_eq!(areas.range_count(), 0);

        let mut devices = AddressTable::new(PlannerConfig::new());
        devices.update(1, Area::Coil, range(0, 4));
        devices.update(2, Area::Coil, range(0, 4));
        devices.clear();
        assert!(devices.is_empty());
        assert!(devices.device(1).is_none());
    }

    #[test]
    fn widened_gap_config_applies_to_table_updates() {
        let mut table = AreaTable::new(PlannerConfig::new().with_coalesce_gap(2));
        table.update(Area::Coil, range(10, 5));
        let status = table.update(Area::Coil, range(16, 4));
        assert_eq!(status, TableStatus::Merged);
        let all: Vec<_> = table.ranges_for(&Area::Coil).copied().collect();
        assert_eq!(all, vec![range(10, 10)]);
    }

    #[test]
    fn tag_size_estimate_counts_padding() {
        // Even name length: marker + len + name + 4.
        assert_eq!(estimate_tag_request_size("Tag1"), 2 + 4 + 0 + 4);
        // Odd name length adds one pad byte.
        assert_eq!(estimate_tag_request_size("Motor"), 2 + 5 + 1 + 4);
    }

    #[test]
    fn batches_split_at_the_byte_budget() {
        let config = PlannerConfig::new().with_msr_budget_bytes(30);
        let mut set = TagBatchSet::new(config);
        // Each of these estimates to 10 bytes.
        for tag in ["Tag1", "Tag2", "Tag3", "Tag4"] {
            assert_eq!(set.add(tag), TableStatus::Updated);
        }
        assert_eq!(set.batches().len(), 2);
        assert_eq!(set.batches()[0].len(), 3);
        assert_eq!(set.batches()[0].total_size(), 30);
        assert_eq!(set.batches()[1].len(), 1);
        assert_eq!(set.tag_count(), 4);
    }

    #[test]
    fn duplicate_tags_are_ignored() {
        let mut set = TagBatchSet::new(PlannerConfig::new());
        assert_eq!(set.add("Tag1"), TableStatus::Updated);
        assert_eq!(set.add("Tag1"), TableStatus::NoData);
        assert_eq!(set.tag_count(), 1);
    }

    #[test]
    fn tag_removal_drops_empty_batches() {
        let mut set = TagBatchSet::new(PlannerConfig::new().with_max_tags_per_batch(Some(1)));
        set.add("Tag1");
        set.add("Tag2");
        assert_eq!(set.batches().len(), 2);
        assert_eq!(set.remove("Tag1"), TableStatus::Removed);
        assert_eq!(set.batches().len(), 1);
        assert_eq!(set.remove("Tag1"), TableStatus::NoData);
    }

    #[test]
    fn tag_cap_limits_batch_population() {
        let config = PlannerConfig::new().with_max_tags_per_batch(Some(2));
        let mut set = TagBatchSet::new(config);
        for tag in ["A1", "B2", "C3", "D4", "E5"] {
            set.add(tag);
        }
        assert_eq!(set.batches().len(), 3);
        assert!(set.batches().iter().all(|b| b.len() <= 2));
    }

    #[test]
    fn address_map_renders_fixed_width_rows() {
        let mut table = AreaTable::new(PlannerConfig::new());
        table.update(Area::Coil, range(10, 5));
        table.update(Area::HoldingRegister, range(0, 3));
        let rendered = table.to_string();
        assert!(rendered.contains("| Area"));
        assert!(rendered.contains("COIL"));
        assert!(rendered.contains("H.R."));
        assert!(rendered.lines().count() >= 6);
    }
}
