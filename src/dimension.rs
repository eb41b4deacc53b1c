use crate::structs::Record;
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::ops::Range;

/// Position of a record in the session's record store.
pub type RecordId = usize;

/// Predicate over one dimension's key space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter<K> {
    /// Keys equal to the value.
    Exact(K),
    /// Half-open key range `[lo, hi)`.
    Range { lo: K, hi: K },
    /// Keys belonging to the set.
    In(BTreeSet<K>),
}

impl<K: Ord> Filter<K> {
    /// Builds a brush filter. A zero-width brush selects nothing to exclude and
    /// yields `None`; reversed bounds are swapped.
    pub fn range(lo: K, hi: K) -> Option<Self> {
        match lo.cmp(&hi) {
            std::cmp::Ordering::Less => Some(Filter::Range { lo, hi }),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(Filter::Range { lo: hi, hi: lo }),
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        match self {
            Filter::Exact(k) => key == k,
            Filter::Range { lo, hi } => lo <= key && key < hi,
            Filter::In(keys) => keys.contains(key),
        }
    }
}

impl<K: Ord> FromIterator<K> for Filter<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Filter::In(iter.into_iter().collect())
    }
}

/// Records whose own-filter membership changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// Previously excluded by this dimension's filter, now selected.
    pub added: Vec<RecordId>,
    /// Previously selected, now excluded by this dimension's filter.
    pub removed: Vec<RecordId>,
}

/// Sorted index of records by one key.
///
/// `entries` holds every record ordered by `(key, id)`. The current filter
/// selects a set of disjoint, ascending position runs in `entries`, so a
/// filter change is diffed run-against-run and costs only the records that
/// actually change side.
pub struct Dimension<K> {
    name: String,
    entries: Vec<(K, RecordId)>,
    keys: Vec<K>,
    key_slots: Vec<usize>,
    selection: Vec<Range<usize>>,
    filter: Option<Filter<K>>,
}

impl<K> Dimension<K>
where
    K: Ord + Clone + Send + Sync,
{
    /// Precomputes the key of every record and sorts the index once.
    pub fn new<F>(name: impl Into<String>, records: &[Record], key_fn: F) -> Self
    where
        F: Fn(&Record) -> K + Sync,
    {
        let name = name.into();
        let mut entries: Vec<(K, RecordId)> = records
            .par_iter()
            .enumerate()
            .map(|(id, record)| (key_fn(record), id))
            .collect();
        entries.par_sort_unstable();

        let mut keys: Vec<K> = Vec::new();
        let mut key_slots = vec![0; entries.len()];
        for (key, id) in &entries {
            if keys.last() != Some(key) {
                keys.push(key.clone());
            }
            key_slots[*id] = keys.len() - 1;
        }
        debug!(
            "Dimension '{}' indexed {} records over {} keys",
            name,
            entries.len(),
            keys.len()
        );

        let selection = full_run(entries.len());
        Self {
            name,
            entries,
            keys,
            key_slots,
            selection,
            filter: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distinct keys in ascending order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Index into `keys()` of a record's key.
    pub fn slot_of(&self, id: RecordId) -> usize {
        self.key_slots[id]
    }

    pub fn filter(&self) -> Option<&Filter<K>> {
        self.filter.as_ref()
    }

    /// Record ids in ascending key order.
    pub fn ascending(&self) -> impl DoubleEndedIterator<Item = RecordId> + '_ {
        self.entries.iter().map(|(_, id)| *id)
    }

    /// Replaces the active filter and reports which records changed side.
    ///
    /// Records selected by both the old and the new filter are not reported,
    /// so replacing a filter is equivalent to clearing it and then applying
    /// the new one, minus the records that would cancel out.
    pub fn apply(&mut self, filter: Option<Filter<K>>) -> Delta {
        let (next, delta) = self.plan(filter.as_ref());
        self.commit(next, filter);
        delta
    }

    /// Computes the runs `filter` would select and the records that would
    /// change side, without touching the current selection.
    pub(crate) fn plan(&self, filter: Option<&Filter<K>>) -> (Vec<Range<usize>>, Delta) {
        let next = self.runs_for(filter);
        let (added_runs, removed_runs) = diff_runs(&self.selection, &next);

        let ids = |runs: &[Range<usize>]| -> Vec<RecordId> {
            runs.iter()
                .flat_map(|r| self.entries[r.clone()].iter().map(|(_, id)| *id))
                .collect()
        };
        let delta = Delta {
            added: ids(&added_runs),
            removed: ids(&removed_runs),
        };
        (next, delta)
    }

    /// Installs a selection computed by [`Dimension::plan`] for `filter`.
    pub(crate) fn commit(&mut self, selection: Vec<Range<usize>>, filter: Option<Filter<K>>) {
        self.selection = selection;
        self.filter = filter;
    }

    fn runs_for(&self, filter: Option<&Filter<K>>) -> Vec<Range<usize>> {
        match filter {
            None => full_run(self.entries.len()),
            Some(Filter::Exact(key)) => non_empty(self.lower_bound(key)..self.upper_bound(key)),
            Some(Filter::Range { lo, hi }) => {
                let start = self.lower_bound(lo);
                let end = self.lower_bound(hi).max(start);
                non_empty(start..end)
            }
            Some(Filter::In(keys)) => {
                let mut runs: Vec<Range<usize>> = Vec::new();
                for key in keys {
                    let run = self.lower_bound(key)..self.upper_bound(key);
                    if run.is_empty() {
                        continue;
                    }
                    match runs.last_mut() {
                        Some(last) if last.end == run.start => last.end = run.end,
                        _ => runs.push(run),
                    }
                }
                runs
            }
        }
    }

    fn lower_bound(&self, key: &K) -> usize {
        self.entries.partition_point(|(k, _)| k < key)
    }

    fn upper_bound(&self, key: &K) -> usize {
        self.entries.partition_point(|(k, _)| k <= key)
    }
}

fn full_run(len: usize) -> Vec<Range<usize>> {
    non_empty(0..len)
}

fn non_empty(run: Range<usize>) -> Vec<Range<usize>> {
    if run.is_empty() { Vec::new() } else { vec![run] }
}

fn covers(runs: &[Range<usize>], pos: usize) -> bool {
    let i = runs.partition_point(|r| r.end <= pos);
    i < runs.len() && runs[i].start <= pos
}

/// Splits two sorted, disjoint run lists into `(new - old, old - new)`.
fn diff_runs(old: &[Range<usize>], new: &[Range<usize>]) -> (Vec<Range<usize>>, Vec<Range<usize>>) {
    let mut bounds: Vec<usize> = old
        .iter()
        .chain(new)
        .flat_map(|r| [r.start, r.end])
        .collect();
    bounds.sort_unstable();
    bounds.dedup();

    let mut added: Vec<Range<usize>> = Vec::new();
    let mut removed: Vec<Range<usize>> = Vec::new();
    for pair in bounds.windows(2) {
        let segment = pair[0]..pair[1];
        match (covers(old, segment.start), covers(new, segment.start)) {
            (false, true) => push_run(&mut added, segment),
            (true, false) => push_run(&mut removed, segment),
            _ => {}
        }
    }
    (added, removed)
}

fn push_run(runs: &mut Vec<Range<usize>>, run: Range<usize>) {
    match runs.last_mut() {
        Some(last) if last.end == run.start => last.end = run.end,
        _ => runs.push(run),
    }
}
