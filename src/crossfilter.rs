use crate::dimension::{Delta, Dimension, Filter, RecordId};
use crate::error::{DashboardError, Result};
use crate::group::{Group, GroupSlot};
use crate::reducer::Reducer;
use crate::structs::Record;
use log::debug;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One bit per dimension in the per-record exclusion mask.
pub const MAX_DIMENSIONS: usize = 64;

static NEXT_SESSION: AtomicUsize = AtomicUsize::new(1);

/// Typed reference to a dimension registered in a [`Crossfilter`].
pub struct DimensionHandle<K> {
    session: usize,
    id: usize,
    _key: PhantomData<fn() -> K>,
}

impl<K> Clone for DimensionHandle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for DimensionHandle<K> {}

impl<K> fmt::Debug for DimensionHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DimensionHandle({}#{})", self.session, self.id)
    }
}

/// Typed reference to a group registered in a [`Crossfilter`].
pub struct GroupHandle<K, R> {
    session: usize,
    id: usize,
    _marker: PhantomData<fn() -> (K, R)>,
}

impl<K, R> Clone for GroupHandle<K, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, R> Copy for GroupHandle<K, R> {}

impl<K, R> fmt::Debug for GroupHandle<K, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupHandle({}#{})", self.session, self.id)
    }
}

/// Work done by one filter change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Records newly selected by the dimension's own filter.
    pub added: usize,
    /// Records newly excluded by the dimension's own filter.
    pub removed: usize,
    /// Reducer `add`/`remove` invocations across all affected groups.
    pub reducer_calls: usize,
}

/// Type-erased dimension, as owned by the session.
trait DimensionSlot {
    fn name(&self) -> &str;
    fn is_filtered(&self) -> bool;
    fn order(&self) -> Box<dyn Iterator<Item = RecordId> + '_>;
    fn plan_clear(&self) -> (Vec<Range<usize>>, Delta);
    fn commit_clear(&mut self, selection: Vec<Range<usize>>);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<K> DimensionSlot for Dimension<K>
where
    K: Ord + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        Dimension::name(self)
    }

    fn is_filtered(&self) -> bool {
        self.filter().is_some()
    }

    fn order(&self) -> Box<dyn Iterator<Item = RecordId> + '_> {
        Box::new(self.ascending())
    }

    fn plan_clear(&self) -> (Vec<Range<usize>>, Delta) {
        self.plan(None)
    }

    fn commit_clear(&mut self, selection: Vec<Range<usize>>) {
        self.commit(selection, None)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The aggregation session: record store, dimensions, groups and the filter
/// coordinator that keeps them consistent.
///
/// Each record carries a bitmask of the dimensions whose filter excludes it.
/// A record is live for a group when no dimension other than the group's own
/// excludes it, so every chart shows the world filtered by every filter
/// except its own.
pub struct Crossfilter {
    id: usize,
    records: Vec<Record>,
    masks: Vec<u64>,
    dimensions: Vec<Box<dyn DimensionSlot>>,
    groups: Vec<Box<dyn GroupSlot>>,
    listeners: Vec<Box<dyn FnMut()>>,
}

impl fmt::Debug for Crossfilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crossfilter")
            .field("id", &self.id)
            .field("records", &self.records.len())
            .field(
                "dimensions",
                &self.dimensions.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl Crossfilter {
    pub fn new(records: Vec<Record>) -> Self {
        let masks = vec![0; records.len()];
        Self {
            id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            records,
            masks,
            dimensions: Vec::new(),
            groups: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Total number of records, filtered or not.
    pub fn size(&self) -> usize {
        self.records.len()
    }

    /// Number of records passing every active filter.
    pub fn live_count(&self) -> usize {
        self.masks.iter().filter(|m| **m == 0).count()
    }

    /// Registers a dimension keyed by `key_fn`, which must be pure and total.
    pub fn dimension<K, F>(&mut self, name: &str, key_fn: F) -> Result<DimensionHandle<K>>
    where
        K: Ord + Clone + Send + Sync + 'static,
        F: Fn(&Record) -> K + Sync,
    {
        if self.dimensions.len() >= MAX_DIMENSIONS {
            return Err(DashboardError::InvariantViolation(format!(
                "cannot register dimension '{}': limit of {} reached",
                name, MAX_DIMENSIONS
            )));
        }
        let dimension = Dimension::new(name, &self.records, key_fn);
        self.dimensions.push(Box::new(dimension));
        Ok(DimensionHandle {
            session: self.id,
            id: self.dimensions.len() - 1,
            _key: PhantomData,
        })
    }

    /// Registers a group keyed by the dimension's own keys, seeded with every
    /// record live for it.
    pub fn group<K, R>(
        &mut self,
        name: &str,
        dimension: &DimensionHandle<K>,
        reducer: R,
    ) -> Result<GroupHandle<K, R>>
    where
        K: Ord + Clone + Send + Sync + 'static,
        R: Reducer + 'static,
        R::Value: 'static,
    {
        self.group_by(name, dimension, |key: &K| key.clone(), reducer)
    }

    /// Registers a group on `dimension` whose keys are the dimension's keys
    /// mapped through `project`, e.g. days bucketed into weeks.
    ///
    /// The group still belongs to `dimension`: that dimension's filter never
    /// changes it.
    pub fn group_by<D, K, R, P>(
        &mut self,
        name: &str,
        dimension: &DimensionHandle<D>,
        project: P,
        reducer: R,
    ) -> Result<GroupHandle<K, R>>
    where
        D: Ord + Clone + Send + Sync + 'static,
        K: Ord + Clone + Send + Sync + 'static,
        R: Reducer + 'static,
        R::Value: 'static,
        P: Fn(&D) -> K,
    {
        let dim = self.dimension_ref(dimension)?;
        let ignore = 1u64 << dimension.id;
        let masks = &self.masks;
        let group = Group::new(name, dimension.id, dim, project, reducer, &self.records, |id| {
            masks[id] & !ignore == 0
        });
        debug!(
            "Group '{}' on dimension '{}' seeded over {} keys",
            name,
            dim.name(),
            group.size()
        );
        self.groups.push(Box::new(group));
        Ok(GroupHandle {
            session: self.id,
            id: self.groups.len() - 1,
            _marker: PhantomData,
        })
    }

    /// Replaces the filter of `dimension`; `None` clears it.
    ///
    /// All groups are consistent and listeners have been notified by the time
    /// this returns. The work done is proportional to the records changing
    /// side, not to the dataset size.
    ///
    /// The change is checked against every group before anything is applied,
    /// so an error leaves the session exactly as it was.
    pub fn set_filter<K>(
        &mut self,
        dimension: &DimensionHandle<K>,
        filter: Option<Filter<K>>,
    ) -> Result<FilterStats>
    where
        K: Ord + Clone + Send + Sync + 'static,
    {
        let (selection, delta) = self.dimension_ref(dimension)?.plan(filter.as_ref());
        self.check_pairing(dimension.id, &delta)?;
        self.dimension_mut(dimension)?.commit(selection, filter);
        self.propagate(dimension.id, delta)
    }

    /// Clears every active filter, one change (and event) per dimension.
    pub fn filter_all(&mut self) -> Result<()> {
        for id in 0..self.dimensions.len() {
            if self.dimensions[id].is_filtered() {
                let (selection, delta) = self.dimensions[id].plan_clear();
                self.check_pairing(id, &delta)?;
                self.dimensions[id].commit_clear(selection);
                self.propagate(id, delta)?;
            }
        }
        Ok(())
    }

    /// Current filter of `dimension`.
    pub fn filter<K>(&self, dimension: &DimensionHandle<K>) -> Result<Option<&Filter<K>>>
    where
        K: Ord + Clone + Send + Sync + 'static,
    {
        Ok(self.dimension_ref(dimension)?.filter())
    }

    /// Up to `n` records passing every filter, highest key first.
    pub fn top<K>(&self, dimension: &DimensionHandle<K>, n: usize) -> Result<Vec<&Record>>
    where
        K: Ord + Clone + Send + Sync + 'static,
    {
        let dim = self.dimension_ref(dimension)?;
        Ok(dim
            .ascending()
            .rev()
            .filter(|&id| self.masks[id] == 0)
            .take(n)
            .map(|id| &self.records[id])
            .collect())
    }

    /// Up to `n` records passing every filter, lowest key first.
    pub fn bottom<K>(&self, dimension: &DimensionHandle<K>, n: usize) -> Result<Vec<&Record>>
    where
        K: Ord + Clone + Send + Sync + 'static,
    {
        let dim = self.dimension_ref(dimension)?;
        Ok(dim
            .ascending()
            .filter(|&id| self.masks[id] == 0)
            .take(n)
            .map(|id| &self.records[id])
            .collect())
    }

    /// `(key, accumulator)` pairs of a group in ascending key order.
    pub fn all<K, R>(&self, group: &GroupHandle<K, R>) -> Result<Vec<(K, R::Value)>>
    where
        K: Ord + Clone + Send + Sync + 'static,
        R: Reducer + 'static,
        R::Value: 'static,
    {
        Ok(self.group_ref(group)?.all())
    }

    /// Accumulator of a single key, `None` if the key never occurs.
    pub fn value<K, R>(&self, group: &GroupHandle<K, R>, key: &K) -> Result<Option<R::Value>>
    where
        K: Ord + Clone + Send + Sync + 'static,
        R: Reducer + 'static,
        R::Value: 'static,
    {
        Ok(self.group_ref(group)?.get(key).cloned())
    }

    /// Rebuilds a group from scratch against the current filters, without
    /// touching its running state.
    pub fn recompute<K, R>(&self, group: &GroupHandle<K, R>) -> Result<Vec<(K, R::Value)>>
    where
        K: Ord + Clone + Send + Sync + 'static,
        R: Reducer + 'static,
        R::Value: 'static,
    {
        let typed = self.group_ref(group)?;
        let dim_id = self.groups[group.id].dimension();
        let order = self
            .dimensions
            .get(dim_id)
            .ok_or_else(|| unregistered("dimension", dim_id))?
            .order();
        let ignore = 1u64 << dim_id;
        Ok(typed.recompute(order, &self.records, |id| {
            self.masks[id] & !ignore == 0
        }))
    }

    /// Subscribes to the "filtered" notification, fired once per completed
    /// filter change. Listeners re-read groups to refresh their view.
    pub fn on_filtered(&mut self, listener: impl FnMut() + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Fails if `delta` would remove a record a group never added, or add
    /// one it already holds.
    fn check_pairing(&self, dimension: usize, delta: &Delta) -> Result<()> {
        let bit = 1u64 << dimension;
        for (index, group) in self.groups.iter().enumerate() {
            if group.dimension() == dimension {
                continue;
            }
            let ignore = bit | (1u64 << group.dimension());
            let live = |id: RecordId| self.masks[id] & !ignore == 0;
            let unpaired = delta
                .removed
                .iter()
                .find(|&&id| live(id) && !group.is_member(id));
            if let Some(id) = unpaired {
                return Err(DashboardError::InvariantViolation(format!(
                    "group #{}: record {} would be removed without being added",
                    index, id
                )));
            }
            let doubled = delta
                .added
                .iter()
                .find(|&&id| live(id) && group.is_member(id));
            if let Some(id) = doubled {
                return Err(DashboardError::InvariantViolation(format!(
                    "group #{}: record {} would be added twice",
                    index, id
                )));
            }
        }
        Ok(())
    }

    fn propagate(&mut self, dimension: usize, delta: Delta) -> Result<FilterStats> {
        let bit = 1u64 << dimension;
        let mut stats = FilterStats {
            added: delta.added.len(),
            removed: delta.removed.len(),
            reducer_calls: 0,
        };

        for group in self.groups.iter_mut().filter(|g| g.dimension() != dimension) {
            let ignore = bit | (1u64 << group.dimension());
            for &id in &delta.removed {
                if self.masks[id] & !ignore == 0 {
                    group.remove(id, &self.records[id])?;
                    stats.reducer_calls += 1;
                }
            }
            for &id in &delta.added {
                if self.masks[id] & !ignore == 0 {
                    group.add(id, &self.records[id])?;
                    stats.reducer_calls += 1;
                }
            }
        }

        for &id in &delta.removed {
            self.masks[id] |= bit;
        }
        for &id in &delta.added {
            self.masks[id] &= !bit;
        }

        debug!(
            "Filter on '{}': +{} -{} records, {} reducer calls",
            self.dimensions[dimension].name(),
            stats.added,
            stats.removed,
            stats.reducer_calls
        );
        for listener in self.listeners.iter_mut() {
            listener();
        }
        Ok(stats)
    }

    fn check_session(&self, session: usize) -> Result<()> {
        if session != self.id {
            return Err(DashboardError::InvariantViolation(format!(
                "handle from session {} used with session {}",
                session, self.id
            )));
        }
        Ok(())
    }

    fn dimension_ref<K>(&self, handle: &DimensionHandle<K>) -> Result<&Dimension<K>>
    where
        K: Ord + Clone + Send + Sync + 'static,
    {
        self.check_session(handle.session)?;
        self.dimensions
            .get(handle.id)
            .and_then(|d| d.as_any().downcast_ref::<Dimension<K>>())
            .ok_or_else(|| unregistered("dimension", handle.id))
    }

    fn dimension_mut<K>(&mut self, handle: &DimensionHandle<K>) -> Result<&mut Dimension<K>>
    where
        K: Ord + Clone + Send + Sync + 'static,
    {
        self.check_session(handle.session)?;
        self.dimensions
            .get_mut(handle.id)
            .and_then(|d| d.as_any_mut().downcast_mut::<Dimension<K>>())
            .ok_or_else(|| unregistered("dimension", handle.id))
    }

    fn group_ref<K, R>(&self, handle: &GroupHandle<K, R>) -> Result<&Group<K, R>>
    where
        K: Ord + Clone + Send + Sync + 'static,
        R: Reducer + 'static,
        R::Value: 'static,
    {
        self.check_session(handle.session)?;
        self.groups
            .get(handle.id)
            .and_then(|g| g.as_any().downcast_ref::<Group<K, R>>())
            .ok_or_else(|| unregistered("group", handle.id))
    }
}

fn unregistered(kind: &str, id: usize) -> DashboardError {
    DashboardError::InvariantViolation(format!("unregistered {} #{}", kind, id))
}
