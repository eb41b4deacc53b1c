use crate::dimension::{Dimension, RecordId};
use crate::error::{DashboardError, Result};
use crate::reducer::Reducer;
use crate::structs::Record;
use std::any::Any;

/// Running aggregates of one dimension, one accumulator per distinct group
/// key. Group keys are the dimension's keys passed through a projection, so
/// several dimension keys may share one accumulator.
///
/// Every key keeps an entry, including keys with no live record, whose
/// accumulator is then reset to exactly `reducer.initial()`.
pub struct Group<K, R: Reducer> {
    name: String,
    dimension: usize,
    keys: Vec<K>,
    slots: Vec<usize>,
    values: Vec<R::Value>,
    live: Vec<usize>,
    members: Vec<bool>,
    reducer: R,
}

impl<K, R> Group<K, R>
where
    K: Ord + Clone + Send + Sync,
    R: Reducer,
{
    /// Seeds the group by adding every record accepted by `live`, in
    /// ascending dimension key order. `project` maps a dimension key to its
    /// group key.
    pub fn new<D>(
        name: impl Into<String>,
        dimension_id: usize,
        dimension: &Dimension<D>,
        project: impl Fn(&D) -> K,
        reducer: R,
        records: &[Record],
        live: impl Fn(RecordId) -> bool,
    ) -> Self
    where
        D: Ord + Clone + Send + Sync,
    {
        let projected: Vec<K> = dimension.keys().iter().map(project).collect();
        let mut keys = projected.clone();
        keys.sort();
        keys.dedup();
        let remap: Vec<usize> = projected
            .iter()
            .map(|key| keys.binary_search(key).unwrap_or_else(|pos| pos))
            .collect();

        let slots: Vec<usize> = (0..records.len())
            .map(|id| remap[dimension.slot_of(id)])
            .collect();
        let values = keys.iter().map(|_| reducer.initial()).collect();
        let mut group = Self {
            name: name.into(),
            dimension: dimension_id,
            live: vec![0; keys.len()],
            keys,
            slots,
            values,
            members: vec![false; records.len()],
            reducer,
        };
        for id in dimension.ascending().filter(|&id| live(id)) {
            let slot = group.slots[id];
            group.reducer.add(&mut group.values[slot], &records[id]);
            group.live[slot] += 1;
            group.members[id] = true;
        }
        group
    }

    /// Number of keys, empty ones included.
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    /// `(key, accumulator)` pairs in ascending key order.
    pub fn all(&self) -> Vec<(K, R::Value)> {
        self.keys
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    pub fn get(&self, key: &K) -> Option<&R::Value> {
        self.keys
            .binary_search(key)
            .ok()
            .map(|slot| &self.values[slot])
    }

    /// Rebuilds the aggregates from scratch for the records accepted by
    /// `live`, leaving the running state untouched.
    pub fn recompute(
        &self,
        ascending: impl Iterator<Item = RecordId>,
        records: &[Record],
        live: impl Fn(RecordId) -> bool,
    ) -> Vec<(K, R::Value)> {
        let mut values: Vec<R::Value> = self.keys.iter().map(|_| self.reducer.initial()).collect();
        for id in ascending.filter(|&id| live(id)) {
            self.reducer.add(&mut values[self.slots[id]], &records[id]);
        }
        self.keys.iter().cloned().zip(values).collect()
    }

    fn add_record(&mut self, id: RecordId, record: &Record) -> Result<()> {
        if self.members[id] {
            return Err(DashboardError::InvariantViolation(format!(
                "group '{}': record {} added twice",
                self.name, id
            )));
        }
        self.members[id] = true;
        let slot = self.slots[id];
        self.reducer.add(&mut self.values[slot], record);
        self.live[slot] += 1;
        Ok(())
    }

    fn remove_record(&mut self, id: RecordId, record: &Record) -> Result<()> {
        if !self.members[id] {
            return Err(DashboardError::InvariantViolation(format!(
                "group '{}': record {} removed without being added",
                self.name, id
            )));
        }
        self.members[id] = false;
        let slot = self.slots[id];
        self.live[slot] -= 1;
        if self.live[slot] == 0 {
            // float drift must not leave an emptied key off its initial value
            self.values[slot] = self.reducer.initial();
        } else {
            self.reducer.remove(&mut self.values[slot], record);
        }
        Ok(())
    }
}

/// Type-erased view of a group, as driven by the filter coordinator.
pub(crate) trait GroupSlot {
    fn dimension(&self) -> usize;
    fn is_member(&self, id: RecordId) -> bool;
    fn add(&mut self, id: RecordId, record: &Record) -> Result<()>;
    fn remove(&mut self, id: RecordId, record: &Record) -> Result<()>;
    fn as_any(&self) -> &dyn Any;
}

impl<K, R> GroupSlot for Group<K, R>
where
    K: Ord + Clone + Send + Sync + 'static,
    R: Reducer + 'static,
    R::Value: 'static,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_member(&self, id: RecordId) -> bool {
        self.members[id]
    }

    fn add(&mut self, id: RecordId, record: &Record) -> Result<()> {
        self.add_record(id, record)
    }

    fn remove(&mut self, id: RecordId, record: &Record) -> Result<()> {
        self.remove_record(id, record)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::{Average, Count, Sum, reduce};
    use crate::test_utils::{reading, temperatures};

    #[test]
    fn test_group_seeds_every_key() {
        let records = vec![
            reading("2015/01/01 00:00", 1.0, 0.0, 10.0, 0.0),
            reading("2015/01/01 00:30", 1.0, 0.0, 20.0, 0.0),
            reading("2015/01/01 01:00", 1.0, 0.0, 200.0, 0.0),
        ];
        let dim = Dimension::new("wind", &records, |r| r.wind_bucket);
        let group = Group::new("counts", 0, &dim, |k| *k, Count, &records, |id| id != 2);
        assert_eq!(group.all(), vec![(0, 2), (4, 0)]);
        assert_eq!(group.size(), 2);
        assert_eq!(group.get(&4), Some(&0));
        assert_eq!(group.get(&5), None);
    }

    #[test]
    fn test_average_group_add_remove() {
        let records = temperatures(&[10.0, 20.0, 30.0]);
        let dim = Dimension::new("day", &records, |r| r.day);
        let mut group =
            Group::new("temp", 0, &dim, |k| *k, Average::of("surfTemp"), &records, |_| true);
        let day = records[0].day;
        assert_eq!(group.get(&day).map(|v| v.avg), Some(20.0));

        group.remove_record(2, &records[2]).unwrap();
        assert_eq!(group.get(&day).map(|v| v.avg), Some(15.0));
        assert_eq!(group.get(&day).map(|v| v.count), Some(2));
    }

    #[test]
    fn test_pairing_is_enforced() {
        let records = temperatures(&[10.0]);
        let dim = Dimension::new("day", &records, |r| r.day);
        let mut group = Group::new("count", 0, &dim, |k| *k, Count, &records, |_| true);

        let err = group.add_record(0, &records[0]).unwrap_err();
        assert!(matches!(err, DashboardError::InvariantViolation(_)));

        group.remove_record(0, &records[0]).unwrap();
        let err = group.remove_record(0, &records[0]).unwrap_err();
        assert!(matches!(err, DashboardError::InvariantViolation(_)));
    }

    #[test]
    fn test_recompute_matches_running_state() {
        let records = temperatures(&[3.0, 4.0, 5.0, 6.0]);
        let dim = Dimension::new("temp", &records, |r| r.value("surfTemp") as i64);
        let mut group = Group::new("count", 0, &dim, |k| *k, Count, &records, |_| true);
        group.remove_record(1, &records[1]).unwrap();
        group.remove_record(3, &records[3]).unwrap();

        let batch = group.recompute(dim.ascending(), &records, |id| id % 2 == 0);
        assert_eq!(batch, group.all());
        assert_eq!(batch, vec![(3, 1), (4, 0), (5, 1), (6, 0)]);
    }

    #[test]
    fn test_emptied_sum_returns_to_initial() {
        let records = vec![
            reading("2015/01/01 00:00", 1.0, 0.1, 10.0, 0.0),
            reading("2015/01/01 00:30", 1.0, 0.2, 20.0, 0.0),
            reading("2015/01/01 01:00", 1.0, 0.7, 20.0, 0.0),
        ];
        let dim = Dimension::new("wind", &records, |r| r.wind_bucket);
        let mut group =
            Group::new("rain", 0, &dim, |k| *k, Sum::of("rainfall"), &records, |_| true);

        group.remove_record(0, &records[0]).unwrap();
        group.remove_record(1, &records[1]).unwrap();
        assert!(group.get(&0).is_some_and(|v| (v - 0.7).abs() < 1e-12));
        group.remove_record(2, &records[2]).unwrap();
        assert_eq!(group.get(&0), Some(&0.0));
        assert_eq!(group.all(), group.recompute(dim.ascending(), &records, |_| false));

        group.add_record(1, &records[1]).unwrap();
        assert_eq!(group.get(&0), Some(&0.2));
    }

    #[test]
    fn test_emptied_custom_value_returns_to_initial() {
        let records = temperatures(&[0.1, 0.2]);
        let dim = Dimension::new("day", &records, |r| r.day);
        let product = reduce(
            |acc: &mut f64, r: &Record| *acc *= 1.0 + r.value("surfTemp"),
            |acc: &mut f64, r: &Record| *acc /= 1.0 + r.value("surfTemp"),
            || 1.0,
        );
        let mut group = Group::new("growth", 0, &dim, |k| *k, product, &records, |_| true);
        let day = records[0].day;
        group.remove_record(0, &records[0]).unwrap();
        group.remove_record(1, &records[1]).unwrap();
        assert_eq!(group.get(&day), Some(&1.0));
    }

    #[test]
    fn test_projected_keys_share_a_slot() {
        let records = vec![
            reading("2015/03/01 00:00", 1.0, 0.5, 0.0, 0.0),
            reading("2015/03/02 00:00", 1.0, 1.0, 0.0, 0.0),
            reading("2015/03/08 00:00", 1.0, 2.0, 0.0, 0.0),
        ];
        let dim = Dimension::new("day", &records, |r| r.day);
        let mut group = Group::new(
            "weekly rain",
            0,
            &dim,
            |day| crate::transform::week_index(*day),
            Sum::of("rainfall"),
            &records,
            |_| true,
        );
        let weeks: Vec<i32> = records.iter().map(|r| r.week).collect();
        assert_eq!(weeks[0], weeks[1]);
        assert_eq!(group.all(), vec![(weeks[0], 1.5), (weeks[2], 2.0)]);

        group.remove_record(2, &records[2]).unwrap();
        assert_eq!(group.get(&weeks[2]), Some(&0.0));
        assert!(group.is_member(0));
        assert!(!group.is_member(2));
    }
}
