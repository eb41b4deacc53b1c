use crate::structs::Record;
use serde::{Deserialize, Serialize};

/// Defines how an accumulator reacts to a record entering or leaving the
/// live set.
///
/// Implementations must satisfy `remove(add(acc, r), r) == acc` for any
/// accumulator built without prior removal.
pub trait Reducer {
    type Value: Clone;

    fn initial(&self) -> Self::Value;
    fn add(&self, acc: &mut Self::Value, record: &Record);
    fn remove(&self, acc: &mut Self::Value, record: &Record);
}

/// Number of live records per key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

impl Reducer for Count {
    type Value = u64;

    fn initial(&self) -> u64 {
        0
    }

    fn add(&self, acc: &mut u64, _record: &Record) {
        *acc += 1;
    }

    fn remove(&self, acc: &mut u64, _record: &Record) {
        *acc -= 1;
    }
}

/// Sum of one sensor column. Missing values count as zero.
#[derive(Debug, Clone)]
pub struct Sum {
    field: String,
}

impl Sum {
    pub fn of(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Reducer for Sum {
    type Value = f64;

    fn initial(&self) -> f64 {
        0.0
    }

    fn add(&self, acc: &mut f64, record: &Record) {
        *acc += record.value(&self.field);
    }

    fn remove(&self, acc: &mut f64, record: &Record) {
        *acc -= record.value(&self.field);
    }
}

/// Running totals behind an average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageValue {
    pub count: u64,
    pub total: f64,
    pub avg: f64,
}

impl AverageValue {
    fn refresh(&mut self) {
        self.avg = if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        };
    }
}

/// Mean of one sensor column.
///
/// The mean is always recomputed from `total / count`, never by averaging
/// averages, so removal is exact.
#[derive(Debug, Clone)]
pub struct Average {
    field: String,
}

impl Average {
    pub fn of(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Reducer for Average {
    type Value = AverageValue;

    fn initial(&self) -> AverageValue {
        AverageValue::default()
    }

    fn add(&self, acc: &mut AverageValue, record: &Record) {
        acc.count += 1;
        acc.total += record.value(&self.field);
        acc.refresh();
    }

    fn remove(&self, acc: &mut AverageValue, record: &Record) {
        acc.count -= 1;
        acc.total -= record.value(&self.field);
        if acc.count == 0 {
            acc.total = 0.0;
        }
        acc.refresh();
    }
}

/// Reducer assembled from three closures.
pub struct Custom<I, A, R> {
    initial: I,
    add: A,
    remove: R,
}

/// Builds a reducer from `add`, `remove` and `initial`, in that order.
pub fn reduce<V, I, A, R>(add: A, remove: R, initial: I) -> Custom<I, A, R>
where
    V: Clone,
    I: Fn() -> V,
    A: Fn(&mut V, &Record),
    R: Fn(&mut V, &Record),
{
    Custom {
        initial,
        add,
        remove,
    }
}

impl<V, I, A, R> Reducer for Custom<I, A, R>
where
    V: Clone,
    I: Fn() -> V,
    A: Fn(&mut V, &Record),
    R: Fn(&mut V, &Record),
{
    type Value = V;

    fn initial(&self) -> V {
        (self.initial)()
    }

    fn add(&self, acc: &mut V, record: &Record) {
        (self.add)(acc, record)
    }

    fn remove(&self, acc: &mut V, record: &Record) {
        (self.remove)(acc, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temperatures;

    #[test]
    fn test_average_recomputes_from_totals() {
        let records = temperatures(&[10.0, 20.0, 30.0]);
        let reducer = Average::of("surfTemp");
        let mut acc = reducer.initial();
        for r in &records {
            reducer.add(&mut acc, r);
        }
        assert_eq!(acc.count, 3);
        assert_eq!(acc.avg, 20.0);

        reducer.remove(&mut acc, &records[2]);
        assert_eq!(acc.count, 2);
        assert_eq!(acc.avg, 15.0);
    }

    #[test]
    fn test_average_empties_back_to_initial() {
        let records = temperatures(&[12.5]);
        let reducer = Average::of("surfTemp");
        let mut acc = reducer.initial();
        reducer.add(&mut acc, &records[0]);
        reducer.remove(&mut acc, &records[0]);
        assert_eq!(acc, reducer.initial());
    }

    #[test]
    fn test_count_and_sum_pairing() {
        let records = temperatures(&[1.5, 2.5]);
        let sum = Sum::of("surfTemp");
        let mut total = sum.initial();
        sum.add(&mut total, &records[0]);
        sum.add(&mut total, &records[1]);
        assert_eq!(total, 4.0);
        sum.remove(&mut total, &records[1]);
        assert_eq!(total, 1.5);

        let mut n = Count.initial();
        Count.add(&mut n, &records[0]);
        Count.remove(&mut n, &records[0]);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_missing_field_sums_as_zero() {
        let records = temperatures(&[3.0]);
        let sum = Sum::of("battery");
        let mut total = sum.initial();
        sum.add(&mut total, &records[0]);
        assert_eq!(total, 0.0);
    }

    #[test]
    fn test_custom_reducer() {
        let records = temperatures(&[5.0, 9.0]);
        let seen = reduce(
            |acc: &mut Vec<f64>, r: &Record| acc.push(r.value("surfTemp")),
            |acc: &mut Vec<f64>, r: &Record| {
                if let Some(pos) = acc.iter().position(|v| *v == r.value("surfTemp")) {
                    acc.remove(pos);
                }
            },
            Vec::new,
        );
        let mut acc = seen.initial();
        seen.add(&mut acc, &records[0]);
        seen.add(&mut acc, &records[1]);
        seen.remove(&mut acc, &records[0]);
        assert_eq!(acc, vec![9.0]);
    }
}
