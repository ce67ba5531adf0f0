#![forbid(unsafe_code)]

//! Index-tracking sort.
//!
//! Values and their index-map entries are permuted together, so the index
//! map always describes the same permutation as the values. Quicksort with
//! a median-of-three pivot, handing off to insertion sort below
//! [`INSERTION_CUTOFF`] elements. Ties are broken however the partition
//! happens to leave them, identically for both arrays.

use std::cmp::Ordering;

use crate::value::Value;

const INSERTION_CUTOFF: usize = 10;

/// Default element ordering: `undefined` last, everything else by display
/// string.
#[must_use]
pub fn default_compare(a: &Value, b: &Value) -> Ordering {
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.to_display_string().cmp(&b.to_display_string()),
    }
}

/// Sort `values` in place, applying the same moves to `indices` when given.
pub(crate) fn sort_tracked(
    values: &mut [Value],
    mut indices: Option<&mut [i32]>,
    compare: &dyn Fn(&Value, &Value) -> Ordering,
) {
    // `undefined` always sorts to the end without consulting the comparator.
    let mut defined = 0;
    for i in 0..values.len() {
        if !values[i].is_undefined() {
            rotate_into(values, indices.as_deref_mut(), defined, i);
            defined += 1;
        }
    }
    let (values, _) = values.split_at_mut(defined);
    let indices = indices.map(|idx| idx.split_at_mut(defined).0);
    quick_sort(values, indices, compare);
}

/// Move element `from` to position `to` (`to <= from`), shifting the run
/// in between right by one. Keeps the relative order of skipped elements.
fn rotate_into(values: &mut [Value], indices: Option<&mut [i32]>, to: usize, from: usize) {
    if to == from {
        return;
    }
    values[to..=from].rotate_right(1);
    if let Some(idx) = indices {
        idx[to..=from].rotate_right(1);
    }
}

fn swap(values: &mut [Value], indices: &mut Option<&mut [i32]>, a: usize, b: usize) {
    values.swap(a, b);
    if let Some(idx) = indices.as_deref_mut() {
        idx.swap(a, b);
    }
}

fn quick_sort(
    values: &mut [Value],
    mut indices: Option<&mut [i32]>,
    compare: &dyn Fn(&Value, &Value) -> Ordering,
) {
    let len = values.len();
    if len <= INSERTION_CUTOFF {
        insertion_sort(values, indices, compare);
        return;
    }
    let split = partition(values, &mut indices, compare) + 1;
    let (left_values, right_values) = values.split_at_mut(split);
    match indices {
        Some(idx) => {
            let (left_idx, right_idx) = idx.split_at_mut(split);
            quick_sort(left_values, Some(left_idx), compare);
            quick_sort(right_values, Some(right_idx), compare);
        }
        None => {
            quick_sort(left_values, None, compare);
            quick_sort(right_values, None, compare);
        }
    }
}

/// Hoare partition around the median of first, middle and last. Returns
/// `j` such that `[..=j]` and `[j + 1..]` are both non-empty.
fn partition(
    values: &mut [Value],
    indices: &mut Option<&mut [i32]>,
    compare: &dyn Fn(&Value, &Value) -> Ordering,
) -> usize {
    let last = values.len() - 1;
    let mid = last / 2;
    if compare(&values[mid], &values[0]) == Ordering::Less {
        swap(values, indices, 0, mid);
    }
    if compare(&values[last], &values[0]) == Ordering::Less {
        swap(values, indices, 0, last);
    }
    if compare(&values[last], &values[mid]) == Ordering::Less {
        swap(values, indices, mid, last);
    }
    let pivot = values[mid].clone();

    let mut i = 0;
    let mut j = last;
    loop {
        while i < last && compare(&values[i], &pivot) == Ordering::Less {
            i += 1;
        }
        while j > 0 && compare(&values[j], &pivot) == Ordering::Greater {
            j -= 1;
        }
        if i >= j {
            // An inconsistent comparator could leave j at the end; keep both
            // halves non-empty so recursion always shrinks.
            return j.min(last - 1);
        }
        swap(values, indices, i, j);
        i += 1;
        j -= 1;
    }
}

fn insertion_sort(
    values: &mut [Value],
    mut indices: Option<&mut [i32]>,
    compare: &dyn Fn(&Value, &Value) -> Ordering,
) {
    for i in 1..values.len() {
        let mut j = i;
        while j > 0 && compare(&values[j - 1], &values[j]) == Ordering::Greater {
            values.swap(j - 1, j);
            if let Some(idx) = indices.as_deref_mut() {
                idx.swap(j - 1, j);
            }
            j -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(v: &[f64]) -> Vec<Value> {
        v.iter().map(|&n| Value::Number(n)).collect()
    }

    fn numeric(a: &Value, b: &Value) -> Ordering {
        a.to_number().total_cmp(&b.to_number())
    }

    #[test]
    fn small_sort_tracks_indices() {
        let mut values = nums(&[3.0, 1.0, 2.0]);
        let mut idx = vec![0, 1, 2];
        sort_tracked(&mut values, Some(&mut idx), &numeric);
        assert_eq!(values, nums(&[1.0, 2.0, 3.0]));
        assert_eq!(idx, vec![1, 2, 0]);
    }

    #[test]
    fn large_sort_keeps_values_and_indices_in_step() {
        let original: Vec<f64> = (0..57).map(|i| f64::from((i * 37) % 23)).collect();
        let mut values = nums(&original);
        let mut idx: Vec<i32> = (0..57).collect();
        sort_tracked(&mut values, Some(&mut idx), &numeric);
        for w in values.windows(2) {
            assert!(w[0].to_number() <= w[1].to_number());
        }
        for (v, &i) in values.iter().zip(&idx) {
            assert_eq!(v.to_number(), original[i as usize]);
        }
    }

    #[test]
    fn undefined_sorts_last() {
        let mut values = vec![Value::Undefined, Value::from("b"), Value::Undefined, Value::from("a")];
        let mut idx = vec![0, 1, 2, 3];
        sort_tracked(&mut values, Some(&mut idx), &default_compare);
        assert_eq!(values[0], Value::from("a"));
        assert_eq!(values[1], Value::from("b"));
        assert!(values[2].is_undefined() && values[3].is_undefined());
        assert_eq!(&idx[..2], &[3, 1]);
    }

    #[test]
    fn default_compare_is_lexicographic() {
        let mut values = nums(&[10.0, 9.0, 1.0]);
        sort_tracked(&mut values, None, &default_compare);
        assert_eq!(values, nums(&[1.0, 10.0, 9.0]));
    }

    #[test]
    fn inconsistent_comparator_terminates() {
        let mut values = nums(&(0..40).map(f64::from).collect::<Vec<_>>());
        sort_tracked(&mut values, None, &|_, _| Ordering::Less);
        assert_eq!(values.len(), 40);
    }
}
