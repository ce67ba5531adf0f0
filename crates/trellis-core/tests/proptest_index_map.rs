//! Property tests for index-map provenance under arbitrary array mutation.
//!
//! After any mutation sequence on a tracked array that started as
//! `[0, 1, .., n-1]`:
//!
//! 1. Surviving entries plus deleted indices partition `0..n`.
//! 2. Every surviving slot holds the element that was at its origin.
//! 3. Every deleted item is the element that was at its deleted index.

use std::rc::{Rc, Weak};

use proptest::prelude::*;
use trellis_core::{ArrayRef, CollectionSink, NEW_ITEM, Value};

struct NullSink;

impl CollectionSink for NullSink {
    fn collection_changed(&self) {}
}

#[derive(Debug, Clone)]
enum Op {
    Push,
    Pop,
    Shift,
    Unshift(usize),
    Splice(isize, Option<usize>, usize),
    Set(usize),
    Reverse,
    Sort,
    Clear,
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Push),
        Just(Op::Pop),
        Just(Op::Shift),
        (0usize..3).prop_map(Op::Unshift),
        (-6isize..8, proptest::option::of(0usize..4), 0usize..3)
            .prop_map(|(s, d, i)| Op::Splice(s, d, i)),
        (0usize..10).prop_map(Op::Set),
        Just(Op::Reverse),
        Just(Op::Sort),
        Just(Op::Clear),
    ]
}

/// Fresh values are strings so they never collide with the numeric seeds.
fn fresh(counter: &mut u32) -> Value {
    *counter += 1;
    Value::from(format!("new{counter}"))
}

fn apply(array: &ArrayRef, op: &Op, counter: &mut u32) {
    match op {
        Op::Push => {
            array.push(fresh(counter));
        }
        Op::Pop => {
            array.pop();
        }
        Op::Shift => {
            array.shift();
        }
        Op::Unshift(n) => {
            let values = (0..*n).map(|_| fresh(counter)).collect();
            array.unshift(values);
        }
        Op::Splice(start, delete, insert) => {
            let values = (0..*insert).map(|_| fresh(counter)).collect();
            array.splice(*start, *delete, values);
        }
        Op::Set(index) => array.set(*index, fresh(counter)),
        Op::Reverse => array.reverse(),
        Op::Sort => array.sort_by(|a, b| b.to_display_string().cmp(&a.to_display_string())),
        Op::Clear => array.clear(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Provenance invariants
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn index_map_partitions_original_indices(
        n in 0usize..8,
        ops in proptest::collection::vec(op_strategy(), 0..12),
    ) {
        let original: Vec<Value> = (0..n).map(|i| Value::from(i as f64)).collect();
        let array = ArrayRef::from_vec(original.clone());
        let sink: Rc<dyn CollectionSink> = Rc::new(NullSink);
        let weak: Weak<dyn CollectionSink> = Rc::downgrade(&sink);
        array.start_tracking(weak);

        let mut counter = 0;
        for op in &ops {
            apply(&array, op, &mut counter);
        }

        let map = array.take_index_map().expect("tracked");
        let current = array.to_vec();
        prop_assert_eq!(map.len(), current.len());

        let mut seen: Vec<i32> = map.entries().iter().copied().filter(|&e| e >= 0).collect();
        seen.extend_from_slice(map.deleted_indices());
        seen.sort_unstable();
        let expected: Vec<i32> = (0..n as i32).collect();
        prop_assert_eq!(seen, expected);

        for (slot, &origin) in map.entries().iter().enumerate() {
            if origin == NEW_ITEM {
                continue;
            }
            prop_assert!(current[slot].strict_eq(&original[origin as usize]));
        }
        for (item, &origin) in map.deleted_items().iter().zip(map.deleted_indices()) {
            prop_assert!(item.strict_eq(&original[origin as usize]));
        }
    }

    #[test]
    fn take_resets_to_identity(n in 0usize..6, pushes in 0usize..4) {
        let array = ArrayRef::from_vec((0..n).map(|i| Value::from(i as f64)).collect());
        let sink: Rc<dyn CollectionSink> = Rc::new(NullSink);
        array.start_tracking(Rc::downgrade(&sink));
        let mut counter = 0;
        for _ in 0..pushes {
            array.push(fresh(&mut counter));
        }
        let _ = array.take_index_map();
        let again = array.take_index_map().expect("tracked");
        prop_assert!(again.is_identity());
        prop_assert_eq!(again.len(), n + pushes);
    }
}
