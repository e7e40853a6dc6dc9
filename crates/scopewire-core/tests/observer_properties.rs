//! Property-based tests for observable containers
//!
//! Uses proptest to verify:
//! 1. Mapping mutations match a reference ordered map
//! 2. `set` followed by `get` returns the value, and repeating it is silent
//! 3. Sequence mutations match a reference deque, one event per operation

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexMap;
use proptest::prelude::*;
use scopewire_core::{ChangeEvent, Key, Observer, Value};

#[derive(Debug, Clone)]
enum MapOp {
	Add(String, i32),
	Set(String, i32),
	Del(String),
}

fn map_key() -> impl Strategy<Value = String> {
	prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")].prop_map(str::to_string)
}

fn map_op() -> impl Strategy<Value = MapOp> {
	prop_oneof![
		(map_key(), 0..5i32).prop_map(|(k, v)| MapOp::Add(k, v)),
		(map_key(), 0..5i32).prop_map(|(k, v)| MapOp::Set(k, v)),
		map_key().prop_map(MapOp::Del),
	]
}

#[derive(Debug, Clone)]
enum SeqOp {
	Push(i32),
	Unshift(i32),
	Pop,
	Shift,
	Splice(usize, usize, Vec<i32>),
}

fn seq_op() -> impl Strategy<Value = SeqOp> {
	prop_oneof![
		any::<i32>().prop_map(SeqOp::Push),
		any::<i32>().prop_map(SeqOp::Unshift),
		Just(SeqOp::Pop),
		Just(SeqOp::Shift),
		(0..8usize, 0..4usize, prop::collection::vec(any::<i32>(), 0..3))
			.prop_map(|(start, count, items)| SeqOp::Splice(start, count, items)),
	]
}

fn count_events(observer: &Observer) -> Rc<Cell<usize>> {
	let count = Rc::new(Cell::new(0));
	let sink = count.clone();
	observer.observe(move |_: &ChangeEvent| sink.set(sink.get() + 1));
	count
}

// ============================================================================
// Mapping model
// ============================================================================

proptest! {
	#![proptest_config(ProptestConfig::with_cases(200))]

	/// Property: keys and values after any add/set/del sequence equal the
	/// reference ordered map
	#[test]
	fn test_mapping_matches_reference_model(ops in prop::collection::vec(map_op(), 0..40)) {
		let observer = Observer::mapping();
		let mut model: IndexMap<String, i32> = IndexMap::new();

		for op in ops {
			match op {
				MapOp::Add(k, v) | MapOp::Set(k, v) if model.contains_key(&k) => {
					observer.set(k.as_str(), v);
					model.insert(k, v);
				}
				MapOp::Add(k, v) => {
					observer.add(k.as_str(), v);
					model.insert(k, v);
				}
				MapOp::Set(k, v) => {
					observer.set(k.as_str(), v);
					model.insert(k, v);
				}
				MapOp::Del(k) => {
					observer.del(k.as_str());
					model.shift_remove(&k);
				}
			}
		}

		let expected_keys: Vec<Key> = model.keys().map(Key::from).collect();
		prop_assert_eq!(observer.keys(), expected_keys);
		for (k, v) in &model {
			prop_assert_eq!(observer.get(k.as_str()), Some(Value::from(*v)));
		}
	}

	/// Property: set then get returns the value; an identical second set
	/// emits nothing
	#[test]
	fn test_set_get_and_idempotence(
		initial in prop::option::of(0..100i32),
		value in 0..100i32,
	) {
		let observer = Observer::mapping();
		if let Some(initial) = initial {
			observer.set("k", initial);
		}
		let events = count_events(&observer);

		observer.set("k", value);
		prop_assert_eq!(observer.get("k"), Some(Value::from(value)));

		let after_first = events.get();
		observer.set("k", value);
		prop_assert_eq!(events.get(), after_first);
	}
}

// ============================================================================
// Sequence model
// ============================================================================

proptest! {
	#![proptest_config(ProptestConfig::with_cases(200))]

	/// Property: contents after any push/pop/shift/unshift/splice sequence
	/// equal the reference deque, with one event per structural operation
	#[test]
	fn test_sequence_matches_reference_model(ops in prop::collection::vec(seq_op(), 0..40)) {
		let observer = Observer::sequence();
		let events = count_events(&observer);
		let mut model: VecDeque<i32> = VecDeque::new();
		let mut performed = 0;

		for op in ops {
			match op {
				SeqOp::Push(v) => {
					let len = observer.push(v).unwrap();
					model.push_back(v);
					prop_assert_eq!(len, model.len());
					performed += 1;
				}
				SeqOp::Unshift(v) => {
					let len = observer.unshift(v).unwrap();
					model.push_front(v);
					prop_assert_eq!(len, model.len());
					performed += 1;
				}
				SeqOp::Pop => {
					let popped = observer.pop().unwrap();
					let expected = model.pop_back();
					prop_assert_eq!(popped, expected.map(Value::from));
					performed += usize::from(expected.is_some());
				}
				SeqOp::Shift => {
					let shifted = observer.shift().unwrap();
					let expected = model.pop_front();
					prop_assert_eq!(shifted, expected.map(Value::from));
					performed += usize::from(expected.is_some());
				}
				SeqOp::Splice(start, count, items) => {
					let start_clamped = start.min(model.len());
					let end = (start_clamped + count).min(model.len());
					let expected: Vec<Value> = model
						.drain(start_clamped..end)
						.map(Value::from)
						.collect();
					for (offset, item) in items.iter().enumerate() {
						model.insert(start_clamped + offset, *item);
					}
					let removed = observer
						.splice(start, count, items.into_iter().map(Value::from))
						.unwrap();
					prop_assert_eq!(removed, expected);
					performed += 1;
				}
			}
		}

		let expected: Vec<Value> = model.into_iter().map(Value::from).collect();
		prop_assert_eq!(observer.values(), expected);
		prop_assert_eq!(events.get(), performed);
	}
}
