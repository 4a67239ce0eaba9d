use std::cell::Cell;
use std::rc::Rc;

use ivy_runtime::{GcPhase, Runtime, RuntimeConfig, RuntimeError, TypeId, TypeSpec, Value};
use proptest::prelude::*;

/// Registers a traced object type whose finalizer bumps the returned counter.
fn counted_type(rt: &mut Runtime, name: &str, fields: usize) -> (TypeId, Rc<Cell<usize>>) {
    let finalized = Rc::new(Cell::new(0));
    let counter = Rc::clone(&finalized);
    let ty = rt
        .register_type(
            TypeSpec::new(name)
                .instance_size(fields)
                .finalize(move |_| counter.set(counter.get() + 1)),
        )
        .unwrap();
    (ty, finalized)
}

#[test]
fn locked_object_survives_until_unlocked() {
    let mut rt = Runtime::new();
    let (ty, finalized) = counted_type(&mut rt, "node", 1);
    let a = rt.new_object(ty).unwrap();
    assert_eq!(rt.lock(a).unwrap(), 1);

    rt.collect();
    assert!(rt.is_live(a));
    assert_eq!(finalized.get(), 0);

    assert_eq!(rt.unlock(a).unwrap(), 0);
    let report = rt.collect();
    assert_eq!(report.freed, 1);
    assert_eq!(finalized.get(), 1);
    assert!(!rt.is_live(a));
}

#[test]
fn unreachable_cycle_is_reclaimed_in_one_cycle() {
    let mut rt = Runtime::new();
    let (ty, finalized) = counted_type(&mut rt, "node", 1);
    let a = rt.new_object(ty).unwrap();
    let b = rt.new_object(ty).unwrap();
    rt.set_field(a, 0, b).unwrap();
    rt.set_field(b, 0, a).unwrap();

    let report = rt.collect();
    assert_eq!(report.freed, 2);
    assert_eq!(report.live, 0);
    assert_eq!(finalized.get(), 2);
}

#[test]
fn objects_reachable_from_the_stack_survive() {
    let mut rt = Runtime::new();
    let (ty, finalized) = counted_type(&mut rt, "node", 1);
    let list = rt.new_list().unwrap();
    rt.push(list).unwrap();
    let inner = rt.new_object(ty).unwrap();
    rt.list_append(list, inner).unwrap();
    let leaf = rt.new_string("kept").unwrap();
    rt.set_field(inner, 0, leaf).unwrap();
    let garbage = rt.new_object(ty).unwrap();

    let report = rt.collect();
    assert_eq!(report.marked, 3);
    assert_eq!(report.freed, 1);
    assert!(rt.is_live(inner));
    assert!(rt.is_live(leaf));
    assert!(!rt.is_live(garbage));
    assert_eq!(rt.string_value(leaf).unwrap(), "kept");
    assert_eq!(finalized.get(), 1);
    rt.truncate_stack(0);
}

#[test]
fn popped_slots_are_not_roots() {
    let mut rt = Runtime::new();
    let list = rt.new_list().unwrap();
    rt.push(list).unwrap();
    rt.pop().unwrap();
    rt.collect();
    assert!(!rt.is_live(list));
}

#[test]
fn map_keys_and_values_are_traced() {
    let mut rt = Runtime::new();
    let map = rt.new_map().unwrap();
    rt.push(map).unwrap();
    let key = rt.new_string("k").unwrap();
    let value = rt.new_list().unwrap();
    rt.map_set(map, key, value).unwrap();

    rt.collect();
    assert!(rt.is_live(key));
    assert!(rt.is_live(value));
    rt.truncate_stack(0);
}

#[test]
fn finalizer_runs_exactly_once() {
    let mut rt = Runtime::new();
    let (ty, finalized) = counted_type(&mut rt, "node", 0);
    for _ in 0..10 {
        rt.new_object(ty).unwrap();
    }
    assert_eq!(rt.collect().freed, 10);
    assert_eq!(rt.collect().freed, 0);
    assert_eq!(finalized.get(), 10);
    drop(rt);
    assert_eq!(finalized.get(), 10);
}

#[test]
fn leaf_types_are_not_traced() {
    let mut rt = Runtime::new();
    let ty = rt
        .register_type(TypeSpec::new("blob").instance_size(1).leaf())
        .unwrap();
    assert!(!rt.types().get(ty).has_trace());
    let blob = rt.new_object(ty).unwrap();
    rt.push(blob).unwrap();
    let s = rt.new_string("unreferenced").unwrap();
    rt.set_field(blob, 0, s).unwrap();

    rt.collect();
    assert!(rt.is_live(blob));
    assert!(!rt.is_live(s));
    rt.truncate_stack(0);
}

#[test]
fn stale_handles_are_rejected_after_reuse() {
    let mut rt = Runtime::new();
    let old = rt.new_list().unwrap();
    rt.collect();
    let new = rt.new_list().unwrap();
    assert_eq!(old.ref_id().unwrap().index(), new.ref_id().unwrap().index());
    assert_ne!(old, new);
    assert!(matches!(
        rt.list_len(old),
        Err(RuntimeError::InvalidArgument(_))
    ));
    assert_eq!(rt.list_len(new).unwrap(), 0);
}

#[test]
fn weak_reference_is_cleared_when_target_dies() {
    let mut rt = Runtime::new();
    let target = rt.new_list().unwrap();
    let weak = rt.new_weak(target).unwrap();
    rt.push(weak).unwrap();

    assert_eq!(rt.weak_get(weak).unwrap(), target);
    let report = rt.collect();
    assert_eq!(report.weak_cleared, 1);
    assert!(!rt.is_live(target));
    assert!(rt.is_live(weak));
    assert_eq!(rt.weak_get(weak).unwrap(), Value::Void);
    rt.truncate_stack(0);
}

#[test]
fn weak_reference_follows_a_rooted_target() {
    let mut rt = Runtime::new();
    let target = rt.new_string("alive").unwrap();
    rt.push(target).unwrap();
    let weak = rt.new_weak(target).unwrap();
    rt.push(weak).unwrap();

    let report = rt.collect();
    assert_eq!(report.weak_cleared, 0);
    assert_eq!(rt.weak_get(weak).unwrap(), target);
    rt.truncate_stack(0);
}

#[test]
fn allocation_collects_when_budget_is_spent() {
    let mut rt = Runtime::with_config(RuntimeConfig {
        gc_threshold: 10,
        min_gc_threshold: 10,
        ..RuntimeConfig::default()
    });
    for _ in 0..25 {
        rt.new_list().unwrap();
    }
    let stats = rt.gc_stats();
    assert_eq!(stats.collections, 2);
    assert_eq!(stats.total_allocated, 25);
    assert_eq!(stats.total_freed, 20);
    assert_eq!(rt.heap().len(), 5);
    assert_eq!(rt.gc_phase(), GcPhase::Idle);
}

#[test]
fn no_automatic_collection_when_disabled() {
    let mut rt = Runtime::with_config(RuntimeConfig {
        gc_threshold: 4,
        auto_collect: false,
        ..RuntimeConfig::default()
    });
    for _ in 0..20 {
        rt.new_list().unwrap();
    }
    assert_eq!(rt.gc_stats().collections, 0);
    assert_eq!(rt.heap().len(), 20);
    assert_eq!(rt.maybe_collect(), None);
}

#[test]
fn object_ceiling_is_an_allocation_failure() {
    let mut rt = Runtime::with_config(RuntimeConfig {
        max_objects: Some(4),
        ..RuntimeConfig::default()
    });
    for _ in 0..4 {
        let list = rt.new_list().unwrap();
        rt.push(list).unwrap();
    }
    let err = rt.new_list().unwrap_err();
    assert!(matches!(err, RuntimeError::AllocationFailed(_)), "{err}");

    rt.truncate_stack(3);
    assert!(rt.new_list().is_ok());
    rt.truncate_stack(0);
}

#[test]
fn shutdown_reports_leftover_roots_and_finalizes_everything() {
    let mut rt = Runtime::new();
    let (ty, finalized) = counted_type(&mut rt, "node", 0);
    let a = rt.new_object(ty).unwrap();
    rt.push(a).unwrap();
    let b = rt.new_object(ty).unwrap();
    rt.lock(b).unwrap();
    rt.lock(b).unwrap();
    rt.new_object(ty).unwrap();

    let report = rt.shutdown();
    assert_eq!(report.roots.stack_size, 1);
    assert_eq!(report.roots.pinned_objects, 1);
    assert_eq!(report.roots.outstanding_locks, 2);
    assert!(!report.roots.is_clean());
    assert_eq!(report.finalized, 3);
    assert!(rt.heap().is_empty());
    assert_eq!(rt.stack_size(), 0);

    drop(rt);
    assert_eq!(finalized.get(), 3);
}

#[test]
fn dropping_the_runtime_finalizes_remaining_objects() {
    let finalized = {
        let mut rt = Runtime::new();
        let (ty, finalized) = counted_type(&mut rt, "node", 0);
        let a = rt.new_object(ty).unwrap();
        rt.lock(a).unwrap();
        rt.new_object(ty).unwrap();
        finalized
    };
    assert_eq!(finalized.get(), 2);
}

#[test]
fn stats_render_as_text() {
    let mut rt = Runtime::new();
    let list = rt.new_list().unwrap();
    rt.push(list).unwrap();
    rt.new_string("x").unwrap();
    rt.collect();
    let heap = rt.heap_stats();
    assert_eq!(heap.lists, 1);
    assert_eq!(heap.strings, 0);
    assert_eq!(heap.free_slots, 1);
    assert!(heap.to_string().contains("List:"));
    assert!(rt.gc_stats().to_string().contains("Collections:"));
    rt.truncate_stack(0);
}

const FIELDS: usize = 3;

#[derive(Debug, Clone)]
struct Graph {
    nodes: usize,
    edges: Vec<(usize, usize, usize)>,
    roots: Vec<usize>,
}

fn graph() -> impl Strategy<Value = Graph> {
    (1usize..24).prop_flat_map(|nodes| {
        (
            prop::collection::vec((0..nodes, 0..FIELDS, 0..nodes), 0..nodes * 2),
            prop::collection::vec(0..nodes, 0..4),
        )
            .prop_map(move |(edges, roots)| Graph {
                nodes,
                edges,
                roots,
            })
    })
}

fn reachable(graph: &Graph) -> Vec<bool> {
    let mut fields = vec![[None; FIELDS]; graph.nodes];
    for &(from, field, to) in &graph.edges {
        fields[from][field] = Some(to);
    }
    let mut seen = vec![false; graph.nodes];
    let mut work = graph.roots.clone();
    while let Some(n) = work.pop() {
        if std::mem::replace(&mut seen[n], true) {
            continue;
        }
        work.extend(fields[n].iter().flatten().copied());
    }
    seen
}

proptest! {
    #[test]
    fn collection_keeps_exactly_the_reachable_objects(graph in graph()) {
        let mut rt = Runtime::new();
        let (ty, finalized) = counted_type(&mut rt, "node", FIELDS);
        let objects: Vec<Value> = (0..graph.nodes).map(|_| rt.new_object(ty).unwrap()).collect();
        for &(from, field, to) in &graph.edges {
            rt.set_field(objects[from], field, objects[to]).unwrap();
        }
        for (i, &root) in graph.roots.iter().enumerate() {
            if i % 2 == 0 {
                rt.push(objects[root]).unwrap();
            } else {
                rt.lock(objects[root]).unwrap();
            }
        }

        let expected = reachable(&graph);
        let report = rt.collect();
        let dead = expected.iter().filter(|r| !**r).count();
        prop_assert_eq!(report.freed, dead);
        prop_assert_eq!(finalized.get(), dead);
        for (obj, alive) in objects.iter().zip(&expected) {
            prop_assert_eq!(rt.is_live(*obj), *alive);
        }
    }
}
