use ivy_runtime::{Runtime, RuntimeConfig, RuntimeError, Stack, Value};
use proptest::prelude::*;

#[test]
fn get_indexes_from_the_top() {
    let mut rt = Runtime::new();
    rt.push(Value::Bool(true)).unwrap();
    rt.push(Value::Int(42)).unwrap();
    rt.push(Value::Float(3.5)).unwrap();
    assert_eq!(rt.stack_size(), 3);
    assert_eq!(rt.peek(0).unwrap(), Value::Float(3.5));
    assert_eq!(rt.peek(1).unwrap(), Value::Int(42));
    assert_eq!(rt.peek(2).unwrap(), Value::Bool(true));
    rt.truncate_stack(0);
}

#[test]
fn get_past_size_is_an_error() {
    let mut stack = Stack::new();
    stack.push(Value::Int(1)).unwrap();
    assert!(matches!(stack.get(1), Err(RuntimeError::InvalidArgument(_))));
}

#[test]
fn pop_on_empty_stack_is_an_error() {
    let mut stack = Stack::new();
    assert!(matches!(stack.pop(), Err(RuntimeError::InvalidOperation(_))));
}

#[test]
fn capacity_doubles_from_the_initial_size() {
    let mut stack = Stack::with_capacity(16);
    assert_eq!(stack.capacity(), 0);
    stack.push(Value::Int(0)).unwrap();
    assert_eq!(stack.capacity(), 16);
    for i in 1..17 {
        stack.push(Value::Int(i)).unwrap();
    }
    assert_eq!(stack.capacity(), 32);
}

#[test]
fn oversized_initial_capacity_fails_as_an_allocation_error() {
    let mut rt = Runtime::with_config(RuntimeConfig {
        initial_stack_capacity: usize::MAX,
        ..RuntimeConfig::default()
    });
    assert_eq!(rt.stack().capacity(), 0);
    assert_eq!(rt.stack().max_capacity(), i32::MAX as usize);
    match rt.push(Value::Int(1)) {
        Ok(()) => assert_eq!(rt.stack().capacity(), i32::MAX as usize),
        Err(err) => assert!(matches!(err, RuntimeError::AllocationFailed(_)), "{err}"),
    }
    rt.truncate_stack(0);
}

#[test]
fn stack_mark_restores_size() {
    let mut rt = Runtime::new();
    rt.push(Value::Int(1)).unwrap();
    let mark = rt.stack_mark();
    rt.push(Value::Int(2)).unwrap();
    rt.push(Value::Int(3)).unwrap();
    rt.truncate_stack(mark);
    assert_eq!(rt.stack_size(), 1);
    assert_eq!(rt.pop().unwrap(), Value::Int(1));
}

#[derive(Debug, Clone)]
enum Op {
    Push(i32),
    Pop,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![any::<i32>().prop_map(Op::Push), Just(Op::Pop)]
}

proptest! {
    #[test]
    fn size_tracks_pushes_minus_pops(ops in prop::collection::vec(op(), 0..200)) {
        let mut stack = Stack::new();
        let mut model: Vec<i32> = Vec::new();
        let mut last_capacity = stack.capacity();
        for op in ops {
            match op {
                Op::Push(i) => {
                    stack.push(Value::Int(i)).unwrap();
                    model.push(i);
                }
                Op::Pop => match model.pop() {
                    Some(expected) => prop_assert_eq!(stack.pop().unwrap(), Value::Int(expected)),
                    None => prop_assert!(stack.pop().is_err()),
                },
            }
            prop_assert_eq!(stack.size(), model.len());
            prop_assert!(stack.capacity() >= last_capacity);
            prop_assert!(stack.size() <= stack.capacity());
            last_capacity = stack.capacity();
        }
        let live: Vec<Value> = model.iter().map(|&i| Value::Int(i)).collect();
        prop_assert_eq!(stack.live(), live.as_slice());
    }
}
