use ivy_runtime::{MAX_INITIAL_BUCKETS, Runtime, RuntimeConfig, RuntimeError, Value};

#[test]
fn lock_counts_accumulate() {
    let mut rt = Runtime::new();
    let list = rt.new_list().unwrap();
    assert_eq!(rt.lock(list).unwrap(), 1);
    assert_eq!(rt.lock(list).unwrap(), 2);
    assert_eq!(rt.pin_count(list), 2);
    assert_eq!(rt.pins().len(), 1);
    assert_eq!(rt.pins().total_locks(), 2);
    assert_eq!(rt.unlock(list).unwrap(), 1);
    assert_eq!(rt.unlock(list).unwrap(), 0);
    assert!(rt.pins().is_empty());
}

#[test]
fn unlock_without_lock_is_invalid() {
    let mut rt = Runtime::new();
    let list = rt.new_list().unwrap();
    let err = rt.unlock(list).unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidOperation(_)), "{err}");
}

#[test]
fn only_live_references_can_be_locked() {
    let mut rt = Runtime::new();
    assert!(matches!(
        rt.lock(Value::Int(4)),
        Err(RuntimeError::InvalidArgument(_))
    ));
    let list = rt.new_list().unwrap();
    rt.collect();
    assert!(matches!(rt.lock(list), Err(RuntimeError::InvalidArgument(_))));
}

#[test]
fn balanced_locks_leave_no_residue() {
    let mut rt = Runtime::new();
    let map = rt.new_map().unwrap();
    for _ in 0..3 {
        rt.lock(map).unwrap();
    }
    rt.collect();
    assert!(rt.is_live(map));
    for _ in 0..3 {
        rt.unlock(map).unwrap();
    }
    let report = rt.collect();
    assert_eq!(report.freed, 1);
    assert!(!rt.is_live(map));
    assert!(rt.check_roots().is_clean());
}

#[test]
fn pin_table_grows_under_load() {
    let mut rt = Runtime::with_config(RuntimeConfig {
        pin_buckets: 4,
        ..RuntimeConfig::default()
    });
    let lists: Vec<Value> = (0..1000)
        .map(|_| {
            let list = rt.new_list().unwrap();
            rt.lock(list).unwrap();
            list
        })
        .collect();
    assert!(rt.pins().bucket_count() > 4);
    rt.collect();
    for list in &lists {
        assert!(rt.is_live(*list));
        assert_eq!(rt.pin_count(*list), 1);
    }
    for list in &lists {
        rt.unlock(*list).unwrap();
    }
    assert_eq!(rt.collect().freed, 1000);
}

#[test]
fn oversized_bucket_request_is_capped() {
    let mut rt = Runtime::with_config(RuntimeConfig {
        pin_buckets: usize::MAX,
        ..RuntimeConfig::default()
    });
    assert_eq!(rt.pins().bucket_count(), MAX_INITIAL_BUCKETS);
    let list = rt.new_list().unwrap();
    assert_eq!(rt.lock(list).unwrap(), 1);
    rt.collect();
    assert!(rt.is_live(list));
    assert_eq!(rt.unlock(list).unwrap(), 0);
}
