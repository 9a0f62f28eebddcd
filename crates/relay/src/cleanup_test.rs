//! Tests for the teardown stack

use super::*;

use std::sync::Arc;
use std::sync::Mutex;

#[test]
fn drop_runs_tasks_in_reverse_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    {
        let mut stack = CleanupStack::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            stack.push(move || order.lock().unwrap().push(i));
        }
    }
    assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
}

#[test]
fn clear_disarms_the_stack() {
    let ran = Arc::new(Mutex::new(false));
    {
        let ran = Arc::clone(&ran);
        let mut stack = CleanupStack::new();
        stack.push(move || *ran.lock().unwrap() = true);
        stack.clear();
        assert!(stack.is_empty());
    }
    assert!(!*ran.lock().unwrap());
}
