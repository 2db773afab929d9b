//! Tests for utilities

use lab_sequencer::util::clock::now_ms;
use lab_sequencer::util::signal::Signal;
use lab_sequencer::util::telemetry::init_tracing;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_now_ms_is_monotonic_enough() {
    let first = now_ms();
    let second = now_ms();
    assert!(second >= first);
    assert!(first > 0);
}

#[test]
fn test_signal_delivers_to_every_listener() {
    let signal = Signal::<String>::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    for prefix in ["table", "log"] {
        let seen = Rc::clone(&seen);
        signal.connect(move |text: &String| seen.borrow_mut().push(format!("{prefix}:{text}")));
    }

    signal.emit(&"Done".to_string());

    assert_eq!(*seen.borrow(), vec!["table:Done", "log:Done"]);
    assert_eq!(signal.len(), 2);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
