//! Trace collection across a scheduler run (requires the `trace` feature).
#![cfg(feature = "trace")]

use cofiber::trace;
use cofiber::{Fiber, Scheduler};

#[test]
fn exported_trace_has_a_slice_per_switch() {
    for _ in 0..2 {
        Fiber::spawn(|| {
            Fiber::yield_now();
        });
    }
    Scheduler::run();

    let path = std::env::temp_dir().join(format!("cofiber-trace-{}.json", std::process::id()));
    let path = path.to_str().expect("temp path is valid utf-8").to_owned();
    trace::export_to_file(&path).expect("trace export failed");

    let json = std::fs::read_to_string(&path).expect("exported trace is readable");
    // Entry, two yields, two exits.
    assert_eq!(json.matches("\"ph\":\"X\"").count(), 5);
    assert_eq!(json.matches("\"name\":\"fiber\"").count(), 5);

    // The export drained the buffer.
    assert!(trace::take_events().is_empty());

    std::fs::remove_file(&path).ok();
}
