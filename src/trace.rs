//! Chrome Tracing export for fiber scheduling.
//!
//! Records one complete event per run slice, the interval a fiber spends as
//! the running fiber, with the fiber id as the trace thread id. The runtime
//! is single-OS-threaded, so events accumulate in the one buffer living
//! beside this thread's scheduler; [`take_events`] and [`export_to_file`]
//! drain it. The JSON is readable by chrome://tracing and ui.perfetto.dev.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A single trace event in Chrome Tracing format.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub name: &'static str,
    /// The fiber the slice belongs to. Exported as the trace thread id, so
    /// each fiber gets its own row in the viewer.
    pub fiber: u64,
    pub start_us: u64,
    pub duration_us: u64,
}

thread_local! {
    static TRACE_BUFFER: RefCell<Vec<TraceEvent>> = RefCell::new(Vec::with_capacity(10000));
}

lazy_static::lazy_static! {
    // Wall-clock anchor for the monotonic Instant timestamps, fixed at
    // first use so every event shares one time base.
    static ref GLOBAL_START: Instant = Instant::now();
    static ref EPOCH_START_US: u64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as u64;
}

/// Records a run slice. The scheduler calls this on every switch with the
/// slice the outgoing fiber just finished.
pub fn record_event(name: &'static str, fiber: u64, start: Instant, duration: Duration) {
    let start_us = (start.duration_since(*GLOBAL_START).as_micros() as u64) + *EPOCH_START_US;

    TRACE_BUFFER.with(|buf| {
        buf.borrow_mut().push(TraceEvent {
            name,
            fiber,
            start_us,
            duration_us: duration.as_micros() as u64,
        });
    });
}

/// Drains and returns the events recorded on this thread, oldest first.
pub fn take_events() -> Vec<TraceEvent> {
    TRACE_BUFFER.with(|buf| std::mem::take(&mut *buf.borrow_mut()))
}

/// Drains the events recorded on this thread into a JSON file.
pub fn export_to_file(path: &str) -> std::io::Result<()> {
    let events = take_events();

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    write!(writer, "[\n")?;
    for (index, event) in events.iter().enumerate() {
        if index > 0 {
            write!(writer, ",\n")?;
        }

        // ph: X is "Complete Event" (requires dur)
        write!(
            writer,
            "{{\"name\":\"{}\",\"ph\":\"X\",\"ts\":{},\"dur\":{},\"pid\":1,\"tid\":{}}}",
            event.name, event.start_us, event.duration_us, event.fiber
        )?;
    }
    write!(writer, "\n]\n")?;
    writer.flush()?;

    Ok(())
}
