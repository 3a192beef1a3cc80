// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The ordered, structured trace log (`spec.md §4.7`, C7).
//!
//! A [`TraceLog`] is scoped to one [`crate::sim::Simulation`] rather than
//! a process-wide singleton — the teacher's `logging::logger` uses a
//! `OnceLock<Arc<Mutex<_>>>` global because it logs one process's
//! diagnostics, but two independently-constructed simulations in the same
//! test binary must not share trace sequence numbers (see `DESIGN.md`).
//! Appends are still guarded by `parking_lot::Mutex` around the optional
//! file sink so a `real_time_simulation` overlay thread could tee traces
//! safely; the record vector itself is only ever touched by the owning
//! `Simulation`, which has exclusive `&mut` access by construction
//! (`spec.md §5`: "appends are serialized by construction").

use std::io::{self, Write};

use parking_lot::Mutex;

use super::fields::FieldValue;

/// One entry in the trace stream. Totally ordered by `seq`.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceEvent {
    pub seq: u64,
    pub timestamp_ns: u64,
    pub kind: &'static str,
    pub fields: Vec<(&'static str, FieldValue)>,
    pub context: Option<String>,
}

impl TraceEvent {
    /// Render using the external line format from `spec.md §6`:
    /// `[<seq>] <timestamp_s>.<nanos> <kind>: { k1 = v1, ... }  ctx=<name>`
    pub fn render(&self) -> String {
        let secs = self.timestamp_ns / 1_000_000_000;
        let nanos = self.timestamp_ns % 1_000_000_000;
        let mut out = format!("[{}] {}.{:09} {}: {{ ", self.seq, secs, nanos, self.kind);
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("{k} = {v}"));
        }
        out.push_str(" }");
        if let Some(ctx) = &self.context {
            out.push_str(&format!("  ctx={ctx}"));
        }
        out
    }
}

/// The trace log. Totally ordered, append-only (`spec.md §4.7`).
pub struct TraceLog {
    sequence: u64,
    events: Vec<TraceEvent>,
    sink: Mutex<Option<Box<dyn Write + Send>>>,
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceLog {
    pub fn new() -> Self {
        Self {
            sequence: 0,
            events: Vec::new(),
            sink: Mutex::new(None),
        }
    }

    /// Tee every future event, rendered, to `w` (e.g. an open file).
    pub fn tee_to(&mut self, w: Box<dyn Write + Send>) {
        *self.sink.lock() = Some(w);
    }

    /// Append a trace event and return its sequence number.
    ///
    /// Must only be called from a [`crate::devs::Machine::output`]
    /// implementation so the trace sequence matches the scheduled event
    /// order (invariant I4, `spec.md §9`).
    pub fn log_event(
        &mut self,
        kind: &'static str,
        fields: Vec<(&'static str, FieldValue)>,
        context: Option<String>,
        now_ns: u64,
    ) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        let event = TraceEvent {
            seq,
            timestamp_ns: now_ns,
            kind,
            fields,
            context,
        };
        if let Some(sink) = self.sink.lock().as_mut() {
            let _ = writeln!(sink, "{}", event.render());
        }
        self.events.push(event);
        seq
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// All events whose `kind` equals `kind`, in sequence order.
    pub fn events_of_kind<'a, 'b>(&'a self, kind: &'b str) -> impl Iterator<Item = &'a TraceEvent> + 'a
    where
        'b: 'a,
    {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    pub fn flush(&self) -> io::Result<()> {
        if let Some(sink) = self.sink.lock().as_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_monotonic() {
        let mut log = TraceLog::new();
        let a = log.log_event("rcl_init", vec![], None, 0);
        let b = log.log_event("rcl_node_init", vec![], None, 0);
        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }

    #[test]
    fn render_matches_external_format() {
        let mut log = TraceLog::new();
        log.log_event(
            "rcl_node_init",
            vec![
                ("node_handle", FieldValue::Hex(0x3E9)),
                ("node_name", FieldValue::Str("N".into())),
            ],
            Some("rcl".into()),
            1_500_000_000,
        );
        let rendered = log.events()[0].render();
        assert_eq!(
            rendered,
            "[0] 1.500000000 rcl_node_init: { node_handle = 0x3E9, node_name = \"N\" }  ctx=rcl"
        );
    }

    #[test]
    fn tee_writes_rendered_lines() {
        let mut buf: Vec<u8> = Vec::new();
        let mut log = TraceLog::new();
        // Can't tee into a Vec<u8> captured by value and also read it back
        // through the same call without a cursor; use a temp file instead.
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        log.tee_to(Box::new(std::fs::File::create(&path).unwrap()));
        log.log_event("rcl_init", vec![], None, 0);
        log.flush().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("rcl_init"));
        buf.clear();
    }
}
