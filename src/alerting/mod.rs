//! Alert records and the non-blocking alert sink.
//!
//! The sink must never backpressure the evaluation path: alerts go through a
//! bounded queue to a writer thread, and when the queue is full the oldest
//! queued alert is dropped and counted, never the caller blocked.

use crate::rules::rule::FlowDirection;
use crate::session::ConnKey;
use chrono::{DateTime, Utc};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Structured alert produced per rule match
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub sid: u32,
    pub rev: u32,
    pub msg: String,
    pub classtype: Option<String>,
    pub priority: u8,
    pub timestamp: DateTime<Utc>,
    pub session_id: u64,
    pub conn: ConnKey,
    pub direction: FlowDirection,
    /// (start, end) offsets per satisfied condition, in condition order
    pub matched: Vec<(usize, usize)>,
}

impl Alert {
    /// One-line rendering in the classic fast.log style
    pub fn format_fast(&self) -> String {
        let classification = self.classtype.as_deref().unwrap_or("unknown");
        format!(
            "{} [**] [1:{}:{}] {} [**] [Classification: {}] [Priority: {}] {{{}}} {}:{} -> {}:{}",
            self.timestamp.format("%m/%d/%Y-%H:%M:%S%.6f"),
            self.sid,
            self.rev,
            self.msg,
            classification,
            self.priority,
            self.conn.protocol,
            self.conn.src_ip,
            self.conn.src_port,
            self.conn.dst_ip,
            self.conn.dst_port,
        )
    }
}

/// Output rendering for the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertFormat {
    /// One JSON object per line
    Json,
    /// Classic fast.log single-line text
    Fast,
}

/// Counters shared with the writer thread
#[derive(Debug, Default)]
struct SinkCounters {
    emitted: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
}

/// Bounded, drop-oldest alert queue with a dedicated writer thread
pub struct AlertSink {
    tx: Option<Sender<Alert>>,
    rx: Receiver<Alert>,
    counters: Arc<SinkCounters>,
    handle: Option<JoinHandle<()>>,
}

impl AlertSink {
    pub fn spawn(writer: Box<dyn Write + Send>, format: AlertFormat, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        let counters = Arc::new(SinkCounters::default());

        let thread_rx = rx.clone();
        let thread_counters = counters.clone();
        let handle = thread::Builder::new()
            .name("alert-sink".to_string())
            .spawn(move || write_loop(thread_rx, writer, format, thread_counters))
            .expect("failed to spawn alert sink thread");

        Self {
            tx: Some(tx),
            rx,
            counters,
            handle: Some(handle),
        }
    }

    /// Queue an alert without ever blocking; on a full queue the oldest
    /// queued alert is discarded first
    pub fn emit(&self, alert: Alert) {
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);
        let tx = match self.tx.as_ref() {
            Some(tx) => tx,
            None => return,
        };

        let mut alert = alert;
        loop {
            match tx.try_send(alert) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    if self.rx.try_recv().is_ok() {
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    alert = back;
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!("alert sink writer is gone, alert discarded");
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        }
    }

    pub fn emitted(&self) -> u64 {
        self.counters.emitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Flush remaining alerts and stop the writer thread
    pub fn finish(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!(
            emitted = self.counters.emitted.load(Ordering::Relaxed),
            written = self.counters.written.load(Ordering::Relaxed),
            dropped = self.counters.dropped.load(Ordering::Relaxed),
            "alert sink closed"
        );
    }
}

impl Drop for AlertSink {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

fn write_loop(
    rx: Receiver<Alert>,
    mut writer: Box<dyn Write + Send>,
    format: AlertFormat,
    counters: Arc<SinkCounters>,
) {
    while let Ok(alert) = rx.recv() {
        let line = match format {
            AlertFormat::Json => match serde_json::to_string(&alert) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, sid = alert.sid, "failed to serialize alert");
                    continue;
                }
            },
            AlertFormat::Fast => alert.format_fast(),
        };
        if let Err(e) = writeln!(writer, "{}", line) {
            warn!(error = %e, "failed to write alert");
            continue;
        }
        counters.written.fetch_add(1, Ordering::Relaxed);
    }
    let _ = writer.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::rule::Protocol;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

    fn alert(sid: u32) -> Alert {
        Alert {
            sid,
            rev: 1,
            msg: "test alert".to_string(),
            classtype: Some("web-application-attack".to_string()),
            priority: 2,
            timestamp: Utc::now(),
            session_id: 1,
            conn: ConnKey {
                src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                src_port: 40000,
                dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                dst_port: 80,
                protocol: Protocol::Tcp,
            },
            direction: FlowDirection::ToServer,
            matched: vec![(5, 10)],
        }
    }

    /// Shared buffer standing in for an output file
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_fast_format() {
        let line = alert(1000001).format_fast();
        assert!(line.contains("[1:1000001:1]"));
        assert!(line.contains("test alert"));
        assert!(line.contains("[Classification: web-application-attack]"));
        assert!(line.contains("10.0.0.1:40000 -> 10.0.0.2:80"));
    }

    #[test]
    fn test_sink_writes_json_lines() {
        let buf = SharedBuf::default();
        let sink = AlertSink::spawn(Box::new(buf.clone()), AlertFormat::Json, 16);
        sink.emit(alert(1));
        sink.emit(alert(2));
        sink.finish();

        let out = buf.0.lock().unwrap();
        let lines: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["sid"], 1);
        assert_eq!(first["matched"][0][0], 5);
    }

    #[test]
    fn test_emit_never_blocks_on_full_queue() {
        // Writer blocked behind a mutex the test holds: queue fills, then
        // emit must drop-oldest rather than block.
        let buf = SharedBuf::default();
        let guard = buf.0.lock().unwrap();

        let sink = AlertSink::spawn(Box::new(buf.clone()), AlertFormat::Fast, 2);
        for sid in 0..50 {
            sink.emit(alert(sid));
        }
        assert_eq!(sink.emitted(), 50);
        assert!(sink.dropped() > 0);

        drop(guard);
        sink.finish();
    }
}
