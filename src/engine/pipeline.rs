//! Detection worker pool: request channel in, alerts out.
//!
//! One bounded channel feeds N workers; each worker observes the session,
//! evaluates the full rule set, and hands alerts to the sink. Per-connection
//! serialization comes from the session map's shard locks, so workers never
//! coordinate beyond the channel. Idle-session expiry runs on its own timer
//! thread, off the hot path.

use super::request::RequestBuffer;
use super::Engine;
use crate::alerting::AlertSink;
use crate::error::Result;
use crate::session::{RequestSummary, SessionTracker};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Worker thread count; 0 picks a heuristic from the CPU count
    pub workers: usize,
    pub queue_size: usize,
    pub expire_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_size: 10_000,
            expire_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    requests: AtomicU64,
    alerts: AtomicU64,
}

impl PipelineStats {
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn alerts(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }
}

/// Running worker pool; `stop` drains and joins
pub struct Pipeline {
    tx: Option<Sender<RequestBuffer>>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    pub fn start(
        config: PipelineConfig,
        engine: Arc<Engine>,
        tracker: Arc<SessionTracker>,
        sink: Arc<AlertSink>,
    ) -> Self {
        let workers = if config.workers == 0 {
            num_cpus::get().saturating_sub(2).max(1)
        } else {
            config.workers
        };

        let (tx, rx) = bounded(config.queue_size);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PipelineStats::default());
        let mut handles = Vec::with_capacity(workers + 1);

        for worker_id in 0..workers {
            let rx = rx.clone();
            let engine = engine.clone();
            let tracker = tracker.clone();
            let sink = sink.clone();
            let stats = stats.clone();
            let handle = thread::Builder::new()
                .name(format!("detect-{}", worker_id))
                .spawn(move || worker_loop(worker_id, rx, engine, tracker, sink, stats))
                .expect("failed to spawn detection worker");
            handles.push(handle);
        }

        // Expiry timer, independent of the hot path
        {
            let tracker = tracker.clone();
            let shutdown = shutdown.clone();
            let interval = config.expire_interval;
            let handle = thread::Builder::new()
                .name("session-expiry".to_string())
                .spawn(move || {
                    // Short sleep steps keep shutdown responsive
                    let step = Duration::from_millis(200).min(interval);
                    let mut since_sweep = Duration::ZERO;
                    while !shutdown.load(Ordering::Relaxed) {
                        thread::sleep(step);
                        since_sweep += step;
                        if since_sweep >= interval {
                            tracker.expire(chrono::Utc::now());
                            since_sweep = Duration::ZERO;
                        }
                    }
                })
                .expect("failed to spawn expiry thread");
            handles.push(handle);
        }

        info!(workers, queue_size = config.queue_size, "detection pipeline started");
        Self {
            tx: Some(tx),
            shutdown,
            handles,
            stats,
        }
    }

    /// Hand one request to the worker pool
    pub fn submit(&self, req: RequestBuffer) -> Result<()> {
        match self.tx.as_ref() {
            Some(tx) => Ok(tx.send(req)?),
            None => Err(crate::SigError::ChannelSend),
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Stats handle that outlives the pipeline, for reporting after stop()
    pub fn stats_handle(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Drain remaining requests and join all threads
    pub fn stop(mut self) {
        drop(self.tx.take());
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        info!(
            requests = self.stats.requests(),
            alerts = self.stats.alerts(),
            "detection pipeline stopped"
        );
    }
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<RequestBuffer>,
    engine: Arc<Engine>,
    tracker: Arc<SessionTracker>,
    sink: Arc<AlertSink>,
    stats: Arc<PipelineStats>,
) {
    debug!(worker_id, "detection worker up");
    loop {
        let req = match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(req) => req,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        stats.requests.fetch_add(1, Ordering::Relaxed);

        let alerts = {
            // Shard lock held only for this connection's evaluation
            let mut session = tracker.observe(&req.conn, req.direction, req.timestamp);
            let alerts = engine.evaluate_all(&mut session, &req);
            session.push_history(RequestSummary {
                timestamp: req.timestamp,
                direction: req.direction,
                payload_len: req.payload.len(),
                uri: req.uri_string(),
            });
            alerts
        };

        for alert in alerts {
            stats.alerts.fetch_add(1, Ordering::Relaxed);
            sink.emit(alert);
        }
    }
    debug!(worker_id, "detection worker down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::AlertFormat;
    use crate::rules::rule::{FlowDirection, Protocol};
    use crate::rules::RuleSet;
    use crate::session::ConnKey;
    use chrono::Duration as ChronoDuration;
    use std::io::Write;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

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

    fn conn(src_port: u16) -> ConnKey {
        ConnKey {
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            src_port,
            dst_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            dst_port: 80,
            protocol: Protocol::Tcp,
        }
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let mut set = RuleSet::new();
        set.load_from_str(
            r#"alert tcp any any -> any 80 (msg:"script tag"; content:"script", nocase; classtype:web-application-attack; sid:1;)"#,
            "test",
        )
        .unwrap();
        let engine = Arc::new(Engine::new(set).unwrap());
        let tracker = Arc::new(SessionTracker::new(ChronoDuration::seconds(60), 8));

        let buf = SharedBuf::default();
        let sink = Arc::new(AlertSink::spawn(
            Box::new(buf.clone()),
            AlertFormat::Json,
            64,
        ));

        let pipeline = Pipeline::start(
            PipelineConfig {
                workers: 2,
                queue_size: 16,
                expire_interval: Duration::from_secs(60),
            },
            engine,
            tracker,
            sink.clone(),
        );

        for port in [40000u16, 40001, 40002] {
            let req = RequestBuffer::new(
                conn(port),
                FlowDirection::ToServer,
                b"GET /?q=<SCRIPT>alert(1)</SCRIPT> HTTP/1.1".to_vec(),
            );
            pipeline.submit(req).unwrap();
        }
        let clean = RequestBuffer::new(
            conn(40003),
            FlowDirection::ToServer,
            b"GET /index.html HTTP/1.1".to_vec(),
        );
        pipeline.submit(clean).unwrap();

        pipeline.stop();
        match Arc::try_unwrap(sink) {
            Ok(sink) => sink.finish(),
            Err(_) => panic!("sink still shared after pipeline stop"),
        }

        let out = buf.0.lock().unwrap();
        let lines: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let alert: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(alert["sid"], 1);
        }
    }
}
