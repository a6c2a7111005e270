//! Rule evaluation: per-request matching against the loaded rule set.
//!
//! The rule set is immutable after load and shared behind an atomically
//! swappable reference; a reload swaps the whole set, never mutating it in
//! place, so in-flight evaluations always see a consistent snapshot.

pub mod pipeline;
pub mod request;

pub use request::RequestBuffer;

use crate::alerting::Alert;
use crate::error::Result;
use crate::rules::matcher::{match_condition, MatchSpan, Prefilter};
use crate::rules::rule::FlowbitsOp;
use crate::rules::ruleset::{CompiledRule, RuleSet, RuleSetStats};
use crate::session::{Session, SessionState};
use crate::SigError;
use std::sync::{Arc, RwLock};
use tracing::{info, trace};

struct LoadedRules {
    set: RuleSet,
    prefilter: Prefilter,
}

impl LoadedRules {
    fn build(set: RuleSet) -> Result<Self> {
        let prefilter = Prefilter::build(set.iter().map(|r| &r.rule))
            .map_err(SigError::Other)?;
        Ok(Self { set, prefilter })
    }
}

/// The rule evaluator
pub struct Engine {
    loaded: RwLock<Arc<LoadedRules>>,
}

impl Engine {
    pub fn new(set: RuleSet) -> Result<Self> {
        let loaded = LoadedRules::build(set)?;
        info!(rules = loaded.set.len(), "engine initialized");
        Ok(Self {
            loaded: RwLock::new(Arc::new(loaded)),
        })
    }

    /// Replace the whole rule set atomically
    pub fn swap_rules(&self, set: RuleSet) -> Result<()> {
        let loaded = Arc::new(LoadedRules::build(set)?);
        let mut guard = self.loaded.write().expect("rule set lock poisoned");
        info!(rules = loaded.set.len(), "rule set swapped");
        *guard = loaded;
        Ok(())
    }

    fn snapshot(&self) -> Arc<LoadedRules> {
        self.loaded.read().expect("rule set lock poisoned").clone()
    }

    pub fn rule_count(&self) -> usize {
        self.snapshot().set.len()
    }

    pub fn rule_stats(&self) -> RuleSetStats {
        self.snapshot().set.stats()
    }

    /// Evaluate one rule against one request in the context of its session.
    ///
    /// Flow gates come first, then flowbit prerequisites, then the condition
    /// chain strictly in listed order with each match end threaded into the
    /// next condition's distance check; the chain short-circuits on the first
    /// failing condition. On a full match the rule's flowbit set/unset
    /// operations are applied; `noalert` rules yield no Alert.
    pub fn evaluate(
        &self,
        rule: &CompiledRule,
        session: &mut Session,
        req: &RequestBuffer,
    ) -> Option<Alert> {
        // A closed session yields no further alerts
        if session.state == SessionState::Closed {
            return None;
        }

        if let Some(flow) = rule.rule.options.flow {
            if flow.established && session.state != SessionState::Established {
                return None;
            }
            if let Some(dir) = flow.direction {
                if dir != req.direction {
                    return None;
                }
            }
        }

        // Chain-stage prerequisite: earlier stage must have run on this session
        for bit in rule.rule.required_flowbits() {
            if !session.has_flowbit(bit) {
                return None;
            }
        }

        let mut matched = Vec::with_capacity(rule.conditions.len());
        let mut prev: Option<MatchSpan> = None;
        for cond in &rule.conditions {
            let span = match_condition(cond, req, prev)?;
            matched.push((span.start, span.end));
            prev = Some(span);
        }

        for op in &rule.rule.options.flowbits {
            match op {
                FlowbitsOp::Set(name) => {
                    session.set_flowbit(name);
                }
                FlowbitsOp::Unset(name) => {
                    session.unset_flowbit(name);
                }
                FlowbitsOp::Isset(_) | FlowbitsOp::Noalert => {}
            }
        }

        if rule.rule.is_noalert() {
            trace!(sid = rule.sid(), session = session.id, "stage rule matched, noalert");
            return None;
        }

        Some(Alert {
            sid: rule.sid(),
            rev: rule.rule.options.rev.unwrap_or(1),
            msg: rule.rule.message().unwrap_or_default().to_string(),
            classtype: rule.rule.options.classtype.clone(),
            priority: rule.rule.priority(),
            timestamp: req.timestamp,
            session_id: session.id,
            conn: req.conn.clone(),
            direction: req.direction,
            matched,
        })
    }

    /// Evaluate all candidate rules against one request, in load order, so
    /// multiple alerts for one buffer come out deterministically
    pub fn evaluate_all(&self, session: &mut Session, req: &RequestBuffer) -> Vec<Alert> {
        let loaded = self.snapshot();
        let candidates = loaded
            .set
            .candidate_rules(req.conn.protocol, req.conn.dst_port);
        let prefiltered = loaded.prefilter.candidates(req);

        let mut alerts = Vec::new();
        for rule in candidates {
            if !prefiltered.contains(&rule.sid()) {
                continue;
            }
            if let Some(alert) = self.evaluate(&rule, session, req) {
                alerts.push(alert);
            }
        }
        alerts
    }
}
