/// RuleSet: rules compiled and indexed for evaluation.
///
/// Load-order position is preserved so alert output stays deterministic when
/// one buffer matches several rules. Malformed rules are skipped (collected
/// into the load report); a duplicate sid aborts the whole load, ambiguous
/// alert attribution being worse than a failed reload.
use super::matcher::CompiledCondition;
use super::parser::parse_rule;
use super::rule::{Protocol, Rule};
use super::variables::Variables;
use crate::error::{Result, SigError};
use ahash::AHashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A rule with its searchers prebuilt and its load position recorded
#[derive(Debug)]
pub struct CompiledRule {
    pub rule: Rule,
    pub conditions: Vec<CompiledCondition>,
    /// Position in load order, used to keep alert output deterministic
    pub position: usize,
}

impl CompiledRule {
    fn compile(rule: Rule, position: usize) -> Result<Self> {
        let conditions = rule
            .options
            .conditions
            .iter()
            .map(CompiledCondition::compile)
            .collect::<std::result::Result<Vec<_>, String>>()
            .map_err(|reason| SigError::RuleCompile {
                sid: rule.sid(),
                reason,
            })?;
        Ok(Self {
            rule,
            conditions,
            position,
        })
    }

    pub fn sid(&self) -> u32 {
        self.rule.sid()
    }
}

/// One rule skipped during load, with its source line
#[derive(Debug, Clone)]
pub struct SkippedRule {
    pub line: usize,
    pub error: String,
}

/// Outcome of loading one rule source
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedRule>,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.loaded += other.loaded;
        self.skipped.extend(other.skipped);
    }
}

/// Index key for candidate lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RuleKey {
    protocol: Protocol,
    dst_port: Option<u16>,
}

/// Immutable-after-load collection of compiled rules
#[derive(Debug, Default)]
pub struct RuleSet {
    /// Rules in load order
    ordered: Vec<Arc<CompiledRule>>,
    /// Sid -> rule
    by_sid: AHashMap<u32, Arc<CompiledRule>>,
    /// Protocol/destination-port candidate index
    index: AHashMap<RuleKey, Vec<Arc<CompiledRule>>>,
    variables: Variables,
}

impl RuleSet {
    pub fn new() -> Self {
        Self {
            variables: Variables::new(),
            ..Self::default()
        }
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    /// Add one parsed rule. Duplicate sid is an error.
    pub fn add_rule(&mut self, rule: Rule) -> Result<()> {
        let sid = rule.sid();
        if self.by_sid.contains_key(&sid) {
            return Err(SigError::DuplicateSid(sid));
        }

        let compiled = Arc::new(CompiledRule::compile(rule, self.ordered.len())?);
        self.index_rule(&compiled);
        self.by_sid.insert(sid, compiled.clone());
        self.ordered.push(compiled);
        Ok(())
    }

    fn index_rule(&mut self, rule: &Arc<CompiledRule>) {
        let ports = self.variables.concrete_ports(&rule.rule.dst_port);
        if ports.is_empty() {
            let key = RuleKey {
                protocol: rule.rule.protocol,
                dst_port: None,
            };
            self.index.entry(key).or_default().push(rule.clone());
        } else {
            for port in ports {
                let key = RuleKey {
                    protocol: rule.rule.protocol,
                    dst_port: Some(port),
                };
                self.index.entry(key).or_default().push(rule.clone());
            }
        }
    }

    /// Rules that might match the given protocol and destination port, in
    /// load order
    pub fn candidate_rules(&self, protocol: Protocol, dst_port: u16) -> Vec<Arc<CompiledRule>> {
        let mut candidates: Vec<Arc<CompiledRule>> = Vec::new();

        for rule_proto in [Protocol::Tcp, Protocol::Udp, Protocol::Http, Protocol::Ip] {
            if !rule_proto.applies_to(protocol) {
                continue;
            }
            for dst_port in [Some(dst_port), None] {
                let key = RuleKey {
                    protocol: rule_proto,
                    dst_port,
                };
                if let Some(rules) = self.index.get(&key) {
                    candidates.extend(rules.iter().cloned());
                }
            }
        }

        candidates.sort_by_key(|r| r.position);
        candidates.dedup_by_key(|r| r.position);
        candidates
    }

    pub fn get(&self, sid: u32) -> Option<&Arc<CompiledRule>> {
        self.by_sid.get(&sid)
    }

    /// All rules in load order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CompiledRule>> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Load rules from text. Parse/compile failures are skipped and reported;
    /// a duplicate sid fails the whole load.
    pub fn load_from_str(&mut self, text: &str, source: &str) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for (idx, line) in text.lines().enumerate() {
            let line_num = idx + 1;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with("var ") {
                match self.variables.parse_var_line(line) {
                    Ok(()) => debug!(source, line_num, "loaded variable"),
                    Err(e) => {
                        warn!(source, line_num, error = %e, "bad variable line");
                        report.skipped.push(SkippedRule {
                            line: line_num,
                            error: e,
                        });
                    }
                }
                continue;
            }

            let rule = match parse_rule(line) {
                Ok(rule) => rule,
                Err(e) => {
                    warn!(source, line_num, error = %e, "skipping malformed rule");
                    report.skipped.push(SkippedRule {
                        line: line_num,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match self.add_rule(rule) {
                Ok(()) => report.loaded += 1,
                Err(e @ SigError::DuplicateSid(_)) => {
                    // Ambiguous alert attribution: abort the whole load
                    warn!(source, line_num, error = %e, "duplicate sid, aborting load");
                    return Err(e);
                }
                Err(e) => {
                    warn!(source, line_num, error = %e, "skipping uncompilable rule");
                    report.skipped.push(SkippedRule {
                        line: line_num,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            source,
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "rule source loaded"
        );
        Ok(report)
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<LoadReport> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        self.load_from_str(&text, &path.display().to_string())
    }

    pub fn load_from_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        for path in paths {
            report.merge(self.load_from_file(path)?);
        }
        Ok(report)
    }

    /// Aggregate statistics over the loaded rules
    pub fn stats(&self) -> RuleSetStats {
        let mut by_protocol = AHashMap::new();
        let mut by_classtype = AHashMap::new();
        let mut chain_rules = 0;

        for rule in &self.ordered {
            *by_protocol.entry(rule.rule.protocol).or_insert(0usize) += 1;
            if let Some(ref classtype) = rule.rule.options.classtype {
                *by_classtype.entry(classtype.clone()).or_insert(0usize) += 1;
            }
            if rule.rule.is_chain_stage() {
                chain_rules += 1;
            }
        }

        RuleSetStats {
            total_rules: self.ordered.len(),
            chain_rules,
            by_protocol,
            by_classtype,
        }
    }
}

/// Statistics about a rule set
#[derive(Debug, Clone)]
pub struct RuleSetStats {
    pub total_rules: usize,
    pub chain_rules: usize,
    pub by_protocol: AHashMap<Protocol, usize>,
    pub by_classtype: AHashMap<String, usize>,
}

impl std::fmt::Display for RuleSetStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Rule Set Statistics:")?;
        writeln!(f, "  Total rules: {}", self.total_rules)?;
        writeln!(f, "  Chain-stage rules: {}", self.chain_rules)?;
        writeln!(f, "  By protocol:")?;
        for (proto, count) in &self.by_protocol {
            writeln!(f, "    {}: {}", proto, count)?;
        }
        writeln!(f, "  By classtype:")?;
        for (classtype, count) in &self.by_classtype {
            writeln!(f, "    {}: {}", classtype, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_RULES: &str = r#"
# comment line

alert tcp any any -> any 80 (msg:"first"; content:"union", nocase; sid:1;)
alert tcp any any -> any any (msg:"second"; content:"select"; sid:2;)
"#;

    #[test]
    fn test_load_preserves_order() {
        let mut set = RuleSet::new();
        let report = set.load_from_str(TWO_RULES, "test").unwrap();
        assert_eq!(report.loaded, 2);
        assert!(report.skipped.is_empty());

        let sids: Vec<u32> = set.iter().map(|r| r.sid()).collect();
        assert_eq!(sids, vec![1, 2]);
    }

    #[test]
    fn test_duplicate_sid_fails_load() {
        let text = r#"
alert tcp any any -> any 80 (msg:"a"; content:"x"; sid:7;)
alert tcp any any -> any 443 (msg:"b"; content:"y"; sid:7;)
"#;
        let mut set = RuleSet::new();
        let err = set.load_from_str(text, "test").unwrap_err();
        assert!(matches!(err, SigError::DuplicateSid(7)));
    }

    #[test]
    fn test_malformed_rule_skipped_with_line_number() {
        let text = r#"
alert tcp any any -> any 80 (msg:"good"; content:"x"; sid:1;)
this is not a rule
alert tcp any any -> any 80 (msg:"also good"; content:"y"; sid:2;)
"#;
        let mut set = RuleSet::new();
        let report = set.load_from_str(text, "test").unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].line, 3);
    }

    #[test]
    fn test_bad_pcre_skipped_at_load() {
        let text = r#"alert tcp any any -> any 80 (msg:"bad re"; pcre:"/[unclosed/"; sid:3;)"#;
        let mut set = RuleSet::new();
        let report = set.load_from_str(text, "test").unwrap();
        assert_eq!(report.loaded, 0);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].error.contains("invalid pcre"));
    }

    #[test]
    fn test_candidate_lookup() {
        let mut set = RuleSet::new();
        set.load_from_str(TWO_RULES, "test").unwrap();

        // Port 80 sees both the port-80 rule and the any-port rule
        let candidates = set.candidate_rules(Protocol::Tcp, 80);
        let sids: Vec<u32> = candidates.iter().map(|r| r.sid()).collect();
        assert_eq!(sids, vec![1, 2]);

        // Port 443 only sees the any-port rule
        let candidates = set.candidate_rules(Protocol::Tcp, 443);
        let sids: Vec<u32> = candidates.iter().map(|r| r.sid()).collect();
        assert_eq!(sids, vec![2]);
    }

    #[test]
    fn test_http_rules_apply_to_tcp_traffic() {
        let text = r#"alert http any any -> any any (msg:"h"; content:"csrf"; sid:9;)"#;
        let mut set = RuleSet::new();
        set.load_from_str(text, "test").unwrap();

        let candidates = set.candidate_rules(Protocol::Tcp, 80);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].sid(), 9);
    }

    #[test]
    fn test_port_variable_expansion_in_index() {
        let text = r#"
var HTTP_PORTS [80,8080]
alert tcp any any -> any $HTTP_PORTS (msg:"v"; content:"x"; sid:4;)
"#;
        let mut set = RuleSet::new();
        set.load_from_str(text, "test").unwrap();

        assert_eq!(set.candidate_rules(Protocol::Tcp, 8080).len(), 1);
        assert!(set.candidate_rules(Protocol::Tcp, 22).is_empty());
    }

    #[test]
    fn test_stats() {
        let mut set = RuleSet::new();
        set.load_from_str(
            r#"alert tcp any any -> any 80 (msg:"a"; content:"x"; classtype:web-application-attack; sid:1;)"#,
            "test",
        )
        .unwrap();

        let stats = set.stats();
        assert_eq!(stats.total_rules, 1);
        assert_eq!(stats.by_classtype.get("web-application-attack"), Some(&1));
    }
}
