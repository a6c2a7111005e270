// Rule engine - Suricata/Snort-style rule parsing, compilation and indexing
pub mod matcher;
pub mod parser;
pub mod rule;
pub mod ruleset;
pub mod variables;

pub use matcher::{match_condition, CompiledCondition, MatchSpan, Prefilter, Region};
pub use parser::{parse_rule, ParseError, ParseErrorKind};
pub use rule::{
    Condition, ContentMatch, Direction, FieldMatch, FlowDirection, FlowSpec, FlowbitsOp,
    HttpField, IpSpec, PcreMatch, PortSpec, Protocol, Rule, RuleAction, RuleOptions,
};
pub use ruleset::{CompiledRule, LoadReport, RuleSet, RuleSetStats, SkippedRule};
pub use variables::Variables;
