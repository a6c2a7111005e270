/// Suricata/Snort-compatible rule structures
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Rule action to take when a match occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Generate an alert
    Alert,
    /// Log the request
    Log,
    /// Pass the request (allow)
    Pass,
    /// Drop the request (inline mode)
    Drop,
    /// Reject and signal the peer
    Reject,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Alert => write!(f, "alert"),
            RuleAction::Log => write!(f, "log"),
            RuleAction::Pass => write!(f, "pass"),
            RuleAction::Drop => write!(f, "drop"),
            RuleAction::Reject => write!(f, "reject"),
        }
    }
}

/// Protocol to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Ip, // Any IP protocol
}

impl Protocol {
    /// Whether a rule declared for `self` applies to traffic observed as `observed`.
    /// `ip` rules apply to everything; `http` and `tcp` cover each other since
    /// HTTP requests ride on TCP connections.
    pub fn applies_to(self, observed: Protocol) -> bool {
        match self {
            Protocol::Ip => true,
            Protocol::Http | Protocol::Tcp => {
                matches!(observed, Protocol::Http | Protocol::Tcp)
            }
            other => other == observed,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Http => write!(f, "http"),
            Protocol::Ip => write!(f, "ip"),
        }
    }
}

/// IP address specification (single IP, CIDR, variable, negated, or any)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpSpec {
    /// Any IP address
    Any,
    /// Specific IP address
    Addr(IpAddr),
    /// CIDR notation (e.g., 192.168.1.0/24)
    Cidr { addr: IpAddr, prefix_len: u8 },
    /// Variable reference (e.g., $HOME_NET)
    Variable(String),
    /// List of IP specifications
    List(Vec<IpSpec>),
    /// Negated IP specification
    Not(Box<IpSpec>),
}

impl fmt::Display for IpSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpSpec::Any => write!(f, "any"),
            IpSpec::Addr(addr) => write!(f, "{}", addr),
            IpSpec::Cidr { addr, prefix_len } => write!(f, "{}/{}", addr, prefix_len),
            IpSpec::Variable(var) => write!(f, "${}", var),
            IpSpec::List(list) => {
                write!(f, "[")?;
                for (i, spec) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", spec)?;
                }
                write!(f, "]")
            }
            IpSpec::Not(spec) => write!(f, "!{}", spec),
        }
    }
}

/// Port specification (single port, range, variable, or any)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// Any port
    Any,
    /// Specific port
    Port(u16),
    /// Port range (inclusive)
    Range(u16, u16),
    /// Variable reference (e.g., $HTTP_PORTS)
    Variable(String),
    /// List of port specifications
    List(Vec<PortSpec>),
    /// Negated port specification
    Not(Box<PortSpec>),
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Any => write!(f, "any"),
            PortSpec::Port(port) => write!(f, "{}", port),
            PortSpec::Range(start, end) => write!(f, "{}:{}", start, end),
            PortSpec::Variable(var) => write!(f, "${}", var),
            PortSpec::List(list) => {
                write!(f, "[")?;
                for (i, spec) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", spec)?;
                }
                write!(f, "]")
            }
            PortSpec::Not(spec) => write!(f, "!{}", spec),
        }
    }
}

/// Direction of traffic in the rule header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Unidirectional: source -> destination
    To,
    /// Bidirectional: source <> destination
    Either,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::To => write!(f, "->"),
            Direction::Either => write!(f, "<>"),
        }
    }
}

/// Flow direction for stateful inspection (and for tagging observed requests)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    ToServer,
    ToClient,
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowDirection::ToServer => write!(f, "to_server"),
            FlowDirection::ToClient => write!(f, "to_client"),
        }
    }
}

/// Flow state specification (`flow:established,to_server`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowSpec {
    /// Connection must be established
    pub established: bool,
    /// Required request direction
    pub direction: Option<FlowDirection>,
}

/// Content matching options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMatch {
    /// Pattern to match, stored verbatim (nocase is applied at match time)
    pub pattern: Vec<u8>,
    /// Case-insensitive matching
    pub nocase: bool,
    /// Minimum gap from the end of the previous condition's match.
    /// Ignored on the first condition of a rule.
    pub distance: Option<usize>,
    /// Maximum span from the end of the previous match within which
    /// this pattern must end
    pub within: Option<usize>,
    /// Restrict the search to the extracted URI region
    pub uri_only: bool,
}

/// PCRE matching options; the expression is compiled once at load time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcreMatch {
    /// Raw `/pattern/flags` text as it appeared in the rule
    pub expr: String,
    /// Restrict the search to the extracted URI region
    pub uri_only: bool,
}

/// HTTP request field targeted by a field condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpField {
    Method,
}

/// Exact match on a protocol field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub field: HttpField,
    pub value: String,
}

/// One detection condition; a rule's conditions are AND-combined in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Content(ContentMatch),
    Pcre(PcreMatch),
    Field(FieldMatch),
}

/// Per-session flowbit operations, the chain-rule mechanism
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowbitsOp {
    /// Set a bit on the session when the rule matches
    Set(String),
    /// Clear a bit on the session when the rule matches
    Unset(String),
    /// Rule only matches if the bit is already set on the session
    Isset(String),
    /// Suppress the alert (state-setting stage rules)
    Noalert,
}

/// Rule options (the parenthesized body)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOptions {
    /// Rule message
    pub msg: Option<String>,
    /// Signature ID (required, unique per rule set)
    pub sid: u32,
    /// Revision number
    pub rev: Option<u32>,
    /// Classification type
    pub classtype: Option<String>,
    /// Priority (1=high, 2=medium, 3=low)
    pub priority: Option<u8>,
    /// Reference URLs
    pub reference: Vec<String>,
    /// Flow state requirement
    pub flow: Option<FlowSpec>,
    /// Detection conditions, evaluated strictly in listed order
    pub conditions: Vec<Condition>,
    /// Flowbit operations, applied/checked at evaluation time
    pub flowbits: Vec<FlowbitsOp>,
}

/// Complete rule: header plus options
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub action: RuleAction,
    pub protocol: Protocol,
    pub src_ip: IpSpec,
    pub src_port: PortSpec,
    pub direction: Direction,
    pub dst_ip: IpSpec,
    pub dst_port: PortSpec,
    pub options: RuleOptions,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} (sid:{}",
            self.action,
            self.protocol,
            self.src_ip,
            self.src_port,
            self.direction,
            self.dst_ip,
            self.dst_port,
            self.options.sid
        )?;

        if let Some(ref msg) = self.options.msg {
            write!(f, "; msg:\"{}\"", msg)?;
        }

        if let Some(rev) = self.options.rev {
            write!(f, "; rev:{}", rev)?;
        }

        write!(f, ";)")
    }
}

impl Rule {
    /// Get the rule's signature ID
    pub fn sid(&self) -> u32 {
        self.options.sid
    }

    /// Get the rule's message
    pub fn message(&self) -> Option<&str> {
        self.options.msg.as_deref()
    }

    /// Get the rule's priority (default to 3 if not set)
    pub fn priority(&self) -> u8 {
        self.options.priority.unwrap_or(3)
    }

    /// Flowbits the rule requires to be set before its conditions are checked
    pub fn required_flowbits(&self) -> impl Iterator<Item = &str> {
        self.options.flowbits.iter().filter_map(|op| match op {
            FlowbitsOp::Isset(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Whether the rule suppresses its own alert (`flowbits:noalert`)
    pub fn is_noalert(&self) -> bool {
        self.options
            .flowbits
            .iter()
            .any(|op| matches!(op, FlowbitsOp::Noalert))
    }

    /// Whether the rule is a chain stage (touches any flowbit)
    pub fn is_chain_stage(&self) -> bool {
        !self.options.flowbits.is_empty()
    }

    /// First content condition, used by the prefilter
    pub fn first_content(&self) -> Option<&ContentMatch> {
        self.options.conditions.iter().find_map(|c| match c {
            Condition::Content(c) => Some(c),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any_rule(sid: u32) -> Rule {
        Rule {
            action: RuleAction::Alert,
            protocol: Protocol::Tcp,
            src_ip: IpSpec::Any,
            src_port: PortSpec::Any,
            direction: Direction::To,
            dst_ip: IpSpec::Any,
            dst_port: PortSpec::Port(80),
            options: RuleOptions {
                sid,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_protocol_applicability() {
        assert!(Protocol::Ip.applies_to(Protocol::Tcp));
        assert!(Protocol::Ip.applies_to(Protocol::Udp));
        assert!(Protocol::Http.applies_to(Protocol::Tcp));
        assert!(Protocol::Http.applies_to(Protocol::Http));
        assert!(!Protocol::Http.applies_to(Protocol::Udp));
        assert!(Protocol::Tcp.applies_to(Protocol::Tcp));
        assert!(!Protocol::Tcp.applies_to(Protocol::Udp));
    }

    #[test]
    fn test_rule_accessors() {
        let mut rule = any_rule(1000001);
        rule.options.flowbits = vec![
            FlowbitsOp::Isset("dvwa.csrf.page".to_string()),
            FlowbitsOp::Unset("dvwa.csrf.page".to_string()),
        ];

        assert_eq!(rule.sid(), 1000001);
        assert_eq!(rule.priority(), 3);
        assert!(rule.is_chain_stage());
        assert!(!rule.is_noalert());
        let required: Vec<&str> = rule.required_flowbits().collect();
        assert_eq!(required, vec!["dvwa.csrf.page"]);
    }

    #[test]
    fn test_first_content_skips_pcre() {
        let mut rule = any_rule(7);
        rule.options.conditions = vec![
            Condition::Pcre(PcreMatch {
                expr: "/onerror/i".to_string(),
                uri_only: false,
            }),
            Condition::Content(ContentMatch {
                pattern: b"img".to_vec(),
                nocase: true,
                distance: None,
                within: None,
                uri_only: false,
            }),
        ];
        assert_eq!(rule.first_content().unwrap().pattern, b"img");
    }

    #[test]
    fn test_ip_spec_display() {
        assert_eq!(IpSpec::Any.to_string(), "any");
        assert_eq!(
            IpSpec::Variable("HOME_NET".to_string()).to_string(),
            "$HOME_NET"
        );
        assert_eq!(
            IpSpec::Not(Box::new(IpSpec::Any)).to_string(),
            "!any"
        );
    }

    #[test]
    fn test_port_spec_display() {
        assert_eq!(PortSpec::Any.to_string(), "any");
        assert_eq!(PortSpec::Port(80).to_string(), "80");
        assert_eq!(PortSpec::Range(8000, 8999).to_string(), "8000:8999");
        assert_eq!(
            PortSpec::List(vec![PortSpec::Port(80), PortSpec::Port(8080)]).to_string(),
            "[80,8080]"
        );
    }
}
