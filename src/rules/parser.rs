/// Rule parser: nom combinators for the header, option list by hand.
///
/// Accepted grammar (one rule per line):
///   action protocol src_ip src_port dir dst_ip dst_port ( option; option; ... )
///
/// Content modifiers are accepted both inline (`content:"union", nocase,
/// distance 0`) and as trailing standalone options (`content:"union"; nocase;
/// distance:0;`). A standalone `http_uri;` is a sticky buffer: it anchors all
/// subsequent content/pcre conditions to the URI region.
use super::rule::*;
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, digit1, space1},
    combinator::{map, map_res, recognize, value},
    multi::separated_list1,
    sequence::{delimited, preceded, separated_pair, tuple},
    IResult,
};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// What went wrong while parsing one rule line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    MalformedHeader,
    UnknownOption,
    MissingSid,
    DuplicateOptionKey,
    BadOptionValue,
    BadPcre,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParseErrorKind::MalformedHeader => "malformed header",
            ParseErrorKind::UnknownOption => "unknown option",
            ParseErrorKind::MissingSid => "missing sid",
            ParseErrorKind::DuplicateOptionKey => "duplicate option key",
            ParseErrorKind::BadOptionValue => "bad option value",
            ParseErrorKind::BadPcre => "bad pcre",
        };
        f.write_str(s)
    }
}

/// Rule parse failure; parsing is a pure function over the rule text
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub detail: String,
}

impl ParseError {
    fn new(kind: ParseErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Parse a complete rule line
pub fn parse_rule(input: &str) -> Result<Rule, ParseError> {
    let input = input.trim();

    let open = input.find('(').ok_or_else(|| {
        ParseError::new(ParseErrorKind::MalformedHeader, "missing option list")
    })?;
    let close = input.rfind(')').ok_or_else(|| {
        ParseError::new(ParseErrorKind::MalformedHeader, "unterminated option list")
    })?;
    if close < open {
        return Err(ParseError::new(
            ParseErrorKind::MalformedHeader,
            "option list before header",
        ));
    }

    let (header_text, body) = (&input[..open], &input[open + 1..close]);

    let (rest, header) = parse_header(header_text.trim())
        .map_err(|e| ParseError::new(ParseErrorKind::MalformedHeader, format!("{:?}", e)))?;
    if !rest.trim().is_empty() {
        return Err(ParseError::new(
            ParseErrorKind::MalformedHeader,
            format!("trailing header text: {:?}", rest),
        ));
    }

    let options = parse_options(body)?;

    let (action, protocol, src_ip, src_port, direction, dst_ip, dst_port) = header;
    Ok(Rule {
        action,
        protocol,
        src_ip,
        src_port,
        direction,
        dst_ip,
        dst_port,
        options,
    })
}

type Header = (
    RuleAction,
    Protocol,
    IpSpec,
    PortSpec,
    Direction,
    IpSpec,
    PortSpec,
);

fn parse_header(input: &str) -> IResult<&str, Header> {
    let (input, action) = parse_action(input)?;
    let (input, _) = space1(input)?;
    let (input, protocol) = parse_protocol(input)?;
    let (input, _) = space1(input)?;
    let (input, src_ip) = parse_ip_spec(input)?;
    let (input, _) = space1(input)?;
    let (input, src_port) = parse_port_spec(input)?;
    let (input, _) = space1(input)?;
    let (input, direction) = parse_direction(input)?;
    let (input, _) = space1(input)?;
    let (input, dst_ip) = parse_ip_spec(input)?;
    let (input, _) = space1(input)?;
    let (input, dst_port) = parse_port_spec(input)?;

    Ok((
        input,
        (action, protocol, src_ip, src_port, direction, dst_ip, dst_port),
    ))
}

fn parse_action(input: &str) -> IResult<&str, RuleAction> {
    alt((
        value(RuleAction::Alert, tag_no_case("alert")),
        value(RuleAction::Log, tag_no_case("log")),
        value(RuleAction::Pass, tag_no_case("pass")),
        value(RuleAction::Drop, tag_no_case("drop")),
        value(RuleAction::Reject, tag_no_case("reject")),
    ))(input)
}

fn parse_protocol(input: &str) -> IResult<&str, Protocol> {
    alt((
        value(Protocol::Tcp, tag_no_case("tcp")),
        value(Protocol::Udp, tag_no_case("udp")),
        value(Protocol::Http, tag_no_case("http")),
        value(Protocol::Ip, tag_no_case("ip")),
    ))(input)
}

fn parse_direction(input: &str) -> IResult<&str, Direction> {
    alt((
        value(Direction::Either, tag("<>")),
        value(Direction::To, tag("->")),
    ))(input)
}

pub(crate) fn parse_ip_spec(input: &str) -> IResult<&str, IpSpec> {
    alt((
        map(preceded(char('!'), parse_ip_spec_inner), |spec| {
            IpSpec::Not(Box::new(spec))
        }),
        map(
            delimited(
                char('['),
                separated_list1(char(','), parse_ip_spec),
                char(']'),
            ),
            IpSpec::List,
        ),
        parse_ip_spec_inner,
    ))(input)
}

fn parse_ip_spec_inner(input: &str) -> IResult<&str, IpSpec> {
    alt((
        value(IpSpec::Any, tag_no_case("any")),
        map(
            preceded(char('$'), take_while1(is_variable_char)),
            |s: &str| IpSpec::Variable(s.to_string()),
        ),
        map(
            tuple((parse_ip_addr, char('/'), parse_u8)),
            |(addr, _, prefix_len)| IpSpec::Cidr { addr, prefix_len },
        ),
        map(parse_ip_addr, IpSpec::Addr),
    ))(input)
}

fn parse_ip_addr(input: &str) -> IResult<&str, IpAddr> {
    map_res(
        recognize(alt((
            recognize(tuple((
                digit1,
                char('.'),
                digit1,
                char('.'),
                digit1,
                char('.'),
                digit1,
            ))),
            recognize(take_while1(|c: char| c.is_ascii_hexdigit() || c == ':')),
        ))),
        |s: &str| s.parse::<IpAddr>(),
    )(input)
}

pub(crate) fn parse_port_spec(input: &str) -> IResult<&str, PortSpec> {
    alt((
        map(preceded(char('!'), parse_port_spec_inner), |spec| {
            PortSpec::Not(Box::new(spec))
        }),
        map(
            delimited(
                char('['),
                separated_list1(char(','), parse_port_spec),
                char(']'),
            ),
            PortSpec::List,
        ),
        parse_port_spec_inner,
    ))(input)
}

fn parse_port_spec_inner(input: &str) -> IResult<&str, PortSpec> {
    alt((
        value(PortSpec::Any, tag_no_case("any")),
        map(
            preceded(char('$'), take_while1(is_variable_char)),
            |s: &str| PortSpec::Variable(s.to_string()),
        ),
        map(
            separated_pair(parse_u16, char(':'), parse_u16),
            |(start, end)| PortSpec::Range(start, end),
        ),
        map(parse_u16, PortSpec::Port),
    ))(input)
}

fn parse_u8(input: &str) -> IResult<&str, u8> {
    map_res(digit1, |s: &str| s.parse::<u8>())(input)
}

fn parse_u16(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |s: &str| s.parse::<u16>())(input)
}

fn is_variable_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// ---------------------------------------------------------------------------
// Option list
// ---------------------------------------------------------------------------

fn parse_options(body: &str) -> Result<RuleOptions, ParseError> {
    let mut options = RuleOptions::default();
    let mut seen_sid = false;
    // Sticky URI buffer: `http_uri;` anchors subsequent conditions
    let mut uri_sticky = false;

    for raw in split_options(body) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (key, val) = match split_key_value(raw) {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (raw, None),
        };

        match key {
            "msg" => {
                if options.msg.is_some() {
                    return Err(dup(key));
                }
                options.msg = Some(unquote(require_value(key, val)?).to_string());
            }
            "sid" => {
                if seen_sid {
                    return Err(dup(key));
                }
                seen_sid = true;
                options.sid = parse_num(key, require_value(key, val)?)?;
                if options.sid == 0 {
                    return Err(ParseError::new(
                        ParseErrorKind::BadOptionValue,
                        "sid must be a positive integer",
                    ));
                }
            }
            "rev" => {
                if options.rev.is_some() {
                    return Err(dup(key));
                }
                options.rev = Some(parse_num(key, require_value(key, val)?)?);
            }
            "classtype" => {
                if options.classtype.is_some() {
                    return Err(dup(key));
                }
                options.classtype = Some(require_value(key, val)?.to_string());
            }
            "priority" => {
                if options.priority.is_some() {
                    return Err(dup(key));
                }
                options.priority = Some(parse_num(key, require_value(key, val)?)?);
            }
            "reference" => {
                options.reference.push(require_value(key, val)?.to_string());
            }
            "flow" => {
                if options.flow.is_some() {
                    return Err(dup(key));
                }
                options.flow = Some(parse_flow(require_value(key, val)?)?);
            }
            "content" => {
                let content = parse_content_option(require_value(key, val)?, uri_sticky)?;
                options.conditions.push(Condition::Content(content));
            }
            "pcre" => {
                let expr = unquote(require_value(key, val)?).to_string();
                check_pcre_framing(&expr)?;
                options.conditions.push(Condition::Pcre(PcreMatch {
                    expr,
                    uri_only: uri_sticky,
                }));
            }
            "http_uri" => {
                if val.is_some() {
                    return Err(ParseError::new(
                        ParseErrorKind::BadOptionValue,
                        "http_uri takes no value",
                    ));
                }
                uri_sticky = true;
            }
            "http_method" => {
                let value = unquote(require_value(key, val)?).to_string();
                options.conditions.push(Condition::Field(FieldMatch {
                    field: HttpField::Method,
                    value,
                }));
            }
            "nocase" => {
                last_content(&mut options, key)?.nocase = true;
            }
            "distance" => {
                last_content(&mut options, key)?.distance =
                    Some(parse_num(key, require_value(key, val)?)?);
            }
            "within" => {
                last_content(&mut options, key)?.within =
                    Some(parse_num(key, require_value(key, val)?)?);
            }
            "flowbits" => {
                options
                    .flowbits
                    .push(parse_flowbits(require_value(key, val)?)?);
            }
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::UnknownOption,
                    other.to_string(),
                ));
            }
        }
    }

    if !seen_sid {
        return Err(ParseError::new(
            ParseErrorKind::MissingSid,
            "every rule requires a sid option",
        ));
    }

    Ok(options)
}

fn dup(key: &str) -> ParseError {
    ParseError::new(ParseErrorKind::DuplicateOptionKey, key.to_string())
}

fn require_value<'a>(key: &str, val: Option<&'a str>) -> Result<&'a str, ParseError> {
    val.ok_or_else(|| {
        ParseError::new(
            ParseErrorKind::BadOptionValue,
            format!("{} requires a value", key),
        )
    })
}

fn parse_num<T: std::str::FromStr>(key: &str, val: &str) -> Result<T, ParseError> {
    val.trim().parse().map_err(|_| {
        ParseError::new(
            ParseErrorKind::BadOptionValue,
            format!("{}: not a number: {:?}", key, val),
        )
    })
}

fn last_content<'a>(
    options: &'a mut RuleOptions,
    key: &str,
) -> Result<&'a mut ContentMatch, ParseError> {
    options
        .conditions
        .iter_mut()
        .rev()
        .find_map(|c| match c {
            Condition::Content(c) => Some(c),
            _ => None,
        })
        .ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::BadOptionValue,
                format!("{} must follow a content option", key),
            )
        })
}

/// Split the option body on `;`, honoring double quotes and backslash escapes
fn split_options(body: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                out.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < body.len() {
        out.push(&body[start..]);
    }
    out
}

/// Split `key:value` at the first colon outside quotes; `None` for bare keys
fn split_key_value(opt: &str) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    for (i, c) in opt.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => return Some((&opt[..i], &opt[i + 1..])),
            _ => {}
        }
    }
    None
}

fn unquote(val: &str) -> &str {
    let val = val.trim();
    val.strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(val)
}

/// Parse `flow:established,to_server`
fn parse_flow(val: &str) -> Result<FlowSpec, ParseError> {
    let mut spec = FlowSpec::default();
    for token in val.split(',') {
        match token.trim() {
            "established" => spec.established = true,
            "to_server" | "from_client" => spec.direction = Some(FlowDirection::ToServer),
            "to_client" | "from_server" => spec.direction = Some(FlowDirection::ToClient),
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::BadOptionValue,
                    format!("flow: unknown keyword {:?}", other),
                ));
            }
        }
    }
    Ok(spec)
}

/// Parse `flowbits:set,name` / `isset,name` / `unset,name` / `noalert`
fn parse_flowbits(val: &str) -> Result<FlowbitsOp, ParseError> {
    let mut parts = val.splitn(2, ',').map(str::trim);
    let op = parts.next().unwrap_or("");
    let name = parts.next();

    let named = |name: Option<&str>| -> Result<String, ParseError> {
        name.filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::BadOptionValue,
                    format!("flowbits:{} requires a bit name", op),
                )
            })
    };

    match op {
        "set" => Ok(FlowbitsOp::Set(named(name)?)),
        "unset" => Ok(FlowbitsOp::Unset(named(name)?)),
        "isset" => Ok(FlowbitsOp::Isset(named(name)?)),
        "noalert" => Ok(FlowbitsOp::Noalert),
        other => Err(ParseError::new(
            ParseErrorKind::BadOptionValue,
            format!("flowbits: unknown operation {:?}", other),
        )),
    }
}

/// Parse a content option value: quoted pattern plus optional inline
/// comma-separated modifiers (`"union", nocase, distance 0`)
fn parse_content_option(val: &str, uri_sticky: bool) -> Result<ContentMatch, ParseError> {
    let val = val.trim();
    if !val.starts_with('"') {
        return Err(ParseError::new(
            ParseErrorKind::BadOptionValue,
            "content pattern must be quoted",
        ));
    }

    let (pattern_text, rest) = take_quoted(val)?;
    let mut content = ContentMatch {
        pattern: decode_content_pattern(pattern_text),
        nocase: false,
        distance: None,
        within: None,
        uri_only: uri_sticky,
    };
    if content.pattern.is_empty() {
        return Err(ParseError::new(
            ParseErrorKind::BadOptionValue,
            "empty content pattern",
        ));
    }

    for modifier in rest.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        // Inline form allows `distance 0` and `distance:0`
        let mut words = modifier
            .splitn(2, |c| c == ' ' || c == ':')
            .map(str::trim);
        match (words.next().unwrap_or(""), words.next()) {
            ("nocase", None) => content.nocase = true,
            ("distance", Some(n)) => content.distance = Some(parse_num("distance", n)?),
            ("within", Some(n)) => content.within = Some(parse_num("within", n)?),
            _ => {
                return Err(ParseError::new(
                    ParseErrorKind::BadOptionValue,
                    format!("unknown content modifier {:?}", modifier),
                ));
            }
        }
    }

    Ok(content)
}

/// Take a leading quoted string, returning (inner text, remainder after the
/// closing quote). Escaped quotes stay in the inner text for the decoder.
fn take_quoted(val: &str) -> Result<(&str, &str), ParseError> {
    debug_assert!(val.starts_with('"'));
    let inner = &val[1..];
    let mut escaped = false;
    for (i, c) in inner.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => return Ok((&inner[..i], &inner[i + 1..])),
            _ => {}
        }
    }
    Err(ParseError::new(
        ParseErrorKind::BadOptionValue,
        "unterminated quoted string",
    ))
}

/// Decode a content pattern (hex notation |XX XX| and escaped chars)
fn decode_content_pattern(input: &str) -> Vec<u8> {
    let mut result = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '|' => {
                let mut hex_str = String::new();
                for ch in chars.by_ref() {
                    if ch == '|' {
                        break;
                    }
                    hex_str.push(ch);
                }
                for hex_byte in hex_str.split_whitespace() {
                    if let Ok(byte) = u8::from_str_radix(hex_byte, 16) {
                        result.push(byte);
                    }
                }
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    match next {
                        'n' => result.push(b'\n'),
                        'r' => result.push(b'\r'),
                        't' => result.push(b'\t'),
                        '\\' => result.push(b'\\'),
                        '"' => result.push(b'"'),
                        _ => {
                            result.push(b'\\');
                            result.push(next as u8);
                        }
                    }
                }
            }
            _ => result.push(c as u8),
        }
    }

    result
}

/// Light framing check for pcre values; full compilation happens at load time
fn check_pcre_framing(expr: &str) -> Result<(), ParseError> {
    let rest = expr.strip_prefix('/').ok_or_else(|| {
        ParseError::new(ParseErrorKind::BadPcre, "pcre must start with /")
    })?;
    if !rest.contains('/') {
        return Err(ParseError::new(
            ParseErrorKind::BadPcre,
            "pcre must be in /pattern/flags form",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_rule() {
        let rule =
            parse_rule(r#"alert tcp any any -> any 80 (msg:"Test"; sid:1;)"#).unwrap();
        assert_eq!(rule.action, RuleAction::Alert);
        assert_eq!(rule.protocol, Protocol::Tcp);
        assert_eq!(rule.src_ip, IpSpec::Any);
        assert_eq!(rule.dst_port, PortSpec::Port(80));
        assert_eq!(rule.sid(), 1);
        assert_eq!(rule.message(), Some("Test"));
    }

    #[test]
    fn test_parse_inline_content_modifiers() {
        let rule = parse_rule(
            r#"alert tcp any any -> any 80 (msg:"UNION SELECT"; flow:established,to_server; content:"union", nocase; content:"select", nocase, distance 0; classtype:web-application-attack; sid:1000001;)"#,
        )
        .unwrap();

        assert_eq!(rule.options.conditions.len(), 2);
        let flow = rule.options.flow.unwrap();
        assert!(flow.established);
        assert_eq!(flow.direction, Some(FlowDirection::ToServer));

        match (&rule.options.conditions[0], &rule.options.conditions[1]) {
            (Condition::Content(first), Condition::Content(second)) => {
                assert_eq!(first.pattern, b"union");
                assert!(first.nocase);
                assert_eq!(first.distance, None);
                assert_eq!(second.pattern, b"select");
                assert!(second.nocase);
                assert_eq!(second.distance, Some(0));
            }
            other => panic!("unexpected conditions: {:?}", other),
        }
    }

    #[test]
    fn test_parse_standalone_content_modifiers() {
        let rule = parse_rule(
            r#"alert tcp any any -> any 80 (msg:"x"; content:"drop"; nocase; content:"table"; nocase; distance:0; sid:2;)"#,
        )
        .unwrap();

        match &rule.options.conditions[1] {
            Condition::Content(c) => {
                assert!(c.nocase);
                assert_eq!(c.distance, Some(0));
            }
            other => panic!("unexpected condition: {:?}", other),
        }
    }

    #[test]
    fn test_http_uri_sticky_buffer() {
        let rule = parse_rule(
            r#"alert tcp any any -> any 80 (msg:"encoded script in URI"; http_uri; content:"%3cscript%3e", nocase; sid:3;)"#,
        )
        .unwrap();

        match &rule.options.conditions[0] {
            Condition::Content(c) => {
                assert!(c.uri_only);
                assert!(c.nocase);
            }
            other => panic!("unexpected condition: {:?}", other),
        }
    }

    #[test]
    fn test_parse_flowbits_chain_pair() {
        let stage1 = parse_rule(
            r#"alert http any any -> any any (msg:"stage1"; flow:to_server,established; http_uri; content:"/DVWA/vulnerabilities/csrf/"; flowbits:set,dvwa.csrf.page; flowbits:noalert; sid:10;)"#,
        )
        .unwrap();
        assert!(stage1.is_noalert());
        assert!(stage1
            .options
            .flowbits
            .contains(&FlowbitsOp::Set("dvwa.csrf.page".to_string())));

        let stage2 = parse_rule(
            r#"alert http any any -> any any (msg:"stage2"; flowbits:isset,dvwa.csrf.page; flowbits:unset,dvwa.csrf.page; http_uri; content:"password_new"; sid:11;)"#,
        )
        .unwrap();
        let required: Vec<&str> = stage2.required_flowbits().collect();
        assert_eq!(required, vec!["dvwa.csrf.page"]);
    }

    #[test]
    fn test_parse_pcre_with_flags() {
        let rule = parse_rule(
            r#"alert tcp any any -> any 80 (msg:"stored xss"; content:"mtxMessage=", nocase; pcre:"/(?:%3C|<)img[^>]*onerror/i"; sid:4;)"#,
        )
        .unwrap();

        match &rule.options.conditions[1] {
            Condition::Pcre(p) => assert_eq!(p.expr, "/(?:%3C|<)img[^>]*onerror/i"),
            other => panic!("unexpected condition: {:?}", other),
        }
    }

    #[test]
    fn test_missing_sid() {
        let err = parse_rule(r#"alert tcp any any -> any 80 (msg:"no sid";)"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingSid);
    }

    #[test]
    fn test_duplicate_option_key() {
        let err =
            parse_rule(r#"alert tcp any any -> any 80 (msg:"a"; msg:"b"; sid:1;)"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::DuplicateOptionKey);
    }

    #[test]
    fn test_unknown_option() {
        let err =
            parse_rule(r#"alert tcp any any -> any 80 (msg:"a"; bogus:1; sid:1;)"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnknownOption);
    }

    #[test]
    fn test_malformed_header() {
        let err = parse_rule(r#"alert tcp any any any 80 (sid:1;)"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MalformedHeader);
    }

    #[test]
    fn test_decode_content_pattern() {
        assert_eq!(decode_content_pattern("GET"), b"GET");
        assert_eq!(decode_content_pattern("|48 65 6C 6C 6F|"), b"Hello");
        assert_eq!(decode_content_pattern("GET |0D 0A|"), b"GET \r\n");
        assert_eq!(decode_content_pattern(r#"\"quoted\""#), b"\"quoted\"");
    }

    #[test]
    fn test_semicolon_inside_msg() {
        let rule =
            parse_rule(r#"alert tcp any any -> any 80 (msg:"a;b"; sid:9;)"#).unwrap();
        assert_eq!(rule.message(), Some("a;b"));
    }

    #[test]
    fn test_parse_header_specs() {
        let rule = parse_rule(
            r#"alert tcp $EXTERNAL_NET any -> $HOME_NET [80,8080] (msg:"vars"; sid:5;)"#,
        )
        .unwrap();
        assert_eq!(rule.src_ip, IpSpec::Variable("EXTERNAL_NET".to_string()));
        assert_eq!(rule.dst_ip, IpSpec::Variable("HOME_NET".to_string()));
        assert_eq!(
            rule.dst_port,
            PortSpec::List(vec![PortSpec::Port(80), PortSpec::Port(8080)])
        );
    }
}
