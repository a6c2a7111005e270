/// Rule variable expansion ($HOME_NET, $HTTP_PORTS, ...)
///
/// Variables come from three places: built-in defaults, `var` lines in rule
/// files, and the `variables` section of the config.
use super::parser::{parse_ip_spec, parse_port_spec};
use super::rule::{IpSpec, PortSpec};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Variables {
    ip_vars: HashMap<String, IpSpec>,
    port_vars: HashMap<String, PortSpec>,
}

impl Variables {
    /// Variables instance with common defaults (override via config/var lines)
    pub fn new() -> Self {
        let mut vars = Self::default();
        vars.set_ip_var("HOME_NET", IpSpec::Any);
        vars.set_ip_var(
            "EXTERNAL_NET",
            IpSpec::Not(Box::new(IpSpec::Variable("HOME_NET".to_string()))),
        );
        vars.set_port_var(
            "HTTP_PORTS",
            PortSpec::List(vec![PortSpec::Port(80), PortSpec::Port(8080)]),
        );
        vars.set_port_var("HTTPS_PORTS", PortSpec::Port(443));
        vars
    }

    pub fn set_ip_var(&mut self, name: &str, value: IpSpec) {
        self.ip_vars.insert(name.to_uppercase(), value);
    }

    pub fn set_port_var(&mut self, name: &str, value: PortSpec) {
        self.port_vars.insert(name.to_uppercase(), value);
    }

    pub fn get_ip_var(&self, name: &str) -> Option<&IpSpec> {
        self.ip_vars.get(&name.to_uppercase())
    }

    pub fn get_port_var(&self, name: &str) -> Option<&PortSpec> {
        self.port_vars.get(&name.to_uppercase())
    }

    /// Parse a `var NAME value` line from a rule file. The value is tried as
    /// a port spec first, then as an IP spec.
    pub fn parse_var_line(&mut self, line: &str) -> Result<(), String> {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("var") => {}
            _ => return Err(format!("not a var line: {:?}", line)),
        }
        let name = parts
            .next()
            .ok_or_else(|| "var line missing name".to_string())?;
        let value = parts
            .next()
            .ok_or_else(|| format!("var {} missing value", name))?;

        self.define(name, value)
    }

    /// Define a variable from its textual value (also used for config-supplied
    /// variables)
    pub fn define(&mut self, name: &str, value: &str) -> Result<(), String> {
        if let Ok(("", spec)) = parse_port_spec(value) {
            self.set_port_var(name, spec);
            return Ok(());
        }
        if let Ok(("", spec)) = parse_ip_spec(value) {
            self.set_ip_var(name, spec);
            return Ok(());
        }
        Err(format!("cannot parse value for variable {}: {:?}", name, value))
    }

    /// Resolve a port spec to concrete ports where possible; unresolvable
    /// specs (unknown vars, negations, wide ranges) yield an empty list and
    /// fall through to full matching
    pub fn concrete_ports(&self, spec: &PortSpec) -> Vec<u16> {
        match spec {
            PortSpec::Any => Vec::new(),
            PortSpec::Port(p) => vec![*p],
            PortSpec::Range(start, end) => {
                // Only expand small ranges; indexing thousands of ports is
                // worse than falling through
                if end.saturating_sub(*start) < 16 {
                    (*start..=*end).collect()
                } else {
                    Vec::new()
                }
            }
            PortSpec::List(list) => list.iter().flat_map(|s| self.concrete_ports(s)).collect(),
            PortSpec::Variable(name) => self
                .get_port_var(name)
                .cloned()
                .map(|s| self.concrete_ports(&s))
                .unwrap_or_default(),
            PortSpec::Not(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let vars = Variables::new();
        assert!(vars.get_ip_var("home_net").is_some());
        assert_eq!(
            vars.concrete_ports(&PortSpec::Variable("HTTP_PORTS".to_string())),
            vec![80, 8080]
        );
    }

    #[test]
    fn test_var_line() {
        let mut vars = Variables::new();
        vars.parse_var_line("var HTTP_PORTS [80,8000:8004]").unwrap();
        assert_eq!(
            vars.concrete_ports(&PortSpec::Variable("HTTP_PORTS".to_string())),
            vec![80, 8000, 8001, 8002, 8003, 8004]
        );

        vars.parse_var_line("var HOME_NET 192.168.1.0/24").unwrap();
        assert!(matches!(
            vars.get_ip_var("HOME_NET"),
            Some(IpSpec::Cidr { .. })
        ));
    }

    #[test]
    fn test_bad_var_line() {
        let mut vars = Variables::new();
        assert!(vars.parse_var_line("HTTP_PORTS 80").is_err());
        assert!(vars.parse_var_line("var ONLY_NAME").is_err());
    }

    #[test]
    fn test_unknown_variable_falls_through() {
        let vars = Variables::new();
        assert!(vars
            .concrete_ports(&PortSpec::Variable("NOPE".to_string()))
            .is_empty());
    }
}
