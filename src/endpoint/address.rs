//! Text-form parsing and rendering for endpoint authorities.
//!
//! Accepted forms (spec.md §6): `"host"`, `"host:port"`, `"[ipv6]:port"`,
//! bare IPv4/IPv6 literals. Parsing is case-insensitive for hostnames and
//! rejects embedded whitespace and empty hosts.

use std::net::IpAddr;

use crate::error::FleetError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) enum HostKind {
    Hostname(String),
    IpLiteral(IpAddr),
}

impl HostKind {
    pub(super) fn as_str_buf(&self) -> String {
        match self {
            HostKind::Hostname(h) => h.clone(),
            HostKind::IpLiteral(ip) => ip.to_string(),
        }
    }
}

/// Parsed components of an authority string, before weight/attributes are
/// attached.
pub(super) struct ParsedAuthority {
    pub(super) host: HostKind,
    pub(super) port: u16,
}

fn reject_blank_or_whitespace(s: &str, whole: &str) -> Result<(), FleetError> {
    if s.is_empty() {
        return Err(FleetError::InvalidAddress(format!(
            "empty host in '{whole}'"
        )));
    }
    if s.chars().any(char::is_whitespace) {
        return Err(FleetError::InvalidAddress(format!(
            "whitespace not allowed in '{whole}'"
        )));
    }
    Ok(())
}

fn parse_port(raw: &str, whole: &str) -> Result<u16, FleetError> {
    let value: u32 = raw.parse().map_err(|_| {
        FleetError::InvalidAddress(format!("invalid port '{raw}' in '{whole}'"))
    })?;
    if value == 0 || value > 65_535 {
        return Err(FleetError::InvalidAddress(format!(
            "port {value} out of range [1, 65535] in '{whole}'"
        )));
    }
    Ok(value as u16)
}

fn host_from_str(raw: &str) -> HostKind {
    match raw.parse::<IpAddr>() {
        Ok(ip) => HostKind::IpLiteral(ip),
        Err(_) => HostKind::Hostname(raw.to_ascii_lowercase()),
    }
}

/// Parses `"host"`, `"host:port"`, `"[ipv6]:port"`, or a bare IPv4/IPv6
/// literal into its host and (possibly unspecified, `0`) port.
pub(super) fn parse_authority(input: &str) -> Result<ParsedAuthority, FleetError> {
    if input.is_empty() {
        return Err(FleetError::InvalidAddress("empty authority".into()));
    }
    if input.chars().any(char::is_whitespace) {
        return Err(FleetError::InvalidAddress(format!(
            "whitespace not allowed in '{input}'"
        )));
    }

    if let Some(rest) = input.strip_prefix('[') {
        let close = rest.find(']').ok_or_else(|| {
            FleetError::InvalidAddress(format!("unterminated '[' in '{input}'"))
        })?;
        let (addr_part, tail) = rest.split_at(close);
        reject_blank_or_whitespace(addr_part, input)?;
        let ip: IpAddr = addr_part
            .parse()
            .map_err(|_| FleetError::InvalidAddress(format!("invalid IPv6 literal in '{input}'")))?;
        let tail = &tail[1..]; // drop the ']'
        let port = if let Some(port_str) = tail.strip_prefix(':') {
            parse_port(port_str, input)?
        } else if tail.is_empty() {
            0
        } else {
            return Err(FleetError::InvalidAddress(format!(
                "unexpected trailing text after ']' in '{input}'"
            )));
        };
        return Ok(ParsedAuthority {
            host: HostKind::IpLiteral(ip),
            port,
        });
    }

    // A raw (unbracketed) IPv6 literal has no way to carry a port.
    if input.matches(':').count() > 1 {
        let ip: IpAddr = input
            .parse()
            .map_err(|_| FleetError::InvalidAddress(format!("invalid address '{input}'")))?;
        return Ok(ParsedAuthority {
            host: HostKind::IpLiteral(ip),
            port: 0,
        });
    }

    if let Some((host_part, port_part)) = input.split_once(':') {
        reject_blank_or_whitespace(host_part, input)?;
        let port = parse_port(port_part, input)?;
        return Ok(ParsedAuthority {
            host: host_from_str(host_part),
            port,
        });
    }

    reject_blank_or_whitespace(input, input)?;
    Ok(ParsedAuthority {
        host: host_from_str(input),
        port: 0,
    })
}

/// Renders `host[:port]`, bracket-escaping IPv6 literals.
pub(super) fn render_authority(host: &HostKind, port: u16) -> String {
    match host {
        HostKind::IpLiteral(IpAddr::V6(v6)) => {
            if port == 0 {
                format!("[{v6}]")
            } else {
                format!("[{v6}]:{port}")
            }
        }
        HostKind::IpLiteral(ip) => {
            if port == 0 {
                ip.to_string()
            } else {
                format!("{ip}:{port}")
            }
        }
        HostKind::Hostname(h) => {
            if port == 0 {
                h.clone()
            } else {
                format!("{h}:{port}")
            }
        }
    }
}
