//! `Endpoint`: an immutable host/port/weight/attribute value (spec.md §4.1).
//!
//! Construction is cheap and copy-on-write: `with_weight`/`with_ip_addr`/
//! `with_attributes` each return a new value sharing the unchanged parts.
//! Structural equality covers host/ip_addr/port only — weight and
//! attributes are observable metadata a selector cares about, but two
//! endpoints naming the same socket are still "the same endpoint" for set
//! membership purposes (spec.md §3).

mod address;

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::FleetError;
use address::{parse_authority, render_authority, HostKind};

/// An opaque, typed attribute value. The subsystem never interprets these;
/// the `"healthy"` boolean key is a convention some filtering layers built
/// on top of this crate use, not a special case the core recognizes.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Text(String),
    Int(i64),
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

/// An immutable, callable backend address.
///
/// `host` is either a hostname or a literal IP; `ip_addr` additionally
/// carries a *resolved* IP when `host` is a hostname (set by a resolver
/// layer above this crate — the core never performs DNS resolution
/// itself). `port == 0` means "unspecified", leaving the scheme default to
/// the caller. `weight == 0` means "exists but is never selected" by any
/// weighted strategy.
#[derive(Clone)]
pub struct Endpoint {
    host: HostKind,
    ip_addr: Option<IpAddr>,
    port: u16,
    weight: u32,
    attributes: Arc<BTreeMap<String, AttributeValue>>,
}

impl Endpoint {
    /// Builds a physical endpoint directly from host and optional port.
    /// `port = 0` (or omitted via [`Endpoint::of`] with a bare host) means
    /// unspecified.
    pub fn of(host: impl Into<String>, port: u16) -> Result<Self, FleetError> {
        let host = host.into();
        if host.is_empty() {
            return Err(FleetError::InvalidAddress("empty host".into()));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(FleetError::InvalidAddress(format!(
                "whitespace not allowed in host '{host}'"
            )));
        }
        let kind = match host.parse::<IpAddr>() {
            Ok(ip) => HostKind::IpLiteral(ip),
            Err(_) => HostKind::Hostname(host.to_ascii_lowercase()),
        };
        Ok(Self {
            host: kind,
            ip_addr: None,
            port,
            weight: 1,
            attributes: Arc::new(BTreeMap::new()),
        })
    }

    /// Parses an authority string: `"host"`, `"host:port"`,
    /// `"[ipv6]:port"`, or a bare IPv4/IPv6 literal. Case-insensitive for
    /// hostnames; rejects an empty host, embedded whitespace, and ports
    /// outside `[1, 65535]`.
    pub fn parse(input: &str) -> Result<Self, FleetError> {
        let parsed = parse_authority(input)?;
        Ok(Self {
            host: parsed.host,
            ip_addr: None,
            port: parsed.port,
            weight: 1,
            attributes: Arc::new(BTreeMap::new()),
        })
    }

    /// Starts a builder for more elaborate construction.
    pub fn builder(host: impl Into<String>) -> Result<EndpointBuilder, FleetError> {
        Ok(EndpointBuilder {
            endpoint: Self::of(host, 0)?,
        })
    }

    pub fn host(&self) -> String {
        self.host.as_str_buf()
    }

    /// `true` if `host` is itself an IP literal (as opposed to a hostname
    /// requiring resolution).
    pub fn has_ip_literal_host(&self) -> bool {
        matches!(self.host, HostKind::IpLiteral(_))
    }

    pub fn ip_addr(&self) -> Option<IpAddr> {
        match &self.host {
            HostKind::IpLiteral(ip) => Some(*ip),
            HostKind::Hostname(_) => self.ip_addr,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Renders `host[:port]`, bracket-escaping IPv6.
    pub fn authority(&self) -> String {
        render_authority(&self.host, self.port)
    }

    /// Copy-on-write: a new endpoint with a different weight, all else
    /// unchanged. Does not affect structural equality.
    pub fn with_weight(&self, weight: u32) -> Self {
        Self {
            weight,
            ..self.clone()
        }
    }

    /// Copy-on-write: attaches a resolved IP address. Structurally
    /// observable — two otherwise-identical endpoints with different
    /// resolved IPs compare unequal, since `ip_addr` participates in
    /// equality for hostname-keyed endpoints too.
    pub fn with_ip_addr(&self, ip_addr: IpAddr) -> Self {
        Self {
            ip_addr: Some(ip_addr),
            ..self.clone()
        }
    }

    /// Copy-on-write: replaces the attribute map wholesale. Does not
    /// affect structural equality.
    pub fn with_attributes(&self, attributes: BTreeMap<String, AttributeValue>) -> Self {
        Self {
            attributes: Arc::new(attributes),
            ..self.clone()
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("authority", &self.authority())
            .field("weight", &self.weight)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

/// Structural equality: host, resolved ip_addr, and port only. Weight and
/// attributes never participate — two endpoints naming the same socket
/// are the same endpoint for set-membership purposes even if their
/// weights differ (spec.md §3).
impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.ip_addr == other.ip_addr && self.port == other.port
    }
}

impl Eq for Endpoint {}

impl std::hash::Hash for Endpoint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.ip_addr.hash(state);
        self.port.hash(state);
    }
}

/// Chained construction for endpoints carrying weight/attributes/IP from
/// the start, instead of building then copying.
#[derive(Clone)]
pub struct EndpointBuilder {
    endpoint: Endpoint,
}

impl EndpointBuilder {
    pub fn port(mut self, port: u16) -> Result<Self, FleetError> {
        if port != 0 && !(1..=65_535).contains(&port) {
            return Err(FleetError::InvalidAddress(format!(
                "port {port} out of range [1, 65535]"
            )));
        }
        self.endpoint.port = port;
        Ok(self)
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.endpoint.weight = weight;
        self
    }

    pub fn ip_addr(mut self, ip_addr: IpAddr) -> Self {
        self.endpoint.ip_addr = Some(ip_addr);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Arc::make_mut(&mut self.endpoint.attributes).insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Endpoint {
        self.endpoint
    }
}
