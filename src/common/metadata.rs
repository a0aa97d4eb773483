//! Connection metadata

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Network type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Tcp,
    Udp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "TCP"),
            Network::Udp => write!(f, "UDP"),
        }
    }
}

/// Destination address kind, as carried by SOCKS5 ATYP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrType {
    Ipv4,
    DomainName,
    Ipv6,
}

/// Connection metadata containing all routing information
#[derive(Debug, Clone)]
pub struct Metadata {
    /// Network type (TCP/UDP)
    pub network: Network,

    /// Source IP address
    pub src_ip: IpAddr,

    /// Source port
    pub src_port: u16,

    /// Destination IP address (may be unset if only host is known)
    pub dst_ip: Option<IpAddr>,

    /// Destination port
    pub dst_port: u16,

    /// Destination host (domain name, or a literal IP)
    pub host: String,
}

impl Metadata {
    /// Create new metadata
    pub fn new(network: Network) -> Self {
        Metadata {
            network,
            src_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_ip: None,
            dst_port: 0,
            host: String::new(),
        }
    }

    /// Create TCP metadata
    pub fn tcp() -> Self {
        Self::new(Network::Tcp)
    }

    /// Create UDP metadata
    pub fn udp() -> Self {
        Self::new(Network::Udp)
    }

    /// Set source address
    pub fn with_source(mut self, addr: SocketAddr) -> Self {
        self.src_ip = addr.ip();
        self.src_port = addr.port();
        self
    }

    /// Set destination IP
    pub fn with_dst_ip(mut self, ip: IpAddr) -> Self {
        self.dst_ip = Some(ip);
        self
    }

    /// Set destination port
    pub fn with_dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    /// Set destination host
    pub fn with_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    /// Kind of destination address.
    ///
    /// A host that parses as an IP literal counts as an IP destination.
    pub fn addr_type(&self) -> AddrType {
        if !self.host.is_empty() {
            return match self.host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
                Ok(IpAddr::V4(_)) => AddrType::Ipv4,
                Ok(IpAddr::V6(_)) => AddrType::Ipv6,
                Err(_) => AddrType::DomainName,
            };
        }
        match self.dst_ip {
            Some(IpAddr::V6(_)) => AddrType::Ipv6,
            _ => AddrType::Ipv4,
        }
    }

    /// Check if destination is resolved
    pub fn resolved(&self) -> bool {
        self.dst_ip.is_some()
    }

    /// Get remote address string (for dialing)
    pub fn remote_address(&self) -> String {
        if !self.host.is_empty() {
            format!("{}:{}", self.host, self.dst_port)
        } else if let Some(ip) = self.dst_ip {
            SocketAddr::new(ip, self.dst_port).to_string()
        } else {
            format!("0.0.0.0:{}", self.dst_port)
        }
    }

    /// Get source detail string
    pub fn source_detail(&self) -> String {
        format!("{}:{}", self.src_ip, self.src_port)
    }

    /// Check if metadata is valid
    pub fn valid(&self) -> bool {
        self.dst_port > 0 && (!self.host.is_empty() || self.dst_ip.is_some())
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} --> {}",
            self.network,
            self.source_detail(),
            self.remote_address()
        )
    }
}
