use std::fmt;
use std::net::IpAddr;

/// Protocol family of a connection-table bucket.
///
/// The config surface also accepts `tcp4`/`udp4`, which normalize to
/// `Tcp`/`Udp` at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Tcp6,
    Udp,
    Udp6,
}

impl Protocol {
    /// All families, in the fixed order the collector walks them.
    pub const ALL: [Protocol; 4] = [Protocol::Tcp, Protocol::Tcp6, Protocol::Udp, Protocol::Udp6];

    /// Parse a config-level protocol value. `tcp4`/`udp4` fold into their
    /// base family; anything else unknown is rejected.
    pub fn parse(value: &str) -> Option<Protocol> {
        match value {
            "tcp" | "tcp4" => Some(Protocol::Tcp),
            "tcp6" => Some(Protocol::Tcp6),
            "udp" | "udp4" => Some(Protocol::Udp),
            "udp6" => Some(Protocol::Udp6),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Tcp6 => "tcp6",
            Protocol::Udp => "udp",
            Protocol::Udp6 => "udp6",
        }
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, Protocol::Tcp6 | Protocol::Udp6)
    }

    /// The unspecified ("any interface") address of this family.
    pub fn unspecified_addr(&self) -> IpAddr {
        if self.is_ipv6() {
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state as reported by the kernel.
///
/// Rules may only ask for `Listen` or `Established`; the remaining states
/// exist so that live entries parse losslessly and match nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SockState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
}

impl SockState {
    /// Parse a config-level desired state. Only `listen` and `established`
    /// are declarable.
    pub fn parse_desired(value: &str) -> Option<SockState> {
        match value {
            "listen" => Some(SockState::Listen),
            "established" => Some(SockState::Established),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SockState::Established => "established",
            SockState::SynSent => "syn_sent",
            SockState::SynRecv => "syn_recv",
            SockState::FinWait1 => "fin_wait1",
            SockState::FinWait2 => "fin_wait2",
            SockState::TimeWait => "time_wait",
            SockState::Close => "close",
            SockState::CloseWait => "close_wait",
            SockState::LastAck => "last_ack",
            SockState::Listen => "listen",
            SockState::Closing => "closing",
        }
    }
}

impl fmt::Display for SockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the operating system's connection table.
///
/// Ephemeral: produced fresh by a `ConnectionSource` on every scrape and
/// discarded after matching. `process` is `None` when the owning process
/// could not be determined (typically a permissions limit).
#[derive(Debug, Clone)]
pub struct SockEntry {
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    pub state: SockState,
    pub process: Option<String>,
}
