//! Connection source reading the Linux proc filesystem.
//!
//! Each query parses one of `/proc/net/{tcp,tcp6,udp,udp6}` and joins the
//! owning-process name by scanning `/proc/<pid>/fd` for `socket:[inode]`
//! links and reading `/proc/<pid>/comm`. The fd scan silently skips
//! processes the exporter may not inspect, leaving those entries without
//! an owner.
//!
//! Addresses in the table are hex-encoded in host byte order: IPv4 as one
//! little-endian u32, IPv6 as four little-endian u32 groups.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use crate::source::ConnectionSource;
use crate::types::{Protocol, SockEntry, SockState};

/// Connection source backed by a proc filesystem root.
///
/// The root is configurable so containerized deployments can point at a
/// host mount and tests at a fixture tree.
#[derive(Debug, Clone)]
pub struct ProcfsSource {
    root: PathBuf,
}

impl ProcfsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map socket inodes to owning process names by walking `<root>/<pid>/fd`.
    fn socket_owners(&self, wanted: &HashSet<u64>) -> HashMap<u64, String> {
        let mut owners = HashMap::new();
        if wanted.is_empty() {
            return owners;
        }

        let Ok(proc_dir) = fs::read_dir(&self.root) else {
            return owners;
        };
        for entry in proc_dir.flatten() {
            let name = entry.file_name();
            let Ok(pid) = name.to_string_lossy().parse::<u32>() else {
                continue;
            };
            // EACCES for other users' processes is expected when running
            // unprivileged; those entries just stay ownerless.
            let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
                continue;
            };
            let mut comm: Option<String> = None;
            for fd in fds.flatten() {
                let Ok(link) = fs::read_link(fd.path()) else {
                    continue;
                };
                let Some(inode) = socket_inode(&link.to_string_lossy()) else {
                    continue;
                };
                if !wanted.contains(&inode) {
                    continue;
                }
                let name = comm
                    .get_or_insert_with(|| self.process_name(pid))
                    .clone();
                owners.insert(inode, name);
            }
        }
        owners
    }

    /// Read `<root>/<pid>/comm`, trimmed. Empty on failure.
    fn process_name(&self, pid: u32) -> String {
        fs::read_to_string(self.root.join(pid.to_string()).join("comm"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }
}

impl ConnectionSource for ProcfsSource {
    fn entries(&self, family: Protocol) -> io::Result<Vec<SockEntry>> {
        let path = self.root.join("net").join(family.as_str());
        let text = fs::read_to_string(&path)?;

        let mut rows = Vec::new();
        for line in text.lines().skip(1) {
            if let Some(row) = parse_table_row(line, family) {
                rows.push(row);
            }
        }

        let wanted: HashSet<u64> = rows.iter().filter_map(|r| r.inode).collect();
        let owners = self.socket_owners(&wanted);

        Ok(rows
            .into_iter()
            .map(|row| {
                let process = row.inode.and_then(|inode| owners.get(&inode).cloned());
                SockEntry {
                    process,
                    ..row.entry
                }
            })
            .collect())
    }
}

struct TableRow {
    entry: SockEntry,
    /// Socket inode, absent for rows the kernel reports without one
    /// (e.g. time-wait).
    inode: Option<u64>,
}

/// Parse one data line of a `/proc/net/*` table.
///
/// Layout after the header:
/// `sl local_address rem_address st tx_queue:rx_queue ... uid timeout inode`
/// where fields 1 (local), 2 (remote), 3 (state) and 9 (inode) matter here.
fn parse_table_row(line: &str, family: Protocol) -> Option<TableRow> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 10 {
        return None;
    }

    let (local_addr, local_port) = parse_hex_endpoint(fields[1], family.is_ipv6())?;
    let (remote_addr, remote_port) = parse_hex_endpoint(fields[2], family.is_ipv6())?;
    let state_code = u8::from_str_radix(fields[3], 16).ok()?;
    let state = parse_state(state_code, family)?;
    let inode = fields[9].parse::<u64>().ok().filter(|&i| i != 0);

    Some(TableRow {
        entry: SockEntry {
            local_addr,
            local_port,
            remote_addr,
            remote_port,
            state,
            process: None,
        },
        inode,
    })
}

/// Decode an `ADDR:PORT` pair where the address is hex in host byte order.
fn parse_hex_endpoint(field: &str, v6: bool) -> Option<(IpAddr, u16)> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let addr = if v6 {
        if addr_hex.len() != 32 {
            return None;
        }
        // Four u32 groups, each stored little-endian.
        let mut octets = [0u8; 16];
        for (i, chunk) in octets.chunks_exact_mut(4).enumerate() {
            let group = u32::from_str_radix(&addr_hex[i * 8..(i + 1) * 8], 16).ok()?;
            chunk.copy_from_slice(&group.swap_bytes().to_be_bytes());
        }
        IpAddr::V6(Ipv6Addr::from(octets))
    } else {
        if addr_hex.len() != 8 {
            return None;
        }
        let raw = u32::from_str_radix(addr_hex, 16).ok()?;
        IpAddr::V4(Ipv4Addr::from(raw.swap_bytes()))
    };

    Some((addr, port))
}

/// Map a kernel state code to `SockState`.
///
/// Codes follow include/net/tcp_states.h. Datagram sockets reuse the
/// numbering but `0x07` means a bound, unconnected socket there, the
/// closest thing UDP has to listening, so for udp families it maps to
/// `Listen` rather than `Close`.
fn parse_state(code: u8, family: Protocol) -> Option<SockState> {
    let udp = matches!(family, Protocol::Udp | Protocol::Udp6);
    Some(match code {
        0x01 => SockState::Established,
        0x02 => SockState::SynSent,
        0x03 => SockState::SynRecv,
        0x04 => SockState::FinWait1,
        0x05 => SockState::FinWait2,
        0x06 => SockState::TimeWait,
        0x07 if udp => SockState::Listen,
        0x07 => SockState::Close,
        0x08 => SockState::CloseWait,
        0x09 => SockState::LastAck,
        0x0A => SockState::Listen,
        0x0B => SockState::Closing,
        _ => return None,
    })
}

/// Extract the inode from a `socket:[12345]` fd link target.
fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}
