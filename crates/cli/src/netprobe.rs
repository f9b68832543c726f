//! Network position probe for the `auto` deny-list policy.
//!
//! Connecting a UDP socket only selects a route, nothing is sent. The local
//! address of that route tells whether traffic to the server leaves through
//! the office LAN or through the VPN tunnel.

use std::io;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs, UdpSocket};

use tracing::{info, warn};

const FTP_PORT: u16 = 21;

/// Local IPv4 address the OS would use to reach `host`.
pub fn outbound_ipv4(host: &str) -> io::Result<Ipv4Addr> {
    let target = (host, FTP_PORT)
        .to_socket_addrs()?
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no IPv4 address for {}", host),
            )
        })?;

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(target)?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(addr) => Ok(addr),
        IpAddr::V6(addr) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("route to {} uses IPv6 address {}", host, addr),
        )),
    }
}

/// `true` if `addr` lies inside the LAN described by `lan_prefix`.
pub fn is_lan_address(addr: Ipv4Addr, lan_prefix: &str) -> bool {
    addr.to_string().starts_with(lan_prefix)
}

/// Decide whether the deny-list applies: it does when the route to the
/// server leaves through the LAN, i.e. the VPN is down. An undeterminable
/// route also counts as LAN.
pub fn deny_list_required(host: &str, lan_prefix: &str) -> bool {
    match outbound_ipv4(host) {
        Ok(addr) => {
            let on_lan = is_lan_address(addr, lan_prefix);
            info!(%addr, lan_prefix, on_lan, "probed outbound address");
            on_lan
        }
        Err(e) => {
            warn!(host, error = %e, "cannot determine outbound address, applying deny-list");
            true
        }
    }
}
