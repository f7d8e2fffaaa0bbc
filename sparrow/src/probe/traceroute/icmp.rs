//! ICMP traceroute hop (§4.H "ICMP" branch): a scoped raw socket per hop
//! attempt, sending one echo request at the given TTL/hop-limit and waiting
//! for either a `TimeExceeded` from an intermediate router or an
//! `EchoReply` from the target itself.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use super::packet::{self, IcmpKind};
use crate::error::ProbeError;

pub struct IcmpHopOutcome {
    pub kind: IcmpKind,
    pub from: Option<IpAddr>,
}

/// Opens a fresh raw ICMP socket scoped to this one hop attempt, sends an
/// echo request with `ttl`, and waits up to `timeout` for a reply that
/// matches `identifier`/`sequence`. The socket is dropped (closed) when this
/// function returns, matching the "scoped per hop attempt" resource rule.
pub async fn probe_hop(
    target: IpAddr,
    ttl: u32,
    identifier: u16,
    sequence: u16,
    timeout: Duration,
) -> Result<IcmpHopOutcome, ProbeError> {
    let (domain, protocol) = match target {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
    };

    let socket = Socket::new(domain, Type::RAW, Some(protocol))?;
    match target {
        IpAddr::V4(_) => socket.set_ttl(ttl)?,
        IpAddr::V6(_) => socket.set_unicast_hops(ttl)?,
    }
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    let tokio_socket = UdpSocket::from_std(std_socket)?;

    let request = match target {
        IpAddr::V4(_) => packet::build_echo_request_v4(identifier, sequence),
        IpAddr::V6(_) => packet::build_echo_request_v6(identifier, sequence),
    };
    tokio_socket.send_to(&request, SocketAddr::new(target, 0)).await?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut buf = vec![0u8; 1024];

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(ProbeError::Timeout(timeout));
        }

        let recv = tokio::time::timeout(remaining, tokio_socket.recv_from(&mut buf)).await;
        let (size, from) = match recv {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(ProbeError::Socket(e)),
            Err(_) => return Err(ProbeError::Timeout(timeout)),
        };

        let parsed = match target {
            IpAddr::V4(_) => packet::parse_icmp_v4(&buf[..size]),
            IpAddr::V6(_) => packet::parse_icmp_v6(&buf[..size]),
        };

        let Some(parsed) = parsed else { continue };
        if parsed.identifier != Some(identifier) || parsed.sequence != Some(sequence) {
            continue;
        }

        match parsed.kind {
            IcmpKind::EchoReply | IcmpKind::TimeExceeded => {
                return Ok(IcmpHopOutcome { kind: parsed.kind, from: Some(from.ip()) });
            }
            IcmpKind::DestUnreachable => {
                return Ok(IcmpHopOutcome { kind: parsed.kind, from: Some(from.ip()) });
            }
            IcmpKind::Other(_) => continue,
        }
    }
}
