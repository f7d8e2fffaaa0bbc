//! TCP traceroute hop (§4.H "TCP" branch): dials `{address, port}` with a
//! pre-connect hook that sets the TTL/hop-limit, while racing a scoped ICMP
//! listener for an out-of-band `TimeExceeded` from an intermediate router.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpStream;

use super::icmp::probe_hop as icmp_probe_hop;
use super::packet::IcmpKind;
use crate::error::ProbeError;

pub struct TcpHopOutcome {
    pub reached_target: bool,
    pub from: Option<IpAddr>,
}

/// Connects to `(target, port)` with TTL/hop-limit set to `ttl`. A
/// successful connect means the target itself answered (`reached_target`).
/// Concurrently, a scoped ICMP listener catches a `TimeExceeded` addressed
/// to this attempt's identifier, which surfaces the intermediate router's
/// address if the connect times out or is refused before that.
pub async fn probe_hop(
    target: IpAddr,
    port: u16,
    ttl: u32,
    identifier: u16,
    sequence: u16,
    timeout: Duration,
) -> Result<TcpHopOutcome, ProbeError> {
    let connect = connect_with_ttl(target, port, ttl);
    let icmp_wait = icmp_probe_hop(target, ttl, identifier, sequence, timeout);

    tokio::select! {
        biased;
        connect_result = tokio::time::timeout(timeout, connect) => {
            match connect_result {
                Ok(Ok(())) => Ok(TcpHopOutcome { reached_target: true, from: Some(target) }),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ProbeError::Timeout(timeout)),
            }
        }
        icmp_result = tokio::time::timeout(timeout, icmp_wait) => {
            match icmp_result {
                Ok(Ok(outcome)) if outcome.kind == IcmpKind::TimeExceeded => {
                    Ok(TcpHopOutcome { reached_target: false, from: outcome.from })
                }
                Ok(Ok(_)) => Err(ProbeError::Other("unexpected icmp response".to_string())),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ProbeError::Timeout(timeout)),
            }
        }
    }
}

async fn connect_with_ttl(target: IpAddr, port: u16, ttl: u32) -> Result<(), ProbeError> {
    let domain = match target {
        IpAddr::V4(_) => Domain::IPV4,
        IpAddr::V6(_) => Domain::IPV6,
    };
    let addr = SocketAddr::new(target, port);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    match target {
        IpAddr::V4(_) => socket.set_ttl(ttl)?,
        IpAddr::V6(_) => socket.set_unicast_hops(ttl)?,
    }
    socket.set_nonblocking(true)?;

    // Non-blocking connect: a WouldBlock/EINPROGRESS error here just means
    // the handshake is in flight, confirmed once the socket turns writable.
    match socket.connect(&addr.into()) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
        Err(e) => return Err(e.into()),
    }

    let std_stream: std::net::TcpStream = socket.into();
    let stream = TcpStream::from_std(std_stream)?;
    stream.writable().await?;
    if let Some(err) = stream.take_error()? {
        return Err(err.into());
    }
    Ok(())
}
