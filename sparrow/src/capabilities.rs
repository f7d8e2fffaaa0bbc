//! CAP_NET_RAW probing (§6 "Environment", §9 open question). ICMP
//! traceroute needs a raw socket; this is checked once at startup so the
//! agent can disable ICMP with a warning rather than aborting entirely.

/// Returns whether this process can open raw ICMP sockets. Running as root
/// is treated as sufficient even when the capability bit itself isn't set
/// (§9 records this as the deliberately loose reading of existing
/// behaviour; tightening it to check the effective bit directly is a valid
/// future refinement).
#[cfg(target_os = "linux")]
pub fn has_net_raw() -> bool {
    if is_root() {
        return true;
    }
    match caps::read(None, caps::CapSet::Effective) {
        Ok(effective) => effective.contains(&caps::Capability::CAP_NET_RAW),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read process capabilities, assuming CAP_NET_RAW absent");
            false
        }
    }
}

#[cfg(target_os = "linux")]
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(target_os = "linux"))]
pub fn has_net_raw() -> bool {
    tracing::warn!("capability probing not implemented on this platform, assuming CAP_NET_RAW absent");
    false
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn does_not_panic() {
        let _ = has_net_raw();
    }
}
