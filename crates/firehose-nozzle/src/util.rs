// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host discovery helpers.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Address used only to select an outbound interface; nothing is sent to it.
const ROUTE_TARGET: &str = "8.8.8.8:53";

/// Returns the address of the interface this host would use for outbound
/// traffic, for the `ip:` tag of the nozzle's own series.
///
/// Connecting a UDP socket sends no packets, it only asks the kernel to pick a
/// route. Hosts without a default route fall back to the loopback address.
///
/// # Examples
///
/// ```
/// use firehose_nozzle::util::local_ip;
///
/// assert!(!local_ip().is_unspecified());
/// ```
#[must_use]
pub fn local_ip() -> IpAddr {
    match outbound_ip() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            tracing::warn!("Could not determine local ip, falling back to loopback: {e}");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

fn outbound_ip() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(ROUTE_TARGET)?;
    Ok(socket.local_addr()?.ip())
}
