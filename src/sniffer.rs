// Orchestration tooling for an emulated OPC-UA service-discovery testbed.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Auxiliary packet capture on the inter-switch link.
//!
//! Counts mDNS announcements crossing the chain during one iteration by
//! running `tcpdump` as a bounded side process; capture is advisory and a
//! failure never aborts the iteration.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;

use testbed_utils::process::run_checked;

use crate::error::Result;

/// mDNS multicast group the discovery announcements are sent to.
const MDNS_FILTER: &str = "dst host 224.0.0.251";

/// Capture on `interface` for the given window and return the number of
/// matching packets.
pub async fn capture_count(interface: String, window: Duration) -> Result<usize> {
    log::info!("listening for packets on {interface}");
    let mut child = Command::new("tcpdump")
        .args(["-l", "-n", "-i", &interface, MDNS_FILTER])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;
    let stdout = child.stdout.take().expect("stdout was configured as piped");
    let mut lines = BufReader::new(stdout).lines();

    let deadline = Instant::now() + window;
    let mut count = 0;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, lines.next_line()).await {
            Ok(Ok(Some(_))) => count += 1,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                log::warn!("capture read error: {e}");
                break;
            }
            Err(_) => break,
        }
    }

    if let Some(pid) = child.id() {
        if let Err(e) = run_checked(["kill", "-INT", &pid.to_string()]).await {
            log::warn!("could not stop tcpdump: {e}");
        }
    }
    log::info!("captured {count} packet(s) on {interface}");
    Ok(count)
}
