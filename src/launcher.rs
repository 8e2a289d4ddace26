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
//! Launch and monitor the per-node experiment processes.
//!
//! Every coordinator container runs the discovery service, every worker
//! container runs the registering application. Launches are staggered to
//! avoid a boot storm; both groups are monitored cooperatively and receive
//! an interrupt once their wall-clock window closes. The group with the
//! shorter window is interrupted first.

use std::time::Duration;

use tokio::process::Command;
use tokio::time::Instant;

use testbed_utils::process::ProcessGroup;

use crate::addressing::AddressMap;
use crate::config::TimingConfig;
use crate::error::Result;
use crate::topology::{DeviceSpec, EmulatedNetwork, DEVICE_MOUNT};

/// Discovery-service executable inside every coordinator's volume.
const DISCOVERY_EXECUTABLE: &str = "ldsserver";
/// Worker executable registering via multicast discovery.
const WORKER_MULTICAST_EXECUTABLE: &str = "server_multicast1";
/// Worker executable registering directly with a discovery server.
const WORKER_REGISTER_EXECUTABLE: &str = "server_register";
/// OPC-UA port the discovery services listen on.
const DISCOVERY_PORT: u16 = 4840;

/// How workers locate the discovery service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WorkerMode {
    /// Workers find the discovery service via mDNS multicast.
    Multicast,
    /// Workers are pointed at their switch's discovery endpoint directly.
    Register,
}

fn worker_argv(worker: &DeviceSpec, addrs: &AddressMap, mode: WorkerMode) -> Vec<String> {
    let mut argv = vec!["docker".to_string(), "exec".to_string(), worker.name.clone()];
    match mode {
        WorkerMode::Multicast => {
            argv.push(format!("{DEVICE_MOUNT}/{WORKER_MULTICAST_EXECUTABLE}"));
        }
        WorkerMode::Register => {
            let coordinator = addrs.coordinator_of(worker.id);
            argv.push(format!("{DEVICE_MOUNT}/{WORKER_REGISTER_EXECUTABLE}"));
            argv.push(format!("opc.tcp://{}:{DISCOVERY_PORT}", addrs.ip(coordinator)));
        }
    }
    argv
}

/// Run one experiment iteration: start the discovery services, then the
/// workers, and monitor their combined output until the respective
/// wall-clock windows close.
pub async fn run_program(
    net: &EmulatedNetwork,
    addrs: &AddressMap,
    mode: WorkerMode,
    timing: &TimingConfig,
) -> Result<()> {
    let stagger = Duration::from_millis(timing.stagger_ms);
    let poll = Duration::from_millis(timing.poll_interval_ms);

    log::info!("starting discovery services");
    let mut discovery = ProcessGroup::new("discovery");
    for coordinator in net.plan().coordinators() {
        let mut cmd = Command::new("docker");
        cmd.args([
            "exec",
            &coordinator.name,
            &format!("{DEVICE_MOUNT}/{DISCOVERY_EXECUTABLE}"),
        ]);
        discovery.spawn(&coordinator.name, &mut cmd)?;
        tokio::time::sleep(stagger).await;
    }
    tokio::time::sleep(Duration::from_secs(timing.settle_secs)).await;

    log::info!("starting worker applications ({mode:?})");
    let mut workers = ProcessGroup::new("workers");
    for worker in net.plan().workers() {
        let argv = worker_argv(worker, addrs, mode);
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        workers.spawn(&worker.name, &mut cmd)?;
    }

    let now = Instant::now();
    let worker_deadline = now + Duration::from_secs(timing.worker_window_secs);
    let discovery_deadline = now + Duration::from_secs(timing.discovery_window_secs);
    log::info!(
        "monitoring the output for {} seconds",
        timing.worker_window_secs.max(timing.discovery_window_secs)
    );

    if worker_deadline <= discovery_deadline {
        workers.monitor_until(worker_deadline, poll).await;
        discovery.monitor_until(discovery_deadline, poll).await;
    } else {
        discovery.monitor_until(discovery_deadline, poll).await;
        workers.monitor_until(worker_deadline, poll).await;
    }
    Ok(())
}
