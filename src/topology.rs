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
//! Topology planning and construction of the emulated network.
//!
//! A topology is a linear chain of N virtual switches; every switch connects
//! one coordinator container and three worker containers. Planning is a pure
//! function of the switch count and the address map; construction shells out
//! to `ovs-vsctl`, `docker` and `ovs-docker`.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mac_address::MacAddress;
use testbed_utils::process::run_checked;

use crate::addressing::{device_name, switch_name, AddressMap};
use crate::config::TestbedConfig;
use crate::error::Result;
use crate::util::PathBufExt;

/// Mount point of the per-device volume inside every container.
pub const DEVICE_MOUNT: &str = "/root/opcua";
/// Per-host hook run after the network is up, recreating the original
/// hostname-configuration step.
const HOSTNAME_HOOK: &str = "/root/opcua/hostnamegen.sh";
const HOSTNAME_HOOK_PAUSE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Coordinator,
    Worker,
}

/// One emulated node of the planned topology.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub id: usize,
    pub name: String,
    /// Switch the device hangs off.
    pub switch: usize,
    pub role: DeviceRole,
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
    /// Host-side folder mounted at [`DEVICE_MOUNT`].
    pub volume: PathBuf,
}

/// Planned network graph for one topology size. Pure data; nothing is
/// created until [`EmulatedNetwork::build`] is called.
#[derive(Debug, Clone)]
pub struct TopologyPlan {
    pub switch_count: usize,
    pub devices: Vec<DeviceSpec>,
}

impl TopologyPlan {
    pub fn new(switch_count: usize, addrs: &AddressMap, device_root: &Path) -> Self {
        let mut devices = Vec::with_capacity(addrs.device_count());
        for id in 1..=addrs.device_count() {
            let switch = addrs.switch_of(id);
            let role = if id <= switch_count {
                DeviceRole::Coordinator
            } else {
                DeviceRole::Worker
            };
            devices.push(DeviceSpec {
                id,
                name: device_name(id),
                switch,
                role,
                ip: addrs.ip(id),
                mac: addrs.mac(id),
                volume: device_root
                    .then(switch_name(switch))
                    .then(device_name(id)),
            });
        }
        Self {
            switch_count,
            devices,
        }
    }

    pub fn switches(&self) -> impl Iterator<Item = String> + '_ {
        (1..=self.switch_count).map(switch_name)
    }

    pub fn coordinators(&self) -> impl Iterator<Item = &DeviceSpec> {
        self.devices
            .iter()
            .filter(|d| d.role == DeviceRole::Coordinator)
    }

    pub fn workers(&self) -> impl Iterator<Item = &DeviceSpec> {
        self.devices.iter().filter(|d| d.role == DeviceRole::Worker)
    }

    /// Host-side interface carrying the traffic of the last inter-switch
    /// link, used as the attachment point for the auxiliary packet capture.
    /// `None` for single-switch topologies, which have no chain link.
    pub fn chain_interface(&self) -> Option<String> {
        (self.switch_count > 1).then(|| chain_port(self.switch_count, self.switch_count - 1))
    }
}

/// Veth end attached to switch `near`, peered with the end on `far`. The
/// chain links are veth pairs rather than OVS patch ports so they carry a
/// kernel netdev that `tcpdump` can attach to.
fn chain_port(near: usize, far: usize) -> String {
    format!("chain-s{near}-s{far}")
}

/// Command line running the hostname hook inside a device container. The
/// hook takes an exclusive upper bound on the device ids.
fn hostname_argv(device: &DeviceSpec, device_count: usize) -> Vec<String> {
    vec![
        "docker".to_string(),
        "exec".to_string(),
        device.name.clone(),
        "sh".to_string(),
        HOSTNAME_HOOK.to_string(),
        (device_count + 1).to_string(),
    ]
}

/// Handle to a constructed emulated network.
#[derive(Debug)]
pub struct EmulatedNetwork {
    plan: TopologyPlan,
}

impl EmulatedNetwork {
    /// Construct and start the planned network: bridges wired to the
    /// OpenFlow controller, one container per device with its role volume,
    /// ports carrying the assigned addresses, and patch ports chaining the
    /// switches. Afterwards the per-host hostname hook runs, and a
    /// connectivity check pings every host from the reference host `d1`.
    /// A failing ping is logged but does not abort the build.
    pub async fn build(plan: TopologyPlan, cfg: &TestbedConfig) -> Result<Self> {
        log::info!("adding {} switches", plan.switch_count);
        for switch in plan.switches() {
            run_checked(["ovs-vsctl", "add-br", &switch]).await?;
            run_checked(["ovs-vsctl", "set-controller", &switch, &cfg.controller.openflow])
                .await?;
        }

        log::info!("adding {} device containers", plan.devices.len());
        for dev in &plan.devices {
            run_checked([
                "docker",
                "run",
                "-d",
                "--name",
                &dev.name,
                "--hostname",
                &dev.name,
                "--net=none",
                "-v",
                &format!("{}:{}", dev.volume.display(), DEVICE_MOUNT),
                &cfg.docker_image,
                "sleep",
                "infinity",
            ])
            .await?;
        }

        log::info!("creating links");
        for dev in &plan.devices {
            run_checked([
                "ovs-docker",
                "add-port",
                &switch_name(dev.switch),
                "eth0",
                &dev.name,
                &format!("--ipaddress={}/24", dev.ip),
                &format!("--macaddress={}", dev.mac),
            ])
            .await?;
        }
        for i in 1..plan.switch_count {
            let (a, b) = (switch_name(i), switch_name(i + 1));
            let (port_a, port_b) = (chain_port(i, i + 1), chain_port(i + 1, i));
            run_checked(["ip", "link", "add", &port_a, "type", "veth", "peer", "name", &port_b])
                .await?;
            run_checked(["ip", "link", "set", &port_a, "up"]).await?;
            run_checked(["ip", "link", "set", &port_b, "up"]).await?;
            run_checked(["ovs-vsctl", "add-port", &a, &port_a]).await?;
            run_checked(["ovs-vsctl", "add-port", &b, &port_b]).await?;
        }

        let net = Self { plan };

        log::info!("running script to configure host names");
        let device_count = net.plan.devices.len();
        for dev in &net.plan.devices {
            run_checked(hostname_argv(dev, device_count)).await?;
            tokio::time::sleep(HOSTNAME_HOOK_PAUSE).await;
        }

        net.check_connectivity().await;
        Ok(net)
    }

    pub fn plan(&self) -> &TopologyPlan {
        &self.plan
    }

    /// Ping every host from the reference host `d1`. Failures are logged
    /// only; the original driver carried on regardless.
    async fn check_connectivity(&self) {
        log::info!("testing connectivity");
        let reference = &self.plan.devices[0];
        for dev in self.plan.devices.iter().skip(1) {
            let target = dev.ip.to_string();
            match run_checked(["docker", "exec", &reference.name, "ping", "-c", "1", "-W", "1", &target])
                .await
            {
                Ok(_) => log::debug!("{} -> {}: ok", reference.name, dev.name),
                Err(e) => log::warn!("{} -> {} unreachable: {e}", reference.name, dev.name),
            }
        }
    }

    /// Install an `action=normal` flow on every bridge, letting the switches
    /// forward as plain learning switches until the controller takes over.
    pub async fn configure_normal_flows(&self) -> Result<()> {
        log::info!("configuring OVS normal-mode flows");
        for switch in self.plan.switches() {
            run_checked(["ovs-ofctl", "add-flow", &switch, "action=normal"]).await?;
        }
        Ok(())
    }

    /// Tear the network down: containers first, then the bridges. Teardown
    /// is best-effort so a single stuck container does not strand the rest
    /// of the emulated environment.
    pub async fn stop(self) {
        log::info!("stopping emulated network");
        for dev in &self.plan.devices {
            if let Err(e) = run_checked(["docker", "rm", "-f", &dev.name]).await {
                log::warn!("could not remove container {}: {e}", dev.name);
            }
        }
        for switch in self.plan.switches() {
            if let Err(e) = run_checked(["ovs-vsctl", "del-br", &switch]).await {
                log::warn!("could not remove bridge {switch}: {e}");
            }
        }
        // removing one end of a veth pair removes its peer as well
        for i in 1..self.plan.switch_count {
            let port = chain_port(i, i + 1);
            if let Err(e) = run_checked(["ip", "link", "del", &port]).await {
                log::warn!("could not remove chain link {port}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn plan(n: usize) -> TopologyPlan {
        let addrs = AddressMap::new(n);
        TopologyPlan::new(n, &addrs, Path::new("/tmp/devbed"))
    }

    #[test]
    fn one_coordinator_three_workers_per_switch() {
        let plan = plan(3);
        assert_eq!(plan.devices.len(), 12);
        assert_eq!(plan.coordinators().count(), 3);
        assert_eq!(plan.workers().count(), 9);
        for s in 1..=3 {
            let on_switch = |d: &&DeviceSpec| d.switch == s;
            assert_eq!(plan.coordinators().filter(on_switch).count(), 1);
            assert_eq!(plan.workers().filter(on_switch).count(), 3);
        }
    }

    #[test]
    fn volume_mirrors_folder_layout() {
        let plan = plan(2);
        let d1 = &plan.devices[0];
        assert_eq!(d1.volume, PathBuf::from("/tmp/devbed/s1/d1"));
        let d8 = &plan.devices[7];
        assert_eq!(d8.volume, PathBuf::from("/tmp/devbed/s2/d8"));
    }

    #[test]
    fn chain_interface_needs_two_switches() {
        assert_eq!(plan(1).chain_interface(), None);
        assert_eq!(plan(3).chain_interface(), Some("chain-s3-s2".to_string()));
    }

    #[test]
    fn hostname_hook_gets_exclusive_id_bound() {
        let plan = plan(2);
        let argv = hostname_argv(&plan.devices[0], plan.devices.len());
        assert_eq!(
            argv,
            vec!["docker", "exec", "d1", "sh", "/root/opcua/hostnamegen.sh", "9"]
        );
    }
}
