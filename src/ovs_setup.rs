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
//! One-time host bootstrap for the broker-client network namespace.
//!
//! Creates the `opcuaclient` namespace, two veth pairs and an OVS bridge
//! wired to the SDN controller, so the standalone broker clients can reach
//! the emulated devices. Meant to run once after boot; reruns fail on the
//! already-existing namespace.
use clap::Parser;

use opcua_testbed::util;
use testbed_utils::process::run_checked;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Network namespace the broker clients run in.
    #[arg(long, default_value = "opcuaclient")]
    namespace: String,
    /// OVS bridge connecting the namespace to the emulated network.
    #[arg(long, default_value = "ovsbr1")]
    bridge: String,
    /// OpenFlow endpoint of the SDN controller.
    #[arg(long, default_value = "tcp:127.0.0.1:6653")]
    controller: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();
    let args = Args::parse();
    let ns = &args.namespace;
    let bridge = &args.bridge;

    log::info!("creating namespace {ns}");
    run_checked(["ip", "netns", "add", ns]).await?;

    // veth0/veth1 carries the emulated-device subnet, veth2/veth3 the
    // management subnet towards the host.
    for (inner, outer) in [("veth0", "veth1"), ("veth2", "veth3")] {
        run_checked(["ip", "link", "add", inner, "type", "veth", "peer", "name", outer]).await?;
        run_checked(["ip", "link", "set", inner, "netns", ns]).await?;
    }

    log::info!("creating bridge {bridge}");
    run_checked(["ovs-vsctl", "add-br", bridge]).await?;
    run_checked(["ovs-vsctl", "set-controller", bridge, &args.controller]).await?;
    run_checked(["ovs-vsctl", "add-port", bridge, "veth1"]).await?;
    run_checked(["ip", "link", "set", "veth1", "up"]).await?;

    run_checked(["ip", "addr", "add", "192.168.10.2/24", "dev", "veth3"]).await?;
    run_checked(["ip", "link", "set", "veth3", "up"]).await?;

    log::info!("configuring interfaces inside {ns}");
    for argv in [
        vec!["ip", "addr", "add", "10.0.0.200/8", "dev", "veth0"],
        vec!["ip", "link", "set", "veth0", "up"],
        vec!["ip", "addr", "add", "192.168.10.1/24", "dev", "veth2"],
        vec!["ip", "link", "set", "veth2", "up"],
        vec!["ip", "link", "set", "lo", "up"],
    ] {
        let mut cmd = vec!["ip", "netns", "exec", ns];
        cmd.extend(argv);
        run_checked(cmd).await?;
    }

    log::info!("namespace {ns} and bridge {bridge} are ready");
    Ok(())
}
