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
//! Top-level experiment sweep over topology sizes.
//!
//! For every topology size: prepare folders, addresses, hostnames and
//! controller configuration, build the emulated network, run the iteration
//! budget while keeping the broker pool alive, then archive the timestamp
//! records and tear everything down. A failure aborts the whole sweep;
//! there is no partial-failure isolation between sizes.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::time::Duration;

use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use tokio::time::Instant;

use crate::addressing::AddressMap;
use crate::broker::BrokerPool;
use crate::collect;
use crate::config::TestbedConfig;
use crate::controller::{ControllerClient, SkillMapStyle};
use crate::error::Result;
use crate::folders::ExperimentFolders;
use crate::launcher::{self, WorkerMode};
use crate::sniffer;
use crate::topology::{EmulatedNetwork, TopologyPlan};

/// When the remaining-iteration counter is decremented. The historical
/// drivers disagreed on whether a broker restart consumes an iteration;
/// the policy is therefore an explicit parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DecrementPolicy {
    /// Every pass consumes the budget, even if the broker had to be
    /// restarted. Guarantees termination with a flapping broker.
    Always,
    /// Only passes with a healthy broker consume the budget; a restarted
    /// iteration is repeated.
    OnHealthyBroker,
}

/// Remaining budget after one pass of the iteration loop.
pub fn remaining_after(remaining: usize, broker_restarted: bool, policy: DecrementPolicy) -> usize {
    match policy {
        DecrementPolicy::Always => remaining - 1,
        DecrementPolicy::OnHealthyBroker if broker_restarted => remaining,
        DecrementPolicy::OnHealthyBroker => remaining - 1,
    }
}

#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Largest topology size; sizes run from 2 up to this in `step`s.
    pub max_switches: usize,
    pub step: usize,
    /// Iteration budget per topology size.
    pub iterations: usize,
    pub decrement: DecrementPolicy,
    pub mode: WorkerMode,
    pub skill_style: SkillMapStyle,
    /// Capture mDNS packets on the inter-switch link during iterations.
    pub sniff: bool,
}

pub async fn run_sweep(cfg: &TestbedConfig, opts: &SweepOptions) -> Result<()> {
    let start = Instant::now();
    let folders = ExperimentFolders::new(cfg);
    let client = ControllerClient::new(&cfg.controller)?;

    let mut broker = BrokerPool::new(&cfg.broker)?;
    broker.spawn(cfg.broker.pool_size)?;

    let sizes: Vec<usize> = (2..=opts.max_switches).step_by(opts.step).collect();
    let bar = ProgressBar::new((sizes.len() * opts.iterations) as u64);
    bar.set_style(
        ProgressStyle::with_template("{wide_bar} {pos}/{len} iterations, elapsed: {elapsed}")
            .unwrap(),
    );

    for switch_count in sizes {
        log::info!("==== topology size {switch_count} ====");
        folders.create(switch_count)?;
        let addrs = AddressMap::new(switch_count);
        folders.update_hostnames(&addrs)?;

        client.write_skill_map(&addrs, opts.skill_style)?;
        client.write_coordinator_list(&addrs)?;
        client.write_workstation_map(switch_count)?;
        client.update_skills().await?;
        client.update_coordinators().await?;
        tokio::time::sleep(Duration::from_secs(cfg.timing.settle_secs)).await;

        let plan = TopologyPlan::new(switch_count, &addrs, &cfg.device_folders);
        let net = EmulatedNetwork::build(plan, cfg).await?;
        net.configure_normal_flows().await?;

        let mut remaining = opts.iterations;
        while remaining > 0 {
            let capture = opts
                .sniff
                .then(|| net.plan().chain_interface())
                .flatten()
                .map(|ifname| {
                    tokio::spawn(sniffer::capture_count(
                        ifname,
                        Duration::from_secs(cfg.timing.sniff_window_secs),
                    ))
                });

            launcher::run_program(&net, &addrs, opts.mode, &cfg.timing).await?;
            client.flush_packets().await?;
            client.flush_group_table().await?;
            tokio::time::sleep(Duration::from_secs(cfg.timing.iteration_pause_secs)).await;

            if let Some(handle) = capture {
                match handle.await {
                    Ok(Ok(count)) => log::info!("sniffer saw {count} mDNS packet(s)"),
                    Ok(Err(e)) => log::warn!("packet capture failed: {e}"),
                    Err(e) => log::warn!("packet capture panicked: {e}"),
                }
            }

            let died = broker.ensure().await?;
            if died == 0 {
                log_iteration(cfg, switch_count, remaining)?;
            }
            let next = remaining_after(remaining, died > 0, opts.decrement);
            if next < remaining {
                bar.inc(1);
            }
            remaining = next;
        }

        net.stop().await;
        folders.copy_time_records(switch_count, &switch_count.to_string())?;
        folders.clean()?;
    }

    bar.finish();
    broker.terminate().await;

    let records = collect::collect_records(&cfg.results_folder)?;
    for (topology, mean) in collect::mean_by_topology(&records) {
        log::info!("topology {topology}: mean time to register {mean:.0}");
    }
    log::info!(
        "time to complete measurement: {}",
        HumanDuration(start.elapsed())
    );
    Ok(())
}

/// Append one line per completed iteration to the run log, so an aborted
/// sweep can be picked apart afterwards.
fn log_iteration(cfg: &TestbedConfig, switch_count: usize, remaining: usize) -> Result<()> {
    // the results folder does not exist yet on the first iteration
    fs::create_dir_all(&cfg.results_folder)?;
    let mut logfile = OpenOptions::new()
        .create(true)
        .append(true)
        .open(cfg.results_folder.join("Testlog"))?;
    writeln!(
        logfile,
        "[{}] Topology: {switch_count} and iteration: {remaining}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn always_policy_consumes_budget() {
        assert_eq!(remaining_after(5, false, DecrementPolicy::Always), 4);
        assert_eq!(remaining_after(5, true, DecrementPolicy::Always), 4);
    }

    #[test]
    fn healthy_policy_repeats_restarted_iterations() {
        assert_eq!(remaining_after(5, false, DecrementPolicy::OnHealthyBroker), 4);
        assert_eq!(remaining_after(5, true, DecrementPolicy::OnHealthyBroker), 5);
    }

    #[test]
    fn iteration_log_works_on_fresh_results_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = TestbedConfig::default();
        cfg.results_folder = tmp.path().join("results");

        log_iteration(&cfg, 2, 10).unwrap();
        log_iteration(&cfg, 2, 9).unwrap();

        let log = fs::read_to_string(cfg.results_folder.join("Testlog")).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.contains("Topology: 2 and iteration: 10"));
    }
}
