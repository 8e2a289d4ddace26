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
//! Run the registration-time measurement sweep over topology sizes.
use std::path::PathBuf;

use clap::Parser;

use opcua_testbed::{
    config::TestbedConfig,
    controller::SkillMapStyle,
    launcher::WorkerMode,
    sweep::{run_sweep, DecrementPolicy, SweepOptions},
    util,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Largest topology size (number of switches) to measure.
    #[arg(short = 's', long, default_value_t = 2)]
    switches: usize,
    /// Step between consecutive topology sizes.
    #[arg(long, default_value_t = 2)]
    step: usize,
    /// Number of measurement iterations per topology size.
    #[arg(short = 'i', long, default_value_t = 10)]
    iterations: usize,
    /// Whether a broker restart consumes an iteration from the budget.
    #[arg(long, value_enum, default_value_t = DecrementPolicy::Always)]
    decrement_policy: DecrementPolicy,
    /// How workers locate the discovery service.
    #[arg(short = 'm', long, value_enum, default_value_t = WorkerMode::Multicast)]
    mode: WorkerMode,
    /// How skill-map entries are keyed for the controller.
    #[arg(long, value_enum, default_value_t = SkillMapStyle::ByIp)]
    skill_style: SkillMapStyle,
    /// Capture mDNS packets on the inter-switch link during iterations.
    #[arg(long)]
    sniff: bool,
    /// Configuration file; falls back to $TESTBED_CONFIG, then defaults.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();
    let args = Args::parse();

    let cfg = TestbedConfig::load(args.config.as_deref())?;
    let opts = SweepOptions {
        max_switches: args.switches,
        step: args.step,
        iterations: args.iterations,
        decrement: args.decrement_policy,
        mode: args.mode,
        skill_style: args.skill_style,
        sniff: args.sniff,
    };

    run_sweep(&cfg, &opts).await?;
    Ok(())
}
