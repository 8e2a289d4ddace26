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
//! Run the broker-facing server pool standalone, outside a sweep.
//!
//! Keeps the pool at its configured size until interrupted, purging the
//! queue and respawning whenever members die.
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use opcua_testbed::{broker::BrokerPool, config::TestbedConfig, util};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Pool size; defaults to the configured one.
    #[arg(short = 'c', long)]
    count: Option<usize>,
    /// Configuration file; falls back to $TESTBED_CONFIG, then defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();
    let args = Args::parse();

    let cfg = TestbedConfig::load(args.config.as_deref())?;
    let mut pool = BrokerPool::new(&cfg.broker)?;
    pool.spawn(args.count.unwrap_or(cfg.broker.pool_size))?;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(2)) => {
                pool.ensure().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted, shutting the pool down");
                break;
            }
        }
    }
    pool.terminate().await;
    Ok(())
}
