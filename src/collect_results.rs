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
//! Collect archived timestamp records into a single CSV table.
use std::path::PathBuf;

use clap::Parser;

use opcua_testbed::{collect, util};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Results archive to collect, laid out as `<folder>/<topology>/<device>/`.
    #[arg(short = 'f', long)]
    folder: PathBuf,
    /// Output CSV file.
    #[arg(short = 'o', long, default_value = "collect.csv")]
    out: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();
    let args = Args::parse();

    let records = collect::collect_records(&args.folder)?;
    collect::write_csv(&records, &args.out)?;
    for (topology, mean) in collect::mean_by_topology(&records) {
        log::info!("topology {topology}: mean time to register {mean:.0}");
    }
    Ok(())
}
