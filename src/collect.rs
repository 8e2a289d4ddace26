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
//! Collection of timestamp records into a single CSV table.
//!
//! The results archive is laid out as `<root>/<topology>/<device>/timestamp.txt`
//! where each line carries a measured registration duration as
//! `...register:<integer>`. Collection is order-independent: records are
//! sorted before they are written, so any traversal order of the tree yields
//! the same table.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::folders::TIMESTAMP_FILE;

lazy_static! {
    static ref REGISTER: Regex = Regex::new(r"register:(\d+)").unwrap();
}

/// One measured registration duration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "Topology")]
    pub topology: String,
    pub device: String,
    pub duration: u64,
}

/// Gather all timestamp records below `root`, sorted by topology label,
/// device and duration.
pub fn collect_records(root: &Path) -> Result<Vec<ResultRecord>> {
    let pattern = root.join("*").join("*").join(TIMESTAMP_FILE);
    let mut records = Vec::new();
    for entry in glob::glob(&pattern.to_string_lossy())? {
        let path = entry?;
        // <root>/<topology>/<device>/timestamp.txt
        let device_dir = path.parent().expect("matched file has a parent");
        let device = device_dir
            .file_name()
            .expect("device folder has a name")
            .to_string_lossy()
            .to_string();
        let topology = device_dir
            .parent()
            .and_then(Path::file_name)
            .expect("topology folder has a name")
            .to_string_lossy()
            .to_string();

        for line in fs::read_to_string(&path)?.lines() {
            if let Some(capture) = REGISTER.captures(line) {
                if let Ok(duration) = capture[1].parse() {
                    records.push(ResultRecord {
                        topology: topology.clone(),
                        device: device.clone(),
                        duration,
                    });
                } else {
                    log::warn!("overflowing duration in {}: {line}", path.display());
                }
            }
        }
    }
    records.sort();
    Ok(records)
}

/// Write the records as CSV with the `Topology,device,duration` header.
pub fn write_csv(records: &[ResultRecord], out: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(out)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    log::info!("wrote {} record(s) to {}", records.len(), out.display());
    Ok(())
}

/// Mean duration per topology label, for the run summary.
pub fn mean_by_topology(records: &[ResultRecord]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (u64, usize)> = BTreeMap::new();
    for record in records {
        let entry = sums.entry(record.topology.clone()).or_default();
        entry.0 += record.duration;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(topology, (sum, count))| (topology, sum as f64 / count as f64))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_record(root: &Path, topology: &str, device: &str, lines: &str) {
        let dir = root.join(topology).join(device);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(TIMESTAMP_FILE), lines).unwrap();
    }

    #[test]
    fn collects_all_registers() {
        let tmp = tempfile::tempdir().unwrap();
        for device in ["d3", "d4", "d5", "d6", "d7", "d8"] {
            write_record(tmp.path(), "2", device, "register:1000000\n");
        }
        write_record(tmp.path(), "3", "d4", "boot done\nregister:1500\nregister:2500\n");

        let records = collect_records(tmp.path()).unwrap();
        assert_eq!(records.len(), 8);
        assert_eq!(
            records.iter().filter(|r| r.duration == 1000000).count(),
            6
        );
        assert_eq!(records.last().unwrap().topology, "3");
    }

    #[test]
    fn end_to_end_two_switches() {
        // eight devices with a registration of 1000000 each
        let tmp = tempfile::tempdir().unwrap();
        for id in 1..=8 {
            write_record(tmp.path(), "2", &format!("d{id}"), "register:1000000\n");
        }

        let records = collect_records(tmp.path()).unwrap();
        assert_eq!(records.len(), 8);
        assert!(records.iter().all(|r| r.duration == 1000000));
        assert!(records.iter().all(|r| r.topology == "2"));
    }

    #[test]
    fn output_is_traversal_order_independent() {
        let tmp_a = tempfile::tempdir().unwrap();
        let tmp_b = tempfile::tempdir().unwrap();
        let sets = [("2", "d3", "register:10\n"), ("2", "d4", "register:20\n"), ("4", "d5", "register:30\n")];
        for (topology, device, lines) in sets {
            write_record(tmp_a.path(), topology, device, lines);
        }
        for (topology, device, lines) in sets.iter().rev() {
            write_record(tmp_b.path(), topology, device, lines);
        }

        assert_eq!(
            collect_records(tmp_a.path()).unwrap(),
            collect_records(tmp_b.path()).unwrap()
        );
    }

    #[test]
    fn csv_has_expected_header() {
        let tmp = tempfile::tempdir().unwrap();
        let records = vec![ResultRecord {
            topology: "2".to_string(),
            device: "d3".to_string(),
            duration: 1000000,
        }];
        let out = tmp.path().join("collect.csv");
        write_csv(&records, &out).unwrap();

        let written = fs::read_to_string(&out).unwrap();
        assert_eq!(written, "Topology,device,duration\n2,d3,1000000\n");
    }

    #[test]
    fn unwritable_output_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("missing").join("collect.csv");
        match write_csv(&[], &out) {
            Err(crate::TestbedError::Csv(_)) => {}
            other => panic!("expected CSV error, got {other:?}"),
        }
    }

    #[test]
    fn mean_groups_by_topology() {
        let records = vec![
            ResultRecord { topology: "2".into(), device: "d3".into(), duration: 10 },
            ResultRecord { topology: "2".into(), device: "d4".into(), duration: 30 },
            ResultRecord { topology: "4".into(), device: "d5".into(), duration: 5 },
        ];
        let means = mean_by_topology(&records);
        assert_eq!(means["2"], 20.0);
        assert_eq!(means["4"], 5.0);
    }
}
