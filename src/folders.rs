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
//! Per-run experiment folder management.
//!
//! Before a run, every emulated device gets a private folder `s<i>/d<j>`
//! seeded with its role's executable bundle; the folder is volume-mounted
//! into the container. After a run, the produced `timestamp.txt` files are
//! archived into a results tree keyed by topology label, and the whole
//! per-run tree is removed.

use std::fs;
use std::path::PathBuf;

use testbed_utils::fs::copy_tree;

use crate::addressing::{device_name, switch_name, AddressMap, WORKERS_PER_SWITCH};
use crate::config::TestbedConfig;
use crate::error::{Result, TestbedError};
use crate::util::PathBufExt;
use crate::SKILLS;

/// Name of the measurement file every worker writes into its folder.
pub const TIMESTAMP_FILE: &str = "timestamp.txt";
/// Bundle seeded into coordinator folders.
const COORDINATOR_BUNDLE: &str = "coord";

#[derive(Debug, Clone)]
pub struct ExperimentFolders {
    base: PathBuf,
    devices: PathBuf,
    results: PathBuf,
    hosts_file: PathBuf,
}

impl ExperimentFolders {
    pub fn new(cfg: &TestbedConfig) -> Self {
        Self {
            base: cfg.base_folders.clone(),
            devices: cfg.device_folders.clone(),
            results: cfg.results_folder.clone(),
            hosts_file: cfg.hosts_file.clone(),
        }
    }

    /// Folder of one device within the per-run tree.
    pub fn device_dir(&self, switch: usize, device: usize) -> PathBuf {
        self.devices
            .as_path()
            .then(switch_name(switch))
            .then(device_name(device))
    }

    /// Create the per-run tree for `switch_count` switches and seed every
    /// device folder with its role bundle: `coord` for the coordinator,
    /// `Gripper`/`Conveyer`/`Sensor` for the three workers of each switch.
    ///
    /// Creation is deliberately not idempotent: a second invocation without
    /// [`clean`](Self::clean) fails with an already-exists error instead of
    /// silently reusing stale folders.
    pub fn create(&self, switch_count: usize) -> Result<()> {
        log::info!("setting up device folders for {switch_count} switches");
        fs::create_dir_all(&self.devices)?;
        for switch in 1..=switch_count {
            fs::create_dir(self.devices.as_path().then(switch_name(switch)))?;
        }

        let mut device = 1;
        for switch in 1..=switch_count {
            copy_tree(
                self.base.as_path().then(COORDINATOR_BUNDLE),
                self.device_dir(switch, device),
            )?;
            device += 1;
        }
        for switch in 1..=switch_count {
            for skill in SKILLS {
                copy_tree(self.base.as_path().then(skill), self.device_dir(switch, device))?;
                device += 1;
            }
        }
        Ok(())
    }

    /// Copy each worker's timestamp record into the results archive under
    /// the given topology label. Must run before [`clean`](Self::clean).
    pub fn copy_time_records(&self, switch_count: usize, label: &str) -> Result<()> {
        log::info!("copying timestamp records to results folder, label {label}");
        let mut device = switch_count + 1;
        for switch in 1..=switch_count {
            for _ in 0..WORKERS_PER_SWITCH {
                let src = self.device_dir(switch, device).then(TIMESTAMP_FILE);
                if !src.exists() {
                    return Err(TestbedError::MissingTimestamp(src));
                }
                let dst_dir = self.results.as_path().then(label).then(device_name(device));
                fs::create_dir_all(&dst_dir)?;
                fs::copy(&src, dst_dir.then(TIMESTAMP_FILE))?;
                device += 1;
            }
        }
        Ok(())
    }

    /// Remove the whole per-run device tree.
    pub fn clean(&self) -> Result<()> {
        log::info!("removing device folders at {}", self.devices.display());
        fs::remove_dir_all(&self.devices)?;
        Ok(())
    }

    /// Rewrite the hosts file with the generated device names: stale
    /// `10.0.0.` entries are dropped, fresh ones appended, and the file is
    /// replaced atomically through a sibling temp file.
    pub fn update_hostnames(&self, addrs: &AddressMap) -> Result<()> {
        log::info!("updating hostnames in {}", self.hosts_file.display());
        let old = fs::read_to_string(&self.hosts_file)?;
        let mut new: String = old
            .lines()
            .filter(|line| !line.contains("10.0.0."))
            .map(|line| format!("{line}\n"))
            .collect();
        for (id, ip, _) in addrs.iter() {
            new.push_str(&format!("{ip}  {}\n", device_name(id)));
        }

        let staging = self.hosts_file.with_file_name("newhosts");
        fs::write(&staging, new)?;
        fs::rename(&staging, &self.hosts_file)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;

    fn config(root: &Path) -> TestbedConfig {
        let mut cfg = TestbedConfig::default();
        cfg.base_folders = root.join("base");
        cfg.device_folders = root.join("devices");
        cfg.results_folder = root.join("results");
        cfg.hosts_file = root.join("hosts");
        cfg
    }

    fn seed_bundles(cfg: &TestbedConfig) {
        for bundle in ["coord", "Gripper", "Conveyer", "Sensor"] {
            let dir = cfg.base_folders.join(bundle);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("role"), bundle).unwrap();
        }
    }

    #[test]
    fn creates_seeded_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        seed_bundles(&cfg);
        let folders = ExperimentFolders::new(&cfg);

        folders.create(2).unwrap();

        // coordinators d1, d2; workers d3..d8, three per switch in skill order
        let role = |s, d| fs::read_to_string(folders.device_dir(s, d).join("role")).unwrap();
        assert_eq!(role(1, 1), "coord");
        assert_eq!(role(2, 2), "coord");
        assert_eq!(role(1, 3), "Gripper");
        assert_eq!(role(1, 4), "Conveyer");
        assert_eq!(role(1, 5), "Sensor");
        assert_eq!(role(2, 6), "Gripper");
        assert_eq!(role(2, 8), "Sensor");
    }

    #[test]
    fn second_create_fails_without_cleanup() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        seed_bundles(&cfg);
        let folders = ExperimentFolders::new(&cfg);

        folders.create(2).unwrap();
        match folders.create(2) {
            Err(TestbedError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::AlreadyExists)
            }
            other => panic!("expected already-exists error, got {other:?}"),
        }

        // after cleanup, creation works again
        folders.clean().unwrap();
        folders.create(2).unwrap();
    }

    #[test]
    fn collects_worker_records_then_cleans() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        seed_bundles(&cfg);
        let folders = ExperimentFolders::new(&cfg);
        folders.create(2).unwrap();

        let addrs = AddressMap::new(2);
        for id in addrs.worker_ids() {
            let dir = folders.device_dir(addrs.switch_of(id), id);
            fs::write(dir.join(TIMESTAMP_FILE), "register:1000000\n").unwrap();
        }

        folders.copy_time_records(2, "2").unwrap();
        for id in addrs.worker_ids() {
            let archived = cfg
                .results_folder
                .join("2")
                .join(device_name(id))
                .join(TIMESTAMP_FILE);
            assert!(archived.exists());
        }

        folders.clean().unwrap();
        assert!(!cfg.device_folders.exists());
        // results survive cleanup
        assert!(cfg.results_folder.join("2/d3/timestamp.txt").exists());
    }

    #[test]
    fn missing_record_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        seed_bundles(&cfg);
        let folders = ExperimentFolders::new(&cfg);
        folders.create(2).unwrap();

        match folders.copy_time_records(2, "2") {
            Err(TestbedError::MissingTimestamp(path)) => {
                assert!(path.ends_with("s1/d3/timestamp.txt"))
            }
            other => panic!("expected missing-timestamp error, got {other:?}"),
        }
    }

    #[test]
    fn hostnames_replace_stale_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        fs::write(
            &cfg.hosts_file,
            "127.0.0.1 localhost\n10.0.0.99  stale\n::1 ip6-localhost\n",
        )
        .unwrap();
        let folders = ExperimentFolders::new(&cfg);

        folders.update_hostnames(&AddressMap::new(1)).unwrap();

        let hosts = fs::read_to_string(&cfg.hosts_file).unwrap();
        assert!(hosts.contains("127.0.0.1 localhost"));
        assert!(!hosts.contains("stale"));
        assert!(hosts.contains("10.0.0.1  d1"));
        assert!(hosts.contains("10.0.0.4  d4"));
    }
}
