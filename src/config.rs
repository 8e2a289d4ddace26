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
//! Externalized testbed configuration.
//!
//! The original driver scripts hard-coded absolute paths, credentials and
//! timing constants; here they are loaded once at startup, either from the
//! path given on the command line or from the `TESTBED_CONFIG` environment
//! variable, and threaded through as plain parameters.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable holding the path of the configuration file.
pub const CONFIG_ENV_VAR: &str = "TESTBED_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestbedConfig {
    /// Directory holding the per-role executable bundles
    /// (`coord/`, `Gripper/`, `Conveyer/`, `Sensor/`).
    pub base_folders: PathBuf,
    /// Root under which the per-run device folders `s<i>/d<j>` are created.
    pub device_folders: PathBuf,
    /// Archive for timestamp records, keyed by topology label.
    pub results_folder: PathBuf,
    /// Hosts file rewritten with the generated device names.
    pub hosts_file: PathBuf,
    /// Docker image used for every emulated node.
    pub docker_image: String,
    pub controller: ControllerConfig,
    pub broker: BrokerConfig,
    pub timing: TimingConfig,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            base_folders: "/var/lib/testbed/base_folders".into(),
            device_folders: "/var/lib/testbed/device_folders".into(),
            results_folder: "/var/lib/testbed/results".into(),
            hosts_file: "/etc/hosts".into(),
            docker_image: "ubuntu:trusty".into(),
            controller: ControllerConfig::default(),
            broker: BrokerConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Base URL of the SDN controller's RESTCONF interface.
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Directory from which the controller picks up the generated
    /// configuration documents (skill map, coordinator list, ...).
    pub resource_dir: PathBuf,
    /// OpenFlow endpoint announced to every virtual switch.
    pub openflow: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8181".into(),
            username: "admin".into(),
            password: "admin".into(),
            resource_dir: "/var/lib/testbed/controller_resources".into(),
            openflow: "tcp:127.0.0.1:6653".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Command line starting one broker-facing server process.
    pub command: Vec<String>,
    /// Command line purging the downstream message queue.
    pub purge_command: Vec<String>,
    /// Number of broker processes kept alive during a sweep.
    pub pool_size: usize,
    /// Settle time after purging the queue, in seconds.
    pub purge_pause_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            command: ["ip", "netns", "exec", "opcuaclient", "./server"]
                .map(String::from)
                .to_vec(),
            purge_command: ["activemq", "purge", "queue"].map(String::from).to_vec(),
            pool_size: 12,
            purge_pause_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between consecutive discovery-service launches, to avoid a boot
    /// storm of emulated nodes.
    pub stagger_ms: u64,
    /// Pause between starting the discovery group and the worker group.
    pub settle_secs: u64,
    /// Poll interval while monitoring process output.
    pub poll_interval_ms: u64,
    /// Wall-clock monitoring window for the worker group.
    pub worker_window_secs: u64,
    /// Wall-clock monitoring window for the discovery group.
    pub discovery_window_secs: u64,
    /// Pause between experiment iterations.
    pub iteration_pause_secs: u64,
    /// Duration of the auxiliary packet capture.
    pub sniff_window_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stagger_ms: 500,
            settle_secs: 3,
            poll_interval_ms: 250,
            worker_window_secs: 40,
            discovery_window_secs: 45,
            iteration_pause_secs: 5,
            sniff_window_secs: 15,
        }
    }
}

impl TestbedConfig {
    /// Load the configuration from the given path, falling back to the
    /// `TESTBED_CONFIG` environment variable, and to built-in defaults if
    /// neither is set.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => env::var_os(CONFIG_ENV_VAR).map(PathBuf::from),
        };
        match path {
            Some(path) => {
                log::info!("loading testbed configuration from {}", path.display());
                let raw = fs::read_to_string(&path)?;
                Ok(serde_json::from_str(&raw)?)
            }
            None => {
                log::info!("no configuration given, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"device_folders": "/tmp/devbed", "broker": {{"pool_size": 3}}}}"#
        )
        .unwrap();

        let cfg = TestbedConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.device_folders, PathBuf::from("/tmp/devbed"));
        assert_eq!(cfg.broker.pool_size, 3);
        // untouched fields fall back to the defaults
        assert_eq!(cfg.controller.username, "admin");
        assert_eq!(cfg.timing.worker_window_secs, 40);
    }
}
