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
//! Control-plane notifier for the SDN controller.
//!
//! Two kinds of interaction: configuration documents written into the
//! controller's file-backed resource location, and RESTCONF RPC triggers
//! that apply the pushed configuration or flush stale state. Calls carry
//! basic-auth credentials from the configuration; there is no retry layer.

use std::collections::BTreeMap;
use std::fs::File;
use std::net::Ipv4Addr;

use serde_json::json;

use crate::addressing::AddressMap;
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::util::PathBufExt;
use crate::SKILLS;

const SKILL_MAP_FILE: &str = "skillmap.json";
const COORDINATOR_LIST_FILE: &str = "coordinatorList.json";
const WORKSTATION_MAP_FILE: &str = "switch_workstation_map.json";

/// How skill-map entries are keyed. The deployed controller variants accept
/// either the coordinator's IP or a workstation identifier per switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SkillMapStyle {
    /// `{"<coordinator ip>": [skills...]}`
    ByIp,
    /// `{"ws:<switch>": [skills...]}`
    ByWorkstation,
}

#[derive(Debug)]
pub struct ControllerClient {
    http: reqwest::Client,
    cfg: ControllerConfig,
}

impl ControllerClient {
    pub fn new(cfg: &ControllerConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            cfg: cfg.clone(),
        })
    }

    /// Build the skill-map document: one entry per switch, each carrying the
    /// full skill list.
    pub fn skill_map(addrs: &AddressMap, style: SkillMapStyle) -> serde_json::Value {
        let entries: BTreeMap<String, Vec<&str>> = (1..=addrs.switch_count())
            .map(|switch| {
                let key = match style {
                    SkillMapStyle::ByIp => addrs.ip(switch).to_string(),
                    SkillMapStyle::ByWorkstation => format!("ws:{switch}"),
                };
                (key, SKILLS.to_vec())
            })
            .collect();
        json!(entries)
    }

    /// Build the coordinator-list document: `{"coordinators": [ips...]}`.
    pub fn coordinator_list(addrs: &AddressMap) -> serde_json::Value {
        let ips: Vec<String> = addrs
            .coordinator_ips()
            .iter()
            .map(Ipv4Addr::to_string)
            .collect();
        json!({ "coordinators": ips })
    }

    /// Build the switch-to-workstation document: `{"openflow:<n>": "ws:<n>"}`.
    pub fn workstation_map(switch_count: usize) -> serde_json::Value {
        let entries: BTreeMap<String, String> = (1..=switch_count)
            .map(|switch| (format!("openflow:{switch}"), format!("ws:{switch}")))
            .collect();
        json!(entries)
    }

    pub fn write_skill_map(&self, addrs: &AddressMap, style: SkillMapStyle) -> Result<()> {
        log::info!("creating coordinator skill map");
        self.write_doc(SKILL_MAP_FILE, &Self::skill_map(addrs, style))
    }

    pub fn write_coordinator_list(&self, addrs: &AddressMap) -> Result<()> {
        log::info!("creating coordinator list");
        self.write_doc(COORDINATOR_LIST_FILE, &Self::coordinator_list(addrs))
    }

    pub fn write_workstation_map(&self, switch_count: usize) -> Result<()> {
        log::info!("creating switch-workstation map");
        self.write_doc(WORKSTATION_MAP_FILE, &Self::workstation_map(switch_count))
    }

    fn write_doc(&self, name: &str, value: &serde_json::Value) -> Result<()> {
        let path = self.cfg.resource_dir.as_path().then(name);
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(file, value)?;
        log::debug!("wrote {}", path.display());
        Ok(())
    }

    /// Trigger the controller to apply the pushed skill map.
    pub async fn update_skills(&self) -> Result<()> {
        log::info!("making an RPC call to update the skill map");
        self.post_rpc("updateSkills:update-skills-map").await
    }

    /// Trigger the controller to apply the pushed coordinator list.
    pub async fn update_coordinators(&self) -> Result<()> {
        log::info!("making an RPC call to update the coordinator list");
        self.post_rpc("updateCoordinator:update-coordinator-list").await
    }

    /// Flush packets buffered from the previous iteration.
    pub async fn flush_packets(&self) -> Result<()> {
        log::info!("flushing stored packets");
        self.post_rpc("flushPktRpc:flushPkts").await
    }

    /// Flush the switches' group tables.
    pub async fn flush_group_table(&self) -> Result<()> {
        log::info!("clearing the group table");
        self.post_rpc("FlushGroupTable:flushGrpTable").await
    }

    async fn post_rpc(&self, operation: &str) -> Result<()> {
        let url = format!("{}/restconf/operations/{operation}", self.cfg.endpoint);
        self.http
            .post(&url)
            .basic_auth(&self.cfg.username, Some(&self.cfg.password))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn skill_map_keyed_by_coordinator_ip() {
        let addrs = AddressMap::new(2);
        let doc = ControllerClient::skill_map(&addrs, SkillMapStyle::ByIp);
        assert_eq!(
            doc,
            json!({
                "10.0.0.1": ["Gripper", "Conveyer", "Sensor"],
                "10.0.0.2": ["Gripper", "Conveyer", "Sensor"],
            })
        );
    }

    #[test]
    fn skill_map_keyed_by_workstation() {
        let addrs = AddressMap::new(2);
        let doc = ControllerClient::skill_map(&addrs, SkillMapStyle::ByWorkstation);
        assert_eq!(
            doc,
            json!({
                "ws:1": ["Gripper", "Conveyer", "Sensor"],
                "ws:2": ["Gripper", "Conveyer", "Sensor"],
            })
        );
    }

    #[test]
    fn coordinator_list_in_switch_order() {
        let addrs = AddressMap::new(3);
        let doc = ControllerClient::coordinator_list(&addrs);
        assert_eq!(doc, json!({ "coordinators": ["10.0.0.1", "10.0.0.2", "10.0.0.3"] }));
    }

    #[test]
    fn workstation_map_covers_all_switches() {
        let doc = ControllerClient::workstation_map(2);
        assert_eq!(doc, json!({ "openflow:1": "ws:1", "openflow:2": "ws:2" }));
    }

    #[test]
    fn documents_land_in_resource_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = ControllerConfig::default();
        cfg.resource_dir = tmp.path().to_path_buf();
        let client = ControllerClient::new(&cfg).unwrap();

        let addrs = AddressMap::new(2);
        client.write_skill_map(&addrs, SkillMapStyle::ByIp).unwrap();
        client.write_coordinator_list(&addrs).unwrap();
        client.write_workstation_map(2).unwrap();

        let skill_map: serde_json::Value = serde_json::from_reader(
            File::open(tmp.path().join(SKILL_MAP_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(skill_map["10.0.0.1"][0], "Gripper");
        assert!(tmp.path().join(COORDINATOR_LIST_FILE).exists());
        assert!(tmp.path().join(WORKSTATION_MAP_FILE).exists());
    }
}
