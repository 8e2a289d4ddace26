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
//! Deterministic device addressing for a topology size.
//!
//! Every switch `s<i>` carries one coordinator and three worker devices.
//! Devices are numbered `d1..d4N`: the first `N` ids are the coordinators
//! (in switch order), the remaining `3N` ids are the workers, three
//! consecutive ids per switch. Addresses are assigned monotonically from the
//! device id: `10.0.0.<id>` and `00:00:00:00:00:<id as hex byte>`.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use mac_address::MacAddress;

/// Devices attached to each switch: one coordinator plus three workers.
pub const DEVICES_PER_SWITCH: usize = 4;
/// Worker devices attached to each switch.
pub const WORKERS_PER_SWITCH: usize = 3;

pub fn device_name(id: usize) -> String {
    format!("d{id}")
}

pub fn switch_name(id: usize) -> String {
    format!("s{id}")
}

/// Device-id to network and link-layer address assignment for one topology
/// size. Pure function of the switch count.
#[derive(Debug, Clone)]
pub struct AddressMap {
    switch_count: usize,
    ips: BTreeMap<usize, Ipv4Addr>,
    macs: BTreeMap<usize, MacAddress>,
}

impl AddressMap {
    /// Generate the map for `switch_count` switches.
    ///
    /// # Panics
    /// Panics if `switch_count` is zero or the resulting device count does
    /// not fit the `10.0.0.0/24` host range.
    pub fn new(switch_count: usize) -> Self {
        assert!(switch_count >= 1, "switch count must be positive");
        let device_count = switch_count * DEVICES_PER_SWITCH;
        assert!(device_count <= 254, "device ids exhaust the 10.0.0.0/24 host range");

        let ips = (1..=device_count)
            .map(|id| (id, Ipv4Addr::new(10, 0, 0, id as u8)))
            .collect();
        let macs = (1..=device_count)
            .map(|id| (id, MacAddress::new([0, 0, 0, 0, 0, id as u8])))
            .collect();
        Self {
            switch_count,
            ips,
            macs,
        }
    }

    pub fn switch_count(&self) -> usize {
        self.switch_count
    }

    pub fn device_count(&self) -> usize {
        self.switch_count * DEVICES_PER_SWITCH
    }

    pub fn ip(&self, device_id: usize) -> Ipv4Addr {
        self.ips[&device_id]
    }

    pub fn mac(&self, device_id: usize) -> MacAddress {
        self.macs[&device_id]
    }

    /// All entries in ascending device-id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Ipv4Addr, MacAddress)> + '_ {
        self.ips
            .iter()
            .map(|(id, ip)| (*id, *ip, self.macs[id]))
    }

    /// Device ids of the coordinators, in switch order.
    pub fn coordinator_ids(&self) -> impl Iterator<Item = usize> {
        1..=self.switch_count
    }

    /// Device ids of the workers, in ascending order.
    pub fn worker_ids(&self) -> impl Iterator<Item = usize> {
        self.switch_count + 1..=self.device_count()
    }

    /// IPv4 addresses of all coordinator devices, in switch order.
    pub fn coordinator_ips(&self) -> Vec<Ipv4Addr> {
        self.coordinator_ids().map(|id| self.ip(id)).collect()
    }

    /// Switch a device is attached to.
    pub fn switch_of(&self, device_id: usize) -> usize {
        if device_id <= self.switch_count {
            device_id
        } else {
            (device_id - self.switch_count - 1) / WORKERS_PER_SWITCH + 1
        }
    }

    /// Coordinator device of the switch a worker is attached to.
    pub fn coordinator_of(&self, worker_id: usize) -> usize {
        debug_assert!(worker_id > self.switch_count);
        self.switch_of(worker_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn four_entries_per_switch() {
        for n in 1..=8 {
            let map = AddressMap::new(n);
            assert_eq!(map.iter().count(), 4 * n);
        }
    }

    #[test]
    fn addresses_unique_and_ascending() {
        let map = AddressMap::new(8);
        let ids = map.iter().map(|(id, _, _)| id).collect_vec();
        assert!(ids.iter().tuple_windows().all(|(a, b)| a < b));
        assert_eq!(map.iter().map(|(_, ip, _)| ip).unique().count(), 32);
        assert_eq!(
            map.iter().map(|(_, _, mac)| mac.to_string()).unique().count(),
            32
        );
    }

    #[test]
    fn sequential_assignment() {
        let map = AddressMap::new(2);
        assert_eq!(map.ip(1), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(map.ip(8), Ipv4Addr::new(10, 0, 0, 8));
        assert_eq!(map.mac(8).bytes(), [0, 0, 0, 0, 0, 8]);
        // two-digit hex once the id exceeds 15
        assert_eq!(AddressMap::new(4).mac(16).bytes(), [0, 0, 0, 0, 0, 0x10]);
    }

    #[test]
    fn roles_and_switch_assignment() {
        let map = AddressMap::new(2);
        assert_eq!(map.coordinator_ids().collect_vec(), vec![1, 2]);
        assert_eq!(map.worker_ids().collect_vec(), vec![3, 4, 5, 6, 7, 8]);
        // workers 3,4,5 sit behind s1; 6,7,8 behind s2
        assert_eq!(map.switch_of(3), 1);
        assert_eq!(map.switch_of(5), 1);
        assert_eq!(map.switch_of(6), 2);
        assert_eq!(map.coordinator_of(6), 2);
    }

    #[test]
    #[should_panic]
    fn zero_switches_rejected() {
        AddressMap::new(0);
    }
}
