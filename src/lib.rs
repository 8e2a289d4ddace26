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
//! Library for orchestrating OPC-UA service-discovery experiments on an
//! emulated OVS/Docker network.

/// Skills advertised by the workers of every workstation, in the order
/// their bundles are seeded into the per-switch device folders.
pub const SKILLS: [&str; 3] = ["Gripper", "Conveyer", "Sensor"];

pub mod addressing;
pub mod broker;
pub mod collect;
pub mod config;
pub mod controller;
pub mod error;
pub mod folders;
pub mod launcher;
pub mod sniffer;
pub mod sweep;
pub mod topology;
pub mod util;

pub use error::{Result, TestbedError};

pub mod prelude {
    pub use super::{
        addressing::AddressMap,
        config::TestbedConfig,
        controller::{ControllerClient, SkillMapStyle},
        launcher::WorkerMode,
        sweep::{run_sweep, DecrementPolicy, SweepOptions},
        Result, TestbedError,
    };
}
