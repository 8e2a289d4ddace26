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
//! Supervised pool of broker-facing server processes.
//!
//! The experiment's AMQP clients die occasionally; the pool polls their
//! exit status between iterations, purges the downstream queue and respawns
//! exactly as many replacements as processes died. The purge always happens
//! before the replacements start, so fresh servers never see stale messages.

use std::time::Duration;

use tokio::process::{Child, Command};

use testbed_utils::process::run_checked;

use crate::config::BrokerConfig;
use crate::error::{Result, TestbedError};

#[derive(Debug)]
pub struct BrokerPool {
    command: Vec<String>,
    purge_command: Vec<String>,
    purge_pause: Duration,
    children: Vec<Child>,
}

impl BrokerPool {
    pub fn new(cfg: &BrokerConfig) -> Result<Self> {
        if cfg.command.is_empty() {
            return Err(TestbedError::Config("broker command is empty".into()));
        }
        Ok(Self {
            command: cfg.command.clone(),
            purge_command: cfg.purge_command.clone(),
            purge_pause: Duration::from_secs(cfg.purge_pause_secs),
            children: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.children.iter().filter_map(Child::id).collect()
    }

    /// Spawn `count` additional broker processes.
    pub fn spawn(&mut self, count: usize) -> Result<()> {
        log::info!("starting {count} broker server(s)");
        for _ in 0..count {
            let child = Command::new(&self.command[0])
                .args(&self.command[1..])
                .spawn()?;
            self.children.push(child);
        }
        Ok(())
    }

    /// Poll every member and drop those that exited. Returns how many died.
    pub fn reap(&mut self) -> usize {
        let before = self.children.len();
        self.children
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
        let died = before - self.children.len();
        if died > 0 {
            log::warn!("{died} broker server(s) exited");
        }
        died
    }

    /// Purge the downstream message queue and wait for it to settle.
    pub async fn purge_queue(&self) -> Result<()> {
        log::info!("purging the message queue");
        run_checked(self.purge_command.iter()).await?;
        tokio::time::sleep(self.purge_pause).await;
        Ok(())
    }

    /// Liveness check between iterations: if any member died, purge the
    /// queue and spawn exactly that many replacements. Returns the number of
    /// members that had died.
    pub async fn ensure(&mut self) -> Result<usize> {
        let died = self.reap();
        if died > 0 {
            self.purge_queue().await?;
            self.spawn(died)?;
        }
        Ok(died)
    }

    /// Send SIGTERM to every member and consume the pool. Delivery is not
    /// confirmed, matching the advisory-shutdown model of the drivers.
    pub async fn terminate(mut self) {
        log::info!("terminating {} broker server(s)", self.children.len());
        for child in &mut self.children {
            let Some(pid) = child.id() else { continue };
            if let Err(e) = run_checked(["kill", "-TERM", &pid.to_string()]).await {
                log::warn!("could not signal broker process {pid}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pool_config(command: &[&str], purge: &[&str]) -> BrokerConfig {
        BrokerConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            purge_command: purge.iter().map(|s| s.to_string()).collect(),
            pool_size: 12,
            purge_pause_secs: 0,
        }
    }

    #[tokio::test]
    async fn healthy_pool_needs_no_restart() {
        let cfg = pool_config(&["sleep", "30"], &["true"]);
        let mut pool = BrokerPool::new(&cfg).unwrap();
        pool.spawn(4).unwrap();

        assert_eq!(pool.ensure().await.unwrap(), 0);
        assert_eq!(pool.len(), 4);
        pool.terminate().await;
    }

    #[tokio::test]
    async fn dead_members_are_replaced_after_purge() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("purged");
        let cfg = pool_config(
            &["sleep", "30"],
            &["touch", marker.to_str().unwrap()],
        );
        let mut pool = BrokerPool::new(&cfg).unwrap();
        pool.spawn(12).unwrap();

        // kill 3 of the 12 members
        for pid in pool.pids().into_iter().take(3) {
            run_checked(["kill", "-KILL", &pid.to_string()]).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let died = pool.ensure().await.unwrap();
        assert_eq!(died, 3);
        assert_eq!(pool.len(), 12);
        assert!(marker.exists(), "queue must be purged before respawning");
        pool.terminate().await;
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let cfg = pool_config(&[], &["true"]);
        assert!(matches!(
            BrokerPool::new(&cfg),
            Err(TestbedError::Config(_))
        ));
    }
}
