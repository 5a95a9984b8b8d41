use std::sync::Arc;
use tmc_api::{device, state::ObsState, Result};

use crate::config::Layout;
use crate::pool::{Pool, Proxy};
use crate::sync::{Operation, SyncGuard};

/// Façade over one subarray node.

pub struct SubarrayNode {
    id: usize,
    proxy: Proxy,
    guard: SyncGuard,
}

impl SubarrayNode {
    pub async fn create(
        pool: &Pool,
        layout: &Arc<Layout>,
        id: usize,
    ) -> Result<Self> {
        let proxy = pool.proxy(&layout.subarray(id)?.node).await?;

        Ok(SubarrayNode {
            id,
            proxy,
            guard: SyncGuard::new(
                pool.clone(),
                layout.clone(),
                layout.default_timeout(),
            ),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Reads the subarray's current observation state.

    pub async fn obs_state(&self) -> Result<ObsState> {
        let reading = self
            .proxy
            .read_attribute(&device::Attr::obs_state())
            .await?;

        ObsState::try_from(reading.value)
    }

    // Issues `op`'s command on the subarray node under the guard,
    // with an optional JSON argument.

    async fn run(
        &self,
        op: Operation,
        arg: Option<&serde_json::Value>,
    ) -> Result<()> {
        let arg = arg.map(|v| device::Value::from(v.to_string()));

        self.guard
            .run(op, Some(self.id), async {
                self.proxy.command(op.command(), arg).await.map(|_| ())
            })
            .await
    }

    /// Configures the subarray for a scan and waits for READY.

    pub async fn configure(
        &self,
        scan_cfg: &serde_json::Value,
    ) -> Result<()> {
        self.run(Operation::Configure, Some(scan_cfg)).await
    }

    /// Starts a scan and waits for the subarray to report SCANNING.

    pub async fn scan(&self, scan: &serde_json::Value) -> Result<()> {
        self.run(Operation::Scan, Some(scan)).await
    }

    /// Ends the running scan and waits for READY.

    pub async fn end_scan(&self) -> Result<()> {
        self.run(Operation::EndScan, None).await
    }

    /// Ends the observation, dropping the configuration; the subarray
    /// keeps its resources and returns to IDLE.

    pub async fn end_observation(&self) -> Result<()> {
        self.run(Operation::End, None).await
    }

    /// Aborts whatever the subarray is doing and waits for ABORTED.

    pub async fn abort_subarray(&self) -> Result<()> {
        self.run(Operation::Abort, None).await
    }

    /// Restarts an aborted or faulted subarray back to EMPTY.

    pub async fn restart_subarray(&self) -> Result<()> {
        self.run(Operation::Restart, None).await
    }

    /// Resets an aborted or faulted subarray back to IDLE, keeping
    /// its resources.

    pub async fn obs_reset(&self) -> Result<()> {
        self.run(Operation::ObsReset, None).await
    }
}
