use std::sync::Arc;
use tmc_api::{device, Result};

use crate::config::Layout;
use crate::pool::{Pool, Proxy};
use crate::sync::{Operation, SyncGuard};

/// Façade over the central node. Telescope-wide operations and
/// resource management are issued here; the central node fans them
/// out to the subsystems.

pub struct CentralNode {
    proxy: Proxy,
    guard: SyncGuard,
}

impl CentralNode {
    pub async fn create(pool: &Pool, layout: &Arc<Layout>) -> Result<Self> {
        let proxy = pool.proxy(layout.central_node()).await?;

        Ok(CentralNode {
            proxy,
            guard: SyncGuard::new(
                pool.clone(),
                layout.clone(),
                layout.default_timeout(),
            ),
        })
    }

    // Issues `op`'s command on the central node, with no argument,
    // under the guard.

    async fn simple(&self, op: Operation, subarray: Option<usize>) -> Result<()> {
        self.guard
            .run(op, subarray, async {
                self.proxy.command(op.command(), None).await.map(|_| ())
            })
            .await
    }

    /// Turns the telescope on and waits for the array to report it.

    pub async fn move_to_on(&self) -> Result<()> {
        self.simple(Operation::TelescopeOn, None).await
    }

    /// Turns the telescope off.

    pub async fn move_to_off(&self) -> Result<()> {
        self.simple(Operation::TelescopeOff, None).await
    }

    /// Puts the telescope in standby.

    pub async fn set_standby(&self) -> Result<()> {
        self.simple(Operation::TelescopeStandby, None).await
    }

    /// Assigns resources to a subarray. `resources` is the assignment
    /// document the control system expects; the harness passes it
    /// through untouched.

    pub async fn store_resources(
        &self,
        subarray: usize,
        resources: &serde_json::Value,
    ) -> Result<()> {
        let arg = device::Value::from(resources.to_string());

        self.guard
            .run(Operation::AssignResources, Some(subarray), async {
                self.proxy
                    .command(Operation::AssignResources.command(), Some(arg))
                    .await
                    .map(|_| ())
            })
            .await
    }

    /// Releases a subarray's resources.

    pub async fn release_resources(
        &self,
        subarray: usize,
        release: &serde_json::Value,
    ) -> Result<()> {
        let arg = device::Value::from(release.to_string());

        self.guard
            .run(Operation::ReleaseResources, Some(subarray), async {
                self.proxy
                    .command(Operation::ReleaseResources.command(), Some(arg))
                    .await
                    .map(|_| ())
            })
            .await
    }
}
