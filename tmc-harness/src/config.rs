//! Describes the deployment the harness runs against: which device
//! names make up the telescope under test, and the default timing
//! parameters. Loaded from a TOML document; tests usually use
//! `Layout::default()`.

use serde_derive::Deserialize;
use tmc_api::{device, Error, Result};
use tokio::time::Duration;
use tracing::Level;

const DEF_TIMEOUT_MS: u64 = 30_000;
const DEF_TRACER_CAPACITY: usize = 1024;

fn def_timeout_ms() -> u64 {
    DEF_TIMEOUT_MS
}

fn def_tracer_capacity() -> usize {
    DEF_TRACER_CAPACITY
}

/// The devices of one subarray: the subarray node itself and the
/// CSP/SDP subarray leaf nodes whose observation states it
/// aggregates. Synchronization waits on all three.

#[derive(Deserialize, Debug, Clone)]
pub struct Subarray {
    pub id: usize,
    pub node: device::Name,
    pub csp_leaf: device::Name,
    pub sdp_leaf: device::Name,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Layout {
    log_level: Option<String>,
    central_node: device::Name,
    #[serde(default = "def_timeout_ms")]
    default_timeout_ms: u64,
    #[serde(default = "def_tracer_capacity")]
    tracer_capacity: usize,
    pub subarray: Vec<Subarray>,
    #[serde(default)]
    pub dish: Vec<device::Name>,
}

impl Layout {
    /// Parses a layout from the contents of a TOML document.

    pub fn parse(contents: &str) -> Result<Layout> {
        toml::from_str(contents)
            .map_err(|e| Error::ConfigError(format!("{}", e)))
    }

    pub fn get_log_level(&self) -> Level {
        let v = self.log_level.as_deref().unwrap_or("warn");

        match v {
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::WARN,
        }
    }

    pub fn central_node(&self) -> &device::Name {
        &self.central_node
    }

    /// Looks up a subarray by its id.

    pub fn subarray(&self, id: usize) -> Result<&Subarray> {
        self.subarray
            .iter()
            .find(|sa| sa.id == id)
            .ok_or_else(|| {
                Error::ConfigError(format!(
                    "subarray {} is not in the layout",
                    id
                ))
            })
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn tracer_capacity(&self) -> usize {
        self.tracer_capacity
    }
}

// The default layout matches the mid deployment the integration suite
// normally targets: one subarray and two dish masters.

impl Default for Layout {
    fn default() -> Self {
        Layout {
            log_level: None,
            central_node: "mid/tm_central/central_node".parse().unwrap(),
            default_timeout_ms: DEF_TIMEOUT_MS,
            tracer_capacity: DEF_TRACER_CAPACITY,
            subarray: vec![Subarray {
                id: 1,
                node: "mid/tm_subarray_node/1".parse().unwrap(),
                csp_leaf: "mid/tm_leaf_node/csp_subarray01".parse().unwrap(),
                sdp_leaf: "mid/tm_leaf_node/sdp_subarray01".parse().unwrap(),
            }],
            dish: vec![
                "mid/dish_master/0001".parse().unwrap(),
                "mid/dish_master/0002".parse().unwrap(),
            ],
        }
    }
}
