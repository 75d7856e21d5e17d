//! Memory configuration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    Device, DynamicMemoryController, PoolMemoryController, Result, SharedController, TsError,
};

/// Which controller a [`MemoryConfig`] builds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocPolicy {
    #[default]
    Dynamic,
    Pool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub policy: AllocPolicy,
    #[serde(default)]
    pub device: Device,
    /// Dynamic: cap on live bytes. Pool: cap on live plus cached bytes.
    #[serde(default)]
    pub limit_bytes: Option<usize>,
}

impl MemoryConfig {
    /// Unbounded dynamic allocation on the host.
    pub fn host() -> Self {
        Self::default()
    }

    pub fn pooled(device: Device, limit_bytes: Option<usize>) -> Self {
        Self {
            policy: AllocPolicy::Pool,
            device,
            limit_bytes,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| TsError::Config(e.to_string()))
    }

    pub fn build(&self) -> SharedController {
        match self.policy {
            AllocPolicy::Dynamic => Arc::new(DynamicMemoryController::with_limit(
                self.device,
                self.limit_bytes,
            )),
            AllocPolicy::Pool => Arc::new(PoolMemoryController::with_limit(
                self.device,
                self.limit_bytes,
            )),
        }
    }
}
