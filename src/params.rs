use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::recipe::CellKind;
use crate::types::HashMap;

/// Per-kind preferences consumed by the load balancer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionHint {
    pub cpu_group_size: usize,
    pub gpu_group_size: usize,
    pub prefer_gpu: bool,
}

impl Default for PartitionHint {
    fn default() -> Self {
        Self {
            cpu_group_size: 1,
            gpu_group_size: usize::MAX,
            prefer_gpu: true,
        }
    }
}

pub type PartitionHintMap = HashMap<CellKind, PartitionHint>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalParams {
    /// Worker thread count; `None` asks for one worker per logical core.
    pub num_threads: Option<usize>,
    pub pin_threads: bool,
    /// Assert finite voltage and current after every step.
    pub check_finite: bool,
}

impl Default for TechnicalParams {
    fn default() -> Self {
        Self {
            num_threads: Some(1),
            pin_threads: false,
            check_finite: false,
        }
    }
}

pub fn validate_technical_params(params: &TechnicalParams) -> Result<()> {
    if params.num_threads == Some(0) {
        return Err(SimulationError::InternalInvariant(
            "num_threads must be at least 1".into(),
        ));
    }
    Ok(())
}

pub fn validate_partition_hint(hint: &PartitionHint) -> Result<()> {
    if hint.cpu_group_size == 0 || hint.gpu_group_size == 0 {
        return Err(SimulationError::InternalInvariant(
            "partition hint group sizes must be at least 1".into(),
        ));
    }
    Ok(())
}
