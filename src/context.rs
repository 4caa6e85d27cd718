use std::sync::Arc;

use crate::distributed::{DistributedContext, LocalContext};
use crate::error::Result;
use crate::params::TechnicalParams;
use crate::threading::TaskPool;

/// The hardware resources a simulation runs on: the worker pool, the
/// distributed transport, and whether an accelerator is present.
#[derive(Clone)]
pub struct Context {
    pub pool: Arc<TaskPool>,
    pub distributed: Arc<dyn DistributedContext>,
    pub has_gpu: bool,
    /// Assert finite voltage and current after every integrator step.
    pub check_finite: bool,
}

impl Context {
    /// Single-rank context on the local machine.
    pub fn local(params: &TechnicalParams) -> Result<Self> {
        Self::with_distributed(params, Arc::new(LocalContext))
    }

    pub fn with_distributed(
        params: &TechnicalParams,
        distributed: Arc<dyn DistributedContext>,
    ) -> Result<Self> {
        Ok(Self {
            pool: Arc::new(TaskPool::new(params)?),
            distributed,
            has_gpu: false,
            check_finite: params.check_finite,
        })
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("threads", &self.pool.num_threads())
            .field("distributed", &self.distributed.name())
            .field("has_gpu", &self.has_gpu)
            .finish()
    }
}
