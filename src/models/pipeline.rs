//! Validation pipelines
//!
//! An entity is validated by running an ordered list of named steps against
//! it. Each step mutates the entity, rejects it, or passes it through; the
//! first rejection ends the run.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::AppError;

#[async_trait]
pub trait Pipeline<T: Send>: Send + Sync {
    type Step: Copy + Debug + Send + Sync;

    /// Apply a single step to the entity.
    async fn apply(&self, step: Self::Step, entity: &mut T) -> Result<(), AppError>;

    /// Run `steps` in order, stopping at the first failure.
    async fn run(&self, entity: &mut T, steps: &[Self::Step]) -> Result<(), AppError> {
        for &step in steps {
            if let Err(err) = self.apply(step, entity).await {
                tracing::debug!(?step, %err, "validation step rejected entity");
                return Err(err);
            }
        }
        Ok(())
    }
}
