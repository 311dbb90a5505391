//! Destructive sum of estimator moments onto one rank.

use mc_core::{Communicator, Error, Result};

use crate::estimator::Estimator;

/// Collective reduction of estimator state across a process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistributedReducer;

impl DistributedReducer {
    /// Sum every moment cell and dropped-event count of `estimators` onto
    /// `root` and reset the others.
    ///
    /// Collective: every rank must call this with the same estimators (same
    /// ids, shapes and order) and the same `root`. A group of one is a no-op.
    pub fn reduce(estimators: &[&Estimator], comm: &dyn Communicator, root: usize) -> Result<()> {
        let size = comm.size();
        if root >= size {
            return Err(Error::Validation(format!("root rank {root} outside group of size {size}")));
        }
        if size == 1 {
            return Ok(());
        }

        let mut flat = Vec::with_capacity(estimators.iter().map(|e| e.flat_len()).sum());
        for est in estimators {
            flat.extend(est.moments_to_flat());
        }

        let outcome = match comm.sum_to_root(&flat, root) {
            Ok(Some(summed)) => Self::store_sums(estimators, &summed),
            Ok(None) => {
                estimators.iter().for_each(|est| est.reset_data());
                Ok(())
            }
            Err(e) => Err(e),
        };
        // Peers wait here for the root even when the root failed to unpack.
        comm.barrier()?;
        if outcome.is_ok() && comm.is_root(root) {
            let n = estimators.len();
            log::info!("reduced {n} estimator(s) from {size} ranks onto rank {root}");
        }
        outcome
    }

    fn store_sums(estimators: &[&Estimator], summed: &[f64]) -> Result<()> {
        let mut offset = 0;
        for est in estimators {
            let len = est.flat_len();
            let Some(block) = summed.get(offset..offset + len) else {
                return Err(Error::Communication("reduced buffer shorter than local state".into()));
            };
            est.store_flat_moments(block)?;
            offset += len;
        }
        Ok(())
    }
}
