//! Core traits for mctally
//!
//! The distributed reduction does not depend on a concrete transport (MPI,
//! sockets, in-process threads). Hosts supply a [`Communicator`] and the tally
//! layer only talks to this seam.

use crate::Result;

/// Collective-communication abstraction over a rank-addressed process group.
///
/// Every method is collective: all ranks of the group must call it with the
/// same `root`, otherwise a barrier-like transport deadlocks.
pub trait Communicator: Send + Sync {
    /// Rank of the calling process (0-based).
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Block until every rank has reached the barrier.
    fn barrier(&self) -> Result<()>;

    /// Gather one opaque payload per rank onto `root`.
    ///
    /// Returns `Some(payloads)` ordered by rank on `root`, `None` elsewhere.
    fn gather_bytes(&self, payload: Vec<u8>, root: usize) -> Result<Option<Vec<Vec<u8>>>>;

    /// Element-wise sum of `values` across all ranks, landing on `root`.
    ///
    /// Every rank must pass a slice of the same length. Summation happens in
    /// rank order on `root`.
    fn sum_to_root(&self, values: &[f64], root: usize) -> Result<Option<Vec<f64>>> {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let Some(gathered) = self.gather_bytes(payload, root)? else {
            return Ok(None);
        };
        let mut total = vec![0.0f64; values.len()];
        for (rank, bytes) in gathered.iter().enumerate() {
            if bytes.len() != values.len() * 8 {
                return Err(crate::Error::Communication(format!(
                    "rank {rank} sent {} values, root expected {}",
                    bytes.len() / 8,
                    values.len()
                )));
            }
            for (acc, chunk) in total.iter_mut().zip(bytes.chunks_exact(8)) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                *acc += f64::from_le_bytes(raw);
            }
        }
        Ok(Some(total))
    }

    /// True if the calling process is `root`.
    fn is_root(&self, root: usize) -> bool {
        self.rank() == root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pretends to be rank 0 of a two-rank group whose peer mirrors the payload.
    struct MirrorComm;

    impl Communicator for MirrorComm {
        fn rank(&self) -> usize {
            0
        }

        fn size(&self) -> usize {
            2
        }

        fn barrier(&self) -> Result<()> {
            Ok(())
        }

        fn gather_bytes(&self, payload: Vec<u8>, root: usize) -> Result<Option<Vec<Vec<u8>>>> {
            if root != 0 {
                return Ok(None);
            }
            Ok(Some(vec![payload.clone(), payload]))
        }
    }

    #[test]
    fn test_default_sum_to_root() {
        let comm = MirrorComm;
        let sum = comm.sum_to_root(&[1.0, 2.5], 0).unwrap().unwrap();
        assert_eq!(sum, vec![2.0, 5.0]);
        assert!(comm.sum_to_root(&[1.0], 1).unwrap().is_none());
        assert!(comm.is_root(0));
    }
}
