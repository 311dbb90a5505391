//! In-process [`Communicator`] implementations.
//!
//! [`SerialCommunicator`] is the single-process group. [`LocalGroup`] hands out
//! one [`LocalCommunicator`] per simulated process; each must be driven from
//! its own thread (e.g. inside `std::thread::scope`), exactly like ranks of a
//! real distributed group.

use std::sync::{Arc, Barrier, Mutex};

use mc_core::{Communicator, Error, Result};

/// A group of one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn gather_bytes(&self, payload: Vec<u8>, root: usize) -> Result<Option<Vec<Vec<u8>>>> {
        check_root(root, 1)?;
        Ok(Some(vec![payload]))
    }
}

fn check_root(root: usize, size: usize) -> Result<()> {
    if root >= size {
        return Err(Error::Validation(format!("root rank {root} outside group of size {size}")));
    }
    Ok(())
}

#[derive(Debug)]
struct Shared {
    slots: Mutex<Vec<Option<Vec<u8>>>>,
    barrier_upload: Barrier,
    barrier_collected: Barrier,
}

/// Factory for the ranks of an in-process group.
#[derive(Debug)]
pub struct LocalGroup;

impl LocalGroup {
    /// One communicator per rank, `size` ranks (at least one).
    pub fn new(size: usize) -> Result<Vec<LocalCommunicator>> {
        if size == 0 {
            return Err(Error::Validation("local group needs at least one rank".into()));
        }
        let shared = Arc::new(Shared {
            slots: Mutex::new(vec![None; size]),
            barrier_upload: Barrier::new(size),
            barrier_collected: Barrier::new(size),
        });
        Ok((0..size)
            .map(|rank| LocalCommunicator { rank, size, shared: Arc::clone(&shared) })
            .collect())
    }
}

/// One rank of a [`LocalGroup`].
#[derive(Debug, Clone)]
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) -> Result<()> {
        self.shared.barrier_upload.wait();
        Ok(())
    }

    fn gather_bytes(&self, payload: Vec<u8>, root: usize) -> Result<Option<Vec<Vec<u8>>>> {
        // Every rank validates the same root, so either all return here or none.
        check_root(root, self.size)?;

        self.shared.slots.lock().expect("slot mutex poisoned")[self.rank] = Some(payload);
        self.shared.barrier_upload.wait();

        let gathered = if self.rank == root {
            let mut slots = self.shared.slots.lock().expect("slot mutex poisoned");
            let taken: Vec<Option<Vec<u8>>> = slots.iter_mut().map(Option::take).collect();
            Some(taken)
        } else {
            None
        };

        // Slots must be drained before any rank posts the next payload.
        self.shared.barrier_collected.wait();

        let Some(taken) = gathered else {
            return Ok(None);
        };
        taken
            .into_iter()
            .enumerate()
            .map(|(rank, slot)| {
                slot.ok_or_else(|| Error::Communication(format!("rank {rank} posted no payload")))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}
