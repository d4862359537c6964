//! Process-group abstraction used by every collective operation.
//!
//! A process group is a fixed set of ranks `0..size`. Collective calls
//! (`barrier`, `exchange`, `all_reduce_sum`) must be invoked by every rank of
//! the group, in the same order, from exactly one thread per rank. A rank that
//! skips a collective call while its peers make it blocks the whole group.
//!
//! Two implementations are provided:
//! - [`SingleProcess`] -- a group of one, used for serial runs.
//! - [`ThreadComm`] -- ranks are threads of the current process sharing a
//!   mailbox matrix guarded by barriers (see [`local_group`]).

use std::sync::{Arc, Barrier, Mutex};

use bytemuck::Pod;

use crate::error::{CommError, CommResult};

/// Collective communication across the ranks of a process group.
pub trait Communicator: Send + Sync {
    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// This process's rank, in `0..size()`.
    fn rank(&self) -> usize;

    /// Block until every rank of the group has reached the barrier.
    ///
    /// Collective: all ranks must call it.
    fn barrier(&self) -> CommResult<()>;

    /// All-to-all byte exchange.
    ///
    /// `outgoing[r]` is delivered to rank `r` (including this rank). Returns
    /// `incoming` where `incoming[r]` is what rank `r` sent to this rank.
    ///
    /// Collective: all ranks must call it.
    fn exchange(&self, outgoing: Vec<Vec<u8>>) -> CommResult<Vec<Vec<u8>>>;

    /// Sum `value` across all ranks; every rank receives the total.
    ///
    /// Collective: all ranks must call it.
    fn all_reduce_sum(&self, value: u64) -> CommResult<u64>;
}

/// A process group of exactly one rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn barrier(&self) -> CommResult<()> {
        Ok(())
    }

    fn exchange(&self, outgoing: Vec<Vec<u8>>) -> CommResult<Vec<Vec<u8>>> {
        if outgoing.len() != 1 {
            return Err(CommError::BufferCountMismatch {
                expected: 1,
                actual: outgoing.len(),
            });
        }
        Ok(outgoing)
    }

    fn all_reduce_sum(&self, value: u64) -> CommResult<u64> {
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Thread-backed process group
// ---------------------------------------------------------------------------

struct GroupState {
    size: usize,
    barrier: Barrier,
    /// `mailboxes[dest][src]`: message from `src` waiting for `dest`.
    mailboxes: Vec<Mutex<Vec<Option<Vec<u8>>>>>,
    /// One reduction slot per rank.
    reduce_slots: Mutex<Vec<u64>>,
}

/// One rank of an in-process thread group.
///
/// Each handle is moved into its own thread; the handles of a group share
/// mailbox state and synchronize through a [`Barrier`].
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    state: Arc<GroupState>,
}

/// Create a thread-backed process group of `size` ranks.
///
/// Returns one [`ThreadComm`] per rank, ordered by rank.
pub fn local_group(size: usize) -> Vec<ThreadComm> {
    assert!(size > 0, "process group needs at least one rank");
    let state = Arc::new(GroupState {
        size,
        barrier: Barrier::new(size),
        mailboxes: (0..size).map(|_| Mutex::new(vec![None; size])).collect(),
        reduce_slots: Mutex::new(vec![0; size]),
    });
    (0..size)
        .map(|rank| ThreadComm {
            rank,
            state: Arc::clone(&state),
        })
        .collect()
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.state.size)
            .finish()
    }
}

impl Communicator for ThreadComm {
    fn size(&self) -> usize {
        self.state.size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn barrier(&self) -> CommResult<()> {
        self.state.barrier.wait();
        Ok(())
    }

    fn exchange(&self, outgoing: Vec<Vec<u8>>) -> CommResult<Vec<Vec<u8>>> {
        let size = self.state.size;
        let count_error = (outgoing.len() != size).then_some(CommError::BufferCountMismatch {
            expected: size,
            actual: outgoing.len(),
        });

        // Deposit even on a bad buffer count so peers are not left waiting
        // on the barrier.
        let mut deposit_error = None;
        for (dest, buf) in outgoing.into_iter().enumerate().take(size) {
            match self.state.mailboxes[dest].lock() {
                Ok(mut inbox) => inbox[self.rank] = Some(buf),
                Err(_) => deposit_error = Some(CommError::Poisoned),
            }
        }
        self.state.barrier.wait();

        let received = match self.state.mailboxes[self.rank].lock() {
            Ok(mut inbox) => inbox
                .iter_mut()
                .enumerate()
                .map(|(from, slot)| {
                    slot.take().ok_or(CommError::MissingMessage {
                        rank: self.rank,
                        from,
                    })
                })
                .collect::<CommResult<Vec<_>>>(),
            Err(_) => Err(CommError::Poisoned),
        };
        // Nobody may deposit the next round before everyone has drained.
        self.state.barrier.wait();

        if let Some(err) = count_error.or(deposit_error) {
            return Err(err);
        }
        received
    }

    fn all_reduce_sum(&self, value: u64) -> CommResult<u64> {
        let stored = match self.state.reduce_slots.lock() {
            Ok(mut slots) => {
                slots[self.rank] = value;
                Ok(())
            }
            Err(_) => Err(CommError::Poisoned),
        };
        self.state.barrier.wait();

        let total = match self.state.reduce_slots.lock() {
            Ok(slots) => Ok(slots.iter().sum()),
            Err(_) => Err(CommError::Poisoned),
        };
        self.state.barrier.wait();

        stored?;
        total
    }
}

// ---------------------------------------------------------------------------
// Typed helpers
// ---------------------------------------------------------------------------

/// All-to-all exchange of plain-old-data records.
///
/// `outgoing[r]` is sent to rank `r`. After the exchange the group checks that
/// the total number of records sent equals the total received.
///
/// Collective: all ranks must call it.
pub fn exchange_records<T: Pod>(
    comm: &dyn Communicator,
    outgoing: &[Vec<T>],
) -> CommResult<Vec<Vec<T>>> {
    let sent: usize = outgoing.iter().map(Vec::len).sum();
    let buffers = outgoing
        .iter()
        .map(|records| bytemuck::cast_slice::<T, u8>(records).to_vec())
        .collect();
    let incoming = comm.exchange(buffers)?;

    let record_size = std::mem::size_of::<T>();
    let mut decoded = Vec::with_capacity(incoming.len());
    let mut malformed = None;
    for (from, bytes) in incoming.iter().enumerate() {
        if record_size == 0 || bytes.len() % record_size != 0 {
            malformed.get_or_insert(CommError::MalformedPayload {
                from,
                len: bytes.len(),
            });
            decoded.push(Vec::new());
            continue;
        }
        decoded.push(bytemuck::pod_collect_to_vec::<u8, T>(bytes));
    }
    let received: usize = decoded.iter().map(Vec::len).sum();

    // Both reductions run regardless of local failures to keep ranks in step.
    let total_sent = comm.all_reduce_sum(sent as u64)?;
    let total_received = comm.all_reduce_sum(received as u64)?;
    if let Some(err) = malformed {
        return Err(err);
    }
    if total_sent != total_received {
        return Err(CommError::Disagreement {
            quantity: "records exchanged",
            expected: total_sent,
            actual: total_received,
        });
    }
    Ok(decoded)
}
