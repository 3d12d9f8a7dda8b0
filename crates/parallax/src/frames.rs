//! Bounded pool of uniform slots shared between the CPU and the GPU.
//!
//! A frame must hold a [`SlotLease`] while its uniform slot may still be read by the GPU. The
//! lease is handed to the submission-complete callback, which drops it and thereby returns the
//! slot. At most `capacity` leases exist at any time.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::RenderError;

#[derive(Debug)]
struct PoolState {
    free: VecDeque<usize>,
    in_flight: usize,
    closed: bool,
    frames_issued: u64,
}

/// Counting gate over `capacity` slot indices.
#[derive(Debug)]
pub struct FramePool {
    capacity: usize,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl FramePool {
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            capacity,
            state: Mutex::new(PoolState {
                free: (0..capacity).collect(),
                in_flight: 0,
                closed: false,
                frames_issued: 0,
            }),
            available: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Blocks until a slot is free. Fails with [`RenderError::PoolClosed`] once the pool closes,
    /// including for callers that were already waiting.
    pub fn acquire(self: &Arc<Self>) -> Result<SlotLease, RenderError> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(RenderError::PoolClosed);
            }
            if let Some(lease) = self.take(&mut state) {
                return Ok(lease);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`FramePool::acquire`] but gives up after `timeout`, returning `Ok(None)`.
    pub fn acquire_timeout(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> Result<Option<SlotLease>, RenderError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(RenderError::PoolClosed);
            }
            if let Some(lease) = self.take(&mut state) {
                return Ok(Some(lease));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (next, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Result<Option<SlotLease>, RenderError> {
        let mut state = self.lock();
        if state.closed {
            return Err(RenderError::PoolClosed);
        }
        Ok(self.take(&mut state))
    }

    /// Marks the pool closed and wakes every waiter. Outstanding leases still release normally.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            tracing::debug!(in_flight = state.in_flight, "frame pool closed");
        }
        drop(state);
        self.available.notify_all();
    }

    fn take(self: &Arc<Self>, state: &mut PoolState) -> Option<SlotLease> {
        let index = state.free.pop_front()?;
        state.in_flight += 1;
        state.frames_issued += 1;
        Some(SlotLease {
            pool: Arc::clone(self),
            index,
            frame: state.frames_issued,
        })
    }

    fn release(&self, index: usize) {
        let mut state = self.lock();
        debug_assert!(state.in_flight > 0, "released more slots than were leased");
        state.in_flight = state.in_flight.saturating_sub(1);
        state.free.push_back(index);
        drop(state);
        self.available.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive claim on one uniform slot. Dropping the lease returns the slot to the pool.
#[derive(Debug)]
pub struct SlotLease {
    pool: Arc<FramePool>,
    index: usize,
    frame: u64,
}

impl SlotLease {
    /// Slot index in `0..capacity`, used to select the uniform buffer offset.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Monotonic sequence number of the frame that acquired this lease.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Leases currently outstanding in the owning pool, this one included.
    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}
