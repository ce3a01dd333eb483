use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::CaptureError;

/// Fixed set of frame buffers shared by all sessions.
///
/// `checkout` blocks while every buffer is out, which is how a slow holder
/// stalls other sessions instead of the source allocating without bound.
pub(crate) struct BufferPool {
    state: Mutex<PoolState>,
    available: Condvar,
    capacity: usize,
}

struct PoolState {
    free: Vec<Vec<u8>>,
    closed: bool,
}

impl BufferPool {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(PoolState {
                free: (0..capacity).map(|_| Vec::new()).collect(),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    pub(crate) fn checkout(&self, timeout: Duration) -> Result<Vec<u8>, CaptureError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;
        loop {
            if state.closed {
                return Err(CaptureError::Closed);
            }
            if let Some(buf) = state.free.pop() {
                return Ok(buf);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CaptureError::Timeout(timeout.as_millis() as u64));
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .map_err(|_| CaptureError::Device("frame pool lock poisoned".to_string()))?;
            state = guard;
        }
    }

    pub(crate) fn checkin(&self, mut buf: Vec<u8>) {
        buf.clear();
        match self.state.lock() {
            Ok(mut state) => {
                if state.free.len() < self.capacity {
                    state.free.push(buf);
                }
            }
            Err(_) => {
                log::error!("frame pool lock poisoned; dropping returned buffer");
                return;
            }
        }
        self.available.notify_one();
    }

    /// Fail every pending and future checkout with `CaptureError::Closed`.
    pub(crate) fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        self.available.notify_all();
    }

    /// Buffers currently held outside the pool.
    pub(crate) fn in_flight(&self) -> usize {
        self.state
            .lock()
            .map(|state| self.capacity - state.free.len())
            .unwrap_or(self.capacity)
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState>, CaptureError> {
        self.state
            .lock()
            .map_err(|_| CaptureError::Device("frame pool lock poisoned".to_string()))
    }
}
