// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Thread-confined pool of reusable byte buffers.

use spoolwire_core::error::{Result, SpoolwireError};

/// Buffers kept for reuse; anything returned beyond this is freed.
pub const MAX_POOLED: usize = 8;

/// Free list of scratch buffers owned by one session.
///
/// Lives inside the session context, so it is only ever touched by the
/// owning thread and needs no locking.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Vec<Vec<u8>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty buffer with at least `min_capacity` bytes of capacity.
    ///
    /// Reuses the smallest pooled buffer that is large enough.
    pub fn take(&mut self, min_capacity: usize) -> Result<Vec<u8>> {
        let best = self
            .free
            .iter()
            .enumerate()
            .filter(|(_, buf)| buf.capacity() >= min_capacity)
            .min_by_key(|(_, buf)| buf.capacity())
            .map(|(index, _)| index);

        if let Some(index) = best {
            return Ok(self.free.swap_remove(index));
        }

        let mut buf = self.free.pop().unwrap_or_default();
        buf.try_reserve(min_capacity).map_err(|e| {
            SpoolwireError::Allocation(format!("{min_capacity}-byte buffer: {e}"))
        })?;
        Ok(buf)
    }

    /// Return a buffer to the pool.
    pub fn give(&mut self, mut buf: Vec<u8>) {
        if self.free.len() >= MAX_POOLED {
            return;
        }
        buf.clear();
        self.free.push(buf);
    }

    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    /// Free every pooled buffer.
    pub fn clear(&mut self) {
        self.free.clear();
        self.free.shrink_to_fit();
    }
}
