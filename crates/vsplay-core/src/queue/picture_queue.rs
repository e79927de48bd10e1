//! Decoded picture queue
//!
//! Fixed ring of display slots between the video decode thread and the
//! refresh timer:
//!
//! ```text
//!   push() ──▶ [ write_index ] ... [ read_index ] ──▶ peek_ready() / advance()
//!              blocks when full                      never blocks
//! ```
//!
//! Slot buffers belong to the display. When a frame arrives whose size
//! differs from the slot's allocation, the producer hands an
//! [`AllocRequest`] to the control thread and waits until
//! [`PictureQueue::install_surface`] delivers the new buffer. Pixel
//! conversion runs with the lock released; the slot being written is never
//! visible to the consumer until `push` publishes it.

use crate::media::{DecodedFrame, PictureBuffer, PixelConverter};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// The queue was aborted while a producer was waiting
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("picture queue aborted")]
pub struct QueueAborted;

/// Request for the display to (re)allocate one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRequest {
    pub slot: usize,
    pub width: u32,
    pub height: u32,
}

/// One slot of the ring
#[derive(Debug, Default)]
pub struct DecodedPicture {
    pub buffer: PictureBuffer,
    pub width: u32,
    pub height: u32,
    /// Presentation time in seconds
    pub pts: f64,
    pub allocated: bool,
}

struct RingState {
    slots: Vec<DecodedPicture>,
    read_index: usize,
    write_index: usize,
    size: usize,
    aborted: bool,
}

pub struct PictureQueue {
    state: Mutex<RingState>,
    cond: Condvar,
    capacity: usize,
}

impl PictureQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(RingState {
                slots: (0..capacity).map(|_| DecodedPicture::default()).collect(),
                read_index: 0,
                write_index: 0,
                size: 0,
                aborted: false,
            }),
            cond: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, RingState>) -> MutexGuard<'a, RingState> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Convert `frame` into the next free slot and publish it with `pts`
    ///
    /// Blocks while the ring is full. `request_alloc` is called (with no
    /// lock held) when the slot needs a buffer of a different size.
    pub fn push<F>(
        &self,
        frame: &DecodedFrame,
        pts: f64,
        converter: &mut dyn PixelConverter,
        request_alloc: F,
    ) -> Result<(), QueueAborted>
    where
        F: FnOnce(AllocRequest),
    {
        let mut state = self.lock();
        while state.size >= self.capacity && !state.aborted {
            state = self.wait(state);
        }
        if state.aborted {
            return Err(QueueAborted);
        }

        let index = state.write_index;
        let slot = &mut state.slots[index];
        if !slot.allocated || slot.width != frame.width || slot.height != frame.height {
            slot.allocated = false;
            drop(state);

            request_alloc(AllocRequest {
                slot: index,
                width: frame.width,
                height: frame.height,
            });

            state = self.lock();
            while !state.slots[index].allocated && !state.aborted {
                state = self.wait(state);
            }
            if state.aborted {
                return Err(QueueAborted);
            }
        }

        let mut buffer = std::mem::take(&mut state.slots[index].buffer);
        drop(state);
        converter.convert(frame, &mut buffer);

        let mut state = self.lock();
        let slot = &mut state.slots[index];
        slot.buffer = buffer;
        slot.pts = pts;
        state.write_index = (index + 1) % self.capacity;
        state.size += 1;
        drop(state);
        self.cond.notify_one();
        Ok(())
    }

    /// Deliver the display's buffer for a pending [`AllocRequest`]
    pub fn install_surface(&self, request: AllocRequest, buffer: PictureBuffer) {
        let mut state = self.lock();
        if let Some(slot) = state.slots.get_mut(request.slot) {
            slot.buffer = buffer;
            slot.width = request.width;
            slot.height = request.height;
            slot.allocated = true;
        }
        drop(state);
        self.cond.notify_all();
    }

    /// Presentation time of the next picture to show
    pub fn peek_pts(&self) -> Option<f64> {
        let state = self.lock();
        (state.size > 0).then(|| state.slots[state.read_index].pts)
    }

    /// Run `f` on the next picture without removing it
    pub fn peek_ready<R>(&self, f: impl FnOnce(&DecodedPicture) -> R) -> Option<R> {
        let state = self.lock();
        if state.size == 0 {
            return None;
        }
        Some(f(&state.slots[state.read_index]))
    }

    /// Release the displayed picture and wake a waiting producer
    pub fn advance(&self) {
        let mut state = self.lock();
        if state.size == 0 {
            return;
        }
        state.read_index = (state.read_index + 1) % self.capacity;
        state.size -= 1;
        drop(state);
        self.cond.notify_one();
    }

    /// Wake every waiter; later pushes fail with [`QueueAborted`]
    pub fn abort(&self) {
        self.lock().aborted = true;
        self.cond.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
