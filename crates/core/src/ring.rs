//! Bounded single-producer/single-consumer ring buffer (spec.md §4.5, C5)
//! decoupling the receiver's network thread from its disk thread.
//!
//! Each slot holds one full datagram (`header + block_size` bytes). The
//! producer writes block number 0 as an end-of-stream sentinel; `pop`
//! surfaces it to the consumer like any other slot.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct Shared {
    slot_size: usize,
    capacity: usize,
    slots: Mutex<State>,
    data_ready: Condvar,
    space_ready: Condvar,
}

struct State {
    datagrams: Vec<u8>,
    base_data: usize,
    count_data: usize,
    count_reserved: usize,
}

impl State {
    fn slot_index(&self, offset: usize, slot_size: usize, capacity: usize) -> std::ops::Range<usize> {
        let slot = (self.base_data + offset) % capacity;
        slot * slot_size..(slot + 1) * slot_size
    }
}

/// A reservation returned by [`RingBuffer::reserve`]; the producer writes
/// into `slot` and must call [`RingBuffer::confirm`] or
/// [`RingBuffer::cancel`] exactly once per reservation.
pub struct Reservation<'a> {
    ring: &'a RingBuffer,
}

#[derive(Clone)]
pub struct RingBuffer {
    shared: Arc<Shared>,
}

impl RingBuffer {
    pub fn new(capacity: usize, slot_size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot_size,
                capacity,
                slots: Mutex::new(State {
                    datagrams: vec![0u8; capacity * slot_size],
                    base_data: 0,
                    count_data: 0,
                    count_reserved: 0,
                }),
                data_ready: Condvar::new(),
                space_ready: Condvar::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn slot_size(&self) -> usize {
        self.shared.slot_size
    }

    /// Current occupancy, for the ring-fill term of the error-rate formula
    /// (spec.md §4.10).
    pub fn len(&self) -> usize {
        self.shared.slots.lock().count_data
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until a slot is free, reserves it, and returns a handle the
    /// caller writes `slot_size` bytes into before calling `confirm`.
    pub fn reserve(&self) -> Reservation<'_> {
        let mut state = self.shared.slots.lock();
        while state.count_data + state.count_reserved >= self.shared.capacity {
            self.shared.space_ready.wait(&mut state);
        }

        state.count_reserved = 1;
        Reservation { ring: self }
    }

    /// Writes `datagram` into the reserved slot and confirms it, signalling
    /// the consumer. `datagram.len()` must equal `slot_size()`.
    pub fn write_and_confirm(&self, reservation: Reservation<'_>, datagram: &[u8]) {
        debug_assert_eq!(datagram.len(), self.shared.slot_size);

        let mut state = self.shared.slots.lock();
        let range = state.slot_index(state.count_data, self.shared.slot_size, self.shared.capacity);
        state.datagrams[range].copy_from_slice(datagram);
        state.count_data += 1;
        state.count_reserved = 0;
        drop(state);
        drop(reservation);

        self.shared.data_ready.notify_one();
    }

    fn cancel(&self, _reservation: Reservation<'_>) {
        let mut state = self.shared.slots.lock();
        state.count_reserved = 0;
        drop(state);

        self.shared.space_ready.notify_one();
    }

    /// Blocks until a datagram is available and returns a copy of the head
    /// slot, leaving it in place until [`RingBuffer::pop`].
    pub fn peek(&self) -> Vec<u8> {
        let mut state = self.shared.slots.lock();
        while state.count_data == 0 {
            self.shared.data_ready.wait(&mut state);
        }

        let range = state.slot_index(0, self.shared.slot_size, self.shared.capacity);
        state.datagrams[range].to_vec()
    }

    /// Drops the head slot and wakes any producer blocked on `reserve`.
    pub fn pop(&self) {
        let mut state = self.shared.slots.lock();
        debug_assert!(state.count_data > 0);
        state.count_data -= 1;
        state.base_data = (state.base_data + 1) % self.shared.capacity;
        drop(state);

        self.shared.space_ready.notify_one();
    }
}

impl Reservation<'_> {
    pub fn cancel(self) {
        let ring = self.ring;
        ring.cancel(self);
    }
}
