//! Fixed-capacity, append-bounded sample store.
//!
//! Despite the name this buffer never wraps around: `push` fills it up to
//! capacity and hands back whatever did not fit. Older data is only
//! discarded when the owner rewrites storage in place and adjusts the
//! logical length with [`RingBuffer::set_length`] (the capture session's
//! pre-roll window does exactly that).
//!
//! Storage is allocated once. Only `storage[..len]` is meaningful; anything
//! past it is residue from earlier writes.

use tokio::sync::broadcast;

use crate::ipc::events::BufferEvent;

/// Buffered notifications per subscriber before it starts lagging.
const EVENT_CAP: usize = 256;

pub struct RingBuffer<T> {
    storage: Vec<T>,
    len: usize,
    events: broadcast::Sender<BufferEvent>,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Allocate a buffer holding at most `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        Self::from_storage(vec![T::default(); capacity])
    }
}

impl<T: Copy> RingBuffer<T> {
    /// Wrap pre-allocated storage. Capacity is `storage.len()`; the logical
    /// length starts at zero.
    pub fn from_storage(storage: Vec<T>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAP);
        Self {
            storage,
            len: 0,
            events,
        }
    }

    /// Append as much of `chunk` as fits and return the rest.
    ///
    /// Emits `DataChanged` for the written range, followed by `Full` when this
    /// call brought the buffer to capacity. Nothing is emitted when no element
    /// was written.
    pub fn push<'a>(&mut self, chunk: &'a [T]) -> &'a [T] {
        let take = chunk.len().min(self.remaining());
        let (fits, overflow) = chunk.split_at(take);
        if fits.is_empty() {
            return overflow;
        }

        let start = self.len;
        let end = start + fits.len();
        self.storage[start..end].copy_from_slice(fits);
        self.len = end;

        self.emit(BufferEvent::DataChanged { start, end });
        if end == self.capacity() {
            self.emit(BufferEvent::Full);
        }
        overflow
    }

    /// Move the logical length, clamped to `[0, capacity]`.
    ///
    /// Emits `LengthChanged` when the length actually changes, then `Empty`
    /// or `Full` if it landed on either bound.
    pub fn set_length(&mut self, length: usize) {
        let length = length.min(self.capacity());
        if length == self.len {
            return;
        }
        let previous = self.len;
        self.len = length;

        self.emit(BufferEvent::LengthChanged { length, previous });
        if length == 0 {
            self.emit(BufferEvent::Empty);
        } else if length == self.capacity() {
            self.emit(BufferEvent::Full);
        }
    }

    pub fn clear(&mut self) {
        self.set_length(0);
    }

    /// Publish a `DataChanged` notification for an in-place rewrite of
    /// `[start, end)`.
    pub fn notify_data(&self, start: usize, end: usize) {
        let end = end.min(self.len);
        if start < end {
            self.emit(BufferEvent::DataChanged { start, end });
        }
    }

    /// The valid samples.
    pub fn data(&self) -> &[T] {
        &self.storage[..self.len]
    }

    /// The whole backing storage, including stale data past `len()`.
    pub fn storage(&self) -> &[T] {
        &self.storage
    }

    /// Mutable backing storage for in-place rewrites. Callers must follow up
    /// with `set_length` / `notify_data`.
    pub(crate) fn storage_mut(&mut self) -> &mut [T] {
        &mut self.storage
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: BufferEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.len)
            .field("capacity", &self.storage.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn drain(rx: &mut broadcast::Receiver<BufferEvent>) -> Vec<BufferEvent> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(ev) => out.push(ev),
                Err(TryRecvError::Empty) => return out,
                Err(e) => panic!("unexpected receive error: {e:?}"),
            }
        }
    }

    #[test]
    fn push_returns_overflow_and_writes_prefix() {
        let mut buf = RingBuffer::<i16>::new(5);
        assert!(buf.push(&[1, 2, 3]).is_empty());

        let overflow = buf.push(&[4, 5, 6, 7]);
        assert_eq!(overflow, &[6, 7]);
        assert_eq!(buf.data(), &[1, 2, 3, 4, 5]);
        assert!(buf.is_full());

        assert_eq!(buf.push(&[8]), &[8]);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn push_emits_data_changed_then_full_once() {
        let mut buf = RingBuffer::<f32>::new(4);
        let mut rx = buf.subscribe();

        buf.push(&[0.1, 0.2]);
        buf.push(&[0.3, 0.4, 0.5]);
        buf.push(&[0.6]);
        buf.push(&[]);

        assert_eq!(
            drain(&mut rx),
            vec![
                BufferEvent::DataChanged { start: 0, end: 2 },
                BufferEvent::DataChanged { start: 2, end: 4 },
                BufferEvent::Full,
            ]
        );
    }

    #[test]
    fn set_length_clamps_and_reports_bounds() {
        let mut buf = RingBuffer::<u8>::new(3);
        let mut rx = buf.subscribe();

        buf.set_length(10);
        assert_eq!(buf.len(), 3);
        buf.set_length(3);
        buf.set_length(1);
        buf.clear();
        buf.clear();

        assert_eq!(
            drain(&mut rx),
            vec![
                BufferEvent::LengthChanged { length: 3, previous: 0 },
                BufferEvent::Full,
                BufferEvent::LengthChanged { length: 1, previous: 3 },
                BufferEvent::LengthChanged { length: 0, previous: 1 },
                BufferEvent::Empty,
            ]
        );
    }

    #[test]
    fn capacity_bound_holds_across_mixed_operations() {
        let mut buf = RingBuffer::<u32>::new(7);
        let mut next = 0u32;
        for step in 0..200usize {
            match step % 5 {
                0 | 1 | 2 => {
                    let chunk: Vec<u32> = (0..(step % 4))
                        .map(|_| {
                            next += 1;
                            next
                        })
                        .collect();
                    let old = buf.len();
                    let overflow = buf.push(&chunk);
                    let written = chunk.len().min(7 - old);
                    assert_eq!(buf.len(), old + written);
                    assert_eq!(overflow.len(), chunk.len().saturating_sub(7 - old));
                    assert_eq!(&buf.data()[old..], &chunk[..written]);
                }
                3 => buf.set_length(step % 11),
                _ => buf.clear(),
            }
            assert!(buf.len() <= buf.capacity());
        }
    }

    #[test]
    fn from_storage_starts_empty_over_existing_data() {
        let mut buf = RingBuffer::from_storage(vec![9.0f64; 4]);
        assert_eq!(buf.capacity(), 4);
        assert!(buf.data().is_empty());
        assert_eq!(buf.storage(), &[9.0; 4]);

        buf.push(&[1.0]);
        assert_eq!(buf.data(), &[1.0]);
    }

    #[test]
    fn notify_data_is_limited_to_the_logical_view() {
        let mut buf = RingBuffer::<i32>::new(8);
        buf.push(&[1, 2, 3]);
        let mut rx = buf.subscribe();

        buf.notify_data(0, 8);
        buf.notify_data(5, 8);

        assert_eq!(drain(&mut rx), vec![BufferEvent::DataChanged { start: 0, end: 3 }]);
    }
}
