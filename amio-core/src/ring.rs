//! Fixed-capacity single-producer/single-consumer queue.
//!
//! Capacity is a compile-time-or-construction-time power of two, matching the original's
//! `PaUtilRingBuffer` (see `original_source/amio/communication.h`, where
//! `THREAD_QUEUE_SIZE`/`LOG_QUEUE_SIZE`/`INPUT_CLIP_QUEUE_SIZE` are all required to be powers
//! of two). The teacher crate reaches for `rtrb` for exactly this need (see
//! `playtime-clip-engine/src/rt/supplier/pre_buffer.rs` and `cache.rs`), so we build on top
//! of it rather than hand-rolling atomics.
//!
//! Producer and consumer are split at construction time into distinct types, so the
//! "one producer thread, one consumer thread" contract is enforced by the type system rather
//! than by convention: [`RingProducer`] is `Send` but not `Clone`, and likewise for
//! [`RingConsumer`].

/// Creates a ring of the given power-of-two capacity, returning the producer and consumer
/// halves. Allocates once, here; neither half allocates afterwards.
pub fn ring<T>(capacity: usize) -> (RingProducer<T>, RingConsumer<T>) {
    debug_assert!(
        capacity.is_power_of_two(),
        "ring capacity must be a power of two, got {capacity}"
    );
    let (producer, consumer) = rtrb::RingBuffer::new(capacity);
    (RingProducer { inner: producer }, RingConsumer { inner: consumer })
}

#[derive(Debug)]
pub struct RingProducer<T> {
    inner: rtrb::Producer<T>,
}

#[derive(Debug)]
pub struct RingConsumer<T> {
    inner: rtrb::Consumer<T>,
}

impl<T: Copy> RingProducer<T> {
    /// Writes as many of `items` as fit. Returns the count actually moved. Never blocks,
    /// never allocates.
    pub fn write(&mut self, items: &[T]) -> usize {
        let mut written = 0;
        for &item in items {
            if self.inner.push(item).is_err() {
                break;
            }
            written += 1;
        }
        written
    }

    /// Writes a single item. Returns `false` if the ring is full.
    pub fn try_push(&mut self, item: T) -> bool {
        self.inner.push(item).is_ok()
    }

    pub fn capacity(&self) -> usize {
        self.inner.buffer().capacity()
    }
}

impl<T: Copy> RingConsumer<T> {
    /// Reads into `out`, filling as much as is available. Returns the count actually moved.
    /// Never blocks, never allocates.
    pub fn read(&mut self, out: &mut [T]) -> usize {
        let mut read = 0;
        for slot in out.iter_mut() {
            match self.inner.pop() {
                Ok(item) => *slot = item,
                Err(_) => break,
            }
            read += 1;
        }
        read
    }

    /// Pops a single item, if any is available.
    pub fn try_pop(&mut self) -> Option<T> {
        self.inner.pop().ok()
    }

    pub fn capacity(&self) -> usize {
        self.inner.buffer().capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fifo_basics() {
        // Given
        let (mut p, mut c) = ring::<i32>(4);
        // When
        assert_eq!(p.write(&[1, 2, 3]), 3);
        // Then
        let mut out = [0; 2];
        assert_eq!(c.read(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(c.try_pop(), Some(3));
        assert_eq!(c.try_pop(), None);
    }

    #[test]
    fn write_stops_at_capacity() {
        // Given
        let (mut p, _c) = ring::<i32>(2);
        // When / Then
        assert_eq!(p.write(&[1, 2, 3, 4]), 2);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Write(i32),
        Read,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![any::<i32>().prop_map(Op::Write), Just(Op::Read),]
    }

    proptest! {
        /// Property 2: for any interleaving of writes and reads, the sequence read out equals
        /// the sequence written in, in FIFO order, and the ring never holds more than its
        /// capacity.
        #[test]
        fn fifo_order_preserved(ops in prop::collection::vec(op_strategy(), 0..200)) {
            const CAP: usize = 16;
            let (mut p, mut c) = ring::<i32>(CAP);
            let mut model = std::collections::VecDeque::new();
            let mut expected_read = std::collections::VecDeque::new();
            for op in ops {
                match op {
                    Op::Write(v) => {
                        if model.len() < CAP {
                            let n = p.write(&[v]);
                            prop_assert_eq!(n, 1);
                            model.push_back(v);
                        } else {
                            let n = p.write(&[v]);
                            prop_assert_eq!(n, 0);
                        }
                    }
                    Op::Read => {
                        if let Some(front) = model.pop_front() {
                            expected_read.push_back(front);
                            prop_assert_eq!(c.try_pop(), Some(front));
                        } else {
                            prop_assert_eq!(c.try_pop(), None);
                        }
                    }
                }
                prop_assert!(model.len() <= CAP);
            }
        }
    }
}
