// src/spsc.rs
//
// Bounded single-producer/single-consumer ring. Exactly one thread may call
// `try_push` and exactly one may call `try_pop`; any other use is undefined.
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

#[repr(align(64))]
struct Al64<T>(T);

/// Lock-free SPSC FIFO. Capacity is rounded up to a power of two; one slot
/// is sacrificed to distinguish full from empty, so `cap - 1` pushes succeed
/// against a stalled consumer. Head and tail live on separate cache lines.
pub struct SpscRing<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    head: Al64<AtomicUsize>,
    tail: Al64<AtomicUsize>,
}

unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = capacity.next_power_of_two().max(2);
        let mut v = Vec::with_capacity(cap);
        for _ in 0..cap {
            v.push(UnsafeCell::new(MaybeUninit::uninit()));
        }
        Self {
            buf: v.into_boxed_slice(),
            mask: cap - 1,
            head: Al64(AtomicUsize::new(0)),
            tail: Al64(AtomicUsize::new(0)),
        }
    }

    /// Non-blocking push. On a full ring the value is handed back; the
    /// caller decides whether that is a drop.
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let head = self.head.0.load(Ordering::Relaxed);
        let tail = self.tail.0.load(Ordering::Acquire);
        let next = (head + 1) & self.mask;
        if next == tail {
            return Err(value);
        }
        unsafe {
            (*self.buf[head].get()).write(value);
        }
        // Release publishes the slot write before the index becomes visible.
        self.head.0.store(next, Ordering::Release);
        Ok(())
    }

    /// Non-blocking pop; `None` when empty.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let tail = self.tail.0.load(Ordering::Relaxed);
        let head = self.head.0.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let v = unsafe { (*self.buf[tail].get()).assume_init_read() };
        self.tail.0.store((tail + 1) & self.mask, Ordering::Release);
        Some(v)
    }

    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.0.load(Ordering::Relaxed);
        let tail = self.tail.0.load(Ordering::Relaxed);
        head.wrapping_sub(tail) & self.mask
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rounded slot count. Usable capacity is one less.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        let head = *self.head.0.get_mut();
        let mut tail = *self.tail.0.get_mut();
        while tail != head {
            unsafe {
                (*self.buf[tail].get()).assume_init_drop();
            }
            tail = (tail + 1) & self.mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_single_thread() {
        let q = SpscRing::with_capacity(8);
        for i in 0..7 {
            q.try_push(i).unwrap();
        }
        for i in 0..7 {
            assert_eq!(q.try_pop(), Some(i));
        }
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn capacity_rounds_to_power_of_two() {
        assert_eq!(SpscRing::<u8>::with_capacity(1).capacity(), 2);
        assert_eq!(SpscRing::<u8>::with_capacity(2).capacity(), 2);
        assert_eq!(SpscRing::<u8>::with_capacity(3).capacity(), 4);
        assert_eq!(SpscRing::<u8>::with_capacity(10_000).capacity(), 16_384);
    }

    #[test]
    fn smallest_ring_holds_exactly_one() {
        // Requested capacities 1 and 2 both round to two slots, one usable.
        for req in [1usize, 2] {
            let q = SpscRing::with_capacity(req);
            assert!(q.try_push(1u32).is_ok());
            assert!(q.try_push(2u32).is_err());
            assert_eq!(q.try_pop(), Some(1));
            assert!(q.try_push(3u32).is_ok());
            assert_eq!(q.try_pop(), Some(3));
            assert!(q.try_pop().is_none());
        }
    }

    #[test]
    fn paused_consumer_sees_cap_minus_one_successes() {
        let q = SpscRing::with_capacity(16);
        let mut pushed = 0u32;
        while q.try_push(pushed).is_ok() {
            pushed += 1;
        }
        assert_eq!(pushed as usize, q.capacity() - 1);
        assert_eq!(q.len(), q.capacity() - 1);
    }

    #[test]
    fn wraparound_preserves_order() {
        let q = SpscRing::with_capacity(4);
        let mut next_in = 0u64;
        let mut next_out = 0u64;
        for _ in 0..100 {
            while q.try_push(next_in).is_ok() {
                next_in += 1;
            }
            while let Some(v) = q.try_pop() {
                assert_eq!(v, next_out);
                next_out += 1;
            }
        }
        assert_eq!(next_in, next_out);
    }

    #[test]
    fn concurrent_fifo_law() {
        const N: u64 = 200_000;
        let q = Arc::new(SpscRing::with_capacity(1024));
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..N {
                    let mut v = i;
                    loop {
                        match q.try_push(v) {
                            Ok(()) => break,
                            Err(back) => {
                                v = back;
                                std::hint::spin_loop();
                            }
                        }
                    }
                }
            })
        };
        let mut expected = 0u64;
        while expected < N {
            if let Some(v) = q.try_pop() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn drop_releases_queued_values() {
        let q = SpscRing::with_capacity(8);
        let v = Arc::new(());
        for _ in 0..5 {
            q.try_push(Arc::clone(&v)).unwrap();
        }
        drop(q);
        assert_eq!(Arc::strong_count(&v), 1);
    }
}
