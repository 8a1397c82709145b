use core::{
    cell::UnsafeCell,
    sync::atomic::{
        AtomicBool, AtomicUsize,
        Ordering::{Acquire, Relaxed, Release},
    },
};

/// Single-producer/single-consumer byte queue shared between the PIO interrupt
/// (producer) and the main loop (consumer).
///
/// Both cursors live in `0..N` and one slot is always left empty, so the
/// buffer holds at most `N - 1` bytes. A write into a full buffer drops the
/// new byte; queued data is never overwritten.
// Push at WRITER, pop at READER
pub struct Ringbuf<const N: usize> {
    is_split: AtomicBool,
    writer: AtomicUsize,
    reader: AtomicUsize,
    buf: UnsafeCell<[u8; N]>,
}

// SAFETY: Slots are only written by the single Producer while they are outside
// the readable range and only read by the single Consumer while inside it. The
// cursors that hand a slot from one side to the other are atomics.
unsafe impl<const N: usize> Sync for Ringbuf<N> {}

impl<const N: usize> Default for Ringbuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Ringbuf<N> {
    pub const fn new() -> Self {
        assert!(N >= 2, "a ring buffer needs at least two slots");
        Self {
            is_split: AtomicBool::new(false),
            writer: AtomicUsize::new(0),
            reader: AtomicUsize::new(0),
            buf: UnsafeCell::new([0; N]),
        }
    }

    /// ## Safety
    /// Must only be called once, as only one Producer and Consumer may
    /// exist per Ringbuf.
    pub unsafe fn split(&'static self) -> (Producer<N>, Consumer<N>) {
        self.is_split.store(true, Relaxed);
        (Producer(self), Consumer(self))
    }

    pub fn try_split(&'static self) -> Option<(Producer<N>, Consumer<N>)> {
        // thumbv6m has no atomic read-modify-write
        critical_section::with(|_| {
            if self.is_split.load(Relaxed) {
                None
            } else {
                // SAFETY: We have just checked to ensure that this Ringbuf has not
                // been split.
                Some(unsafe { self.split() })
            }
        })
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of queued bytes, `(writer - reader) mod N`.
    pub fn available(&self) -> usize {
        let writer = self.writer.load(Acquire);
        let reader = self.reader.load(Relaxed);
        (writer + N - reader) % N
    }

    fn is_empty(&self) -> bool {
        self.writer.load(Acquire) == self.reader.load(Relaxed)
    }

    fn is_full(&self) -> bool {
        (self.writer.load(Relaxed) + 1) % N == self.reader.load(Acquire)
    }

    fn slot(&self, index: usize) -> *mut u8 {
        debug_assert!(index < N);
        // SAFETY: index is always reduced modulo N by the callers
        unsafe { self.buf.get().cast::<u8>().add(index) }
    }

    fn push(&self, val: u8) -> Result<(), u8> {
        let writer = self.writer.load(Relaxed);
        let next = (writer + 1) % N;
        if next == self.reader.load(Acquire) {
            return Err(val);
        }
        // SAFETY: The slot at `writer` is outside the readable range and only
        // the single Producer writes to it.
        unsafe { self.slot(writer).write_volatile(val) };
        // Publishing the cursor must not be reordered before the data write
        self.writer.store(next, Release);
        Ok(())
    }

    fn pop(&self) -> Option<u8> {
        let reader = self.reader.load(Relaxed);
        if reader == self.writer.load(Acquire) {
            return None;
        }
        // SAFETY: The buffer is not empty, and could not have become empty since
        // we checked it because only one Consumer may exist.
        let val = unsafe { self.slot(reader).read_volatile() };
        self.reader.store((reader + 1) % N, Release);
        Some(val)
    }
}

/// Interrupt-side view of a ring buffer, type-erased over its capacity so the
/// PIO routing table can hold channels of any size.
pub(crate) trait RxSink: Sync {
    /// Allocation-free push with drop-on-full. Returns `false` if the byte was
    /// dropped.
    fn push_from_isr(&self, byte: u8) -> bool;
}

impl<const N: usize> RxSink for Ringbuf<N> {
    fn push_from_isr(&self, byte: u8) -> bool {
        self.push(byte).is_ok()
    }
}

pub struct Consumer<const N: usize>(&'static Ringbuf<N>);

impl<const N: usize> Consumer<N> {
    pub fn try_read(&self) -> Option<u8> {
        self.0.pop()
    }

    pub fn available(&self) -> usize {
        self.0.available()
    }

    pub fn is_full(&self) -> bool {
        self.0.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct Producer<const N: usize>(&'static Ringbuf<N>);

impl<const N: usize> Producer<N> {
    pub fn try_write(&self, val: u8) -> Result<(), u8> {
        self.0.push(val)
    }

    pub fn is_full(&self) -> bool {
        self.0.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn into_sink(self) -> &'static dyn RxSink {
        self.0
    }
}
