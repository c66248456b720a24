//! Fixed-capacity ring buffer of scalar samples
//!
//! Used by the PDR pipeline to smooth barometric elevation and to window
//! acceleration magnitudes for elevator detection. Inserts are O(1); the
//! mean and ordered snapshot are O(n).

/// Smallest capacity a buffer may be created with
pub const MIN_BUFFER_CAPACITY: usize = 1;

/// Largest capacity a buffer may be created with
pub const MAX_BUFFER_CAPACITY: usize = 10_000;

/// Capacity used when none is given
pub const DEFAULT_BUFFER_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct CircularSampleBuffer {
    samples: Vec<f32>,
    capacity: usize,
    /// Index the next push writes to
    head: usize,
    len: usize,
}

impl Default for CircularSampleBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}

impl CircularSampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer; capacity is clamped to [1, 10000]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(MIN_BUFFER_CAPACITY, MAX_BUFFER_CAPACITY);
        Self {
            samples: vec![0.0; capacity],
            capacity,
            head: 0,
            len: 0,
        }
    }

    /// Store a sample, overwriting the oldest once full
    pub fn push(&mut self, value: f32) {
        self.samples[self.head] = value;
        self.head = (self.head + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Most recently pushed sample
    pub fn newest(&self) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let idx = (self.head + self.capacity - 1) % self.capacity;
        Some(self.samples[idx])
    }

    /// Mean of absolute values; 0 when empty
    pub fn average(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.iter().map(f32::abs).sum();
        sum / self.len as f32
    }

    /// Plain arithmetic mean; 0 when empty
    pub fn average_signed(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.iter().sum();
        sum / self.len as f32
    }

    /// Owned copy of the stored samples, oldest first
    pub fn snapshot(&self) -> Vec<f32> {
        self.iter().collect()
    }

    /// Iterate stored samples oldest first
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        let start = (self.head + self.capacity - self.len) % self.capacity;
        (0..self.len).map(move |i| self.samples[(start + i) % self.capacity])
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_clamped() {
        assert_eq!(CircularSampleBuffer::with_capacity(0).capacity(), 1);
        assert_eq!(CircularSampleBuffer::with_capacity(50_000).capacity(), MAX_BUFFER_CAPACITY);
        assert_eq!(CircularSampleBuffer::new().capacity(), DEFAULT_BUFFER_CAPACITY);
    }

    #[test]
    fn test_overwrite_keeps_order() {
        let mut buffer = CircularSampleBuffer::with_capacity(4);
        for v in 1..=6 {
            buffer.push(v as f32);
        }
        assert_eq!(buffer.len(), 4);
        assert!(buffer.is_full());
        assert_eq!(buffer.snapshot(), vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(buffer.newest(), Some(6.0));
    }

    #[test]
    fn test_partial_fill() {
        let mut buffer = CircularSampleBuffer::with_capacity(5);
        buffer.push(2.0);
        buffer.push(-4.0);
        assert_eq!(buffer.len(), 2);
        assert!(!buffer.is_full());
        assert_eq!(buffer.snapshot(), vec![2.0, -4.0]);
    }

    #[test]
    fn test_averages() {
        let mut buffer = CircularSampleBuffer::with_capacity(3);
        assert_eq!(buffer.average(), 0.0);
        assert_eq!(buffer.average_signed(), 0.0);

        buffer.push(1.0);
        buffer.push(-2.0);
        buffer.push(-4.0);
        assert!((buffer.average() - 7.0 / 3.0).abs() < 1e-6);
        assert!((buffer.average_signed() + 5.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        for capacity in [1usize, 3, 10] {
            for extra in 0..5 {
                let mut buffer = CircularSampleBuffer::with_capacity(capacity);
                for i in 0..capacity + extra {
                    buffer.push(i as f32);
                }
                assert_eq!(buffer.len(), capacity);
                let snapshot = buffer.snapshot();
                assert_eq!(snapshot.len(), capacity);
                assert_eq!(snapshot.last().copied(), Some((capacity + extra - 1) as f32));
            }
        }
    }

    #[test]
    fn test_clear() {
        let mut buffer = CircularSampleBuffer::with_capacity(2);
        buffer.push(1.0);
        buffer.push(2.0);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.newest(), None);
        assert!(buffer.snapshot().is_empty());
    }
}
