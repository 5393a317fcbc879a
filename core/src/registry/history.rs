/// Fixed-capacity circular buffer of raw RSSI samples.
#[derive(Debug, Clone)]
pub struct RssiRing {
    buf: Vec<f64>,
    pos: usize,
    count: usize,
}

impl RssiRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0.0; capacity.max(1)],
            pos: 0,
            count: 0,
        }
    }

    /// Stores a sample, overwriting the oldest once full.
    pub fn push(&mut self, value: f64) {
        self.buf[self.pos] = value;
        self.pos = (self.pos + 1) % self.buf.len();
        if self.count < self.buf.len() {
            self.count += 1;
        }
    }

    /// Samples oldest first.
    pub fn values(&self) -> Vec<f64> {
        if self.count < self.buf.len() {
            return self.buf[..self.count].to_vec();
        }
        let mut result = Vec::with_capacity(self.count);
        result.extend_from_slice(&self.buf[self.pos..]);
        result.extend_from_slice(&self.buf[..self.pos]);
        result
    }

    pub fn last(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let idx = (self.pos + self.buf.len() - 1) % self.buf.len();
        Some(self.buf[idx])
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}
