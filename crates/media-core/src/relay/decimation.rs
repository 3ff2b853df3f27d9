use crate::error::{Error, Result};

/// Limits how often the relay polls its sample builder
///
/// With factor N, every Nth packet triggers a pop attempt, so across M
/// consecutive packets exactly `floor(M / N)` attempts are made.
#[derive(Debug, Clone)]
pub struct Decimator {
    factor: u64,
    count: u64,
}

impl Decimator {
    pub fn new(factor: u32) -> Result<Self> {
        if factor == 0 {
            return Err(Error::Config("decimation factor must be at least 1".to_string()));
        }
        Ok(Self { factor: factor as u64, count: 0 })
    }

    /// Record one packet; returns true when a pop should be attempted
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        self.count % self.factor == 0
    }

    pub fn factor(&self) -> u32 {
        self.factor as u32
    }
}
