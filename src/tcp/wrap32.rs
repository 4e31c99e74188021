use std::fmt;
use std::ops::{Add, AddAssign};

/// A 32-bit sequence number. All arithmetic wraps modulo 2^32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Wrap32 {
    value: u32,
}

impl Wrap32 {
    pub fn new(value: u32) -> Self {
        Wrap32 { value }
    }

    pub fn value(&self) -> u32 {
        self.value
    }
}

impl Add<u32> for Wrap32 {
    type Output = Wrap32;

    fn add(self, n: u32) -> Wrap32 {
        Wrap32::new(self.value.wrapping_add(n))
    }
}

impl AddAssign<u32> for Wrap32 {
    fn add_assign(&mut self, n: u32) {
        self.value = self.value.wrapping_add(n);
    }
}

impl fmt::Display for Wrap32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

// -- Unit tests --
