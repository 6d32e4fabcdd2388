//! The fundamental unit of time on the chip bus.

/// A count of chip clock cycles.
///
/// The hardware cycle counter is 32 bits wide and free-running: it never
/// resets and wraps modulo 2^32. All arithmetic here wraps to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cycles(pub u32);

impl Cycles {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(count: u32) -> Self {
        Self(count)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Cycles elapsed since `earlier`.
    ///
    /// Correct across a single counter wrap; two full wraps between samples
    /// are indistinguishable by design of the hardware counter.
    #[must_use]
    pub const fn since(self, earlier: Self) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }
}

impl core::ops::Add for Cycles {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl core::ops::AddAssign for Cycles {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_handles_counter_wrap() {
        let before = Cycles::new(u32::MAX - 5);
        let after = Cycles::new(10);
        assert_eq!(after.since(before), 16, "elapsed time must survive a wrap");
    }

    #[test]
    fn add_wraps_like_the_hardware_counter() {
        let c = Cycles::new(u32::MAX) + Cycles::new(2);
        assert_eq!(c.get(), 1);
    }
}
