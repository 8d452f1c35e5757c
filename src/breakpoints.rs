//! Execution breakpoints.
//!
//! Pure state owned by the CPU; the driver registers addresses here and the
//! step loop reports a hit before executing the instruction at a registered
//! PC. There is no ambient/global debugger state.

use std::collections::HashSet;

#[derive(Debug, Default, Clone)]
pub struct Breakpoints {
    addrs: HashSet<u16>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, addr: u16) {
        self.addrs.insert(addr);
    }

    pub fn clear(&mut self, addr: u16) {
        self.addrs.remove(&addr);
    }

    /// Flip the breakpoint at `addr`; returns whether it is now set.
    pub fn toggle(&mut self, addr: u16) -> bool {
        if self.addrs.remove(&addr) {
            false
        } else {
            self.addrs.insert(addr);
            true
        }
    }

    pub fn contains(&self, addr: u16) -> bool {
        // Fast path: most frames run with no breakpoints at all.
        !self.addrs.is_empty() && self.addrs.contains(&addr)
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn clear_all(&mut self) {
        self.addrs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clear_and_toggle() {
        let mut bps = Breakpoints::new();
        assert!(!bps.contains(0x0150));

        bps.set(0x0150);
        assert!(bps.contains(0x0150));
        assert!(!bps.contains(0x0151));

        assert!(!bps.toggle(0x0150));
        assert!(!bps.contains(0x0150));
        assert!(bps.toggle(0x0150));
        assert!(bps.contains(0x0150));

        bps.clear(0x0150);
        assert!(bps.is_empty());
    }
}
