//! Memory Region Descriptors
//!
//! Typed views over the start/end address pairs carried by the context.
//! Addresses stay plain integers: the bridge never dereferences them.

use core::fmt;

use bitflags::bitflags;

bitflags! {
    /// Access the binary is granted on a region.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegionFlags: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

/// Which private region a descriptor covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Free RAM (stack, GOT copy, data, bss, heap)
    Ram,
    /// Free NVM the binary may use for its own storage
    Nvm,
}

impl RegionKind {
    /// Access rights the loader's MPU configuration grants on this region.
    pub const fn flags(self) -> RegionFlags {
        match self {
            Self::Ram | Self::Nvm => RegionFlags::READ.union(RegionFlags::WRITE),
        }
    }
}

/// A `[start, end)` address range.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MemRegion {
    kind: RegionKind,
    start: usize,
    end: usize,
}

impl MemRegion {
    /// Describe a region. No ordering check: the loader is trusted.
    #[inline]
    pub const fn new(kind: RegionKind, start: usize, end: usize) -> Self {
        Self { kind, start, end }
    }

    #[inline]
    pub const fn kind(&self) -> RegionKind {
        self.kind
    }

    #[inline]
    pub const fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub const fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub const fn flags(&self) -> RegionFlags {
        self.kind.flags()
    }

    /// Size in bytes; an inverted range has length zero.
    #[inline]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `addr` lies inside the region.
    #[inline]
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end
    }
}

impl fmt::Debug for MemRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}[{:#010x}..{:#010x}) {:?}",
            self.kind, self.start, self.end, self.flags()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_and_contains() {
        let ram = MemRegion::new(RegionKind::Ram, 0x2000_0000, 0x2000_1000);
        assert_eq!(ram.len(), 0x1000);
        assert!(ram.contains(0x2000_0000));
        assert!(ram.contains(0x2000_0FFF));
        assert!(!ram.contains(0x2000_1000));
        assert!(!ram.is_empty());
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let bad = MemRegion::new(RegionKind::Nvm, 0x100, 0x80);
        assert_eq!(bad.len(), 0);
        assert!(bad.is_empty());
        assert!(!bad.contains(0x90));
    }

    #[test]
    fn test_private_regions_are_not_executable() {
        for kind in [RegionKind::Ram, RegionKind::Nvm] {
            assert!(kind.flags().contains(RegionFlags::READ | RegionFlags::WRITE));
            assert!(!kind.flags().contains(RegionFlags::EXEC));
        }
    }
}
