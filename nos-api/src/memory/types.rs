//! Memory management types

use core::fmt;

use static_assertions::const_assert_eq;

use crate::error::{self, Result};

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;
/// Page shift (log2 of PAGE_SIZE)
pub const PAGE_SHIFT: usize = 12;

const_assert_eq!(PAGE_SIZE, 1 << PAGE_SHIFT);

/// Align address down to page boundary
#[inline]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Align address up to page boundary
#[inline]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// A physical address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(pub usize);

impl PhysAddr {
    /// Creates a new physical address from a raw usize value.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Returns the physical address as a raw usize value.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns the page frame number for this physical address.
    pub const fn frame_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Builds the address of the first byte of frame `pfn`.
    pub const fn from_frame_number(pfn: usize) -> Self {
        Self(pfn << PAGE_SHIFT)
    }

    /// Checks if the physical address is page-aligned.
    pub const fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl From<usize> for PhysAddr {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

/// A virtual address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(pub usize);

impl VirtAddr {
    /// Creates a new virtual address from a raw usize value.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Returns the virtual address as a raw usize value.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns the offset within the current page.
    pub const fn page_offset(self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Returns the page number for this virtual address.
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Checks if the virtual address is page-aligned.
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// Rounds down the virtual address to the previous page boundary.
    pub const fn page_round_down(self) -> Self {
        Self(page_round_down(self.0))
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl From<usize> for VirtAddr {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

bitflags::bitflags! {
    /// Permission bits carried by a page table entry
    ///
    /// Bit positions match the hardware layout used by [`PageTableEntry::encode`],
    /// so the same bits survive a Resident <-> Swapped transition untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PtePerms: u64 {
        /// Readable
        const READ = 1 << 1;
        /// Writable
        const WRITE = 1 << 2;
        /// Executable
        const EXEC = 1 << 3;
        /// Accessible from user mode
        const USER = 1 << 4;
    }
}

impl PtePerms {
    /// User read/write data page
    pub const fn user_rw() -> Self {
        Self::READ.union(Self::WRITE).union(Self::USER)
    }

    /// User read-only page
    pub const fn user_ro() -> Self {
        Self::READ.union(Self::USER)
    }

    /// Kernel-only read/write page
    pub const fn kernel_rw() -> Self {
        Self::READ.union(Self::WRITE)
    }

    /// Returns true if the page is reachable from user mode
    pub const fn is_user(self) -> bool {
        self.contains(Self::USER)
    }
}

/// Index of a page-sized block inside a process's backing-store partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SwapSlot(pub usize);

impl SwapSlot {
    /// Byte offset of this slot within its partition
    pub const fn byte_offset(self) -> usize {
        self.0 * PAGE_SIZE
    }

    /// Slot holding the given byte offset
    pub const fn from_byte_offset(offset: usize) -> Self {
        Self(offset / PAGE_SIZE)
    }
}

/// Page table entry as seen by the paging subsystem
///
/// A hardware slot means exactly one of these at any time. The bit packing
/// lives in [`encode`](Self::encode) / [`decode`](Self::decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageTableEntry {
    /// No translation and no saved contents
    #[default]
    Unmapped,
    /// Backed by a physical frame
    Resident {
        /// Frame holding the page contents
        frame: PhysAddr,
        /// Permission bits
        perms: PtePerms,
    },
    /// Contents live in the backing store
    Swapped {
        /// Block index in the owning process's partition
        slot: SwapSlot,
        /// Permission bits restored on swap-in
        perms: PtePerms,
    },
}

/// Hardware bit layout (Sv39-style)
pub mod pte_bits {
    /// Valid
    pub const V: u64 = 1 << 0;
    /// Software bit marking a swapped-out page (RSW field)
    pub const S: u64 = 1 << 8;
    /// First bit of the PPN / slot field
    pub const PPN_SHIFT: u64 = 10;
    /// Width of the PPN / slot field
    pub const PPN_BITS: u64 = 44;
    /// Mask of the PPN / slot field once shifted down
    pub const PPN_MASK: u64 = (1 << PPN_BITS) - 1;
    /// Mask of the permission bits
    pub const PERM_MASK: u64 = 0b1_1110;
}

impl PageTableEntry {
    /// Resident entry for `frame`
    pub const fn resident(frame: PhysAddr, perms: PtePerms) -> Self {
        Self::Resident { frame, perms }
    }

    /// Swapped entry pointing at `slot`
    pub const fn swapped(slot: SwapSlot, perms: PtePerms) -> Self {
        Self::Swapped { slot, perms }
    }

    /// Returns true if the entry is backed by a frame
    pub const fn is_resident(&self) -> bool {
        matches!(self, Self::Resident { .. })
    }

    /// Returns true if the entry points into the backing store
    pub const fn is_swapped(&self) -> bool {
        matches!(self, Self::Swapped { .. })
    }

    /// Permission bits, if the entry is mapped in either state
    pub const fn perms(&self) -> Option<PtePerms> {
        match self {
            Self::Unmapped => None,
            Self::Resident { perms, .. } | Self::Swapped { perms, .. } => Some(*perms),
        }
    }

    /// Packs the entry into a hardware word
    pub fn encode(self) -> u64 {
        match self {
            Self::Unmapped => 0,
            Self::Resident { frame, perms } => {
                ((frame.frame_number() as u64 & pte_bits::PPN_MASK) << pte_bits::PPN_SHIFT)
                    | perms.bits()
                    | pte_bits::V
            }
            Self::Swapped { slot, perms } => {
                ((slot.0 as u64 & pte_bits::PPN_MASK) << pte_bits::PPN_SHIFT)
                    | perms.bits()
                    | pte_bits::S
            }
        }
    }

    /// Unpacks a hardware word
    ///
    /// A word with both the valid and the swapped bit set is malformed.
    pub fn decode(word: u64) -> Result<Self> {
        let perms = PtePerms::from_bits_truncate(word & pte_bits::PERM_MASK);
        let field = ((word >> pte_bits::PPN_SHIFT) & pte_bits::PPN_MASK) as usize;
        match (word & pte_bits::V != 0, word & pte_bits::S != 0) {
            (true, true) => Err(error::invalid_state("entry is both valid and swapped")),
            (true, false) => Ok(Self::Resident {
                frame: PhysAddr::from_frame_number(field),
                perms,
            }),
            (false, true) => Ok(Self::Swapped {
                slot: SwapSlot(field),
                perms,
            }),
            (false, false) => Ok(Self::Unmapped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_rounding() {
        assert_eq!(page_round_down(0x1fff), 0x1000);
        assert_eq!(page_round_up(0x1001), 0x2000);
        assert_eq!(VirtAddr::new(0x4123).page_round_down(), VirtAddr::new(0x4000));
        assert!(PhysAddr::new(0x8000).is_page_aligned());
    }

    #[test]
    fn test_encode_keeps_perms_across_transition() {
        let perms = PtePerms::user_rw() | PtePerms::EXEC;
        let resident = PageTableEntry::resident(PhysAddr::new(0x8020_3000), perms);
        let swapped = PageTableEntry::swapped(SwapSlot(5), perms);

        let r = resident.encode();
        let s = swapped.encode();
        assert_eq!(r & pte_bits::PERM_MASK, s & pte_bits::PERM_MASK);
        assert_ne!(r & pte_bits::V, 0);
        assert_eq!(r & pte_bits::S, 0);
        assert_eq!(s & pte_bits::V, 0);
        assert_ne!(s & pte_bits::S, 0);
        assert_eq!(s >> pte_bits::PPN_SHIFT, 5);

        assert_eq!(PageTableEntry::decode(r).unwrap(), resident);
        assert_eq!(PageTableEntry::decode(s).unwrap(), swapped);
    }

    #[test]
    fn test_decode_rejects_valid_and_swapped() {
        assert!(PageTableEntry::decode(pte_bits::V | pte_bits::S).is_err());
        assert_eq!(PageTableEntry::decode(0).unwrap(), PageTableEntry::Unmapped);
        assert_eq!(PageTableEntry::Unmapped.encode(), 0);
    }

    #[test]
    fn test_slot_offsets() {
        assert_eq!(SwapSlot(3).byte_offset(), 3 * PAGE_SIZE);
        assert_eq!(SwapSlot::from_byte_offset(2 * PAGE_SIZE), SwapSlot(2));
    }
}
