//! # Physical Memory Layout
//!
//! Constants describing the managed physical address space and where the
//! frame allocator keeps its map. The allocator derives its tree geometry from
//! these values, so they must stay mutually consistent; the assertions at the
//! bottom of this module reject an inconsistent set at compile time.

/// Size of a single page in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// Size of the managed physical address space: `[0, 4 GiB)`.
pub const PHYSICAL_ADDRESS_SPACE: u64 = 4 * 1024 * 1024 * 1024;

/// Number of pages forming the smallest allocatable block (one frame).
pub const GRANULARITY: u64 = 2;

/// Size of a frame (the smallest allocatable block) in bytes.
pub const FRAME_SIZE: u64 = PAGE_SIZE * GRANULARITY;

/// Number of frames in the managed range.
pub const FRAME_COUNT: u64 = PHYSICAL_ADDRESS_SPACE / FRAME_SIZE;

/// Depth of the single-frame level of the buddy tree. The root is depth 0.
pub const MAX_DEEP: u32 = FRAME_COUNT.trailing_zeros();

/// Number of nodes in the complete buddy tree.
pub const MAP_NODE_COUNT: u64 = (1 << (MAX_DEEP + 1)) - 1;

/// Length of the frame map in bytes, one bit per tree node.
#[allow(clippy::cast_possible_truncation)]
pub const MAP_LENGTH: usize = MAP_NODE_COUNT.div_ceil(8) as usize;

/// Physical location of the frame map.
///
/// Sits right below the 4 MiB mark, above the kernel image loaded at
/// [`PHYS_LOAD`].
pub const PHYS_MAP_LOCATION: u64 = 0x0038_0000;

/// End of the legacy low-memory area (real-mode IVT, BDA, EBDA, VGA, BIOS ROM).
/// Reserved at boot and never handed out.
pub const LOW_MEMORY_END: u64 = 0x0010_0000; // 1 MiB

/// Where the kernel image is placed in physical memory.
pub const PHYS_LOAD: u64 = 0x0010_0000; // 1 MiB

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything mapped at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(GRANULARITY.is_power_of_two());
    assert!(PHYSICAL_ADDRESS_SPACE.is_power_of_two());
    assert!(FRAME_COUNT.is_power_of_two());
    assert!(MAX_DEEP == 19);
    assert!(MAP_LENGTH == 128 * 1024);
    assert!(PHYS_MAP_LOCATION.is_multiple_of(FRAME_SIZE));
    assert!(PHYS_MAP_LOCATION >= PHYS_LOAD);
    assert!(PHYS_MAP_LOCATION + MAP_LENGTH as u64 <= PHYSICAL_ADDRESS_SPACE);
    assert!(LOW_MEMORY_END.is_multiple_of(FRAME_SIZE));
};
