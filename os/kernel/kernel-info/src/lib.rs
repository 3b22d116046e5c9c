//! # Kernel Configuration
//!
//! Compile-time configuration shared by the kernel's memory subsystems. This
//! crate is the single source of truth for the physical memory layout the
//! frame allocator manages: the size of the address space, the page and frame
//! sizes, the depth of the buddy tree, and the fixed physical location of the
//! allocator's map.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1 MiB)        │  reserved at boot
//!             │  (IVT, BDA, VGA, BIOS ROM)      │
//! PHYS_LOAD   ├─────────────────────────────────┤ 0x0010_0000
//!             │       Kernel Image              │
//! PHYS_MAP_   ├─────────────────────────────────┤ 0x0038_0000
//! LOCATION    │    Frame Map (MAP_LENGTH)       │  reserved at boot
//!             ├─────────────────────────────────┤ 0x003A_0000
//!             │    Available RAM                │
//!             │  (managed by the allocator)     │
//! 4 GiB       └─────────────────────────────────┘
//! ```
//!
//! All values are `const` and validated by compile-time assertions, so an
//! inconsistent configuration fails the build instead of corrupting the map
//! at runtime.
//!
//! ```rust
//! use kernel_info::memory::{FRAME_SIZE, MAX_DEEP, PHYSICAL_ADDRESS_SPACE};
//!
//! assert_eq!(PHYSICAL_ADDRESS_SPACE >> MAX_DEEP, FRAME_SIZE);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
