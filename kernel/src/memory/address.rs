//! Physical and virtual address types
//!
//! Thin newtypes so that a physical frame address can never be passed where
//! a virtual address is expected (and vice versa).

use core::fmt;

use super::layout::{PAGE_SHIFT, PAGE_SIZE};

/// Physical address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(usize);

/// Virtual address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(usize);

macro_rules! impl_address {
    ($name:ident) => {
        impl $name {
            /// The null address
            pub const NULL: Self = Self(0);

            #[inline]
            pub const fn new(addr: usize) -> Self {
                Self(addr)
            }

            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            #[inline]
            pub const fn as_u64(self) -> u64 {
                self.0 as u64
            }

            #[inline]
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }

            /// Check alignment to `align` (must be a power of two)
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                self.0 & (align - 1) == 0
            }

            #[inline]
            pub const fn is_page_aligned(self) -> bool {
                self.is_aligned(PAGE_SIZE)
            }

            /// Round down to `align` (must be a power of two)
            #[inline]
            pub const fn align_down(self, align: usize) -> Self {
                Self(self.0 & !(align - 1))
            }

            /// Round up to `align` (must be a power of two)
            #[inline]
            pub const fn align_up(self, align: usize) -> Self {
                Self((self.0 + align - 1) & !(align - 1))
            }

            /// Start of the page containing this address
            #[inline]
            pub const fn page_base(self) -> Self {
                self.align_down(PAGE_SIZE)
            }

            /// Byte offset within the containing page
            #[inline]
            pub const fn page_offset(self) -> usize {
                self.0 & (PAGE_SIZE - 1)
            }

            #[inline]
            pub const fn page_number(self) -> usize {
                self.0 >> PAGE_SHIFT
            }

            #[inline]
            pub const fn add(self, offset: usize) -> Self {
                Self(self.0 + offset)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }
    };
}

impl_address!(PhysAddr);
impl_address!(VirtAddr);
