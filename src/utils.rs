//! Utility functions and macros.

/// Declare an arena identifier type.
///
/// Identifiers are plain indices handed out by the owning arena, so two
/// analyses of the same input always see the same identifiers.
#[macro_export]
macro_rules! declare_u32_id {
    ($(#[$meta:meta])* $name: ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create an identifier from its raw index.
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// Raw index of the identifier.
            pub const fn index(self) -> u32 {
                self.0
            }
        }
    };
}

pub use declare_u32_id;

/// Monotonic allocator for arena identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    /// Create a new allocator starting at zero.
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Hand out the next raw index.
    pub fn next_index(&mut self) -> u32 {
        let index = self.next;
        self.next += 1;
        index
    }
}

#[cfg(test)]
mod test_id {
    use super::*;

    declare_u32_id!(
        /// Identifier used by the tests below.
        TestId
    );

    #[test]
    fn ids_are_sequential() {
        let mut alloc = IdAllocator::new();
        let a = TestId::new(alloc.next_index());
        let b = TestId::new(alloc.next_index());
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert!(a < b);
    }
}
