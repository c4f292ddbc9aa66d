//! Macros for thin newtypes: handles wrapping a smart pointer and plain identifiers.

/// Forward [core::ops::Deref] of a newtype to its `inner` field.
#[macro_export]
macro_rules! impl_deref {
    ($name: ident, $type: ty) => {
        impl core::ops::Deref for $name {
            type Target = $type;

            fn deref(&self) -> &Self::Target {
                &self.inner
            }
        }
    };
}

/// Build a newtype from the value it wraps.
#[macro_export]
macro_rules! impl_conversion {
    ($name: ident, $type: ty) => {
        impl core::convert::From<$type> for $name {
            fn from(value: $type) -> Self {
                $name { inner: value }
            }
        }
    };
}

/// Defines a copyable, ordered identifier around an integer.
#[macro_export]
macro_rules! define_id {
    ($(#[$meta: meta])* $name: ident, $type: ty) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[repr(transparent)]
        pub struct $name {
            inner: $type,
        }

        $crate::impl_conversion!($name, $type);

        impl $name {
            pub const fn new(value: $type) -> Self {
                $name { inner: value }
            }
            pub const fn value(self) -> $type {
                self.inner
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.inner, f)
            }
        }
    };
}
