//! Newtype ids used everywhere a raw integer would otherwise be threaded through the
//! engine. These are the stable, realtime-visible references described in the Design Notes:
//! cyclic structures (clip <-> playspec <-> interface) are broken by resolving an id through
//! a [`crate::pool::Pool`] on read instead of caching pointers.

use derive_more::Display;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
        pub struct $name(pub u32);

        impl $name {
            pub fn as_i32(self) -> i32 {
                self.0 as i32
            }

            pub fn from_i32(id: i32) -> Option<Self> {
                if id < 0 {
                    None
                } else {
                    Some(Self(id as u32))
                }
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(ClipId);
id_type!(PlayspecId);
id_type!(InterfaceId);
