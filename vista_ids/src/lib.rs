//! Generational handles for the vista object graph and scene tree.
//! All IDs use u64 = index (low 32 bits) | generation (high 32 bits). Index 0 = nil.
//! IDs are issued by the arena that owns the slot; slot reuse bumps the
//! generation so a stale handle never aliases a live slot.

mod arena;

pub use arena::GenArena;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::Hash;

// ---- Generational ID: base encoding ----
// u64 layout: low 32 = index (0 = nil, 1.. = slot), high 32 = generation.

/// Implemented by every id type so [`GenArena`] can mint and check handles.
pub trait SlotId: Copy + Eq + Hash {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn index(self) -> u32;
    fn generation(self) -> u32;
    fn nil() -> Self;
    fn is_nil(self) -> bool {
        self.index() == 0
    }
}

/// Defines a generational id type (ObjectId, SceneNodeId, ...).
macro_rules! define_slot_id {
    ($type_name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $type_name(pub u64);

        impl $type_name {
            #[inline]
            pub fn nil() -> Self {
                Self(0)
            }

            #[inline]
            pub fn index(self) -> u32 {
                (self.0 & 0xFFFF_FFFF) as u32
            }

            #[inline]
            pub fn generation(self) -> u32 {
                (self.0 >> 32) as u32
            }

            pub fn from_parts(index: u32, generation: u32) -> Self {
                Self((index as u64) | ((generation as u64) << 32))
            }

            #[inline]
            pub fn as_u64(self) -> u64 {
                self.0
            }

            pub fn from_u64(value: u64) -> Self {
                Self(value)
            }

            #[inline]
            pub fn is_nil(self) -> bool {
                self.0 & 0xFFFF_FFFF == 0
            }

            /// Parse hex string (up to 16 chars, optional 0x prefix).
            pub fn parse_str(s: &str) -> Result<Self, String> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                u64::from_str_radix(s, 16)
                    .map(Self::from_u64)
                    .map_err(|e| format!(concat!("invalid ", stringify!($type_name), ": {}"), e))
            }
        }

        impl SlotId for $type_name {
            #[inline]
            fn from_parts(index: u32, generation: u32) -> Self {
                $type_name::from_parts(index, generation)
            }
            #[inline]
            fn index(self) -> u32 {
                $type_name::index(self)
            }
            #[inline]
            fn generation(self) -> u32 {
                $type_name::generation(self)
            }
            #[inline]
            fn nil() -> Self {
                $type_name::nil()
            }
        }

        impl Default for $type_name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl fmt::Debug for $type_name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    concat!(stringify!($type_name), "({}:{})"),
                    self.index(),
                    self.generation()
                )
            }
        }

        impl fmt::Display for $type_name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", self.index(), self.generation())
            }
        }

        impl Serialize for $type_name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&format!("{:016x}", self.0))
            }
        }

        impl<'de> Deserialize<'de> for $type_name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                struct Visitor;
                impl<'de> serde::de::Visitor<'de> for Visitor {
                    type Value = $type_name;
                    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                        formatter.write_str("hex string (up to 16 chars) or u64")
                    }
                    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        $type_name::parse_str(v).map_err(E::custom)
                    }
                    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                        Ok($type_name::from_u64(v))
                    }
                }
                deserializer.deserialize_any(Visitor)
            }
        }
    };
}

define_slot_id!(ObjectId, "Object handle — allocated by the object graph. Index + generation.");
define_slot_id!(SceneNodeId, "Scene node handle — allocated by the scene tree. Index + generation.");
define_slot_id!(BindingId, "Binding handle — allocated by the binding store. Index + generation.");
