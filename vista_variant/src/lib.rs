#![forbid(unsafe_code)]

mod variant;

pub use variant::Variant;
