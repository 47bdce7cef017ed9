//! Core identity and time types

pub mod address;
pub mod clock;
