//! Wire format types for the two protocols this crate speaks
//!
//! Each module contains pure serde structs matching one side's JSON format.
//! These types are only used at the boundary and are not used internally.

pub mod duck;
pub mod openai;
