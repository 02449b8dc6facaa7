#![doc = include_str!("../README.md")]

pub mod census;
pub mod scoped;
