//! Route handlers

pub mod segments;
