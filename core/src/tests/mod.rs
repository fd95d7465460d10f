//! Engine tests
//!
//! Organized by area: the resume loop itself, native bridging, object
//! construction, scheduling and world loading.

mod construction_tests;
mod helpers;
