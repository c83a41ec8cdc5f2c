//! Interference suppression for spa-mirror
//!
//! Client-rendered sites often lock scrolling and cover the page with
//! consent banners, modals or loading screens. This module neutralizes them
//! before links are extracted, and keeps doing so for elements that appear
//! later through a mutation observer.

mod suppressor;

pub use suppressor::{
    install_interference_guard, suppress_interference, SuppressInterference, GUARD_KEY,
    MIN_COVERAGE, MIN_Z_INDEX,
};
