//! Background Tasks Module
//!
//! Detached tasks spawned by the fetch path.
//!
//! # Tasks
//! - Cache write: stores a network response in the dynamic generation
//!   without blocking the response returned to the page

mod cache_write;

pub use cache_write::spawn_cache_write;
