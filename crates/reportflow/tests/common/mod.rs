//! Shared test utilities for reportflow integration tests.
//!
//! - `TestHarness` wires the real components to fakes inside temp directories
//! - `fakes` holds the tool runner, OCR engine and transport stand-ins
//! - `builders` makes PDFs in memory

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::TestHarness;
