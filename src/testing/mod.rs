//! In-memory doubles of the capability interfaces.

pub mod mocks;
