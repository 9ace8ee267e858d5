pub mod base;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
