#![allow(dead_code)]

pub mod builders;
pub mod flaky_backend;
pub mod mock_worker;
pub mod strategies;

pub use builders::*;
pub use flaky_backend::*;
pub use mock_worker::*;
