#![allow(dead_code)]

pub mod fake_api;
pub mod fake_stack;
pub mod logging;

pub use fake_api::{FakeOptions, FakeRedBus};
pub use fake_stack::{FakeStack, ScriptedProbes};
pub use logging::init_test_logging;
