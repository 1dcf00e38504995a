//! Process-wide tracing setup shared by the binaries

mod tracing;

pub use crate::tracing::{LogFormat, init_tracing, init_tracing_with, try_init};
pub use ::tracing::level_filters::LevelFilter;
