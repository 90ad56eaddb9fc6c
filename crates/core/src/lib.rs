pub mod config;
pub mod error;
pub mod event;
pub mod sync;
pub mod value;

pub use config::{ComputeConfig, PropagationConfig, QueueConfig, RippleConfig, RulesConfig};
pub use error::*;
pub use event::*;
pub use value::*;
