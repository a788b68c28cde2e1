// Core library for the Trellis application framework
// This module contains the DI container, lifecycle hooks and the application host

pub mod application;
pub mod container;
pub mod error;
pub mod lifecycle;
pub mod service;
pub mod traits;
pub mod work;

// Re-export commonly used types
pub use application::*;
pub use container::*;
pub use error::Error;
pub use lifecycle::*;
pub use service::*;
pub use traits::*;
pub use work::*;

pub use trellis_log;
