pub mod bindings;
pub mod config;
pub mod error;
pub mod events;
pub mod navigator;
pub mod render;
pub mod tasks {
    pub mod buttons;
    pub mod clock;
    pub mod config_watch;
    pub mod scheduler;
    pub mod shutdown;
}

pub use error::{Error, Result};
