pub mod config;
pub mod connector;
pub mod mode;
pub mod platform;
pub mod protocol;
pub mod settings;
pub mod song;
