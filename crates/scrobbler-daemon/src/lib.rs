pub mod collab;
pub mod controller;
pub mod error;
pub mod events;
pub mod host;
pub mod http;
pub mod logging;
pub mod menu;
pub mod orchestrator;
pub mod ownership;
