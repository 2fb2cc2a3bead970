pub mod chain;
pub mod config;
pub mod geometry;
pub mod lifecycle;
pub mod notify;
pub mod pane;
pub mod session;
pub mod store;
pub mod terminal;
pub mod workspace;
