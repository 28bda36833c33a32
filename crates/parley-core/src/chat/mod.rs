pub mod exchange;
pub mod history;
pub mod orchestrator;
pub mod resolver;
pub mod service;
pub mod title;
