pub mod command;
pub mod file;
pub mod param_log;
pub mod runner;
