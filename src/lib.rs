pub mod admission;
pub mod attendance;
pub mod circles;
pub mod config;
pub mod curriculum;
pub mod db;
pub mod error;
pub mod http;
pub mod ipc;
pub mod model;
pub mod notify;
pub mod payroll;
pub mod progress;
