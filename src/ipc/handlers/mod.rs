pub mod admission;
pub mod attendance;
pub mod circles;
pub mod core;
pub mod curriculum;
pub mod payroll;
pub mod progress;
