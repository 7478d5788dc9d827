pub mod appointments;
pub mod validation;
