pub mod allowance;
pub mod feedback;
pub mod ticket;
