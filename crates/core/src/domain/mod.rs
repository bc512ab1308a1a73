pub mod message;
pub mod mood;
pub mod ticket;
