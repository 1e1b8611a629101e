pub mod input;
pub mod transport;
