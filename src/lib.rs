pub mod sim;
pub mod timeflow;
pub mod timeq;
pub mod traffic;
