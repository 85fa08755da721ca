pub mod boundary;
pub mod client;
pub mod sections;
