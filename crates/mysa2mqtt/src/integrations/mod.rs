pub mod mqtt;
pub mod mysa;
