pub mod fetch;
pub mod hash_key;
pub mod origin;
pub mod start;
pub mod status;
