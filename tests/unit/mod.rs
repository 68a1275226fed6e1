// Unit tests for cdcstream components
// These run against the in-memory transport; no network is needed

pub mod models;
pub mod source;
