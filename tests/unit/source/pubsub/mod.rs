pub mod header_test;
pub mod session_test;
