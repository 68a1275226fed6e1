pub mod event_test;
