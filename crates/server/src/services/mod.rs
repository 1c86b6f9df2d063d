pub mod grading;
pub mod webhook;
