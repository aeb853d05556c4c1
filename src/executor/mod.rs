pub mod outcome;
pub mod request_executor;
