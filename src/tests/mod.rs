mod common;
mod config_validation;
mod request_pipeline;
