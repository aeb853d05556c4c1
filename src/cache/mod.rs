pub mod endpoint_family;
pub mod response_cache;
