//! Conversion between the API surfaces and the backend prompt/reply

pub mod request_converter;
pub mod response_converter;
