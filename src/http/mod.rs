// ABOUTME: HTTP/1.x request parsing and response serialization for the covered GET/POST profile

pub mod request;
pub mod response;

pub use request::{parse, Headers, ParseError, Request};
pub use response::Response;
