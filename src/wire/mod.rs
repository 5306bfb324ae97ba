//! Request/response serialization helpers: header merging, query-string
//! building, body encoding and response parsing.

pub mod body;
pub mod headers;
pub mod params;
pub mod response;

pub use body::Payload;
pub use params::ParamValue;
pub use response::ResponseData;
