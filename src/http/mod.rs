pub mod message;
pub mod reader;

pub use message::{HttpResponse, ParsedRequest};
pub use reader::{read_request, RawRequest, MAX_HEADER_BYTES};
