pub mod backend;
pub mod multipart;
pub mod parse;
pub mod request;
pub mod runtime;
