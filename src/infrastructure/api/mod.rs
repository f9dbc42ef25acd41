pub mod http;

pub use http::HttpSessionApi;
