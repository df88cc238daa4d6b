pub mod file;
pub mod http;

pub use file::FileAppConfigStore;
pub use http::HttpAppConfigStore;
