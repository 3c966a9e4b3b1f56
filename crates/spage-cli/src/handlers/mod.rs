//! HTTP request handlers

pub mod page;
pub mod service;

pub use page::{get_file, get_history, get_page, post_page};
pub use service::get_info;
