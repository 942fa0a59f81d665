//! CLI command handlers.

mod auth;
mod catalog;
mod context;
mod download;

pub use auth::{
    run_import_cookies_command, run_login_command, run_logout_command, run_status_command,
};
pub use catalog::{run_search_command, run_toc_command};
pub use context::AppContext;
pub use download::run_download_command;
