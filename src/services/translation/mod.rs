pub mod api_client;
pub mod script_filter;

pub use api_client::{ApiClient, Translator};
pub use script_filter::ScriptFilter;
