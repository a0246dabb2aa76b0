pub mod api_errors;
pub mod http;
pub mod mangofy;
pub mod utmify;
pub mod webhook;
