pub mod capture_session;
pub mod output_sink;
pub mod routing;
