pub mod audit;
pub mod changes;
pub mod errors;
pub mod gates;
pub mod init;
pub mod pipeline;
pub mod telemetry;
pub mod testsmith_config;
pub mod tracker;
pub mod ui;
pub mod util;
