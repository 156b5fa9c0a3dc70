pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod files;
pub mod fs_util;
pub mod normalize;
pub mod output;
pub mod report;
pub mod schema;
pub mod table;
pub mod template;
pub mod validate;
pub mod xlsx;
