pub mod ai;
pub mod config;
pub mod content;
pub mod db;
pub mod http;
pub mod plan;
pub mod quota;
pub mod service;
