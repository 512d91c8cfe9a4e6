pub mod config;
pub mod db;
pub mod ingest;
pub mod llm;
pub mod query;
pub mod session;
pub mod sql;
pub mod util;
pub mod web;
