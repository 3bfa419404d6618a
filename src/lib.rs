pub mod config;
pub mod fanout;
pub mod output;
