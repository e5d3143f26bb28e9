pub mod batch;
pub mod config;
pub mod info;
pub mod preview;
pub mod run;
