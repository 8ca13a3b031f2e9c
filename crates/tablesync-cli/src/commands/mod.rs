pub mod common;
pub mod completions;
pub mod init;
pub mod once;
pub mod run;
pub mod status;
