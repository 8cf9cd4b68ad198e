// Library exports for groupsmigrate
// This allows tests and other crates to use the modules

pub mod archive;
pub mod config;
pub mod error;
pub mod groups_client;
pub mod mailbox;
pub mod uploader;
