pub mod aws;
pub mod command;
pub mod config;
pub mod constants;
pub mod host;
pub mod init;
pub mod logger;
pub mod metadata;
mod netlink;
pub mod network;
