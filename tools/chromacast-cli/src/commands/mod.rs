pub mod check;
pub mod composite;
pub mod init_config;
pub mod record;
