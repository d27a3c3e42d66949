pub mod apportion;
pub mod downscale;
pub mod init;
pub mod validate;
