//! booth-cam library crate.
//!
//! Live MJPEG acquisition (capture process or capture device), a
//! latest-frame cache for still capture, and a multipart live view.

pub mod camera;
pub mod cli;
pub mod config;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod storage;
pub mod stream;
