pub mod backends;
pub mod config;
pub mod controller;
pub mod keyword;
pub mod runtime;
pub mod web;
pub mod wechat;

pub use wechat_robot_app::assets;
pub use wechat_robot_app::logging;
pub use wechat_robot_core::error;
pub use wechat_robot_core::text;
