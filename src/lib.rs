pub mod bridge;
pub mod config;
pub mod controller;
pub mod gait;
pub mod messages;
pub mod monitor;
pub mod pacer;
pub mod robot;
pub mod runtime;
pub mod servo;
