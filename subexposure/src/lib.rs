#![doc = include_str!("../README.md")]

pub mod context;
pub mod export;
pub mod hardware;
pub mod noise_model;
pub mod scenario;
pub mod shared_args;
