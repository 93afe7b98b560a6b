#![doc = include_str!("../README.md")]

mod common;
mod error;
mod pool;
mod task;
mod worker;

pub use crate::{
    common::{common, configure_common},
    error::{CommonAlreadyInitializedError, PoolStoppedError},
    pool::{Builder, ThreadPool},
};
