#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(not(any(feature = "redis-tokio", feature = "redis-smol")))]
compile_error!("enable exactly one runtime feature: `redis-tokio` or `redis-smol`");

#[cfg(all(feature = "redis-tokio", feature = "redis-smol"))]
compile_error!("features `redis-tokio` and `redis-smol` are mutually exclusive");

mod common;
pub use common::{LimiterKey, TimeSource, Verdict, WindowDurationSeconds, WindowLimit};

mod config;
pub use config::*;

mod error;
pub use error::*;

mod limiter;
pub use limiter::*;

pub mod redis;
pub use redis::{
    AdmissionScript, RedisStore, RefreshHandle, RegistrarState, ScriptInstall, ScriptRegistrar,
    ScriptStore,
};

mod runtime;

pub mod window_key;
