//! Model engine — the loaded-model resource and its cache.
//!
//! The loaded model/tokenizer/pipeline is the one expensive, shared,
//! in-memory resource in the process. [`ModelResourceCache`] owns its
//! lifecycle as an explicit state machine with single-flight loading:
//! many concurrent requests, one load, one shared handle.
//!
//! Backends implement the [`Generator`] capability interface — no
//! duck-typed pipeline probing at call sites.

pub mod cache;
pub mod generator;
pub mod local;

pub use cache::{ModelResourceCache, ModelStatus};
pub use generator::{GenerationOutput, GenerationParams, Generator, ModelLoader};
pub use local::CandleLoader;
