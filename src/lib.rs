//! catboost-dispatch - runtime binding layer for the CatBoost model evaluator
//!
//! Drives `libcatboostmodel` through entry points resolved at runtime instead
//! of static linking.
//!
//! # Features
//!
//! - **Typed symbol table**: every entry point has its exact C signature and is bound once
//! - **Checked dispatch**: calling an unbound entry point is an error, never a null call
//! - **Owned marshaling**: C string and float tables that carry their own length
//! - **RAII model handles**: native handles are deleted exactly once
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │     Model       │  owns a ModelCalcerHandle, marshals inputs
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Dispatcher    │  one checked method per capability
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  SymbolTable    │  resolved by NativeLibrary (libloading)
//! └────────┬────────┘
//!          │
//!          ▼
//!   libcatboostmodel
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use catboost_dispatch::{Dispatcher, Model, RuntimeConfig};
//!
//! let config = RuntimeConfig::load_from_cwd()?;
//! let dispatcher = Dispatcher::open(&config)?;
//!
//! let mut model = Model::load_from_file(dispatcher, "regressor.cbm")?;
//! model.apply_config(&config.model)?;
//! let preds = model.predict(&[vec![2.0, 4.0, 6.0, 8.0]], &[])?;
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod ffi;
pub mod marshal;
pub mod model;

pub use config::{ConfigError, ConfigResult, RuntimeConfig};
pub use ffi::{Capability, Dispatcher, FfiError, FfiResult, NativeLibrary, SymbolTable};
pub use marshal::{CStringArray, CStringMatrix, FloatMatrix, MarshalError, MarshalResult};
pub use model::{
    last_error, EvaluatorType, Model, ModelError, ModelResult, PredictionType,
    SUPPORTED_CATBOOST_VERSION,
};
