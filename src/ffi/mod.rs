//! FFI Module
//!
//! Binding and dispatch layer for the CatBoost model-evaluation C API.
//!
//! # Architecture
//!
//! ```text
//! Model / caller
//!       │
//!       ▼
//! Dispatcher (checked forwarding, one method per capability)
//!       │
//!       ▼
//! SymbolTable (typed slots, each bound once)
//!       │
//!       ▼
//! NativeLibrary (libloading) ──► libcatboostmodel
//! ```
//!
//! Binding happens while the table is still exclusively owned. The finished
//! table is frozen into a [`Dispatcher`] and shared as `Arc<Dispatcher>`, so
//! every bind happens-before every dispatch.
//!
//! # Example
//!
//! ```ignore
//! let dispatcher = Dispatcher::open_path("/usr/local/lib/libcatboostmodel.so", true)?;
//! let handle = unsafe { dispatcher.create_handle()? };
//! unsafe { dispatcher.delete_handle(handle)? };
//! ```

mod dispatch;
mod loader;
mod registry;
mod types;

pub use dispatch::Dispatcher;
pub use loader::{
    default_library_path, library_filename, LibraryLoader, NativeLibrary, LIBRARY_NAME,
    LIBRARY_PATH_ENV,
};
pub use registry::{FfiError, FfiResult, SymbolTable};
pub use types::*;
