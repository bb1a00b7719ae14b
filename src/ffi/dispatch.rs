//! Dispatch Façade
//!
//! One forwarding method per [`Capability`]. Each checks that its slot is
//! bound and then passes the arguments and the return value through unchanged.
//! A native `false` comes back as `Ok(false)`: interpreting it, and fetching
//! the error string, is the caller's job.
//!
//! # Safety
//!
//! Every dispatch method shares one contract: handle arguments are live
//! handles from `create_handle` that were not yet passed to `delete_handle`,
//! array arguments point at as many elements as their size arguments claim,
//! and string arguments are NUL-terminated and outlive the call.

use std::fmt;
use std::os::raw::{c_char, c_int, c_void};
use std::path::Path;
use std::sync::Arc;

use libloading::Library;
use log::{debug, trace};

use super::loader::LibraryLoader;
use super::types::ModelCalcerHandle;
use super::{Capability, FfiResult, SymbolTable};
use crate::config::RuntimeConfig;

/// Bound entry points plus the library that keeps them valid
pub struct Dispatcher {
    table: SymbolTable,
    /// Function pointers in `table` dangle once this is dropped
    _library: Option<Library>,
}

#[allow(clippy::missing_safety_doc)]
impl Dispatcher {
    /// Wrap an already bound table whose functions outlive the dispatcher
    /// (statically linked or test doubles).
    pub fn from_table(table: SymbolTable) -> Self {
        Self {
            table,
            _library: None,
        }
    }

    /// Open the library at `path` and bind every capability
    pub fn open_path(path: impl AsRef<Path>, strict: bool) -> FfiResult<Arc<Self>> {
        let library = LibraryLoader::new().with_path(path).load()?;
        Self::from_native(library, strict)
    }

    /// Locate, open and bind the library described by `config`
    pub fn open(config: &RuntimeConfig) -> FfiResult<Arc<Self>> {
        let mut loader = LibraryLoader::new();
        if let Some(path) = &config.library.path {
            loader = loader.with_path(path);
        }
        for path in &config.library.search_paths {
            loader.add_search_path(path);
        }
        Self::from_native(loader.load()?, config.library.strict)
    }

    fn from_native(library: super::NativeLibrary, strict: bool) -> FfiResult<Arc<Self>> {
        let table = library.bind_all(strict)?;
        debug!(
            "dispatcher ready for {} ({} unbound)",
            library.path().display(),
            table.unbound().len()
        );
        Ok(Arc::new(Self {
            table,
            _library: Some(library.into_library()),
        }))
    }

    /// The bound symbol table
    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    /// Check whether a capability can be dispatched
    pub fn is_bound(&self, capability: Capability) -> bool {
        self.table.is_bound(capability)
    }

    // Safety contract for the methods below: see the module docs.

    /// `GetErrorString`.
    ///
    /// The returned pointer is owned by the native library and stays valid
    /// only until the next failing call. Copy it out before making another
    /// call if the message must be kept.
    pub unsafe fn error_string(&self) -> FfiResult<*const c_char> {
        let f = self.table.get_error_string()?;
        Ok(f())
    }

    /// `ModelCalcerCreate`. The caller owns the returned handle.
    pub unsafe fn create_handle(&self) -> FfiResult<*mut ModelCalcerHandle> {
        let f = self.table.create_handle()?;
        let handle = f();
        trace!("ModelCalcerCreate -> {:p}", handle);
        Ok(handle)
    }

    /// `ModelCalcerDelete`. `handle` must be live and is dead afterwards.
    pub unsafe fn delete_handle(&self, handle: *mut ModelCalcerHandle) -> FfiResult<()> {
        let f = self.table.delete_handle()?;
        trace!("ModelCalcerDelete({:p})", handle);
        f(handle);
        Ok(())
    }

    /// `LoadFullModelFromBuffer`. The buffer is only read during the call.
    pub unsafe fn load_model(
        &self,
        handle: *mut ModelCalcerHandle,
        buffer: *const c_void,
        buffer_size: usize,
    ) -> FfiResult<bool> {
        let f = self.table.load_model()?;
        trace!("LoadFullModelFromBuffer({:p}, {} bytes)", handle, buffer_size);
        Ok(f(handle, buffer, buffer_size))
    }

    /// `CalcModelPredictionSingle`
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn predict_single(
        &self,
        handle: *mut ModelCalcerHandle,
        float_features: *const f32,
        float_features_size: usize,
        cat_features: *const *const c_char,
        cat_features_size: usize,
        result: *mut f64,
        result_size: usize,
    ) -> FfiResult<bool> {
        let f = self.table.predict_single()?;
        Ok(f(
            handle,
            float_features,
            float_features_size,
            cat_features,
            cat_features_size,
            result,
            result_size,
        ))
    }

    /// `CalcModelPrediction`. `result` must hold `result_size` doubles.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn predict_batch(
        &self,
        handle: *mut ModelCalcerHandle,
        doc_count: usize,
        float_features: *const *const f32,
        float_features_size: usize,
        cat_features: *const *const *const c_char,
        cat_features_size: usize,
        result: *mut f64,
        result_size: usize,
    ) -> FfiResult<bool> {
        let f = self.table.predict_batch()?;
        trace!("CalcModelPrediction({:p}, docs={})", handle, doc_count);
        Ok(f(
            handle,
            doc_count,
            float_features,
            float_features_size,
            cat_features,
            cat_features_size,
            result,
            result_size,
        ))
    }

    /// `GetFloatFeaturesCount`
    pub unsafe fn float_feature_count(&self, handle: *mut ModelCalcerHandle) -> FfiResult<usize> {
        let f = self.table.get_float_feature_count()?;
        Ok(f(handle))
    }

    /// `GetCatFeaturesCount`
    pub unsafe fn cat_feature_count(&self, handle: *mut ModelCalcerHandle) -> FfiResult<usize> {
        let f = self.table.get_cat_feature_count()?;
        Ok(f(handle))
    }

    /// `GetDimensionsCount`
    pub unsafe fn dimension_count(&self, handle: *mut ModelCalcerHandle) -> FfiResult<usize> {
        let f = self.table.get_dimension_count()?;
        Ok(f(handle))
    }

    /// `SetPredictionTypeString`
    pub unsafe fn set_prediction_type(
        &self,
        handle: *mut ModelCalcerHandle,
        prediction_type: *const c_char,
    ) -> FfiResult<bool> {
        let f = self.table.set_prediction_type()?;
        Ok(f(handle, prediction_type))
    }

    /// `GetModelUsedFeaturesNames`. On success `*feature_names` is a
    /// `malloc`ed array of `*feature_count` `malloc`ed strings owned by the caller.
    pub unsafe fn used_feature_names(
        &self,
        handle: *mut ModelCalcerHandle,
        feature_names: *mut *mut *mut c_char,
        feature_count: *mut usize,
    ) -> FfiResult<bool> {
        let f = self.table.get_used_feature_names()?;
        Ok(f(handle, feature_names, feature_count))
    }

    /// `GetModelInfoValue`. Returns a pointer into handle-owned storage, valid
    /// while the handle lives and its model is not reloaded.
    pub unsafe fn model_info_value(
        &self,
        handle: *mut ModelCalcerHandle,
        key: *const c_char,
        key_size: usize,
    ) -> FfiResult<*const c_char> {
        let f = self.table.get_model_info_value()?;
        Ok(f(handle, key, key_size))
    }

    /// `GetCatFeatureIndices`. `*indices` is `malloc`ed and owned by the caller.
    pub unsafe fn cat_feature_indices(
        &self,
        handle: *mut ModelCalcerHandle,
        indices: *mut *mut usize,
        count: *mut usize,
    ) -> FfiResult<bool> {
        let f = self.table.get_cat_feature_indices()?;
        Ok(f(handle, indices, count))
    }

    /// `GetFloatFeatureIndices`. `*indices` is `malloc`ed and owned by the caller.
    pub unsafe fn float_feature_indices(
        &self,
        handle: *mut ModelCalcerHandle,
        indices: *mut *mut usize,
        count: *mut usize,
    ) -> FfiResult<bool> {
        let f = self.table.get_float_feature_indices()?;
        Ok(f(handle, indices, count))
    }

    /// `GetSupportedEvaluatorTypes`. `*evaluator_types` is `malloc`ed and owned
    /// by the caller.
    pub unsafe fn supported_evaluator_types(
        &self,
        handle: *mut ModelCalcerHandle,
        evaluator_types: *mut *mut c_int,
        count: *mut usize,
    ) -> FfiResult<bool> {
        let f = self.table.get_supported_evaluator_types()?;
        Ok(f(handle, evaluator_types, count))
    }

    /// `EnableGPUEvaluation`
    pub unsafe fn enable_gpu(
        &self,
        handle: *mut ModelCalcerHandle,
        device_id: c_int,
    ) -> FfiResult<bool> {
        let f = self.table.enable_gpu()?;
        trace!("EnableGPUEvaluation({:p}, device={})", handle, device_id);
        Ok(f(handle, device_id))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("table", &self.table)
            .field("owns_library", &self._library.is_some())
            .finish()
    }
}
