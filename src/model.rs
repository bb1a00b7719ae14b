//! CatBoost Model Handle
//!
//! Safe owner of a native `ModelCalcerHandle`. The handle is created on
//! construction and deleted exactly once, either by [`Model::release`] or on
//! drop. Every call after release is rejected before it reaches native code.
//!
//! # Usage
//!
//! ```rust,ignore
//! use catboost_dispatch::{Dispatcher, Model, PredictionType};
//!
//! let dispatcher = Dispatcher::open_path("/usr/local/lib/libcatboostmodel.so", true)?;
//! let mut model = Model::load_from_file(dispatcher, "classifier.cbm")?;
//! model.set_prediction_type(PredictionType::Probability)?;
//!
//! let floats = vec![vec![2.0, 4.0, 6.0, 8.0, 5.0]];
//! let cats = vec![vec!["a".to_string(), "b".to_string()]];
//! let preds = model.predict(&floats, &cats)?;
//! ```

use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::str::FromStr;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, ModelConfig};
use crate::ffi::{Capability, Dispatcher, FfiError, ModelCalcerHandle};
use crate::marshal::{CStringArray, CStringMatrix, FloatMatrix, MarshalError};

/// CatBoost release this binding layer tracks
pub const SUPPORTED_CATBOOST_VERSION: &str = "1.2.7";

/// Metadata keys understood by [`Model::model_info_value`]
pub const META_VERSION_INFO: &str = "catboost_version_info";
pub const META_MODEL_GUID: &str = "model_guid";
pub const META_PARAMS: &str = "params";
pub const META_TRAIN_FINISH_TIME: &str = "train_finish_time";
pub const META_TRAINING: &str = "training";
pub const META_OUTPUT_OPTIONS: &str = "output_options";

/// Native error messages carry a build path; this marks where the useful part starts
const ERROR_MARKER: &str = "catboost.git";

/// Errors from model operations
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Ffi(#[from] FfiError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("{capability} failed: {message}")]
    Native {
        capability: Capability,
        message: String,
    },

    #[error("ModelCalcerCreate returned a null handle")]
    CreateFailed,

    #[error("Model buffer is empty")]
    EmptyBuffer,

    #[error("Model handle already released")]
    Released,

    #[error("GPU evaluation is not supported on this platform")]
    GpuNotSupported,

    #[error("Input shape mismatch: {0}")]
    Shape(String),

    #[error("Unknown prediction type: {0}")]
    UnknownPredictionType(String),
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Output transformation applied by the native evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PredictionType {
    #[default]
    RawFormulaVal,
    Exponent,
    RMSEWithUncertainty,
    Probability,
    LogProbability,
    Class,
    MultiProbability,
}

impl PredictionType {
    /// Name passed to `SetPredictionTypeString`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawFormulaVal => "RawFormulaVal",
            Self::Exponent => "Exponent",
            Self::RMSEWithUncertainty => "RMSEWithUncertainty",
            Self::Probability => "Probability",
            Self::LogProbability => "LogProbability",
            Self::Class => "Class",
            Self::MultiProbability => "MultiProbability",
        }
    }
}

impl FromStr for PredictionType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RawFormulaVal" => Ok(Self::RawFormulaVal),
            "Exponent" => Ok(Self::Exponent),
            "RMSEWithUncertainty" => Ok(Self::RMSEWithUncertainty),
            "Probability" => Ok(Self::Probability),
            "LogProbability" => Ok(Self::LogProbability),
            "Class" => Ok(Self::Class),
            "MultiProbability" => Ok(Self::MultiProbability),
            _ => Err(ModelError::UnknownPredictionType(s.to_string())),
        }
    }
}

impl fmt::Display for PredictionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Evaluator backends a model can run on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluatorType {
    Cpu,
    Gpu,
    /// A value this binding does not know about
    Unknown(i32),
}

impl EvaluatorType {
    /// Decode `ECatBoostApiFormulaEvaluatorType`
    pub fn from_raw(value: c_int) -> Self {
        match value {
            0 => Self::Cpu,
            1 => Self::Gpu,
            other => Self::Unknown(other),
        }
    }
}

/// Copy the library's last error message.
///
/// Returns `None` when the error-string entry point is unbound or the message
/// is empty. The native buffer is overwritten by the next failing call, so this
/// must run right after the failure it explains.
pub fn last_error(dispatcher: &Dispatcher) -> Option<String> {
    // Safety: GetErrorString takes no arguments; the pointer is read at once.
    let raw = match unsafe { dispatcher.error_string() } {
        Ok(raw) => raw,
        Err(e) => {
            warn!("cannot fetch native error message: {}", e);
            return None;
        }
    };
    if raw.is_null() {
        return None;
    }
    let message = unsafe { CStr::from_ptr(raw) }.to_string_lossy();
    let message = clean_error_message(&message);
    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}

/// Strip the build-path prefix from a native error message
pub fn clean_error_message(raw: &str) -> String {
    match raw.find(ERROR_MARKER) {
        Some(i) => raw[i..].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Copy a `malloc`ed array of `malloc`ed strings and free all of it.
///
/// # Safety
///
/// `names` is null or points to `count` pointers, each null or a
/// NUL-terminated string, all allocated with `malloc` and owned by the caller.
unsafe fn take_string_array(names: *mut *mut c_char, count: usize) -> Vec<String> {
    if names.is_null() {
        return Vec::new();
    }
    let mut result = Vec::with_capacity(count);
    for i in 0..count {
        let name = *names.add(i);
        if name.is_null() {
            result.push(String::new());
            continue;
        }
        result.push(CStr::from_ptr(name).to_string_lossy().into_owned());
        libc::free(name.cast());
    }
    libc::free(names.cast());
    result
}

/// Copy a `malloc`ed array and free it.
///
/// # Safety
///
/// `values` is null or points to `count` initialized `T`s allocated with
/// `malloc` and owned by the caller.
unsafe fn take_array<T: Copy>(values: *mut T, count: usize) -> Vec<T> {
    if values.is_null() {
        return Vec::new();
    }
    let result = std::slice::from_raw_parts(values, count).to_vec();
    libc::free(values.cast());
    result
}

/// Owner of one native model handle
pub struct Model {
    handle: Option<NonNull<ModelCalcerHandle>>,
    dispatcher: Arc<Dispatcher>,
    prediction_type: PredictionType,
}

// The handle may move between threads; concurrent use is not allowed, so the
// model is deliberately not Sync.
unsafe impl Send for Model {}

impl Model {
    /// Create an empty handle
    pub fn create(dispatcher: Arc<Dispatcher>) -> ModelResult<Self> {
        // Safety: ModelCalcerCreate takes no arguments
        let raw = unsafe { dispatcher.create_handle()? };
        let handle = NonNull::new(raw).ok_or(ModelError::CreateFailed)?;
        debug!("created model handle {:p}", handle);
        Ok(Self {
            handle: Some(handle),
            dispatcher,
            prediction_type: PredictionType::default(),
        })
    }

    /// Create a handle and load a serialized model into it
    pub fn load_from_buffer(dispatcher: Arc<Dispatcher>, buffer: &[u8]) -> ModelResult<Self> {
        let mut model = Self::create(dispatcher)?;
        model.load(buffer)?;
        Ok(model)
    }

    /// Create a handle and load a `.cbm` file into it
    pub fn load_from_file(dispatcher: Arc<Dispatcher>, path: impl AsRef<Path>) -> ModelResult<Self> {
        let buffer = std::fs::read(path.as_ref())?;
        debug!(
            "read {} bytes of model from {}",
            buffer.len(),
            path.as_ref().display()
        );
        Self::load_from_buffer(dispatcher, &buffer)
    }

    /// Replace the handle's model with the one serialized in `buffer`
    pub fn load(&mut self, buffer: &[u8]) -> ModelResult<()> {
        let handle = self.raw()?;
        if buffer.is_empty() {
            return Err(ModelError::EmptyBuffer);
        }
        // Safety: handle is live; the buffer outlives the call
        let ok = unsafe {
            self.dispatcher
                .load_model(handle, buffer.as_ptr().cast(), buffer.len())?
        };
        if !ok {
            return Err(self.native_failure(Capability::LoadModel));
        }
        self.prediction_type = PredictionType::default();
        Ok(())
    }

    /// Apply configured defaults: prediction type, then GPU device
    pub fn apply_config(&mut self, config: &ModelConfig) -> ModelResult<()> {
        if config.prediction_type != self.prediction_type {
            self.set_prediction_type(config.prediction_type)?;
        }
        if let Some(device) = config.gpu_device {
            self.enable_gpu_evaluation(device)?;
        }
        Ok(())
    }

    /// The dispatcher this handle calls through
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Check whether the native handle is still owned
    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    /// Delete the native handle. A second call returns [`ModelError::Released`].
    pub fn release(&mut self) -> ModelResult<()> {
        let handle = self.handle.take().ok_or(ModelError::Released)?;
        // Safety: `take` guarantees this is the only delete of a live handle
        if let Err(e) = unsafe { self.dispatcher.delete_handle(handle.as_ptr()) } {
            warn!("leaking model handle {:p}: {}", handle, e);
            return Err(e.into());
        }
        debug!("deleted model handle {:p}", handle);
        Ok(())
    }

    fn raw(&self) -> ModelResult<*mut ModelCalcerHandle> {
        self.handle
            .map(NonNull::as_ptr)
            .ok_or(ModelError::Released)
    }

    fn native_failure(&self, capability: Capability) -> ModelError {
        let message =
            last_error(&self.dispatcher).unwrap_or_else(|| "unknown native error".to_string());
        warn!("{} failed: {}", capability, message);
        ModelError::Native {
            capability,
            message,
        }
    }

    /// Current prediction type
    pub fn prediction_type(&self) -> PredictionType {
        self.prediction_type
    }

    /// Set the prediction type for subsequent evaluation
    pub fn set_prediction_type(&mut self, prediction_type: PredictionType) -> ModelResult<()> {
        let handle = self.raw()?;
        let name = CString::new(prediction_type.as_str()).map_err(MarshalError::from)?;
        // Safety: handle is live; `name` outlives the call
        let ok = unsafe { self.dispatcher.set_prediction_type(handle, name.as_ptr())? };
        if !ok {
            return Err(self.native_failure(Capability::SetPredictionType));
        }
        self.prediction_type = prediction_type;
        Ok(())
    }

    /// Expected float feature count
    pub fn float_features_count(&self) -> ModelResult<usize> {
        let handle = self.raw()?;
        Ok(unsafe { self.dispatcher.float_feature_count(handle)? })
    }

    /// Expected categorical feature count
    pub fn cat_features_count(&self) -> ModelResult<usize> {
        let handle = self.raw()?;
        Ok(unsafe { self.dispatcher.cat_feature_count(handle)? })
    }

    /// Number of output dimensions
    pub fn dimensions_count(&self) -> ModelResult<usize> {
        let handle = self.raw()?;
        Ok(unsafe { self.dispatcher.dimension_count(handle)? })
    }

    /// Values produced per document for the current prediction type
    pub fn row_result_size(&self) -> ModelResult<usize> {
        if self.prediction_type == PredictionType::Class {
            return Ok(1);
        }
        self.dimensions_count()
    }

    /// Batch prediction.
    ///
    /// Each side needs one row per document. A side for which the model has
    /// no features may be passed as an empty slice instead. Returns
    /// `documents * row_result_size()` values, document-major.
    pub fn predict(&self, floats: &[Vec<f32>], cats: &[Vec<String>]) -> ModelResult<Vec<f64>> {
        let handle = self.raw()?;
        let float_count = self.float_features_count()?;
        let cat_count = self.cat_features_count()?;
        let size = self.row_result_size()?;

        let doc_count = floats.len().max(cats.len());
        if doc_count == 0 {
            return Ok(Vec::new());
        }

        let float_rows = self.float_matrix(floats, doc_count, float_count)?;
        let cat_rows = self.cat_matrix(cats, doc_count, cat_count)?;

        let mut preds = vec![0.0f64; doc_count * size];
        // Safety: handle is live; both tables are fully filled with
        // `doc_count` rows of the model's widths; `preds` holds its length.
        let ok = unsafe {
            self.dispatcher.predict_batch(
                handle,
                doc_count,
                float_rows.as_ptr()?,
                float_count,
                cat_rows.as_ptr()?,
                cat_count,
                preds.as_mut_ptr(),
                preds.len(),
            )?
        };
        if !ok {
            return Err(self.native_failure(Capability::PredictBatch));
        }
        Ok(preds)
    }

    fn float_matrix<'a>(
        &self,
        floats: &'a [Vec<f32>],
        doc_count: usize,
        float_count: usize,
    ) -> ModelResult<FloatMatrix<'a>> {
        let mut matrix = FloatMatrix::with_len(doc_count, float_count);
        if floats.is_empty() && float_count == 0 {
            for i in 0..doc_count {
                matrix.set(i, &[])?;
            }
            return Ok(matrix);
        }
        if floats.len() != doc_count {
            return Err(ModelError::Shape(format!(
                "{} float rows for {} documents",
                floats.len(),
                doc_count
            )));
        }
        for (i, row) in floats.iter().enumerate() {
            matrix.set(i, row)?;
        }
        Ok(matrix)
    }

    fn cat_matrix(
        &self,
        cats: &[Vec<String>],
        doc_count: usize,
        cat_count: usize,
    ) -> ModelResult<CStringMatrix> {
        let mut matrix = CStringMatrix::with_len(doc_count);
        if cats.is_empty() && cat_count == 0 {
            for i in 0..doc_count {
                matrix.set(i, CStringArray::with_len(0))?;
            }
            return Ok(matrix);
        }
        if cats.len() != doc_count {
            return Err(ModelError::Shape(format!(
                "{} categorical rows for {} documents",
                cats.len(),
                doc_count
            )));
        }
        for (i, row) in cats.iter().enumerate() {
            if row.len() != cat_count {
                return Err(ModelError::Shape(format!(
                    "categorical row {} has {} values, expected {}",
                    i,
                    row.len(),
                    cat_count
                )));
            }
            matrix.set(i, CStringArray::from_strs(row)?)?;
        }
        Ok(matrix)
    }

    /// Single document prediction
    pub fn predict_single(&self, floats: &[f32], cats: &[String]) -> ModelResult<Vec<f64>> {
        let handle = self.raw()?;
        let size = self.row_result_size()?;
        let cat_row = CStringArray::from_strs(cats)?;

        let mut preds = vec![0.0f64; size];
        // Safety: handle is live; slices and `cat_row` outlive the call
        let ok = unsafe {
            self.dispatcher.predict_single(
                handle,
                floats.as_ptr(),
                floats.len(),
                cat_row.as_ptr()?,
                cat_row.len(),
                preds.as_mut_ptr(),
                preds.len(),
            )?
        };
        if !ok {
            return Err(self.native_failure(Capability::PredictSingle));
        }
        Ok(preds)
    }

    /// Split flat batch output into one row per document
    pub fn transform(&self, preds: &[f64]) -> ModelResult<Vec<Vec<f64>>> {
        let size = self.row_result_size()?;
        if size == 0 {
            return Ok(Vec::new());
        }
        if preds.len() % size != 0 {
            return Err(ModelError::Shape(format!(
                "{} predictions do not split into rows of {}",
                preds.len(),
                size
            )));
        }
        Ok(preds.chunks(size).map(|row| row.to_vec()).collect())
    }

    /// Names of the features the model uses, floats first
    pub fn used_feature_names(&self) -> ModelResult<Vec<String>> {
        let handle = self.raw()?;
        let mut names: *mut *mut c_char = ptr::null_mut();
        let mut count = 0usize;
        // Safety: handle is live; out-parameters point at locals
        let ok = unsafe {
            self.dispatcher
                .used_feature_names(handle, &mut names, &mut count)?
        };
        if !ok {
            return Err(self.native_failure(Capability::GetUsedFeatureNames));
        }
        Ok(unsafe { take_string_array(names, count) })
    }

    /// Metadata value for `key`, empty when the key is absent
    pub fn model_info_value(&self, key: &str) -> ModelResult<String> {
        let handle = self.raw()?;
        let key_c = CString::new(key).map_err(MarshalError::from)?;
        // Safety: handle is live; `key_c` outlives the call; the value is
        // copied before any other call on this handle.
        let value = unsafe {
            self.dispatcher
                .model_info_value(handle, key_c.as_ptr(), key.len())?
        };
        if value.is_null() {
            return Ok(String::new());
        }
        Ok(unsafe { CStr::from_ptr(value) }.to_string_lossy().into_owned())
    }

    /// Metadata value parsed as JSON; plain strings come back as JSON strings
    pub fn model_info_json(&self, key: &str) -> ModelResult<Option<serde_json::Value>> {
        let value = self.model_info_value(key)?;
        if value.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value)),
        ))
    }

    /// Positions of categorical features in the full feature list
    pub fn cat_feature_indices(&self) -> ModelResult<Vec<usize>> {
        let handle = self.raw()?;
        let mut indices: *mut usize = ptr::null_mut();
        let mut count = 0usize;
        let ok = unsafe {
            self.dispatcher
                .cat_feature_indices(handle, &mut indices, &mut count)?
        };
        if !ok {
            return Err(self.native_failure(Capability::GetCatFeatureIndices));
        }
        Ok(unsafe { take_array(indices, count) })
    }

    /// Positions of float features in the full feature list
    pub fn float_feature_indices(&self) -> ModelResult<Vec<usize>> {
        let handle = self.raw()?;
        let mut indices: *mut usize = ptr::null_mut();
        let mut count = 0usize;
        let ok = unsafe {
            self.dispatcher
                .float_feature_indices(handle, &mut indices, &mut count)?
        };
        if !ok {
            return Err(self.native_failure(Capability::GetFloatFeatureIndices));
        }
        Ok(unsafe { take_array(indices, count) })
    }

    /// Evaluator backends available for this model
    pub fn supported_evaluator_types(&self) -> ModelResult<Vec<EvaluatorType>> {
        let handle = self.raw()?;
        let mut types: *mut c_int = ptr::null_mut();
        let mut count = 0usize;
        let ok = unsafe {
            self.dispatcher
                .supported_evaluator_types(handle, &mut types, &mut count)?
        };
        if !ok {
            return Err(self.native_failure(Capability::GetSupportedEvaluatorTypes));
        }
        let raw = unsafe { take_array(types, count) };
        Ok(raw.into_iter().map(EvaluatorType::from_raw).collect())
    }

    /// Switch evaluation to the GPU `device_id`
    pub fn enable_gpu_evaluation(&mut self, device_id: i32) -> ModelResult<()> {
        let handle = self.raw()?;
        if cfg!(target_os = "macos") {
            return Err(ModelError::GpuNotSupported);
        }
        let ok = unsafe { self.dispatcher.enable_gpu(handle, device_id)? };
        if !ok {
            return Err(self.native_failure(Capability::EnableGpu));
        }
        debug!("enabled GPU evaluation on device {}", device_id);
        Ok(())
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.release() {
                warn!("model handle not released: {}", e);
            }
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("handle", &self.handle)
            .field("prediction_type", &self.prediction_type)
            .finish()
    }
}
