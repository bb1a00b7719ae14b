//! FFI Type System
//!
//! Capability identities and the exact C signatures of the CatBoost
//! model-evaluation entry points.

use std::fmt;
use std::os::raw::{c_char, c_int, c_void};

/// Opaque native model state (`ModelCalcerHandle` in `c_api.h`)
#[repr(C)]
pub struct ModelCalcerHandle {
    _private: [u8; 0],
}

pub type GetErrorStringFn = unsafe extern "C" fn() -> *const c_char;
pub type ModelCalcerCreateFn = unsafe extern "C" fn() -> *mut ModelCalcerHandle;
pub type ModelCalcerDeleteFn = unsafe extern "C" fn(handle: *mut ModelCalcerHandle);
pub type LoadFullModelFromBufferFn = unsafe extern "C" fn(
    handle: *mut ModelCalcerHandle,
    buffer: *const c_void,
    buffer_size: usize,
) -> bool;
pub type CalcModelPredictionSingleFn = unsafe extern "C" fn(
    handle: *mut ModelCalcerHandle,
    float_features: *const f32,
    float_features_size: usize,
    cat_features: *const *const c_char,
    cat_features_size: usize,
    result: *mut f64,
    result_size: usize,
) -> bool;
pub type CalcModelPredictionFn = unsafe extern "C" fn(
    handle: *mut ModelCalcerHandle,
    doc_count: usize,
    float_features: *const *const f32,
    float_features_size: usize,
    cat_features: *const *const *const c_char,
    cat_features_size: usize,
    result: *mut f64,
    result_size: usize,
) -> bool;
pub type GetCountFn = unsafe extern "C" fn(handle: *mut ModelCalcerHandle) -> usize;
pub type SetPredictionTypeStringFn =
    unsafe extern "C" fn(handle: *mut ModelCalcerHandle, prediction_type: *const c_char) -> bool;
pub type GetModelUsedFeaturesNamesFn = unsafe extern "C" fn(
    handle: *mut ModelCalcerHandle,
    feature_names: *mut *mut *mut c_char,
    feature_count: *mut usize,
) -> bool;
pub type GetModelInfoValueFn = unsafe extern "C" fn(
    handle: *mut ModelCalcerHandle,
    key: *const c_char,
    key_size: usize,
) -> *const c_char;
pub type GetFeatureIndicesFn = unsafe extern "C" fn(
    handle: *mut ModelCalcerHandle,
    indices: *mut *mut usize,
    count: *mut usize,
) -> bool;
/// `ECatBoostApiFormulaEvaluatorType` is a plain C enum, so it crosses as `int`
pub type GetSupportedEvaluatorTypesFn = unsafe extern "C" fn(
    handle: *mut ModelCalcerHandle,
    evaluator_types: *mut *mut c_int,
    count: *mut usize,
) -> bool;
pub type EnableGpuEvaluationFn =
    unsafe extern "C" fn(handle: *mut ModelCalcerHandle, device_id: c_int) -> bool;

/// A named native entry point that can be bound and dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    GetErrorString,
    CreateHandle,
    DeleteHandle,
    LoadModel,
    PredictSingle,
    PredictBatch,
    GetFloatFeatureCount,
    GetCatFeatureCount,
    GetDimensionCount,
    SetPredictionType,
    GetUsedFeatureNames,
    GetModelInfoValue,
    GetCatFeatureIndices,
    GetFloatFeatureIndices,
    GetSupportedEvaluatorTypes,
    EnableGpu,
}

impl Capability {
    /// Every capability, in binding order
    pub const ALL: [Capability; 16] = [
        Capability::GetErrorString,
        Capability::CreateHandle,
        Capability::DeleteHandle,
        Capability::LoadModel,
        Capability::PredictSingle,
        Capability::PredictBatch,
        Capability::GetFloatFeatureCount,
        Capability::GetCatFeatureCount,
        Capability::GetDimensionCount,
        Capability::SetPredictionType,
        Capability::GetUsedFeatureNames,
        Capability::GetModelInfoValue,
        Capability::GetCatFeatureIndices,
        Capability::GetFloatFeatureIndices,
        Capability::GetSupportedEvaluatorTypes,
        Capability::EnableGpu,
    ];

    /// Exported symbol name in `libcatboostmodel`
    pub fn symbol_name(&self) -> &'static str {
        match self {
            Capability::GetErrorString => "GetErrorString",
            Capability::CreateHandle => "ModelCalcerCreate",
            Capability::DeleteHandle => "ModelCalcerDelete",
            Capability::LoadModel => "LoadFullModelFromBuffer",
            Capability::PredictSingle => "CalcModelPredictionSingle",
            Capability::PredictBatch => "CalcModelPrediction",
            Capability::GetFloatFeatureCount => "GetFloatFeaturesCount",
            Capability::GetCatFeatureCount => "GetCatFeaturesCount",
            Capability::GetDimensionCount => "GetDimensionsCount",
            Capability::SetPredictionType => "SetPredictionTypeString",
            Capability::GetUsedFeatureNames => "GetModelUsedFeaturesNames",
            Capability::GetModelInfoValue => "GetModelInfoValue",
            Capability::GetCatFeatureIndices => "GetCatFeatureIndices",
            Capability::GetFloatFeatureIndices => "GetFloatFeatureIndices",
            Capability::GetSupportedEvaluatorTypes => "GetSupportedEvaluatorTypes",
            Capability::EnableGpu => "EnableGPUEvaluation",
        }
    }

    /// Look a capability up by its exported symbol name
    pub fn from_symbol(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.symbol_name() == name)
    }

    /// Entry points missing from older library builds
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            Capability::GetCatFeatureIndices
                | Capability::GetFloatFeatureIndices
                | Capability::GetSupportedEvaluatorTypes
                | Capability::EnableGpu
        )
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol_name())
    }
}
