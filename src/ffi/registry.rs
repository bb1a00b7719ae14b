//! Symbol Table
//!
//! Typed call slots for every [`Capability`], each bound at most once.

use std::mem;
use std::os::raw::c_void;

use log::debug;
use thiserror::Error;

use super::types::*;

/// Error type for FFI operations
#[derive(Debug, Clone, Error)]
pub enum FfiError {
    /// Dispatch through a slot that was never bound
    #[error("Capability not bound: {0}")]
    Unbound(Capability),
    /// Second bind of an already bound slot
    #[error("Capability already bound: {0}")]
    AlreadyBound(Capability),
    /// Bind with a null address
    #[error("Null address for capability: {0}")]
    NullAddress(Capability),
    /// Failed to load a library
    #[error("Load error: {0}")]
    LoadError(String),
    /// Symbol not found in library
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
    /// Invalid symbol name
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),
    /// No default library location for this platform
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

/// Result type for FFI operations.
pub type FfiResult<T> = Result<T, FfiError>;

/// Capability slots with their exact native signatures
#[derive(Default, Clone, Copy)]
pub struct SymbolTable {
    get_error_string: Option<GetErrorStringFn>,
    create_handle: Option<ModelCalcerCreateFn>,
    delete_handle: Option<ModelCalcerDeleteFn>,
    load_model: Option<LoadFullModelFromBufferFn>,
    predict_single: Option<CalcModelPredictionSingleFn>,
    predict_batch: Option<CalcModelPredictionFn>,
    get_float_feature_count: Option<GetCountFn>,
    get_cat_feature_count: Option<GetCountFn>,
    get_dimension_count: Option<GetCountFn>,
    set_prediction_type: Option<SetPredictionTypeStringFn>,
    get_used_feature_names: Option<GetModelUsedFeaturesNamesFn>,
    get_model_info_value: Option<GetModelInfoValueFn>,
    get_cat_feature_indices: Option<GetFeatureIndicesFn>,
    get_float_feature_indices: Option<GetFeatureIndicesFn>,
    get_supported_evaluator_types: Option<GetSupportedEvaluatorTypesFn>,
    enable_gpu: Option<EnableGpuEvaluationFn>,
}

/// Store `address` into an empty slot as the slot's function type.
///
/// # Safety
///
/// `address` must point to a function with signature `F`.
unsafe fn fill<F: Copy>(
    slot: &mut Option<F>,
    capability: Capability,
    address: *const c_void,
) -> FfiResult<()> {
    if slot.is_some() {
        return Err(FfiError::AlreadyBound(capability));
    }
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*const c_void>());
    *slot = Some(mem::transmute_copy::<*const c_void, F>(&address));
    Ok(())
}

impl SymbolTable {
    /// Create a table with every slot unbound
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `capability` to a resolved native address.
    ///
    /// # Safety
    ///
    /// `address` must be the entry point of a function whose C signature
    /// matches the capability. A mismatched address is not detected here and
    /// surfaces as a crash or garbage result when dispatched.
    pub unsafe fn bind(&mut self, capability: Capability, address: *const c_void) -> FfiResult<()> {
        if address.is_null() {
            return Err(FfiError::NullAddress(capability));
        }

        match capability {
            Capability::GetErrorString => fill(&mut self.get_error_string, capability, address),
            Capability::CreateHandle => fill(&mut self.create_handle, capability, address),
            Capability::DeleteHandle => fill(&mut self.delete_handle, capability, address),
            Capability::LoadModel => fill(&mut self.load_model, capability, address),
            Capability::PredictSingle => fill(&mut self.predict_single, capability, address),
            Capability::PredictBatch => fill(&mut self.predict_batch, capability, address),
            Capability::GetFloatFeatureCount => {
                fill(&mut self.get_float_feature_count, capability, address)
            }
            Capability::GetCatFeatureCount => {
                fill(&mut self.get_cat_feature_count, capability, address)
            }
            Capability::GetDimensionCount => {
                fill(&mut self.get_dimension_count, capability, address)
            }
            Capability::SetPredictionType => {
                fill(&mut self.set_prediction_type, capability, address)
            }
            Capability::GetUsedFeatureNames => {
                fill(&mut self.get_used_feature_names, capability, address)
            }
            Capability::GetModelInfoValue => {
                fill(&mut self.get_model_info_value, capability, address)
            }
            Capability::GetCatFeatureIndices => {
                fill(&mut self.get_cat_feature_indices, capability, address)
            }
            Capability::GetFloatFeatureIndices => {
                fill(&mut self.get_float_feature_indices, capability, address)
            }
            Capability::GetSupportedEvaluatorTypes => {
                fill(&mut self.get_supported_evaluator_types, capability, address)
            }
            Capability::EnableGpu => fill(&mut self.enable_gpu, capability, address),
        }?;

        debug!("bound {} at {:p}", capability, address);
        Ok(())
    }

    /// Check whether a capability has been bound
    pub fn is_bound(&self, capability: Capability) -> bool {
        match capability {
            Capability::GetErrorString => self.get_error_string.is_some(),
            Capability::CreateHandle => self.create_handle.is_some(),
            Capability::DeleteHandle => self.delete_handle.is_some(),
            Capability::LoadModel => self.load_model.is_some(),
            Capability::PredictSingle => self.predict_single.is_some(),
            Capability::PredictBatch => self.predict_batch.is_some(),
            Capability::GetFloatFeatureCount => self.get_float_feature_count.is_some(),
            Capability::GetCatFeatureCount => self.get_cat_feature_count.is_some(),
            Capability::GetDimensionCount => self.get_dimension_count.is_some(),
            Capability::SetPredictionType => self.set_prediction_type.is_some(),
            Capability::GetUsedFeatureNames => self.get_used_feature_names.is_some(),
            Capability::GetModelInfoValue => self.get_model_info_value.is_some(),
            Capability::GetCatFeatureIndices => self.get_cat_feature_indices.is_some(),
            Capability::GetFloatFeatureIndices => self.get_float_feature_indices.is_some(),
            Capability::GetSupportedEvaluatorTypes => {
                self.get_supported_evaluator_types.is_some()
            }
            Capability::EnableGpu => self.enable_gpu.is_some(),
        }
    }

    /// List capabilities that are still unbound
    pub fn unbound(&self) -> Vec<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .filter(|c| !self.is_bound(*c))
            .collect()
    }

    /// Check whether every capability is bound
    pub fn is_complete(&self) -> bool {
        Capability::ALL.iter().all(|c| self.is_bound(*c))
    }

    pub fn get_error_string(&self) -> FfiResult<GetErrorStringFn> {
        self.get_error_string
            .ok_or(FfiError::Unbound(Capability::GetErrorString))
    }

    pub fn create_handle(&self) -> FfiResult<ModelCalcerCreateFn> {
        self.create_handle
            .ok_or(FfiError::Unbound(Capability::CreateHandle))
    }

    pub fn delete_handle(&self) -> FfiResult<ModelCalcerDeleteFn> {
        self.delete_handle
            .ok_or(FfiError::Unbound(Capability::DeleteHandle))
    }

    pub fn load_model(&self) -> FfiResult<LoadFullModelFromBufferFn> {
        self.load_model.ok_or(FfiError::Unbound(Capability::LoadModel))
    }

    pub fn predict_single(&self) -> FfiResult<CalcModelPredictionSingleFn> {
        self.predict_single
            .ok_or(FfiError::Unbound(Capability::PredictSingle))
    }

    pub fn predict_batch(&self) -> FfiResult<CalcModelPredictionFn> {
        self.predict_batch
            .ok_or(FfiError::Unbound(Capability::PredictBatch))
    }

    pub fn get_float_feature_count(&self) -> FfiResult<GetCountFn> {
        self.get_float_feature_count
            .ok_or(FfiError::Unbound(Capability::GetFloatFeatureCount))
    }

    pub fn get_cat_feature_count(&self) -> FfiResult<GetCountFn> {
        self.get_cat_feature_count
            .ok_or(FfiError::Unbound(Capability::GetCatFeatureCount))
    }

    pub fn get_dimension_count(&self) -> FfiResult<GetCountFn> {
        self.get_dimension_count
            .ok_or(FfiError::Unbound(Capability::GetDimensionCount))
    }

    pub fn set_prediction_type(&self) -> FfiResult<SetPredictionTypeStringFn> {
        self.set_prediction_type
            .ok_or(FfiError::Unbound(Capability::SetPredictionType))
    }

    pub fn get_used_feature_names(&self) -> FfiResult<GetModelUsedFeaturesNamesFn> {
        self.get_used_feature_names
            .ok_or(FfiError::Unbound(Capability::GetUsedFeatureNames))
    }

    pub fn get_model_info_value(&self) -> FfiResult<GetModelInfoValueFn> {
        self.get_model_info_value
            .ok_or(FfiError::Unbound(Capability::GetModelInfoValue))
    }

    pub fn get_cat_feature_indices(&self) -> FfiResult<GetFeatureIndicesFn> {
        self.get_cat_feature_indices
            .ok_or(FfiError::Unbound(Capability::GetCatFeatureIndices))
    }

    pub fn get_float_feature_indices(&self) -> FfiResult<GetFeatureIndicesFn> {
        self.get_float_feature_indices
            .ok_or(FfiError::Unbound(Capability::GetFloatFeatureIndices))
    }

    pub fn get_supported_evaluator_types(&self) -> FfiResult<GetSupportedEvaluatorTypesFn> {
        self.get_supported_evaluator_types
            .ok_or(FfiError::Unbound(Capability::GetSupportedEvaluatorTypes))
    }

    pub fn enable_gpu(&self) -> FfiResult<EnableGpuEvaluationFn> {
        self.enable_gpu.ok_or(FfiError::Unbound(Capability::EnableGpu))
    }
}

impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("unbound", &self.unbound())
            .finish()
    }
}
