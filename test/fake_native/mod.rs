//! Fake CatBoost C API
//!
//! `extern "C"` doubles for every entry point, bound through the real
//! `SymbolTable::bind` path. State is thread-local so parallel tests never
//! observe each other's handles or counters.
//!
//! A fake model file is `CBM1` followed by three bytes: float feature count,
//! categorical feature count, dimension count. For document `d` and dimension
//! `j` the raw prediction is `sum(floats) + sum(len(cat)) + 100 * j`.

#![allow(dead_code)]

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::sync::Arc;

use catboost_dispatch::ffi::ModelCalcerHandle;
use catboost_dispatch::{Capability, Dispatcher, SymbolTable};

pub const MAGIC: &[u8; 4] = b"CBM1";

const PREDICTION_TYPES: &[&str] = &[
    "RawFormulaVal",
    "Exponent",
    "RMSEWithUncertainty",
    "Probability",
    "LogProbability",
    "Class",
    "MultiProbability",
];

#[derive(Default)]
struct FakeModel {
    loaded: bool,
    float_count: usize,
    cat_count: usize,
    dims: usize,
    prediction_type: String,
}

impl FakeModel {
    fn row_size(&self) -> usize {
        if self.prediction_type == "Class" {
            1
        } else {
            self.dims
        }
    }

    fn score(&self, floats: &[f32], cats: &[&str], out: &mut [f64]) {
        let base: f64 = floats.iter().map(|&f| f as f64).sum::<f64>()
            + cats.iter().map(|c| c.len() as f64).sum::<f64>();
        if self.prediction_type == "Class" {
            out[0] = (base as i64).rem_euclid(self.dims.max(2) as i64) as f64;
        } else {
            for (j, value) in out.iter_mut().enumerate() {
                *value = base + 100.0 * j as f64;
            }
        }
    }
}

#[derive(Default)]
pub struct FakeStats {
    pub creates: usize,
    pub deletes: usize,
    pub mutations: usize,
    pub predictions: usize,
}

struct FakeState {
    stats: FakeStats,
    error: CString,
}

thread_local! {
    static STATE: RefCell<FakeState> = RefCell::new(FakeState {
        stats: FakeStats::default(),
        error: CString::default(),
    });
}

/// Snapshot of this thread's counters
pub fn stats() -> FakeStats {
    STATE.with(|s| {
        let s = s.borrow();
        FakeStats {
            creates: s.stats.creates,
            deletes: s.stats.deletes,
            mutations: s.stats.mutations,
            predictions: s.stats.predictions,
        }
    })
}

/// Serialized fake model
pub fn model_bytes(float_count: u8, cat_count: u8, dims: u8) -> Vec<u8> {
    let mut bytes = MAGIC.to_vec();
    bytes.extend_from_slice(&[float_count, cat_count, dims]);
    bytes
}

fn fail(message: &str) -> bool {
    let full = format!("/home/build/catboost.git/catboost/libs/model/model_export.cpp:42: {}", message);
    STATE.with(|s| s.borrow_mut().error = CString::new(full).unwrap());
    false
}

fn bump(f: impl FnOnce(&mut FakeStats)) {
    STATE.with(|s| f(&mut s.borrow_mut().stats));
}

unsafe fn model<'a>(handle: *mut ModelCalcerHandle) -> &'a mut FakeModel {
    &mut *(handle as *mut FakeModel)
}

unsafe fn malloc_array<T: Copy>(values: &[T]) -> *mut T {
    let p = libc::malloc(std::mem::size_of::<T>() * values.len().max(1)) as *mut T;
    std::ptr::copy_nonoverlapping(values.as_ptr(), p, values.len());
    p
}

unsafe extern "C" fn fake_error_string() -> *const c_char {
    STATE.with(|s| s.borrow().error.as_ptr())
}

unsafe extern "C" fn fake_create() -> *mut ModelCalcerHandle {
    bump(|s| s.creates += 1);
    let model = FakeModel {
        prediction_type: "RawFormulaVal".to_string(),
        ..FakeModel::default()
    };
    Box::into_raw(Box::new(model)) as *mut ModelCalcerHandle
}

unsafe extern "C" fn fake_delete(handle: *mut ModelCalcerHandle) {
    bump(|s| s.deletes += 1);
    drop(Box::from_raw(handle as *mut FakeModel));
}

unsafe extern "C" fn fake_load(
    handle: *mut ModelCalcerHandle,
    buffer: *const c_void,
    size: usize,
) -> bool {
    bump(|s| s.mutations += 1);
    let bytes = std::slice::from_raw_parts(buffer as *const u8, size);
    if size != 7 || &bytes[..4] != MAGIC {
        return fail("Incorrect model file descriptor");
    }
    let m = model(handle);
    m.loaded = true;
    m.float_count = bytes[4] as usize;
    m.cat_count = bytes[5] as usize;
    m.dims = bytes[6] as usize;
    m.prediction_type = "RawFormulaVal".to_string();
    true
}

unsafe fn cat_row<'a>(row: *const *const c_char, count: usize) -> Vec<&'a str> {
    (0..count)
        .map(|i| CStr::from_ptr(*row.add(i)).to_str().unwrap())
        .collect()
}

unsafe extern "C" fn fake_predict_single(
    handle: *mut ModelCalcerHandle,
    floats: *const f32,
    float_size: usize,
    cats: *const *const c_char,
    cat_size: usize,
    result: *mut f64,
    result_size: usize,
) -> bool {
    bump(|s| s.predictions += 1);
    let m = model(handle);
    if !m.loaded {
        return fail("Model is not loaded");
    }
    if float_size < m.float_count || cat_size < m.cat_count {
        return fail("Not enough features");
    }
    if result_size != m.row_size() {
        return fail("Result size mismatch");
    }
    let floats = std::slice::from_raw_parts(floats, m.float_count);
    let cats = cat_row(cats, m.cat_count);
    m.score(floats, &cats, std::slice::from_raw_parts_mut(result, result_size));
    true
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn fake_predict_batch(
    handle: *mut ModelCalcerHandle,
    doc_count: usize,
    floats: *const *const f32,
    float_size: usize,
    cats: *const *const *const c_char,
    cat_size: usize,
    result: *mut f64,
    result_size: usize,
) -> bool {
    bump(|s| s.predictions += 1);
    let m = model(handle);
    if !m.loaded {
        return fail("Model is not loaded");
    }
    if float_size < m.float_count || cat_size < m.cat_count {
        return fail("Not enough features");
    }
    let row = m.row_size();
    if result_size != doc_count * row {
        return fail("Result size mismatch");
    }
    let out = std::slice::from_raw_parts_mut(result, result_size);
    for d in 0..doc_count {
        let float_row = std::slice::from_raw_parts(*floats.add(d), m.float_count);
        let cats = cat_row(*cats.add(d), m.cat_count);
        m.score(float_row, &cats, &mut out[d * row..(d + 1) * row]);
    }
    true
}

unsafe extern "C" fn fake_float_count(handle: *mut ModelCalcerHandle) -> usize {
    model(handle).float_count
}

unsafe extern "C" fn fake_cat_count(handle: *mut ModelCalcerHandle) -> usize {
    model(handle).cat_count
}

unsafe extern "C" fn fake_dims(handle: *mut ModelCalcerHandle) -> usize {
    model(handle).dims
}

unsafe extern "C" fn fake_set_prediction_type(
    handle: *mut ModelCalcerHandle,
    name: *const c_char,
) -> bool {
    bump(|s| s.mutations += 1);
    let name = CStr::from_ptr(name).to_str().unwrap();
    if !PREDICTION_TYPES.contains(&name) {
        return fail(&format!("Unknown prediction type {}", name));
    }
    model(handle).prediction_type = name.to_string();
    true
}

unsafe extern "C" fn fake_used_feature_names(
    handle: *mut ModelCalcerHandle,
    names: *mut *mut *mut c_char,
    count: *mut usize,
) -> bool {
    let m = model(handle);
    let mut owned = Vec::new();
    for i in 0..m.float_count {
        owned.push(format!("Column={}", i));
    }
    for i in 0..m.cat_count {
        owned.push(format!("CatColumn_{}", i + 1));
    }
    let pointers: Vec<*mut c_char> = owned
        .iter()
        .map(|n| libc::strdup(CString::new(n.as_str()).unwrap().as_ptr()))
        .collect();
    *names = malloc_array(&pointers);
    *count = pointers.len();
    true
}

unsafe extern "C" fn fake_model_info_value(
    _handle: *mut ModelCalcerHandle,
    key: *const c_char,
    key_size: usize,
) -> *const c_char {
    let key = std::slice::from_raw_parts(key as *const u8, key_size);
    let value: &'static [u8] = match key {
        b"model_guid" => b"a1b2c3d4-fake\0",
        b"params" => b"{\"loss_function\":{\"type\":\"RMSE\"}}\0",
        b"train_finish_time" => b"2024-01-01T00:00:00Z\0",
        _ => b"\0",
    };
    value.as_ptr().cast()
}

unsafe extern "C" fn fake_cat_indices(
    handle: *mut ModelCalcerHandle,
    indices: *mut *mut usize,
    count: *mut usize,
) -> bool {
    let m = model(handle);
    let values: Vec<usize> = (0..m.cat_count).collect();
    *indices = malloc_array(&values);
    *count = values.len();
    true
}

unsafe extern "C" fn fake_float_indices(
    handle: *mut ModelCalcerHandle,
    indices: *mut *mut usize,
    count: *mut usize,
) -> bool {
    let m = model(handle);
    let values: Vec<usize> = (m.cat_count..m.cat_count + m.float_count).collect();
    *indices = malloc_array(&values);
    *count = values.len();
    true
}

unsafe extern "C" fn fake_evaluator_types(
    _handle: *mut ModelCalcerHandle,
    types: *mut *mut c_int,
    count: *mut usize,
) -> bool {
    let values: [c_int; 1] = [0];
    *types = malloc_array(&values);
    *count = values.len();
    true
}

unsafe extern "C" fn fake_enable_gpu(_handle: *mut ModelCalcerHandle, _device: c_int) -> bool {
    bump(|s| s.mutations += 1);
    fail("GPU evaluation is not available in this build")
}

/// Address of the fake for `capability`
pub fn address(capability: Capability) -> *const c_void {
    match capability {
        Capability::GetErrorString => fake_error_string as *const c_void,
        Capability::CreateHandle => fake_create as *const c_void,
        Capability::DeleteHandle => fake_delete as *const c_void,
        Capability::LoadModel => fake_load as *const c_void,
        Capability::PredictSingle => fake_predict_single as *const c_void,
        Capability::PredictBatch => fake_predict_batch as *const c_void,
        Capability::GetFloatFeatureCount => fake_float_count as *const c_void,
        Capability::GetCatFeatureCount => fake_cat_count as *const c_void,
        Capability::GetDimensionCount => fake_dims as *const c_void,
        Capability::SetPredictionType => fake_set_prediction_type as *const c_void,
        Capability::GetUsedFeatureNames => fake_used_feature_names as *const c_void,
        Capability::GetModelInfoValue => fake_model_info_value as *const c_void,
        Capability::GetCatFeatureIndices => fake_cat_indices as *const c_void,
        Capability::GetFloatFeatureIndices => fake_float_indices as *const c_void,
        Capability::GetSupportedEvaluatorTypes => fake_evaluator_types as *const c_void,
        Capability::EnableGpu => fake_enable_gpu as *const c_void,
    }
}

/// Table with every capability except `missing` bound to its fake
pub fn table_without(missing: &[Capability]) -> SymbolTable {
    let mut table = SymbolTable::new();
    for capability in Capability::ALL {
        if missing.contains(&capability) {
            continue;
        }
        unsafe { table.bind(capability, address(capability)) }.unwrap();
    }
    table
}

pub fn dispatcher() -> Arc<Dispatcher> {
    dispatcher_without(&[])
}

pub fn dispatcher_without(missing: &[Capability]) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::from_table(table_without(missing)))
}
