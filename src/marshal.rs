//! Array Marshaler
//!
//! Owned pointer tables in the nested shapes the CatBoost C API reads:
//! `const char**` ([`CStringArray`]), `const char***` ([`CStringMatrix`]) and
//! `const float**` ([`FloatMatrix`]).
//!
//! Every table carries its own length, and dropping it frees exactly what was
//! allocated. A table starts with every slot null, is filled by index, and
//! only hands out its native pointer once every slot is set.

use std::ffi::{CString, NulError};
use std::marker::PhantomData;
use std::os::raw::c_char;
use std::ptr;

use thiserror::Error;

/// Errors from building marshaled arrays
#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Slot {index} was never set")]
    Unfilled { index: usize },

    #[error("Row {index} has {got} columns, expected {expected}")]
    RowWidth {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("Rows have different lengths")]
    RaggedRows,

    #[error("String contains an interior NUL byte: {0}")]
    InteriorNul(#[from] NulError),
}

/// Result type for marshaling operations.
pub type MarshalResult<T> = Result<T, MarshalError>;

#[cfg(test)]
thread_local! {
    /// C strings currently allocated by this thread
    static LIVE_STRINGS: std::cell::Cell<isize> = std::cell::Cell::new(0);
}

#[cfg(test)]
pub(crate) fn live_strings() -> isize {
    LIVE_STRINGS.with(|c| c.get())
}

#[inline]
fn track(delta: isize) {
    #[cfg(test)]
    LIVE_STRINGS.with(|c| c.set(c.get() + delta));
    #[cfg(not(test))]
    let _ = delta;
}

fn check_index(index: usize, len: usize) -> MarshalResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(MarshalError::IndexOutOfBounds { index, len })
    }
}

/// Owned `char*[n]` whose strings are owned too
pub struct CStringArray {
    slots: Vec<*mut c_char>,
}

impl CStringArray {
    /// Allocate `len` null slots
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: vec![ptr::null_mut(); len],
        }
    }

    /// Build a fully filled array from string slices
    pub fn from_strs<S: AsRef<str>>(values: &[S]) -> MarshalResult<Self> {
        let mut array = Self::with_len(values.len());
        for (i, value) in values.iter().enumerate() {
            array.set(i, value.as_ref())?;
        }
        Ok(array)
    }

    /// Copy `value` into slot `index`, releasing any previous occupant
    pub fn set(&mut self, index: usize, value: &str) -> MarshalResult<()> {
        check_index(index, self.slots.len())?;
        let owned = CString::new(value)?.into_raw();
        track(1);

        let old = std::mem::replace(&mut self.slots[index], owned);
        if !old.is_null() {
            // Safety: every non-null slot came from CString::into_raw above
            drop(unsafe { CString::from_raw(old) });
            track(-1);
        }
        Ok(())
    }

    /// Read slot `index` back, `None` if unset
    pub fn get(&self, index: usize) -> Option<&str> {
        let p = *self.slots.get(index)?;
        if p.is_null() {
            return None;
        }
        // Safety: non-null slots hold live NUL-terminated copies of &str input
        unsafe { std::ffi::CStr::from_ptr(p) }.to_str().ok()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots set so far
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|p| !p.is_null()).count()
    }

    /// Error with the first unset slot, if any
    pub fn ensure_filled(&self) -> MarshalResult<()> {
        match self.slots.iter().position(|p| p.is_null()) {
            Some(index) => Err(MarshalError::Unfilled { index }),
            None => Ok(()),
        }
    }

    /// Native view, valid while `self` is alive and unmodified
    pub fn as_ptr(&self) -> MarshalResult<*const *const c_char> {
        self.ensure_filled()?;
        Ok(self.slots.as_ptr() as *const *const c_char)
    }
}

impl Drop for CStringArray {
    fn drop(&mut self) {
        for slot in self.slots.drain(..) {
            if !slot.is_null() {
                // Safety: see `set`
                drop(unsafe { CString::from_raw(slot) });
                track(-1);
            }
        }
    }
}

impl std::fmt::Debug for CStringArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries((0..self.len()).map(|i| self.get(i)))
            .finish()
    }
}

/// Owned `char**[n]`: a table of [`CStringArray`] rows.
///
/// Rows may differ in length since each row frees itself. The batch
/// prediction entry point reads one width for every row, see [`inner_len`].
///
/// [`inner_len`]: CStringMatrix::inner_len
pub struct CStringMatrix {
    rows: Vec<Option<CStringArray>>,
    table: Vec<*const *const c_char>,
}

impl CStringMatrix {
    /// Allocate `len` null row slots
    pub fn with_len(len: usize) -> Self {
        let mut rows = Vec::with_capacity(len);
        rows.resize_with(len, || None);
        Self {
            rows,
            table: vec![ptr::null(); len],
        }
    }

    /// Build a fully filled matrix from rows of strings
    pub fn from_rows<S: AsRef<str>>(rows: &[Vec<S>]) -> MarshalResult<Self> {
        let mut matrix = Self::with_len(rows.len());
        for (i, row) in rows.iter().enumerate() {
            matrix.set(i, CStringArray::from_strs(row)?)?;
        }
        Ok(matrix)
    }

    /// Move `row` into slot `index`, dropping any previous row
    pub fn set(&mut self, index: usize, row: CStringArray) -> MarshalResult<()> {
        check_index(index, self.rows.len())?;
        // The row's heap buffer stays put when the struct moves
        self.table[index] = row.slots.as_ptr() as *const *const c_char;
        self.rows[index] = Some(row);
        Ok(())
    }

    pub fn row(&self, index: usize) -> Option<&CStringArray> {
        self.rows.get(index)?.as_ref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Common row length, `0` for a matrix without rows
    pub fn inner_len(&self) -> MarshalResult<usize> {
        let mut width = None;
        for (index, row) in self.rows.iter().enumerate() {
            let len = row
                .as_ref()
                .ok_or(MarshalError::Unfilled { index })?
                .len();
            match width {
                None => width = Some(len),
                Some(w) if w != len => return Err(MarshalError::RaggedRows),
                Some(_) => {}
            }
        }
        Ok(width.unwrap_or(0))
    }

    /// Error with the first unset row, or the first row with an unset slot
    pub fn ensure_filled(&self) -> MarshalResult<()> {
        for (index, row) in self.rows.iter().enumerate() {
            row.as_ref()
                .ok_or(MarshalError::Unfilled { index })?
                .ensure_filled()?;
        }
        Ok(())
    }

    /// Native view, valid while `self` is alive and unmodified
    pub fn as_ptr(&self) -> MarshalResult<*const *const *const c_char> {
        self.ensure_filled()?;
        Ok(self.table.as_ptr())
    }
}

/// Owned `float*[n]` table over rows the caller keeps alive for `'rows`
pub struct FloatMatrix<'rows> {
    columns: usize,
    table: Vec<*const f32>,
    _rows: PhantomData<&'rows [f32]>,
}

impl<'rows> FloatMatrix<'rows> {
    /// Allocate `len` null row slots for rows of `columns` floats
    pub fn with_len(len: usize, columns: usize) -> Self {
        Self {
            columns,
            table: vec![ptr::null(); len],
            _rows: PhantomData,
        }
    }

    /// Build a fully filled matrix; the first row fixes the width
    pub fn from_rows<R: AsRef<[f32]>>(rows: &'rows [R]) -> MarshalResult<Self> {
        let columns = rows.first().map_or(0, |r| r.as_ref().len());
        let mut matrix = Self::with_len(rows.len(), columns);
        for (i, row) in rows.iter().enumerate() {
            matrix.set(i, row.as_ref())?;
        }
        Ok(matrix)
    }

    /// Point slot `index` at `row`
    pub fn set(&mut self, index: usize, row: &'rows [f32]) -> MarshalResult<()> {
        check_index(index, self.table.len())?;
        if row.len() != self.columns {
            return Err(MarshalError::RowWidth {
                index,
                expected: self.columns,
                got: row.len(),
            });
        }
        // Empty slices still yield a non-null dangling pointer
        self.table[index] = row.as_ptr();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn ensure_filled(&self) -> MarshalResult<()> {
        match self.table.iter().position(|p| p.is_null()) {
            Some(index) => Err(MarshalError::Unfilled { index }),
            None => Ok(()),
        }
    }

    /// Native view, valid while `self` and its rows are alive
    pub fn as_ptr(&self) -> MarshalResult<*const *const f32> {
        self.ensure_filled()?;
        Ok(self.table.as_ptr())
    }
}
