//! Flat C ABI over the msdsim engine, so other runtimes can drive a lattice without linking Rust.
//!
//! Lattices and molecules cross the boundary as opaque handles created and destroyed here.
//! Records cross as `#[repr(C)]` mirrors of the engine types. Fallible calls return a status code
//! (`MSD_OK`, `MSD_RANGE_ERROR`, `MSD_FORMAT_ERROR`, `MSD_OTHER_ERROR`, or `MSD_NULL_HANDLE` for a
//! null pointer) and record a message retrievable with [`msd_last_error_message`]. Outputs are
//! written only on success.
//!
//! Plain getters that cannot otherwise fail (counts, seeds, estimators) return their value
//! directly and fall back to `0` (or `NaN` for estimators) when given a null handle.

use msdsim::core::error::{FormatError, RangeError};
use msdsim::core::io::codec::{HEADER, HEADER_SIZE};
use msdsim::core::models::molecule::{EdgeParameters, MoleculeGraph, NodeParameters};
use msdsim::core::models::parameters::Parameters;
use msdsim::core::models::region::Region;
use msdsim::core::models::results::Results;
use msdsim::core::vector::Vector;
use msdsim::engine::Lattice;
use msdsim::engine::config::{ConfigError, FlipModel, GeometrySpec, LatticeConfigBuilder};
use msdsim::engine::error::MsdError;
use msdsim::engine::geometry::Geometry;
use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char};
use std::{ptr, slice};
use thiserror::Error;

pub const MSD_OK: i32 = 0;
pub const MSD_RANGE_ERROR: i32 = 1;
pub const MSD_FORMAT_ERROR: i32 = 2;
pub const MSD_OTHER_ERROR: i32 = 3;
pub const MSD_NULL_HANDLE: i32 = -1;

pub const MSD_DISCRETE: i32 = 0;
pub const MSD_CONTINUOUS: i32 = 1;

/// Leading bytes of every serialized molecule.
#[unsafe(no_mangle)]
pub static MSD_HEADER: [u8; 6] = *HEADER;

/// Bytes taken by the header and format version.
#[unsafe(no_mangle)]
pub static MSD_HEADER_SIZE: usize = HEADER_SIZE;

/// Returned by index-valued calls when there is nothing to return.
#[unsafe(no_mangle)]
pub static MSD_NOT_FOUND: usize = usize::MAX;

#[derive(Debug, Error)]
enum FfiError {
    #[error("{0} pointer was null")]
    Null(&'static str),

    #[error("Unknown region code {0}")]
    Region(u8),

    #[error("Buffer of {capacity} bytes cannot hold {needed} bytes")]
    Capacity { needed: usize, capacity: usize },

    #[error("Unknown parameter '{0}'")]
    Key(String),

    #[error(transparent)]
    Core(#[from] MsdError),
}

impl From<RangeError> for FfiError {
    fn from(e: RangeError) -> Self {
        Self::Core(e.into())
    }
}

impl From<FormatError> for FfiError {
    fn from(e: FormatError) -> Self {
        Self::Core(e.into())
    }
}

impl FfiError {
    fn code(&self) -> i32 {
        match self {
            FfiError::Null(_) => MSD_NULL_HANDLE,
            FfiError::Region(_) | FfiError::Core(MsdError::Range(_)) => MSD_RANGE_ERROR,
            FfiError::Core(MsdError::Format(_)) => MSD_FORMAT_ERROR,
            FfiError::Capacity { .. } | FfiError::Key(_) | FfiError::Core(_) => MSD_OTHER_ERROR,
        }
    }
}

type FfiResult<T> = Result<T, FfiError>;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: String) {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Runs `f`, translating its outcome into a status code and the thread's last error.
fn guard(f: impl FnOnce() -> FfiResult<()>) -> i32 {
    match f() {
        Ok(()) => {
            clear_last_error();
            MSD_OK
        }
        Err(e) => {
            let code = e.code();
            set_last_error(e.to_string());
            code
        }
    }
}

fn into_raw<T, H>(result: Result<T, MsdError>, wrap: impl FnOnce(T) -> H) -> *mut H {
    match result {
        Ok(value) => {
            clear_last_error();
            Box::into_raw(Box::new(wrap(value)))
        }
        Err(e) => {
            set_last_error(e.to_string());
            ptr::null_mut()
        }
    }
}

unsafe fn deref<'a, T>(ptr: *const T, label: &'static str) -> FfiResult<&'a T> {
    // SAFETY: the caller guarantees a non-null `ptr` is valid for reads.
    unsafe { ptr.as_ref() }.ok_or(FfiError::Null(label))
}

unsafe fn deref_mut<'a, T>(ptr: *mut T, label: &'static str) -> FfiResult<&'a mut T> {
    // SAFETY: the caller guarantees a non-null `ptr` is valid for writes and unaliased.
    unsafe { ptr.as_mut() }.ok_or(FfiError::Null(label))
}

unsafe fn lattice<'a>(handle: *const MsdHandle) -> FfiResult<&'a Lattice> {
    unsafe { deref(handle, "lattice") }.map(|h| &h.0)
}

unsafe fn lattice_mut<'a>(handle: *mut MsdHandle) -> FfiResult<&'a mut Lattice> {
    unsafe { deref_mut(handle, "lattice") }.map(|h| &mut h.0)
}

unsafe fn molecule<'a>(handle: *const MoleculeHandle) -> FfiResult<&'a MoleculeGraph> {
    unsafe { deref(handle, "molecule") }.map(|h| &h.0)
}

unsafe fn molecule_mut<'a>(handle: *mut MoleculeHandle) -> FfiResult<&'a mut MoleculeGraph> {
    unsafe { deref_mut(handle, "molecule") }.map(|h| &mut h.0)
}

unsafe fn key<'a>(ptr: *const c_char) -> FfiResult<&'a str> {
    if ptr.is_null() {
        return Err(FfiError::Null("key"));
    }
    // SAFETY: the caller guarantees a non-null `ptr` is a nul-terminated string.
    let raw = unsafe { CStr::from_ptr(ptr) };
    raw.to_str()
        .map_err(|_| FfiError::Key(raw.to_string_lossy().into_owned()))
}

fn region(code: u8) -> FfiResult<Region> {
    Region::ALL
        .get(code as usize)
        .copied()
        .ok_or(FfiError::Region(code))
}

// ----- records -----

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MsdVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Vector> for MsdVector {
    fn from(v: Vector) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<MsdVector> for Vector {
    fn from(v: MsdVector) -> Self {
        Vector::new(v.x, v.y, v.z)
    }
}

/// Declares a `#[repr(C)]` mirror of an engine record with conversions both ways. Every field of
/// the engine record must be listed.
macro_rules! mirror {
    ($(#[$meta:meta])* $name:ident <=> $source:ty { $($field:ident: $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Debug, Clone, Copy, PartialEq, Default)]
        pub struct $name {
            $(pub $field: $ty),*
        }

        impl From<$source> for $name {
            fn from(v: $source) -> Self {
                Self { $($field: v.$field.into()),* }
            }
        }

        impl From<$name> for $source {
            fn from(v: $name) -> Self {
                Self { $($field: v.$field.into()),* }
            }
        }
    };
}

mirror! {
    MsdNodeParameters <=> NodeParameters { s: f64, f: f64, je0: f64, a: MsdVector }
}

mirror! {
    MsdEdgeParameters <=> EdgeParameters { j: f64, je1: f64, jee: f64, b: f64, d: MsdVector }
}

mirror! {
    /// Field order follows `kT, B`, then the lead, exchange, flux, biquadratic, anisotropy and
    /// directional coefficients.
    MsdParameters <=> Parameters {
        kt: f64, b: MsdVector,
        s_l: f64, s_r: f64, f_l: f64, f_r: f64,
        j_l: f64, j_r: f64, j_ml: f64, j_mr: f64, j_lr: f64,
        je0_l: f64, je0_r: f64,
        je1_l: f64, je1_r: f64, je1_ml: f64, je1_mr: f64, je1_lr: f64,
        jee_l: f64, jee_r: f64, jee_ml: f64, jee_mr: f64, jee_lr: f64,
        bq_l: f64, bq_r: f64, bq_ml: f64, bq_mr: f64, bq_lr: f64,
        a_l: MsdVector, a_r: MsdVector,
        d_l: MsdVector, d_r: MsdVector, d_ml: MsdVector, d_mr: MsdVector, d_lr: MsdVector,
    }
}

mirror! {
    MsdResults <=> Results {
        t: u64,
        m: MsdVector, m_l: MsdVector, m_r: MsdVector, m_m: MsdVector,
        ms: MsdVector, ms_l: MsdVector, ms_r: MsdVector, ms_m: MsdVector,
        mf: MsdVector, mf_l: MsdVector, mf_r: MsdVector, mf_m: MsdVector,
        u: f64, u_l: f64, u_r: f64, u_m: f64, u_ml: f64, u_mr: f64, u_lr: f64,
    }
}

// ----- error reporting -----

/// Length in bytes of the last error message on this thread, excluding the terminator.
#[unsafe(no_mangle)]
pub extern "C" fn msd_last_error_length() -> usize {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(0, |m| m.as_bytes().len()))
}

/// Copies the last error message into `buffer`, truncating to `capacity - 1` bytes and
/// terminating it. Returns the number of bytes copied.
///
/// # Safety
/// `buffer` must be null or valid for `capacity` bytes of writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_last_error_message(buffer: *mut c_char, capacity: usize) -> usize {
    if buffer.is_null() || capacity == 0 {
        return 0;
    }
    LAST_ERROR.with(|slot| {
        let slot = slot.borrow();
        let bytes = slot.as_ref().map_or(&[][..], |m| m.as_bytes());
        let n = bytes.len().min(capacity - 1);
        // SAFETY: `buffer` holds at least `capacity > n` bytes.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr().cast::<c_char>(), buffer, n);
            *buffer.add(n) = 0;
        }
        n
    })
}

// ----- lattice lifecycle -----

/// Opaque lattice handle.
pub struct MsdHandle(Lattice);

/// A lattice with a centered molecule and full lead cross-sections. Null on failure.
#[unsafe(no_mangle)]
pub extern "C" fn msd_create(width: usize, height: usize, depth: usize) -> *mut MsdHandle {
    into_raw(Lattice::centered(width, height, depth), MsdHandle)
}

/// A lattice with centered lead bands `height_l` rows and `depth_r` layers thick.
#[unsafe(no_mangle)]
pub extern "C" fn msd_create_with_leads(
    width: usize,
    height: usize,
    depth: usize,
    height_l: usize,
    depth_r: usize,
) -> *mut MsdHandle {
    into_raw(
        Lattice::with_leads(width, height, depth, height_l, depth_r),
        MsdHandle,
    )
}

/// A lattice with every bound given explicitly.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn msd_create_full(
    width: usize,
    height: usize,
    depth: usize,
    mol_pos_l: usize,
    mol_pos_r: usize,
    top_l: usize,
    bottom_l: usize,
    front_r: usize,
    back_r: usize,
) -> *mut MsdHandle {
    let geometry = Geometry::full(
        width, height, depth, mol_pos_l, mol_pos_r, top_l, bottom_l, front_r, back_r,
    );
    let lattice = LatticeConfigBuilder::new()
        .geometry(GeometrySpec::Explicit(geometry))
        .build()
        .map_err(MsdError::from)
        .and_then(|config| Lattice::new(&config));
    into_raw(lattice, MsdHandle)
}

/// A lattice bridged by a copy of `molecule`, its first column at `mol_pos_l`.
///
/// # Safety
/// `molecule` must be null or a live handle from this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_create_with_molecule(
    width: usize,
    height: usize,
    depth: usize,
    molecule: *const MoleculeHandle,
    mol_pos_l: usize,
) -> *mut MsdHandle {
    // SAFETY: forwarded from the caller.
    let Some(graph) = (unsafe { molecule.as_ref() }) else {
        set_last_error(FfiError::Null("molecule").to_string());
        return ptr::null_mut();
    };
    into_raw(
        Lattice::with_molecule(width, height, depth, graph.0.clone(), mol_pos_l),
        MsdHandle,
    )
}

/// # Safety
/// `handle` must be null or a live handle from this library, not used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_destroy(handle: *mut MsdHandle) {
    if !handle.is_null() {
        // SAFETY: created by `Box::into_raw` in this library.
        drop(unsafe { Box::from_raw(handle) });
    }
}

// ----- parameters and state -----

/// # Safety
/// Pointers must be null or valid; `out` must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_parameters(
    handle: *const MsdHandle,
    out: *mut MsdParameters,
) -> i32 {
    guard(|| unsafe {
        let p = lattice(handle)?.parameters();
        *deref_mut(out, "output")? = p.into();
        Ok(())
    })
}

/// Replaces every lattice-level coefficient and rebuilds the aggregates.
///
/// # Safety
/// Pointers must be null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_set_parameters(
    handle: *mut MsdHandle,
    parameters: *const MsdParameters,
) -> i32 {
    guard(|| unsafe {
        let p = *deref(parameters, "parameters")?;
        lattice_mut(handle)?.set_parameters(p.into());
        Ok(())
    })
}

/// # Safety
/// Pointers must be null or valid; `out` must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_results(handle: *const MsdHandle, out: *mut MsdResults) -> i32 {
    guard(|| unsafe {
        let results = lattice(handle)?.results();
        *deref_mut(out, "output")? = results.into();
        Ok(())
    })
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_set_kt(handle: *mut MsdHandle, kt: f64) -> i32 {
    guard(|| unsafe {
        lattice_mut(handle)?.set_kt(kt);
        Ok(())
    })
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_set_b(handle: *mut MsdHandle, b: MsdVector) -> i32 {
    guard(|| unsafe {
        lattice_mut(handle)?.set_b(b.into());
        Ok(())
    })
}

/// Applies uniform coefficients to every molecule node and edge.
///
/// # Safety
/// Pointers must be null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_set_mol_parameters(
    handle: *mut MsdHandle,
    node: *const MsdNodeParameters,
    edge: *const MsdEdgeParameters,
) -> i32 {
    guard(|| unsafe {
        let node = *deref(node, "node parameters")?;
        let edge = *deref(edge, "edge parameters")?;
        lattice_mut(handle)?.set_mol_parameters(node.into(), edge.into());
        Ok(())
    })
}

/// Coefficients of the molecule's first node and first edge. A molecule without edges reports
/// zero edge coefficients; one without nodes is a range error.
///
/// # Safety
/// Pointers must be null or valid; both outputs must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_mol_parameters(
    handle: *const MsdHandle,
    node: *mut MsdNodeParameters,
    edge: *mut MsdEdgeParameters,
) -> i32 {
    guard(|| unsafe {
        let graph = lattice(handle)?.molecule();
        let first_node = graph.node_parameters(0)?;
        let first_edge = graph
            .edge_parameters(0)
            .unwrap_or_else(|_| EdgeParameters::zero());
        let (node, edge) = (deref_mut(node, "node output")?, deref_mut(edge, "edge output")?);
        *node = first_node.into();
        *edge = first_edge.into();
        Ok(())
    })
}

/// Reads one coefficient by its conventional key (`"kT"`, `"B.y"`, `"Jm"`, `"Am.x"`, ...).
///
/// # Safety
/// `handle` must be null or a live handle, `key` null or nul-terminated, `out` writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_parameter(
    handle: *const MsdHandle,
    key: *const c_char,
    out: *mut f64,
) -> i32 {
    guard(|| unsafe {
        let name = self::key(key)?;
        let value = lattice(handle)?
            .parameter_by_name(name)
            .ok_or_else(|| FfiError::Key(name.to_string()))?;
        *deref_mut(out, "output")? = value;
        Ok(())
    })
}

/// Writes one coefficient by its conventional key. Molecule keys apply to every node or edge.
///
/// # Safety
/// `handle` must be null or a live handle and `key` null or nul-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_set_parameter(
    handle: *mut MsdHandle,
    key: *const c_char,
    value: f64,
) -> i32 {
    guard(|| unsafe {
        let name = self::key(key)?;
        lattice_mut(handle)?.set_parameter_by_name(name, value)?;
        Ok(())
    })
}

/// A new molecule handle holding a copy of the lattice's molecule. Null on a null handle.
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_molecule(handle: *const MsdHandle) -> *mut MoleculeHandle {
    match unsafe { lattice(handle) } {
        Ok(lattice) => into_raw(Ok(lattice.molecule().clone()), MoleculeHandle),
        Err(e) => {
            set_last_error(e.to_string());
            ptr::null_mut()
        }
    }
}

/// Replaces the molecule with a copy of `molecule`. Its node count must match the molecule span.
///
/// # Safety
/// Pointers must be null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_set_molecule(
    handle: *mut MsdHandle,
    molecule: *const MoleculeHandle,
) -> i32 {
    guard(|| unsafe {
        let graph = self::molecule(molecule)?.clone();
        lattice_mut(handle)?.set_molecule(graph)?;
        Ok(())
    })
}

/// `MSD_DISCRETE` or `MSD_CONTINUOUS`.
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_set_flipping_algorithm(handle: *mut MsdHandle, algorithm: i32) -> i32 {
    guard(|| unsafe {
        let model = match algorithm {
            MSD_DISCRETE => FlipModel::Discrete,
            MSD_CONTINUOUS => FlipModel::Continuous,
            other => {
                return Err(MsdError::from(ConfigError::InvalidValue {
                    name: "flipping-algorithm",
                    value: other.to_string(),
                })
                .into());
            }
        };
        lattice_mut(handle)?.set_flip_model(model);
        Ok(())
    })
}

// ----- site access -----

macro_rules! site_getters {
    ($($by_index:ident, $by_coords:ident => $getter:ident;)*) => {$(
        /// # Safety
        /// Pointers must be null or valid; `out` must be writable.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $by_index(
            handle: *const MsdHandle,
            index: usize,
            out: *mut MsdVector,
        ) -> i32 {
            guard(|| unsafe {
                let v = lattice(handle)?.$getter(index)?;
                *deref_mut(out, "output")? = v.into();
                Ok(())
            })
        }

        /// # Safety
        /// Pointers must be null or valid; `out` must be writable.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $by_coords(
            handle: *const MsdHandle,
            x: usize,
            y: usize,
            z: usize,
            out: *mut MsdVector,
        ) -> i32 {
            guard(|| unsafe {
                let lattice = lattice(handle)?;
                let v = lattice.$getter(lattice.index(x, y, z)?)?;
                *deref_mut(out, "output")? = v.into();
                Ok(())
            })
        }
    )*};
}

site_getters! {
    msd_get_spin_i, msd_get_spin_c => spin;
    msd_get_flux_i, msd_get_flux_c => flux;
    msd_get_local_m_i, msd_get_local_m_c => local_m;
}

macro_rules! site_setters {
    ($($by_index:ident, $by_coords:ident => $setter:ident;)*) => {$(
        /// # Safety
        /// `handle` must be null or a live handle.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $by_index(
            handle: *mut MsdHandle,
            index: usize,
            value: MsdVector,
        ) -> i32 {
            guard(|| unsafe {
                lattice_mut(handle)?.$setter(index, value.into())?;
                Ok(())
            })
        }

        /// # Safety
        /// `handle` must be null or a live handle.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $by_coords(
            handle: *mut MsdHandle,
            x: usize,
            y: usize,
            z: usize,
            value: MsdVector,
        ) -> i32 {
            guard(|| unsafe {
                let lattice = lattice_mut(handle)?;
                let index = lattice.index(x, y, z)?;
                lattice.$setter(index, value.into())?;
                Ok(())
            })
        }
    )*};
}

site_setters! {
    msd_set_spin_i, msd_set_spin_c => set_spin;
    msd_set_flux_i, msd_set_flux_c => set_flux;
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_set_local_m_i(
    handle: *mut MsdHandle,
    index: usize,
    spin: MsdVector,
    flux: MsdVector,
) -> i32 {
    guard(|| unsafe {
        lattice_mut(handle)?.set_local_m(index, spin.into(), flux.into())?;
        Ok(())
    })
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_set_local_m_c(
    handle: *mut MsdHandle,
    x: usize,
    y: usize,
    z: usize,
    spin: MsdVector,
    flux: MsdVector,
) -> i32 {
    guard(|| unsafe {
        lattice_mut(handle)?.set_local_m_at((x, y, z), spin.into(), flux.into())?;
        Ok(())
    })
}

// ----- geometry -----

/// # Safety
/// Pointers must be null or valid; outputs must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_dimensions(
    handle: *const MsdHandle,
    width: *mut usize,
    height: *mut usize,
    depth: *mut usize,
) -> i32 {
    guard(|| unsafe {
        let (w, h, d) = lattice(handle)?.dimensions();
        let (width, height, depth) = (
            deref_mut(width, "width")?,
            deref_mut(height, "height")?,
            deref_mut(depth, "depth")?,
        );
        *width = w;
        *height = h;
        *depth = d;
        Ok(())
    })
}

/// # Safety
/// Pointers must be null or valid; outputs must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_mol_pos(
    handle: *const MsdHandle,
    mol_pos_l: *mut usize,
    mol_pos_r: *mut usize,
) -> i32 {
    guard(|| unsafe {
        let (l, r) = lattice(handle)?.mol_pos();
        let (mol_pos_l, mol_pos_r) = (
            deref_mut(mol_pos_l, "molPosL")?,
            deref_mut(mol_pos_r, "molPosR")?,
        );
        *mol_pos_l = l;
        *mol_pos_r = r;
        Ok(())
    })
}

/// # Safety
/// Pointers must be null or valid; outputs must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_inner_bounds(
    handle: *const MsdHandle,
    top_l: *mut usize,
    bottom_l: *mut usize,
    front_r: *mut usize,
    back_r: *mut usize,
) -> i32 {
    guard(|| unsafe {
        let (t, b, f, k) = lattice(handle)?.inner_bounds();
        let (top_l, bottom_l, front_r, back_r) = (
            deref_mut(top_l, "topL")?,
            deref_mut(bottom_l, "bottomL")?,
            deref_mut(front_r, "frontR")?,
            deref_mut(back_r, "backR")?,
        );
        *top_l = t;
        *bottom_l = b;
        *front_r = f;
        *back_r = k;
        Ok(())
    })
}

/// Whether the left lead, the right lead and the molecule each hold any sites.
///
/// # Safety
/// Pointers must be null or valid; outputs must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_regions(
    handle: *const MsdHandle,
    left: *mut bool,
    right: *mut bool,
    molecule: *mut bool,
) -> i32 {
    guard(|| unsafe {
        let lattice = lattice(handle)?;
        let (left, right, molecule) = (
            deref_mut(left, "left")?,
            deref_mut(right, "right")?,
            deref_mut(molecule, "molecule")?,
        );
        *left = lattice.region_exists(Region::Left);
        *right = lattice.region_exists(Region::Right);
        *molecule = lattice.region_exists(Region::Molecule);
        Ok(())
    })
}

/// Number of occupied sites.
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_n(handle: *const MsdHandle) -> usize {
    unsafe { lattice(handle) }.map_or(0, |l| l.n())
}

/// Sites (zones) or bonds (boundary pairs) counted in one region. Region codes follow
/// `L, R, m, mL, mR, LR`.
///
/// # Safety
/// Pointers must be null or valid; `out` must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_region_n(
    handle: *const MsdHandle,
    region_code: u8,
    out: *mut usize,
) -> i32 {
    guard(|| unsafe {
        let count = lattice(handle)?.region_count(region(region_code)?);
        *deref_mut(out, "output")? = count;
        Ok(())
    })
}

// ----- seeding and reset -----

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_seed(handle: *const MsdHandle) -> u64 {
    unsafe { lattice(handle) }.map_or(0, |l| l.seed())
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_set_seed(handle: *mut MsdHandle, seed: u64) -> i32 {
    guard(|| unsafe {
        lattice_mut(handle)?.set_seed(seed);
        Ok(())
    })
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_reinitialize(handle: *mut MsdHandle, reseed: bool) -> i32 {
    guard(|| unsafe {
        lattice_mut(handle)?.reinitialize(reseed);
        Ok(())
    })
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_randomize(handle: *mut MsdHandle, reseed: bool) -> i32 {
    guard(|| unsafe {
        lattice_mut(handle)?.randomize(reseed);
        Ok(())
    })
}

// ----- running -----

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_metropolis(handle: *mut MsdHandle, steps: u64) -> i32 {
    guard(|| unsafe {
        lattice_mut(handle)?.metropolis(steps);
        Ok(())
    })
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_metropolis_record(
    handle: *mut MsdHandle,
    steps: u64,
    frequency: u64,
) -> i32 {
    guard(|| unsafe {
        lattice_mut(handle)?.metropolis_recorded(steps, frequency);
        Ok(())
    })
}

// ----- record -----

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_record_len(handle: *const MsdHandle) -> usize {
    unsafe { lattice(handle) }.map_or(0, |l| l.record().len())
}

/// Copies up to `capacity` recorded samples, oldest first, into `out` and stores the number
/// copied in `written`.
///
/// # Safety
/// `out` must be valid for `capacity` writes (or may be null when `capacity` is zero).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_get_record(
    handle: *const MsdHandle,
    out: *mut MsdResults,
    capacity: usize,
    written: *mut usize,
) -> i32 {
    guard(|| unsafe {
        let record = lattice(handle)?.record();
        let written = deref_mut(written, "written")?;
        let n = record.len().min(capacity);
        if n > 0 {
            if out.is_null() {
                return Err(FfiError::Null("output"));
            }
            let out = slice::from_raw_parts_mut(out, n);
            for (slot, sample) in out.iter_mut().zip(record) {
                *slot = (*sample).into();
            }
        }
        *written = n;
        Ok(())
    })
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_clear_record(handle: *mut MsdHandle) -> i32 {
    guard(|| unsafe {
        lattice_mut(handle)?.clear_record();
        Ok(())
    })
}

// ----- statistics -----

/// `Var(U) / (kT^2 N)` over the record. `NaN` on a null handle.
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_specific_heat(handle: *const MsdHandle) -> f64 {
    unsafe { lattice(handle) }.map_or(f64::NAN, |l| l.specific_heat())
}

/// Specific heat of one region. `NaN` on a null handle or an unknown region code.
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_specific_heat_region(handle: *const MsdHandle, region_code: u8) -> f64 {
    match (unsafe { lattice(handle) }, region(region_code)) {
        (Ok(l), Ok(r)) => l.specific_heat_of(r),
        _ => f64::NAN,
    }
}

/// `Var(M) / (kT N)` over the record. `NaN` on a null handle.
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_magnetic_susceptibility(handle: *const MsdHandle) -> f64 {
    unsafe { lattice(handle) }.map_or(f64::NAN, |l| l.magnetic_susceptibility())
}

/// Susceptibility of one zone; boundary regions give 0. `NaN` on a null handle or an unknown
/// region code.
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_magnetic_susceptibility_region(
    handle: *const MsdHandle,
    region_code: u8,
) -> f64 {
    match (unsafe { lattice(handle) }, region(region_code)) {
        (Ok(l), Ok(r)) => l.magnetic_susceptibility_of(r),
        _ => f64::NAN,
    }
}

/// Arithmetic means of every [`MsdResults`] field over the record.
///
/// # Safety
/// Pointers must be null or valid; `out` must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn msd_mean_results(handle: *const MsdHandle, out: *mut MsdResults) -> i32 {
    guard(|| unsafe {
        let means = lattice(handle)?.mean_results();
        *deref_mut(out, "output")? = means.into();
        Ok(())
    })
}

// ----- molecules -----

/// Opaque molecule handle.
pub struct MoleculeHandle(MoleculeGraph);

/// An empty molecule.
#[unsafe(no_mangle)]
pub extern "C" fn mol_create() -> *mut MoleculeHandle {
    into_raw(Ok(MoleculeGraph::new()), MoleculeHandle)
}

unsafe fn parameters_or_default(
    node: *const MsdNodeParameters,
    edge: *const MsdEdgeParameters,
) -> (NodeParameters, EdgeParameters) {
    // SAFETY: forwarded from the caller.
    let node = unsafe { node.as_ref() }.map_or_else(NodeParameters::default, |p| (*p).into());
    let edge = unsafe { edge.as_ref() }.map_or_else(EdgeParameters::default, |p| (*p).into());
    (node, edge)
}

/// A chain of `nodes` nodes. Null parameter pointers select the defaults.
///
/// # Safety
/// Parameter pointers must be null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_create_linear(
    nodes: usize,
    node: *const MsdNodeParameters,
    edge: *const MsdEdgeParameters,
) -> *mut MoleculeHandle {
    let (node, edge) = unsafe { parameters_or_default(node, edge) };
    into_raw(Ok(MoleculeGraph::linear_with(nodes, node, edge)), MoleculeHandle)
}

/// A ring of `nodes` nodes. Null parameter pointers select the defaults.
///
/// # Safety
/// Parameter pointers must be null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_create_circular(
    nodes: usize,
    node: *const MsdNodeParameters,
    edge: *const MsdEdgeParameters,
) -> *mut MoleculeHandle {
    let (node, edge) = unsafe { parameters_or_default(node, edge) };
    into_raw(Ok(MoleculeGraph::circular_with(nodes, node, edge)), MoleculeHandle)
}

/// # Safety
/// `handle` must be null or a live handle from this library, not used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_destroy(handle: *mut MoleculeHandle) {
    if !handle.is_null() {
        // SAFETY: created by `Box::into_raw` in this library.
        drop(unsafe { Box::from_raw(handle) });
    }
}

/// Appends a node and returns its index, or `MSD_NOT_FOUND` on a null handle. A null
/// `parameters` selects the defaults.
///
/// # Safety
/// Pointers must be null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_create_node(
    handle: *mut MoleculeHandle,
    parameters: *const MsdNodeParameters,
) -> usize {
    let Ok(graph) = (unsafe { molecule_mut(handle) }) else {
        return MSD_NOT_FOUND;
    };
    let (node, _) = unsafe { parameters_or_default(parameters, ptr::null()) };
    graph.create_node(node)
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_node_count(handle: *const MoleculeHandle) -> usize {
    unsafe { molecule(handle) }.map_or(0, |g| g.node_count())
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_edge_count(handle: *const MoleculeHandle) -> usize {
    unsafe { molecule(handle) }.map_or(0, |g| g.edge_count())
}

/// Adds the edge `a -> b`. A null `parameters` selects the defaults; the new edge index is
/// stored in `edge` unless it is null.
///
/// # Safety
/// Pointers must be null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_connect_nodes(
    handle: *mut MoleculeHandle,
    a: usize,
    b: usize,
    parameters: *const MsdEdgeParameters,
    edge: *mut usize,
) -> i32 {
    guard(|| unsafe {
        let (_, parameters) = parameters_or_default(ptr::null(), parameters);
        let index = molecule_mut(handle)?.connect_nodes(a, b, parameters)?;
        if let Some(edge) = edge.as_mut() {
            *edge = index;
        }
        Ok(())
    })
}

/// Index of the edge joining `a` and `b` in either direction, or `MSD_NOT_FOUND`.
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_edge_index(handle: *const MoleculeHandle, a: usize, b: usize) -> usize {
    unsafe { molecule(handle) }
        .ok()
        .and_then(|g| g.edge_index(a, b))
        .unwrap_or(MSD_NOT_FOUND)
}

/// # Safety
/// Pointers must be null or valid; `out` must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_get_node_parameters(
    handle: *const MoleculeHandle,
    node: usize,
    out: *mut MsdNodeParameters,
) -> i32 {
    guard(|| unsafe {
        let p = molecule(handle)?.node_parameters(node)?;
        *deref_mut(out, "output")? = p.into();
        Ok(())
    })
}

/// # Safety
/// Pointers must be null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_set_node_parameters(
    handle: *mut MoleculeHandle,
    node: usize,
    parameters: *const MsdNodeParameters,
) -> i32 {
    guard(|| unsafe {
        let p = *deref(parameters, "parameters")?;
        molecule_mut(handle)?.set_node_parameters(node, p.into())?;
        Ok(())
    })
}

/// # Safety
/// Pointers must be null or valid; `out` must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_get_edge_parameters(
    handle: *const MoleculeHandle,
    edge: usize,
    out: *mut MsdEdgeParameters,
) -> i32 {
    guard(|| unsafe {
        let p = molecule(handle)?.edge_parameters(edge)?;
        *deref_mut(out, "output")? = p.into();
        Ok(())
    })
}

/// # Safety
/// Pointers must be null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_set_edge_parameters(
    handle: *mut MoleculeHandle,
    edge: usize,
    parameters: *const MsdEdgeParameters,
) -> i32 {
    guard(|| unsafe {
        let p = *deref(parameters, "parameters")?;
        molecule_mut(handle)?.set_edge_parameters(edge, p.into())?;
        Ok(())
    })
}

/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_set_leads(handle: *mut MoleculeHandle, left: usize, right: usize) -> i32 {
    guard(|| unsafe {
        molecule_mut(handle)?.set_leads(left, right)?;
        Ok(())
    })
}

/// # Safety
/// Pointers must be null or valid; outputs must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_get_leads(
    handle: *const MoleculeHandle,
    left: *mut usize,
    right: *mut usize,
) -> i32 {
    guard(|| unsafe {
        let (l, r) = molecule(handle)?.leads();
        let (left, right) = (deref_mut(left, "left")?, deref_mut(right, "right")?);
        *left = l;
        *right = r;
        Ok(())
    })
}

/// Exact number of bytes [`mol_serialize`] writes. 0 on a null handle.
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_serialization_size(handle: *const MoleculeHandle) -> usize {
    unsafe { molecule(handle) }.map_or(0, |g| g.serialization_size())
}

/// Writes the binary form into `buffer`, which must hold [`mol_serialization_size`] bytes.
///
/// # Safety
/// `buffer` must be valid for `capacity` bytes of writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_serialize(
    handle: *const MoleculeHandle,
    buffer: *mut u8,
    capacity: usize,
) -> i32 {
    guard(|| unsafe {
        let bytes = molecule(handle)?.serialize();
        if bytes.len() > capacity {
            return Err(FfiError::Capacity {
                needed: bytes.len(),
                capacity,
            });
        }
        if buffer.is_null() {
            return Err(FfiError::Null("buffer"));
        }
        ptr::copy_nonoverlapping(bytes.as_ptr(), buffer, bytes.len());
        Ok(())
    })
}

/// Replaces the molecule with the one decoded from `buffer`. On a format error the molecule is
/// left unchanged.
///
/// # Safety
/// `buffer` must be valid for `len` bytes of reads.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mol_deserialize(
    handle: *mut MoleculeHandle,
    buffer: *const u8,
    len: usize,
) -> i32 {
    guard(|| unsafe {
        let graph = molecule_mut(handle)?;
        if buffer.is_null() {
            return Err(FfiError::Null("buffer"));
        }
        graph.deserialize(slice::from_raw_parts(buffer, len))?;
        Ok(())
    })
}
