//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, pointer + length pairs instead of
//! `Vec`, and enums with explicit discriminants. Arrays are handed out as
//! boxed slices so the matching free function can rebuild them exactly.
//! Conversion functions live here to keep `lib.rs` focused on the
//! `extern "C"` surface.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use petfeed_core::details::{self, DetailItem};
use petfeed_core::navigation::NavigationSource;
use petfeed_core::pipeline::{DistanceFormat, PetListItem};
use petfeed_core::signal::ReplaySubscriber;
use petfeed_core::{
    Image, LoadingState, Location, LocationError, LocationProvider, PetListPipeline, PetSection,
};
use tokio::runtime::Runtime;
use tokio::sync::broadcast;

/// Opaque handle to a running pet feed. C callers receive a pointer to this
/// and pass it back into every FFI function.
///
/// Field order matters: the pipeline's tasks are aborted before the runtime
/// that runs them shuts down.
pub struct FfiPetFeed {
    pub(crate) pipeline: PetListPipeline,
    pub(crate) location: Arc<HostLocationProvider>,
    pub(crate) navigation: Mutex<broadcast::Receiver<NavigationSource>>,
    pub(crate) toast: Mutex<ReplaySubscriber<String>>,
    pub(crate) runtime: Runtime,
}

/// Location pushed in by the host; read at the start of every pass.
#[derive(Debug)]
pub struct HostLocationProvider {
    current: Mutex<Result<Location, LocationError>>,
}

impl HostLocationProvider {
    pub(crate) fn new(initial: Result<Location, LocationError>) -> Self {
        Self {
            current: Mutex::new(initial),
        }
    }

    pub(crate) fn set(&self, value: Result<Location, LocationError>) {
        *self.current.lock() = value;
    }
}

#[async_trait]
impl LocationProvider for HostLocationProvider {
    async fn location(&self) -> Result<Location, LocationError> {
        self.current.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// Inputs (caller-provided, read but never freed by us)
// ---------------------------------------------------------------------------

/// Client configuration. `api_base_url` may be null for the production API;
/// `request_timeout_secs` of 0 selects the default.
#[repr(C)]
pub struct FfiConfig {
    pub api_base_url: *const c_char,
    pub client_id: *const c_char,
    pub client_secret: *const c_char,
    pub request_timeout_secs: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<FfiLocation> for Location {
    fn from(value: FfiLocation) -> Self {
        Location::new(value.latitude, value.longitude)
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Outcome of calls that return no data.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatus {
    Ok = 0,
    NullArg = 1,
    InvalidArg = 2,
    Panic = 3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiLoadingKind {
    Loading = 0,
    Loaded = 1,
    Error = 2,
}

/// Snapshot of the list's loading state. `state` and `message` may be null.
#[repr(C)]
pub struct FfiLoadingState {
    pub kind: FfiLoadingKind,
    pub empty: bool,
    pub has_activity: bool,
    pub state: *mut c_char,
    pub message: *mut c_char,
}

impl FfiLoadingState {
    pub(crate) fn from_core(state: &LoadingState) -> *mut Self {
        let (kind, empty) = match state {
            LoadingState::Loading => (FfiLoadingKind::Loading, false),
            LoadingState::Loaded { empty } => (FfiLoadingKind::Loaded, *empty),
            LoadingState::Error { .. } => (FfiLoadingKind::Error, false),
        };
        Box::into_raw(Box::new(FfiLoadingState {
            kind,
            empty,
            has_activity: state.has_activity(),
            state: opt_c_string(state.state()),
            message: opt_c_string(state.message()),
        }))
    }
}

/// One row of the pet list. Nullable fields: `distance_text`, `gender`,
/// `breed`; `distance` is only meaningful when `has_distance` is set.
#[repr(C)]
pub struct FfiPetItem {
    pub id: i64,
    pub name: *mut c_char,
    pub species: *mut c_char,
    pub emoji: *mut c_char,
    pub detail_text: *mut c_char,
    pub distance_text: *mut c_char,
    pub has_distance: bool,
    pub distance: f64,
    pub size: *mut c_char,
    pub status: *mut c_char,
    pub gender: *mut c_char,
    pub breed: *mut c_char,
    pub has_photo: bool,
}

impl FfiPetItem {
    fn from_core(item: &PetListItem) -> Self {
        let pet = &item.pet;
        FfiPetItem {
            id: pet.id,
            name: c_string(pet.name.as_str()),
            species: c_string(pet.species.as_str()),
            emoji: c_string(item.emoji()),
            detail_text: c_string(item.detail_text()),
            distance_text: opt_c_string(item.distance_text(DistanceFormat::Short)),
            has_distance: pet.distance.is_some(),
            distance: pet.distance.unwrap_or(0.0),
            size: c_string(pet.size.as_str()),
            status: c_string(pet.status.as_str()),
            gender: opt_c_string(pet.gender.map(|g| g.as_str())),
            breed: opt_c_string(pet.breed.as_ref().map(|b| b.to_string())),
            has_photo: pet.thumbnail_url().is_some(),
        }
    }

    fn free_fields(&self) {
        for ptr in [
            self.name,
            self.species,
            self.emoji,
            self.detail_text,
            self.distance_text,
            self.size,
            self.status,
            self.gender,
            self.breed,
        ] {
            free_c_string(ptr);
        }
    }
}

#[repr(C)]
pub struct FfiSection {
    pub label: *mut c_char,
    pub items: *mut FfiPetItem,
    pub len: u32,
}

#[repr(C)]
pub struct FfiSectionList {
    pub sections: *mut FfiSection,
    pub len: u32,
}

impl FfiSectionList {
    pub(crate) fn from_core(sections: &[PetSection]) -> *mut Self {
        let sections: Vec<FfiSection> = sections
            .iter()
            .map(|section| {
                let items: Vec<FfiPetItem> = section.items.iter().map(FfiPetItem::from_core).collect();
                let (items, len) = into_raw_slice(items);
                FfiSection {
                    label: c_string(section.key.as_str()),
                    items,
                    len,
                }
            })
            .collect();
        let (sections, len) = into_raw_slice(sections);
        Box::into_raw(Box::new(FfiSectionList { sections, len }))
    }

    /// # Safety
    /// `list` must come from `from_core` and not have been freed.
    pub(crate) unsafe fn free(list: *mut Self) {
        let list = unsafe { Box::from_raw(list) };
        for section in unsafe { from_raw_slice(list.sections, list.len) }.iter() {
            free_c_string(section.label);
            for item in unsafe { from_raw_slice(section.items, section.len) }.iter() {
                item.free_fields();
            }
        }
    }
}

/// A navigation event: which screen should perform which segue, and for
/// which pet.
#[repr(C)]
pub struct FfiNavigation {
    pub source: *mut c_char,
    pub segue: *mut c_char,
    pub pet_id: i64,
}

impl FfiNavigation {
    pub(crate) fn from_core(source: &NavigationSource) -> *mut Self {
        let transition = source.transition();
        let segue = match transition.style {
            petfeed_core::navigation::Style::Segue(id) => id.as_str(),
        };
        let pet_id = source
            .destination()
            .pet_item()
            .map(|item| item.pet.id)
            .unwrap_or_default();
        Box::into_raw(Box::new(FfiNavigation {
            source: c_string(transition.source.as_str()),
            segue: c_string(segue),
            pet_id,
        }))
    }
}

#[repr(C)]
pub struct FfiKeyValue {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// Details screen content for the most recently selected pet.
#[repr(C)]
pub struct FfiPetDetails {
    pub title: *mut c_char,
    pub header: FfiPetItem,
    pub rows: *mut FfiKeyValue,
    pub rows_len: u32,
}

impl FfiPetDetails {
    pub(crate) fn from_core(item: &PetListItem) -> *mut Self {
        let (title, sections) = details::project(item);
        let rows: Vec<FfiKeyValue> = sections
            .iter()
            .flat_map(|section| section.items.iter())
            .filter_map(|row| match row {
                DetailItem::KeyValue { key, value } => Some(FfiKeyValue {
                    key: c_string(key.as_str()),
                    value: c_string(value.as_str()),
                }),
                DetailItem::Header(_) => None,
            })
            .collect();
        let (rows, rows_len) = into_raw_slice(rows);
        Box::into_raw(Box::new(FfiPetDetails {
            title: c_string(title),
            header: FfiPetItem::from_core(item),
            rows,
            rows_len,
        }))
    }

    /// # Safety
    /// `details` must come from `from_core` and not have been freed.
    pub(crate) unsafe fn free(details: *mut Self) {
        let details = unsafe { Box::from_raw(details) };
        free_c_string(details.title);
        details.header.free_fields();
        for row in unsafe { from_raw_slice(details.rows, details.rows_len) }.iter() {
            free_c_string(row.key);
            free_c_string(row.value);
        }
    }
}

/// Decoded RGBA8 pixels, row-major, `width * height * 4` bytes.
#[repr(C)]
pub struct FfiImage {
    pub width: u32,
    pub height: u32,
    pub pixels: *mut u8,
    pub len: usize,
}

impl FfiImage {
    pub(crate) fn from_core(image: &Image) -> *mut Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let pixels = rgba.into_raw().into_boxed_slice();
        let len = pixels.len();
        Box::into_raw(Box::new(FfiImage {
            width,
            height,
            pixels: Box::into_raw(pixels) as *mut u8,
            len,
        }))
    }

    /// # Safety
    /// `image` must come from `from_core` and not have been freed.
    pub(crate) unsafe fn free(image: *mut Self) {
        let image = unsafe { Box::from_raw(image) };
        if !image.pixels.is_null() {
            drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(image.pixels, image.len)) });
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Allocate a C string. Interior NULs yield an empty string.
pub(crate) fn c_string(s: impl Into<Vec<u8>>) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

pub(crate) fn opt_c_string<S: Into<Vec<u8>>>(s: Option<S>) -> *mut c_char {
    s.map(c_string).unwrap_or(std::ptr::null_mut())
}

pub(crate) fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Borrow a C string as UTF-8. Null or invalid input yields `None`.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn read_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

fn into_raw_slice<T>(items: Vec<T>) -> (*mut T, u32) {
    if items.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let len = items.len() as u32;
    (Box::into_raw(items.into_boxed_slice()) as *mut T, len)
}

/// Reclaim a slice produced by `into_raw_slice`.
///
/// # Safety
/// `ptr`/`len` must come from `into_raw_slice` and not have been reclaimed.
unsafe fn from_raw_slice<T>(ptr: *mut T, len: u32) -> Box<[T]> {
    if ptr.is_null() {
        return Box::new([]);
    }
    unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len as usize)) }
}
