//! C-ABI wrapper around `petfeed-core`.
//!
//! # Overview
//! Runs the pet list pipeline inside a library-owned tokio runtime and exposes
//! it through `extern "C"` functions, so a host UI in any language with a C
//! FFI can drive the list, react to navigation and show photos without
//! touching Rust's async machinery.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - The host polls: snapshot readers (`petfeed_sections`,
//!   `petfeed_loading_state`, `petfeed_details`) copy the current signal
//!   values, event readers (`petfeed_next_navigation`, `petfeed_take_toast`)
//!   drain one pending event, and `petfeed_wait_idle` / `petfeed_photo` block
//!   the calling thread with a timeout.
//! - Location is pushed in by the host and read at the start of every pass.
//! - The caller owns all returned pointers and must call the matching
//!   `petfeed_free_*` function to release them.

pub mod types;

use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::null_mut;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use petfeed_core::{
    ApiError, CachedMediaService, ClientConfig, HttpTransport, Location, LocationError, MemoryImageCache,
    Navigator, NetworkService, PetListPipeline, PetfinderClient, UreqTransport,
};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, warn};

use types::*;

const WORKER_THREADS: usize = 2;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Feed lifecycle
// ---------------------------------------------------------------------------

/// Start a pet feed with explicit configuration.
///
/// `location` may be null, in which case passes run without a location until
/// `petfeed_set_location` is called. Returns null if `config` is null or
/// invalid, or if the runtime cannot be started.
/// The caller must free the returned pointer with `petfeed_free`.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_new(config: *const FfiConfig, location: *const FfiLocation) -> *mut FfiPetFeed {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(raw) = (unsafe { config.as_ref() }) else {
            return null_mut();
        };
        match unsafe { config_from_ffi(raw) } {
            Ok(config) => start(config, unsafe { initial_location(location) }),
            Err(err) => {
                warn!(error = %err, "rejected feed configuration");
                null_mut()
            }
        }
    }))
    .unwrap_or(null_mut())
}

/// Start a pet feed configured from `petfeed.toml` and `PETFEED_*`
/// environment variables. `location` may be null.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_new_from_env(location: *const FfiLocation) -> *mut FfiPetFeed {
    catch_unwind(AssertUnwindSafe(|| match ClientConfig::load() {
        Ok(config) => start(config, unsafe { initial_location(location) }),
        Err(err) => {
            warn!(error = %err, "failed to load feed configuration");
            null_mut()
        }
    }))
    .unwrap_or(null_mut())
}

/// Stop a feed created by `petfeed_new*`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_free(feed: *mut FfiPetFeed) {
    if feed.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let FfiPetFeed { pipeline, runtime, .. } = *unsafe { Box::from_raw(feed) };
        drop(pipeline);
        runtime.shutdown_timeout(SHUTDOWN_GRACE);
    }));
}

/// Build a `ClientConfig` from caller-owned C strings.
///
/// # Safety
/// The string pointers in `raw` must be null or valid NUL-terminated strings.
unsafe fn config_from_ffi(raw: &FfiConfig) -> Result<ClientConfig, ApiError> {
    let client_id = unsafe { read_str(raw.client_id) }
        .ok_or_else(|| ApiError::Config("client_id is null or not UTF-8".to_string()))?;
    let client_secret = unsafe { read_str(raw.client_secret) }
        .ok_or_else(|| ApiError::Config("client_secret is null or not UTF-8".to_string()))?;

    let mut config = ClientConfig::new(client_id, client_secret);
    if let Some(url) = unsafe { read_str(raw.api_base_url) } {
        config = config.with_api_base_url(url);
    }
    if raw.request_timeout_secs > 0 {
        config.request_timeout_secs = u64::from(raw.request_timeout_secs);
    }
    config.validate()?;
    Ok(config)
}

/// # Safety
/// `location` must be null or point to a valid `FfiLocation`.
unsafe fn initial_location(location: *const FfiLocation) -> Result<Location, LocationError> {
    match unsafe { location.as_ref() } {
        Some(location) => Ok(Location::from(*location)),
        None => Err(no_location()),
    }
}

fn no_location() -> LocationError {
    LocationError::Unavailable("no location provided by host".to_string())
}

fn start(config: ClientConfig, location: Result<Location, LocationError>) -> *mut FfiPetFeed {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(WORKER_THREADS)
        .thread_name("petfeed-worker")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            warn!(error = %err, "failed to start feed runtime");
            return null_mut();
        }
    };

    let transport: Arc<dyn HttpTransport> = Arc::new(UreqTransport::new(config.request_timeout()));
    let catalog = Arc::new(PetfinderClient::from_config(&config, transport.clone()));
    let media = Arc::new(CachedMediaService::new(
        NetworkService::new(transport),
        Arc::new(MemoryImageCache::new()),
    ));
    let location = Arc::new(HostLocationProvider::new(location));
    let navigator = Arc::new(Navigator::new());
    let navigation = navigator.source_event().subscribe();

    let pipeline = {
        let _guard = runtime.enter();
        PetListPipeline::spawn(catalog, location.clone(), media, navigator)
    };
    let toast = pipeline.toast().subscribe();

    info!(api_base_url = %config.api_base_url, "pet feed started");
    Box::into_raw(Box::new(FfiPetFeed {
        pipeline,
        location,
        navigation: Mutex::new(navigation),
        toast: Mutex::new(toast),
        runtime,
    }))
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Replace the location used by subsequent passes. Does not reload.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_set_location(feed: *const FfiPetFeed, location: FfiLocation) -> FfiStatus {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(feed) = (unsafe { feed.as_ref() }) else {
            return FfiStatus::NullArg;
        };
        if !location.latitude.is_finite() || !location.longitude.is_finite() {
            return FfiStatus::InvalidArg;
        }
        feed.location.set(Ok(location.into()));
        FfiStatus::Ok
    }))
    .unwrap_or(FfiStatus::Panic)
}

/// Report that the host cannot determine a location. `denied` selects the
/// permission error; otherwise `message` (nullable) describes the failure.
/// Does not reload.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_set_location_error(
    feed: *const FfiPetFeed,
    denied: bool,
    message: *const c_char,
) -> FfiStatus {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(feed) = (unsafe { feed.as_ref() }) else {
            return FfiStatus::NullArg;
        };
        let error = if denied {
            LocationError::PermissionDenied
        } else {
            match unsafe { read_str(message) } {
                Some(message) => LocationError::Unavailable(message.to_string()),
                None => no_location(),
            }
        };
        feed.location.set(Err(error));
        FfiStatus::Ok
    }))
    .unwrap_or(FfiStatus::Panic)
}

/// Request another pass. Requests made while a pass runs coalesce.
///
/// The pass counts as pending as soon as this returns, so a following
/// `petfeed_wait_idle` waits for its results.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_reload(feed: *const FfiPetFeed) -> FfiStatus {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(feed) = (unsafe { feed.as_ref() }) else {
            return FfiStatus::NullArg;
        };
        feed.pipeline.reload();
        FfiStatus::Ok
    }))
    .unwrap_or(FfiStatus::Panic)
}

/// Select the listed pet with `pet_id`, emitting a navigation event.
///
/// Returns false if `feed` is null or no listed pet has that id.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_select(feed: *const FfiPetFeed, pet_id: i64) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(feed) = (unsafe { feed.as_ref() }) else {
            return false;
        };
        match feed.pipeline.item(pet_id) {
            Some(item) => {
                feed.pipeline.select(item);
                true
            }
            None => {
                debug!(pet_id, "select ignored, pet not listed");
                false
            }
        }
    }))
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Block until the most recently requested pass has published both its
/// sections and its loading state, or `timeout_ms` elapses.
///
/// Returns true if the feed is idle. Must not be called from a thread that
/// is already running a tokio runtime.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_wait_idle(feed: *const FfiPetFeed, timeout_ms: u64) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(feed) = (unsafe { feed.as_ref() }) else {
            return false;
        };
        feed.runtime.block_on(async {
            tokio::time::timeout(Duration::from_millis(timeout_ms), feed.pipeline.settled())
                .await
                .is_ok()
        })
    }))
    .unwrap_or(false)
}

/// Snapshot of the loading state.
/// The caller must free the result with `petfeed_free_loading_state`.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_loading_state(feed: *const FfiPetFeed) -> *mut FfiLoadingState {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(feed) = (unsafe { feed.as_ref() }) else {
            return null_mut();
        };
        FfiLoadingState::from_core(&feed.pipeline.loading_state().get())
    }))
    .unwrap_or(null_mut())
}

/// Snapshot of the sectioned pet list.
/// The caller must free the result with `petfeed_free_sections`.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_sections(feed: *const FfiPetFeed) -> *mut FfiSectionList {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(feed) = (unsafe { feed.as_ref() }) else {
            return null_mut();
        };
        FfiSectionList::from_core(&feed.pipeline.sections().get())
    }))
    .unwrap_or(null_mut())
}

/// Take the next pending navigation event, or null if there is none.
/// The caller must free the result with `petfeed_free_navigation`.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_next_navigation(feed: *const FfiPetFeed) -> *mut FfiNavigation {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(feed) = (unsafe { feed.as_ref() }) else {
            return null_mut();
        };
        let mut events = feed.navigation.lock();
        loop {
            match events.try_recv() {
                Ok(source) => return FfiNavigation::from_core(&source),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "navigation events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return null_mut(),
            }
        }
    }))
    .unwrap_or(null_mut())
}

/// Take the latest unread toast message, or null if there is none.
/// The caller must free the result with `petfeed_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_take_toast(feed: *const FfiPetFeed) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(feed) = (unsafe { feed.as_ref() }) else {
            return null_mut();
        };
        let message = feed.toast.lock().try_recv();
        opt_c_string(message)
    }))
    .unwrap_or(null_mut())
}

/// Details for the most recently selected pet, or null if none was selected.
/// The caller must free the result with `petfeed_free_details`.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_details(feed: *const FfiPetFeed) -> *mut FfiPetDetails {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(feed) = (unsafe { feed.as_ref() }) else {
            return null_mut();
        };
        feed.pipeline
            .navigator()
            .destination_data()
            .latest()
            .as_ref()
            .and_then(|destination| destination.pet_item())
            .map(FfiPetDetails::from_core)
            .unwrap_or(null_mut())
    }))
    .unwrap_or(null_mut())
}

/// Block until the thumbnail of the listed pet `pet_id` is available, or
/// `timeout_ms` elapses.
///
/// Returns null on timeout, for unlisted pets, and for pets without a photo.
/// The caller must free the result with `petfeed_free_image`.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_photo(feed: *const FfiPetFeed, pet_id: i64, timeout_ms: u64) -> *mut FfiImage {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(feed) = (unsafe { feed.as_ref() }) else {
            return null_mut();
        };
        let Some(item) = feed.pipeline.item(pet_id) else {
            return null_mut();
        };
        let photo = item.photo();
        if let Some(image) = photo.peek() {
            return FfiImage::from_core(&image);
        }
        feed.runtime
            .block_on(tokio::time::timeout(Duration::from_millis(timeout_ms), photo.recv()))
            .map(|image| FfiImage::from_core(&image))
            .unwrap_or(null_mut())
    }))
    .unwrap_or(null_mut())
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free a result of `petfeed_loading_state`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_free_loading_state(state: *mut FfiLoadingState) {
    if state.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let state = unsafe { Box::from_raw(state) };
        free_c_string(state.state);
        free_c_string(state.message);
    }));
}

/// Free a result of `petfeed_sections`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_free_sections(list: *mut FfiSectionList) {
    if list.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| unsafe { FfiSectionList::free(list) }));
}

/// Free a result of `petfeed_next_navigation`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_free_navigation(navigation: *mut FfiNavigation) {
    if navigation.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let navigation = unsafe { Box::from_raw(navigation) };
        free_c_string(navigation.source);
        free_c_string(navigation.segue);
    }));
}

/// Free a result of `petfeed_details`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_free_details(details: *mut FfiPetDetails) {
    if details.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| unsafe { FfiPetDetails::free(details) }));
}

/// Free a result of `petfeed_photo`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_free_image(image: *mut FfiImage) {
    if image.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| unsafe { FfiImage::free(image) }));
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn petfeed_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
