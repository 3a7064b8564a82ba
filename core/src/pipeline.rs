//! Aggregation pipeline for the pet list screen.
//!
//! # Overview
//! `PetListPipeline::spawn` starts a driver task and two observer tasks:
//! 1. The driver asks the location provider for a coordinate. A failure is
//!    turned into a toast and the pass continues without a location.
//! 2. The driver requests the pet list once with that (optional) location
//!    and broadcasts the outcome, success or failure, on one channel.
//! 3. The sections observer turns every successful list into sorted,
//!    bucketed `PetListItem`s. Failures leave the sections untouched.
//! 4. The loading observer projects the same channel into `LoadingState`.
//!
//! A reload request runs another pass; every pass starts from `Loading`.
//! Passes are numbered. Each observer publishes the number of the last pass
//! it applied, and `settled` waits until both have caught up with the most
//! recently requested one.
//!
//! # Ordering
//! Items with a distance come first, nearest first; items without one
//! follow, by name. Equal distances fall back to name and then id, so the
//! order is total. Sections are then formed by one adjacent-merge pass.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::catalog::PetCatalog;
use crate::error::ApiError;
use crate::location::LocationProvider;
use crate::media::{MediaService, PhotoStream};
use crate::navigation::{NavigationSource, Navigator, PetListEvent};
use crate::pet::Pet;
use crate::signal::{ReplayRelay, Signal};

/// Upper bounds, in miles, of the distance buckets.
pub const DISTANCE_CLASSES: [u32; 6] = [2, 5, 10, 20, 50, 100];

pub const UNKNOWN_LOCATION: &str = "unknown location";

const PASS_CHANNEL_CAPACITY: usize = 16;

const FIRST_PASS: u64 = 1;

/// A labelled run of adjacent items.
#[derive(Debug, Clone, PartialEq)]
pub struct Section<K, T> {
    pub key: K,
    pub items: Vec<T>,
}

pub type PetSection = Section<String, PetListItem>;

/// Something that can be grouped into sections.
pub trait Sectionable {
    type Key: PartialEq;

    fn section_key(&self) -> Self::Key;
}

/// Group an already ordered sequence. Only adjacent equal keys merge.
pub fn sectioned<T, I>(items: I) -> Vec<Section<T::Key, T>>
where
    T: Sectionable,
    I: IntoIterator<Item = T>,
{
    let mut sections: Vec<Section<T::Key, T>> = Vec::new();
    for item in items {
        let key = item.section_key();
        match sections.last_mut() {
            Some(last) if last.key == key => last.items.push(item),
            _ => sections.push(Section { key, items: vec![item] }),
        }
    }
    sections
}

/// Bucket label for a distance in miles.
pub fn distance_bucket(distance: Option<f64>) -> String {
    let Some(distance) = distance else {
        return UNKNOWN_LOCATION.to_string();
    };
    for class in DISTANCE_CLASSES {
        if distance < f64::from(class) {
            return format!("less than {class} miles away");
        }
    }
    format!("more than {} miles away", DISTANCE_CLASSES[DISTANCE_CLASSES.len() - 1])
}

/// Total order used for the list.
pub fn compare_pets(a: &Pet, b: &Pet) -> Ordering {
    let by_distance = match (a.distance, b.distance) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_distance
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Decimal formatter with grouping and a bounded number of fraction digits.
///
/// Rounds the shortest decimal representation of the value half-to-even,
/// so `0.35` formats as `0.4` and `0.25` as `0.2`, rather than rounding the
/// exact binary value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceFormatter {
    max_fraction_digits: usize,
}

impl DistanceFormatter {
    pub fn new(max_fraction_digits: usize) -> Self {
        Self { max_fraction_digits }
    }

    pub fn format(&self, value: f64) -> String {
        if !value.is_finite() {
            return value.to_string();
        }
        let (int_part, fraction) = round_half_even(&value.abs().to_string(), self.max_fraction_digits);
        let fraction = fraction.trim_end_matches('0');

        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, digit) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(digit);
        }

        let is_zero = int_part.bytes().all(|b| b == b'0') && fraction.is_empty();
        let sign = if value.is_sign_negative() && !is_zero { "-" } else { "" };
        if fraction.is_empty() {
            format!("{sign}{grouped}")
        } else {
            format!("{sign}{grouped}.{fraction}")
        }
    }
}

/// Round a plain decimal string (`"12.345"`) to `digits` fraction digits,
/// ties to even. Returns the integer and fraction parts.
fn round_half_even(decimal: &str, digits: usize) -> (String, String) {
    let (int_part, fraction) = decimal.split_once('.').unwrap_or((decimal, ""));
    if fraction.len() <= digits {
        return (int_part.to_string(), fraction.to_string());
    }

    let (kept, dropped) = fraction.split_at(digits);
    let mut number: Vec<u8> = int_part.bytes().chain(kept.bytes()).collect();
    let round_up = match dropped.as_bytes()[0] {
        b'6'..=b'9' => true,
        b'5' => {
            let exact_tie = dropped.bytes().skip(1).all(|b| b == b'0');
            let last_is_odd = number.last().is_some_and(|d| (d - b'0') % 2 == 1);
            !exact_tie || last_is_odd
        }
        _ => false,
    };

    if round_up {
        let mut carry = true;
        for digit in number.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            number.insert(0, b'1');
        }
    }

    let split = number.len() - digits;
    let to_string = |bytes: &[u8]| bytes.iter().map(|&b| char::from(b)).collect::<String>();
    (to_string(&number[..split]), to_string(&number[split..]))
}

impl Default for DistanceFormatter {
    fn default() -> Self {
        Self::new(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceFormat {
    #[default]
    Short,
    Long,
}

/// One row of the pet list.
#[derive(Clone)]
pub struct PetListItem {
    pub pet: Pet,
    formatter: Arc<DistanceFormatter>,
    photo: PhotoStream,
}

impl PetListItem {
    pub fn new(pet: Pet, formatter: Arc<DistanceFormatter>, photo: PhotoStream) -> Self {
        Self { pet, formatter, photo }
    }

    pub fn photo(&self) -> &PhotoStream {
        &self.photo
    }

    pub fn formatted_distance(&self) -> Option<String> {
        self.pet.distance.map(|d| self.formatter.format(d))
    }

    pub fn distance_text(&self, format: DistanceFormat) -> Option<String> {
        let distance = self.formatted_distance()?;
        Some(match format {
            DistanceFormat::Short => format!("{distance} mi."),
            DistanceFormat::Long => format!("{distance} miles away from you"),
        })
    }

    /// `species: breed`, or just the species when the breed is unknown.
    pub fn detail_text(&self) -> String {
        match &self.pet.breed {
            Some(breed) => format!("{}: {breed}", self.pet.species),
            None => self.pet.species.clone(),
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self.pet.species.to_lowercase().as_str() {
            "cat" => "🐱",
            "dog" => "🐶",
            "parrot" => "🦜",
            "hamster" | "guinea pig" => "🐹",
            "fish" => "🐠",
            "chicken" => "🐔",
            "rabbit" | "bunny" => "🐰",
            _ => "🐾",
        }
    }
}

impl PartialEq for PetListItem {
    fn eq(&self, other: &Self) -> bool {
        self.pet == other.pet
    }
}

impl fmt::Debug for PetListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PetListItem")
            .field("pet", &self.pet)
            .field("photo", &self.photo)
            .finish()
    }
}

impl Sectionable for PetListItem {
    type Key = String;

    fn section_key(&self) -> String {
        distance_bucket(self.pet.distance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingState {
    Loading,
    Loaded { empty: bool },
    Error { message: String },
}

impl LoadingState {
    pub fn has_activity(&self) -> bool {
        matches!(self, LoadingState::Loading)
    }

    /// Headline for the placeholder view; `None` when the list has content.
    pub fn state(&self) -> Option<&'static str> {
        match self {
            LoadingState::Loading => Some("Loading..."),
            LoadingState::Loaded { empty: true } => Some("No items"),
            LoadingState::Loaded { empty: false } => None,
            LoadingState::Error { .. } => Some("Error:"),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            LoadingState::Error { message } => Some(message),
            _ => None,
        }
    }
}

pub fn location_advisory(error: &impl fmt::Display) -> String {
    format!("Error determining your location.\nShowing all pets.\nError info: '{error}'")
}

#[derive(Debug, Clone)]
enum PassEvent {
    Started,
    Finished(u64, Result<Vec<Pet>, ApiError>),
}

/// The running pet list pipeline. Dropping it stops its tasks.
pub struct PetListPipeline {
    sections: Signal<Vec<PetSection>>,
    loading_state: Signal<LoadingState>,
    toast: ReplayRelay<String>,
    navigator: Arc<Navigator>,
    reload: mpsc::UnboundedSender<u64>,
    requested: AtomicU64,
    sections_pass: Signal<u64>,
    state_pass: Signal<u64>,
    tasks: Vec<JoinHandle<()>>,
}

impl PetListPipeline {
    /// Start the pipeline on the current tokio runtime and run the first pass.
    pub fn spawn(
        catalog: Arc<dyn PetCatalog>,
        location: Arc<dyn LocationProvider>,
        media: Arc<dyn MediaService>,
        navigator: Arc<Navigator>,
    ) -> Self {
        let sections = Signal::new(Vec::new());
        let loading_state = Signal::new(LoadingState::Loading);
        let toast = ReplayRelay::new();
        let sections_pass = Signal::new(0);
        let state_pass = Signal::new(0);
        let (reload, reload_rx) = mpsc::unbounded_channel();
        let (passes, _) = broadcast::channel(PASS_CHANNEL_CAPACITY);

        let tasks = vec![
            tokio::spawn(observe_sections(
                passes.subscribe(),
                sections.clone(),
                sections_pass.clone(),
                media,
                Arc::new(DistanceFormatter::default()),
            )),
            tokio::spawn(observe_loading_state(
                passes.subscribe(),
                loading_state.clone(),
                state_pass.clone(),
            )),
            tokio::spawn(drive(catalog, location, toast.clone(), passes, reload_rx)),
        ];

        Self {
            sections,
            loading_state,
            toast,
            navigator,
            reload,
            requested: AtomicU64::new(FIRST_PASS),
            sections_pass,
            state_pass,
            tasks,
        }
    }

    pub fn sections(&self) -> &Signal<Vec<PetSection>> {
        &self.sections
    }

    pub fn loading_state(&self) -> &Signal<LoadingState> {
        &self.loading_state
    }

    pub fn toast(&self) -> &ReplayRelay<String> {
        &self.toast
    }

    pub fn navigator(&self) -> &Arc<Navigator> {
        &self.navigator
    }

    /// Route a selected item to its details screen.
    pub fn select(&self, item: PetListItem) {
        self.navigator
            .send(NavigationSource::PetList(PetListEvent::ShowDetails(item)));
    }

    /// Run another pass. Requests made while a pass runs coalesce.
    ///
    /// The pass is registered before this returns, so a following `settled`
    /// waits for it.
    pub fn reload(&self) {
        let pass = self.requested.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let _ = self.reload.send(pass);
    }

    /// Resolve once the sections and the loading state both reflect the most
    /// recently requested pass.
    pub async fn settled(&self) {
        let target = self.requested.load(AtomicOrdering::SeqCst);
        let mut sections = self.sections_pass.subscribe();
        let mut state = self.state_pass.subscribe();
        let _ = sections.wait_for(|pass| *pass >= target).await;
        let _ = state.wait_for(|pass| *pass >= target).await;
    }

    pub fn is_settled(&self) -> bool {
        let target = self.requested.load(AtomicOrdering::SeqCst);
        self.sections_pass.get() >= target && self.state_pass.get() >= target
    }

    /// Look up a listed item by pet id.
    pub fn item(&self, pet_id: i64) -> Option<PetListItem> {
        self.sections
            .get()
            .into_iter()
            .flat_map(|section| section.items)
            .find(|item| item.pet.id == pet_id)
    }
}

impl fmt::Debug for PetListPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PetListPipeline")
            .field("loading_state", &self.loading_state.get())
            .finish_non_exhaustive()
    }
}

impl Drop for PetListPipeline {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn drive(
    catalog: Arc<dyn PetCatalog>,
    location: Arc<dyn LocationProvider>,
    toast: ReplayRelay<String>,
    passes: broadcast::Sender<PassEvent>,
    mut reload: mpsc::UnboundedReceiver<u64>,
) {
    let mut pass = FIRST_PASS;
    loop {
        let _ = passes.send(PassEvent::Started);

        let coordinate = match location.location().await {
            Ok(coordinate) => Some(coordinate),
            Err(err) => {
                warn!(error = %err, "location unavailable, listing all pets");
                toast.send(location_advisory(&err));
                None
            }
        };

        let result = catalog.get_pets(coordinate).await;
        match &result {
            Ok(pets) => debug!(count = pets.len(), "pet list received"),
            Err(err) => warn!(error = %err, "pet list request failed"),
        }
        let _ = passes.send(PassEvent::Finished(pass, result));

        let Some(requested) = reload.recv().await else {
            break;
        };
        pass = requested;
        while let Ok(requested) = reload.try_recv() {
            pass = pass.max(requested);
        }
        debug!(pass, "reload requested");
    }
}

async fn observe_sections(
    mut passes: broadcast::Receiver<PassEvent>,
    sections: Signal<Vec<PetSection>>,
    applied: Signal<u64>,
    media: Arc<dyn MediaService>,
    formatter: Arc<DistanceFormatter>,
) {
    while let Some(event) = next_event(&mut passes).await {
        let (pass, pets) = match event {
            PassEvent::Started => continue,
            PassEvent::Finished(pass, Err(_)) => {
                applied.set(pass);
                continue;
            }
            PassEvent::Finished(pass, Ok(pets)) => (pass, pets),
        };
        let mut items: Vec<PetListItem> = pets
            .into_iter()
            .map(|pet| {
                let photo = media.get_photo(pet.thumbnail_url());
                PetListItem::new(pet, formatter.clone(), photo)
            })
            .collect();
        items.sort_by(|a, b| compare_pets(&a.pet, &b.pet));
        sections.set(sectioned(items));
        applied.set(pass);
    }
}

async fn observe_loading_state(
    mut passes: broadcast::Receiver<PassEvent>,
    loading_state: Signal<LoadingState>,
    applied: Signal<u64>,
) {
    while let Some(event) = next_event(&mut passes).await {
        let (state, pass) = match event {
            PassEvent::Started => (LoadingState::Loading, None),
            PassEvent::Finished(pass, Ok(pets)) => (LoadingState::Loaded { empty: pets.is_empty() }, Some(pass)),
            PassEvent::Finished(pass, Err(err)) => (
                LoadingState::Error {
                    message: err.to_string(),
                },
                Some(pass),
            ),
        };
        loading_state.set_if_changed(state);
        if let Some(pass) = pass {
            applied.set(pass);
        }
    }
}

async fn next_event(passes: &mut broadcast::Receiver<PassEvent>) -> Option<PassEvent> {
    loop {
        match passes.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "pipeline observer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::watch;

    use super::*;
    use crate::location::{FixedLocationProvider, Location, LocationError, UnavailableLocationProvider};
    use crate::navigation::{Destination, SegueId, Style};
    use crate::pet::{Breed, Photo, Size, Status};
    use crate::status::StatusCodeError;

    type Response = Result<Vec<Pet>, ApiError>;

    /// Answers each request with the next scripted response, waiting for one
    /// if none has been queued yet.
    struct ScriptedCatalog {
        responses: tokio::sync::Mutex<mpsc::UnboundedReceiver<Response>>,
        locations: Mutex<Vec<Option<Location>>>,
    }

    impl ScriptedCatalog {
        fn new() -> (Arc<Self>, mpsc::UnboundedSender<Response>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let catalog = Arc::new(Self {
                responses: tokio::sync::Mutex::new(rx),
                locations: Mutex::new(Vec::new()),
            });
            (catalog, tx)
        }
    }

    #[async_trait]
    impl PetCatalog for ScriptedCatalog {
        async fn get_pets(&self, location: Option<Location>) -> Result<Vec<Pet>, ApiError> {
            self.locations.lock().push(location);
            match self.responses.lock().await.recv().await {
                Some(response) => response,
                None => std::future::pending().await,
            }
        }
    }

    #[derive(Default)]
    struct RecordingMedia {
        locators: Mutex<Vec<Option<String>>>,
    }

    impl MediaService for RecordingMedia {
        fn get_photo(&self, locator: Option<&url::Url>) -> PhotoStream {
            self.locators.lock().push(locator.map(|u| u.to_string()));
            PhotoStream::never()
        }
    }

    fn pet(id: i64, name: &str, distance: Option<f64>) -> Pet {
        let pet = Pet::new(id, name, "Cat", Size::Small, Status::Adoptable);
        match distance {
            Some(d) => pet.with_distance(d),
            None => pet,
        }
    }

    fn item(pet: Pet) -> PetListItem {
        PetListItem::new(pet, Arc::new(DistanceFormatter::default()), PhotoStream::never())
    }

    fn start(
        catalog: Arc<ScriptedCatalog>,
        location: Arc<dyn LocationProvider>,
    ) -> (PetListPipeline, Arc<RecordingMedia>) {
        let media = Arc::new(RecordingMedia::default());
        let pipeline = PetListPipeline::spawn(catalog, location, media.clone(), Arc::new(Navigator::new()));
        (pipeline, media)
    }

    async fn wait_for<T: Clone>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) -> T {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("timed out waiting for signal")
            .expect("signal closed")
            .clone()
    }

    fn labels(sections: &[PetSection]) -> Vec<&str> {
        sections.iter().map(|s| s.key.as_str()).collect()
    }

    #[test]
    fn ordering_is_distance_then_name_then_unknown() {
        let mut pets = vec![
            pet(1, "Zed", None),
            pet(2, "Bo", Some(12.0)),
            pet(3, "Al", None),
            pet(4, "Cy", Some(3.5)),
            pet(5, "Ab", Some(12.0)),
            pet(6, "Al", None),
        ];
        pets.sort_by(compare_pets);
        let order: Vec<i64> = pets.iter().map(|p| p.id).collect();
        assert_eq!(order, vec![4, 5, 2, 3, 6, 1]);
    }

    #[test]
    fn ordering_is_antisymmetric_and_transitive_on_sample() {
        let sample = [
            pet(1, "A", Some(1.0)),
            pet(2, "B", None),
            pet(3, "C", Some(1.0)),
            pet(4, "A", None),
            pet(5, "A", Some(0.5)),
        ];
        for a in &sample {
            for b in &sample {
                assert_eq!(compare_pets(a, b), compare_pets(b, a).reverse());
                for c in &sample {
                    if compare_pets(a, b) == Ordering::Less && compare_pets(b, c) == Ordering::Less {
                        assert_eq!(compare_pets(a, c), Ordering::Less);
                    }
                }
            }
        }
    }

    #[test]
    fn bucket_boundaries_are_strict() {
        assert_eq!(distance_bucket(Some(0.0)), "less than 2 miles away");
        assert_eq!(distance_bucket(Some(1.99)), "less than 2 miles away");
        assert_eq!(distance_bucket(Some(2.0)), "less than 5 miles away");
        assert_eq!(distance_bucket(Some(99.9)), "less than 100 miles away");
        assert_eq!(distance_bucket(Some(100.0)), "more than 100 miles away");
        assert_eq!(distance_bucket(None), "unknown location");
    }

    #[test]
    fn section_labels_follow_sorted_order() {
        let mut items = vec![
            item(pet(3, "C", None)),
            item(pet(2, "B", Some(1000.0))),
            item(pet(1, "A", Some(15.0))),
        ];
        items.sort_by(|a, b| compare_pets(&a.pet, &b.pet));
        let sections = sectioned(items);
        assert_eq!(
            labels(&sections),
            vec!["less than 20 miles away", "more than 100 miles away", "unknown location"]
        );
        assert!(sections.iter().all(|s| s.items.len() == 1));
    }

    #[derive(Debug, PartialEq)]
    struct Tagged(&'static str, u8);

    impl Sectionable for Tagged {
        type Key = &'static str;

        fn section_key(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn only_adjacent_keys_merge() {
        let sections = sectioned(vec![
            Tagged("a", 1),
            Tagged("a", 2),
            Tagged("b", 3),
            Tagged("a", 4),
            Tagged("b", 5),
            Tagged("b", 6),
        ]);
        let shape: Vec<(&str, usize)> = sections.iter().map(|s| (s.key, s.items.len())).collect();
        assert_eq!(shape, vec![("a", 2), ("b", 1), ("a", 1), ("b", 2)]);
    }

    #[test]
    fn sectioning_empty_is_empty() {
        assert!(sectioned(Vec::<Tagged>::new()).is_empty());
    }

    #[test]
    fn formatter_uses_one_decimal_and_grouping() {
        let f = DistanceFormatter::default();
        assert_eq!(f.format(3.0), "3");
        assert_eq!(f.format(3.14), "3.1");
        assert_eq!(f.format(0.04), "0");
        assert_eq!(f.format(1234.56), "1,234.6");
        assert_eq!(f.format(1234567.0), "1,234,567");
        assert_eq!(f.format(-0.01), "0");
    }

    #[test]
    fn formatter_rounds_shortest_decimal_half_to_even() {
        let f = DistanceFormatter::default();
        assert_eq!(f.format(0.35), "0.4");
        assert_eq!(f.format(0.25), "0.2");
        assert_eq!(f.format(0.45), "0.4");
        assert_eq!(f.format(2.65), "2.6");
        assert_eq!(f.format(0.351), "0.4");
        assert_eq!(f.format(9.95), "10");
        assert_eq!(f.format(999.96), "1,000");
        assert_eq!(DistanceFormatter::new(0).format(2.5), "2");
        assert_eq!(DistanceFormatter::new(0).format(3.5), "4");
    }

    #[test]
    fn item_text_helpers() {
        let rex = Pet::new(1, "Rex", "Dog", Size::Large, Status::Adoptable)
            .with_distance(12.34)
            .with_breed(Breed::Mixed {
                primary: "Husky".to_string(),
                secondary: None,
            });
        let rex = item(rex);
        assert_eq!(rex.formatted_distance().as_deref(), Some("12.3"));
        assert_eq!(rex.distance_text(DistanceFormat::Short).as_deref(), Some("12.3 mi."));
        assert_eq!(
            rex.distance_text(DistanceFormat::Long).as_deref(),
            Some("12.3 miles away from you")
        );
        assert_eq!(rex.detail_text(), "Dog: Mixed (Husky)");
        assert_eq!(rex.emoji(), "🐶");

        let nemo = item(Pet::new(2, "Nemo", "Fish", Size::Small, Status::Found));
        assert_eq!(nemo.distance_text(DistanceFormat::Short), None);
        assert_eq!(nemo.detail_text(), "Fish");
        assert_eq!(nemo.emoji(), "🐠");
        assert_eq!(item(Pet::new(3, "G", "Guinea Pig", Size::Small, Status::Found)).emoji(), "🐹");
        assert_eq!(item(Pet::new(4, "L", "Lizard", Size::Small, Status::Found)).emoji(), "🐾");
    }

    #[test]
    fn item_equality_ignores_photo() {
        let a = item(pet(1, "Tom", Some(1.0)));
        let b = PetListItem::new(a.pet.clone(), Arc::new(DistanceFormatter::new(3)), PhotoStream::never());
        assert_eq!(a, b);
        assert_ne!(a, item(pet(1, "Tom", Some(2.0))));
    }

    #[test]
    fn loading_state_helpers() {
        assert!(LoadingState::Loading.has_activity());
        assert_eq!(LoadingState::Loading.state(), Some("Loading..."));
        assert_eq!(LoadingState::Loaded { empty: true }.state(), Some("No items"));
        assert_eq!(LoadingState::Loaded { empty: false }.state(), None);
        let error = LoadingState::Error {
            message: "boom".to_string(),
        };
        assert_eq!(error.state(), Some("Error:"));
        assert_eq!(error.message(), Some("boom"));
        assert!(!error.has_activity());
    }

    #[tokio::test]
    async fn empty_list_goes_from_loading_to_loaded_empty() {
        let (catalog, responses) = ScriptedCatalog::new();
        let (pipeline, _) = start(catalog, Arc::new(FixedLocationProvider::default()));
        let mut state = pipeline.loading_state().subscribe();
        let mut sections = pipeline.sections().subscribe();
        assert_eq!(*state.borrow_and_update(), LoadingState::Loading);
        assert!(sections.borrow_and_update().is_empty());

        responses.send(Ok(Vec::new())).unwrap();
        let loaded = wait_for(&mut state, |s| *s != LoadingState::Loading).await;
        assert_eq!(loaded, LoadingState::Loaded { empty: true });
        tokio::time::timeout(Duration::from_secs(2), sections.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(sections.borrow().is_empty());
    }

    #[tokio::test]
    async fn successful_list_is_sorted_and_sectioned() {
        let (catalog, responses) = ScriptedCatalog::new();
        let (pipeline, media) = start(catalog.clone(), Arc::new(FixedLocationProvider::default()));
        let mut sections = pipeline.sections().subscribe();

        let thumb = Photo {
            small: Some(url::Url::parse("https://photos.test/a-small.jpg").unwrap()),
            ..Photo::default()
        };
        responses
            .send(Ok(vec![
                pet(1, "A", Some(15.0)).with_photos(vec![thumb]),
                pet(2, "B", Some(1000.0)),
                pet(3, "C", None),
            ]))
            .unwrap();

        let sections = wait_for(&mut sections, |s| !s.is_empty()).await;
        assert_eq!(
            labels(&sections),
            vec!["less than 20 miles away", "more than 100 miles away", "unknown location"]
        );
        assert_eq!(
            pipeline.loading_state().get(),
            LoadingState::Loaded { empty: false }
        );
        assert_eq!(catalog.locations.lock()[0], Some(FixedLocationProvider::DEFAULT));

        let mut locators = media.locators.lock().clone();
        locators.sort();
        assert_eq!(
            locators,
            vec![None, None, Some("https://photos.test/a-small.jpg".to_string())]
        );
        assert_eq!(pipeline.item(2).map(|i| i.pet.name), Some("B".to_string()));
    }

    #[tokio::test]
    async fn failure_keeps_sections_and_reports_error() {
        let (catalog, responses) = ScriptedCatalog::new();
        let (pipeline, _) = start(catalog, Arc::new(FixedLocationProvider::default()));
        let mut sections_rx = pipeline.sections().subscribe();
        let mut state = pipeline.loading_state().subscribe();

        responses.send(Ok(vec![pet(1, "A", Some(1.0))])).unwrap();
        let before = wait_for(&mut sections_rx, |s| !s.is_empty()).await;

        pipeline.reload();
        let failure = ApiError::Status(StatusCodeError { code: 503 });
        responses.send(Err(failure.clone())).unwrap();
        let error = wait_for(&mut state, |s| matches!(s, LoadingState::Error { .. })).await;

        assert_eq!(error.message(), Some(failure.to_string().as_str()));
        assert_eq!(pipeline.sections().get(), before);
    }

    #[tokio::test]
    async fn reload_starts_from_loading() {
        let (catalog, responses) = ScriptedCatalog::new();
        let (pipeline, _) = start(catalog.clone(), Arc::new(FixedLocationProvider::default()));
        let mut state = pipeline.loading_state().subscribe();

        responses.send(Ok(vec![pet(1, "A", None)])).unwrap();
        wait_for(&mut state, |s| *s == LoadingState::Loaded { empty: false }).await;

        pipeline.reload();
        wait_for(&mut state, |s| *s == LoadingState::Loading).await;
        responses.send(Ok(Vec::new())).unwrap();
        wait_for(&mut state, |s| *s == LoadingState::Loaded { empty: true }).await;
        assert_eq!(catalog.locations.lock().len(), 2);
    }

    #[tokio::test]
    async fn settled_waits_for_the_reloaded_sections() {
        let (catalog, responses) = ScriptedCatalog::new();
        let (pipeline, _) = start(catalog, Arc::new(FixedLocationProvider::default()));

        responses.send(Ok(vec![pet(1, "A", Some(1.0))])).unwrap();
        tokio::time::timeout(Duration::from_secs(2), pipeline.settled())
            .await
            .expect("first pass never settled");
        assert!(pipeline.is_settled());
        assert_eq!(pipeline.loading_state().get(), LoadingState::Loaded { empty: false });

        pipeline.reload();
        assert!(!pipeline.is_settled());
        let early = tokio::time::timeout(Duration::from_millis(50), pipeline.settled()).await;
        assert!(early.is_err(), "settled before the reloaded list arrived");

        responses
            .send(Ok(vec![pet(2, "B", Some(30.0)), pet(3, "C", None)]))
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), pipeline.settled())
            .await
            .expect("reload never settled");

        let sections = pipeline.sections().get();
        assert_eq!(labels(&sections), vec!["less than 50 miles away", UNKNOWN_LOCATION]);
        assert_eq!(pipeline.loading_state().get(), LoadingState::Loaded { empty: false });
    }

    #[tokio::test]
    async fn coalesced_reloads_settle_on_one_pass() {
        let (catalog, responses) = ScriptedCatalog::new();
        let (pipeline, _) = start(catalog.clone(), Arc::new(FixedLocationProvider::default()));

        pipeline.reload();
        pipeline.reload();
        responses.send(Ok(vec![pet(1, "A", None)])).unwrap();
        responses.send(Ok(Vec::new())).unwrap();
        tokio::time::timeout(Duration::from_secs(2), pipeline.settled())
            .await
            .expect("reloads never settled");

        assert_eq!(catalog.locations.lock().len(), 2);
        assert!(pipeline.sections().get().is_empty());
        assert_eq!(pipeline.loading_state().get(), LoadingState::Loaded { empty: true });
    }

    #[tokio::test]
    async fn failed_pass_still_settles() {
        let (catalog, responses) = ScriptedCatalog::new();
        let (pipeline, _) = start(catalog, Arc::new(FixedLocationProvider::default()));

        responses.send(Err(ApiError::Status(StatusCodeError { code: 500 }))).unwrap();
        tokio::time::timeout(Duration::from_secs(2), pipeline.settled())
            .await
            .expect("failed pass never settled");
        assert!(matches!(pipeline.loading_state().get(), LoadingState::Error { .. }));
    }

    #[tokio::test]
    async fn location_failure_emits_toast_and_lists_all_pets() {
        let (catalog, responses) = ScriptedCatalog::new();
        let (pipeline, _) = start(
            catalog.clone(),
            Arc::new(UnavailableLocationProvider::new(LocationError::PermissionDenied)),
        );
        let mut toast = pipeline.toast().subscribe();
        let message = tokio::time::timeout(Duration::from_secs(2), toast.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            message,
            "Error determining your location.\nShowing all pets.\nError info: 'location permission denied'"
        );

        responses.send(Ok(vec![pet(1, "A", None)])).unwrap();
        let mut state = pipeline.loading_state().subscribe();
        wait_for(&mut state, |s| *s == LoadingState::Loaded { empty: false }).await;
        assert_eq!(catalog.locations.lock()[0], None);
    }

    #[tokio::test]
    async fn selection_produces_one_navigation_event() {
        let (catalog, _responses) = ScriptedCatalog::new();
        let (pipeline, _) = start(catalog, Arc::new(FixedLocationProvider::default()));
        let mut transitions = pipeline.navigator().transition().subscribe();

        let tom = item(pet(9, "Tom", Some(4.0)));
        pipeline.select(tom.clone());

        let transition = transitions.recv().await.unwrap();
        assert_eq!(transition.style, Style::Segue(SegueId::ShowPetDetails));
        assert!(transitions.try_recv().is_err());
        assert_eq!(
            pipeline.navigator().destination_data().latest(),
            Some(Destination::PetDetails(tom))
        );
    }
}
