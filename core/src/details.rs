//! Pet details screen model, fed by the navigator's destination data.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::navigation::Navigator;
use crate::pipeline::{PetListItem, Section};
use crate::signal::Signal;

#[derive(Debug, Clone, PartialEq)]
pub enum DetailItem {
    /// Photo, species, breed and distance.
    Header(PetListItem),
    KeyValue { key: String, value: String },
}

impl DetailItem {
    fn key_value(key: &str, value: impl Into<String>) -> Self {
        DetailItem::KeyValue {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

pub type DetailSection = Section<Option<String>, DetailItem>;

/// Title and sections for one pet.
pub fn project(item: &PetListItem) -> (String, Vec<DetailSection>) {
    let pet = &item.pet;
    let gender = pet
        .gender
        .map(|g| g.as_str().to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());

    let sections = vec![
        Section {
            key: None,
            items: vec![DetailItem::Header(item.clone())],
        },
        Section {
            key: None,
            items: vec![
                DetailItem::key_value("Size", pet.size.as_str().to_lowercase()),
                DetailItem::key_value("Gender", gender),
                DetailItem::key_value("Status", pet.status.as_str()),
            ],
        },
    ];
    (pet.name.clone(), sections)
}

/// Follows the navigator and projects the latest pet destination.
pub struct PetDetails {
    title: Signal<Option<String>>,
    sections: Signal<Vec<DetailSection>>,
    task: JoinHandle<()>,
}

impl PetDetails {
    /// Start following `navigator` on the current tokio runtime. A destination
    /// sent before this call is picked up immediately.
    pub fn spawn(navigator: &Arc<Navigator>) -> Self {
        let title = Signal::new(None);
        let sections = Signal::new(Vec::new());
        let mut destinations = navigator.destination_data().subscribe();

        let task = {
            let title = title.clone();
            let sections = sections.clone();
            tokio::spawn(async move {
                while let Some(destination) = destinations.recv().await {
                    let Some(item) = destination.pet_item() else {
                        continue;
                    };
                    let (name, projected) = project(item);
                    sections.set(projected);
                    title.set(Some(name));
                }
            })
        };

        Self { title, sections, task }
    }

    pub fn title(&self) -> &Signal<Option<String>> {
        &self.title
    }

    pub fn sections(&self) -> &Signal<Vec<DetailSection>> {
        &self.sections
    }
}

impl Drop for PetDetails {
    fn drop(&mut self) {
        self.task.abort();
    }
}
