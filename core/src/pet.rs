//! Pet data model as decoded from the shelter API.
//!
//! # Design
//! `Pet` deserializes through an intermediate wire struct so two fields can
//! be decoded leniently without failing the whole list:
//! - `gender`: an unrecognised value becomes `None`.
//! - `breeds`: `"unknown": true` collapses to `None`; otherwise `mixed`
//!   selects between the pure and mixed variants. A breed object that is
//!   neither unknown nor complete is still an error.

use std::fmt;

use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Size {
    Small,
    Medium,
    Large,
    #[serde(rename = "Extra Large")]
    ExtraLarge,
}

impl Size {
    pub fn as_str(&self) -> &'static str {
        match self {
            Size::Small => "Small",
            Size::Medium => "Medium",
            Size::Large => "Large",
            Size::ExtraLarge => "Extra Large",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Adoptable,
    Adopted,
    Found,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Adoptable => "adoptable",
            Status::Adopted => "adopted",
            Status::Found => "found",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Breed {
    Pure(String),
    /// The secondary breed is not always known.
    Mixed {
        primary: String,
        secondary: Option<String>,
    },
}

impl fmt::Display for Breed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Breed::Pure(name) => f.write_str(name),
            Breed::Mixed { primary, secondary } => match secondary {
                Some(secondary) => write!(f, "Mixed ({primary} + {secondary})"),
                None => write!(f, "Mixed ({primary})"),
            },
        }
    }
}

/// One photo in several resolutions. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Photo {
    #[serde(default)]
    pub small: Option<Url>,
    #[serde(default)]
    pub medium: Option<Url>,
    #[serde(default)]
    pub large: Option<Url>,
    #[serde(default)]
    pub full: Option<Url>,
}

/// An adoptable animal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "PetWire")]
pub struct Pet {
    pub id: i64,
    pub name: String,
    pub species: String,
    pub size: Size,
    pub status: Status,
    /// Miles from the requested location; absent when no location was sent.
    pub distance: Option<f64>,
    pub photos: Vec<Photo>,
    pub gender: Option<Gender>,
    pub breed: Option<Breed>,
}

impl Pet {
    pub fn new(id: i64, name: impl Into<String>, species: impl Into<String>, size: Size, status: Status) -> Self {
        Self {
            id,
            name: name.into(),
            species: species.into(),
            size,
            status,
            distance: None,
            photos: Vec::new(),
            gender: None,
            breed: None,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn with_photos(mut self, photos: Vec<Photo>) -> Self {
        self.photos = photos;
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    pub fn with_breed(mut self, breed: Breed) -> Self {
        self.breed = Some(breed);
        self
    }

    /// Locator of the thumbnail shown in lists.
    pub fn thumbnail_url(&self) -> Option<&Url> {
        self.photos.first().and_then(|photo| photo.small.as_ref())
    }
}

#[derive(Deserialize)]
struct PetWire {
    id: i64,
    name: String,
    species: String,
    size: Size,
    status: Status,
    #[serde(default)]
    distance: Option<f64>,
    photos: Vec<Photo>,
    #[serde(default)]
    gender: Option<serde_json::Value>,
    breeds: BreedWire,
}

#[derive(Deserialize)]
struct BreedWire {
    unknown: bool,
    #[serde(default)]
    primary: Option<String>,
    #[serde(default)]
    secondary: Option<String>,
    #[serde(default)]
    mixed: Option<bool>,
}

impl BreedWire {
    fn into_breed(self) -> Result<Option<Breed>, String> {
        if self.unknown {
            return Ok(None);
        }
        let primary = self.primary.ok_or("missing field `primary` in breeds")?;
        let mixed = self.mixed.ok_or("missing field `mixed` in breeds")?;
        if mixed {
            Ok(Some(Breed::Mixed {
                primary,
                secondary: self.secondary,
            }))
        } else {
            Ok(Some(Breed::Pure(primary)))
        }
    }
}

impl TryFrom<PetWire> for Pet {
    type Error = String;

    fn try_from(wire: PetWire) -> Result<Self, Self::Error> {
        let gender = wire
            .gender
            .and_then(|value| serde_json::from_value::<Gender>(value).ok());
        let breed = wire.breeds.into_breed()?;

        Ok(Pet {
            id: wire.id,
            name: wire.name,
            species: wire.species,
            size: wire.size,
            status: wire.status,
            distance: wire.distance,
            photos: wire.photos,
            gender,
            breed,
        })
    }
}
