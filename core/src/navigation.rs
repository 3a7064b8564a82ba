//! Navigation events between screens.
//!
//! Screens push a `NavigationSource` into the `Navigator`; the navigator
//! derives a `Transition` (what the host should do) and a `Destination`
//! (the data the next screen reads). Destinations are replayed to late
//! subscribers so a screen created after the event still gets its data.

use crate::pipeline::PetListItem;
use crate::signal::{Relay, ReplayRelay};

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationSource {
    PetList(PetListEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PetListEvent {
    ShowDetails(PetListItem),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    PetDetails(PetListItem),
}

impl Destination {
    pub fn pet_item(&self) -> Option<&PetListItem> {
        match self {
            Destination::PetDetails(item) => Some(item),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeId {
    PetsViewController,
    PetDetailsViewController,
}

impl NodeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::PetsViewController => "PetsViewController",
            NodeId::PetDetailsViewController => "PetDetailsViewController",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegueId {
    ShowPetDetails,
}

impl SegueId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegueId::ShowPetDetails => "showPetDetails",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Segue(SegueId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub source: NodeId,
    pub style: Style,
}

impl NavigationSource {
    pub fn transition(&self) -> Transition {
        match self {
            NavigationSource::PetList(PetListEvent::ShowDetails(_)) => Transition {
                source: NodeId::PetsViewController,
                style: Style::Segue(SegueId::ShowPetDetails),
            },
        }
    }

    pub fn destination(&self) -> Destination {
        match self {
            NavigationSource::PetList(PetListEvent::ShowDetails(item)) => Destination::PetDetails(item.clone()),
        }
    }
}

/// Routes source events to transitions and destination data.
#[derive(Debug, Default)]
pub struct Navigator {
    source_event: Relay<NavigationSource>,
    transition: Relay<Transition>,
    destination_data: ReplayRelay<Destination>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a source event. The destination is stored before the
    /// transition is announced, so a consumer reacting to the transition can
    /// already read it.
    pub fn send(&self, source: NavigationSource) {
        let transition = source.transition();
        self.destination_data.send(source.destination());
        self.source_event.send(source);
        self.transition.send(transition);
    }

    pub fn source_event(&self) -> &Relay<NavigationSource> {
        &self.source_event
    }

    pub fn transition(&self) -> &Relay<Transition> {
        &self.transition
    }

    pub fn destination_data(&self) -> &ReplayRelay<Destination> {
        &self.destination_data
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::media::PhotoStream;
    use crate::pet::{Pet, Size, Status};
    use crate::pipeline::DistanceFormatter;

    fn item(id: i64, name: &str) -> PetListItem {
        PetListItem::new(
            Pet::new(id, name, "Dog", Size::Medium, Status::Adoptable),
            Arc::new(DistanceFormatter::default()),
            PhotoStream::never(),
        )
    }

    #[tokio::test]
    async fn selection_maps_to_segue_and_destination() {
        let navigator = Navigator::new();
        let mut transitions = navigator.transition().subscribe();
        let mut sources = navigator.source_event().subscribe();

        let rex = item(1, "Rex");
        navigator.send(NavigationSource::PetList(PetListEvent::ShowDetails(rex.clone())));

        let transition = transitions.recv().await.unwrap();
        assert_eq!(transition.source, NodeId::PetsViewController);
        assert_eq!(transition.style, Style::Segue(SegueId::ShowPetDetails));
        assert_eq!(
            sources.recv().await.unwrap(),
            NavigationSource::PetList(PetListEvent::ShowDetails(rex.clone()))
        );
        assert!(transitions.try_recv().is_err());

        let destination = navigator.destination_data().latest().unwrap();
        assert_eq!(destination.pet_item(), Some(&rex));
    }

    #[tokio::test]
    async fn late_destination_subscriber_sees_latest_only() {
        let navigator = Navigator::new();
        navigator.send(NavigationSource::PetList(PetListEvent::ShowDetails(item(1, "Rex"))));
        navigator.send(NavigationSource::PetList(PetListEvent::ShowDetails(item(2, "Tom"))));

        let mut destinations = navigator.destination_data().subscribe();
        let destination = destinations.recv().await.unwrap();
        assert_eq!(destination.pet_item().map(|i| i.pet.name.as_str()), Some("Tom"));
        assert!(destinations.try_recv().is_none());
    }

    #[test]
    fn identifiers_render_as_host_names() {
        assert_eq!(SegueId::ShowPetDetails.as_str(), "showPetDetails");
        assert_eq!(NodeId::PetsViewController.as_str(), "PetsViewController");
    }
}
