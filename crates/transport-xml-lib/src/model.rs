//! In-memory domain model populated by the reader and walked by the writer
//!
//! Entities reference each other by index into the owning vectors. Zones are
//! kept in a [`ZoneRegistry`] whose insertion order defines the positional
//! zone numbering used by compact OD matrices.

use crate::crs::Crs;
use crate::ids::{EntityKind, Identified, Ids};
use crate::matrix::DemandMatrix;
use crate::{Result, XmlError};
use geo::{Coord, LineString, Polygon};
use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;

/// Travel mode with its passenger-car-unit factor
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mode {
    pub ids: Ids,
    pub name: Option<String>,
    pub pcu: f64,
}

/// Physical characteristics shared by link segments
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkSegmentType {
    pub ids: Ids,
    pub name: Option<String>,
    /// Capacity per lane in pcu/h
    pub capacity_per_lane: Option<f64>,
    /// Maximum density per lane in pcu/km
    pub max_density_per_lane: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub ids: Ids,
    /// Position in the network CRS
    pub position: Option<Coord<f64>>,
}

/// Travel direction of a link segment relative to its link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// From node A to node B
    AB,
    /// From node B to node A
    BA,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::AB => "a_b",
            Direction::BA => "b_a",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a_b" | "ab" => Ok(Direction::AB),
            "b_a" | "ba" => Ok(Direction::BA),
            other => Err(XmlError::Xml(format!(
                "unknown link segment direction '{other}' (expected a_b or b_a)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkSegment {
    pub ids: Ids,
    pub direction: Direction,
    /// Index into [`Network::link_segment_types`]
    pub segment_type: usize,
    pub lanes: Option<u32>,
    /// Maximum speed in km/h
    pub max_speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Link {
    pub ids: Ids,
    /// Index into [`Network::nodes`]
    pub node_a: usize,
    /// Index into [`Network::nodes`]
    pub node_b: usize,
    pub length_km: f64,
    /// Whether the length was given explicitly rather than derived
    pub explicit_length: bool,
    /// Polyline in the network CRS
    pub geometry: Option<LineString<f64>>,
    pub segments: Vec<LinkSegment>,
}

/// Physical network
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Network {
    /// CRS of every coordinate stored in the network and zoning
    pub crs: Crs,
    pub modes: Vec<Mode>,
    pub link_segment_types: Vec<LinkSegmentType>,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl Network {
    pub fn new(crs: Crs) -> Self {
        Self {
            crs,
            modes: Vec::new(),
            link_segment_types: Vec::new(),
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Total length of all links in km
    pub fn total_length_km(&self) -> f64 {
        self.links.iter().map(|link| link.length_km).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Zone {
    pub ids: Ids,
    pub centroid: Option<Coord<f64>>,
    pub boundary: Option<Polygon<f64>>,
}

/// Zones in registration order, addressable by XML id or by 1-based position
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
    /// Reference key -> index into `zones`
    by_ref: IndexMap<String, usize>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a zone under its XML id (or internal id when it has none)
    pub fn register(&mut self, zone: Zone) -> Result<usize> {
        let key = zone_key(&zone);
        if self.by_ref.contains_key(&key) {
            return Err(XmlError::DuplicateId {
                kind: EntityKind::Zone,
                id: key,
            });
        }
        let index = self.zones.len();
        self.by_ref.insert(key, index);
        self.zones.push(zone);
        Ok(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Index of the zone with the given reference key
    pub fn index_of(&self, reference: &str) -> Option<usize> {
        self.by_ref.get(reference.trim()).copied()
    }

    /// Index of the zone at a 1-based registration position
    pub fn index_at_position(&self, position: usize) -> Option<usize> {
        (1..=self.zones.len()).contains(&position).then(|| position - 1)
    }

    /// Reference key of the zone at `index`
    pub fn key_of(&self, index: usize) -> Option<&str> {
        self.by_ref.get_index(index).map(|(key, _)| key.as_str())
    }

    pub fn get(&self, index: usize) -> Option<&Zone> {
        self.zones.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    /// Reference keys in registration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_ref.keys().map(String::as_str)
    }
}

fn zone_key(zone: &Zone) -> String {
    zone.ids
        .xml_id()
        .map(str::to_owned)
        .unwrap_or_else(|| zone.ids.id().to_string())
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Zoning {
    pub zones: ZoneRegistry,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimePeriod {
    pub ids: Ids,
    pub description: Option<String>,
    /// Start time in seconds since midnight
    pub start_seconds: u64,
    pub duration_seconds: u64,
}

/// Demand for one (time period, mode) pair
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OdDemands {
    /// Index into [`Demands::time_periods`]
    pub time_period: usize,
    /// Index into [`Network::modes`]
    pub mode: usize,
    /// Demand in pcu/h, zones in registry order
    pub matrix: DemandMatrix,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Demands {
    pub time_periods: Vec<TimePeriod>,
    pub od_demands: Vec<OdDemands>,
}

/// Everything a conversion reads or writes
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MacroscopicInput {
    pub network: Network,
    pub zoning: Zoning,
    pub demands: Demands,
}

impl MacroscopicInput {
    pub fn new(crs: Crs) -> Self {
        Self {
            network: Network::new(crs),
            zoning: Zoning::default(),
            demands: Demands::default(),
        }
    }
}

macro_rules! identified {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Identified for $ty {
                const KIND: EntityKind = EntityKind::$kind;

                #[inline]
                fn ids(&self) -> &Ids {
                    &self.ids
                }
            }
        )*
    };
}

identified! {
    Mode => Mode,
    LinkSegmentType => LinkSegmentType,
    Node => Node,
    Link => Link,
    LinkSegment => LinkSegment,
    Zone => Zone,
    TimePeriod => TimePeriod,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(id: u64, xml_id: &str) -> Zone {
        Zone {
            ids: Ids::new(id).with_xml_id(Some(xml_id.to_string())),
            centroid: None,
            boundary: None,
        }
    }

    #[test]
    fn test_registry_keeps_registration_order() {
        let mut registry = ZoneRegistry::new();
        registry.register(zone(0, "C")).unwrap();
        registry.register(zone(1, "A")).unwrap();
        registry.register(zone(2, "B")).unwrap();

        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["C", "A", "B"]);
        assert_eq!(registry.index_of("A"), Some(1));
        assert_eq!(registry.index_at_position(1), Some(0));
        assert_eq!(registry.index_at_position(3), Some(2));
        assert_eq!(registry.index_at_position(0), None);
        assert_eq!(registry.index_at_position(4), None);
        assert_eq!(registry.key_of(2), Some("B"));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = ZoneRegistry::new();
        registry.register(zone(0, "1")).unwrap();
        assert!(matches!(
            registry.register(zone(1, "1")),
            Err(XmlError::DuplicateId {
                kind: EntityKind::Zone,
                ..
            })
        ));
    }

    #[test]
    fn test_zone_without_xml_id_uses_internal_id() {
        let mut registry = ZoneRegistry::new();
        registry
            .register(Zone {
                ids: Ids::new(5),
                centroid: None,
                boundary: None,
            })
            .unwrap();
        assert_eq!(registry.index_of("5"), Some(0));
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("a_b".parse::<Direction>().unwrap(), Direction::AB);
        assert_eq!("B_A".parse::<Direction>().unwrap(), Direction::BA);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
