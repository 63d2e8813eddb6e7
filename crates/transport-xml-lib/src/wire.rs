//! Typed XML fragment tree
//!
//! Mirrors the element layout of the XML documents one to one, with numbers
//! already parsed. References between entities are the raw id strings found
//! in the document; resolving them is the reader's job.

use crate::geometry::ExplicitLength;
use crate::matrix::OdMatrixFragment;
use crate::model::Direction;

/// Whole document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireDocument {
    pub network: WireNetwork,
    pub zoning: WireZoning,
    pub demand: WireDemand,
    /// `xsi:schemaLocation` of the root element
    pub schema_location: Option<String>,
}

/// `id` and `externalid` attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireIds {
    pub id: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireNetwork {
    /// CRS identifier of every coordinate in the document
    pub srsname: Option<String>,
    pub modes: Vec<WireMode>,
    pub link_segment_types: Vec<WireLinkSegmentType>,
    pub nodes: Vec<WireNode>,
    pub links: Vec<WireLink>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireMode {
    pub ids: WireIds,
    pub name: Option<String>,
    pub pcu: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireLinkSegmentType {
    pub ids: WireIds,
    pub name: Option<String>,
    pub capacity_per_lane: Option<f64>,
    pub max_density_per_lane: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireNode {
    pub ids: WireIds,
    pub point: Option<WirePoint>,
}

/// `gml:Point/gml:pos`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WirePoint {
    pub pos: Vec<f64>,
}

/// `gml:LineString` in one of its two encodings
#[derive(Debug, Clone, PartialEq)]
pub enum WireLineString {
    /// `gml:posList`
    PosList(Vec<f64>),
    /// `gml:coordinates`
    Coordinates(WireCoordinates),
}

/// `gml:coordinates` text with its separator attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireCoordinates {
    pub text: String,
    /// `ts` attribute
    pub tuple_separator: Option<String>,
    /// `cs` attribute
    pub value_separator: Option<String>,
    /// `decimal` attribute
    pub decimal: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireLink {
    pub ids: WireIds,
    pub node_a_ref: String,
    pub node_b_ref: String,
    pub length: Option<ExplicitLength>,
    pub geometry: Option<WireLineString>,
    pub segments: Vec<WireLinkSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireLinkSegment {
    pub ids: WireIds,
    pub direction: Direction,
    pub type_ref: String,
    pub lanes: Option<u32>,
    pub max_speed: Option<f64>,
}

/// `gml:Polygon/gml:exterior/gml:LinearRing/gml:posList`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WirePolygon {
    pub exterior: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireZoning {
    pub zones: Vec<WireZone>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireZone {
    pub ids: WireIds,
    pub centroid: Option<WirePoint>,
    pub boundary: Option<WirePolygon>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireDemand {
    pub time_periods: Vec<WireTimePeriod>,
    pub od_matrices: Vec<WireOdMatrix>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireTimePeriod {
    pub id: Option<String>,
    pub description: Option<String>,
    /// Seconds since midnight
    pub start_time: u64,
    /// Seconds
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireOdMatrix {
    pub time_period_ref: String,
    pub mode_ref: String,
    pub fragment: OdMatrixFragment,
}
