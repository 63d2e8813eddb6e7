//! Domain model -> XML file
//!
//! The whole document is built and serialized in memory first. Only then is
//! it written to a temporary file next to the destination and persisted
//! under its final name, so a failed conversion leaves nothing behind.

use crate::geometry::{ExplicitLength, LengthUnit};
use crate::ids::{EntityKind, IdMapper, IdMapping, Identified};
use crate::matrix;
use crate::model::{Link, LinkSegment, LinkSegmentType, MacroscopicInput, Mode, Node, TimePeriod, Zone};
use crate::session::ConversionSession;
use crate::settings::{Settings, ValidatedSettings};
use crate::wire::*;
use crate::{Result, XmlError, xml};
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

const SCHEMA_BASE_URL: &str = "https://trafficplanit.github.io/PLANitManual/xsd";
const SCHEMA_FILE: &str = "macroscopicinput.xsd";

/// Schema location for a format version
///
/// Versions made of digits and dots only are releases with their own
/// versioned schema; anything else points at the development schema.
pub fn schema_location(version: &str) -> String {
    let version = version.trim();
    let is_release = !version.is_empty()
        && version.chars().all(|c| c.is_ascii_digit() || c == '.')
        && version.chars().any(|c| c.is_ascii_digit());
    if is_release {
        format!("{SCHEMA_BASE_URL}/{version}/{SCHEMA_FILE}")
    } else {
        format!("{SCHEMA_BASE_URL}/{SCHEMA_FILE}")
    }
}

/// Identifier mappers for every entity kind, selected once per write
#[derive(Debug, Clone, Copy)]
pub struct IdMappers {
    pub modes: IdMapper<Mode>,
    pub link_segment_types: IdMapper<LinkSegmentType>,
    pub nodes: IdMapper<Node>,
    pub links: IdMapper<Link>,
    pub link_segments: IdMapper<LinkSegment>,
    pub zones: IdMapper<Zone>,
    /// Absent when there are no time periods to write
    pub time_periods: Option<IdMapper<TimePeriod>>,
}

impl IdMappers {
    /// Check that every kind maps its entities to distinct ids
    pub fn check_unique(&self, input: &MacroscopicInput) -> Result<()> {
        let network = &input.network;
        check_unique(&network.modes, &self.modes)?;
        check_unique(&network.link_segment_types, &self.link_segment_types)?;
        check_unique(&network.nodes, &self.nodes)?;
        check_unique(&network.links, &self.links)?;
        check_unique(
            network.links.iter().flat_map(|link| &link.segments),
            &self.link_segments,
        )?;
        check_unique(input.zoning.zones.iter(), &self.zones)?;
        if let Some(time_periods) = &self.time_periods {
            check_unique(&input.demands.time_periods, time_periods)?;
        }
        Ok(())
    }

    /// Select all mappers for `mode`, failing before anything is written
    pub fn for_mode(mode: IdMapping, input: &MacroscopicInput) -> Result<Self> {
        Ok(Self {
            modes: IdMapper::for_mode(mode)?,
            link_segment_types: IdMapper::for_mode(mode)?,
            nodes: IdMapper::for_mode(mode)?,
            links: IdMapper::for_mode(mode)?,
            link_segments: IdMapper::for_mode(mode)?,
            zones: IdMapper::for_mode(mode)?,
            time_periods: if input.demands.time_periods.is_empty() {
                None
            } else {
                Some(IdMapper::for_mode(mode)?)
            },
        })
    }
}

/// Writes [`MacroscopicInput`] as an XML document
#[derive(Debug, Clone)]
pub struct InputWriter {
    settings: ValidatedSettings,
}

fn wire_ids<E: Identified>(entity: &E, mapper: &IdMapper<E>) -> WireIds {
    WireIds {
        id: Some(mapper.map(entity)),
        external_id: entity.ids().external_id().map(str::to_owned),
    }
}

/// Fail when two entities of one kind map to the same persisted id
fn check_unique<'a, E: Identified + 'a>(
    entities: impl IntoIterator<Item = &'a E>,
    mapper: &IdMapper<E>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for entity in entities {
        let id = mapper.map(entity);
        if !seen.insert(id.clone()) {
            return Err(XmlError::DuplicateMappedId {
                kind: E::KIND,
                entity: entity.ids().id(),
                id,
            });
        }
    }
    Ok(())
}

fn entity<'a, T>(items: &'a [T], index: usize, kind: EntityKind) -> Result<&'a T> {
    items.get(index).ok_or_else(|| XmlError::UnknownReference {
        kind,
        reference: format!("#{index}"),
    })
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl InputWriter {
    /// Validate `settings`; nothing is written when they are invalid
    pub fn new(settings: Settings) -> Result<Self> {
        Ok(Self {
            settings: settings.validate()?,
        })
    }

    pub fn settings(&self) -> &ValidatedSettings {
        &self.settings
    }

    /// Write `input` to `<output_dir>/<file_name>`, returning the final path
    pub fn write(&self, input: &MacroscopicInput) -> Result<PathBuf> {
        #[cfg(feature = "profiling")]
        profiling::scope!("writer::write");

        let mappers = IdMappers::for_mode(self.settings.id_mapping, input)?;
        let (dir, file_name) = self.settings.output_target()?;

        let document = self.to_document(input, &mappers)?;
        let text = xml::write_document(&document, self.settings.number_format.fraction_digits)?;

        std::fs::create_dir_all(dir)?;
        let path = dir.join(file_name);
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(text.as_bytes())?;
        file.flush()?;
        file.persist(&path).map_err(|error| XmlError::Io(error.error))?;

        tracing::debug!("Wrote {} ({} bytes)", path.display(), text.len());
        Ok(path)
    }

    /// Build the wire document for `input` in the destination CRS
    ///
    /// Fails when the mappers would write the same id for two entities of
    /// one kind, since references in the document would become ambiguous.
    pub fn to_document(&self, input: &MacroscopicInput, mappers: &IdMappers) -> Result<WireDocument> {
        mappers.check_unique(input)?;
        let session = ConversionSession::open(self.settings.clone(), Some(input.network.crs.clone()))?;
        let codec = session.codec();
        let transform = session.transform();
        let network = &input.network;

        let modes = network
            .modes
            .iter()
            .map(|mode| WireMode {
                ids: wire_ids(mode, &mappers.modes),
                name: mode.name.clone(),
                pcu: Some(mode.pcu),
            })
            .collect();

        let link_segment_types = network
            .link_segment_types
            .iter()
            .map(|segment_type| WireLinkSegmentType {
                ids: wire_ids(segment_type, &mappers.link_segment_types),
                name: segment_type.name.clone(),
                capacity_per_lane: segment_type.capacity_per_lane,
                max_density_per_lane: segment_type.max_density_per_lane,
            })
            .collect();

        let nodes = network
            .nodes
            .iter()
            .map(|node| {
                Ok(WireNode {
                    ids: wire_ids(node, &mappers.nodes),
                    point: node
                        .position
                        .map(|position| codec.encode_point(position, transform))
                        .transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let links = network
            .links
            .iter()
            .map(|link| {
                let node_a = entity(&network.nodes, link.node_a, EntityKind::Node)?;
                let node_b = entity(&network.nodes, link.node_b, EntityKind::Node)?;
                let segments = link
                    .segments
                    .iter()
                    .map(|segment| {
                        let segment_type = entity(
                            &network.link_segment_types,
                            segment.segment_type,
                            EntityKind::LinkSegmentType,
                        )?;
                        Ok(WireLinkSegment {
                            ids: wire_ids(segment, &mappers.link_segments),
                            direction: segment.direction,
                            type_ref: mappers.link_segment_types.map(segment_type),
                            lanes: segment.lanes,
                            max_speed: segment.max_speed,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(WireLink {
                    ids: wire_ids(link, &mappers.links),
                    node_a_ref: mappers.nodes.map(node_a),
                    node_b_ref: mappers.nodes.map(node_b),
                    length: link.explicit_length.then_some(ExplicitLength {
                        value: link.length_km,
                        unit: LengthUnit::Kilometres,
                    }),
                    geometry: link
                        .geometry
                        .as_ref()
                        .map(|line| codec.encode_line(line, transform, self.settings.line_encoding))
                        .transpose()?,
                    segments,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let zones = input
            .zoning
            .zones
            .iter()
            .map(|zone| {
                Ok(WireZone {
                    ids: wire_ids(zone, &mappers.zones),
                    centroid: zone
                        .centroid
                        .map(|centroid| codec.encode_point(centroid, transform))
                        .transpose()?,
                    boundary: zone
                        .boundary
                        .as_ref()
                        .map(|polygon| codec.encode_polygon(polygon, transform))
                        .transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(WireDocument {
            network: WireNetwork {
                srsname: Some(session.crs().identifier()),
                modes,
                link_segment_types,
                nodes,
                links,
            },
            zoning: WireZoning { zones },
            demand: self.demand(input, mappers)?,
            schema_location: Some(schema_location(&self.settings.version)),
        })
    }

    fn demand(&self, input: &MacroscopicInput, mappers: &IdMappers) -> Result<WireDemand> {
        let demands = &input.demands;
        let Some(period_mapper) = mappers.time_periods else {
            return Ok(WireDemand::default());
        };

        let time_periods = demands
            .time_periods
            .iter()
            .map(|period| WireTimePeriod {
                id: Some(period_mapper.map(period)),
                description: period.description.clone(),
                start_time: period.start_seconds,
                duration: period.duration_seconds,
            })
            .collect();

        let zone_refs: Vec<String> = input
            .zoning
            .zones
            .iter()
            .map(|zone| mappers.zones.map(zone))
            .collect();
        let format = self.settings.matrix_format();

        let od_matrices = demands
            .od_demands
            .iter()
            .map(|od| {
                let period = entity(&demands.time_periods, od.time_period, EntityKind::TimePeriod)?;
                let mode = entity(&input.network.modes, od.mode, EntityKind::Mode)?;
                Ok(WireOdMatrix {
                    time_period_ref: period_mapper.map(period),
                    mode_ref: mappers.modes.map(mode),
                    fragment: matrix::encode(
                        &od.matrix,
                        self.settings.matrix_encoding,
                        mode.pcu,
                        &zone_refs,
                        &format,
                    )?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(WireDemand {
            time_periods,
            od_matrices,
        })
    }
}
