//! Wire document -> domain model

use crate::crs::Crs;
use crate::ids::{EntityKind, Ids};
use crate::matrix::OdMatrixDecoder;
use crate::model::{
    Link, LinkSegment, LinkSegmentType, MacroscopicInput, Mode, Node, OdDemands, TimePeriod, Zone,
};
use crate::session::ConversionSession;
use crate::settings::{Settings, ValidatedSettings};
use crate::wire::{WireDemand, WireDocument, WireIds, WireNetwork, WireZoning};
use crate::{ConversionWarning, Result, XmlError, xml};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Result of reading one document
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub input: MacroscopicInput,
    /// Recoverable conditions met while reading, already logged
    pub warnings: Vec<ConversionWarning>,
}

/// Reads XML documents into [`MacroscopicInput`]
#[derive(Debug, Clone)]
pub struct InputReader {
    settings: ValidatedSettings,
}

/// Reference key -> index, per entity kind
#[derive(Debug, Default)]
struct References {
    modes: HashMap<String, usize>,
    link_segment_types: HashMap<String, usize>,
    nodes: HashMap<String, usize>,
    time_periods: HashMap<String, usize>,
    links: HashSet<String>,
    link_segments: HashSet<String>,
}

fn register(map: &mut HashMap<String, usize>, kind: EntityKind, key: String, index: usize) -> Result<()> {
    if map.contains_key(&key) {
        return Err(XmlError::DuplicateId { kind, id: key });
    }
    map.insert(key, index);
    Ok(())
}

fn register_unique(set: &mut HashSet<String>, kind: EntityKind, key: String) -> Result<()> {
    if !set.insert(key.clone()) {
        return Err(XmlError::DuplicateId { kind, id: key });
    }
    Ok(())
}

fn lookup(map: &HashMap<String, usize>, kind: EntityKind, reference: &str) -> Result<usize> {
    map.get(reference.trim())
        .copied()
        .ok_or_else(|| XmlError::UnknownReference {
            kind,
            reference: reference.to_string(),
        })
}

/// Reference key of an entity: its XML id, else its internal id
fn reference_key(xml_id: Option<&str>, internal: u64) -> String {
    xml_id.map_or_else(|| internal.to_string(), str::to_owned)
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl InputReader {
    /// Validate `settings`; nothing is parsed when they are invalid
    pub fn new(settings: Settings) -> Result<Self> {
        Ok(Self {
            settings: settings.validate()?,
        })
    }

    pub fn settings(&self) -> &ValidatedSettings {
        &self.settings
    }

    /// Read and convert an XML file
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<ReadOutcome> {
        #[cfg(feature = "profiling")]
        profiling::scope!("reader::read_file");

        let path = path.as_ref();
        tracing::debug!("Reading {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let document = xml::read_document(&text)?;
        self.read_document(&document)
    }

    /// Convert a parsed document
    pub fn read_document(&self, document: &WireDocument) -> Result<ReadOutcome> {
        #[cfg(feature = "profiling")]
        profiling::scope!("reader::read_document");

        let source = match document
            .network
            .srsname
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
        {
            Some(code) => Some(Crs::from_code(code)?),
            None => self.settings.source_crs.clone(),
        };
        let mut session = ConversionSession::open(self.settings.clone(), source)?;
        let mut input = MacroscopicInput::new(session.crs().clone());
        let mut refs = References::default();

        read_network(&mut session, &mut input, &mut refs, &document.network)?;
        read_zoning(&mut session, &mut input, &document.zoning)?;
        read_demand(&mut session, &mut input, &mut refs, &document.demand)?;

        tracing::debug!(
            "Read {} nodes, {} links, {} zones and {} OD matrices in {}",
            input.network.nodes.len(),
            input.network.links.len(),
            input.zoning.zones.len(),
            input.demands.od_demands.len(),
            input.network.crs
        );

        Ok(ReadOutcome {
            input,
            warnings: session.into_warnings(),
        })
    }
}

fn fresh_ids(session: &mut ConversionSession, kind: EntityKind, wire: &WireIds) -> Ids {
    session
        .ids()
        .ids(kind, wire.id.clone(), wire.external_id.clone())
}

fn read_network(
    session: &mut ConversionSession,
    input: &mut MacroscopicInput,
    refs: &mut References,
    wire: &WireNetwork,
) -> Result<()> {
    let network = &mut input.network;

    for mode in &wire.modes {
        let ids = fresh_ids(session, EntityKind::Mode, &mode.ids);
        let key = reference_key(ids.xml_id(), ids.id());
        let pcu = mode.pcu.unwrap_or(1.0);
        if !(pcu.is_finite() && pcu > 0.0) {
            return Err(XmlError::Xml(format!("mode '{key}' has invalid pcu {pcu}")));
        }
        register(&mut refs.modes, EntityKind::Mode, key, network.modes.len())?;
        network.modes.push(Mode {
            ids,
            name: mode.name.clone(),
            pcu,
        });
    }

    for segment_type in &wire.link_segment_types {
        let ids = fresh_ids(session, EntityKind::LinkSegmentType, &segment_type.ids);
        let key = reference_key(ids.xml_id(), ids.id());
        let index = session.link_segment_types().register(
            &mut network.link_segment_types,
            LinkSegmentType {
                ids,
                name: segment_type.name.clone(),
                capacity_per_lane: segment_type.capacity_per_lane,
                max_density_per_lane: segment_type.max_density_per_lane,
            },
        );
        register(&mut refs.link_segment_types, EntityKind::LinkSegmentType, key, index)?;
    }

    for node in &wire.nodes {
        let ids = fresh_ids(session, EntityKind::Node, &node.ids);
        let position = node
            .point
            .as_ref()
            .map(|point| session.codec().decode_point(point, session.transform()))
            .transpose()?;
        register(
            &mut refs.nodes,
            EntityKind::Node,
            reference_key(ids.xml_id(), ids.id()),
            network.nodes.len(),
        )?;
        network.nodes.push(Node { ids, position });
    }

    for link in &wire.links {
        let ids = fresh_ids(session, EntityKind::Link, &link.ids);
        let link_key = reference_key(ids.xml_id(), ids.id());
        register_unique(&mut refs.links, EntityKind::Link, link_key.clone())?;

        let node_a = lookup(&refs.nodes, EntityKind::Node, &link.node_a_ref)?;
        let node_b = lookup(&refs.nodes, EntityKind::Node, &link.node_b_ref)?;
        let geometry = link
            .geometry
            .as_ref()
            .map(|line| session.codec().decode_line(line, session.transform()))
            .transpose()
            .map_err(|error| match error {
                XmlError::MalformedGeometry(detail) => {
                    XmlError::MalformedGeometry(format!("link '{link_key}': {detail}"))
                }
                other => other,
            })?
            .filter(|line| {
                let usable = line.0.len() >= 2;
                if !usable {
                    tracing::debug!(
                        "Dropping geometry of link '{}' with {} position(s)",
                        link_key,
                        line.0.len()
                    );
                }
                usable
            });
        let length = session.codec().length(link.length.as_ref(), geometry.as_ref())?;
        if let Some(warning) = length.warning(&link_key) {
            session.warn(warning);
        }

        let mut segments = Vec::with_capacity(link.segments.len());
        for segment in &link.segments {
            let segment_ids = fresh_ids(session, EntityKind::LinkSegment, &segment.ids);
            register_unique(
                &mut refs.link_segments,
                EntityKind::LinkSegment,
                reference_key(segment_ids.xml_id(), segment_ids.id()),
            )?;
            segments.push(LinkSegment {
                ids: segment_ids,
                direction: segment.direction,
                segment_type: lookup(
                    &refs.link_segment_types,
                    EntityKind::LinkSegmentType,
                    &segment.type_ref,
                )?,
                lanes: segment.lanes,
                max_speed: segment.max_speed,
            });
        }

        network.links.push(Link {
            ids,
            node_a,
            node_b,
            length_km: length.km(),
            explicit_length: link.length.is_some(),
            geometry,
            segments,
        });
    }

    Ok(())
}

fn read_zoning(
    session: &mut ConversionSession,
    input: &mut MacroscopicInput,
    wire: &WireZoning,
) -> Result<()> {
    for zone in &wire.zones {
        let ids = fresh_ids(session, EntityKind::Zone, &zone.ids);
        let centroid = zone
            .centroid
            .as_ref()
            .map(|point| session.codec().decode_point(point, session.transform()))
            .transpose()?;
        let boundary = zone
            .boundary
            .as_ref()
            .map(|polygon| session.codec().decode_polygon(polygon, session.transform()))
            .transpose()?;
        input.zoning.zones.register(Zone {
            ids,
            centroid,
            boundary,
        })?;
    }
    Ok(())
}

fn read_demand(
    session: &mut ConversionSession,
    input: &mut MacroscopicInput,
    refs: &mut References,
    wire: &WireDemand,
) -> Result<()> {
    for period in &wire.time_periods {
        let ids = session.ids().ids(EntityKind::TimePeriod, period.id.clone(), None);
        register(
            &mut refs.time_periods,
            EntityKind::TimePeriod,
            reference_key(ids.xml_id(), ids.id()),
            input.demands.time_periods.len(),
        )?;
        input.demands.time_periods.push(TimePeriod {
            ids,
            description: period.description.clone(),
            start_seconds: period.start_time,
            duration_seconds: period.duration,
        });
    }

    let mut decoder = OdMatrixDecoder::new(
        &input.zoning.zones,
        session.settings().positional_zone_check,
    );
    let mut od_demands = Vec::with_capacity(wire.od_matrices.len());
    for matrix in &wire.od_matrices {
        let time_period = lookup(&refs.time_periods, EntityKind::TimePeriod, &matrix.time_period_ref)?;
        let mode = lookup(&refs.modes, EntityKind::Mode, &matrix.mode_ref)?;
        let pcu = input.network.modes[mode].pcu;
        od_demands.push(OdDemands {
            time_period,
            mode,
            matrix: decoder.decode(&matrix.fragment, pcu)?,
        });
    }
    session.extend_warnings(decoder.take_warnings());
    input.demands.od_demands = od_demands;

    Ok(())
}
