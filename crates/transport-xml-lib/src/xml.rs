//! XML text <-> wire document
//!
//! Reading builds a small element tree from quick-xml events (local names
//! only, so `gml:posList` and `posList` are the same element) and maps it
//! onto the wire types. Unknown elements and attributes are ignored; there is
//! no schema validation. Writing emits the events directly.

use crate::geometry::{ExplicitLength, LengthUnit};
use crate::matrix::{OdCell, OdMatrixFragment, OdRow};
use crate::text::NumberFormat;
use crate::wire::*;
use crate::{Result, XmlError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use std::str::FromStr;

pub const GML_NAMESPACE: &str = "http://www.opengis.net/gml";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

const ROOT: &str = "PLANit";
const NETWORK: &str = "macroscopicnetwork";
const ZONING: &str = "macroscopiczoning";
const DEMAND: &str = "macroscopicdemand";

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

fn xml_error(context: &str, error: impl std::fmt::Display) -> XmlError {
    XmlError::Xml(format!("{context}: {error}"))
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = std::str::from_utf8(start.local_name().as_ref())
            .map_err(|e| xml_error("element name", e))?
            .to_string();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| xml_error(&format!("attribute of <{name}>"), e))?;
            let key = std::str::from_utf8(attribute.key.local_name().as_ref())
                .map_err(|e| xml_error(&format!("attribute key of <{name}>"), e))?
                .to_string();
            let value = attribute
                .unescape_value()
                .map_err(|e| xml_error(&format!("attribute '{key}' of <{name}>"), e))?
                .to_string();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn required_attr(&self, name: &str) -> Result<&str> {
        self.attr(name).ok_or_else(|| {
            XmlError::Xml(format!("<{}> is missing attribute '{name}'", self.name))
        })
    }

    fn parse_attr<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.attr(name)
            .map(|value| {
                value.trim().parse::<T>().map_err(|_| {
                    XmlError::Xml(format!(
                        "attribute '{name}' of <{}> has invalid value '{value}'",
                        self.name
                    ))
                })
            })
            .transpose()
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }
}

/// `parent/group/item*`, empty when any level is missing
fn items<'a>(
    parent: Option<&'a Element>,
    group: &'a str,
    item: &'a str,
) -> impl Iterator<Item = &'a Element> + 'a {
    parent
        .and_then(|p| p.child(group))
        .into_iter()
        .flat_map(move |g| g.children_named(item))
}

fn parse_tree(text: &str) -> Result<Element> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let attach = |stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element| {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None => {
                root.get_or_insert(element);
            }
        }
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(Element::from_start(e)?),
            Ok(Event::Empty(ref e)) => {
                let element = Element::from_start(e)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Xml("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text
                        .push_str(&e.unescape().map_err(|e| xml_error("text content", e))?);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(XmlError::Xml(format!(
                    "parse error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Xml(format!("<{}> is never closed", open.name)));
    }
    root.ok_or_else(|| XmlError::Xml("document has no root element".to_string()))
}

/// Parse XML text into a wire document
pub fn read_document(text: &str) -> Result<WireDocument> {
    #[cfg(feature = "profiling")]
    profiling::scope!("xml::read_document");

    let root = parse_tree(text)?;
    // A bare section is accepted as its own document
    let sections: &[Element] = if root.name == ROOT {
        &root.children
    } else {
        std::slice::from_ref(&root)
    };
    let section = |name: &str| sections.iter().find(|s| s.name == name);

    Ok(WireDocument {
        network: read_network(section(NETWORK))?,
        zoning: read_zoning(section(ZONING))?,
        demand: read_demand(section(DEMAND))?,
        schema_location: root.attr("schemaLocation").map(str::to_owned),
    })
}

fn read_ids(element: &Element) -> WireIds {
    WireIds {
        id: element.attr("id").map(str::to_owned),
        external_id: element.attr("externalid").map(str::to_owned),
    }
}

fn parse_numbers(text: &str, context: &str) -> Result<Vec<f64>> {
    text.split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                XmlError::MalformedGeometry(format!("{context}: '{token}' is not a number"))
            })
        })
        .collect()
}

fn read_point(point: &Element) -> Result<WirePoint> {
    let pos = point.child("pos").ok_or_else(|| {
        XmlError::MalformedGeometry(format!("<{}> has no <pos>", point.name))
    })?;
    Ok(WirePoint {
        pos: parse_numbers(&pos.text, "pos")?,
    })
}

fn read_line(line: &Element) -> Result<WireLineString> {
    if let Some(pos_list) = line.child("posList") {
        return Ok(WireLineString::PosList(parse_numbers(&pos_list.text, "posList")?));
    }
    if let Some(coordinates) = line.child("coordinates") {
        return Ok(WireLineString::Coordinates(WireCoordinates {
            text: coordinates.text.clone(),
            tuple_separator: coordinates.attr("ts").map(str::to_owned),
            value_separator: coordinates.attr("cs").map(str::to_owned),
            decimal: coordinates.attr("decimal").map(str::to_owned),
        }));
    }
    Err(XmlError::MalformedGeometry(
        "<LineString> has neither <posList> nor <coordinates>".to_string(),
    ))
}

fn read_polygon(polygon: &Element) -> Result<WirePolygon> {
    let pos_list = polygon
        .child("exterior")
        .and_then(|exterior| exterior.child("LinearRing"))
        .and_then(|ring| ring.child("posList"))
        .ok_or_else(|| {
            XmlError::MalformedGeometry("<Polygon> has no exterior ring position list".to_string())
        })?;
    Ok(WirePolygon {
        exterior: parse_numbers(&pos_list.text, "polygon posList")?,
    })
}

fn read_network(network: Option<&Element>) -> Result<WireNetwork> {
    let Some(network) = network else {
        return Ok(WireNetwork::default());
    };
    let configuration = network.child("configuration");

    let modes = items(configuration, "modes", "mode")
        .map(|mode| {
            Ok(WireMode {
                ids: read_ids(mode),
                name: mode.attr("name").map(str::to_owned),
                pcu: mode.parse_attr("pcu")?,
            })
        })
        .collect::<Result<_>>()?;

    let link_segment_types = items(configuration, "linksegmenttypes", "linksegmenttype")
        .map(|segment_type| {
            Ok(WireLinkSegmentType {
                ids: read_ids(segment_type),
                name: segment_type.attr("name").map(str::to_owned),
                capacity_per_lane: segment_type.parse_attr("capacitylane")?,
                max_density_per_lane: segment_type.parse_attr("maxdensitylane")?,
            })
        })
        .collect::<Result<_>>()?;

    let nodes = items(Some(network), "nodes", "node")
        .map(|node| {
            Ok(WireNode {
                ids: read_ids(node),
                point: node.child("Point").map(read_point).transpose()?,
            })
        })
        .collect::<Result<_>>()?;

    let links = items(Some(network), "links", "link")
        .map(read_link)
        .collect::<Result<_>>()?;

    Ok(WireNetwork {
        srsname: network.attr("srsname").map(str::to_owned),
        modes,
        link_segment_types,
        nodes,
        links,
    })
}

fn read_link(link: &Element) -> Result<WireLink> {
    let length = link
        .child("length")
        .map(|length| {
            let value = length.text.trim().parse::<f64>().map_err(|_| {
                XmlError::Xml(format!("<length> has invalid value '{}'", length.text))
            })?;
            let unit = length
                .attr("unit")
                .map(LengthUnit::from_str)
                .transpose()?
                .unwrap_or_default();
            Ok::<_, XmlError>(ExplicitLength { value, unit })
        })
        .transpose()?;

    let segments = link
        .children_named("linksegment")
        .map(|segment| {
            Ok(WireLinkSegment {
                ids: read_ids(segment),
                direction: segment.required_attr("dir")?.parse()?,
                type_ref: segment.required_attr("typeref")?.to_string(),
                lanes: segment.parse_attr("numberoflanes")?,
                max_speed: segment.parse_attr("maxspeed")?,
            })
        })
        .collect::<Result<_>>()?;

    Ok(WireLink {
        ids: read_ids(link),
        node_a_ref: link.required_attr("nodearef")?.to_string(),
        node_b_ref: link.required_attr("nodebref")?.to_string(),
        length,
        geometry: link.child("LineString").map(read_line).transpose()?,
        segments,
    })
}

fn read_zoning(zoning: Option<&Element>) -> Result<WireZoning> {
    let zones = items(zoning, "zones", "zone")
        .map(|zone| {
            Ok(WireZone {
                ids: read_ids(zone),
                centroid: zone
                    .child("centroid")
                    .and_then(|centroid| centroid.child("Point"))
                    .map(read_point)
                    .transpose()?,
                boundary: zone.child("Polygon").map(read_polygon).transpose()?,
            })
        })
        .collect::<Result<_>>()?;
    Ok(WireZoning { zones })
}

/// Seconds since midnight from `25200`, `07:00` or `07:00:00`
fn parse_time_of_day(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }
    let parts: Vec<u64> = value
        .split(':')
        .map(|part| part.parse().ok())
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        [h, m] if *m < 60 => Some(h * 3600 + m * 60),
        [h, m, s] if *m < 60 && *s < 60 => Some(h * 3600 + m * 60 + s),
        _ => None,
    }
}

fn read_demand(demand: Option<&Element>) -> Result<WireDemand> {
    let time_periods = items(demand, "timeperiods", "timeperiod")
        .map(|period| {
            let time = |name: &str| {
                parse_time_of_day(period.required_attr(name)?).ok_or_else(|| {
                    XmlError::Xml(format!(
                        "attribute '{name}' of <timeperiod> is not a time of day"
                    ))
                })
            };
            Ok(WireTimePeriod {
                id: period.attr("id").map(str::to_owned),
                description: period.attr("description").map(str::to_owned),
                start_time: time("starttime")?,
                duration: time("duration")?,
            })
        })
        .collect::<Result<_>>()?;

    let mut od_matrices = Vec::new();
    if let Some(od_demands) = demand.and_then(|d| d.child("oddemands")) {
        for matrix in &od_demands.children {
            let fragment = match matrix.name.as_str() {
                "odcellbycellmatrix" => read_cell_by_cell(matrix)?,
                "odrowmatrix" => OdMatrixFragment::RowCompressed {
                    value_delimiter: matrix.attr("ds").map(str::to_owned),
                    rows: matrix
                        .children_named("odrow")
                        .map(|row| {
                            Ok(OdRow {
                                origin_ref: row.required_attr("ref")?.to_string(),
                                values: row.text.clone(),
                            })
                        })
                        .collect::<Result<_>>()?,
                },
                "odrawmatrix" => {
                    let values = matrix.child("values").ok_or_else(|| {
                        XmlError::Xml("<odrawmatrix> has no <values>".to_string())
                    })?;
                    OdMatrixFragment::Raw {
                        origin_delimiter: values.attr("os").map(str::to_owned),
                        destination_delimiter: values.attr("ds").map(str::to_owned),
                        values: values.text.clone(),
                    }
                }
                _ => continue,
            };
            od_matrices.push(WireOdMatrix {
                time_period_ref: matrix.required_attr("timeperiodref")?.to_string(),
                mode_ref: matrix.required_attr("moderef")?.to_string(),
                fragment,
            });
        }
    }

    Ok(WireDemand {
        time_periods,
        od_matrices,
    })
}

fn read_cell_by_cell(matrix: &Element) -> Result<OdMatrixFragment> {
    let mut cells = Vec::new();
    for (row, origin) in matrix.children_named("o").enumerate() {
        let origin_ref = origin.required_attr("ref")?;
        for (column, destination) in origin.children_named("d").enumerate() {
            let token = destination.text.trim();
            let value = token
                .parse::<f64>()
                .map_err(|_| XmlError::MalformedMatrixValue {
                    row,
                    column,
                    token: token.to_string(),
                })?;
            cells.push(OdCell {
                origin_ref: origin_ref.to_string(),
                destination_ref: destination.required_attr("ref")?.to_string(),
                value,
            });
        }
    }
    Ok(OdMatrixFragment::CellByCell { cells })
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

struct XmlOut {
    writer: Writer<Cursor<Vec<u8>>>,
    /// Positions, lengths and matrix cells: '.' and fixed fraction digits
    fixed: NumberFormat,
}

fn write_error(error: impl std::fmt::Display) -> XmlError {
    XmlError::Xml(format!("write error: {error}"))
}

fn start<'a>(name: &'a str, attributes: &[(&str, Option<String>)]) -> BytesStart<'a> {
    let mut element = BytesStart::new(name);
    for (key, value) in attributes {
        if let Some(value) = value {
            element.push_attribute((*key, value.as_str()));
        }
    }
    element
}

fn ids_attributes(ids: &WireIds) -> [(&'static str, Option<String>); 2] {
    [("id", ids.id.clone()), ("externalid", ids.external_id.clone())]
}

fn number(value: f64) -> String {
    format!("{value}")
}

impl XmlOut {
    fn new(fraction_digits: usize) -> Result<Self> {
        Ok(Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
            fixed: NumberFormat::new('.', fraction_digits)?,
        })
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(write_error)
    }

    fn open(&mut self, element: BytesStart<'_>) -> Result<()> {
        self.event(Event::Start(element))
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, element: BytesStart<'_>) -> Result<()> {
        self.event(Event::Empty(element))
    }

    fn text_element(&mut self, element: BytesStart<'_>, text: &str) -> Result<()> {
        let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
        self.open(element)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.close(&name)
    }

    fn positions(&self, values: &[f64]) -> String {
        values
            .iter()
            .map(|value| self.fixed.format(*value))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn point(&mut self, point: &WirePoint) -> Result<()> {
        self.open(BytesStart::new("gml:Point"))?;
        let pos = self.positions(&point.pos);
        self.text_element(BytesStart::new("gml:pos"), &pos)?;
        self.close("gml:Point")
    }

    fn finish(self) -> Vec<u8> {
        let mut output = self.writer.into_inner().into_inner();
        output.push(b'\n');
        output
    }
}

/// Serialize a wire document
///
/// Positions, explicit lengths and cell values are written with
/// `fraction_digits` digits; other numeric attributes in their shortest form.
pub fn write_document(document: &WireDocument, fraction_digits: usize) -> Result<String> {
    #[cfg(feature = "profiling")]
    profiling::scope!("xml::write_document");

    let mut out = XmlOut::new(fraction_digits)?;
    out.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    out.open(start(
        ROOT,
        &[
            ("xmlns:gml", Some(GML_NAMESPACE.to_string())),
            ("xmlns:xsi", Some(XSI_NAMESPACE.to_string())),
            ("xsi:schemaLocation", document.schema_location.clone()),
        ],
    ))?;
    write_network(&mut out, &document.network)?;
    if !document.zoning.zones.is_empty() {
        write_zoning(&mut out, &document.zoning)?;
    }
    if !(document.demand.time_periods.is_empty() && document.demand.od_matrices.is_empty()) {
        write_demand(&mut out, &document.demand)?;
    }
    out.close(ROOT)?;

    String::from_utf8(out.finish()).map_err(write_error)
}

fn write_network(out: &mut XmlOut, network: &WireNetwork) -> Result<()> {
    out.open(start(NETWORK, &[("srsname", network.srsname.clone())]))?;

    out.open(BytesStart::new("configuration"))?;
    out.open(BytesStart::new("modes"))?;
    for mode in &network.modes {
        let [id, external_id] = ids_attributes(&mode.ids);
        out.empty(start(
            "mode",
            &[
                id,
                external_id,
                ("name", mode.name.clone()),
                ("pcu", mode.pcu.map(number)),
            ],
        ))?;
    }
    out.close("modes")?;
    out.open(BytesStart::new("linksegmenttypes"))?;
    for segment_type in &network.link_segment_types {
        let [id, external_id] = ids_attributes(&segment_type.ids);
        out.empty(start(
            "linksegmenttype",
            &[
                id,
                external_id,
                ("name", segment_type.name.clone()),
                ("capacitylane", segment_type.capacity_per_lane.map(number)),
                ("maxdensitylane", segment_type.max_density_per_lane.map(number)),
            ],
        ))?;
    }
    out.close("linksegmenttypes")?;
    out.close("configuration")?;

    out.open(BytesStart::new("nodes"))?;
    for node in &network.nodes {
        let element = start("node", &ids_attributes(&node.ids));
        match &node.point {
            Some(point) => {
                out.open(element)?;
                out.point(point)?;
                out.close("node")?;
            }
            None => out.empty(element)?,
        }
    }
    out.close("nodes")?;

    out.open(BytesStart::new("links"))?;
    for link in &network.links {
        write_link(out, link)?;
    }
    out.close("links")?;

    out.close(NETWORK)
}

fn write_link(out: &mut XmlOut, link: &WireLink) -> Result<()> {
    let [id, external_id] = ids_attributes(&link.ids);
    out.open(start(
        "link",
        &[
            id,
            external_id,
            ("nodearef", Some(link.node_a_ref.clone())),
            ("nodebref", Some(link.node_b_ref.clone())),
        ],
    ))?;

    if let Some(length) = &link.length {
        out.text_element(
            start("length", &[("unit", Some(length.unit.to_string()))]),
            &out.fixed.format(length.value),
        )?;
    }

    match &link.geometry {
        Some(WireLineString::PosList(values)) => {
            out.open(BytesStart::new("gml:LineString"))?;
            let text = out.positions(values);
            out.text_element(BytesStart::new("gml:posList"), &text)?;
            out.close("gml:LineString")?;
        }
        Some(WireLineString::Coordinates(coordinates)) => {
            out.open(BytesStart::new("gml:LineString"))?;
            out.text_element(
                start(
                    "gml:coordinates",
                    &[
                        ("cs", coordinates.value_separator.clone()),
                        ("ts", coordinates.tuple_separator.clone()),
                        ("decimal", coordinates.decimal.clone()),
                    ],
                ),
                &coordinates.text,
            )?;
            out.close("gml:LineString")?;
        }
        None => {}
    }

    for segment in &link.segments {
        let [id, external_id] = ids_attributes(&segment.ids);
        out.empty(start(
            "linksegment",
            &[
                id,
                external_id,
                ("dir", Some(segment.direction.to_string())),
                ("typeref", Some(segment.type_ref.clone())),
                ("numberoflanes", segment.lanes.map(|lanes| lanes.to_string())),
                ("maxspeed", segment.max_speed.map(number)),
            ],
        ))?;
    }

    out.close("link")
}

fn write_zoning(out: &mut XmlOut, zoning: &WireZoning) -> Result<()> {
    out.open(BytesStart::new(ZONING))?;
    out.open(BytesStart::new("zones"))?;
    for zone in &zoning.zones {
        let element = start("zone", &ids_attributes(&zone.ids));
        if zone.centroid.is_none() && zone.boundary.is_none() {
            out.empty(element)?;
            continue;
        }
        out.open(element)?;
        if let Some(centroid) = &zone.centroid {
            out.open(BytesStart::new("centroid"))?;
            out.point(centroid)?;
            out.close("centroid")?;
        }
        if let Some(boundary) = &zone.boundary {
            out.open(BytesStart::new("gml:Polygon"))?;
            out.open(BytesStart::new("gml:exterior"))?;
            out.open(BytesStart::new("gml:LinearRing"))?;
            let text = out.positions(&boundary.exterior);
            out.text_element(BytesStart::new("gml:posList"), &text)?;
            out.close("gml:LinearRing")?;
            out.close("gml:exterior")?;
            out.close("gml:Polygon")?;
        }
        out.close("zone")?;
    }
    out.close("zones")?;
    out.close(ZONING)
}

fn write_demand(out: &mut XmlOut, demand: &WireDemand) -> Result<()> {
    out.open(BytesStart::new(DEMAND))?;

    out.open(BytesStart::new("timeperiods"))?;
    for period in &demand.time_periods {
        out.empty(start(
            "timeperiod",
            &[
                ("id", period.id.clone()),
                ("description", period.description.clone()),
                ("starttime", Some(period.start_time.to_string())),
                ("duration", Some(period.duration.to_string())),
            ],
        ))?;
    }
    out.close("timeperiods")?;

    out.open(BytesStart::new("oddemands"))?;
    for matrix in &demand.od_matrices {
        let refs = [
            ("timeperiodref", Some(matrix.time_period_ref.clone())),
            ("moderef", Some(matrix.mode_ref.clone())),
        ];
        match &matrix.fragment {
            OdMatrixFragment::CellByCell { cells } => {
                out.open(start("odcellbycellmatrix", &refs))?;
                let mut cells = cells.iter().peekable();
                while let Some(first) = cells.next() {
                    out.open(start("o", &[("ref", Some(first.origin_ref.clone()))]))?;
                    out.text_element(
                        start("d", &[("ref", Some(first.destination_ref.clone()))]),
                        &out.fixed.format(first.value),
                    )?;
                    while let Some(cell) = cells.next_if(|c| c.origin_ref == first.origin_ref) {
                        out.text_element(
                            start("d", &[("ref", Some(cell.destination_ref.clone()))]),
                            &out.fixed.format(cell.value),
                        )?;
                    }
                    out.close("o")?;
                }
                out.close("odcellbycellmatrix")?;
            }
            OdMatrixFragment::RowCompressed {
                value_delimiter,
                rows,
            } => {
                let [period_ref, mode_ref] = refs;
                out.open(start(
                    "odrowmatrix",
                    &[period_ref, mode_ref, ("ds", value_delimiter.clone())],
                ))?;
                for row in rows {
                    out.text_element(
                        start("odrow", &[("ref", Some(row.origin_ref.clone()))]),
                        &row.values,
                    )?;
                }
                out.close("odrowmatrix")?;
            }
            OdMatrixFragment::Raw {
                origin_delimiter,
                destination_delimiter,
                values,
            } => {
                out.open(start("odrawmatrix", &refs))?;
                out.text_element(
                    start(
                        "values",
                        &[
                            ("os", origin_delimiter.clone()),
                            ("ds", destination_delimiter.clone()),
                        ],
                    ),
                    values,
                )?;
                out.close("odrawmatrix")?;
            }
        }
    }
    out.close("oddemands")?;

    out.close(DEMAND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PLANit xmlns:gml="http://www.opengis.net/gml"
        xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
        xsi:schemaLocation="https://trafficplanit.github.io/PLANitManual/xsd/macroscopicinput.xsd">
  <macroscopicnetwork srsname="EPSG:4326">
    <configuration>
      <modes><mode id="car" externalid="1" name="car" pcu="1.5"/></modes>
      <linksegmenttypes>
        <linksegmenttype id="t1" name="road" capacitylane="1800" maxdensitylane="150"/>
      </linksegmenttypes>
    </configuration>
    <nodes>
      <node id="1"><gml:Point><gml:pos>151.2 -33.8</gml:pos></gml:Point></node>
      <node id="2"/>
    </nodes>
    <links>
      <link id="1" nodearef="1" nodebref="2">
        <length unit="m">2500</length>
        <gml:LineString>
          <gml:coordinates cs="+" ts=";" decimal=".">151.2+-33.8;151.21+-33.81</gml:coordinates>
        </gml:LineString>
        <linksegment id="1" dir="a_b" typeref="t1" numberoflanes="2" maxspeed="60"/>
        <linksegment id="2" dir="b_a" typeref="t1"/>
      </link>
    </links>
  </macroscopicnetwork>
  <macroscopiczoning>
    <zones>
      <zone id="1">
        <centroid><gml:Point><gml:pos>151.2 -33.8</gml:pos></gml:Point></centroid>
        <gml:Polygon><gml:exterior><gml:LinearRing>
          <gml:posList>0 0 1 0 1 1 0 0</gml:posList>
        </gml:LinearRing></gml:exterior></gml:Polygon>
      </zone>
      <zone id="2"/>
    </zones>
  </macroscopiczoning>
  <macroscopicdemand>
    <timeperiods><timeperiod id="am" starttime="07:00" duration="3600"/></timeperiods>
    <oddemands>
      <odcellbycellmatrix timeperiodref="am" moderef="car"><o ref="1"><d ref="2">10</d></o></odcellbycellmatrix>
      <odrowmatrix timeperiodref="am" moderef="car" ds=","><odrow ref="1">0,10</odrow></odrowmatrix>
      <odrawmatrix timeperiodref="am" moderef="car"><values os=";" ds=",">0,1;2,0</values></odrawmatrix>
    </oddemands>
  </macroscopicdemand>
</PLANit>
"#;

    #[test]
    fn test_read_sample_document() {
        let document = read_document(SAMPLE).unwrap();
        let network = &document.network;
        assert_eq!(network.srsname.as_deref(), Some("EPSG:4326"));
        assert_eq!(network.modes[0].pcu, Some(1.5));
        assert_eq!(network.modes[0].ids.external_id.as_deref(), Some("1"));
        assert_eq!(network.link_segment_types[0].capacity_per_lane, Some(1800.0));
        assert_eq!(network.nodes[0].point.as_ref().unwrap().pos, vec![151.2, -33.8]);
        assert!(network.nodes[1].point.is_none());

        let link = &network.links[0];
        assert_eq!(
            link.length,
            Some(ExplicitLength {
                value: 2500.0,
                unit: LengthUnit::Metres
            })
        );
        match link.geometry.as_ref().unwrap() {
            WireLineString::Coordinates(coordinates) => {
                assert_eq!(coordinates.text, "151.2+-33.8;151.21+-33.81");
                assert_eq!(coordinates.value_separator.as_deref(), Some("+"));
                assert_eq!(coordinates.tuple_separator.as_deref(), Some(";"));
            }
            other => panic!("unexpected geometry {other:?}"),
        }
        assert_eq!(link.segments.len(), 2);
        assert_eq!(link.segments[1].direction, Direction::BA);
        assert_eq!(link.segments[0].lanes, Some(2));

        let zones = &document.zoning.zones;
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].boundary.as_ref().unwrap().exterior.len(), 8);

        let demand = &document.demand;
        assert_eq!(demand.time_periods[0].start_time, 7 * 3600);
        assert_eq!(demand.od_matrices.len(), 3);
        assert!(matches!(
            demand.od_matrices[0].fragment,
            OdMatrixFragment::CellByCell { ref cells } if cells.len() == 1 && cells[0].value == 10.0
        ));
        assert!(matches!(
            demand.od_matrices[2].fragment,
            OdMatrixFragment::Raw { ref values, .. } if values == "0,1;2,0"
        ));
        assert!(document.schema_location.is_some());
    }

    #[test]
    fn test_sample_document_converts() {
        let document = read_document(SAMPLE).unwrap();
        let outcome = crate::reader::InputReader::new(crate::Settings::default())
            .unwrap()
            .read_document(&document)
            .unwrap();
        let input = outcome.input;
        assert_eq!(input.network.links[0].length_km, 2.5);
        assert_eq!(input.demands.od_demands.len(), 3);
        assert_eq!(input.demands.od_demands[0].matrix.get(0, 1), 15.0);
        assert_eq!(input.demands.od_demands[2].matrix.get(1, 0), 3.0);
    }

    #[test]
    fn test_write_then_read_wire_document() {
        let document = read_document(SAMPLE).unwrap();
        let text = write_document(&document, 6).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<gml:pos>151.200000 -33.800000</gml:pos>"));
        assert!(text.contains(r#"<length unit="m">2500.000000</length>"#));
        assert!(text.contains(r#"<d ref="2">10.000000</d>"#));
        assert!(text.contains(r#"pcu="1.5""#));

        let reread = read_document(&text).unwrap();
        assert_eq!(reread, document);
    }

    #[test]
    fn test_bare_network_section() {
        let document = read_document(
            r#"<macroscopicnetwork srsname="EPSG:3857"><nodes><node id="a"/></nodes></macroscopicnetwork>"#,
        )
        .unwrap();
        assert_eq!(document.network.srsname.as_deref(), Some("EPSG:3857"));
        assert_eq!(document.network.nodes.len(), 1);
        assert!(document.zoning.zones.is_empty());
    }

    #[test]
    fn test_structural_errors() {
        assert!(matches!(read_document("<PLANit>"), Err(XmlError::Xml(_))));
        assert!(matches!(read_document(""), Err(XmlError::Xml(_))));
        assert!(matches!(
            read_document(r#"<macroscopicnetwork><links><link id="1" nodearef="1"/></links></macroscopicnetwork>"#),
            Err(XmlError::Xml(message)) if message.contains("nodebref")
        ));
        assert!(matches!(
            read_document(r#"<macroscopicnetwork><configuration><modes><mode pcu="x"/></modes></configuration></macroscopicnetwork>"#),
            Err(XmlError::Xml(_))
        ));
    }

    #[test]
    fn test_bad_numbers() {
        assert!(matches!(
            read_document(
                r#"<macroscopicnetwork><nodes><node id="1"><Point><pos>1 north</pos></Point></node></nodes></macroscopicnetwork>"#
            ),
            Err(XmlError::MalformedGeometry(_))
        ));
        assert!(matches!(
            read_document(
                r#"<macroscopicdemand><oddemands><odcellbycellmatrix timeperiodref="a" moderef="b"><o ref="1"><d ref="1">1</d><d ref="2">many</d></o></odcellbycellmatrix></oddemands></macroscopicdemand>"#
            ),
            Err(XmlError::MalformedMatrixValue { row: 0, column: 1, .. })
        ));
    }

    #[test]
    fn test_time_of_day() {
        assert_eq!(parse_time_of_day("3600"), Some(3600));
        assert_eq!(parse_time_of_day("08:30"), Some(8 * 3600 + 30 * 60));
        assert_eq!(parse_time_of_day("08:30:15"), Some(8 * 3600 + 30 * 60 + 15));
        assert_eq!(parse_time_of_day("08:75"), None);
        assert_eq!(parse_time_of_day("soon"), None);
    }
}
