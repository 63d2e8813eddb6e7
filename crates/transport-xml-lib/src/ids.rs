//! Entity identifiers and identifier mapping
//!
//! Every persisted entity carries an identifier triple: an internal
//! sequential id (assigned by the session's [`IdGenerator`]), an optional
//! external id and an optional XML id. Writers choose which one ends up in
//! the output through an [`IdMapping`] mode, resolved once per session into
//! pure per-kind [`IdMapper`] functions.

use crate::{Result, XmlError};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// Kinds of persisted entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntityKind {
    Mode,
    LinkSegmentType,
    Node,
    Link,
    LinkSegment,
    Zone,
    TimePeriod,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Mode => "mode",
            EntityKind::LinkSegmentType => "link segment type",
            EntityKind::Node => "node",
            EntityKind::Link => "link",
            EntityKind::LinkSegment => "link segment",
            EntityKind::Zone => "zone",
            EntityKind::TimePeriod => "time period",
        }
    }

    /// Whether entities of this kind have a user supplied external id
    ///
    /// Time periods are identified by their XML id only.
    pub fn has_external_id(&self) -> bool {
        !matches!(self, EntityKind::TimePeriod)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which identifier a writer persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum IdMapping {
    Internal,
    External,
    #[default]
    Xml,
}

impl fmt::Display for IdMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdMapping::Internal => "internal",
            IdMapping::External => "external",
            IdMapping::Xml => "xml",
        })
    }
}

impl FromStr for IdMapping {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" | "id" => Ok(IdMapping::Internal),
            "external" | "externalid" => Ok(IdMapping::External),
            "xml" | "xmlid" => Ok(IdMapping::Xml),
            other => Err(XmlError::Configuration(format!(
                "unknown id mapping mode '{other}' (expected internal, external or xml)"
            ))),
        }
    }
}

/// Identifier triple of one entity
///
/// The internal id is fixed at construction; external and XML ids are set
/// while building the entity and otherwise stay absent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ids {
    id: u64,
    external_id: Option<String>,
    xml_id: Option<String>,
}

impl Ids {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            external_id: None,
            xml_id: None,
        }
    }

    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_xml_id(mut self, xml_id: Option<String>) -> Self {
        self.xml_id = xml_id.filter(|s| !s.trim().is_empty());
        self
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    #[inline]
    pub fn xml_id(&self) -> Option<&str> {
        self.xml_id.as_deref()
    }
}

/// Sequential internal ids per entity kind, owned by one conversion session
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: HashMap<EntityKind, u64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next internal id for `kind`, starting at 0
    pub fn generate(&mut self, kind: EntityKind) -> u64 {
        let next = self.next.entry(kind).or_insert(0);
        let id = *next;
        *next += 1;
        id
    }

    /// Identifier triple with a fresh internal id
    pub fn ids(
        &mut self,
        kind: EntityKind,
        xml_id: Option<String>,
        external_id: Option<String>,
    ) -> Ids {
        Ids::new(self.generate(kind))
            .with_xml_id(xml_id)
            .with_external_id(external_id)
    }

    pub fn reset(&mut self) {
        self.next.clear();
    }
}

/// Entities that carry an identifier triple
pub trait Identified {
    const KIND: EntityKind;

    fn ids(&self) -> &Ids;
}

/// Pure function from an entity of one kind to its persisted identifier
pub struct IdMapper<E> {
    mode: IdMapping,
    map: fn(&E) -> String,
    _kind: PhantomData<fn(&E)>,
}

impl<E> Clone for IdMapper<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for IdMapper<E> {}

impl<E> fmt::Debug for IdMapper<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdMapper").field("mode", &self.mode).finish()
    }
}

fn internal_id<E: Identified>(entity: &E) -> String {
    entity.ids().id().to_string()
}

fn external_id<E: Identified>(entity: &E) -> String {
    entity
        .ids()
        .external_id()
        .map(str::to_owned)
        .unwrap_or_else(|| internal_id(entity))
}

fn xml_id<E: Identified>(entity: &E) -> String {
    entity
        .ids()
        .xml_id()
        .map(str::to_owned)
        .unwrap_or_else(|| internal_id(entity))
}

impl<E: Identified> IdMapper<E> {
    /// Select the mapping function for `mode`
    ///
    /// Fails for modes the entity kind has no accessor for. Absent external
    /// or XML ids fall back to the internal id.
    pub fn for_mode(mode: IdMapping) -> Result<Self> {
        let map: fn(&E) -> String = match mode {
            IdMapping::Internal => internal_id::<E>,
            IdMapping::External if E::KIND.has_external_id() => external_id::<E>,
            IdMapping::External => {
                return Err(XmlError::UnsupportedMappingMode {
                    mode,
                    kind: E::KIND,
                });
            }
            IdMapping::Xml => xml_id::<E>,
        };
        Ok(Self {
            mode,
            map,
            _kind: PhantomData,
        })
    }

    #[inline]
    pub fn mode(&self) -> IdMapping {
        self.mode
    }

    #[inline]
    pub fn map(&self, entity: &E) -> String {
        (self.map)(entity)
    }
}
