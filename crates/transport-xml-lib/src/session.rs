//! Per-conversion state
//!
//! A [`ConversionSession`] is opened for every file read or written. It owns
//! the resolved CRS, the transform into it, the geometry codec, the internal
//! id generator, the link segment type registry and the warnings collected
//! along the way. Nothing here is shared between sessions.

use crate::crs::{Crs, resolve};
use crate::geometry::GeometryCodec;
use crate::ids::IdGenerator;
use crate::model::LinkSegmentType;
use crate::settings::ValidatedSettings;
use crate::transform::{Transform, build_transform};
use crate::{ConversionWarning, Result};
use std::collections::HashMap;

/// Merges link segment types that share an external id
#[derive(Debug, Default)]
pub struct LinkSegmentTypeRegistry {
    by_external_id: HashMap<String, usize>,
}

impl LinkSegmentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `candidate` to `types`, or merge it into the type with the same external id
    ///
    /// Merging only fills properties the existing type lacks. Returns the
    /// index the candidate ended up at.
    pub fn register(&mut self, types: &mut Vec<LinkSegmentType>, candidate: LinkSegmentType) -> usize {
        if let Some(external_id) = candidate.ids.external_id() {
            if let Some(&index) = self.by_external_id.get(external_id) {
                let existing = &mut types[index];
                existing.name = existing.name.take().or(candidate.name);
                existing.capacity_per_lane =
                    existing.capacity_per_lane.or(candidate.capacity_per_lane);
                existing.max_density_per_lane =
                    existing.max_density_per_lane.or(candidate.max_density_per_lane);
                tracing::debug!(
                    "Merged link segment type with external id '{}' into existing type {}",
                    external_id,
                    existing.ids.id()
                );
                return index;
            }
            self.by_external_id.insert(external_id.to_string(), types.len());
        }
        types.push(candidate);
        types.len() - 1
    }

    pub fn reset(&mut self) {
        self.by_external_id.clear();
    }
}

/// State owned by one read or write
#[derive(Debug)]
pub struct ConversionSession {
    settings: ValidatedSettings,
    source_crs: Option<Crs>,
    crs: Crs,
    transform: Option<Transform>,
    codec: GeometryCodec,
    ids: IdGenerator,
    link_segment_types: LinkSegmentTypeRegistry,
    warnings: Vec<ConversionWarning>,
}

impl ConversionSession {
    /// Resolve the destination CRS for coordinates in `source_crs` and prepare the codec
    ///
    /// Without a source CRS coordinates are taken to already be in the
    /// resolved CRS.
    pub fn open(settings: ValidatedSettings, source_crs: Option<Crs>) -> Result<Self> {
        let crs = resolve(
            settings.destination_crs.as_ref(),
            settings.country_hint(),
            source_crs.as_ref(),
        )?;
        let transform = match &source_crs {
            Some(source) => build_transform(source, &crs)?,
            None => {
                tracing::debug!("No source CRS, coordinates are taken to be in {}", crs);
                None
            }
        };
        let codec = GeometryCodec::new(
            crs.clone(),
            settings.separators,
            settings.number_format.fraction_digits,
        )?;

        Ok(Self {
            settings,
            source_crs,
            crs,
            transform,
            codec,
            ids: IdGenerator::new(),
            link_segment_types: LinkSegmentTypeRegistry::new(),
            warnings: Vec::new(),
        })
    }

    #[inline]
    pub fn settings(&self) -> &ValidatedSettings {
        &self.settings
    }

    #[inline]
    pub fn source_crs(&self) -> Option<&Crs> {
        self.source_crs.as_ref()
    }

    /// Resolved destination CRS
    #[inline]
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    #[inline]
    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    #[inline]
    pub fn codec(&self) -> &GeometryCodec {
        &self.codec
    }

    #[inline]
    pub fn ids(&mut self) -> &mut IdGenerator {
        &mut self.ids
    }

    #[inline]
    pub fn link_segment_types(&mut self) -> &mut LinkSegmentTypeRegistry {
        &mut self.link_segment_types
    }

    /// Record and log a recoverable warning
    pub fn warn(&mut self, warning: ConversionWarning) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Record warnings that were already logged where they arose
    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = ConversionWarning>) {
        self.warnings.extend(warnings);
    }

    pub fn warnings(&self) -> &[ConversionWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<ConversionWarning> {
        self.warnings
    }
}
