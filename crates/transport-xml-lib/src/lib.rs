//! # Transport XML
//!
//! Reads and writes macroscopic transport inputs (network, zoning and OD
//! demand) in their XML form, reprojecting coordinates between reference
//! systems on the way.
//!
//! ## Features
//!
//! - **CRS resolution**: destination CRS from explicit settings, a country
//!   hint or the source document, with UTM, Web Mercator and Lambert support
//! - **Geometry codec**: position lists and delimited coordinate strings,
//!   link length from an explicit value or by geodesic integration
//! - **OD matrices**: cell-by-cell, row-compressed and raw encodings decoded
//!   into dense matrices with pcu scaling
//! - **Identifier mapping**: internal, external or XML ids chosen per writer
//! - **Atomic output**: documents are serialized fully before being persisted
//!
//! ## Usage
//!
//! ```ignore
//! use transport_xml_lib::{InputReader, InputWriter, Settings};
//!
//! let settings = Settings {
//!     destination_crs: Some("EPSG:32756".into()),
//!     output_dir: Some("out".into()),
//!     file_name: Some("network.xml".into()),
//!     ..Settings::default()
//! };
//!
//! let outcome = InputReader::new(settings.clone())?.read_file("input.xml")?;
//! InputWriter::new(settings)?.write(&outcome.input)?;
//! ```

pub mod crs;
pub mod geometry;
pub mod ids;
pub mod matrix;
pub mod model;
pub mod projection;
pub mod reader;
pub mod session;
pub mod settings;
pub mod text;
pub mod transform;
pub mod wire;
pub mod writer;
pub mod xml;

pub use crs::{Crs, CrsKind, resolve};
pub use geometry::{GeometryCodec, LengthOutcome};
pub use ids::{EntityKind, IdMapper, IdMapping};
pub use matrix::{DemandMatrix, MatrixEncoding, OdMatrixDecoder, OdMatrixFragment, PositionalCheck};
pub use model::MacroscopicInput;
pub use reader::{InputReader, ReadOutcome};
pub use settings::{LineEncoding, Settings, ValidatedSettings};
pub use transform::{Transform, build_transform};
pub use writer::InputWriter;

use std::fmt;
use thiserror::Error;

/// Errors that abort the conversion of the current file
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("Geometry transform failed: {0}")]
    GeometryTransform(String),

    #[error("Unknown zone reference '{reference}' ({context})")]
    UnknownZoneReference { reference: String, context: String },

    #[error("OD matrix is not square: {0}")]
    NonSquareMatrix(String),

    #[error("Unsupported projection: {0}")]
    UnsupportedProjection(String),

    #[error("Id mapping mode '{mode}' is not supported for {kind} entities")]
    UnsupportedMappingMode { mode: IdMapping, kind: EntityKind },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Unknown {kind} reference '{reference}'")]
    UnknownReference { kind: EntityKind, reference: String },

    #[error("Duplicate {kind} id '{id}'")]
    DuplicateId { kind: EntityKind, id: String },

    #[error("{kind} {entity} would be written with id '{id}', which another {kind} already uses")]
    DuplicateMappedId {
        kind: EntityKind,
        entity: u64,
        id: String,
    },

    #[error("Malformed OD matrix value '{token}' at row {row}, column {column}")]
    MalformedMatrixValue {
        row: usize,
        column: usize,
        token: String,
    },

    #[error("Invalid demand {value} from zone '{origin}' to zone '{destination}'")]
    NegativeDemand {
        origin: String,
        destination: String,
        value: f64,
    },

    #[error("OD matrix has {found} zones but the zoning has {expected}")]
    MatrixDimensionMismatch { expected: usize, found: usize },

    #[error("Zone numbering does not follow registration order: {0}")]
    PositionalZoneMismatch(String),
}

pub type Result<T> = std::result::Result<T, XmlError>;

/// Recoverable conditions collected while converting
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConversionWarning {
    /// Link has neither an explicit length nor a usable geometry, length set to 0
    LengthUnavailable { link: String },
    /// Numeric zone ids disagree with the positional numbering of compact matrices
    PositionalZoneOrder { detail: String },
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionWarning::LengthUnavailable { link } => write!(
                f,
                "link '{link}' has no explicit length and no usable geometry, length set to 0 km"
            ),
            ConversionWarning::PositionalZoneOrder { detail } => f.write_str(detail),
        }
    }
}
