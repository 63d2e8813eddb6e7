mod logging;
mod settings;

use settings::Args;
use std::path::{Path, PathBuf};
use thiserror::Error;
use transport_xml_lib::{InputReader, InputWriter, XmlError};

#[derive(Debug, Error)]
enum CliError {
    #[error("reading {}: {source}", path.display())]
    Read { path: PathBuf, source: XmlError },
    #[error("writing: {0}")]
    Write(#[source] XmlError),
    #[error("refusing to overwrite the input file {}", .0.display())]
    WouldOverwriteInput(PathBuf),
}

/// Whether both paths name the same existing file
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Read the input document and write it back out with the requested settings
fn run(args: &Args) -> Result<PathBuf, CliError> {
    profiling::scope!("convert");

    let settings = args.to_settings();
    if let Some(file_name) = &settings.file_name {
        let target = args.output_dir.join(file_name);
        if same_file(&args.input, &target) {
            return Err(CliError::WouldOverwriteInput(target));
        }
    }
    let read_error = |source| CliError::Read {
        path: args.input.clone(),
        source,
    };
    let outcome = InputReader::new(settings.clone())
        .and_then(|reader| reader.read_file(&args.input))
        .map_err(read_error)?;
    if !outcome.warnings.is_empty() {
        tracing::info!("{} warning(s) while reading", outcome.warnings.len());
    }

    InputWriter::new(settings)
        .and_then(|writer| writer.write(&outcome.input))
        .map_err(CliError::Write)
}

fn main() {
    logging::setup_logging_and_profiling();
    let args = Args::from_cli();

    match run(&args) {
        Ok(path) => tracing::info!("Wrote {}", path.display()),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::ffi::OsString;

    const NETWORK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PLANit xmlns:gml="http://www.opengis.net/gml">
  <macroscopicnetwork srsname="EPSG:4326">
    <configuration>
      <modes><mode id="car" pcu="2"/></modes>
      <linksegmenttypes><linksegmenttype id="road" capacitylane="1800"/></linksegmenttypes>
    </configuration>
    <nodes>
      <node id="a"><gml:Point><gml:pos>151.20 -33.87</gml:pos></gml:Point></node>
      <node id="b"><gml:Point><gml:pos>151.21 -33.88</gml:pos></gml:Point></node>
    </nodes>
    <links>
      <link id="ab" nodearef="a" nodebref="b">
        <gml:LineString><gml:posList>151.20 -33.87 151.21 -33.88</gml:posList></gml:LineString>
        <linksegment id="ab1" dir="a_b" typeref="road"/>
      </link>
    </links>
  </macroscopicnetwork>
</PLANit>
"#;

    #[test]
    fn test_run_converts_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("network.xml");
        std::fs::write(&input, NETWORK).unwrap();
        let out = dir.path().join("out");

        let args = Args::try_parse_from([
            OsString::from("transport-xml"),
            input.into_os_string(),
            OsString::from("--output-dir"),
            out.clone().into_os_string(),
            OsString::from("--destination-crs"),
            OsString::from("EPSG:32756"),
        ])
        .unwrap();
        let path = run(&args).unwrap();
        assert_eq!(path, out.join("network.xml"));

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains(r#"srsname="EPSG:32756""#));
        assert!(written.contains(r#"<link id="ab""#));
    }

    #[test]
    fn test_run_refuses_to_overwrite_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("network.xml");
        std::fs::write(&input, NETWORK).unwrap();

        let args = Args::try_parse_from([
            OsString::from("transport-xml"),
            input.clone().into_os_string(),
            OsString::from("--output-dir"),
            dir.path().join(".").into_os_string(),
            OsString::from("--destination-crs"),
            OsString::from("EPSG:32756"),
        ])
        .unwrap();
        assert!(matches!(run(&args), Err(CliError::WouldOverwriteInput(_))));
        assert_eq!(std::fs::read_to_string(&input).unwrap(), NETWORK);
    }

    #[test]
    fn test_run_reports_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            OsString::from("transport-xml"),
            dir.path().join("missing.xml").into_os_string(),
            OsString::from("--output-dir"),
            dir.path().as_os_str().to_owned(),
        ])
        .unwrap();
        assert!(matches!(run(&args), Err(CliError::Read { .. })));
    }
}
