//! Parser for JaCoCo XML coverage reports.
//!
//! Structure:
//!   <report name="...">
//!     <sessioninfo .../>
//!     <package name="com/example">
//!       <sourcefile name="App.java">
//!         <line nr="5" mi="0" ci="3" mb="0" cb="0"/>
//!         <counter type="LINE" missed="1" covered="2"/>
//!       </sourcefile>
//!     </package>
//!   </report>
//!
//! `ci` is the number of covered instructions on a line, `mi` the missed
//! ones; a line is covered when `ci > 0`. File paths are formed as
//! `<package name>/<sourcefile name>`.

use anyhow::{bail, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use super::{attr_map, Parser};
use crate::model::{Block, BlockId, Coverage, CoverageKind, FileCoverage};

pub struct JacocoParser;

impl Parser for JacocoParser {
    fn name(&self) -> &'static str {
        "jacoco"
    }

    fn default_filenames(&self) -> &'static [&'static str] {
        &["jacocoTestReport.xml", "jacoco.xml"]
    }

    fn parse(&self, content: &[u8]) -> Result<Coverage> {
        let mut reader = Reader::from_reader(content);
        reader.trim_text(true);

        let mut cov = Coverage::new(CoverageKind::Loc, self.name());
        let mut buf = Vec::new();
        let mut root_checked = false;
        let mut saw_marker = false;

        let mut package: Option<String> = None;
        let mut current: Option<FileCoverage> = None;

        loop {
            let event = reader.read_event_into(&mut buf);
            match event {
                Err(e) => bail!("XML parse error at {}: {e}", reader.buffer_position()),
                Ok(Event::Eof) => break,
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    let name = e.name().as_ref().to_vec();
                    if !root_checked {
                        if name != b"report" {
                            bail!("root element is not <report>");
                        }
                        root_checked = true;
                        buf.clear();
                        continue;
                    }
                    match name.as_slice() {
                        b"sessioninfo" => saw_marker = true,
                        b"package" => {
                            saw_marker = true;
                            package = attr_map(e).get("name").cloned();
                        }
                        b"sourcefile" => {
                            if let Some(file) = current.take() {
                                cov.push_file(file);
                            }
                            let attrs = attr_map(e);
                            if let Some(file_name) = attrs.get("name") {
                                let path = match package.as_deref() {
                                    Some(p) if !p.is_empty() => format!("{p}/{file_name}"),
                                    _ => file_name.clone(),
                                };
                                current = Some(FileCoverage::new(path));
                            }
                        }
                        b"line" => {
                            if let Some(file) = current.as_mut() {
                                let attrs = attr_map(e);
                                if let Some(nr) =
                                    attrs.get("nr").and_then(|n| n.parse::<u32>().ok())
                                {
                                    let ci = attrs
                                        .get("ci")
                                        .and_then(|c| c.parse::<u64>().ok())
                                        .unwrap_or(0);
                                    file.push_block(Block {
                                        id: BlockId::line(nr),
                                        units: 1,
                                        hits: ci,
                                    });
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"sourcefile" => {
                        if let Some(file) = current.take() {
                            cov.push_file(file);
                        }
                    }
                    b"package" => package = None,
                    _ => {}
                },
                _ => {}
            }
            buf.clear();
        }

        if !root_checked {
            bail!("no XML root element found");
        }
        if !saw_marker {
            bail!("missing <package> or <sessioninfo> element");
        }
        if let Some(file) = current.take() {
            cov.push_file(file);
        }
        Ok(cov)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jacoco() {
        let input = include_bytes!("../../tests/fixtures/jacoco.xml");
        let cov = JacocoParser.parse(input).unwrap();

        assert_eq!(cov.kind, CoverageKind::Loc);
        assert_eq!(cov.format, "jacoco");
        assert_eq!(cov.files.len(), 2);

        let app = &cov.files[0];
        assert_eq!(app.file, "com/example/App.java");
        assert_eq!(app.total, 3);
        assert_eq!(app.covered, 2);
        assert_eq!(app.blocks[0].id, BlockId::line(3));

        let util = &cov.files[1];
        assert_eq!(util.file, "com/example/util/Strings.java");
        assert_eq!(util.total, 2);
        assert_eq!(util.covered, 1);

        assert!(cov.covered <= cov.total);
        for f in &cov.files {
            assert!(f.covered <= f.total);
        }
    }

    #[test]
    fn test_rejects_clover_and_cobertura() {
        assert!(JacocoParser
            .parse(include_bytes!("../../tests/fixtures/clover.xml"))
            .is_err());
        assert!(JacocoParser
            .parse(include_bytes!("../../tests/fixtures/cobertura.xml"))
            .is_err());
    }

    #[test]
    fn test_rejects_bare_report_root() {
        let input = b"<?xml version=\"1.0\"?>\n<report name=\"x\"></report>";
        assert!(JacocoParser.parse(input).is_err());
    }

    #[test]
    fn test_rejects_non_xml() {
        assert!(JacocoParser.parse(b"mode: count\n").is_err());
        assert!(JacocoParser.parse(b"SF:/a.rs\nDA:1,1\n").is_err());
        assert!(JacocoParser.parse(b"{\"RSpec\":{}}").is_err());
    }
}
