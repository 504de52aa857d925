//! Parser for Cobertura XML coverage reports.
//!
//! Structure:
//!   <coverage line-rate="..." ...>
//!     <sources><source>...</source></sources>
//!     <packages>
//!       <package name="...">
//!         <classes>
//!           <class name="..." filename="..." line-rate="...">
//!             <methods><method ...><lines><line number="..." hits="..."/></lines></method></methods>
//!             <lines><line number="..." hits="..."/></lines>
//!           </class>
//!         </classes>
//!       </package>
//!     </packages>
//!   </coverage>
//!
//! The `<packages>` element distinguishes Cobertura from Clover, which also
//! uses a `<coverage>` root. Lines may appear both under `<method>` and
//! under `<class>`; they are deduplicated by keeping the max hit count.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use super::{attr_map, Parser};
use crate::model::{Block, BlockId, Coverage, CoverageKind, FileCoverage};

pub struct CoberturaParser;

impl Parser for CoberturaParser {
    fn name(&self) -> &'static str {
        "cobertura"
    }

    fn default_filenames(&self) -> &'static [&'static str] {
        &["coverage.xml", "cobertura.xml"]
    }

    fn parse(&self, content: &[u8]) -> Result<Coverage> {
        let mut reader = Reader::from_reader(content);
        reader.trim_text(true);

        let mut cov = Coverage::new(CoverageKind::Loc, self.name());
        let mut buf = Vec::new();
        let mut root_checked = false;
        let mut saw_packages = false;

        let mut sources: Vec<String> = Vec::new();
        let mut in_source = false;

        // Line hit counts per file, in first-seen order. Keyed by resolved
        // filename rather than per <class>: inner classes repeat the same
        // filename across several <class> elements and must fold into one
        // entry. Dedup keeps the max hit count, which also covers lines
        // repeated under both <method> and <class>.
        let mut files: Vec<(String, BTreeMap<u32, u64>)> = Vec::new();
        let mut current: Option<usize> = None;

        loop {
            let event = reader.read_event_into(&mut buf);
            match event {
                Err(e) => bail!("XML parse error at {}: {e}", reader.buffer_position()),
                Ok(Event::Eof) => break,
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    let is_start = matches!(event, Ok(Event::Start(_)));
                    let name = e.name().as_ref().to_vec();
                    if !root_checked {
                        if name != b"coverage" {
                            bail!("root element is not <coverage>");
                        }
                        root_checked = true;
                        buf.clear();
                        continue;
                    }
                    match name.as_slice() {
                        b"packages" => saw_packages = true,
                        b"project" => bail!("found <project>; this is a Clover report"),
                        b"source" => {
                            // Self-closing <source/> has no text content.
                            if is_start {
                                in_source = true;
                            }
                        }
                        b"class" => {
                            let attrs = attr_map(e);
                            if let Some(filename) = attrs.get("filename") {
                                let path = resolve_source_path(filename, &sources);
                                let idx = match files.iter().position(|(f, _)| *f == path) {
                                    Some(idx) => idx,
                                    None => {
                                        files.push((path, BTreeMap::new()));
                                        files.len() - 1
                                    }
                                };
                                current = Some(idx);
                            }
                        }
                        b"line" => {
                            if let Some(idx) = current {
                                let attrs = attr_map(e);
                                if let Some(number) =
                                    attrs.get("number").and_then(|n| n.parse::<u32>().ok())
                                {
                                    let hits = attrs
                                        .get("hits")
                                        .and_then(|h| h.parse::<u64>().ok())
                                        .unwrap_or(0);
                                    let entry = files[idx].1.entry(number).or_insert(0);
                                    if hits > *entry {
                                        *entry = hits;
                                    }
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Text(ref e)) => {
                    if in_source {
                        if let Ok(text) = e.unescape() {
                            sources.push(text.to_string());
                        }
                        in_source = false;
                    }
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"source" => in_source = false,
                    b"class" => current = None,
                    _ => {}
                },
                _ => {}
            }
            buf.clear();
        }

        if !root_checked {
            bail!("no XML root element found");
        }
        if !saw_packages {
            bail!("missing <packages> element");
        }
        for (file, line_hits) in files {
            cov.push_file(file_coverage(file, &line_hits));
        }
        Ok(cov)
    }
}

fn file_coverage(file: String, line_hits: &BTreeMap<u32, u64>) -> FileCoverage {
    let mut fc = FileCoverage::new(file);
    for (&line, &hits) in line_hits {
        fc.push_block(Block {
            id: BlockId::line(line),
            units: 1,
            hits,
        });
    }
    fc
}

/// Resolve a filename against the list of `<source>` prefixes.
///
/// Absolute filenames pass through; otherwise the first non-empty source
/// prefix is prepended.
fn resolve_source_path(filename: &str, sources: &[String]) -> String {
    if filename.starts_with('/') {
        return filename.to_string();
    }
    for source in sources {
        let base = source.trim_end_matches('/');
        if !base.is_empty() {
            return format!("{base}/{filename}");
        }
    }
    filename.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cobertura() {
        let input = include_bytes!("../../tests/fixtures/cobertura.xml");
        let cov = CoberturaParser.parse(input).unwrap();

        assert_eq!(cov.kind, CoverageKind::Loc);
        assert_eq!(cov.format, "cobertura");
        assert_eq!(cov.files.len(), 2);

        let main = &cov.files[0];
        assert_eq!(main.file, "/home/user/project/src/main.py");
        // Lines 1,2,3,5: three hit, one missed; line 2 appears under both
        // <method> and <class> and must not be double-counted.
        assert_eq!(main.total, 4);
        assert_eq!(main.covered, 3);

        let util = &cov.files[1];
        assert_eq!(util.file, "/home/user/project/src/util.py");
        assert_eq!(util.total, 2);
        assert_eq!(util.covered, 1);

        assert!(cov.covered <= cov.total);
        for f in &cov.files {
            assert!(f.covered <= f.total);
        }
    }

    #[test]
    fn test_inner_classes_fold_into_one_file() {
        // Java inner classes repeat the filename across <class> elements;
        // shared lines must count once, keeping the max hit count.
        let input = br#"<?xml version="1.0"?>
<coverage>
  <packages>
    <package name="com.example">
      <classes>
        <class name="App" filename="com/example/App.java">
          <lines>
            <line number="1" hits="2"/>
            <line number="2" hits="0"/>
          </lines>
        </class>
        <class name="App$Inner" filename="com/example/App.java">
          <lines>
            <line number="2" hits="3"/>
            <line number="5" hits="1"/>
          </lines>
        </class>
      </classes>
    </package>
  </packages>
</coverage>"#;
        let cov = CoberturaParser.parse(input).unwrap();
        assert_eq!(cov.files.len(), 1);
        let f = &cov.files[0];
        assert_eq!(f.file, "com/example/App.java");
        assert_eq!(f.total, 3);
        assert_eq!(f.covered, 3);
        let line2 = f
            .blocks
            .iter()
            .find(|b| b.id == BlockId::line(2))
            .unwrap();
        assert_eq!(line2.hits, 3);
    }

    #[test]
    fn test_source_prefix_resolution() {
        assert_eq!(
            resolve_source_path("src/f.rs", &["".to_string(), "/repo".to_string()]),
            "/repo/src/f.rs"
        );
        assert_eq!(resolve_source_path("/abs/f.rs", &["/repo".to_string()]), "/abs/f.rs");
        assert_eq!(resolve_source_path("src/f.rs", &[]), "src/f.rs");
    }

    #[test]
    fn test_rejects_clover() {
        let input = include_bytes!("../../tests/fixtures/clover.xml");
        assert!(CoberturaParser.parse(input).is_err());
    }

    #[test]
    fn test_rejects_jacoco() {
        let input = include_bytes!("../../tests/fixtures/jacoco.xml");
        assert!(CoberturaParser.parse(input).is_err());
    }

    #[test]
    fn test_rejects_non_xml() {
        assert!(CoberturaParser.parse(b"mode: count\n").is_err());
        assert!(CoberturaParser.parse(b"SF:/a.rs\nDA:1,1\n").is_err());
        assert!(CoberturaParser.parse(b"{\"RSpec\":{}}").is_err());
    }
}
