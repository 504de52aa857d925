//! Parser for Clover XML coverage reports.
//!
//! Structure:
//!   <coverage generated="...">
//!     <project timestamp="...">
//!       <file name="..." path="...">
//!         <line num="..." type="stmt" count="..."/>
//!       </file>
//!       <package name="..."><file ...>...</file></package>
//!     </project>
//!   </coverage>
//!
//! Clover shares its `<coverage>` root with Cobertura; the `<project>`
//! element is what tells them apart, and a `<packages>` element (Cobertura's
//! marker) rejects the input outright.

use anyhow::{bail, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use super::{attr_map, Parser};
use crate::model::{Block, BlockId, Coverage, CoverageKind, FileCoverage};

pub struct CloverParser;

impl Parser for CloverParser {
    fn name(&self) -> &'static str {
        "clover"
    }

    fn default_filenames(&self) -> &'static [&'static str] {
        &["coverage.xml", "clover.xml"]
    }

    fn parse(&self, content: &[u8]) -> Result<Coverage> {
        let mut reader = Reader::from_reader(content);
        reader.trim_text(true);

        let mut cov = Coverage::new(CoverageKind::Loc, self.name());
        let mut buf = Vec::new();
        let mut root_checked = false;
        let mut saw_project = false;
        let mut current: Option<FileCoverage> = None;

        loop {
            let event = reader.read_event_into(&mut buf);
            match event {
                Err(e) => bail!("XML parse error at {}: {e}", reader.buffer_position()),
                Ok(Event::Eof) => break,
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    let is_empty = matches!(event, Ok(Event::Empty(_)));
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
                        b"project" => saw_project = true,
                        b"packages" => bail!("found <packages>; this is a Cobertura report"),
                        b"file" => {
                            if let Some(file) = current.take() {
                                cov.push_file(file);
                            }
                            let attrs = attr_map(e);
                            // Prefer the full path when present; fall back
                            // to the bare name.
                            let path = attrs
                                .get("path")
                                .or_else(|| attrs.get("name"))
                                .cloned()
                                .unwrap_or_default();
                            if is_empty {
                                cov.push_file(FileCoverage::new(path));
                            } else {
                                current = Some(FileCoverage::new(path));
                            }
                        }
                        b"line" => {
                            let attrs = attr_map(e);
                            if let Some(file) = current.as_mut() {
                                // Only statement lines count toward line
                                // coverage; cond/method entries overlap them.
                                let is_stmt =
                                    attrs.get("type").map_or(true, |t| t == "stmt");
                                if is_stmt {
                                    if let Some(num) =
                                        attrs.get("num").and_then(|n| n.parse::<u32>().ok())
                                    {
                                        let hits = attrs
                                            .get("count")
                                            .and_then(|c| c.parse::<u64>().ok())
                                            .unwrap_or(0);
                                        file.push_block(Block {
                                            id: BlockId::line(num),
                                            units: 1,
                                            hits,
                                        });
                                    }
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(ref e)) => {
                    if e.name().as_ref() == b"file" {
                        if let Some(file) = current.take() {
                            cov.push_file(file);
                        }
                    }
                }
                _ => {}
            }
            buf.clear();
        }

        if !root_checked {
            bail!("no XML root element found");
        }
        if !saw_project {
            bail!("missing <project> element");
        }
        Ok(cov)
    }
}
