//! JaCoCo structured (`jacoco.xml`) reports
//!
//! Only what the precise check needs is kept: method start lines per class
//! and the covered-instruction count of every source line.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, AnalysisResult};
use crate::model::descriptor_arity;

/// Conventional report file name inside a coverage root
pub const XML_REPORT_NAME: &str = "jacoco.xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlMethod {
    pub name: String,
    pub desc: String,
    pub line: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct XmlClass {
    /// Slash separated binary name, `a/b/Outer$Inner`
    pub name: String,
    pub source_file: String,
    pub methods: Vec<XmlMethod>,
}

impl XmlClass {
    fn package(&self) -> &str {
        self.name.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
    }

    /// Declared line of a method by name and descriptor, falling back to
    /// name and parameter count
    fn method_line(&self, name: &str, desc: &str, arity: usize) -> Option<usize> {
        let named = || self.methods.iter().filter(|m| m.name == name);
        named()
            .find(|m| m.desc == desc)
            .or_else(|| named().find(|m| descriptor_arity(&m.desc) == Some(arity)))
            .and_then(|m| m.line)
    }
}

/// Line range of a method, end inclusive; `None` end means unbounded
pub type LineRange = (usize, Option<usize>);

#[derive(Debug, Clone, Default)]
pub struct XmlReport {
    path: PathBuf,
    classes: HashMap<String, XmlClass>,
    /// (package, source file) → line number → covered instructions
    lines: HashMap<(String, String), BTreeMap<usize, u32>>,
}

impl XmlReport {
    pub fn load(path: &Path) -> AnalysisResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> AnalysisResult<Self> {
        let mut report = XmlReport {
            path: path.to_path_buf(),
            ..Default::default()
        };
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut package: Option<String> = None;
        let mut class: Option<XmlClass> = None;
        let mut source_file: Option<String> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| AnalysisError::parse(path, e.to_string()))?;
            let (element, self_closing) = match event {
                Event::Start(e) => (e, false),
                Event::Empty(e) => (e, true),
                Event::End(e) => {
                    match e.name().as_ref() {
                        b"class" => {
                            if let Some(done) = class.take() {
                                report.insert_class(done);
                            }
                        }
                        b"sourcefile" => source_file = None,
                        b"package" => package = None,
                        _ => {}
                    }
                    continue;
                }
                Event::Eof => break,
                _ => continue,
            };

            let attrs = attributes(path, &element)?;
            let get = |key: &str| attrs.get(key).cloned().unwrap_or_default();
            match element.name().as_ref() {
                b"package" => package = Some(get("name")),
                b"class" => {
                    let parsed = XmlClass {
                        name: get("name"),
                        source_file: get("sourcefilename"),
                        methods: Vec::new(),
                    };
                    if self_closing {
                        report.insert_class(parsed);
                    } else {
                        class = Some(parsed);
                    }
                }
                b"method" => {
                    if let Some(class) = class.as_mut() {
                        class.methods.push(XmlMethod {
                            name: get("name"),
                            desc: get("desc"),
                            line: get("line").parse().ok(),
                        });
                    }
                }
                b"sourcefile" => source_file = Some(get("name")),
                b"line" => {
                    if let (Some(pkg), Some(file)) = (&package, &source_file) {
                        let nr = get("nr").parse::<usize>().map_err(|_| {
                            AnalysisError::parse(path, format!("bad line number in {}", file))
                        })?;
                        let ci = get("ci").parse::<u32>().unwrap_or(0);
                        report
                            .lines
                            .entry((pkg.clone(), file.clone()))
                            .or_default()
                            .insert(nr, ci);
                    }
                }
                _ => {}
            }
        }
        Ok(report)
    }

    fn insert_class(&mut self, class: XmlClass) {
        self.classes.insert(class.name.replace('/', "."), class);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Range of a method: its declared line up to the line before the next
    /// larger method start in the same class
    pub fn method_range(&self, class_fqn: &str, name: &str, desc: &str, arity: usize) -> Option<LineRange> {
        let class = self.classes.get(class_fqn)?;
        let start = class.method_line(name, desc, arity)?;
        let end = class
            .methods
            .iter()
            .filter_map(|m| m.line)
            .filter(|line| *line > start)
            .min()
            .map(|next| next - 1);
        Some((start, end))
    }

    /// Lines inside `range` with at least one executed instruction
    pub fn covered_lines(&self, class_fqn: &str, range: LineRange) -> BTreeSet<usize> {
        let Some(class) = self.classes.get(class_fqn) else {
            return BTreeSet::new();
        };
        let key = (class.package().to_string(), class.source_file.clone());
        let Some(lines) = self.lines.get(&key) else {
            return BTreeSet::new();
        };
        let (start, end) = range;
        lines
            .range(start..=end.unwrap_or(usize::MAX))
            .filter(|(_, ci)| **ci > 0)
            .map(|(nr, _)| *nr)
            .collect()
    }
}

fn attributes(path: &Path, element: &BytesStart<'_>) -> AnalysisResult<HashMap<String, String>> {
    let mut out = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| AnalysisError::parse(path, e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| AnalysisError::parse(path, e.to_string()))?
            .into_owned();
        out.insert(key, value);
    }
    Ok(out)
}
