//! JaCoCo annotated-source (`*.java.html`) reports

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, AnalysisResult};

static SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?s)<span\b([^>]*)>(.*?)</span>"#).expect("static regex"));
static LINE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bid\s*=\s*"L(\d+)""#).expect("static regex"));
static CLASS_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bclass\s*=\s*"([^"]*)""#).expect("static regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

/// One instrumented source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlLine {
    pub number: usize,
    /// Space separated marker classes (`fc`, `pc bpc`, `nc`, ...)
    pub markers: String,
    pub text: String,
}

impl HtmlLine {
    /// Fully or partially covered
    pub fn is_covered(&self) -> bool {
        self.markers
            .split_whitespace()
            .any(|m| m == "fc" || m == "pc")
    }
}

#[derive(Debug, Clone)]
pub struct HtmlReport {
    path: PathBuf,
    lines: Vec<HtmlLine>,
    /// Whole source listing with markup removed
    text: String,
}

impl HtmlReport {
    pub fn load(path: &Path) -> AnalysisResult<Self> {
        let html = std::fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        Self::parse(path, &html)
    }

    pub fn parse(path: &Path, html: &str) -> AnalysisResult<Self> {
        let mut lines = Vec::new();
        for caps in SPAN.captures_iter(html) {
            let attrs = &caps[1];
            let number = match LINE_ID.captures(attrs) {
                Some(id) => id[1]
                    .parse::<usize>()
                    .map_err(|e| AnalysisError::parse(path, format!("bad line id: {}", e)))?,
                None => continue,
            };
            let markers = CLASS_ATTR
                .captures(attrs)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            lines.push(HtmlLine {
                number,
                markers,
                text: decode_entities(&TAG.replace_all(&caps[2], "")),
            });
        }
        if lines.is_empty() && !html.contains("<pre") {
            return Err(AnalysisError::parse(path, "no source listing found"));
        }
        let text = decode_entities(&TAG.replace_all(html, ""));
        Ok(Self {
            path: path.to_path_buf(),
            lines,
            text,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[HtmlLine] {
        &self.lines
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Decode the entities JaCoCo emits in source listings
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let c = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => {
                    if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                    } else if let Some(dec) = entity.strip_prefix('#') {
                        dec.parse::<u32>().ok().and_then(char::from_u32)
                    } else {
                        None
                    }
                }
            };
            c.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?><html><body><pre class="source lang-java linenums">package com.acme;

public class Service extends Base {
    public void run(List&lt;String&gt; items) {
<span class="fc" id="L5">        client.execute(&quot;a&quot;);</span>
<span class="pc bpc" id="L6" title="1 of 2 branches missed.">        if (items.isEmpty()) {</span>
<span class="nc" id="L7">            client.close();</span>
        }
<span class="bfc" id="L9">    }</span>
}</pre></body></html>"#;

    #[test]
    fn test_parse_lines_and_markers() {
        let report = HtmlReport::parse(Path::new("Service.java.html"), REPORT).unwrap();
        let lines = report.lines();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].number, 5);
        assert_eq!(lines[0].text, "        client.execute(\"a\");");
        assert!(lines[0].is_covered());
        assert!(lines[1].is_covered());
        assert!(!lines[2].is_covered());
        // branch markers alone do not count
        assert!(!lines[3].is_covered());
        assert!(report.text().contains("public class Service extends Base"));
        assert!(report.text().contains("List<String>"));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &lt; b &amp;&amp; c"), "a < b && c");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("AT&T &unknown;"), "AT&T &unknown;");
    }

    #[test]
    fn test_rejects_non_report() {
        assert!(HtmlReport::parse(Path::new("x.html"), "<html>nothing</html>").is_err());
    }
}
