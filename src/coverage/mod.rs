//! Coverage-aware call filter
//!
//! A (caller, target) pair is dropped when existing tests already execute
//! the call. One call site per class lets the annotated-source report
//! decide alone ([`CheckMode::FastCheck`]); repeated call sites need the
//! structured report's per-method line ranges ([`CheckMode::PreciseCheck`]).
//! Missing or unreadable reports never count as covered.

pub mod html;
pub mod xml;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::model::{outer_type_of, package_of, simple_name_of, MethodSignature};
use crate::reach::{CallPair, MultiplicityIndex};
use crate::session::AnalysisSession;
use html::HtmlReport;
use xml::{XmlReport, XML_REPORT_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Any covered line matching the call pattern
    FastCheck,
    /// Call lines intersected with the caller's executed lines
    PreciseCheck,
}

impl CheckMode {
    pub fn for_multiplicity(call_sites: usize) -> Self {
        if call_sites > 1 {
            CheckMode::PreciseCheck
        } else {
            CheckMode::FastCheck
        }
    }
}

/// What a source line must contain to count as a call to the target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallPattern {
    /// Superclass constructor reached through `super(` or an implicit call
    /// from the caller's own constructor declaration
    InheritedConstructor { caller_simple: String },
    Constructor { simple: String },
    StaticInit { simple: String },
    Method { name: String },
}

impl CallPattern {
    pub fn for_pair(caller: &MethodSignature, target: &MethodSignature, report: &HtmlReport) -> Self {
        let target_simple = target.simple_type_name().to_string();
        if target.is_constructor() {
            let text = report.text();
            if text.contains("class ") && text.contains(&format!("extends {}", target_simple)) {
                return CallPattern::InheritedConstructor {
                    caller_simple: caller.simple_type_name().to_string(),
                };
            }
            return CallPattern::Constructor {
                simple: target_simple,
            };
        }
        if target.is_static_initializer() {
            return CallPattern::StaticInit {
                simple: target_simple,
            };
        }
        CallPattern::Method {
            name: target.name.clone(),
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        match self {
            CallPattern::InheritedConstructor { caller_simple } => {
                line.contains("super(") || is_constructor_declaration(line, caller_simple)
            }
            CallPattern::Constructor { simple } => line.contains(&format!("new {}(", simple)),
            CallPattern::StaticInit { simple } => line.contains(simple.as_str()),
            CallPattern::Method { name } => line.contains(&format!("{}(", name)),
        }
    }
}

fn is_constructor_declaration(line: &str, class_simple: &str) -> bool {
    if line.contains(&format!("new {}(", class_simple)) {
        return false;
    }
    ["public ", "protected ", "private ", ""]
        .iter()
        .any(|modifier| line.contains(&format!("{}{}(", modifier, class_simple)))
}

/// Locations of the annotated-source report for a type under one root
///
/// Nested types share their outermost type's report. JaCoCo names package
/// directories with dots; the slash layout is tried second.
pub fn html_report_candidates(root: &Path, type_fqn: &str) -> Vec<PathBuf> {
    let outer = outer_type_of(type_fqn);
    let package = package_of(outer);
    let file = format!("{}.java.html", simple_name_of(outer));
    if package.is_empty() {
        return vec![root.join(file)];
    }
    vec![
        root.join(package).join(&file),
        root.join(package.replace('.', "/")).join(&file),
    ]
}

pub struct CoverageFilter<'a> {
    roots: &'a [PathBuf],
    multiplicity: &'a MultiplicityIndex,
    session: &'a AnalysisSession,
    log_decisions: bool,
}

impl<'a> CoverageFilter<'a> {
    pub fn new(roots: &'a [PathBuf], multiplicity: &'a MultiplicityIndex, session: &'a AnalysisSession) -> Self {
        Self {
            roots,
            multiplicity,
            session,
            log_decisions: false,
        }
    }

    /// Record every decision in the session's coverage log
    pub fn log_decisions(mut self, enabled: bool) -> Self {
        self.log_decisions = enabled;
        self
    }

    pub fn mode_for(&self, caller: &MethodSignature, target: &MethodSignature) -> CheckMode {
        CheckMode::for_multiplicity(self.multiplicity.count(&caller.declaring_type, target))
    }

    /// Whether existing tests already execute `caller`'s call to `target`
    pub fn is_covered(&self, caller: &MethodSignature, target: &MethodSignature) -> bool {
        let mode = self.mode_for(caller, target);
        let found = self.roots.iter().find_map(|root| {
            html_report_candidates(root, &caller.declaring_type)
                .into_iter()
                .find(|p| p.is_file())
                .map(|html| (root, html))
        });

        let covered = match found {
            Some((root, html)) => {
                let key = (html.clone(), caller.clone(), target.clone());
                let cached = self.session.coverage_decisions.get(&key).map(|hit| *hit);
                match cached {
                    Some(hit) => {
                        trace!("Coverage cache hit for {} in {}", target, caller);
                        hit
                    }
                    None => {
                        let covered = self.decide(root, &html, mode, caller, target);
                        self.session.coverage_decisions.insert(key, covered);
                        covered
                    }
                }
            }
            None => {
                debug!("No annotated-source report for {}", caller.declaring_type);
                false
            }
        };

        if self.log_decisions {
            self.session.log_decision(caller, target, covered);
        }
        covered
    }

    /// Pairs whose call is not yet covered by tests
    pub fn filter_uncovered(&self, pairs: &[CallPair]) -> Vec<CallPair> {
        let uncovered: Vec<CallPair> = pairs
            .iter()
            .filter(|pair| !self.is_covered(&pair.caller, &pair.target))
            .cloned()
            .collect();
        info!(
            "Coverage filter: {} of {} call pairs already covered",
            pairs.len() - uncovered.len(),
            pairs.len()
        );
        uncovered
    }

    fn decide(
        &self,
        root: &Path,
        html: &Path,
        mode: CheckMode,
        caller: &MethodSignature,
        target: &MethodSignature,
    ) -> bool {
        let Some(report) = self.html_report(html) else {
            return false;
        };
        let pattern = CallPattern::for_pair(caller, target, &report);
        match mode {
            CheckMode::FastCheck => report
                .lines()
                .iter()
                .any(|line| line.is_covered() && pattern.matches(&line.text)),
            CheckMode::PreciseCheck => {
                debug!("Multiple call sites of {} in {}, using the precise check", target, caller.declaring_type);
                self.precise_check(root, &report, &pattern, caller, target)
            }
        }
    }

    fn precise_check(
        &self,
        root: &Path,
        report: &HtmlReport,
        pattern: &CallPattern,
        caller: &MethodSignature,
        target: &MethodSignature,
    ) -> bool {
        let call_lines = self.call_lines(report, pattern);
        if call_lines.is_empty() {
            warn!("No lines calling {} found in {}", target, report.path().display());
            return false;
        }

        let xml_path = root.join(XML_REPORT_NAME);
        let Some(xml) = self.xml_report(&xml_path) else {
            warn!("No structured report at {}, cannot run the precise check", xml_path.display());
            return false;
        };
        let Some(range) = xml.method_range(
            &caller.declaring_type,
            &caller.name,
            &caller.jvm_descriptor(),
            caller.params.len(),
        ) else {
            warn!("Could not find start line for {} in {}", caller, xml_path.display());
            return false;
        };

        let executed = xml.covered_lines(&caller.declaring_type, range);
        let hit: Vec<&usize> = call_lines.intersection(&executed).collect();
        debug!("{} in {}: call lines {:?}, executed hits {:?}", target, caller, call_lines, hit);
        !hit.is_empty()
    }

    /// Lines matching the pattern, whatever their coverage marker
    fn call_lines(&self, report: &HtmlReport, pattern: &CallPattern) -> Arc<BTreeSet<usize>> {
        let key = (report.path().to_path_buf(), pattern.clone());
        self.session
            .call_lines
            .entry(key)
            .or_insert_with(|| {
                Arc::new(
                    report
                        .lines()
                        .iter()
                        .filter(|line| pattern.matches(&line.text))
                        .map(|line| line.number)
                        .collect(),
                )
            })
            .clone()
    }

    fn html_report(&self, path: &Path) -> Option<Arc<HtmlReport>> {
        self.session
            .html_reports
            .entry(path.to_path_buf())
            .or_insert_with(|| match HtmlReport::load(path) {
                Ok(report) => Some(Arc::new(report)),
                Err(e) => {
                    warn!("Treating {} as uncovered: {}", path.display(), e);
                    None
                }
            })
            .clone()
    }

    fn xml_report(&self, path: &Path) -> Option<Arc<XmlReport>> {
        self.session
            .xml_reports
            .entry(path.to_path_buf())
            .or_insert_with(|| {
                if !path.is_file() {
                    return None;
                }
                match XmlReport::load(path) {
                    Ok(report) => Some(Arc::new(report)),
                    Err(e) => {
                        warn!("Ignoring structured report {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn span(number: usize, marker: &str, text: &str) -> String {
        format!("<span class=\"{}\" id=\"L{}\">{}</span>", marker, number, text)
    }

    fn write_html(root: &Path, package: &str, class: &str, lines: &[String]) {
        let dir = root.join(package);
        fs::create_dir_all(&dir).unwrap();
        let body = format!(
            "<html><body><pre class=\"source lang-java linenums\">{}</pre></body></html>",
            lines.join("\n")
        );
        fs::write(dir.join(format!("{}.java.html", class)), body).unwrap();
    }

    fn sig(s: &str) -> MethodSignature {
        s.parse().unwrap()
    }

    #[test]
    fn test_fast_check_uses_line_markers() {
        let dir = TempDir::new().unwrap();
        let covered_root = dir.path().join("covered");
        let missed_root = dir.path().join("missed");
        write_html(&covered_root, "com.acme", "Service", &[span(5, "fc", "        client.execute(url);")]);
        write_html(&missed_root, "com.acme", "Service", &[span(5, "nc", "        client.execute(url);")]);

        let caller = sig("com.acme.Service.run(java.lang.String)");
        let target = sig("org.lib.Client.execute(java.lang.String)");
        let mut index = MultiplicityIndex::new();
        index.register(&caller, &target);
        let session = AnalysisSession::new();

        let roots = vec![covered_root];
        let filter = CoverageFilter::new(&roots, &index, &session);
        assert_eq!(filter.mode_for(&caller, &target), CheckMode::FastCheck);
        assert!(filter.is_covered(&caller, &target));

        let roots = vec![missed_root];
        let filter = CoverageFilter::new(&roots, &index, &session);
        assert!(!filter.is_covered(&caller, &target));
    }

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<report name="demo">
  <package name="com/acme">
    <class name="com/acme/Service" sourcefilename="Service.java">
      <method name="m1" desc="()V" line="10"/>
      <method name="m2" desc="()V" line="14"/>
    </class>
    <sourcefile name="Service.java">
      <line nr="10" ci="2"/><line nr="11" ci="3"/><line nr="12" ci="1"/><line nr="13" ci="1"/>
      <line nr="14" ci="0"/><line nr="15" ci="0"/><line nr="16" ci="0"/>
    </sourcefile>
  </package>
</report>"#;

    #[test]
    fn test_precise_check_attributes_call_sites_to_methods() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        write_html(
            &root,
            "com.acme",
            "Service",
            &[
                span(10, "fc", "    void m1() {"),
                span(11, "fc", "        client.execute();"),
                span(14, "nc", "    void m2() {"),
                span(15, "nc", "        client.execute();"),
            ],
        );
        fs::write(root.join(XML_REPORT_NAME), XML).unwrap();

        let m1 = sig("com.acme.Service.m1()");
        let m2 = sig("com.acme.Service.m2()");
        let target = sig("org.lib.Client.execute()");
        let mut index = MultiplicityIndex::new();
        index.register(&m1, &target);
        index.register(&m2, &target);

        let session = AnalysisSession::new();
        let roots = vec![root];
        let filter = CoverageFilter::new(&roots, &index, &session).log_decisions(true);
        assert_eq!(filter.mode_for(&m1, &target), CheckMode::PreciseCheck);
        assert!(filter.is_covered(&m1, &target));
        assert!(!filter.is_covered(&m2, &target));

        let pairs = vec![CallPair::new(m1.clone(), target.clone()), CallPair::new(m2.clone(), target.clone())];
        let uncovered = filter.filter_uncovered(&pairs);
        assert_eq!(uncovered, vec![CallPair::new(m2, target)]);

        let log = session.coverage_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].caller, "com.acme.Service.m1()");
        assert!(log[0].covered);
    }

    #[test]
    fn test_malformed_structured_report_is_uncovered() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        write_html(
            &root,
            "com.acme",
            "Service",
            &[
                span(11, "fc", "        client.execute();"),
                span(15, "fc", "        client.execute();"),
            ],
        );
        fs::write(
            root.join(XML_REPORT_NAME),
            r#"<report name="demo"><package name="com/acme"><sourcefile name="Service.java"><line nr="eleven" ci="3"/></sourcefile></package></report>"#,
        )
        .unwrap();

        let m1 = sig("com.acme.Service.m1()");
        let m2 = sig("com.acme.Service.m2()");
        let target = sig("org.lib.Client.execute()");
        let mut index = MultiplicityIndex::new();
        index.register(&m1, &target);
        index.register(&m2, &target);

        let session = AnalysisSession::new();
        let roots = vec![root];
        let filter = CoverageFilter::new(&roots, &index, &session);
        assert_eq!(filter.mode_for(&m1, &target), CheckMode::PreciseCheck);
        assert!(!filter.is_covered(&m1, &target));
        assert!(!filter.is_covered(&m2, &target));
    }

    #[test]
    fn test_inherited_constructor_via_declaration_line() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        write_html(
            &root,
            "com.acme",
            "Child",
            &[
                "public class Child extends Base {".to_string(),
                span(4, "fc", "    public Child() {"),
                span(5, "fc", "        Base other = new Base(1);"),
            ],
        );
        let caller = sig("com.acme.Child.<init>()");
        let target = MethodSignature::constructor("org.lib.Base", vec![]);
        let index = MultiplicityIndex::new();
        let session = AnalysisSession::new();
        let roots = vec![root];
        let filter = CoverageFilter::new(&roots, &index, &session);
        assert!(filter.is_covered(&caller, &target));

        let pattern = CallPattern::InheritedConstructor {
            caller_simple: "Child".into(),
        };
        assert!(pattern.matches("        super(name);"));
        assert!(pattern.matches("    protected Child(int x) {"));
        assert!(!pattern.matches("        Child c = new Child(1);"));
    }

    #[test]
    fn test_missing_report_is_uncovered_and_decisions_are_cached() {
        let dir = TempDir::new().unwrap();
        let caller = sig("com.acme.Service.run()");
        let target = sig("org.lib.Client.close()");
        let index = MultiplicityIndex::new();
        let session = AnalysisSession::new();
        let roots = vec![dir.path().to_path_buf()];
        let filter = CoverageFilter::new(&roots, &index, &session);
        assert!(!filter.is_covered(&caller, &target));
        assert_eq!(session.cached_decisions(), 0);

        write_html(dir.path(), "com.acme", "Service", &[span(3, "fc", "client.close();")]);
        assert!(filter.is_covered(&caller, &target));
        assert_eq!(session.cached_decisions(), 1);

        // the cached decision survives the report changing
        write_html(dir.path(), "com.acme", "Service", &[span(3, "nc", "client.close();")]);
        assert!(filter.is_covered(&caller, &target));
        session.reset();
        assert!(!filter.is_covered(&caller, &target));
    }

    #[test]
    fn test_report_candidates() {
        let root = Path::new("/cov");
        assert_eq!(
            html_report_candidates(root, "com.acme.Outer$Inner"),
            vec![
                PathBuf::from("/cov/com.acme/Outer.java.html"),
                PathBuf::from("/cov/com/acme/Outer.java.html"),
            ]
        );
        assert_eq!(html_report_candidates(root, "Main"), vec![PathBuf::from("/cov/Main.java.html")]);
    }

    #[test]
    fn test_static_initializer_pattern() {
        let report = HtmlReport::parse(Path::new("x"), "<pre></pre>").unwrap();
        let caller = MethodSignature::static_initializer("com.acme.Config");
        let target = MethodSignature::static_initializer("org.lib.Registry");
        let pattern = CallPattern::for_pair(&caller, &target, &report);
        assert_eq!(pattern, CallPattern::StaticInit { simple: "Registry".into() });
        assert!(pattern.matches("    private static final int X = Registry.size();"));
    }
}
