//! Static source metrics over method bodies

use super::ast::{count_exprs, count_stmts, Expr};
use super::matcher::CallMatcher;
use super::{MethodBody, SourceModelProvider};
use crate::model::MethodSignature;

/// Number of call sites to `target` written in the body
///
/// Textual occurrences, so a call inside a loop counts once.
pub fn count_call_sites(
    body: &MethodBody,
    target: &MethodSignature,
    model: &dyn SourceModelProvider,
) -> usize {
    let matcher = CallMatcher::new(target, model);
    count_exprs(&body.statements, &|e| matcher.matches(e))
}

/// Branching constructs in the body: if, loops, switch and ternaries
pub fn count_conditions(body: &MethodBody) -> usize {
    count_stmts(&body.statements, &|s| s.kind.is_control())
        + count_exprs(&body.statements, &|e| matches!(e, Expr::Conditional { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::JavaProject;

    const SOURCE: &str = r#"package com.acme;

import org.lib.Client;

public class Worker {
    private Client client;

    public int work(int n) {
        for (int i = 0; i < n; i++) {
            client.send(i);
        }
        if (n > 3) {
            client.send(n);
        } else {
            while (n > 0) { n--; }
        }
        int mode = n > 0 ? 1 : 2;
        switch (mode) {
            case 1: client.close(); break;
            default: break;
        }
        return mode;
    }
}
"#;

    #[test]
    fn test_call_sites_and_conditions() {
        let project = JavaProject::from_sources(&[("Worker.java", SOURCE)]).unwrap();
        let method: MethodSignature = "com.acme.Worker.work(int)".parse().unwrap();
        let body = project.method_body(&method).unwrap();

        let send: MethodSignature = "org.lib.Client.send(int)".parse().unwrap();
        let close: MethodSignature = "org.lib.Client.close()".parse().unwrap();
        assert_eq!(count_call_sites(&body, &send, &project), 2);
        assert_eq!(count_call_sites(&body, &close, &project), 1);

        // for, if, while, switch, ternary
        assert_eq!(count_conditions(&body), 5);
    }
}
