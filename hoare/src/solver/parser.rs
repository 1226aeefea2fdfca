//! Parsing of SMT solver replies
//!
//! The reply to `(check-sat)` followed by `(get-model)` is read as a
//! sequence of s-expressions. Only nullary `define-fun` entries of the
//! model are kept; those are the values of the declared constants.

use super::SolverError;

/// Raw verdict of a `check-sat` query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverOutput {
    /// Satisfiable, with the model's constant assignments
    Sat(Vec<(String, String)>),
    Unsat,
    Unknown(String),
}

/// Parse the solver's stdout into a [`SolverOutput`].
///
/// Expected layout: `sat`, `unsat` or `unknown` first, then the reply to
/// `(get-model)`. Both the bare-list model format of recent Z3 releases
/// and the older `(model ...)` format are accepted.
pub fn parse_solver_output(stdout: &str, stderr: &str) -> Result<SolverOutput, SolverError> {
    if stdout.trim().is_empty() {
        if stderr.contains("timeout") {
            return Ok(SolverOutput::Unknown("timeout".to_string()));
        }
        return Err(SolverError::Parse(format!(
            "empty solver output; stderr: {}",
            stderr.trim()
        )));
    }

    let items = parse_sexps(stdout)?;
    let Some(first) = items.first() else {
        return Err(SolverError::Parse("no s-expressions in output".to_string()));
    };

    match first {
        Sexp::Atom(word) => match word.as_str() {
            "unsat" => Ok(SolverOutput::Unsat),
            "sat" => Ok(SolverOutput::Sat(collect_model(&items[1..]))),
            "unknown" => {
                let reason = if stderr.trim().is_empty() {
                    "solver returned unknown".to_string()
                } else {
                    stderr.trim().to_string()
                };
                Ok(SolverOutput::Unknown(reason))
            }
            "timeout" => Ok(SolverOutput::Unknown("timeout".to_string())),
            other => Err(SolverError::Parse(format!("unexpected solver output: {other}"))),
        },
        Sexp::List(list) => match list.as_slice() {
            [Sexp::Atom(head), message] if head == "error" => {
                Err(SolverError::Process(message.render()))
            }
            _ => Err(SolverError::Parse(format!(
                "unexpected solver output: {}",
                first.render()
            ))),
        },
    }
}

/// Nullary `define-fun` entries found in `items`, in order
fn collect_model(items: &[Sexp]) -> Vec<(String, String)> {
    let mut assignments = Vec::new();
    for item in items {
        let Sexp::List(entries) = item else {
            continue;
        };
        let entries = match entries.split_first() {
            Some((Sexp::Atom(head), rest)) if head == "model" => rest,
            _ => entries.as_slice(),
        };
        for entry in entries {
            if let Some(pair) = constant_definition(entry) {
                assignments.push(pair);
            }
        }
    }
    assignments
}

/// `(define-fun name () Sort value)` as `(name, value)`
fn constant_definition(sexp: &Sexp) -> Option<(String, String)> {
    let Sexp::List(parts) = sexp else {
        return None;
    };
    match parts.as_slice() {
        [Sexp::Atom(head), Sexp::Atom(name), Sexp::List(params), _sort, value]
            if head == "define-fun" && params.is_empty() =>
        {
            Some((unquote(name).to_string(), value.render_value()))
        }
        _ => None,
    }
}

fn unquote(symbol: &str) -> &str {
    symbol
        .strip_prefix('|')
        .and_then(|s| s.strip_suffix('|'))
        .unwrap_or(symbol)
}

// ============================================================================
// S-expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    fn render(&self) -> String {
        match self {
            Sexp::Atom(a) => a.clone(),
            Sexp::List(items) => {
                let inner: Vec<String> = items.iter().map(Sexp::render).collect();
                format!("({})", inner.join(" "))
            }
        }
    }

    /// Model values: `(- 5)` reads as `-5`, quoted symbols lose their bars
    fn render_value(&self) -> String {
        match self {
            Sexp::Atom(a) => unquote(a).to_string(),
            Sexp::List(items) => match items.as_slice() {
                [Sexp::Atom(minus), Sexp::Atom(n)]
                    if minus == "-" && n.chars().all(|c| c.is_ascii_digit()) =>
                {
                    format!("-{n}")
                }
                _ => self.render(),
            },
        }
    }
}

fn parse_sexps(text: &str) -> Result<Vec<Sexp>, SolverError> {
    let mut stack: Vec<Vec<Sexp>> = vec![Vec::new()];
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '(' => stack.push(Vec::new()),
            ')' => {
                let list = stack
                    .pop()
                    .filter(|_| !stack.is_empty())
                    .ok_or_else(|| SolverError::Parse("unbalanced ')'".to_string()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.push(Sexp::List(list));
                }
            }
            ';' => {
                while chars.next_if(|&(_, c)| c != '\n').is_some() {}
            }
            c if c.is_whitespace() => {}
            '|' | '"' => {
                let close = c;
                let mut end = None;
                for (i, d) in chars.by_ref() {
                    if d == close {
                        end = Some(i + d.len_utf8());
                        break;
                    }
                }
                let end = end.ok_or_else(|| {
                    SolverError::Parse(format!("unterminated {close} in solver output"))
                })?;
                push_atom(&mut stack, &text[start..end]);
            }
            _ => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_whitespace() || d == '(' || d == ')' {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                push_atom(&mut stack, &text[start..end]);
            }
        }
    }

    match stack.pop() {
        Some(top) if stack.is_empty() => Ok(top),
        _ => Err(SolverError::Parse("unbalanced '(' in solver output".to_string())),
    }
}

fn push_atom(stack: &mut [Vec<Sexp>], atom: &str) {
    if let Some(top) = stack.last_mut() {
        top.push(Sexp::Atom(atom.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsat() {
        let out = "unsat\n(error \"line 4 column 10: model is not available\")\n";
        assert_eq!(parse_solver_output(out, "").unwrap(), SolverOutput::Unsat);
    }

    #[test]
    fn test_sat_new_model_format() {
        let out = "sat\n(\n  (define-fun y () Bool\n    true)\n  (define-fun x () Int\n    (- 1))\n)\n";
        assert_eq!(
            parse_solver_output(out, "").unwrap(),
            SolverOutput::Sat(vec![
                ("y".to_string(), "true".to_string()),
                ("x".to_string(), "-1".to_string()),
            ])
        );
    }

    #[test]
    fn test_sat_old_model_format() {
        let out = "sat\n(model\n  (define-fun |x$0| () Int 5)\n)\n";
        assert_eq!(
            parse_solver_output(out, "").unwrap(),
            SolverOutput::Sat(vec![("x$0".to_string(), "5".to_string())])
        );
    }

    #[test]
    fn test_sat_skips_function_definitions() {
        let out = "sat\n(\n  (define-fun a () (Array Int Int)\n    ((as const (Array Int Int)) 0))\n  (define-fun len.int ((x!0 (Array Int Int))) Int\n    3)\n)\n";
        assert_eq!(
            parse_solver_output(out, "").unwrap(),
            SolverOutput::Sat(vec![(
                "a".to_string(),
                "((as const (Array Int Int)) 0)".to_string()
            )])
        );
    }

    #[test]
    fn test_unknown_and_timeout() {
        assert_eq!(
            parse_solver_output("unknown\n", "").unwrap(),
            SolverOutput::Unknown("solver returned unknown".to_string())
        );
        assert_eq!(
            parse_solver_output("timeout\n", "").unwrap(),
            SolverOutput::Unknown("timeout".to_string())
        );
        assert_eq!(
            parse_solver_output("", "timeout").unwrap(),
            SolverOutput::Unknown("timeout".to_string())
        );
    }

    #[test]
    fn test_error_reply() {
        let out = "(error \"line 1 column 8: unknown constant y\")\n";
        assert!(matches!(
            parse_solver_output(out, ""),
            Err(SolverError::Process(_))
        ));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(parse_solver_output("bogus", ""), Err(SolverError::Parse(_))));
        assert!(matches!(parse_solver_output("sat\n(", ""), Err(SolverError::Parse(_))));
        assert!(matches!(parse_solver_output("", ""), Err(SolverError::Parse(_))));
    }
}
