//! Annotated control-flow graph IR
//!
//! This is the boundary format produced by a front-end: a program is a
//! list of predicate definitions and a list of functions, each function a
//! graph of locations whose edges are labelled with statements. The
//! verifier only ever reads it.

mod builder;

pub use builder::FunctionBuilder;
pub use crate::expr::Predicate;

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};
use crate::expr::{Expr, Variable};

/// Index of a location in its function's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub usize);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

// ============================================================================
// Locations
// ============================================================================

/// What a location asserts about the program state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    /// Function entry: preconditions and ranking functions for recursion
    Entry {
        #[serde(default)]
        conditions: Vec<Expr>,
        #[serde(default)]
        ranking_functions: Vec<Expr>,
    },
    /// Function exit: postconditions
    Exit {
        #[serde(default)]
        conditions: Vec<Expr>,
    },
    /// Loop head: invariants and ranking functions for the loop
    LoopHead {
        #[serde(default)]
        invariants: Vec<Expr>,
        #[serde(default)]
        ranking_functions: Vec<Expr>,
    },
    Plain,
}

/// Outgoing edge: the statement executed on the way to `target`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub target: LocationId,
    pub statement: Statement,
}

impl Edge {
    pub fn new(target: LocationId, statement: Statement) -> Self {
        Self { target, statement }
    }
}

/// A CFG node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub kind: LocationKind,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Location {
    pub fn new(kind: LocationKind) -> Self {
        Self {
            kind,
            edges: Vec::new(),
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.kind, LocationKind::Entry { .. })
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.kind, LocationKind::Exit { .. })
    }

    pub fn is_loop_head(&self) -> bool {
        matches!(self.kind, LocationKind::LoopHead { .. })
    }

    /// Ranking functions of a head location (entry or loop head)
    pub fn ranking_functions(&self) -> Option<&[Expr]> {
        match &self.kind {
            LocationKind::Entry {
                ranking_functions, ..
            }
            | LocationKind::LoopHead {
                ranking_functions, ..
            } => Some(ranking_functions),
            LocationKind::Exit { .. } | LocationKind::Plain => None,
        }
    }

    /// Entry/exit conditions or loop invariants; empty for plain locations
    pub fn annotations(&self) -> &[Expr] {
        match &self.kind {
            LocationKind::Entry { conditions, .. } | LocationKind::Exit { conditions } => conditions,
            LocationKind::LoopHead { invariants, .. } => invariants,
            LocationKind::Plain => &[],
        }
    }

    pub fn succ_locations(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.edges.iter().map(|e| e.target)
    }

    pub fn succ_statements(&self) -> impl Iterator<Item = &Statement> + '_ {
        self.edges.iter().map(|e| &e.statement)
    }

    pub fn has_call(&self) -> bool {
        self.edges.iter().any(|e| e.statement.is_call())
    }
}

// ============================================================================
// Statements
// ============================================================================

/// Edge label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// `variable := value`
    Assign { variable: Variable, value: Expr },
    /// `array[index] := value`
    SubscriptAssign {
        array: Variable,
        index: Expr,
        value: Expr,
    },
    /// Guard: execution continues only if `condition` holds
    Assume { condition: Expr },
    /// `condition` must hold here
    Assert { condition: Expr },
    /// `lhs := callee(arguments)`; `lhs` may be empty
    Call {
        #[serde(default)]
        lhs: Vec<Variable>,
        callee: String,
        #[serde(default)]
        arguments: Vec<Variable>,
    },
}

impl Statement {
    pub fn assign(variable: Variable, value: Expr) -> Self {
        Statement::Assign { variable, value }
    }

    pub fn subscript_assign(array: Variable, index: Expr, value: Expr) -> Self {
        Statement::SubscriptAssign {
            array,
            index,
            value,
        }
    }

    pub fn assume(condition: Expr) -> Self {
        Statement::Assume { condition }
    }

    pub fn assert(condition: Expr) -> Self {
        Statement::Assert { condition }
    }

    pub fn call(lhs: Vec<Variable>, callee: impl Into<String>, arguments: Vec<Variable>) -> Self {
        Statement::Call {
            lhs,
            callee: callee.into(),
            arguments,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Statement::Call { .. })
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Assign { variable, value } => write!(f, "{variable} := {value}"),
            Statement::SubscriptAssign {
                array,
                index,
                value,
            } => write!(f, "{array}[{index}] := {value}"),
            Statement::Assume { condition } => write!(f, "assume {condition}"),
            Statement::Assert { condition } => write!(f, "assert {condition}"),
            Statement::Call {
                lhs,
                callee,
                arguments,
            } => {
                let join = |vars: &[Variable]| {
                    vars.iter()
                        .map(|v| v.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                if lhs.is_empty() {
                    write!(f, "{callee}({})", join(arguments.as_slice()))
                } else {
                    write!(f, "{} := {callee}({})", join(lhs.as_slice()), join(arguments.as_slice()))
                }
            }
        }
    }
}

// ============================================================================
// Functions and programs
// ============================================================================

/// A function's annotated CFG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Variable>,
    /// Formal return-value variables
    #[serde(default)]
    pub rvs: Vec<Variable>,
    pub entry: LocationId,
    pub exit: LocationId,
    /// Every location of the function, entry and exit included
    pub locations: Vec<Location>,
}

impl Function {
    pub fn location(&self, id: LocationId) -> Result<&Location> {
        self.locations.get(id.0).ok_or_else(|| {
            VerifyError::malformed_cfg(&self.name, format!("no location {id}"))
        })
    }

    pub fn entry_location(&self) -> Result<&Location> {
        self.location(self.entry)
    }

    pub fn exit_location(&self) -> Result<&Location> {
        self.location(self.exit)
    }

    /// Locations other than entry and exit, in arena order
    pub fn body_locations(&self) -> impl Iterator<Item = LocationId> + '_ {
        (0..self.locations.len())
            .map(LocationId)
            .filter(|id| *id != self.entry && *id != self.exit)
    }

    pub fn entry_conditions(&self) -> Result<&[Expr]> {
        Ok(self.entry_location()?.annotations())
    }

    pub fn exit_conditions(&self) -> Result<&[Expr]> {
        Ok(self.exit_location()?.annotations())
    }

    pub fn entry_ranking_functions(&self) -> Result<&[Expr]> {
        Ok(self.entry_location()?.ranking_functions().unwrap_or(&[]))
    }

    /// Outgoing edges of `id`.
    ///
    /// An entry without edges gets a single `assume true` edge to the
    /// first body location, or to the exit when the body is empty, so that
    /// every function has at least one basic path.
    pub fn edges(&self, id: LocationId) -> Result<Cow<'_, [Edge]>> {
        let location = self.location(id)?;
        if id == self.entry && location.edges.is_empty() {
            let target = self.body_locations().next().unwrap_or(self.exit);
            return Ok(Cow::Owned(vec![Edge::new(
                target,
                Statement::assume(Expr::tt()),
            )]));
        }
        Ok(Cow::Borrowed(&location.edges))
    }
}

/// A whole program as handed over by the front-end
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub functions: Vec<Function>,
}

impl Program {
    pub fn new(predicates: Vec<Predicate>, functions: Vec<Function>) -> Self {
        Self {
            predicates,
            functions,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| VerifyError::ir(e.to_string()))
    }

    pub fn function(&self, name: &str) -> Result<&Function> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| VerifyError::unknown_function(name))
    }

    /// Structural checks run before any verification condition is built.
    ///
    /// Rejects dangling edges, misplaced entry/exit kinds, unknown callees,
    /// call arity mismatches, and cycles that avoid every loop head (the
    /// basic-path search would not terminate on those).
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for func in &self.functions {
            if !seen.insert(func.name.as_str()) {
                return Err(VerifyError::malformed_cfg(&func.name, "duplicate function name"));
            }
            self.validate_function(func)?;
        }
        Ok(())
    }

    fn validate_function(&self, func: &Function) -> Result<()> {
        if !func.entry_location()?.is_entry() {
            return Err(VerifyError::malformed_cfg(
                &func.name,
                format!("{} is not an entry location", func.entry),
            ));
        }
        if !func.exit_location()?.is_exit() {
            return Err(VerifyError::malformed_cfg(
                &func.name,
                format!("{} is not an exit location", func.exit),
            ));
        }

        for (index, location) in func.locations.iter().enumerate() {
            let id = LocationId(index);
            if id != func.entry && location.is_entry() {
                return Err(VerifyError::malformed_cfg(&func.name, format!("second entry location {id}")));
            }
            if id != func.exit && location.is_exit() {
                return Err(VerifyError::malformed_cfg(&func.name, format!("second exit location {id}")));
            }
            for edge in &location.edges {
                func.location(edge.target)?;
                if let Statement::Call {
                    lhs,
                    callee,
                    arguments,
                } = &edge.statement
                {
                    let target = self.function(callee)?;
                    check_call_arity(func, target, lhs, arguments)?;
                }
            }
        }

        check_loop_heads_cut_cycles(func)
    }
}

/// Argument and result counts must match the callee's signature
pub(crate) fn check_call_arity(
    caller: &Function,
    callee: &Function,
    lhs: &[Variable],
    arguments: &[Variable],
) -> Result<()> {
    if arguments.len() != callee.parameters.len() {
        return Err(VerifyError::structural(
            &caller.name,
            format!(
                "call to `{}` passes {} arguments, expected {}",
                callee.name,
                arguments.len(),
                callee.parameters.len()
            ),
        ));
    }
    if !lhs.is_empty() && lhs.len() != callee.rvs.len() {
        return Err(VerifyError::structural(
            &caller.name,
            format!(
                "call to `{}` binds {} results, callee returns {}",
                callee.name,
                lhs.len(),
                callee.rvs.len()
            ),
        ));
    }
    Ok(())
}

/// Every cycle must pass through a loop head: the graph with loop heads
/// removed has to be acyclic.
fn check_loop_heads_cut_cycles(func: &Function) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    let n = func.locations.len();
    let mut marks = vec![Mark::Unvisited; n];

    for root in 0..n {
        if marks[root] != Mark::Unvisited || func.locations[root].is_loop_head() {
            continue;
        }
        // Iterative DFS; the second tuple field is the next edge to explore.
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::OnStack;
        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            let edges = func.edges(LocationId(node))?;
            if next >= edges.len() {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            }
            frame.1 += 1;
            let target = edges[next].target.0;
            if func.locations[target].is_loop_head() {
                continue;
            }
            match marks[target] {
                Mark::OnStack => {
                    return Err(VerifyError::malformed_cfg(
                        &func.name,
                        format!("cycle through {} contains no loop head", LocationId(target)),
                    ));
                }
                Mark::Unvisited => {
                    marks[target] = Mark::OnStack;
                    stack.push((target, 0));
                }
                Mark::Done => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Variable;

    fn n() -> Variable {
        Variable::int("n")
    }

    fn looping_function(with_head: bool) -> Function {
        let mut b = FunctionBuilder::new("spin");
        let entry = b.entry(vec![], vec![]);
        let head = if with_head {
            b.loop_head(vec![], vec![])
        } else {
            b.plain()
        };
        let body = b.plain();
        let exit = b.exit(vec![]);
        b.edge(entry, head, Statement::assume(Expr::tt()));
        b.edge(head, body, Statement::assume(Expr::gt(Expr::var(n()), Expr::int(0))));
        b.edge(body, head, Statement::assign(n(), Expr::sub(Expr::var(n()), Expr::int(1))));
        b.edge(head, exit, Statement::assume(Expr::le(Expr::var(n()), Expr::int(0))));
        b.parameter(n()).build().unwrap()
    }

    #[test]
    fn test_validate_accepts_loop_with_head() {
        let program = Program::new(vec![], vec![looping_function(true)]);
        assert!(program.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_cycle_without_loop_head() {
        let program = Program::new(vec![], vec![looping_function(false)]);
        let err = program.validate().unwrap_err();
        assert!(matches!(err, VerifyError::MalformedCfg { .. }), "{err}");
    }

    #[test]
    fn test_validate_rejects_unknown_callee() {
        let mut b = FunctionBuilder::new("main");
        let entry = b.entry(vec![], vec![]);
        let exit = b.exit(vec![]);
        b.edge(entry, exit, Statement::call(vec![], "missing", vec![]));
        let program = Program::new(vec![], vec![b.build().unwrap()]);
        assert!(matches!(
            program.validate(),
            Err(VerifyError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_arity_mismatch() {
        let mut callee = FunctionBuilder::new("id");
        let e = callee.entry(vec![], vec![]);
        let x = callee.exit(vec![]);
        callee.edge(e, x, Statement::assume(Expr::tt()));
        let callee = callee.parameter(n()).build().unwrap();

        let mut caller = FunctionBuilder::new("main");
        let entry = caller.entry(vec![], vec![]);
        let exit = caller.exit(vec![]);
        caller.edge(entry, exit, Statement::call(vec![], "id", vec![]));
        let caller = caller.build().unwrap();

        let program = Program::new(vec![], vec![callee, caller]);
        assert!(matches!(
            program.validate(),
            Err(VerifyError::StructuralMismatch { .. })
        ));
    }

    #[test]
    fn test_edges_synthesised_for_empty_entry() {
        let mut b = FunctionBuilder::new("empty");
        b.entry(vec![], vec![]);
        let exit = b.exit(vec![]);
        let f = b.build().unwrap();
        let edges = f.edges(f.entry).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, exit);
        assert_eq!(edges[0].statement, Statement::assume(Expr::tt()));
        assert!(f.entry_location().unwrap().edges.is_empty());
    }

    #[test]
    fn test_edges_synthesised_to_first_body_location() {
        let mut b = FunctionBuilder::new("f");
        b.entry(vec![], vec![]);
        let exit = b.exit(vec![]);
        let body = b.plain();
        b.edge(body, exit, Statement::assume(Expr::tt()));
        let f = b.build().unwrap();
        assert_eq!(f.edges(f.entry).unwrap()[0].target, body);
    }

    #[test]
    fn test_statement_display() {
        let r = Variable::int("r");
        let s = Statement::call(vec![r], "abs", vec![n()]);
        assert_eq!(s.to_string(), "r := abs(n)");
        assert_eq!(Statement::assume(Expr::tt()).to_string(), "assume true");
    }

    #[test]
    fn test_program_from_json() {
        let text = r#"{
            "functions": [{
                "name": "nop",
                "entry": 0,
                "exit": 1,
                "locations": [
                    {"kind": {"entry": {}}, "edges": [
                        {"target": 1, "statement": {"assume": {"condition": {"bool": true}}}}
                    ]},
                    {"kind": {"exit": {"conditions": [{"bool": true}]}}}
                ]
            }]
        }"#;
        let program = Program::from_json(text).unwrap();
        assert!(program.predicates.is_empty());
        let f = program.function("nop").unwrap();
        assert!(f.entry_location().unwrap().is_entry());
        assert_eq!(f.exit_conditions().unwrap(), &[Expr::tt()]);
        assert!(program.validate().is_ok());
    }
}
