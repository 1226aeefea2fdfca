//! Basic-path decomposition
//!
//! Splits a function's CFG into loop-free, call-free segments between
//! specification points (entry, loop heads, call sites, exit).

use std::collections::HashSet;
use std::fmt;

use tracing::trace;

use crate::error::{Result, VerifyError};
use crate::ir::{Edge, Function, LocationId};

/// A path through the CFG.
///
/// Each step records the index of the edge taken out of the previous
/// location, so parallel edges to the same target stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BasicPath {
    pub start: LocationId,
    /// `(edge index, target)` for every edge taken, in order
    pub steps: Vec<(usize, LocationId)>,
}

impl BasicPath {
    fn single(start: LocationId) -> Self {
        Self {
            start,
            steps: Vec::new(),
        }
    }

    fn extended(&self, edge: usize, target: LocationId) -> Self {
        let mut steps = self.steps.clone();
        steps.push((edge, target));
        Self {
            start: self.start,
            steps,
        }
    }

    /// Locations visited, start included
    pub fn locations(&self) -> Vec<LocationId> {
        std::iter::once(self.start)
            .chain(self.steps.iter().map(|&(_, target)| target))
            .collect()
    }

    pub fn end(&self) -> LocationId {
        self.steps.last().map_or(self.start, |&(_, target)| target)
    }

    /// Edges taken, in path order, together with their source location
    pub fn edges(&self, func: &Function) -> Result<Vec<(LocationId, Edge)>> {
        let mut out = Vec::with_capacity(self.steps.len());
        let mut from = self.start;
        for &(index, target) in &self.steps {
            let edges = func.edges(from)?;
            let edge = edges.get(index).cloned().ok_or_else(|| {
                VerifyError::malformed_cfg(&func.name, format!("{from} has no edge {index}"))
            })?;
            out.push((from, edge));
            from = target;
        }
        Ok(out)
    }
}

impl fmt::Display for BasicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, loc) in self.locations().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{loc}")?;
        }
        write!(f, "]")
    }
}

/// DFS frame: location reached, path so far, loop heads already entered
struct Frame {
    location: LocationId,
    path: BasicPath,
    loop_memory: Vec<LocationId>,
}

/// Decompose `func` into basic paths.
///
/// Depth-first over an explicit stack. At each location the first
/// matching rule applies:
///
/// 1. an outgoing edge is a call: close the path; every successor starts
///    a new path `[location, successor]`;
/// 2. the exit: close the path;
/// 3. a loop head not in loop memory: close the path; every successor
///    starts a new path `[location, successor]` with the head remembered;
/// 4. a loop head already in loop memory: close the path.
///
/// Otherwise the path is extended to every successor. A loop head with a
/// call edge is remembered under rule 1 too, and a second visit closes
/// the path under rule 4.
///
/// Every cycle must pass through a loop head; [`crate::ir::Program::validate`]
/// rejects graphs where one does not. Paths reached through different
/// prefixes are reported once, in order of first discovery.
pub fn find_basic_paths(func: &Function) -> Result<Vec<BasicPath>> {
    let mut paths = Vec::new();
    let mut seen = HashSet::new();
    let mut close = |path: BasicPath, paths: &mut Vec<BasicPath>| {
        if seen.insert(path.clone()) {
            trace!(function = %func.name, %path, "basic path");
            paths.push(path);
        }
    };

    let mut stack = vec![Frame {
        location: func.entry,
        path: BasicPath::single(func.entry),
        loop_memory: Vec::new(),
    }];

    while let Some(Frame {
        location,
        path,
        loop_memory,
    }) = stack.pop()
    {
        let current = func.location(location)?;
        let edges = func.edges(location)?;
        let remembered = loop_memory.contains(&location);

        if current.has_call() {
            close(path, &mut paths);
            if current.is_loop_head() && remembered {
                continue;
            }
            let mut memory = loop_memory;
            if current.is_loop_head() {
                memory.push(location);
            }
            for (index, edge) in edges.iter().enumerate() {
                stack.push(Frame {
                    location: edge.target,
                    path: BasicPath::single(location).extended(index, edge.target),
                    loop_memory: memory.clone(),
                });
            }
        } else if location == func.exit {
            close(path, &mut paths);
        } else if current.is_loop_head() && !remembered {
            close(path, &mut paths);
            let mut memory = loop_memory;
            memory.push(location);
            for (index, edge) in edges.iter().enumerate() {
                stack.push(Frame {
                    location: edge.target,
                    path: BasicPath::single(location).extended(index, edge.target),
                    loop_memory: memory.clone(),
                });
            }
        } else if current.is_loop_head() {
            close(path, &mut paths);
        } else {
            for (index, edge) in edges.iter().enumerate() {
                stack.push(Frame {
                    location: edge.target,
                    path: path.extended(index, edge.target),
                    loop_memory: loop_memory.clone(),
                });
            }
        }
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, Variable};
    use crate::ir::{FunctionBuilder, Statement};

    fn n() -> Variable {
        Variable::int("n")
    }

    #[test]
    fn test_empty_body_single_path() {
        let mut b = FunctionBuilder::new("nop");
        let entry = b.entry(vec![], vec![]);
        let exit = b.exit(vec![]);
        let f = b.build().unwrap();
        let paths = find_basic_paths(&f).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].locations(), vec![entry, exit]);
    }

    #[test]
    fn test_straight_line() {
        let mut b = FunctionBuilder::new("f");
        let entry = b.entry(vec![], vec![]);
        let mid = b.plain();
        let exit = b.exit(vec![]);
        b.edge(entry, mid, Statement::assign(n(), Expr::int(1)));
        b.edge(mid, exit, Statement::assert(Expr::gt(Expr::var(n()), Expr::int(0))));
        let paths = find_basic_paths(&b.build().unwrap()).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].locations(), vec![entry, mid, exit]);
        assert_eq!(paths[0].steps, vec![(0, mid), (0, exit)]);
    }

    #[test]
    fn test_loop_splits_at_head() {
        let mut b = FunctionBuilder::new("countdown");
        let entry = b.entry(vec![], vec![]);
        let head = b.loop_head(vec![], vec![Expr::var(n())]);
        let body = b.plain();
        let exit = b.exit(vec![]);
        b.edge(entry, head, Statement::assume(Expr::tt()));
        b.edge(head, body, Statement::assume(Expr::gt(Expr::var(n()), Expr::int(0))));
        b.edge(body, head, Statement::assign(n(), Expr::sub(Expr::var(n()), Expr::int(1))));
        b.edge(head, exit, Statement::assume(Expr::le(Expr::var(n()), Expr::int(0))));
        let paths: Vec<Vec<LocationId>> = find_basic_paths(&b.build().unwrap())
            .unwrap()
            .iter()
            .map(BasicPath::locations)
            .collect();
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&vec![entry, head]));
        assert!(paths.contains(&vec![head, body, head]));
        assert!(paths.contains(&vec![head, exit]));
    }

    #[test]
    fn test_call_closes_path() {
        let r = Variable::int("r");
        let mut b = FunctionBuilder::new("caller");
        let entry = b.entry(vec![], vec![]);
        let site = b.plain();
        let after = b.plain();
        let exit = b.exit(vec![]);
        b.edge(entry, site, Statement::assume(Expr::tt()));
        b.edge(site, after, Statement::call(vec![r.clone()], "callee", vec![n()]));
        b.edge(after, exit, Statement::assert(Expr::ge(Expr::var(r), Expr::int(0))));
        let paths: Vec<Vec<LocationId>> = find_basic_paths(&b.build().unwrap())
            .unwrap()
            .iter()
            .map(BasicPath::locations)
            .collect();
        assert_eq!(paths, vec![vec![entry, site], vec![site, after, exit]]);
    }

    #[test]
    fn test_parallel_edges_distinct() {
        let mut b = FunctionBuilder::new("branch");
        let entry = b.entry(vec![], vec![]);
        let exit = b.exit(vec![]);
        b.edge(entry, exit, Statement::assume(Expr::gt(Expr::var(n()), Expr::int(0))));
        b.edge(entry, exit, Statement::assume(Expr::le(Expr::var(n()), Expr::int(0))));
        let f = b.build().unwrap();
        let paths = find_basic_paths(&f).unwrap();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0].steps, paths[1].steps);
        for path in &paths {
            assert_eq!(path.locations(), vec![entry, exit]);
        }
    }

    #[test]
    fn test_diamond_rejoins_are_deduplicated() {
        let mut b = FunctionBuilder::new("diamond");
        let entry = b.entry(vec![], vec![]);
        let left = b.plain();
        let right = b.plain();
        let head = b.loop_head(vec![], vec![]);
        let exit = b.exit(vec![]);
        b.edge(entry, left, Statement::assume(Expr::tt()));
        b.edge(entry, right, Statement::assume(Expr::tt()));
        b.edge(left, head, Statement::assume(Expr::tt()));
        b.edge(right, head, Statement::assume(Expr::tt()));
        b.edge(head, exit, Statement::assume(Expr::tt()));
        let paths = find_basic_paths(&b.build().unwrap()).unwrap();
        let head_exit: Vec<_> = paths
            .iter()
            .filter(|p| p.locations() == vec![head, exit])
            .collect();
        assert_eq!(head_exit.len(), 1);
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_loop_head_with_call_terminates() {
        let mut b = FunctionBuilder::new("spin");
        let entry = b.entry(vec![], vec![]);
        let head = b.loop_head(vec![], vec![]);
        let exit = b.exit(vec![]);
        b.edge(entry, head, Statement::assume(Expr::tt()));
        b.edge(head, head, Statement::call(vec![], "tick", vec![]));
        b.edge(head, exit, Statement::assume(Expr::tt()));
        let paths: Vec<Vec<LocationId>> = find_basic_paths(&b.build().unwrap())
            .unwrap()
            .iter()
            .map(BasicPath::locations)
            .collect();
        assert!(paths.contains(&vec![entry, head]));
        assert!(paths.contains(&vec![head, head]));
        assert!(paths.contains(&vec![head, exit]));
    }

    #[test]
    fn test_no_path_continues_past_call_or_revisit() {
        let mut b = FunctionBuilder::new("nested");
        let entry = b.entry(vec![], vec![]);
        let outer = b.loop_head(vec![], vec![]);
        let inner = b.loop_head(vec![], vec![]);
        let site = b.plain();
        let exit = b.exit(vec![]);
        b.edge(entry, outer, Statement::assume(Expr::tt()));
        b.edge(outer, inner, Statement::assume(Expr::tt()));
        b.edge(inner, site, Statement::assume(Expr::tt()));
        b.edge(site, inner, Statement::call(vec![], "g", vec![]));
        b.edge(inner, outer, Statement::assume(Expr::tt()));
        b.edge(outer, exit, Statement::assume(Expr::tt()));
        let f = b.build().unwrap();
        for path in find_basic_paths(&f).unwrap() {
            let locs = path.locations();
            for (i, loc) in locs.iter().enumerate() {
                let location = f.location(*loc).unwrap();
                let interior = i > 0 && i + 1 < locs.len();
                if interior {
                    assert!(!location.has_call(), "{path} passes a call");
                    assert!(!location.is_loop_head(), "{path} passes a loop head");
                    assert_ne!(*loc, f.exit);
                }
            }
            for (from, edge) in path.edges(&f).unwrap() {
                assert!(f.location(from).unwrap().succ_locations().any(|t| t == edge.target) || from == f.entry);
            }
        }
    }
}
