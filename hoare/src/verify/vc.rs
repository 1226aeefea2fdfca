//! Verification conditions for partial correctness
//!
//! For a basic path `[l0, ..., lk]` the condition is `pre => wp(path, post)`
//! where `pre` is what holds at `l0`, `post` is what must hold at `lk`, and
//! `wp` is computed backwards over the statements on the path.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use super::paths::BasicPath;
use crate::error::Result;
use crate::expr::{Expr, Variable, fresh_variable};
use crate::ir::{Edge, Function, Location, LocationId, Program, Statement, check_call_arity};

/// What the end of a path demands
#[derive(Debug, Clone, PartialEq)]
pub struct PathEnd {
    /// Conjunction of the obligations at the last location
    pub post: Expr,
    /// Ranking tuples the path must decrease into: the loop head's own
    /// tuple, then one per callee called from the last location
    pub exit_rankings: Vec<Vec<Expr>>,
}

/// A basic path together with everything needed to reason about it.
///
/// Keeps the set of names in use along the path so that variables
/// introduced during the backward pass never collide with program
/// variables.
pub struct PathContext<'p> {
    program: &'p Program,
    func: &'p Function,
    path: &'p BasicPath,
    edges: Vec<(LocationId, Edge)>,
    vocabulary: BTreeSet<String>,
}

impl<'p> PathContext<'p> {
    pub fn new(program: &'p Program, func: &'p Function, path: &'p BasicPath) -> Result<Self> {
        let edges = path.edges(func)?;
        let mut vocabulary = BTreeSet::new();
        for (_, edge) in &edges {
            statement_names(&edge.statement, &mut vocabulary);
        }
        for id in path.locations() {
            let location = func.location(id)?;
            for e in location
                .annotations()
                .iter()
                .chain(location.ranking_functions().unwrap_or(&[]))
            {
                vocabulary.extend(e.free_names());
            }
        }
        Ok(Self {
            program,
            func,
            path,
            edges,
            vocabulary,
        })
    }

    pub fn function(&self) -> &'p Function {
        self.func
    }

    pub fn path(&self) -> &'p BasicPath {
        self.path
    }

    fn start(&self) -> Result<&'p Location> {
        self.func.location(self.path.start)
    }

    /// `true` unless the path starts at the entry or a loop head, in which
    /// case the conjunction of its conditions or invariants
    pub fn precondition(&self) -> Result<Expr> {
        Ok(Expr::conjunction(self.start()?.annotations().iter().cloned()))
    }

    /// Ranking functions of the start location; empty when it has none
    pub fn entry_ranking_functions(&self) -> Result<&'p [Expr]> {
        Ok(self.start()?.ranking_functions().unwrap_or(&[]))
    }

    /// Postcondition seed and exit ranking tuples of the last location.
    ///
    /// A loop head contributes its invariants and ranking functions, the
    /// exit its conditions. Every call on an outgoing edge of the last
    /// location contributes the callee's entry conditions and ranking
    /// functions, with formals bound to the actual arguments.
    pub fn end(&self) -> Result<PathEnd> {
        let last = self.func.location(self.path.end())?;
        let mut post = Vec::new();
        let mut exit_rankings = Vec::new();

        match last.ranking_functions() {
            Some(ranks) if last.is_loop_head() => {
                post.extend(last.annotations().iter().cloned());
                exit_rankings.push(ranks.to_vec());
            }
            _ if last.is_exit() => post.extend(last.annotations().iter().cloned()),
            _ => {}
        }

        for edge in &last.edges {
            let Statement::Call {
                lhs,
                callee,
                arguments,
            } = &edge.statement
            else {
                continue;
            };
            let callee = self.program.function(callee)?;
            check_call_arity(self.func, callee, lhs, arguments)?;
            let binding = bind_arguments(callee, arguments);
            post.extend(
                callee
                    .entry_conditions()?
                    .iter()
                    .map(|c| c.substitute_all(&binding)),
            );
            exit_rankings.push(
                callee
                    .entry_ranking_functions()?
                    .iter()
                    .map(|r| r.substitute_all(&binding))
                    .collect(),
            );
        }

        Ok(PathEnd {
            post: Expr::conjunction(post),
            exit_rankings,
        })
    }

    /// Variable named after `base` that is not in use on this path
    pub fn fresh(&mut self, base: &Variable) -> Variable {
        let var = fresh_variable(base, &self.vocabulary);
        self.vocabulary.insert(var.name.clone());
        var
    }

    /// Weakest precondition of `post` over the path's statements
    pub fn weakest_precondition(&mut self, post: Expr) -> Result<Expr> {
        self.vocabulary.extend(post.free_names());
        let mut condition = post;
        for index in (0..self.edges.len()).rev() {
            let statement = self.edges[index].1.statement.clone();
            condition = self.step(&statement, condition)?;
            trace!(%statement, %condition, "wp step");
        }
        Ok(condition)
    }

    fn step(&mut self, statement: &Statement, condition: Expr) -> Result<Expr> {
        Ok(match statement {
            Statement::Assign { variable, value } => condition.substitute(variable, value),
            Statement::SubscriptAssign {
                array,
                index,
                value,
            } => {
                let current = Expr::var(array.clone());
                let updated = Expr::array_update(
                    current.clone(),
                    index.clone(),
                    value.clone(),
                    Expr::length(current),
                );
                condition.substitute(array, &updated)
            }
            Statement::Assume { condition: guard } => Expr::implies(guard.clone(), condition),
            Statement::Assert { condition: claim } => Expr::and(condition, claim.clone()),
            Statement::Call {
                lhs,
                callee,
                arguments,
            } => self.call(lhs, callee, arguments, condition)?,
        })
    }

    /// `Q[rets := v, formals := actuals] => C[lhs := v]` for fresh `v`.
    ///
    /// Results without a left-hand side still get fresh names so that the
    /// callee's return variables cannot alias caller variables.
    fn call(
        &mut self,
        lhs: &[Variable],
        callee: &str,
        arguments: &[Variable],
        condition: Expr,
    ) -> Result<Expr> {
        let callee = self.program.function(callee)?;
        check_call_arity(self.func, callee, lhs, arguments)?;

        let exit = Expr::conjunction(callee.exit_conditions()?.iter().cloned());
        self.vocabulary.extend(exit.free_names());
        self.vocabulary.extend(condition.free_names());

        let mut binding = bind_arguments(callee, arguments);
        let mut results = BTreeMap::new();
        for (i, rv) in callee.rvs.iter().enumerate() {
            let target = lhs.get(i);
            let value = Expr::var(self.fresh(target.unwrap_or(rv)));
            binding.insert(rv.clone(), value.clone());
            if let Some(target) = target {
                results.insert(target.clone(), value);
            }
        }

        Ok(Expr::implies(
            exit.substitute_all(&binding),
            condition.substitute_all(&results),
        ))
    }

    /// `pre => wp(path, post)`
    pub fn partial_correctness(&mut self) -> Result<Expr> {
        let pre = self.precondition()?;
        let end = self.end()?;
        debug!(
            function = %self.func.name,
            path = %self.path,
            %pre,
            post = %end.post,
            "partial correctness"
        );
        let wp = self.weakest_precondition(end.post)?;
        Ok(Expr::implies(pre, wp))
    }
}

/// Callee formals mapped to the actual argument variables
fn bind_arguments(callee: &Function, arguments: &[Variable]) -> BTreeMap<Variable, Expr> {
    callee
        .parameters
        .iter()
        .cloned()
        .zip(arguments.iter().cloned().map(Expr::var))
        .collect()
}

fn statement_names(statement: &Statement, out: &mut BTreeSet<String>) {
    match statement {
        Statement::Assign { variable, value } => {
            out.insert(variable.name.clone());
            out.extend(value.free_names());
        }
        Statement::SubscriptAssign {
            array,
            index,
            value,
        } => {
            out.insert(array.name.clone());
            out.extend(index.free_names());
            out.extend(value.free_names());
        }
        Statement::Assume { condition } | Statement::Assert { condition } => {
            out.extend(condition.free_names());
        }
        Statement::Call { lhs, arguments, .. } => {
            out.extend(lhs.iter().chain(arguments).map(|v| v.name.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Type;
    use crate::ir::FunctionBuilder;
    use crate::verify::paths::find_basic_paths;

    fn x() -> Variable {
        Variable::int("x")
    }

    fn increment(pre: i64) -> Program {
        let mut b = FunctionBuilder::new("inc");
        let entry = b.entry(vec![Expr::ge(Expr::var(x()), Expr::int(pre))], vec![]);
        let mid = b.plain();
        let exit = b.exit(vec![]);
        b.edge(entry, mid, Statement::assign(x(), Expr::add(Expr::var(x()), Expr::int(1))));
        b.edge(mid, exit, Statement::assert(Expr::gt(Expr::var(x()), Expr::int(0))));
        Program::new(vec![], vec![b.parameter(x()).build().unwrap()])
    }

    #[test]
    fn test_straight_line_condition() {
        let program = increment(0);
        let func = &program.functions[0];
        let paths = find_basic_paths(func).unwrap();
        let mut ctx = PathContext::new(&program, func, &paths[0]).unwrap();
        let vc = ctx.partial_correctness().unwrap();
        let x1 = Expr::add(Expr::var(x()), Expr::int(1));
        let expected = Expr::implies(
            Expr::ge(Expr::var(x()), Expr::int(0)),
            Expr::and(Expr::tt(), Expr::gt(x1, Expr::int(0))),
        );
        assert_eq!(vc, expected);
    }

    #[test]
    fn test_subscript_assignment_updates_array() {
        let a = Variable::array("a", Type::Int);
        let i = Variable::int("i");
        let mut b = FunctionBuilder::new("store");
        let entry = b.entry(vec![], vec![]);
        let exit = b.exit(vec![Expr::equals(
            Expr::select(Expr::var(a.clone()), Expr::var(i.clone())),
            Expr::int(7),
        )]);
        b.edge(entry, exit, Statement::subscript_assign(a.clone(), Expr::var(i.clone()), Expr::int(7)));
        let program = Program::new(vec![], vec![b.build().unwrap()]);
        let func = &program.functions[0];
        let path = &find_basic_paths(func).unwrap()[0];
        let mut ctx = PathContext::new(&program, func, path).unwrap();
        let post = ctx.end().unwrap().post;
        let wp = ctx.weakest_precondition(post).unwrap();
        let av = Expr::var(a);
        let updated = Expr::array_update(av.clone(), Expr::var(i.clone()), Expr::int(7), Expr::length(av));
        assert_eq!(wp, Expr::equals(Expr::select(updated, Expr::var(i)), Expr::int(7)));
    }

    fn callee_with_post() -> Function {
        let p = Variable::int("p");
        let rv = Variable::int("rv");
        let mut b = FunctionBuilder::new("abs");
        let entry = b.entry(vec![Expr::ge(Expr::var(p.clone()), Expr::int(-10))], vec![]);
        let exit = b.exit(vec![Expr::ge(Expr::var(rv.clone()), Expr::int(0))]);
        b.edge(entry, exit, Statement::assume(Expr::tt()));
        b.parameter(p).returns(rv).build().unwrap()
    }

    #[test]
    fn test_call_rule_uses_fresh_result() {
        let r = Variable::int("r");
        let n = Variable::int("n");
        let mut b = FunctionBuilder::new("main");
        let entry = b.entry(vec![], vec![]);
        let site = b.plain();
        let exit = b.exit(vec![Expr::ge(Expr::var(r.clone()), Expr::int(0))]);
        b.edge(entry, site, Statement::assume(Expr::tt()));
        b.edge(site, exit, Statement::call(vec![r.clone()], "abs", vec![n.clone()]));
        let program = Program::new(vec![], vec![callee_with_post(), b.build().unwrap()]);
        let func = &program.functions[1];
        let paths = find_basic_paths(func).unwrap();
        assert_eq!(paths.len(), 2);

        // [entry, site] must establish the callee's precondition
        let mut ctx = PathContext::new(&program, func, &paths[0]).unwrap();
        assert_eq!(ctx.end().unwrap().post, Expr::ge(Expr::var(n.clone()), Expr::int(-10)));
        assert_eq!(
            ctx.partial_correctness().unwrap(),
            Expr::implies(
                Expr::tt(),
                Expr::implies(Expr::tt(), Expr::ge(Expr::var(n.clone()), Expr::int(-10)))
            )
        );

        // [site, exit] assumes the callee's postcondition for a fresh result
        let mut ctx = PathContext::new(&program, func, &paths[1]).unwrap();
        let v = Expr::var(Variable::int("r$0"));
        assert_eq!(
            ctx.partial_correctness().unwrap(),
            Expr::implies(
                Expr::tt(),
                Expr::implies(Expr::ge(v.clone(), Expr::int(0)), Expr::ge(v, Expr::int(0)))
            )
        );
    }

    #[test]
    fn test_call_rule_self_update() {
        // x := abs(x) with caller postcondition x >= 0
        let mut b = FunctionBuilder::new("main");
        let entry = b.entry(vec![], vec![]);
        let site = b.plain();
        let exit = b.exit(vec![Expr::ge(Expr::var(x()), Expr::int(0))]);
        b.edge(entry, site, Statement::assume(Expr::tt()));
        b.edge(site, exit, Statement::call(vec![x()], "abs", vec![x()]));
        let program = Program::new(vec![], vec![callee_with_post(), b.build().unwrap()]);
        let func = &program.functions[1];
        let path = &find_basic_paths(func).unwrap()[1];
        let mut ctx = PathContext::new(&program, func, path).unwrap();
        let post = ctx.end().unwrap().post;
        let wp = ctx.weakest_precondition(post).unwrap();
        let v = Expr::var(Variable::int("x$0"));
        assert_eq!(
            wp,
            Expr::implies(Expr::ge(v.clone(), Expr::int(0)), Expr::ge(v, Expr::int(0)))
        );
    }

    #[test]
    fn test_swapped_arguments_bound_simultaneously() {
        let a = Variable::int("a");
        let bv = Variable::int("b");
        let mut callee = FunctionBuilder::new("ordered");
        let e = callee.entry(vec![Expr::lt(Expr::var(a.clone()), Expr::var(bv.clone()))], vec![]);
        let x_ = callee.exit(vec![]);
        callee.edge(e, x_, Statement::assume(Expr::tt()));
        let callee = callee.parameter(a.clone()).parameter(bv.clone()).build().unwrap();

        let mut caller = FunctionBuilder::new("main");
        let entry = caller.entry(vec![], vec![]);
        let exit = caller.exit(vec![]);
        caller.edge(entry, exit, Statement::call(vec![], "ordered", vec![bv.clone(), a.clone()]));
        let program = Program::new(vec![], vec![callee, caller.build().unwrap()]);
        let func = &program.functions[1];
        let path = &find_basic_paths(func).unwrap()[0];
        let ctx = PathContext::new(&program, func, path).unwrap();
        assert_eq!(ctx.end().unwrap().post, Expr::lt(Expr::var(bv), Expr::var(a)));
    }
}
