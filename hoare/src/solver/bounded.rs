//! Exhaustive search over a small integer domain
//!
//! The search tries every assignment of integers in `[-bound, bound]` and
//! booleans to the free variables of a formula. A falsifying assignment
//! is a genuine counterexample. Running out of assignments proves nothing
//! once an integer variable is involved, so that case is reported as
//! unknown; only formulas over booleans alone can be shown valid.
//!
//! Quantifiers would be evaluated over the same finite range, which makes
//! both answers unreliable, so quantified formulas are not searched at all.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::trace;

use super::{Counterexample, Solver, SolverError, Validity};
use crate::expr::eval::{Evaluator, Value};
use crate::expr::{Expr, ExprKind, Predicate, STACK_GROW_SIZE, STACK_RED_ZONE, Type, Variable};

/// Default cap on the number of assignments tried per query
pub const DEFAULT_MAX_ASSIGNMENTS: u64 = 1_000_000;

/// Number of integers in `[-bound, bound]`, if it fits in a `u64`
pub fn domain_size(bound: i64) -> Option<u64> {
    bound.unsigned_abs().checked_mul(2)?.checked_add(1)
}

/// How a bounded search ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Every assignment in the domain satisfies the formula
    Exhausted,
    /// This assignment falsifies the formula
    Falsified(Counterexample),
    /// The formula could not be searched; the string says why
    GaveUp(String),
}

/// Counterexample search over `[-bound, bound]`
#[derive(Debug, Clone)]
pub struct BoundedSolver {
    bound: i64,
    max_assignments: u64,
    predicates: HashMap<String, Predicate>,
}

impl BoundedSolver {
    pub fn new(bound: i64) -> Self {
        Self {
            bound: bound.saturating_abs(),
            max_assignments: DEFAULT_MAX_ASSIGNMENTS,
            predicates: HashMap::new(),
        }
    }

    pub fn with_max_assignments(mut self, max_assignments: u64) -> Self {
        self.max_assignments = max_assignments;
        self
    }

    pub fn bound(&self) -> i64 {
        self.bound
    }

    /// Integer domain ordered by magnitude: 0, 1, -1, 2, -2, ...
    fn int_at(index: u64) -> i64 {
        // Domain indices stay below 2 * i64::MAX + 1, so the magnitude fits
        let magnitude = index.div_ceil(2) as i64;
        if index % 2 == 1 { magnitude } else { -magnitude }
    }

    fn value_at(ty: &Type, index: u64) -> Value {
        match ty {
            Type::Bool => Value::Bool(index == 1),
            _ => Value::Int(Self::int_at(index)),
        }
    }

    /// Try every assignment of the free variables of `formula`
    pub fn search(&self, formula: &Expr) -> SearchOutcome {
        let variables: Vec<Variable> = formula.free_variables().into_iter().collect();
        if let Some(array) = variables.iter().find(|v| matches!(v.ty, Type::Array(_))) {
            return SearchOutcome::GaveUp(format!(
                "array variable `{}` is outside the bounded domain",
                array.name
            ));
        }
        if self.quantified(formula, &mut HashSet::new()) {
            return SearchOutcome::GaveUp("quantifier outside bounded domain".to_string());
        }

        let Some(ints) = domain_size(self.bound) else {
            return SearchOutcome::GaveUp(format!("bound {} is too large", self.bound));
        };
        let sizes: Vec<u64> = variables
            .iter()
            .map(|v| if v.ty == Type::Bool { 2 } else { ints })
            .collect();
        let space = sizes.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d));
        match space {
            Some(n) if n <= self.max_assignments => {}
            _ => {
                return SearchOutcome::GaveUp(format!(
                    "{} variables exceed the search cap of {} assignments",
                    variables.len(),
                    self.max_assignments
                ));
            }
        }

        let evaluator = Evaluator::new(&self.predicates, -self.bound..=self.bound);
        // Odometer over the per-variable domains.
        let mut digits = vec![0u64; variables.len()];
        loop {
            let assignment: BTreeMap<Variable, Value> = variables
                .iter()
                .zip(&digits)
                .map(|(v, &d)| (v.clone(), Self::value_at(&v.ty, d)))
                .collect();

            match evaluator.holds(formula, &assignment) {
                Ok(true) => {}
                Ok(false) => {
                    trace!(?assignment, "counterexample");
                    let assignments = assignment
                        .iter()
                        .map(|(v, val)| (v.name.clone(), val.to_string()))
                        .collect();
                    return SearchOutcome::Falsified(Counterexample::new(assignments));
                }
                Err(e) => return SearchOutcome::GaveUp(format!("evaluation failed: {e}")),
            }

            let mut position = 0;
            loop {
                if position == digits.len() {
                    return SearchOutcome::Exhausted;
                }
                digits[position] += 1;
                if digits[position] < sizes[position] {
                    break;
                }
                digits[position] = 0;
                position += 1;
            }
        }
    }

    /// Whether `expr`, or the body of a predicate it applies, has a binder
    fn quantified<'e>(&'e self, expr: &'e Expr, seen: &mut HashSet<&'e str>) -> bool {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || match expr.kind() {
            ExprKind::Bool(_) | ExprKind::Int(_) | ExprKind::Var(_) => false,
            ExprKind::Quantified { .. } => true,
            ExprKind::Unary { operand, .. } => self.quantified(operand, seen),
            ExprKind::Length(array) => self.quantified(array, seen),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.quantified(lhs, seen) || self.quantified(rhs, seen)
            }
            ExprKind::Select { array, index } => {
                self.quantified(array, seen) || self.quantified(index, seen)
            }
            ExprKind::ArrayUpdate {
                array,
                index,
                value,
                length,
            } => [array, index, value, length]
                .into_iter()
                .any(|e| self.quantified(e, seen)),
            ExprKind::Apply { predicate, args } => {
                let body = match self.predicates.get(predicate.as_str()) {
                    Some(p) if seen.insert(p.name.as_str()) => self.quantified(&p.body, seen),
                    _ => false,
                };
                body || args.iter().any(|a| self.quantified(a, seen))
            }
        })
    }
}

impl Solver for BoundedSolver {
    fn define_predicate(&mut self, predicate: &Predicate) -> Result<(), SolverError> {
        self.predicates
            .insert(predicate.name.clone(), predicate.clone());
        Ok(())
    }

    fn check_valid(&mut self, formula: &Expr) -> Result<Validity, SolverError> {
        Ok(match self.search(formula) {
            SearchOutcome::Falsified(cex) => Validity::Invalid(cex),
            SearchOutcome::GaveUp(reason) => Validity::Unknown(reason),
            SearchOutcome::Exhausted => {
                if formula.free_variables().iter().all(|v| v.ty == Type::Bool) {
                    Validity::Valid
                } else {
                    Validity::Unknown(format!(
                        "no counterexample with integers in [-{b}, {b}]",
                        b = self.bound
                    ))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var(Variable::int("x"))
    }

    #[test]
    fn test_exhausted_integer_search_is_unknown() {
        let f = Expr::implies(
            Expr::ge(x(), Expr::int(0)),
            Expr::gt(Expr::add(x(), Expr::int(1)), Expr::int(0)),
        );
        let solver = BoundedSolver::new(5);
        assert_eq!(solver.search(&f), SearchOutcome::Exhausted);
        assert!(matches!(BoundedSolver::new(5).check_valid(&f).unwrap(), Validity::Unknown(_)));
    }

    #[test]
    fn test_witness_beyond_bound_not_valid() {
        let f = Expr::lt(x(), Expr::int(100));
        match BoundedSolver::new(8).check_valid(&f).unwrap() {
            Validity::Unknown(reason) => assert_eq!(reason, "no counterexample with integers in [-8, 8]"),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_counterexample() {
        let f = Expr::implies(
            Expr::ge(x(), Expr::int(-1)),
            Expr::gt(Expr::add(x(), Expr::int(1)), Expr::int(0)),
        );
        match BoundedSolver::new(5).check_valid(&f).unwrap() {
            Validity::Invalid(cex) => assert_eq!(cex.get("x"), Some("-1")),
            other => panic!("expected counterexample, got {other:?}"),
        }
    }

    #[test]
    fn test_closed_formula() {
        let mut solver = BoundedSolver::new(1);
        assert_eq!(solver.check_valid(&Expr::tt()).unwrap(), Validity::Valid);
        assert!(matches!(solver.check_valid(&Expr::ff()).unwrap(), Validity::Invalid(c) if c.is_empty()));
    }

    #[test]
    fn test_booleans_enumerated() {
        let p = Expr::var(Variable::boolean("p"));
        let excluded_middle = Expr::or(p.clone(), Expr::not(p.clone()));
        let mut solver = BoundedSolver::new(0);
        assert_eq!(solver.check_valid(&excluded_middle).unwrap(), Validity::Valid);
        assert!(matches!(solver.check_valid(&p).unwrap(), Validity::Invalid(_)));
    }

    #[test]
    fn test_predicates_are_inlined() {
        let n = Variable::int("n");
        let pos = Predicate::new("pos", vec![n.clone()], Expr::gt(Expr::var(n), Expr::int(0)));
        let mut solver = BoundedSolver::new(3);
        solver.define_predicate(&pos).unwrap();
        let holds = Expr::implies(Expr::gt(x(), Expr::int(1)), Expr::apply("pos", vec![x()]));
        assert_eq!(solver.search(&holds), SearchOutcome::Exhausted);
        let fails = Expr::apply("pos", vec![x()]);
        assert!(matches!(solver.check_valid(&fails).unwrap(), Validity::Invalid(c) if c.get("x") == Some("0")));
    }

    #[test]
    fn test_quantified_formula_unknown() {
        let k = Variable::int("k");
        // Valid over the integers, but the witness lies outside [-8, 8]
        let f = Expr::exists(
            vec![k.clone()],
            Expr::equals(Expr::var(k), Expr::add(x(), Expr::int(100))),
        );
        match BoundedSolver::new(8).check_valid(&f).unwrap() {
            Validity::Unknown(reason) => assert_eq!(reason, "quantifier outside bounded domain"),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_quantifier_inside_predicate_unknown() {
        let (n, k) = (Variable::int("n"), Variable::int("k"));
        let above = Predicate::new(
            "above",
            vec![n.clone()],
            Expr::exists(vec![k.clone()], Expr::gt(Expr::var(k), Expr::var(n))),
        );
        let mut solver = BoundedSolver::new(2);
        solver.define_predicate(&above).unwrap();
        let f = Expr::apply("above", vec![Expr::int(5)]);
        assert!(matches!(solver.check_valid(&f).unwrap(), Validity::Unknown(_)));
    }

    #[test]
    fn test_arrays_unknown() {
        let a = Expr::var(Variable::array("a", Type::Int));
        let f = Expr::ge(Expr::length(a), Expr::int(0));
        assert!(matches!(BoundedSolver::new(2).check_valid(&f).unwrap(), Validity::Unknown(_)));
    }

    #[test]
    fn test_search_cap_unknown() {
        let vars: Vec<Expr> = ["a", "b", "c"].iter().map(|n| Expr::var(Variable::int(*n))).collect();
        let f = Expr::conjunction(vars.into_iter().map(|v| Expr::ge(v, Expr::int(-100))));
        let mut solver = BoundedSolver::new(10).with_max_assignments(100);
        assert!(matches!(solver.check_valid(&f).unwrap(), Validity::Unknown(_)));
    }

    #[test]
    fn test_huge_bounds() {
        assert_eq!(domain_size(4), Some(9));
        assert_eq!(domain_size(i64::MIN), None);
        assert_eq!(domain_size(i64::MAX), Some(u64::MAX));

        let mut solver = BoundedSolver::new(i64::MIN);
        assert_eq!(solver.bound(), i64::MAX);
        assert_eq!(solver.check_valid(&Expr::tt()).unwrap(), Validity::Valid);
        assert!(matches!(solver.check_valid(&Expr::ge(x(), Expr::int(0))).unwrap(), Validity::Unknown(_)));

        let mut solver = BoundedSolver::new(4_000_000_000_000);
        assert_eq!(solver.check_valid(&Expr::tt()).unwrap(), Validity::Valid);
    }

    #[test]
    fn test_domain_order() {
        let values: Vec<i64> = (0..5).map(BoundedSolver::int_at).collect();
        assert_eq!(values, vec![0, 1, -1, 2, -2]);
        assert_eq!(BoundedSolver::int_at(u64::MAX - 1), -i64::MAX);
    }

    #[test]
    fn test_division_by_zero_unknown() {
        let f = Expr::equals(Expr::binary(crate::expr::BinOp::Div, Expr::int(1), x()), Expr::int(1));
        assert!(matches!(BoundedSolver::new(1).check_valid(&f).unwrap(), Validity::Unknown(_)));
    }
}
