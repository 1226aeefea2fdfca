//! Capture-avoiding substitution and free-variable queries
//!
//! Rewrites return `None` when a subtree is left untouched so that the
//! caller can reuse the original node instead of rebuilding it.

use std::collections::{BTreeMap, BTreeSet};

use super::{Expr, ExprKind, STACK_GROW_SIZE, STACK_RED_ZONE, Variable};

/// A copy of `base` named `stem$k` for the smallest `k` whose name is not in `avoid`.
///
/// Any `$k` suffix already present on `base` is dropped first, so repeated
/// renaming yields `x$1` rather than `x$0$0`.
pub fn fresh_variable(base: &Variable, avoid: &BTreeSet<String>) -> Variable {
    let stem = match base.name.find('$') {
        Some(pos) => &base.name[..pos],
        None => base.name.as_str(),
    };
    let mut k = 0usize;
    loop {
        let candidate = format!("{stem}${k}");
        if !avoid.contains(&candidate) {
            return base.renamed(candidate);
        }
        k += 1;
    }
}

impl Expr {
    /// Replace every free occurrence of `var` with `replacement`.
    ///
    /// The receiver is never modified. When `var` is not free the result is
    /// the receiver itself (same node).
    pub fn substitute(&self, var: &Variable, replacement: &Expr) -> Expr {
        let mut map = BTreeMap::new();
        map.insert(var.clone(), replacement.clone());
        self.substitute_all(&map)
    }

    /// Simultaneous substitution: every variable in `map` is replaced in a
    /// single pass, so replacements never see each other's output.
    pub fn substitute_all(&self, map: &BTreeMap<Variable, Expr>) -> Expr {
        if map.is_empty() {
            return self.clone();
        }
        subst(self, map).unwrap_or_else(|| self.clone())
    }

    /// Rename variables to other variables (a substitution by variable terms)
    pub fn rename(&self, renaming: &BTreeMap<Variable, Variable>) -> Expr {
        let map: BTreeMap<Variable, Expr> = renaming
            .iter()
            .map(|(from, to)| (from.clone(), Expr::var(to.clone())))
            .collect();
        self.substitute_all(&map)
    }
}

pub(super) fn collect_free(expr: &Expr, bound: &mut Vec<String>, out: &mut BTreeSet<Variable>) {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
        collect_free_inner(expr, bound, out)
    })
}

fn collect_free_inner(expr: &Expr, bound: &mut Vec<String>, out: &mut BTreeSet<Variable>) {
    match expr.kind() {
        ExprKind::Bool(_) | ExprKind::Int(_) => {}
        ExprKind::Var(v) => {
            if !bound.iter().any(|name| *name == v.name) {
                out.insert(v.clone());
            }
        }
        ExprKind::Unary { operand, .. } => collect_free(operand, bound, out),
        ExprKind::Length(array) => collect_free(array, bound, out),
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_free(lhs, bound, out);
            collect_free(rhs, bound, out);
        }
        ExprKind::Select { array, index } => {
            collect_free(array, bound, out);
            collect_free(index, bound, out);
        }
        ExprKind::ArrayUpdate {
            array,
            index,
            value,
            length,
        } => {
            collect_free(array, bound, out);
            collect_free(index, bound, out);
            collect_free(value, bound, out);
            collect_free(length, bound, out);
        }
        ExprKind::Apply { args, .. } => {
            for arg in args {
                collect_free(arg, bound, out);
            }
        }
        ExprKind::Quantified {
            bound: binders,
            body,
            ..
        } => {
            let depth = bound.len();
            bound.extend(binders.iter().map(|b| b.name.clone()));
            collect_free(body, bound, out);
            bound.truncate(depth);
        }
    }
}

fn subst(expr: &Expr, map: &BTreeMap<Variable, Expr>) -> Option<Expr> {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || subst_inner(expr, map))
}

/// Rewrite each child; `None` if none of them changed.
fn subst_children(children: &[&Expr], map: &BTreeMap<Variable, Expr>) -> Option<Vec<Expr>> {
    let rewritten: Vec<Option<Expr>> = children.iter().map(|c| subst(c, map)).collect();
    if rewritten.iter().all(Option::is_none) {
        return None;
    }
    Some(
        rewritten
            .into_iter()
            .zip(children)
            .map(|(new, old)| new.unwrap_or_else(|| (*old).clone()))
            .collect(),
    )
}

fn subst_inner(expr: &Expr, map: &BTreeMap<Variable, Expr>) -> Option<Expr> {
    match expr.kind() {
        ExprKind::Bool(_) | ExprKind::Int(_) => None,
        ExprKind::Var(v) => map.get(v).cloned(),
        ExprKind::Unary { op, operand } => subst(operand, map).map(|o| Expr::unary(*op, o)),
        ExprKind::Length(array) => subst(array, map).map(Expr::length),
        ExprKind::Binary { op, lhs, rhs } => {
            let mut parts = subst_children(&[lhs, rhs], map)?.into_iter();
            let (l, r) = (parts.next()?, parts.next()?);
            Some(Expr::binary(*op, l, r))
        }
        ExprKind::Select { array, index } => {
            let mut parts = subst_children(&[array, index], map)?.into_iter();
            let (a, i) = (parts.next()?, parts.next()?);
            Some(Expr::select(a, i))
        }
        ExprKind::ArrayUpdate {
            array,
            index,
            value,
            length,
        } => {
            let mut parts = subst_children(&[array, index, value, length], map)?.into_iter();
            let (a, i, v, l) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
            Some(Expr::array_update(a, i, v, l))
        }
        ExprKind::Apply { predicate, args } => {
            let refs: Vec<&Expr> = args.iter().collect();
            subst_children(&refs, map).map(|new_args| Expr::apply(predicate.clone(), new_args))
        }
        ExprKind::Quantified {
            quantifier,
            bound,
            body,
        } => subst_quantified(*quantifier, bound, body, map),
    }
}

fn subst_quantified(
    quantifier: super::Quantifier,
    bound: &[Variable],
    body: &Expr,
    map: &BTreeMap<Variable, Expr>,
) -> Option<Expr> {
    // Binders shadow by name; only entries that occur free in the body matter.
    let body_free = body.free_variables();
    let active: BTreeMap<Variable, Expr> = map
        .iter()
        .filter(|(v, _)| !bound.iter().any(|b| b.name == v.name) && body_free.contains(*v))
        .map(|(v, e)| (v.clone(), e.clone()))
        .collect();
    if active.is_empty() {
        return None;
    }

    let replacement_free: BTreeSet<String> =
        active.values().flat_map(|e| e.free_names()).collect();

    let mut avoid: BTreeSet<String> = body_free.iter().map(|v| v.name.clone()).collect();
    avoid.extend(replacement_free.iter().cloned());
    avoid.extend(bound.iter().map(|b| b.name.clone()));
    avoid.extend(active.keys().map(|v| v.name.clone()));

    let mut binders = Vec::with_capacity(bound.len());
    let mut renaming: BTreeMap<Variable, Expr> = BTreeMap::new();
    for b in bound {
        if replacement_free.contains(&b.name) {
            let fresh = fresh_variable(b, &avoid);
            avoid.insert(fresh.name.clone());
            renaming.insert(b.clone(), Expr::var(fresh.clone()));
            binders.push(fresh);
        } else {
            binders.push(b.clone());
        }
    }

    let renamed_body = body.substitute_all(&renaming);
    let new_body = renamed_body.substitute_all(&active);
    Some(Expr::quantified(quantifier, binders, new_body))
}
