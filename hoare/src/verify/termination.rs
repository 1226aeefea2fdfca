//! Termination conditions
//!
//! A path that starts at a location with ranking functions `R` and ends
//! at a location (or call) with ranking functions `R'` must take `R'`
//! strictly below `R` in the lexicographic order while keeping every
//! component of `R'` non-negative.
//!
//! The entry values of `R` are frozen under snapshot names before the
//! backward pass, since that pass rewrites the very variables `R` reads.
//! Afterwards the snapshots are renamed back, so the final condition
//! speaks about the state at the start of the path.

use std::collections::BTreeMap;

use tracing::debug;

use super::vc::{PathContext, PathEnd};
use crate::error::{Result, VerifyError};
use crate::expr::{Expr, Variable};

/// `R'[0] < R[0] || (R'[0] == R[0] && R'[1] < R[1]) || ...`
pub fn lexicographic_decrease(exit: &[Expr], entry: &[Expr]) -> Expr {
    Expr::disjunction((0..entry.len()).map(|i| {
        let mut parts = vec![Expr::lt(exit[i].clone(), entry[i].clone())];
        parts.extend((0..i).map(|j| Expr::equals(exit[j].clone(), entry[j].clone())));
        Expr::conjunction(parts)
    }))
}

fn non_negative(ranks: &[Expr]) -> Expr {
    Expr::conjunction(ranks.iter().map(|r| Expr::ge(r.clone(), Expr::int(0))))
}

/// One condition per non-empty exit ranking tuple of `end`.
///
/// Empty when the path start carries no ranking functions.
pub fn termination_conditions(
    ctx: &mut PathContext<'_>,
    pre: &Expr,
    end: &PathEnd,
) -> Result<Vec<Expr>> {
    let entry = ctx.entry_ranking_functions()?;
    if entry.is_empty() {
        return Ok(Vec::new());
    }

    let mut conditions = Vec::new();
    for exit in end.exit_rankings.iter().filter(|r| !r.is_empty()) {
        if exit.len() != entry.len() {
            return Err(VerifyError::structural(
                &ctx.function().name,
                format!(
                    "path {} compares {} ranking functions against {}",
                    ctx.path(),
                    exit.len(),
                    entry.len()
                ),
            ));
        }

        let mut snapshot: BTreeMap<Variable, Variable> = BTreeMap::new();
        for var in entry.iter().flat_map(Expr::free_variables) {
            if !snapshot.contains_key(&var) {
                let frozen = ctx.fresh(&var);
                snapshot.insert(var, frozen);
            }
        }
        let frozen: Vec<Expr> = entry.iter().map(|r| r.rename(&snapshot)).collect();

        let rank_condition = Expr::and(lexicographic_decrease(exit, &frozen), non_negative(exit));
        debug!(
            function = %ctx.function().name,
            path = %ctx.path(),
            %rank_condition,
            "termination"
        );

        let wp = ctx.weakest_precondition(rank_condition)?;
        let thawed: BTreeMap<Variable, Variable> =
            snapshot.into_iter().map(|(var, frozen)| (frozen, var)).collect();
        let strong_pre = Expr::and(pre.clone(), non_negative(entry));
        conditions.push(Expr::implies(strong_pre, wp.rename(&thawed)));
    }
    Ok(conditions)
}
