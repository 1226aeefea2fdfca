//! Incremental construction of a function's CFG

use crate::error::{Result, VerifyError};
use crate::expr::{Expr, Variable};

use super::{Edge, Function, Location, LocationId, LocationKind, Statement};

/// Builds a [`Function`] location by location.
///
/// ```
/// use hoare::expr::{Expr, Variable};
/// use hoare::ir::{FunctionBuilder, Statement};
///
/// let x = Variable::int("x");
/// let mut b = FunctionBuilder::new("inc");
/// let entry = b.entry(vec![Expr::ge(Expr::var(x.clone()), Expr::int(0))], vec![]);
/// let exit = b.exit(vec![Expr::gt(Expr::var(x.clone()), Expr::int(0))]);
/// b.edge(entry, exit, Statement::assign(x.clone(), Expr::add(Expr::var(x.clone()), Expr::int(1))));
/// let func = b.parameter(x).build().unwrap();
/// assert_eq!(func.locations.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    name: String,
    parameters: Vec<Variable>,
    rvs: Vec<Variable>,
    entry: Option<LocationId>,
    exit: Option<LocationId>,
    locations: Vec<Location>,
    /// First edge added from a location that does not exist
    dangling: Option<(LocationId, LocationId)>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            rvs: Vec::new(),
            entry: None,
            exit: None,
            locations: Vec::new(),
            dangling: None,
        }
    }

    fn push(&mut self, kind: LocationKind) -> LocationId {
        let id = LocationId(self.locations.len());
        self.locations.push(Location::new(kind));
        id
    }

    pub fn entry(&mut self, conditions: Vec<Expr>, ranking_functions: Vec<Expr>) -> LocationId {
        let id = self.push(LocationKind::Entry {
            conditions,
            ranking_functions,
        });
        self.entry = Some(id);
        id
    }

    pub fn exit(&mut self, conditions: Vec<Expr>) -> LocationId {
        let id = self.push(LocationKind::Exit { conditions });
        self.exit = Some(id);
        id
    }

    pub fn loop_head(&mut self, invariants: Vec<Expr>, ranking_functions: Vec<Expr>) -> LocationId {
        self.push(LocationKind::LoopHead {
            invariants,
            ranking_functions,
        })
    }

    pub fn plain(&mut self) -> LocationId {
        self.push(LocationKind::Plain)
    }

    /// Add an edge `from -> to` labelled with `statement`.
    ///
    /// [`build`](Self::build) fails if either end is never created.
    pub fn edge(&mut self, from: LocationId, to: LocationId, statement: Statement) -> &mut Self {
        match self.locations.get_mut(from.0) {
            Some(location) => location.edges.push(Edge::new(to, statement)),
            None => {
                self.dangling.get_or_insert((from, to));
            }
        }
        self
    }

    pub fn parameter(&mut self, variable: Variable) -> &mut Self {
        self.parameters.push(variable);
        self
    }

    pub fn returns(&mut self, variable: Variable) -> &mut Self {
        self.rvs.push(variable);
        self
    }

    pub fn build(&self) -> Result<Function> {
        let dangling = self.dangling.or_else(|| {
            self.locations.iter().enumerate().find_map(|(i, location)| {
                location
                    .edges
                    .iter()
                    .find(|e| e.target.0 >= self.locations.len())
                    .map(|e| (LocationId(i), e.target))
            })
        });
        if let Some((from, to)) = dangling {
            return Err(VerifyError::malformed_cfg(
                &self.name,
                format!("edge {from} -> {to} names a location that does not exist"),
            ));
        }
        let entry = self
            .entry
            .ok_or_else(|| VerifyError::malformed_cfg(&self.name, "no entry location"))?;
        let exit = self
            .exit
            .ok_or_else(|| VerifyError::malformed_cfg(&self.name, "no exit location"))?;
        Ok(Function {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            rvs: self.rvs.clone(),
            entry,
            exit,
            locations: self.locations.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_entry_and_exit() {
        let mut b = FunctionBuilder::new("f");
        assert!(b.build().is_err());
        b.entry(vec![], vec![]);
        assert!(b.build().is_err());
        b.exit(vec![]);
        assert!(b.build().is_ok());
    }

    #[test]
    fn test_edge_to_missing_location_fails_build() {
        let mut b = FunctionBuilder::new("f");
        b.entry(vec![], vec![]);
        let exit = b.exit(vec![]);
        b.edge(LocationId(7), exit, Statement::assume(Expr::tt()));
        match b.build() {
            Err(VerifyError::MalformedCfg { function, message }) => {
                assert_eq!(function, "f");
                assert_eq!(message, "edge L7 -> L1 names a location that does not exist");
            }
            other => panic!("expected malformed CFG, got {other:?}"),
        }

        let mut b = FunctionBuilder::new("g");
        let entry_g = b.entry(vec![], vec![]);
        b.exit(vec![]);
        b.edge(entry_g, LocationId(9), Statement::assume(Expr::tt()));
        assert!(matches!(b.build(), Err(VerifyError::MalformedCfg { .. })));
    }

    #[test]
    fn test_ids_follow_insertion_order() {
        let mut b = FunctionBuilder::new("f");
        let entry = b.entry(vec![], vec![]);
        let head = b.loop_head(vec![], vec![]);
        let exit = b.exit(vec![]);
        assert_eq!((entry, head, exit), (LocationId(0), LocationId(1), LocationId(2)));
        let f = b.build().unwrap();
        assert_eq!(f.body_locations().collect::<Vec<_>>(), vec![head]);
    }
}
