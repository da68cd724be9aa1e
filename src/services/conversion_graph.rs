//! Immutable, in-memory view of the unit registry used for every read path.
//!
//! A snapshot is built from the full set of stored units and edges. Each
//! stored edge `A -> B` (factor `f`) contributes the hop `A -> B` as stored
//! and, unless `B -> A` is stored too, the derived hop `B -> A` with factor
//! `1/f`. Hops carry a numerator and a denominator so that a multi-hop
//! conversion divides exactly once.
//!
//! Path choice: breadth-first search over the active units of the shared
//! category, visiting neighbours in ascending code order. The first path
//! found has the fewest edges, and among those the lexicographically
//! smallest sequence of intermediate codes.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::errors::ServiceError;
use crate::models::{Conversion, ConversionResult, ConversionView, Unit, UomCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hop {
    numerator: Decimal,
    denominator: Decimal,
    derived: bool,
}

#[derive(Debug)]
pub struct GraphSnapshot {
    units: Arc<[Unit]>,
    index: HashMap<String, usize>,
    adjacency: HashMap<String, BTreeMap<String, Hop>>,
    conversions: Vec<Conversion>,
    built_at: Instant,
}

impl GraphSnapshot {
    /// Builds a snapshot. Edges referencing unknown units or crossing
    /// categories are skipped and logged; storage never holds them when
    /// written through the service.
    pub fn build(mut units: Vec<Unit>, conversions: Vec<Conversion>) -> Self {
        units.sort_by(|a, b| a.code.cmp(&b.code));
        let index: HashMap<String, usize> = units
            .iter()
            .enumerate()
            .map(|(i, unit)| (unit.code.clone(), i))
            .collect();

        let mut adjacency: HashMap<String, BTreeMap<String, Hop>> = HashMap::new();
        let mut kept = Vec::with_capacity(conversions.len());

        for edge in conversions {
            let (Some(&from), Some(&to)) = (index.get(&edge.from_uom), index.get(&edge.to_uom))
            else {
                warn!(
                    from_uom = %edge.from_uom,
                    to_uom = %edge.to_uom,
                    "Skipping conversion referencing an unknown unit"
                );
                continue;
            };
            if units[from].category != units[to].category
                || edge.from_uom == edge.to_uom
                || edge.factor <= Decimal::ZERO
            {
                warn!(
                    from_uom = %edge.from_uom,
                    to_uom = %edge.to_uom,
                    factor = %edge.factor,
                    "Skipping conversion violating graph invariants"
                );
                continue;
            }

            adjacency.entry(edge.from_uom.clone()).or_default().insert(
                edge.to_uom.clone(),
                Hop {
                    numerator: edge.factor,
                    denominator: Decimal::ONE,
                    derived: false,
                },
            );
            let reverse = adjacency.entry(edge.to_uom.clone()).or_default();
            let stored_reverse = reverse.get(&edge.from_uom).is_some_and(|hop| !hop.derived);
            if !stored_reverse {
                reverse.insert(
                    edge.from_uom.clone(),
                    Hop {
                        numerator: Decimal::ONE,
                        denominator: edge.factor,
                        derived: true,
                    },
                );
            }
            kept.push(edge);
        }

        kept.sort_by(|a, b| (&a.from_uom, &a.to_uom).cmp(&(&b.from_uom, &b.to_uom)));

        Self {
            units: units.into(),
            index,
            adjacency,
            conversions: kept,
            built_at: Instant::now(),
        }
    }

    pub fn built_at(&self) -> Instant {
        self.built_at
    }

    pub fn unit(&self, code: &str) -> Option<&Unit> {
        self.index.get(code).map(|&i| &self.units[i])
    }

    /// All units ordered by code, shared with any `UnitList` handed out.
    pub fn units(&self) -> Arc<[Unit]> {
        Arc::clone(&self.units)
    }

    pub fn conversions(&self) -> &[Conversion] {
        &self.conversions
    }

    /// True when any stored edge touches `code`.
    pub fn has_conversions(&self, code: &str) -> bool {
        self.adjacency.get(code).is_some_and(|hops| !hops.is_empty())
    }

    /// Stored edges touching `code`, oriented away from it. Incoming edges
    /// appear as their derived reciprocal.
    pub fn conversions_for_unit(&self, code: &str) -> Result<Vec<ConversionView>, ServiceError> {
        if self.unit(code).is_none() {
            return Err(ServiceError::not_found_unit(code));
        }

        let mut views = Vec::new();
        for edge in &self.conversions {
            if edge.from_uom == code {
                views.push(ConversionView {
                    from_uom: edge.from_uom.clone(),
                    to_uom: edge.to_uom.clone(),
                    factor: edge.factor,
                    derived: false,
                });
            } else if edge.to_uom == code {
                let factor = Decimal::ONE.checked_div(edge.factor).ok_or_else(|| {
                    ServiceError::ConversionOverflow {
                        from_uom: edge.to_uom.clone(),
                        to_uom: edge.from_uom.clone(),
                    }
                })?;
                views.push(ConversionView {
                    from_uom: edge.to_uom.clone(),
                    to_uom: edge.from_uom.clone(),
                    factor: factor.normalize(),
                    derived: true,
                });
            }
        }
        views.sort_by(|a, b| (&a.to_uom, a.derived).cmp(&(&b.to_uom, b.derived)));
        Ok(views)
    }

    /// Converts `amount` of `from_uom` into `to_uom`.
    pub fn convert(
        &self,
        amount: Decimal,
        from_uom: &str,
        to_uom: &str,
    ) -> Result<ConversionResult, ServiceError> {
        if from_uom == to_uom {
            return Ok(ConversionResult {
                amount,
                from_uom: from_uom.to_string(),
                to_uom: to_uom.to_string(),
                path: vec![from_uom.to_string()],
                factor: Decimal::ONE,
            });
        }

        let from = self.known_unit(from_uom)?;
        let to = self.known_unit(to_uom)?;
        from.ensure_same_category(to)?;
        for unit in [from, to] {
            if !unit.is_active {
                return Err(ServiceError::InactiveUnit {
                    code: unit.code.clone(),
                });
            }
        }

        let path = self
            .shortest_path(from_uom, to_uom, from.category)
            .ok_or_else(|| ServiceError::NoConversionPath {
                from_uom: from_uom.to_string(),
                to_uom: to_uom.to_string(),
                category: from.category.to_string(),
            })?;

        let overflow = || ServiceError::ConversionOverflow {
            from_uom: from_uom.to_string(),
            to_uom: to_uom.to_string(),
        };

        let mut numerator = Decimal::ONE;
        let mut denominator = Decimal::ONE;
        for pair in path.windows(2) {
            let hop = self.adjacency[&pair[0]][&pair[1]];
            numerator = numerator.checked_mul(hop.numerator).ok_or_else(overflow)?;
            denominator = denominator.checked_mul(hop.denominator).ok_or_else(overflow)?;
        }

        let factor = numerator.checked_div(denominator).ok_or_else(overflow)?;
        // Scaling first keeps one division; when that intermediate overflows,
        // the result may still fit through the reduced factor.
        let converted = amount
            .checked_mul(numerator)
            .and_then(|scaled| scaled.checked_div(denominator))
            .or_else(|| amount.checked_mul(factor))
            .ok_or_else(overflow)?;

        Ok(ConversionResult {
            amount: converted.normalize(),
            from_uom: from_uom.to_string(),
            to_uom: to_uom.to_string(),
            path,
            factor: factor.normalize(),
        })
    }

    fn known_unit(&self, code: &str) -> Result<&Unit, ServiceError> {
        self.unit(code).ok_or_else(|| ServiceError::UnknownUnit {
            code: code.to_string(),
        })
    }

    fn shortest_path(&self, from: &str, to: &str, category: UomCategory) -> Option<Vec<String>> {
        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        parents.insert(from, from);
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            let Some(hops) = self.adjacency.get(current) else {
                continue;
            };
            for next in hops.keys() {
                let next = next.as_str();
                if parents.contains_key(next) {
                    continue;
                }
                let traversable = self
                    .unit(next)
                    .is_some_and(|unit| unit.is_active && unit.category == category);
                if !traversable {
                    continue;
                }
                parents.insert(next, current);
                if next == to {
                    return Some(Self::unwind(&parents, from, to));
                }
                queue.push_back(next);
            }
        }
        None
    }

    fn unwind<'a>(parents: &HashMap<&'a str, &'a str>, from: &'a str, to: &'a str) -> Vec<String> {
        let mut path = vec![to.to_string()];
        let mut cursor = to;
        while cursor != from {
            cursor = parents[cursor];
            path.push(cursor.to_string());
        }
        path.reverse();
        path
    }
}

/// Finite, restartable listing of units over a snapshot. Every call to
/// `iter` walks the same units again, lazily applying the activity filter.
#[derive(Debug, Clone)]
pub struct UnitList {
    units: Arc<[Unit]>,
    include_inactive: bool,
    category: Option<UomCategory>,
}

impl UnitList {
    pub fn new(units: Arc<[Unit]>, include_inactive: bool) -> Self {
        Self {
            units,
            include_inactive,
            category: None,
        }
    }

    pub fn in_category(mut self, category: UomCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.units.iter().filter(move |unit| {
            (self.include_inactive || unit.is_active)
                && self.category.map_or(true, |c| unit.category == c)
        })
    }

    pub fn contains(&self, code: &str) -> bool {
        self.iter().any(|unit| unit.code == code)
    }

    pub fn to_vec(&self) -> Vec<Unit> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a UnitList {
    type Item = &'a Unit;
    type IntoIter = Box<dyn Iterator<Item = &'a Unit> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UomSystem;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn unit(code: &str, category: UomCategory) -> Unit {
        let mut unit = Unit::new(code, code, UomSystem::Custom, category, false);
        unit.version = 1;
        unit
    }

    fn mass_graph(edges: &[(&str, &str, Decimal)]) -> GraphSnapshot {
        let units = ["A", "B", "C", "D", "X", "Y"]
            .iter()
            .map(|code| unit(code, UomCategory::Mass))
            .chain(std::iter::once(unit("L", UomCategory::Volume)))
            .collect();
        let conversions = edges
            .iter()
            .map(|(from, to, f)| Conversion::new(*from, *to, *f))
            .collect();
        GraphSnapshot::build(units, conversions)
    }

    #[test]
    fn identity_skips_lookup() {
        let graph = mass_graph(&[]);
        let result = graph.convert(dec!(12.5), "nope", "nope").unwrap();
        assert_eq!(result.amount, dec!(12.5));
        assert_eq!(result.path, vec!["nope".to_string()]);
    }

    #[test]
    fn uses_direct_then_reciprocal_edge() {
        let graph = mass_graph(&[("A", "B", dec!(4))]);
        assert_eq!(graph.convert(dec!(1), "A", "B").unwrap().amount, dec!(4));
        assert_eq!(graph.convert(dec!(1), "B", "A").unwrap().amount, dec!(0.25));
    }

    #[test]
    fn stored_reverse_edge_wins_over_reciprocal() {
        let graph = mass_graph(&[("A", "B", dec!(3)), ("B", "A", dec!(0.3333))]);
        assert_eq!(graph.convert(dec!(1), "B", "A").unwrap().factor, dec!(0.3333));
    }

    #[test]
    fn multi_hop_multiplies_factors() {
        let graph = mass_graph(&[("A", "B", dec!(2)), ("B", "C", dec!(3))]);
        let result = graph.convert(dec!(1), "A", "C").unwrap();
        assert_eq!(result.amount, dec!(6));
        assert_eq!(result.path, vec!["A", "B", "C"]);
        assert_eq!(graph.convert(dec!(6), "C", "A").unwrap().amount, dec!(1));
    }

    #[test]
    fn single_division_keeps_thirds_exact() {
        let graph = mass_graph(&[("B", "A", dec!(3)), ("C", "A", dec!(3))]);
        // A -> B and A -> C are both 1/3; B -> C goes through A.
        assert_eq!(graph.convert(dec!(7), "B", "C").unwrap().amount, dec!(7));
    }

    #[test]
    fn equal_length_paths_break_ties_by_code() {
        // A -> X -> D and A -> B -> D both take two hops; B sorts first.
        let graph = mass_graph(&[
            ("A", "X", dec!(10)),
            ("X", "D", dec!(10)),
            ("A", "B", dec!(2)),
            ("B", "D", dec!(50)),
        ]);
        let result = graph.convert(dec!(1), "A", "D").unwrap();
        assert_eq!(result.path, vec!["A", "B", "D"]);
        assert_eq!(result.amount, dec!(100));
    }

    #[test]
    fn shorter_path_beats_lexicographic_order() {
        let graph = mass_graph(&[
            ("A", "B", dec!(1)),
            ("B", "C", dec!(1)),
            ("C", "Y", dec!(1)),
            ("A", "X", dec!(5)),
            ("X", "Y", dec!(5)),
        ]);
        assert_eq!(graph.convert(dec!(1), "A", "Y").unwrap().path, vec!["A", "X", "Y"]);
    }

    #[test]
    fn inactive_units_are_not_traversed() {
        let mut units: Vec<Unit> = ["A", "B", "C"]
            .iter()
            .map(|code| unit(code, UomCategory::Mass))
            .collect();
        units[1].is_active = false;
        let graph = GraphSnapshot::build(
            units,
            vec![
                Conversion::new("A", "B", dec!(2)),
                Conversion::new("B", "C", dec!(3)),
            ],
        );
        assert_matches!(
            graph.convert(dec!(1), "A", "C"),
            Err(ServiceError::NoConversionPath { .. })
        );
        assert_matches!(
            graph.convert(dec!(1), "A", "B"),
            Err(ServiceError::InactiveUnit { code }) if code == "B"
        );
    }

    #[test]
    fn lookup_failures() {
        let graph = mass_graph(&[("A", "B", dec!(2))]);
        assert_matches!(
            graph.convert(dec!(1), "A", "zz"),
            Err(ServiceError::UnknownUnit { code }) if code == "zz"
        );
        assert_matches!(
            graph.convert(dec!(1), "A", "L"),
            Err(ServiceError::CategoryMismatch { .. })
        );
        assert_matches!(
            graph.convert(dec!(1), "A", "D"),
            Err(ServiceError::NoConversionPath { .. })
        );
    }

    #[test]
    fn overflow_is_reported() {
        let graph = mass_graph(&[
            ("A", "B", dec!(10000000000000000)),
            ("B", "C", dec!(10000000000000000)),
        ]);
        assert_matches!(
            graph.convert(dec!(1), "A", "C"),
            Err(ServiceError::ConversionOverflow { .. })
        );
    }

    #[test]
    fn large_amounts_fit_through_reduced_factor() {
        // A and C are the same size; amount * numerator alone would not fit.
        let graph = mass_graph(&[
            ("A", "B", dec!(1000000000000000)),
            ("C", "B", dec!(1000000000000000)),
        ]);
        let result = graph.convert(dec!(100000000000000), "A", "C").unwrap();
        assert_eq!(result.amount, dec!(100000000000000));
        assert_eq!(result.factor, Decimal::ONE);
        assert_eq!(result.path, vec!["A", "B", "C"]);
    }

    #[test]
    fn category_mismatch_wins_over_inactive_endpoint() {
        let mut units = vec![unit("kg", UomCategory::Mass), unit("L", UomCategory::Volume)];
        units[0].is_active = false;
        let graph = GraphSnapshot::build(units, Vec::new());
        assert_matches!(
            graph.convert(dec!(1), "kg", "L"),
            Err(ServiceError::CategoryMismatch { from_uom, to_uom, .. })
                if from_uom == "kg" && to_uom == "L"
        );
        assert_matches!(
            graph.convert(dec!(1), "L", "kg"),
            Err(ServiceError::CategoryMismatch { .. })
        );
    }

    #[test]
    fn invalid_stored_edges_are_skipped() {
        let graph = mass_graph(&[("A", "L", dec!(1)), ("A", "ghost", dec!(1))]);
        assert!(graph.conversions().is_empty());
        assert!(!graph.has_conversions("A"));
    }

    #[test]
    fn conversions_for_unit_orients_away_from_unit() {
        let graph = mass_graph(&[("A", "B", dec!(4)), ("C", "A", dec!(8))]);
        let views = graph.conversions_for_unit("A").unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].to_uom, "B");
        assert!(!views[0].derived);
        assert_eq!(views[1].to_uom, "C");
        assert_eq!(views[1].factor, dec!(0.125));
        assert!(views[1].derived);
        assert_matches!(
            graph.conversions_for_unit("zz"),
            Err(ServiceError::NotFound(_))
        );
    }

    #[test]
    fn unit_list_is_restartable() {
        let mut units = vec![unit("b", UomCategory::Mass), unit("a", UomCategory::Count)];
        units[0].is_active = false;
        let graph = GraphSnapshot::build(units, Vec::new());

        let active = UnitList::new(graph.units(), false);
        assert_eq!(active.iter().count(), 1);
        assert_eq!(active.iter().count(), 1);
        assert!(!active.contains("b"));

        let all = UnitList::new(graph.units(), true);
        let codes: Vec<&str> = all.iter().map(|u| u.code.as_str()).collect();
        assert_eq!(codes, vec!["a", "b"]);
        assert_eq!(all.clone().in_category(UomCategory::Mass).to_vec().len(), 1);
    }
}
