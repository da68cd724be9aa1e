use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::errors::{RecordKey, ServiceError};
use crate::models::{Conversion, Unit};
use crate::repositories::{SaveMode, UomRepository};

#[derive(Debug, Default)]
struct State {
    units: BTreeMap<String, Unit>,
    conversions: BTreeMap<(String, String), Conversion>,
}

impl State {
    fn insert_unit(&mut self, unit: &Unit) -> Result<Unit, ServiceError> {
        if self.units.contains_key(&unit.code) {
            return Err(ServiceError::DuplicateCode {
                code: unit.code.clone(),
            });
        }
        let stored = Unit {
            version: 1,
            ..unit.clone()
        };
        self.units.insert(stored.code.clone(), stored.clone());
        Ok(stored)
    }

    /// Both endpoints must exist and share a category. `pending` is a unit
    /// being inserted alongside the edge.
    fn check_edge_units(&self, edge: &Conversion, pending: Option<&Unit>) -> Result<(), ServiceError> {
        let resolve = |code: &String| {
            pending
                .filter(|unit| unit.code == *code)
                .or_else(|| self.units.get(code))
                .ok_or_else(|| ServiceError::UnknownUnit { code: code.clone() })
        };
        let from = resolve(&edge.from_uom)?;
        let to = resolve(&edge.to_uom)?;
        from.ensure_same_category(to)
    }

    /// Every unit sharing an edge with `unit` must still match its category.
    fn check_neighbours(&self, unit: &Unit) -> Result<(), ServiceError> {
        for (from_uom, to_uom) in self.conversions.keys() {
            let other = if *from_uom == unit.code {
                to_uom
            } else if *to_uom == unit.code {
                from_uom
            } else {
                continue;
            };
            if let Some(other) = self.units.get(other) {
                unit.ensure_same_category(other)?;
            }
        }
        Ok(())
    }
}

/// Process-local repository. Same contract as the SQL store, including
/// version checks.
#[derive(Debug, Default)]
pub struct InMemoryUomRepository {
    state: RwLock<State>,
}

impl InMemoryUomRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UomRepository for InMemoryUomRepository {
    async fn load_unit(&self, code: &str) -> Result<Option<Unit>, ServiceError> {
        Ok(self.state.read().await.units.get(code).cloned())
    }

    async fn load_conversion(
        &self,
        from_uom: &str,
        to_uom: &str,
    ) -> Result<Option<Conversion>, ServiceError> {
        let key = (from_uom.to_string(), to_uom.to_string());
        Ok(self.state.read().await.conversions.get(&key).cloned())
    }

    async fn save_unit(&self, unit: &Unit, mode: SaveMode) -> Result<Unit, ServiceError> {
        let mut state = self.state.write().await;
        match mode {
            SaveMode::Insert => state.insert_unit(unit),
            SaveMode::Update { expected_version } => {
                let stored = state
                    .units
                    .get(&unit.code)
                    .ok_or_else(|| ServiceError::not_found_unit(&unit.code))?;
                if stored.version != expected_version {
                    return Err(ServiceError::ConcurrentModification(RecordKey::unit(
                        &unit.code,
                    )));
                }
                if stored.category != unit.category {
                    state.check_neighbours(unit)?;
                }
                let stored = state
                    .units
                    .get_mut(&unit.code)
                    .ok_or_else(|| ServiceError::not_found_unit(&unit.code))?;
                *stored = Unit {
                    version: expected_version + 1,
                    ..unit.clone()
                };
                Ok(stored.clone())
            }
        }
    }

    async fn save_conversion(
        &self,
        edge: &Conversion,
        mode: SaveMode,
    ) -> Result<Conversion, ServiceError> {
        let mut state = self.state.write().await;
        let key = (edge.from_uom.clone(), edge.to_uom.clone());
        state.check_edge_units(edge, None)?;
        match mode {
            SaveMode::Insert => {
                if state.conversions.contains_key(&key) {
                    return Err(ServiceError::ConcurrentModification(RecordKey::conversion(
                        &edge.from_uom,
                        &edge.to_uom,
                    )));
                }
                let stored = Conversion {
                    version: 1,
                    ..edge.clone()
                };
                state.conversions.insert(key, stored.clone());
                Ok(stored)
            }
            SaveMode::Update { expected_version } => {
                let stored = state.conversions.get_mut(&key).ok_or_else(|| {
                    ServiceError::not_found_conversion(&edge.from_uom, &edge.to_uom)
                })?;
                if stored.version != expected_version {
                    return Err(ServiceError::ConcurrentModification(RecordKey::conversion(
                        &edge.from_uom,
                        &edge.to_uom,
                    )));
                }
                stored.factor = edge.factor;
                stored.version = expected_version + 1;
                Ok(stored.clone())
            }
        }
    }

    async fn list_units(&self) -> Result<Vec<Unit>, ServiceError> {
        Ok(self.state.read().await.units.values().cloned().collect())
    }

    async fn list_conversions(&self) -> Result<Vec<Conversion>, ServiceError> {
        Ok(self.state.read().await.conversions.values().cloned().collect())
    }

    async fn insert_unit_with_conversions(
        &self,
        unit: &Unit,
        edges: &[Conversion],
    ) -> Result<(Unit, Vec<Conversion>), ServiceError> {
        let mut state = self.state.write().await;

        // Validate everything before touching the maps so a failure leaves no trace.
        if state.units.contains_key(&unit.code) {
            return Err(ServiceError::DuplicateCode {
                code: unit.code.clone(),
            });
        }
        for edge in edges {
            let key = (edge.from_uom.clone(), edge.to_uom.clone());
            state.check_edge_units(edge, Some(unit))?;
            if state.conversions.contains_key(&key)
                || edges
                    .iter()
                    .filter(|e| e.from_uom == edge.from_uom && e.to_uom == edge.to_uom)
                    .count()
                    > 1
            {
                return Err(ServiceError::ConcurrentModification(RecordKey::conversion(
                    &edge.from_uom,
                    &edge.to_uom,
                )));
            }
        }

        let saved_unit = state.insert_unit(unit)?;
        let saved_edges = edges
            .iter()
            .map(|edge| {
                let stored = Conversion {
                    version: 1,
                    ..edge.clone()
                };
                state.conversions.insert(
                    (stored.from_uom.clone(), stored.to_uom.clone()),
                    stored.clone(),
                );
                stored
            })
            .collect();
        Ok((saved_unit, saved_edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UomCategory, UomSystem};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn unit(code: &str) -> Unit {
        Unit::new(code, code, UomSystem::Si, UomCategory::Mass, false)
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let repo = InMemoryUomRepository::new();
        let stored = repo.save_unit(&unit("kg"), SaveMode::Insert).await.unwrap();
        assert_eq!(stored.version, 1);

        let renamed = Unit {
            name: "Kilo".into(),
            ..stored.clone()
        };
        let v2 = repo
            .save_unit(&renamed, SaveMode::Update { expected_version: 1 })
            .await
            .unwrap();
        assert_eq!(v2.version, 2);

        assert_matches!(
            repo.save_unit(&renamed, SaveMode::Update { expected_version: 1 })
                .await,
            Err(ServiceError::ConcurrentModification(_))
        );
    }

    #[tokio::test]
    async fn failed_atomic_insert_leaves_nothing() {
        let repo = InMemoryUomRepository::new();
        repo.save_unit(&unit("kg"), SaveMode::Insert).await.unwrap();

        let edges = vec![
            Conversion::new("g", "kg", dec!(0.001)),
            Conversion::new("g", "missing", dec!(1)),
        ];
        assert_matches!(
            repo.insert_unit_with_conversions(&unit("g"), &edges).await,
            Err(ServiceError::UnknownUnit { code }) if code == "missing"
        );
        assert!(repo.load_unit("g").await.unwrap().is_none());
        assert!(repo.list_conversions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edges_never_join_categories() {
        let repo = InMemoryUomRepository::new();
        let kg = repo.save_unit(&unit("kg"), SaveMode::Insert).await.unwrap();
        repo.save_unit(&unit("g"), SaveMode::Insert).await.unwrap();
        let litre = Unit {
            category: UomCategory::Volume,
            ..unit("L")
        };
        repo.save_unit(&litre, SaveMode::Insert).await.unwrap();

        assert_matches!(
            repo.save_conversion(&Conversion::new("kg", "L", dec!(1)), SaveMode::Insert)
                .await,
            Err(ServiceError::CategoryMismatch { .. })
        );

        repo.save_conversion(&Conversion::new("g", "kg", dec!(0.001)), SaveMode::Insert)
            .await
            .unwrap();
        let moved = Unit {
            category: UomCategory::Volume,
            ..kg.clone()
        };
        assert_matches!(
            repo.save_unit(&moved, SaveMode::Update { expected_version: kg.version })
                .await,
            Err(ServiceError::CategoryMismatch { .. })
        );
        assert_eq!(
            repo.load_unit("kg").await.unwrap().unwrap().category,
            UomCategory::Mass
        );
    }
}
