//! Unit-of-measure registry and conversion service.
//!
//! Writes go straight to the repository as per-record optimistic updates and
//! then drop the cached graph. Reads (`convert`, listings) run against an
//! immutable [`GraphSnapshot`] that is rebuilt lazily, either after a local
//! write or once it is older than the configured TTL.

use rust_decimal::Decimal;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::dto::uom::{CreateUnitRequest, NewUnit, UpdateUnitRequest};
use crate::errors::ServiceError;
use crate::models::{
    validate_factor, Conversion, ConversionResult, ConversionView, Unit, UnitOption, UomCategory,
};
use crate::repositories::{SaveMode, UomRepository};
use crate::services::conversion_graph::{GraphSnapshot, UnitList};

#[derive(Default)]
struct SnapshotCache {
    current: RwLock<Option<Arc<GraphSnapshot>>>,
    generation: AtomicU64,
}

/// Service for managing units of measure and converting between them.
#[derive(Clone)]
pub struct UomService {
    repo: Arc<dyn UomRepository>,
    storage_timeout: Duration,
    snapshot_ttl: Duration,
    cache: Arc<SnapshotCache>,
}

impl UomService {
    pub fn new(repo: Arc<dyn UomRepository>, storage_timeout: Duration, snapshot_ttl: Duration) -> Self {
        Self {
            repo,
            storage_timeout,
            snapshot_ttl,
            cache: Arc::new(SnapshotCache::default()),
        }
    }

    pub fn from_config(repo: Arc<dyn UomRepository>, config: &AppConfig) -> Self {
        Self::new(repo, config.storage_timeout(), config.graph_snapshot_ttl())
    }

    // ===== Unit registry =====

    /// Registers a unit, optionally with edges from it to existing units.
    /// Either the unit and every edge are stored, or nothing is.
    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_unit(&self, request: &CreateUnitRequest) -> Result<Unit, ServiceError> {
        let NewUnit { unit, conversions } = request.parse()?;

        if self.load_unit(&unit.code).await?.is_some() {
            warn!("Rejected duplicate unit code");
            return Err(ServiceError::DuplicateCode { code: unit.code });
        }

        let mut seen = HashSet::new();
        let mut edges = Vec::with_capacity(conversions.len());
        for (to_uom, factor) in conversions {
            if to_uom == unit.code {
                return Err(ServiceError::SelfConversion { code: to_uom });
            }
            if !seen.insert(to_uom.clone()) {
                return Err(ServiceError::ValidationError(format!(
                    "conversions: '{}' is listed more than once",
                    to_uom
                )));
            }
            let target = self.require_unit(&to_uom).await?;
            unit.ensure_same_category(&target)?;
            validate_factor(factor)?;
            edges.push(Conversion::new(unit.code.clone(), to_uom, factor.normalize()));
        }

        let saved = if edges.is_empty() {
            self.storage("save_unit", self.repo.save_unit(&unit, SaveMode::Insert))
                .await?
        } else {
            let (saved, _) = self
                .storage(
                    "insert_unit_with_conversions",
                    self.repo.insert_unit_with_conversions(&unit, &edges),
                )
                .await?;
            saved
        };

        self.invalidate().await;
        info!(
            category = %saved.category,
            conversions = edges.len(),
            "Unit created"
        );
        Ok(saved)
    }

    /// Applies a partial update. The code is identity and never changes.
    #[instrument(skip(self, request))]
    pub async fn update_unit(
        &self,
        code: &str,
        request: &UpdateUnitRequest,
    ) -> Result<Unit, ServiceError> {
        let changes = request.parse()?;
        let current = self
            .load_unit(code)
            .await?
            .ok_or_else(|| ServiceError::not_found_unit(code))?;
        if changes.is_empty() {
            debug!("Update carries no fields");
            return Ok(current);
        }

        if let Some(category) = changes.category.filter(|c| *c != current.category) {
            let conversions = self
                .storage("list_conversions", self.repo.list_conversions())
                .await?;
            if let Some(edge) = conversions
                .iter()
                .find(|e| e.from_uom == code || e.to_uom == code)
            {
                let other = if edge.from_uom == code {
                    &edge.to_uom
                } else {
                    &edge.from_uom
                };
                warn!(%other, "Rejected category change for a unit with conversions");
                return Err(ServiceError::CategoryMismatch {
                    from_uom: code.to_string(),
                    from_category: category.to_string(),
                    to_uom: other.clone(),
                    to_category: current.category.to_string(),
                });
            }
        }

        let mut updated = current.clone();
        if !changes.apply(&mut updated) {
            debug!("Update carries no changes");
            return Ok(current);
        }

        let saved = self
            .storage(
                "save_unit",
                self.repo.save_unit(
                    &updated,
                    SaveMode::Update {
                        expected_version: current.version,
                    },
                ),
            )
            .await?;

        self.invalidate().await;
        info!(version = saved.version, "Unit updated");
        Ok(saved)
    }

    /// Soft-deletes a unit. Deactivating an inactive unit is a no-op.
    #[instrument(skip(self))]
    pub async fn deactivate_unit(&self, code: &str) -> Result<Unit, ServiceError> {
        let current = self
            .load_unit(code)
            .await?
            .ok_or_else(|| ServiceError::not_found_unit(code))?;
        if !current.is_active {
            debug!("Unit already inactive");
            return Ok(current);
        }

        let updated = Unit {
            is_active: false,
            ..current.clone()
        };
        let result = self
            .storage(
                "save_unit",
                self.repo.save_unit(
                    &updated,
                    SaveMode::Update {
                        expected_version: current.version,
                    },
                ),
            )
            .await;

        let saved = match result {
            Ok(saved) => saved,
            Err(ServiceError::ConcurrentModification(key)) => {
                // Someone else won the race; fine if they also deactivated it.
                match self.load_unit(code).await? {
                    Some(latest) if !latest.is_active => latest,
                    _ => return Err(ServiceError::ConcurrentModification(key)),
                }
            }
            Err(e) => return Err(e),
        };

        self.invalidate().await;
        info!("Unit deactivated");
        Ok(saved)
    }

    /// Units ordered by code. Inactive units only when asked for.
    pub async fn list_units(&self, include_inactive: bool) -> Result<UnitList, ServiceError> {
        let snapshot = self.snapshot().await?;
        Ok(UnitList::new(snapshot.units(), include_inactive))
    }

    pub async fn list_units_by_category(
        &self,
        category: UomCategory,
        include_inactive: bool,
    ) -> Result<UnitList, ServiceError> {
        Ok(self
            .list_units(include_inactive)
            .await?
            .in_category(category))
    }

    /// Active units as `{code, name}` pairs for pickers.
    pub async fn list_unit_options(
        &self,
        category: Option<UomCategory>,
    ) -> Result<Vec<UnitOption>, ServiceError> {
        let mut units = self.list_units(false).await?;
        if let Some(category) = category {
            units = units.in_category(category);
        }
        Ok(units.iter().map(UnitOption::from).collect())
    }

    pub async fn get_unit(&self, code: &str) -> Result<Unit, ServiceError> {
        self.load_unit(code)
            .await?
            .ok_or_else(|| ServiceError::not_found_unit(code))
    }

    // ===== Conversion graph =====

    /// Stores `1 from_uom = factor to_uom`, replacing any existing factor.
    #[instrument(skip(self), fields(factor = %factor))]
    pub async fn add_conversion(
        &self,
        from_uom: &str,
        to_uom: &str,
        factor: Decimal,
    ) -> Result<Conversion, ServiceError> {
        self.check_edge(from_uom, to_uom, factor).await?;

        let existing = self
            .storage("load_conversion", self.repo.load_conversion(from_uom, to_uom))
            .await?;
        let edge = Conversion::new(from_uom, to_uom, factor.normalize());
        let mode = match &existing {
            Some(stored) => SaveMode::Update {
                expected_version: stored.version,
            },
            None => SaveMode::Insert,
        };

        let saved = self
            .storage("save_conversion", self.repo.save_conversion(&edge, mode))
            .await?;

        self.invalidate().await;
        info!(replaced = existing.is_some(), "Conversion stored");
        Ok(saved)
    }

    /// Changes the factor of an existing stored edge. A pair that was never
    /// stored is `NotFound` before any other validation runs.
    #[instrument(skip(self), fields(factor = %factor))]
    pub async fn update_conversion(
        &self,
        from_uom: &str,
        to_uom: &str,
        factor: Decimal,
    ) -> Result<Conversion, ServiceError> {
        let existing = self
            .storage("load_conversion", self.repo.load_conversion(from_uom, to_uom))
            .await?
            .ok_or_else(|| ServiceError::not_found_conversion(from_uom, to_uom))?;
        self.check_edge(from_uom, to_uom, factor).await?;

        let edge = Conversion {
            factor: factor.normalize(),
            ..existing.clone()
        };
        let saved = self
            .storage(
                "save_conversion",
                self.repo.save_conversion(
                    &edge,
                    SaveMode::Update {
                        expected_version: existing.version,
                    },
                ),
            )
            .await?;

        self.invalidate().await;
        info!(version = saved.version, "Conversion updated");
        Ok(saved)
    }

    /// Converts `amount` from one unit into another along the chosen path.
    pub async fn convert(
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

        let snapshot = self.snapshot().await?;
        let result = snapshot.convert(amount, from_uom, to_uom)?;
        debug!(
            from_uom,
            to_uom,
            hops = result.path.len() - 1,
            factor = %result.factor,
            "Converted amount"
        );
        Ok(result)
    }

    /// Stored edges touching `code`, incoming ones as derived reciprocals.
    pub async fn list_conversions_for_unit(
        &self,
        code: &str,
    ) -> Result<Vec<ConversionView>, ServiceError> {
        self.snapshot().await?.conversions_for_unit(code)
    }

    /// Drops the cached graph so the next read sees storage as it is now.
    pub async fn refresh(&self) {
        self.invalidate().await;
    }

    // ===== internals =====

    async fn check_edge(
        &self,
        from_uom: &str,
        to_uom: &str,
        factor: Decimal,
    ) -> Result<(), ServiceError> {
        if from_uom == to_uom {
            return Err(ServiceError::SelfConversion {
                code: from_uom.to_string(),
            });
        }
        validate_factor(factor)?;
        let from = self.require_unit(from_uom).await?;
        let to = self.require_unit(to_uom).await?;
        from.ensure_same_category(&to)
    }

    async fn load_unit(&self, code: &str) -> Result<Option<Unit>, ServiceError> {
        self.storage("load_unit", self.repo.load_unit(code)).await
    }

    async fn require_unit(&self, code: &str) -> Result<Unit, ServiceError> {
        self.load_unit(code)
            .await?
            .ok_or_else(|| ServiceError::UnknownUnit {
                code: code.to_string(),
            })
    }

    async fn storage<T, F>(&self, operation: &'static str, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match tokio::time::timeout(self.storage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.storage_timeout.as_millis() as u64,
                    "Storage call timed out"
                );
                Err(ServiceError::StorageUnavailable(format!(
                    "{} timed out after {:?}",
                    operation, self.storage_timeout
                )))
            }
        }
    }

    async fn snapshot(&self) -> Result<Arc<GraphSnapshot>, ServiceError> {
        if let Some(snapshot) = self.cache.current.read().await.as_ref() {
            if snapshot.built_at().elapsed() < self.snapshot_ttl {
                return Ok(Arc::clone(snapshot));
            }
        }

        let generation = self.cache.generation.load(Ordering::Acquire);
        let units = self.storage("list_units", self.repo.list_units()).await?;
        let conversions = self
            .storage("list_conversions", self.repo.list_conversions())
            .await?;
        let snapshot = Arc::new(GraphSnapshot::build(units, conversions));
        debug!(
            units = snapshot.units().len(),
            conversions = snapshot.conversions().len(),
            "Rebuilt conversion graph"
        );

        // A write landed while we were loading; serve this one but don't cache it.
        let mut current = self.cache.current.write().await;
        if self.cache.generation.load(Ordering::Acquire) == generation {
            *current = Some(Arc::clone(&snapshot));
        }
        Ok(snapshot)
    }

    async fn invalidate(&self) {
        let mut current = self.cache.current.write().await;
        self.cache.generation.fetch_add(1, Ordering::AcqRel);
        *current = None;
    }
}
