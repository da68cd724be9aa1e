mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use rstest::rstest;
use rust_decimal_macros::dec;

use common::{unit_request, Backend};
use stateset_uom::{
    dto::uom::UpdateUnitRequest,
    repositories::{SaveMode, UomRepository},
    Conversion, ServiceError, Unit, UomCategory, UomService,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pause {
    LoadConversion,
    ListConversions,
}

/// Returns one kind of read late, so the caller acts on what it saw while
/// another writer runs in between.
struct PausingRepository {
    inner: Arc<dyn UomRepository>,
    pause: Pause,
    delay: Duration,
}

impl PausingRepository {
    async fn maybe_pause(&self, at: Pause) {
        if self.pause == at {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl UomRepository for PausingRepository {
    async fn load_unit(&self, code: &str) -> Result<Option<Unit>, ServiceError> {
        self.inner.load_unit(code).await
    }

    async fn load_conversion(
        &self,
        from_uom: &str,
        to_uom: &str,
    ) -> Result<Option<Conversion>, ServiceError> {
        let edge = self.inner.load_conversion(from_uom, to_uom).await;
        self.maybe_pause(Pause::LoadConversion).await;
        edge
    }

    async fn save_unit(&self, unit: &Unit, mode: SaveMode) -> Result<Unit, ServiceError> {
        self.inner.save_unit(unit, mode).await
    }

    async fn save_conversion(
        &self,
        edge: &Conversion,
        mode: SaveMode,
    ) -> Result<Conversion, ServiceError> {
        self.inner.save_conversion(edge, mode).await
    }

    async fn list_units(&self) -> Result<Vec<Unit>, ServiceError> {
        self.inner.list_units().await
    }

    async fn list_conversions(&self) -> Result<Vec<Conversion>, ServiceError> {
        let edges = self.inner.list_conversions().await;
        self.maybe_pause(Pause::ListConversions).await;
        edges
    }

    async fn insert_unit_with_conversions(
        &self,
        unit: &Unit,
        edges: &[Conversion],
    ) -> Result<(Unit, Vec<Conversion>), ServiceError> {
        self.inner.insert_unit_with_conversions(unit, edges).await
    }
}

async fn paused_service(backend: Backend, pause: Pause) -> (UomService, Arc<dyn UomRepository>) {
    let inner = common::repository(backend).await;
    let repo = Arc::new(PausingRepository {
        inner: inner.clone(),
        pause,
        delay: Duration::from_millis(200),
    });
    let svc = UomService::new(repo, Duration::from_secs(5), Duration::from_secs(60));
    svc.create_unit(&unit_request("kg", "mass")).await.unwrap();
    svc.create_unit(&unit_request("g", "mass")).await.unwrap();
    (svc, inner)
}

fn move_to_volume() -> UpdateUnitRequest {
    UpdateUnitRequest {
        category: Some("volume".into()),
        ..Default::default()
    }
}

async fn assert_edges_stay_within_categories(repo: &dyn UomRepository) {
    for edge in repo.list_conversions().await.unwrap() {
        let from = repo.load_unit(&edge.from_uom).await.unwrap().unwrap();
        let to = repo.load_unit(&edge.to_uom).await.unwrap().unwrap();
        assert_eq!(
            from.category, to.category,
            "{} -> {} joins {} and {}",
            edge.from_uom, edge.to_uom, from.category, to.category
        );
    }
}

#[rstest]
#[case::in_memory(Backend::InMemory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn category_change_while_edge_is_being_added(#[case] backend: Backend) {
    let (svc, repo) = paused_service(backend, Pause::LoadConversion).await;

    // The edge write validates both units, then stalls before storing.
    let (added, updated) = tokio::join!(svc.add_conversion("g", "kg", dec!(0.001)), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        svc.update_unit("kg", &move_to_volume()).await
    });

    assert_eq!(updated.unwrap().category, UomCategory::Volume);
    assert_matches!(added, Err(ServiceError::CategoryMismatch { .. }));
    assert!(repo.list_conversions().await.unwrap().is_empty());
    assert_edges_stay_within_categories(repo.as_ref()).await;
}

#[rstest]
#[case::in_memory(Backend::InMemory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn edge_added_while_category_change_is_pending(#[case] backend: Backend) {
    let (svc, repo) = paused_service(backend, Pause::ListConversions).await;

    // The category change finds no edges, then stalls before writing.
    let change = move_to_volume();
    let (updated, added) = tokio::join!(svc.update_unit("kg", &change), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        svc.add_conversion("g", "kg", dec!(0.001)).await
    });

    assert_eq!(added.unwrap().factor, dec!(0.001));
    assert_matches!(updated, Err(ServiceError::CategoryMismatch { .. }));
    let kg = repo.load_unit("kg").await.unwrap().unwrap();
    assert_eq!(kg.category, UomCategory::Mass);
    assert_edges_stay_within_categories(repo.as_ref()).await;
}
