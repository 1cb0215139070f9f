//! CoordinatorBuilder - Coordinator の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 依存の注入（clock / id generator / breaker registry / cache）

use std::sync::Arc;

use super::coordinator::{Coordinator, EnrichmentCache};
use crate::config::{ConfigError, TrellisConfig};
use crate::ports::{Clock, EnrichmentSource, IdGenerator, SystemClock, UlidGenerator};
use crate::resilience::BreakerRegistry;

/// Enrichment 結果を保持する cache の namespace
pub const ENRICHMENT_CACHE_NAMESPACE: &str = "enrichment";

/// CoordinatorBuilder は Coordinator を構築
///
/// # 使用例
/// ```ignore
/// let coordinator = CoordinatorBuilder::new(TrellisConfig::load("trellis.toml")?)
///     .enrichment(Arc::new(MyHintService::new()))
///     .expect_enrichment()
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に config を検証
/// - expect_enrichment() を呼んだのに source が無ければ BuildError
/// - 明示されなかった依存は config から既定のものを生成
pub struct CoordinatorBuilder {
    config: TrellisConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    breakers: Option<Arc<BreakerRegistry>>,
    cache: Option<Arc<EnrichmentCache>>,
    enrichment: Option<Arc<dyn EnrichmentSource>>,
    require_enrichment: bool,
}

/// BuildError は Coordinator 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("Enrichment source was expected but not configured.")]
    MissingEnrichmentSource,
}

impl CoordinatorBuilder {
    /// 新しい CoordinatorBuilder を作成
    pub fn new(config: TrellisConfig) -> Self {
        Self {
            config,
            clock: None,
            ids: None,
            breakers: None,
            cache: None,
            enrichment: None,
            require_enrichment: false,
        }
    }

    /// 時刻の取得元を差し替え（テストでは ManualClock）
    ///
    /// 既定の breaker registry と id generator の両方がこの clock を使う
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// 他のコンポーネントと共有する breaker registry を使う
    pub fn breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    /// 他のコンポーネントと共有する cache を使う
    pub fn cache(mut self, cache: Arc<EnrichmentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn enrichment(mut self, source: Arc<dyn EnrichmentSource>) -> Self {
        self.enrichment = Some(source);
        self
    }

    /// Enrichment source を必須にする
    pub fn expect_enrichment(mut self) -> Self {
        self.require_enrichment = true;
        self
    }

    /// CoordinatorBuilder を構築して Coordinator を生成
    ///
    /// # 検証
    /// - config.validate() が通ること
    /// - expect_enrichment() 指定時は source が登録済みであること
    pub fn build(self) -> Result<Coordinator, BuildError> {
        self.config.validate()?;
        if self.require_enrichment && self.enrichment.is_none() {
            return Err(BuildError::MissingEnrichmentSource);
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let breakers = match self.breakers {
            Some(breakers) => breakers,
            None => Arc::new(BreakerRegistry::new(
                self.config.breaker.clone(),
                Arc::clone(&clock),
            )?),
        };
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(EnrichmentCache::new(
                ENRICHMENT_CACHE_NAMESPACE,
                &self.config.cache,
            ))
        });

        Ok(Coordinator::new(
            ids,
            breakers,
            cache,
            self.enrichment,
            self.config.enrichment_timeout,
        ))
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new(TrellisConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProjectId, Task};
    use crate::ports::{Enrichment, LookupError};
    use async_trait::async_trait;

    struct EchoSource;

    #[async_trait]
    impl EnrichmentSource for EchoSource {
        async fn lookup(&self, task: &Task) -> Result<Enrichment, LookupError> {
            Ok(Enrichment {
                task_id: task.id(),
                payload: serde_json::Value::String(task.title().to_string()),
            })
        }
    }

    #[test]
    fn test_build_with_defaults() {
        assert!(CoordinatorBuilder::default().build().is_ok());
    }

    #[test]
    fn test_build_missing_enrichment_source() {
        let result = CoordinatorBuilder::default().expect_enrichment().build();
        assert!(matches!(result, Err(BuildError::MissingEnrichmentSource)));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = TrellisConfig::default();
        config.breaker.failure_threshold = 0;
        let result = CoordinatorBuilder::new(config).build();
        assert!(matches!(
            result,
            Err(BuildError::InvalidConfig(ConfigError::Invalid(_)))
        ));
    }

    #[tokio::test]
    async fn test_shared_registry_and_cache() {
        let config = TrellisConfig::default();
        let breakers =
            Arc::new(BreakerRegistry::with_system_clock(config.breaker.clone()).unwrap());
        let cache = Arc::new(EnrichmentCache::new("shared", &config.cache));

        let coordinator = CoordinatorBuilder::new(config)
            .breakers(Arc::clone(&breakers))
            .cache(Arc::clone(&cache))
            .enrichment(Arc::new(EchoSource))
            .expect_enrichment()
            .build()
            .unwrap();

        let id = coordinator
            .create_task(ProjectId::from_u128(1), "write docs")
            .await
            .unwrap();
        coordinator.enrich(id).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(breakers.snapshots().len(), 1);
    }
}
