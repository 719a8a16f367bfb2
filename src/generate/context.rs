use crate::spike::model::SpikeOverrideAttrs;
use crate::storage::repository::SpikeRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::Arc;

/// 生成时的覆盖来源：此刻对某集合生效的覆盖集
#[async_trait]
pub trait OverrideProvider: Send + Sync {
    /// original_field_id -> 覆盖属性；无生效调度时返回空集
    async fn active_overrides(
        &self,
        collection_id: i32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<HashMap<i32, SpikeOverrideAttrs>>;
}

/// 读库实现：挑选当前窗口内最近创建的调度
pub struct DbOverrideProvider {
    db: Arc<DatabaseConnection>,
}

impl DbOverrideProvider {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OverrideProvider for DbOverrideProvider {
    async fn active_overrides(
        &self,
        collection_id: i32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<HashMap<i32, SpikeOverrideAttrs>> {
        let Some(schedule) =
            SpikeRepository::active_for_collection(&self.db, collection_id, now).await?
        else {
            return Ok(HashMap::new());
        };

        let overrides = SpikeRepository::overrides_for_schedule(&self.db, schedule.id).await?;
        Ok(overrides
            .iter()
            .map(|m| (m.original_field_id, SpikeOverrideAttrs::from(m)))
            .collect())
    }
}
