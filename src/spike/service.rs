use crate::api::dto::{
    SpikeFieldResponse, SpikeScheduleCreate, SpikeScheduleResponse, SpikeScheduleUpdate,
};
use crate::spike::model::{
    compute_status, derive_editable_fields, validate_schedule, EditableFieldSeed, OverrideSpec,
    SpikeOverrideAttrs,
};
use crate::storage::entity::spike_schedule;
use crate::storage::repository::{CollectionRepository, FieldRepository, SpikeRepository};
use anyhow::{anyhow, bail};
use chrono::Utc;
use log::info;
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::Arc;

/// Spike 调度服务：窗口内临时覆盖数值 Performance 字段的生成参数
pub struct SpikeService {
    db: Arc<DatabaseConnection>,
}

impl SpikeService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 新建调度的编辑基线：集合内可编辑字段，以现值播种
    pub async fn editable_fields(
        &self,
        collection_id: i32,
    ) -> anyhow::Result<Vec<EditableFieldSeed>> {
        if CollectionRepository::find_by_id(&self.db, collection_id)
            .await?
            .is_none()
        {
            bail!("集合不存在: {}", collection_id);
        }
        let fields = FieldRepository::list_for_collection(&self.db, collection_id).await?;
        Ok(derive_editable_fields(&fields))
    }

    pub async fn create_schedule(
        &self,
        req: &SpikeScheduleCreate,
    ) -> anyhow::Result<SpikeScheduleResponse> {
        let collection = CollectionRepository::find_by_id(&self.db, req.collection_id)
            .await?
            .ok_or_else(|| anyhow!("集合不存在: {}", req.collection_id))?;
        let fields = FieldRepository::list_for_collection(&self.db, req.collection_id).await?;
        if fields.is_empty() {
            bail!("集合没有任何字段，无法创建调度");
        }

        let specs: Vec<OverrideSpec> = req.spike_fields.iter().map(Into::into).collect();
        validate_schedule(
            &req.name,
            req.start_datetime,
            req.end_datetime,
            &specs,
            &fields,
        )?;

        let schedule = SpikeRepository::create_schedule(
            &self.db,
            req.collection_id,
            req.name.trim(),
            req.start_datetime,
            req.end_datetime,
        )
        .await?;
        for spec in &specs {
            SpikeRepository::insert_override(
                &self.db,
                schedule.id,
                spec.original_field_id,
                &spec.attrs,
            )
            .await?;
        }
        info!(
            "调度已创建 [{}] {} @ {}: {} ~ {}",
            schedule.id, schedule.name, collection.name, schedule.start_datetime, schedule.end_datetime
        );

        self.assemble(schedule).await
    }

    pub async fn get_schedule(&self, id: i32) -> anyhow::Result<SpikeScheduleResponse> {
        let schedule = SpikeRepository::find_schedule(&self.db, id)
            .await?
            .ok_or_else(|| anyhow!("调度不存在: {}", id))?;
        self.assemble(schedule).await
    }

    pub async fn list_schedules(
        &self,
        collection_id: Option<i32>,
    ) -> anyhow::Result<Vec<SpikeScheduleResponse>> {
        let schedules = match collection_id {
            Some(cid) => SpikeRepository::list_for_collection(&self.db, cid).await?,
            None => SpikeRepository::list(&self.db).await?,
        };
        let mut out = Vec::with_capacity(schedules.len());
        for s in schedules {
            out.push(self.assemble(s).await?);
        }
        Ok(out)
    }

    /// 编辑调度。collection_id 创建后不可变；窗口/名称按补丁合并后整体校验。
    pub async fn update_schedule(
        &self,
        id: i32,
        req: &SpikeScheduleUpdate,
    ) -> anyhow::Result<SpikeScheduleResponse> {
        let schedule = SpikeRepository::find_schedule(&self.db, id)
            .await?
            .ok_or_else(|| anyhow!("调度不存在: {}", id))?;
        let fields =
            FieldRepository::list_for_collection(&self.db, schedule.collection_id).await?;

        let name = req.name.clone().unwrap_or_else(|| schedule.name.clone());
        let start = req.start_datetime.unwrap_or(schedule.start_datetime);
        let end = req.end_datetime.unwrap_or(schedule.end_datetime);
        let specs: Vec<OverrideSpec> = req
            .spike_fields
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .map(Into::into)
            .collect();
        validate_schedule(&name, start, end, &specs, &fields)?;

        SpikeRepository::update_schedule(
            &self.db,
            id,
            req.name.as_deref().map(str::trim),
            req.start_datetime,
            req.end_datetime,
        )
        .await?;
        for spec in &specs {
            SpikeRepository::upsert_override(
                &self.db,
                id,
                spec.original_field_id,
                &spec.attrs,
            )
            .await?;
        }

        self.get_schedule(id).await
    }

    /// 写入单个字段的覆盖（控制台 `schedule set`）
    pub async fn set_override(
        &self,
        schedule_id: i32,
        original_field_id: i32,
        attrs: &SpikeOverrideAttrs,
    ) -> anyhow::Result<SpikeScheduleResponse> {
        let schedule = SpikeRepository::find_schedule(&self.db, schedule_id)
            .await?
            .ok_or_else(|| anyhow!("调度不存在: {}", schedule_id))?;
        let fields =
            FieldRepository::list_for_collection(&self.db, schedule.collection_id).await?;

        // 校验用既有覆盖叠加补丁后的整体，避免落库后组合出非法配置
        let stored = SpikeRepository::overrides_for_schedule(&self.db, schedule_id)
            .await?
            .iter()
            .find(|m| m.original_field_id == original_field_id)
            .map(SpikeOverrideAttrs::from)
            .unwrap_or_default();
        let spec = OverrideSpec {
            original_field_id,
            attrs: stored.overlay(attrs),
        };
        validate_schedule(
            &schedule.name,
            schedule.start_datetime,
            schedule.end_datetime,
            &[spec],
            &fields,
        )?;

        SpikeRepository::upsert_override(&self.db, schedule_id, original_field_id, attrs).await?;
        self.get_schedule(schedule_id).await
    }

    pub async fn remove_override(
        &self,
        schedule_id: i32,
        original_field_id: i32,
    ) -> anyhow::Result<SpikeScheduleResponse> {
        let removed =
            SpikeRepository::remove_override(&self.db, schedule_id, original_field_id).await?;
        if removed == 0 {
            bail!("调度 {} 内没有字段 {} 的覆盖", schedule_id, original_field_id);
        }
        self.get_schedule(schedule_id).await
    }

    pub async fn delete_schedule(&self, id: i32) -> anyhow::Result<()> {
        let affected = SpikeRepository::delete_schedule(&self.db, id).await?;
        if affected == 0 {
            bail!("调度不存在: {}", id);
        }
        info!("调度已删除 [{}]（覆盖记录级联清理）", id);
        Ok(())
    }

    /// 组装读模型：status 实时推导，覆盖目标按现状解析。
    /// 目标字段已删除的覆盖以失效形式返回，不视为错误。
    async fn assemble(
        &self,
        schedule: spike_schedule::Model,
    ) -> anyhow::Result<SpikeScheduleResponse> {
        let collection = CollectionRepository::find_by_id(&self.db, schedule.collection_id)
            .await?
            .ok_or_else(|| anyhow!("集合不存在: {}", schedule.collection_id))?;
        let overrides = SpikeRepository::overrides_for_schedule(&self.db, schedule.id).await?;

        let fields =
            FieldRepository::list_for_collection(&self.db, schedule.collection_id).await?;
        let by_id: HashMap<i32, _> = fields.iter().map(|f| (f.id, f)).collect();

        let spike_fields = overrides
            .iter()
            .map(|m| SpikeFieldResponse::assemble(m, by_id.get(&m.original_field_id).copied()))
            .collect();

        Ok(SpikeScheduleResponse {
            id: schedule.id,
            collection_id: schedule.collection_id,
            collection_name: collection.name,
            name: schedule.name,
            start_datetime: schedule.start_datetime,
            end_datetime: schedule.end_datetime,
            status: compute_status(schedule.start_datetime, schedule.end_datetime, Utc::now()),
            spike_fields,
            created_at: schedule.created_at,
            updated_at: schedule.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::{FieldCreate, SpikeFieldOverride};
    use crate::catalog::model::{CollectionType, FieldAttrs, ValueType};
    use crate::catalog::service::CatalogService;
    use crate::spike::model::ScheduleStatus;
    use crate::storage::establish_connection;
    use chrono::{Duration, Utc};

    struct Ctx {
        catalog: CatalogService,
        spike: SpikeService,
        collection_id: i32,
        range_field_id: i32,
        text_field_id: i32,
    }

    async fn ctx(name: &str) -> Ctx {
        let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
        let db = Arc::new(establish_connection(&url).await.unwrap());
        let catalog = CatalogService::new(db.clone());
        let spike = SpikeService::new(db.clone());

        let c = catalog.create_collection("servers").await.unwrap();
        let range = catalog
            .create_field(
                c.id,
                &FieldCreate {
                    collection_type: CollectionType::Performance,
                    field_name: "rps".to_string(),
                    value_type: ValueType::NumberRange,
                    attrs: FieldAttrs {
                        range_start_number: Some(10),
                        range_end_number: Some(100),
                        ..Default::default()
                    },
                },
            )
            .await
            .unwrap();
        let text = catalog
            .create_field(
                c.id,
                &FieldCreate {
                    collection_type: CollectionType::Performance,
                    field_name: "host".to_string(),
                    value_type: ValueType::TextFixed,
                    attrs: FieldAttrs {
                        fixed_value_text: Some("web-1".to_string()),
                        ..Default::default()
                    },
                },
            )
            .await
            .unwrap();

        Ctx {
            catalog,
            spike,
            collection_id: c.id,
            range_field_id: range.id,
            text_field_id: text.id,
        }
    }

    fn create_req(
        collection_id: i32,
        field_id: i32,
        offset_start_mins: i64,
        offset_end_mins: i64,
    ) -> SpikeScheduleCreate {
        SpikeScheduleCreate {
            collection_id,
            name: "load spike".to_string(),
            start_datetime: Utc::now() + Duration::minutes(offset_start_mins),
            end_datetime: Utc::now() + Duration::minutes(offset_end_mins),
            spike_fields: vec![SpikeFieldOverride {
                original_field_id: field_id,
                range_start_number: Some(500),
                range_end_number: Some(900),
                ..Default::default()
            }],
        }
    }

    #[tokio::test]
    async fn editable_fields_exclude_text_and_seed_baseline() {
        let t = ctx("spike_editable").await;
        let editable = t.spike.editable_fields(t.collection_id).await.unwrap();
        assert_eq!(editable.len(), 1);
        assert_eq!(editable[0].original_field_id, t.range_field_id);
        assert_eq!(editable[0].attrs.range_start_number, Some(10));
        assert_eq!(editable[0].attrs.range_end_number, Some(100));
    }

    #[tokio::test]
    async fn schedule_create_and_status_derivation() {
        let t = ctx("spike_create").await;

        // 进行中的窗口
        let resp = t
            .spike
            .create_schedule(&create_req(t.collection_id, t.range_field_id, -5, 5))
            .await
            .unwrap();
        assert_eq!(resp.status, ScheduleStatus::Active);
        assert_eq!(resp.collection_name, "servers");
        assert_eq!(resp.spike_fields.len(), 1);
        assert!(resp.spike_fields[0].is_editable);

        // 未来窗口
        let resp = t
            .spike
            .create_schedule(&create_req(t.collection_id, t.range_field_id, 10, 20))
            .await
            .unwrap();
        assert_eq!(resp.status, ScheduleStatus::Scheduled);

        // 过去窗口
        let resp = t
            .spike
            .create_schedule(&create_req(t.collection_id, t.range_field_id, -20, -10))
            .await
            .unwrap();
        assert_eq!(resp.status, ScheduleStatus::Expired);
    }

    #[tokio::test]
    async fn schedule_create_rejections() {
        let t = ctx("spike_rejections").await;

        // 窗口相等
        let mut req = create_req(t.collection_id, t.range_field_id, 5, 5);
        req.end_datetime = req.start_datetime;
        assert!(t.spike.create_schedule(&req).await.is_err());

        // 文本字段不可覆盖
        let req = create_req(t.collection_id, t.text_field_id, 0, 5);
        assert!(t.spike.create_schedule(&req).await.is_err());

        // 同一字段重复覆盖
        let mut req = create_req(t.collection_id, t.range_field_id, 0, 5);
        req.spike_fields.push(req.spike_fields[0].clone());
        assert!(t.spike.create_schedule(&req).await.is_err());

        // 集合不存在
        let req = create_req(9999, t.range_field_id, 0, 5);
        assert!(t.spike.create_schedule(&req).await.is_err());
    }

    #[tokio::test]
    async fn orphaned_override_is_inert_not_an_error() {
        let t = ctx("spike_orphan").await;
        let resp = t
            .spike
            .create_schedule(&create_req(t.collection_id, t.range_field_id, -5, 5))
            .await
            .unwrap();

        t.catalog.delete_field(t.range_field_id).await.unwrap();

        let reloaded = t.spike.get_schedule(resp.id).await.unwrap();
        assert_eq!(reloaded.spike_fields.len(), 1);
        assert!(!reloaded.spike_fields[0].is_editable);
        assert_eq!(reloaded.spike_fields[0].field_name, None);
    }

    #[tokio::test]
    async fn set_override_validates_domain() {
        let t = ctx("spike_set_override").await;
        let resp = t
            .spike
            .create_schedule(&create_req(t.collection_id, t.range_field_id, -5, 5))
            .await
            .unwrap();

        // NUMBER_RANGE 目标不接受固定值属性
        let bad = SpikeOverrideAttrs {
            fixed_value_number: Some(5),
            ..Default::default()
        };
        assert!(t
            .spike
            .set_override(resp.id, t.range_field_id, &bad)
            .await
            .is_err());

        let ok = SpikeOverrideAttrs {
            range_end_number: Some(5000),
            ..Default::default()
        };
        let updated = t
            .spike
            .set_override(resp.id, t.range_field_id, &ok)
            .await
            .unwrap();
        assert_eq!(updated.spike_fields[0].attrs.range_end_number, Some(5000));
        // 之前提交的起点保留
        assert_eq!(updated.spike_fields[0].attrs.range_start_number, Some(500));

        // 补丁与既有覆盖组合出非法区间（end 300 < 既有 start 500）-> 拒绝
        let conflicting = SpikeOverrideAttrs {
            range_end_number: Some(300),
            ..Default::default()
        };
        assert!(t
            .spike
            .set_override(resp.id, t.range_field_id, &conflicting)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn update_window_recomputes_status_both_ways() {
        let t = ctx("spike_update_window").await;
        let resp = t
            .spike
            .create_schedule(&create_req(t.collection_id, t.range_field_id, -5, 5))
            .await
            .unwrap();
        assert_eq!(resp.status, ScheduleStatus::Active);

        // 窗口整体推到未来 -> 状态回退为 scheduled
        let req = SpikeScheduleUpdate {
            start_datetime: Some(Utc::now() + Duration::minutes(30)),
            end_datetime: Some(Utc::now() + Duration::minutes(60)),
            ..Default::default()
        };
        let updated = t.spike.update_schedule(resp.id, &req).await.unwrap();
        assert_eq!(updated.status, ScheduleStatus::Scheduled);

        // 合并后的窗口非法 -> 拒绝
        let req = SpikeScheduleUpdate {
            end_datetime: Some(Utc::now() + Duration::minutes(29)),
            ..Default::default()
        };
        assert!(t.spike.update_schedule(resp.id, &req).await.is_err());
    }

    #[tokio::test]
    async fn delete_schedule_cascades_overrides() {
        let t = ctx("spike_delete").await;
        let resp = t
            .spike
            .create_schedule(&create_req(t.collection_id, t.range_field_id, -5, 5))
            .await
            .unwrap();
        t.spike.delete_schedule(resp.id).await.unwrap();
        assert!(t.spike.get_schedule(resp.id).await.is_err());
        assert!(t.spike.delete_schedule(resp.id).await.is_err());
    }
}
