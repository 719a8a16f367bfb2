use crate::api::dto::GeneratedPayload;
use crate::catalog::model::{CollectionType, ConfigError, FieldAttrs, FieldConfig};
use crate::generate::context::OverrideProvider;
use crate::generate::engine::{GenerateError, ValueEngine};
use crate::spike::model::{is_editable, parse_field_types};
use crate::storage::repository::{CollectionRepository, FieldRepository};
use chrono::Utc;
use log::info;
use sea_orm::DatabaseConnection;
use serde_json::Map;
use std::sync::Arc;

/// 生成服务：把字段配置（叠加生效的 spike 覆盖）合成为一次请求的数据
pub struct GenerateService {
    db: Arc<DatabaseConnection>,
    overrides: Arc<dyn OverrideProvider>,
}

impl GenerateService {
    pub fn new(db: Arc<DatabaseConnection>, overrides: Arc<dyn OverrideProvider>) -> Self {
        Self { db, overrides }
    }

    /// 为集合的一个分区生成一份数据。
    ///
    /// 有生效调度时，对其覆盖的可编辑字段先做非空属性替换再生成；
    /// 覆盖与字段现类型不匹配（目标被删除或改过类型）时按失效处理。
    pub async fn generate(
        &self,
        collection_name: &str,
        collection_type: CollectionType,
    ) -> anyhow::Result<GeneratedPayload> {
        let collection = CollectionRepository::find_by_name(&self.db, collection_name)
            .await?
            .ok_or_else(|| GenerateError::UnknownCollection(collection_name.to_string()))?;
        let fields =
            FieldRepository::list_for_collection_type(&self.db, collection.id, collection_type)
                .await?;
        if fields.is_empty() {
            return Err(GenerateError::NoFields {
                collection: collection.name,
                collection_type: collection_type.as_str().to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let active = self.overrides.active_overrides(collection.id, now).await?;

        // 1. 纯合成阶段（不跨 await 持有 RNG）
        let mut generated = Vec::with_capacity(fields.len());
        {
            let mut rng = rand::thread_rng();
            for field in &fields {
                let (ct, vt) = parse_field_types(field).ok_or_else(|| {
                    GenerateError::InvalidConfig {
                        field: field.field_name.clone(),
                        source: ConfigError::UnknownValueType(field.value_type.clone()),
                    }
                })?;

                let mut attrs = FieldAttrs::from(field);
                if let Some(ov) = active.get(&field.id) {
                    if is_editable(ct, vt) && ov.matches(vt) {
                        attrs = ov.apply_to(&attrs);
                    }
                }

                let config = FieldConfig::resolve(vt, &attrs).map_err(|source| {
                    GenerateError::InvalidConfig {
                        field: field.field_name.clone(),
                        source,
                    }
                })?;
                let out = ValueEngine::generate(&config, field.current_number, now, &mut rng);
                generated.push((field.id, field.field_name.clone(), out));
            }
        }

        // 2. 回写计数器状态并组装负载
        let mut data = Map::new();
        for (field_id, field_name, out) in generated {
            if let Some(next) = out.next_counter {
                FieldRepository::set_current_number(&self.db, field_id, next).await?;
            }
            data.insert(field_name, out.value.into());
        }

        info!(
            "生成完成: {} / {} ({} 个字段{})",
            collection.name,
            collection_type,
            data.len(),
            if active.is_empty() { "" } else { "，spike 覆盖生效" }
        );

        Ok(GeneratedPayload {
            collection: collection.name,
            collection_type: collection_type.as_str().to_string(),
            generated_at_epoch: now.timestamp(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::{FieldCreate, SpikeFieldOverride, SpikeScheduleCreate, SpikeScheduleUpdate};
    use crate::catalog::model::ValueType;
    use crate::catalog::service::CatalogService;
    use crate::generate::context::DbOverrideProvider;
    use crate::spike::model::SpikeOverrideAttrs;
    use crate::spike::service::SpikeService;
    use crate::storage::establish_connection;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use std::collections::HashMap;

    struct Ctx {
        db: Arc<DatabaseConnection>,
        catalog: CatalogService,
        spike: SpikeService,
        collection_id: i32,
    }

    async fn ctx(name: &str) -> Ctx {
        let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
        let db = Arc::new(establish_connection(&url).await.unwrap());
        let catalog = CatalogService::new(db.clone());
        let spike = SpikeService::new(db.clone());
        let c = catalog.create_collection("servers").await.unwrap();
        Ctx {
            db,
            catalog,
            spike,
            collection_id: c.id,
        }
    }

    fn field(ct: CollectionType, name: &str, vt: ValueType, attrs: FieldAttrs) -> FieldCreate {
        FieldCreate {
            collection_type: ct,
            field_name: name.to_string(),
            value_type: vt,
            attrs,
        }
    }

    struct NoOverrides;

    #[async_trait]
    impl OverrideProvider for NoOverrides {
        async fn active_overrides(
            &self,
            _collection_id: i32,
            _now: DateTime<Utc>,
        ) -> anyhow::Result<HashMap<i32, SpikeOverrideAttrs>> {
            Ok(HashMap::new())
        }
    }

    struct FixedOverrides(HashMap<i32, SpikeOverrideAttrs>);

    #[async_trait]
    impl OverrideProvider for FixedOverrides {
        async fn active_overrides(
            &self,
            _collection_id: i32,
            _now: DateTime<Utc>,
        ) -> anyhow::Result<HashMap<i32, SpikeOverrideAttrs>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn generates_payload_for_each_field() {
        let t = ctx("gen_payload").await;
        t.catalog
            .create_field(
                t.collection_id,
                &field(
                    CollectionType::Performance,
                    "rps",
                    ValueType::NumberRange,
                    FieldAttrs {
                        range_start_number: Some(10),
                        range_end_number: Some(20),
                        ..Default::default()
                    },
                ),
            )
            .await
            .unwrap();
        t.catalog
            .create_field(
                t.collection_id,
                &field(
                    CollectionType::Performance,
                    "captured_at",
                    ValueType::EpochNow,
                    FieldAttrs::default(),
                ),
            )
            .await
            .unwrap();
        t.catalog
            .create_field(
                t.collection_id,
                &field(
                    CollectionType::Configuration,
                    "version",
                    ValueType::TextFixed,
                    FieldAttrs {
                        fixed_value_text: Some("1.2.3".to_string()),
                        ..Default::default()
                    },
                ),
            )
            .await
            .unwrap();

        let svc = GenerateService::new(t.db.clone(), Arc::new(NoOverrides));
        let payload = svc
            .generate("servers", CollectionType::Performance)
            .await
            .unwrap();
        assert_eq!(payload.collection, "servers");
        assert_eq!(payload.collection_type, "Performance");
        assert_eq!(payload.data.len(), 2);
        let rps = payload.data["rps"].as_i64().unwrap();
        assert!((10..=20).contains(&rps));
        assert_eq!(payload.data["captured_at"].as_i64().unwrap(), payload.generated_at_epoch);

        // Configuration 分区只看到自己的字段
        let payload = svc
            .generate("servers", CollectionType::Configuration)
            .await
            .unwrap();
        assert_eq!(payload.data.len(), 1);
        assert_eq!(payload.data["version"], "1.2.3");
    }

    #[tokio::test]
    async fn fails_on_unknown_collection_or_empty_partition() {
        let t = ctx("gen_failures").await;
        let svc = GenerateService::new(t.db.clone(), Arc::new(NoOverrides));
        assert!(svc
            .generate("missing", CollectionType::Performance)
            .await
            .is_err());
        assert!(svc
            .generate("servers", CollectionType::Performance)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn counter_state_persists_across_requests() {
        let t = ctx("gen_counter").await;
        t.catalog
            .create_field(
                t.collection_id,
                &field(
                    CollectionType::Performance,
                    "seq",
                    ValueType::Increment,
                    FieldAttrs {
                        start_number: Some(0.0),
                        step_number: Some(5.0),
                        ..Default::default()
                    },
                ),
            )
            .await
            .unwrap();

        let svc = GenerateService::new(t.db.clone(), Arc::new(NoOverrides));
        for expected in [0.0, 5.0, 10.0] {
            let payload = svc
                .generate("servers", CollectionType::Performance)
                .await
                .unwrap();
            assert_eq!(payload.data["seq"].as_f64().unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn override_substitutes_only_populated_attributes() {
        let t = ctx("gen_override").await;
        let f = t
            .catalog
            .create_field(
                t.collection_id,
                &field(
                    CollectionType::Performance,
                    "rps",
                    ValueType::NumberRange,
                    FieldAttrs {
                        range_start_number: Some(10),
                        range_end_number: Some(20),
                        ..Default::default()
                    },
                ),
            )
            .await
            .unwrap();

        let mut overrides = HashMap::new();
        overrides.insert(
            f.id,
            SpikeOverrideAttrs {
                range_start_number: Some(1000),
                range_end_number: Some(1100),
                ..Default::default()
            },
        );
        let svc = GenerateService::new(t.db.clone(), Arc::new(FixedOverrides(overrides)));
        for _ in 0..20 {
            let payload = svc
                .generate("servers", CollectionType::Performance)
                .await
                .unwrap();
            let rps = payload.data["rps"].as_i64().unwrap();
            assert!((1000..=1100).contains(&rps));
        }
    }

    #[tokio::test]
    async fn mismatched_override_is_inert() {
        let t = ctx("gen_inert").await;
        let f = t
            .catalog
            .create_field(
                t.collection_id,
                &field(
                    CollectionType::Performance,
                    "rps",
                    ValueType::NumberRange,
                    FieldAttrs {
                        range_start_number: Some(10),
                        range_end_number: Some(20),
                        ..Default::default()
                    },
                ),
            )
            .await
            .unwrap();

        // 覆盖属性不属于 NUMBER_RANGE 的允许子集 -> 失效，不报错
        let mut overrides = HashMap::new();
        overrides.insert(
            f.id,
            SpikeOverrideAttrs {
                fixed_value_float: Some(9.9),
                ..Default::default()
            },
        );
        let svc = GenerateService::new(t.db.clone(), Arc::new(FixedOverrides(overrides)));
        let payload = svc
            .generate("servers", CollectionType::Performance)
            .await
            .unwrap();
        let rps = payload.data["rps"].as_i64().unwrap();
        assert!((10..=20).contains(&rps));
    }

    #[tokio::test]
    async fn db_provider_applies_active_schedule_and_prefers_latest() {
        let t = ctx("gen_db_provider").await;
        let f = t
            .catalog
            .create_field(
                t.collection_id,
                &field(
                    CollectionType::Performance,
                    "rps",
                    ValueType::NumberRange,
                    FieldAttrs {
                        range_start_number: Some(10),
                        range_end_number: Some(20),
                        ..Default::default()
                    },
                ),
            )
            .await
            .unwrap();

        let schedule = |name: &str, lo: i64, hi: i64| SpikeScheduleCreate {
            collection_id: t.collection_id,
            name: name.to_string(),
            start_datetime: Utc::now() - Duration::minutes(5),
            end_datetime: Utc::now() + Duration::minutes(5),
            spike_fields: vec![SpikeFieldOverride {
                original_field_id: f.id,
                range_start_number: Some(lo),
                range_end_number: Some(hi),
                ..Default::default()
            }],
        };
        t.spike.create_schedule(&schedule("first", 100, 200)).await.unwrap();
        t.spike.create_schedule(&schedule("second", 5000, 6000)).await.unwrap();

        let svc = GenerateService::new(
            t.db.clone(),
            Arc::new(DbOverrideProvider::new(t.db.clone())),
        );
        for _ in 0..20 {
            let payload = svc
                .generate("servers", CollectionType::Performance)
                .await
                .unwrap();
            let rps = payload.data["rps"].as_i64().unwrap();
            // 重叠窗口时最近创建的调度生效
            assert!((5000..=6000).contains(&rps), "rps {rps} not from latest spike");
        }

        // 过期后回到字段自身区间
        let expired = SpikeScheduleUpdate {
            start_datetime: Some(Utc::now() - Duration::minutes(20)),
            end_datetime: Some(Utc::now() - Duration::minutes(10)),
            ..Default::default()
        };
        let listed = t.spike.list_schedules(Some(t.collection_id)).await.unwrap();
        for s in listed {
            t.spike.update_schedule(s.id, &expired).await.unwrap();
        }
        let payload = svc
            .generate("servers", CollectionType::Performance)
            .await
            .unwrap();
        let rps = payload.data["rps"].as_i64().unwrap();
        assert!((10..=20).contains(&rps));
    }
}
