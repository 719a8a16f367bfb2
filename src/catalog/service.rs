use crate::api::dto::{
    CollectionResponse, CollectionWithFields, FieldCreate, FieldResponse, FieldUpdate,
};
use crate::catalog::model::{validate_attrs, FieldAttrs, ValueType};
use crate::storage::repository::{CollectionRepository, FieldRepository};
use anyhow::{anyhow, bail};
use log::info;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// 集合与字段的配置服务：校验通过后才落库
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create_collection(&self, name: &str) -> anyhow::Result<CollectionResponse> {
        let name = name.trim();
        if name.is_empty() {
            bail!("集合名不能为空");
        }
        if CollectionRepository::find_by_name(&self.db, name)
            .await?
            .is_some()
        {
            bail!("集合名已存在: {}", name);
        }
        let model = CollectionRepository::create(&self.db, name).await?;
        info!("集合已创建 [{}]: {}", model.id, model.name);
        Ok(model.into())
    }

    pub async fn rename_collection(
        &self,
        id: i32,
        name: &str,
    ) -> anyhow::Result<CollectionResponse> {
        let name = name.trim();
        if name.is_empty() {
            bail!("集合名不能为空");
        }
        let affected = CollectionRepository::rename(&self.db, id, name).await?;
        if affected == 0 {
            bail!("集合不存在: {}", id);
        }
        let model = CollectionRepository::find_by_id(&self.db, id)
            .await?
            .ok_or_else(|| anyhow!("集合不存在: {}", id))?;
        Ok(model.into())
    }

    pub async fn delete_collection(&self, id: i32) -> anyhow::Result<()> {
        let affected = CollectionRepository::delete(&self.db, id).await?;
        if affected == 0 {
            bail!("集合不存在: {}", id);
        }
        info!("集合已删除 [{}]（字段与调度级联清理）", id);
        Ok(())
    }

    pub async fn list_collections(&self) -> anyhow::Result<Vec<CollectionResponse>> {
        let models = CollectionRepository::list(&self.db).await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    pub async fn collection_detail(&self, id: i32) -> anyhow::Result<CollectionWithFields> {
        let collection = CollectionRepository::find_by_id(&self.db, id)
            .await?
            .ok_or_else(|| anyhow!("集合不存在: {}", id))?;
        let fields = FieldRepository::list_for_collection(&self.db, id).await?;
        Ok(CollectionWithFields {
            collection: collection.into(),
            fields: fields.iter().map(FieldResponse::from).collect(),
        })
    }

    /// 在集合的一个分区下新增字段。
    /// 必填属性按 value_type 校验；其它类型的属性即使提交也不参与校验。
    pub async fn create_field(
        &self,
        collection_id: i32,
        req: &FieldCreate,
    ) -> anyhow::Result<FieldResponse> {
        let name = req.field_name.trim();
        if name.is_empty() {
            bail!("字段名不能为空");
        }
        if CollectionRepository::find_by_id(&self.db, collection_id)
            .await?
            .is_none()
        {
            bail!("集合不存在: {}", collection_id);
        }
        validate_attrs(req.value_type, &req.attrs)?;

        let model = FieldRepository::create(
            &self.db,
            collection_id,
            req.collection_type,
            name,
            req.value_type,
            &req.attrs,
        )
        .await?;
        info!(
            "字段已创建 [{}] {}/{}: {} ({})",
            model.id, collection_id, model.collection_type, model.field_name, model.value_type
        );
        Ok(FieldResponse::from(&model))
    }

    /// 原地编辑字段。
    ///
    /// 允许切换 value_type；校验针对补丁合并后的属性进行，
    /// 旧类型遗留的属性留在行里，由消费方忽略。
    pub async fn update_field(
        &self,
        field_id: i32,
        req: &FieldUpdate,
    ) -> anyhow::Result<FieldResponse> {
        let model = FieldRepository::find_by_id(&self.db, field_id)
            .await?
            .ok_or_else(|| anyhow!("字段不存在: {}", field_id))?;

        let value_type = match &req.value_type {
            Some(vt) => *vt,
            None => model
                .value_type
                .parse::<ValueType>()
                .map_err(|e| anyhow!("字段存储的类型非法: {}", e))?,
        };
        if let Some(name) = &req.field_name {
            if name.trim().is_empty() {
                bail!("字段名不能为空");
            }
        }

        let merged = merge_patch(&FieldAttrs::from(&model), &req.attrs);
        validate_attrs(value_type, &merged)?;

        let updated = FieldRepository::update(
            &self.db,
            field_id,
            req.field_name.as_deref().map(str::trim),
            req.value_type,
            &req.attrs,
        )
        .await?
        .ok_or_else(|| anyhow!("字段不存在: {}", field_id))?;
        Ok(FieldResponse::from(&updated))
    }

    /// 删除字段。引用它的 spike 覆盖保留为失效记录，不报错。
    pub async fn delete_field(&self, field_id: i32) -> anyhow::Result<()> {
        let affected = FieldRepository::delete(&self.db, field_id).await?;
        if affected == 0 {
            bail!("字段不存在: {}", field_id);
        }
        Ok(())
    }
}

/// 存量属性 + 补丁（仅非空项）
fn merge_patch(base: &FieldAttrs, patch: &FieldAttrs) -> FieldAttrs {
    let mut out = base.clone();
    if patch.fixed_value_text.is_some() {
        out.fixed_value_text = patch.fixed_value_text.clone();
    }
    if patch.fixed_value_number.is_some() {
        out.fixed_value_number = patch.fixed_value_number;
    }
    if patch.fixed_value_float.is_some() {
        out.fixed_value_float = patch.fixed_value_float;
    }
    if patch.range_start_number.is_some() {
        out.range_start_number = patch.range_start_number;
    }
    if patch.range_end_number.is_some() {
        out.range_end_number = patch.range_end_number;
    }
    if patch.range_start_float.is_some() {
        out.range_start_float = patch.range_start_float;
    }
    if patch.range_end_float.is_some() {
        out.range_end_float = patch.range_end_float;
    }
    if patch.float_precision.is_some() {
        out.float_precision = patch.float_precision;
    }
    if patch.start_number.is_some() {
        out.start_number = patch.start_number;
    }
    if patch.step_number.is_some() {
        out.step_number = patch.step_number;
    }
    if patch.reset_number.is_some() {
        out.reset_number = patch.reset_number;
    }
    if patch.randomization_percentage.is_some() {
        out.randomization_percentage = patch.randomization_percentage;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::model::CollectionType;
    use crate::storage::establish_connection;

    async fn service(name: &str) -> CatalogService {
        let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
        let db = establish_connection(&url).await.unwrap();
        CatalogService::new(Arc::new(db))
    }

    fn number_range_create(name: &str) -> FieldCreate {
        FieldCreate {
            collection_type: CollectionType::Performance,
            field_name: name.to_string(),
            value_type: ValueType::NumberRange,
            attrs: FieldAttrs {
                range_start_number: Some(1),
                range_end_number: Some(100),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn collection_crud_round_trip() {
        let svc = service("catalog_collection_crud").await;
        let created = svc.create_collection("servers").await.unwrap();
        assert!(svc.create_collection("servers").await.is_err()); // 重名拒绝
        assert!(svc.create_collection("  ").await.is_err());

        let renamed = svc.rename_collection(created.id, "edge-servers").await.unwrap();
        assert_eq!(renamed.name, "edge-servers");

        let listed = svc.list_collections().await.unwrap();
        assert_eq!(listed.len(), 1);

        svc.delete_collection(created.id).await.unwrap();
        assert!(svc.list_collections().await.unwrap().is_empty());
        assert!(svc.delete_collection(created.id).await.is_err());
    }

    #[tokio::test]
    async fn field_create_requires_declared_attributes() {
        let svc = service("catalog_field_validation").await;
        let c = svc.create_collection("metrics").await.unwrap();

        let mut req = number_range_create("load");
        req.attrs.range_end_number = None;
        assert!(svc.create_field(c.id, &req).await.is_err());

        let ok = svc.create_field(c.id, &number_range_create("load")).await.unwrap();
        assert_eq!(ok.summary, "Range: 1 - 100");
        assert!(svc.create_field(999, &number_range_create("x")).await.is_err());
    }

    #[tokio::test]
    async fn field_name_unique_within_collection_and_partition() {
        let svc = service("catalog_field_unique").await;
        let c = svc.create_collection("metrics").await.unwrap();
        svc.create_field(c.id, &number_range_create("load")).await.unwrap();

        // 同集合同分区重名 -> 唯一索引拒绝
        assert!(svc.create_field(c.id, &number_range_create("load")).await.is_err());

        // 另一个分区允许同名
        let mut req = number_range_create("load");
        req.collection_type = CollectionType::Configuration;
        assert!(svc.create_field(c.id, &req).await.is_ok());
    }

    #[tokio::test]
    async fn field_edit_keeps_stale_attributes() {
        let svc = service("catalog_field_edit").await;
        let c = svc.create_collection("metrics").await.unwrap();
        let f = svc.create_field(c.id, &number_range_create("load")).await.unwrap();

        // 换类型但不带新类型的必填属性 -> 拒绝
        let req = FieldUpdate {
            value_type: Some(ValueType::FloatFixed),
            ..Default::default()
        };
        assert!(svc.update_field(f.id, &req).await.is_err());

        // 带上必填属性 -> 通过，旧的区间属性保留为遗留数据
        let req = FieldUpdate {
            value_type: Some(ValueType::FloatFixed),
            attrs: FieldAttrs {
                fixed_value_float: Some(2.5),
                ..Default::default()
            },
            ..Default::default()
        };
        let updated = svc.update_field(f.id, &req).await.unwrap();
        assert_eq!(updated.value_type, "FLOAT_FIXED");
        assert_eq!(updated.summary, "Fixed: 2.5");
        assert_eq!(updated.attrs.range_start_number, Some(1));
        assert_eq!(updated.attrs.range_end_number, Some(100));
    }

    #[tokio::test]
    async fn collection_detail_lists_both_partitions() {
        let svc = service("catalog_detail").await;
        let c = svc.create_collection("metrics").await.unwrap();
        svc.create_field(c.id, &number_range_create("load")).await.unwrap();
        svc.create_field(
            c.id,
            &FieldCreate {
                collection_type: CollectionType::Configuration,
                field_name: "version".to_string(),
                value_type: ValueType::TextFixed,
                attrs: FieldAttrs {
                    fixed_value_text: Some("1.0.0".to_string()),
                    ..Default::default()
                },
            },
        )
        .await
        .unwrap();

        let detail = svc.collection_detail(c.id).await.unwrap();
        assert_eq!(detail.fields.len(), 2);
        assert_eq!(detail.collection.name, "metrics");
    }
}
