use crate::catalog::model::{CollectionType, FieldAttrs, ValueType};
use crate::storage::entity::field::{
    self, ActiveModel as FieldActiveModel, Entity as Field, Model as FieldModel,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

pub struct FieldRepository;

impl FieldRepository {
    pub async fn create(
        db: &DatabaseConnection,
        collection_id: i32,
        collection_type: CollectionType,
        field_name: &str,
        value_type: ValueType,
        attrs: &FieldAttrs,
    ) -> Result<FieldModel, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let am = FieldActiveModel {
            collection_id: Set(collection_id),
            collection_type: Set(collection_type.as_str().to_string()),
            field_name: Set(field_name.to_string()),
            value_type: Set(value_type.as_str().to_string()),
            fixed_value_text: Set(attrs.fixed_value_text.clone()),
            fixed_value_number: Set(attrs.fixed_value_number),
            fixed_value_float: Set(attrs.fixed_value_float),
            range_start_number: Set(attrs.range_start_number),
            range_end_number: Set(attrs.range_end_number),
            range_start_float: Set(attrs.range_start_float),
            range_end_float: Set(attrs.range_end_float),
            float_precision: Set(attrs.float_precision),
            start_number: Set(attrs.start_number),
            step_number: Set(attrs.step_number),
            reset_number: Set(attrs.reset_number),
            randomization_percentage: Set(attrs.randomization_percentage),
            current_number: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        am.insert(db).await
    }

    pub async fn find_by_id(
        db: &DatabaseConnection,
        id: i32,
    ) -> Result<Option<FieldModel>, sea_orm::DbErr> {
        Field::find_by_id(id).one(db).await
    }

    pub async fn list_for_collection(
        db: &DatabaseConnection,
        collection_id: i32,
    ) -> Result<Vec<FieldModel>, sea_orm::DbErr> {
        Field::find()
            .filter(field::Column::CollectionId.eq(collection_id))
            .order_by_asc(field::Column::Id)
            .all(db)
            .await
    }

    pub async fn list_for_collection_type(
        db: &DatabaseConnection,
        collection_id: i32,
        collection_type: CollectionType,
    ) -> Result<Vec<FieldModel>, sea_orm::DbErr> {
        Field::find()
            .filter(field::Column::CollectionId.eq(collection_id))
            .filter(field::Column::CollectionType.eq(collection_type.as_str()))
            .order_by_asc(field::Column::Id)
            .all(db)
            .await
    }

    /// 原地编辑字段。
    ///
    /// 切换 value_type 不清理旧类型的属性列（遗留数据由消费方忽略），
    /// 属性补丁里只有非空项会落库。
    pub async fn update(
        db: &DatabaseConnection,
        id: i32,
        field_name: Option<&str>,
        value_type: Option<ValueType>,
        patch: &FieldAttrs,
    ) -> Result<Option<FieldModel>, sea_orm::DbErr> {
        let Some(model) = Field::find_by_id(id).one(db).await? else {
            return Ok(None);
        };

        let mut am: FieldActiveModel = model.into();
        if let Some(name) = field_name {
            am.field_name = Set(name.to_string());
        }
        if let Some(vt) = value_type {
            am.value_type = Set(vt.as_str().to_string());
        }
        if let Some(v) = patch.fixed_value_text.clone() {
            am.fixed_value_text = Set(Some(v));
        }
        if let Some(v) = patch.fixed_value_number {
            am.fixed_value_number = Set(Some(v));
        }
        if let Some(v) = patch.fixed_value_float {
            am.fixed_value_float = Set(Some(v));
        }
        if let Some(v) = patch.range_start_number {
            am.range_start_number = Set(Some(v));
        }
        if let Some(v) = patch.range_end_number {
            am.range_end_number = Set(Some(v));
        }
        if let Some(v) = patch.range_start_float {
            am.range_start_float = Set(Some(v));
        }
        if let Some(v) = patch.range_end_float {
            am.range_end_float = Set(Some(v));
        }
        if let Some(v) = patch.float_precision {
            am.float_precision = Set(Some(v));
        }
        if let Some(v) = patch.start_number {
            am.start_number = Set(Some(v));
        }
        if let Some(v) = patch.step_number {
            am.step_number = Set(Some(v));
        }
        if let Some(v) = patch.reset_number {
            am.reset_number = Set(Some(v));
        }
        if let Some(v) = patch.randomization_percentage {
            am.randomization_percentage = Set(Some(v));
        }
        am.updated_at = Set(Utc::now().timestamp());

        let updated = am.update(db).await?;
        Ok(Some(updated))
    }

    /// 生成引擎回写活动计数器
    pub async fn set_current_number(
        db: &DatabaseConnection,
        id: i32,
        value: f64,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        Field::update_many()
            .col_expr(field::Column::CurrentNumber, Expr::value(value))
            .col_expr(field::Column::UpdatedAt, Expr::value(now))
            .filter(field::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn delete(db: &DatabaseConnection, id: i32) -> Result<u64, sea_orm::DbErr> {
        let res = Field::delete_by_id(id).exec(db).await?;
        Ok(res.rows_affected)
    }

    pub async fn delete_for_collection(
        db: &DatabaseConnection,
        collection_id: i32,
    ) -> Result<u64, sea_orm::DbErr> {
        let res = Field::delete_many()
            .filter(field::Column::CollectionId.eq(collection_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}
