use crate::spike::model::SpikeOverrideAttrs;
use crate::storage::entity::spike_schedule::{
    self, ActiveModel as ScheduleActiveModel, Entity as SpikeSchedule, Model as ScheduleModel,
};
use crate::storage::entity::spike_schedule_field::{
    self, ActiveModel as OverrideActiveModel, Entity as SpikeScheduleField, Model as OverrideModel,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

pub struct SpikeRepository;

impl SpikeRepository {
    pub async fn create_schedule(
        db: &DatabaseConnection,
        collection_id: i32,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ScheduleModel, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let am = ScheduleActiveModel {
            collection_id: Set(collection_id),
            name: Set(name.to_string()),
            start_datetime: Set(start),
            end_datetime: Set(end),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        am.insert(db).await
    }

    pub async fn find_schedule(
        db: &DatabaseConnection,
        id: i32,
    ) -> Result<Option<ScheduleModel>, sea_orm::DbErr> {
        SpikeSchedule::find_by_id(id).one(db).await
    }

    pub async fn list(db: &DatabaseConnection) -> Result<Vec<ScheduleModel>, sea_orm::DbErr> {
        SpikeSchedule::find()
            .order_by_asc(spike_schedule::Column::Id)
            .all(db)
            .await
    }

    pub async fn list_for_collection(
        db: &DatabaseConnection,
        collection_id: i32,
    ) -> Result<Vec<ScheduleModel>, sea_orm::DbErr> {
        SpikeSchedule::find()
            .filter(spike_schedule::Column::CollectionId.eq(collection_id))
            .order_by_asc(spike_schedule::Column::Id)
            .all(db)
            .await
    }

    /// 此刻对集合生效的调度。
    /// 多个窗口重叠时取最近创建的一个（created_at、id 降序）。
    pub async fn active_for_collection(
        db: &DatabaseConnection,
        collection_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduleModel>, sea_orm::DbErr> {
        SpikeSchedule::find()
            .filter(spike_schedule::Column::CollectionId.eq(collection_id))
            .filter(spike_schedule::Column::StartDatetime.lte(now))
            .filter(spike_schedule::Column::EndDatetime.gte(now))
            .order_by_desc(spike_schedule::Column::CreatedAt)
            .order_by_desc(spike_schedule::Column::Id)
            .one(db)
            .await
    }

    pub async fn update_schedule(
        db: &DatabaseConnection,
        id: i32,
        name: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Option<ScheduleModel>, sea_orm::DbErr> {
        let Some(model) = SpikeSchedule::find_by_id(id).one(db).await? else {
            return Ok(None);
        };
        let mut am: ScheduleActiveModel = model.into();
        if let Some(name) = name {
            am.name = Set(name.to_string());
        }
        if let Some(start) = start {
            am.start_datetime = Set(start);
        }
        if let Some(end) = end {
            am.end_datetime = Set(end);
        }
        am.updated_at = Set(Utc::now().timestamp());
        let updated = am.update(db).await?;
        Ok(Some(updated))
    }

    /// 删除调度并级联其覆盖记录
    pub async fn delete_schedule(db: &DatabaseConnection, id: i32) -> Result<u64, sea_orm::DbErr> {
        SpikeScheduleField::delete_many()
            .filter(spike_schedule_field::Column::SpikeScheduleId.eq(id))
            .exec(db)
            .await?;
        let res = SpikeSchedule::delete_by_id(id).exec(db).await?;
        Ok(res.rows_affected)
    }

    pub async fn overrides_for_schedule(
        db: &DatabaseConnection,
        schedule_id: i32,
    ) -> Result<Vec<OverrideModel>, sea_orm::DbErr> {
        SpikeScheduleField::find()
            .filter(spike_schedule_field::Column::SpikeScheduleId.eq(schedule_id))
            .order_by_asc(spike_schedule_field::Column::Id)
            .all(db)
            .await
    }

    pub async fn insert_override(
        db: &DatabaseConnection,
        schedule_id: i32,
        original_field_id: i32,
        attrs: &SpikeOverrideAttrs,
    ) -> Result<OverrideModel, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let am = OverrideActiveModel {
            spike_schedule_id: Set(schedule_id),
            original_field_id: Set(original_field_id),
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
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        am.insert(db).await
    }

    /// 写入或更新某字段在调度内的覆盖（每个字段至多一条）。
    /// 更新时只落补丁里的非空属性。
    pub async fn upsert_override(
        db: &DatabaseConnection,
        schedule_id: i32,
        original_field_id: i32,
        attrs: &SpikeOverrideAttrs,
    ) -> Result<OverrideModel, sea_orm::DbErr> {
        let existing = SpikeScheduleField::find()
            .filter(spike_schedule_field::Column::SpikeScheduleId.eq(schedule_id))
            .filter(spike_schedule_field::Column::OriginalFieldId.eq(original_field_id))
            .one(db)
            .await?;

        let Some(model) = existing else {
            return Self::insert_override(db, schedule_id, original_field_id, attrs).await;
        };

        let mut am: OverrideActiveModel = model.into();
        if let Some(v) = attrs.fixed_value_number {
            am.fixed_value_number = Set(Some(v));
        }
        if let Some(v) = attrs.fixed_value_float {
            am.fixed_value_float = Set(Some(v));
        }
        if let Some(v) = attrs.range_start_number {
            am.range_start_number = Set(Some(v));
        }
        if let Some(v) = attrs.range_end_number {
            am.range_end_number = Set(Some(v));
        }
        if let Some(v) = attrs.range_start_float {
            am.range_start_float = Set(Some(v));
        }
        if let Some(v) = attrs.range_end_float {
            am.range_end_float = Set(Some(v));
        }
        if let Some(v) = attrs.float_precision {
            am.float_precision = Set(Some(v));
        }
        if let Some(v) = attrs.start_number {
            am.start_number = Set(Some(v));
        }
        if let Some(v) = attrs.step_number {
            am.step_number = Set(Some(v));
        }
        if let Some(v) = attrs.reset_number {
            am.reset_number = Set(Some(v));
        }
        if let Some(v) = attrs.randomization_percentage {
            am.randomization_percentage = Set(Some(v));
        }
        am.updated_at = Set(Utc::now().timestamp());
        am.update(db).await
    }

    pub async fn remove_override(
        db: &DatabaseConnection,
        schedule_id: i32,
        original_field_id: i32,
    ) -> Result<u64, sea_orm::DbErr> {
        let res = SpikeScheduleField::delete_many()
            .filter(spike_schedule_field::Column::SpikeScheduleId.eq(schedule_id))
            .filter(spike_schedule_field::Column::OriginalFieldId.eq(original_field_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}
