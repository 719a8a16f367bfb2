use crate::storage::entity::collection::{
    self, ActiveModel as CollectionActiveModel, Entity as Collection, Model as CollectionModel,
};
use crate::storage::repository::{FieldRepository, SpikeRepository};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

pub struct CollectionRepository;

impl CollectionRepository {
    pub async fn create(
        db: &DatabaseConnection,
        name: &str,
    ) -> Result<CollectionModel, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let am = CollectionActiveModel {
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        am.insert(db).await
    }

    pub async fn find_by_id(
        db: &DatabaseConnection,
        id: i32,
    ) -> Result<Option<CollectionModel>, sea_orm::DbErr> {
        Collection::find_by_id(id).one(db).await
    }

    pub async fn find_by_name(
        db: &DatabaseConnection,
        name: &str,
    ) -> Result<Option<CollectionModel>, sea_orm::DbErr> {
        Collection::find()
            .filter(collection::Column::Name.eq(name))
            .one(db)
            .await
    }

    pub async fn list(db: &DatabaseConnection) -> Result<Vec<CollectionModel>, sea_orm::DbErr> {
        Collection::find()
            .order_by_asc(collection::Column::Name)
            .all(db)
            .await
    }

    pub async fn rename(
        db: &DatabaseConnection,
        id: i32,
        name: &str,
    ) -> Result<u64, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let res = Collection::update_many()
            .col_expr(collection::Column::Name, Expr::value(name.to_string()))
            .col_expr(collection::Column::UpdatedAt, Expr::value(now))
            .filter(collection::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    /// 删除集合并级联清理其字段与调度（含覆盖记录）
    pub async fn delete(db: &DatabaseConnection, id: i32) -> Result<u64, sea_orm::DbErr> {
        let schedules = SpikeRepository::list_for_collection(db, id).await?;
        for s in schedules {
            SpikeRepository::delete_schedule(db, s.id).await?;
        }
        FieldRepository::delete_for_collection(db, id).await?;
        let res = Collection::delete_by_id(id).exec(db).await?;
        Ok(res.rows_affected)
    }
}
