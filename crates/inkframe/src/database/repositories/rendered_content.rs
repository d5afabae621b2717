//! SeaORM-based repository for rendered artifact records

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use super::traits::{ConversionUtils, EntityToDomain};
use crate::entities::{prelude::RenderedContents, rendered_contents};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::imaging::BitDepth;
use crate::models::RenderedContent;

/// Request for artifact record creation
#[derive(Debug, Clone)]
pub struct RenderedContentCreateRequest {
    pub target_id: Uuid,
    pub device_id: Uuid,
    pub width: u32,
    pub height: u32,
    pub bit_depth: BitDepth,
    pub image_path: String,
    pub file_size: i64,
    pub content_hash: String,
    pub previous_hash: Option<String>,
}

#[derive(Clone)]
pub struct RenderedContentSeaOrmRepository {
    connection: Arc<DatabaseConnection>,
}

impl RenderedContentSeaOrmRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    pub async fn create(
        &self,
        request: RenderedContentCreateRequest,
    ) -> RepositoryResult<RenderedContent> {
        let now = Utc::now();
        let active_model = rendered_contents::ActiveModel {
            id: Set(Uuid::new_v4()),
            target_id: Set(request.target_id),
            device_id: Set(request.device_id),
            width: Set(ConversionUtils::convert_int("width", request.width)?),
            height: Set(ConversionUtils::convert_int("height", request.height)?),
            bit_depth: Set(i32::from(request.bit_depth.bits())),
            image_path: Set(request.image_path),
            file_size: Set(request.file_size),
            content_hash: Set(request.content_hash),
            previous_hash: Set(request.previous_hash),
            rendered_at: Set(now),
            last_checked_at: Set(None),
            render_attempts: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active_model.insert(&*self.connection).await?;
        self.to_domain(model)
    }

    /// Most recent artifact for a (target, device) pair
    pub async fn latest_for(
        &self,
        target_id: Uuid,
        device_id: Uuid,
    ) -> RepositoryResult<Option<RenderedContent>> {
        RenderedContents::find()
            .filter(rendered_contents::Column::TargetId.eq(target_id))
            .filter(rendered_contents::Column::DeviceId.eq(device_id))
            .order_by_desc(rendered_contents::Column::RenderedAt)
            .one(&*self.connection)
            .await?
            .map(|m| self.to_domain(m))
            .transpose()
    }

    /// All artifacts for a pair, newest first
    pub async fn list_for(
        &self,
        target_id: Uuid,
        device_id: Uuid,
    ) -> RepositoryResult<Vec<RenderedContent>> {
        let models = RenderedContents::find()
            .filter(rendered_contents::Column::TargetId.eq(target_id))
            .filter(rendered_contents::Column::DeviceId.eq(device_id))
            .order_by_desc(rendered_contents::Column::RenderedAt)
            .all(&*self.connection)
            .await?;
        models.into_iter().map(|m| self.to_domain(m)).collect()
    }

    /// Record that a re-render produced identical bytes
    pub async fn touch_checked(&self, id: Uuid) -> RepositoryResult<()> {
        let now = Utc::now();
        let result = RenderedContents::update_many()
            .col_expr(
                rendered_contents::Column::LastCheckedAt,
                Expr::value(Some(now)),
            )
            .col_expr(rendered_contents::Column::RenderAttempts, Expr::value(0))
            .col_expr(rendered_contents::Column::UpdatedAt, Expr::value(now))
            .filter(rendered_contents::Column::Id.eq(id))
            .exec(&*self.connection)
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::RecordNotFound {
                table: "rendered_contents".to_string(),
                field: "id".to_string(),
                value: id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        RenderedContents::delete_by_id(id)
            .exec(&*self.connection)
            .await?;
        Ok(())
    }

    /// Every stored `image_path`
    pub async fn all_image_paths(&self) -> RepositoryResult<Vec<String>> {
        Ok(RenderedContents::find()
            .select_only()
            .column(rendered_contents::Column::ImagePath)
            .into_tuple()
            .all(&*self.connection)
            .await?)
    }

    /// Artifacts last confirmed before `cutoff`
    ///
    /// Confirmation time is `last_checked_at`, or `rendered_at` when the
    /// artifact was never re-confirmed.
    pub async fn find_stale(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<RenderedContent>> {
        let models = RenderedContents::find()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(rendered_contents::Column::LastCheckedAt.is_null())
                            .add(rendered_contents::Column::RenderedAt.lt(cutoff)),
                    )
                    .add(rendered_contents::Column::LastCheckedAt.lt(cutoff)),
            )
            .all(&*self.connection)
            .await?;
        models.into_iter().map(|m| self.to_domain(m)).collect()
    }
}

impl EntityToDomain<rendered_contents::Model, RenderedContent>
    for RenderedContentSeaOrmRepository
{
    fn to_domain(&self, model: rendered_contents::Model) -> RepositoryResult<RenderedContent> {
        let bit_depth =
            BitDepth::try_from(model.bit_depth).map_err(|_| RepositoryError::InvalidValue {
                field: "bit_depth".to_string(),
                value: model.bit_depth.to_string(),
            })?;

        Ok(RenderedContent {
            id: model.id,
            target_id: model.target_id,
            device_id: model.device_id,
            width: ConversionUtils::convert_int("width", model.width)?,
            height: ConversionUtils::convert_int("height", model.height)?,
            bit_depth,
            image_path: model.image_path,
            file_size: model.file_size,
            content_hash: model.content_hash,
            previous_hash: model.previous_hash,
            rendered_at: model.rendered_at,
            last_checked_at: model.last_checked_at,
            render_attempts: model.render_attempts,
        })
    }
}
