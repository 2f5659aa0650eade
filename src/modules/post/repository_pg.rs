use uuid::Uuid;

use crate::{
    api::error,
    modules::post::{repository::PostRepository, schema::PostSnapshot},
};

#[derive(Clone)]
pub struct PostRepositoryPg {
    pool: sqlx::PgPool,
}

impl PostRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PostRepository for PostRepositoryPg {
    async fn find_post(&self, id: &Uuid) -> Result<Option<PostSnapshot>, error::SystemError> {
        let post = sqlx::query_as::<_, PostSnapshot>(
            r#"
            SELECT id, title, post_type, user_id AS author_id
            FROM posts
            WHERE id = $1 AND is_active = true
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }
}
