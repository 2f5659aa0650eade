use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::error,
    configs::RedisCache,
    modules::user::{repository::UserRepository, schema::UserProfile},
};

const PROFILE_TTL_SECS: usize = 3600;

/// Read-through Redis cache in front of the profile lookup.
///
/// Cache failures are logged and fall back to the inner repository; they never fail a request.
#[derive(Clone)]
pub struct CachedUserRepository<R>
where
    R: UserRepository + Send + Sync,
{
    inner: Arc<R>,
    cache: Arc<RedisCache>,
}

impl<R> CachedUserRepository<R>
where
    R: UserRepository + Send + Sync,
{
    pub fn new(inner: Arc<R>, cache: Arc<RedisCache>) -> Self {
        log::info!("User profile cache initialized");
        Self { inner, cache }
    }
}

#[async_trait::async_trait]
impl<R> UserRepository for CachedUserRepository<R>
where
    R: UserRepository + Send + Sync,
{
    async fn find_profile(&self, id: &Uuid) -> Result<Option<UserProfile>, error::SystemError> {
        let key = format!("user:{}", id);

        match self.cache.get::<UserProfile>(&key).await {
            Ok(Some(profile)) => {
                log::debug!("User {} found in cache", id);
                return Ok(Some(profile));
            }
            Ok(None) => {}
            Err(e) => log::warn!("Profile cache read failed for {}: {}", id, e),
        }

        let profile = self.inner.find_profile(id).await?;

        if let Some(profile) = &profile {
            if let Err(e) = self.cache.set(&key, profile, PROFILE_TTL_SECS).await {
                log::warn!("Profile cache write failed for {}: {}", id, e);
            }
        }

        Ok(profile)
    }
}
