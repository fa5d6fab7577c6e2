//! Users API.

use serde_json::Value;

use crate::body::MultipartPayload;
use crate::client::BellorClient;
use crate::error::Result;
use crate::types::{
    ApiEnvelope, BrowseQuery, ProfileUpdate, ReportRequest, UploadedImage, UserProfile,
};

/// Users API client.
pub struct UsersApi {
    client: BellorClient,
}

impl UsersApi {
    pub(crate) fn new(client: BellorClient) -> Self {
        Self { client }
    }

    /// Fetch the authenticated user's profile.
    pub async fn me(&self) -> Result<UserProfile> {
        let envelope: ApiEnvelope<UserProfile> = self.client.get("users/me").await?;
        Ok(envelope.data)
    }

    /// Fetch a user by id.
    pub async fn get(&self, id: &str) -> Result<UserProfile> {
        let envelope: ApiEnvelope<UserProfile> =
            self.client.get(&format!("users/{}", id)).await?;
        Ok(envelope.data)
    }

    /// Browse profiles with paging.
    pub async fn browse(&self, query: &BrowseQuery) -> Result<Vec<UserProfile>> {
        let envelope: ApiEnvelope<Vec<UserProfile>> =
            self.client.get_with_query("users", query).await?;
        Ok(envelope.data)
    }

    /// Update profile fields.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile> {
        let envelope: ApiEnvelope<UserProfile> = self.client.put("users/me", update).await?;
        Ok(envelope.data)
    }

    /// Upload a profile image. Multipart bodies skip key conversion
    /// entirely and keep their own content type.
    pub async fn upload_profile_image(
        &self,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<UploadedImage> {
        let payload =
            MultipartPayload::new().file("image", file_name, content_type, data);
        let envelope: ApiEnvelope<UploadedImage> = self
            .client
            .post_multipart("users/me/profile-images", payload)
            .await?;
        Ok(envelope.data)
    }

    /// Remove a previously uploaded profile image.
    pub async fn delete_profile_image(&self, id: &str) -> Result<()> {
        self.client
            .delete(&format!("users/me/profile-images/{}", id))
            .await
    }

    /// Report a profile for moderation review.
    pub async fn report(&self, id: &str, report: &ReportRequest) -> Result<()> {
        let _: ApiEnvelope<Value> = self
            .client
            .post(&format!("users/{}/report", id), report)
            .await?;
        Ok(())
    }
}
