use async_trait::async_trait;

use crate::models::{ActivityPayload, AttendanceResponse, GivingResponse, SubjectId};

use super::ApiError;

/// The four upstream sources an analytics batch is built from.
///
/// `ApiClient` is the HTTP implementation; anything else that can answer
/// these calls (a fixture, a different backend) can be plugged into
/// `FetchCoordinator` instead.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Donation history plus, when the backend reports them, aggregate totals
    async fn giving(&self, subject: &SubjectId) -> Result<GivingResponse, ApiError>;

    async fn attendance(&self, subject: &SubjectId) -> Result<AttendanceResponse, ApiError>;

    async fn in_gathering(&self, subject: &SubjectId) -> Result<ActivityPayload, ApiError>;

    async fn nurturing(&self, subject: &SubjectId) -> Result<ActivityPayload, ApiError>;
}
