use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{TicketValidator, ValidationMode};
use crate::catalog::{CheckInListStatus, SearchResult};
use crate::errors::Result;
use crate::redemption::{RedemptionRequest, RedemptionResult};
use crate::session::SessionContext;
use crate::sync::{RemoteAuthority, RemoteRedeemResponse};
use crate::uploads::RedeemRequestBody;

/// Sends every call straight to the remote authority.
pub struct OnlineValidator {
    remote: Arc<dyn RemoteAuthority>,
}

impl OnlineValidator {
    pub fn new(remote: Arc<dyn RemoteAuthority>) -> Self {
        Self { remote }
    }
}

fn into_result(response: RemoteRedeemResponse, nonce: String) -> RedemptionResult {
    let position = response.position();
    RedemptionResult {
        reason: response.reason.clone(),
        nonce: Some(nonce),
        position,
        required_questions: response.questions,
        offline: false,
        ..RedemptionResult::with_status(response.status)
    }
}

#[async_trait]
impl TicketValidator for OnlineValidator {
    fn mode(&self) -> ValidationMode {
        ValidationMode::Online
    }

    async fn redeem(
        &self,
        session: &SessionContext,
        request: RedemptionRequest,
    ) -> Result<RedemptionResult> {
        let nonce = request
            .nonce
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let body = RedeemRequestBody {
            questions_supported: true,
            datetime: request.datetime,
            force: request.force,
            ignore_unpaid: request.ignore_unpaid,
            nonce: nonce.clone(),
            answers: RedeemRequestBody::answers_from(request.answers.as_deref().unwrap_or_default()),
            checkin_type: request.checkin_type,
        };

        let response = self
            .remote
            .redeem(session.list_id(), &request.secret, &body)
            .await?;
        Ok(into_result(response, nonce))
    }

    async fn search(&self, session: &SessionContext, query: &str) -> Result<Vec<SearchResult>> {
        Ok(self.remote.search(session.list_id(), query).await?)
    }

    async fn check_in_list_status(&self, session: &SessionContext) -> Result<CheckInListStatus> {
        Ok(self.remote.checkin_list_status(session.list_id()).await?)
    }
}
