//! Login audit trail: one record per attempt, successful or not.

use std::sync::Arc;

use chrono::Utc;

use xadmin_core::{LoginLogId, Page, PageRequest, UserId};

use super::ServiceResult;
use crate::directory::{DirectoryStore, LoginLogRecord};

/// Longest user agent kept; longer values are cut at a char boundary.
const MAX_USER_AGENT_LEN: usize = 512;

#[derive(Debug, Clone, Default)]
pub struct LoginAttempt {
    pub username: String,
    pub user_id: Option<UserId>,
    pub succeeded: bool,
    pub message: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub struct LoginLogService {
    store: Arc<dyn DirectoryStore>,
}

impl LoginLogService {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, attempt: LoginAttempt) -> ServiceResult<LoginLogRecord> {
        let entry = LoginLogRecord {
            id: LoginLogId::new(),
            user_id: attempt.user_id,
            username: attempt.username.trim().to_string(),
            login_type: "basic".to_string(),
            succeeded: attempt.succeeded,
            message: attempt.message,
            ip_address: attempt.ip_address,
            user_agent: attempt.user_agent.map(truncate_user_agent),
            created_at: Utc::now(),
        };
        self.store.save_login_log(&entry).await?;
        Ok(entry)
    }

    /// Newest first; the search term matches username and IP address.
    pub async fn list(&self, request: &PageRequest, succeeded: Option<bool>) -> ServiceResult<Page<LoginLogRecord>> {
        let logs: Vec<LoginLogRecord> = self
            .store
            .list_login_logs()
            .await?
            .into_iter()
            .filter(|l| request.matches(&[Some(l.username.as_str()), l.ip_address.as_deref()]))
            .filter(|l| succeeded.is_none_or(|s| l.succeeded == s))
            .collect();
        Ok(Page::from_vec(logs, request))
    }
}

fn truncate_user_agent(mut agent: String) -> String {
    if agent.len() > MAX_USER_AGENT_LEN {
        let mut end = MAX_USER_AGENT_LEN;
        while !agent.is_char_boundary(end) {
            end -= 1;
        }
        agent.truncate(end);
    }
    agent
}
