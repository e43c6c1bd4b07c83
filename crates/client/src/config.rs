use cardesk_core::reservation::ROLE_OFFICER;
use cardesk_core::types::DbId;

use crate::controller::OfficerIdentity;

/// Terminal configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the cardesk API (default: `http://localhost:3000`).
    pub api_url: String,
    /// Bearer token identifying the signed-in officer.
    pub api_token: String,
    /// Local copy of the identity the token carries (used for display and
    /// client-side permission checks; the server enforces authoritatively).
    pub officer: OfficerIdentity,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var        | Required | Default                 |
    /// |----------------|----------|-------------------------|
    /// | `API_URL`      | no       | `http://localhost:3000` |
    /// | `API_TOKEN`    | **yes**  | --                      |
    /// | `OFFICER_ID`   | **yes**  | --                      |
    /// | `OFFICER_NAME` | **yes**  | --                      |
    /// | `OFFICER_ROLE` | no       | `officer`               |
    /// | `BRANCH_ID`    | no       | unset (shared pool)     |
    ///
    /// # Panics
    ///
    /// Panics if a required variable is missing or malformed.
    pub fn from_env() -> Self {
        let api_url =
            std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let api_token =
            std::env::var("API_TOKEN").expect("API_TOKEN must be set in the environment");

        let officer_id: DbId = std::env::var("OFFICER_ID")
            .expect("OFFICER_ID must be set in the environment")
            .parse()
            .expect("OFFICER_ID must be a valid i64");
        let name =
            std::env::var("OFFICER_NAME").expect("OFFICER_NAME must be set in the environment");
        let role = std::env::var("OFFICER_ROLE").unwrap_or_else(|_| ROLE_OFFICER.into());
        let branch_id: Option<DbId> = std::env::var("BRANCH_ID")
            .ok()
            .map(|v| v.parse().expect("BRANCH_ID must be a valid i64"));

        Self {
            api_url,
            api_token,
            officer: OfficerIdentity {
                id: officer_id,
                name,
                role,
                branch_id,
            },
        }
    }

    /// Derive the WebSocket endpoint from the API base URL.
    pub fn ws_url(&self) -> String {
        let base = self
            .api_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/api/v1/ws", base.trim_end_matches('/'))
    }
}
