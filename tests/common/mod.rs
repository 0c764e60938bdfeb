use constcat::concat;
use helpdesk::api;
use reqwest::StatusCode;
use serde_json::json;

const BASE_URL: &str = "http://localhost:3000";

/// Must match the `[seed]` section of `config.toml`.
pub const ADMIN_EMAIL: &str = "admin@helpdesk.local";
pub const ADMIN_PASSWORD: &str = "ChangeMe123!";

pub const PASSWORD: &str = "password";

pub fn unique(prefix: &str) -> String {
    format!("{prefix} {}", uuid::Uuid::new_v4())
}

pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", uuid::Uuid::new_v4())
}

pub struct Client {
    inner: reqwest::Client,
    pub auth_token: Option<String>,
}

impl Client {
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
            auth_token: None,
        }
    }

    pub async fn auth(self, email: &str, password: &str) -> Self {
        self.try_auth(email, password)
            .await
            .expect("failed to authenticate")
    }

    pub async fn try_auth(
        mut self,
        email: &str,
        password: &str,
    ) -> Result<Self, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/auth");

        self.auth_token = Some(
            self.inner
                .post(URL)
                .json(&json!({
                    "email": email,
                    "password": password,
                }))
                .send()
                .await
                .expect("failed to send a request")
                .error_for_status()
                .map_err(|e| e.status().expect("status error"))?
                .text()
                .await
                .expect("failed to get a response"),
        );

        Ok(self)
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        let mut req = self.inner.get(url);
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let mut req = self.inner.post(url);
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }

    fn patch(&self, url: String) -> reqwest::RequestBuilder {
        let mut req = self.inner.patch(url);
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }

    fn delete(&self, url: String) -> reqwest::RequestBuilder {
        let mut req = self.inner.delete(url);
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }

    pub async fn user(&self) -> Result<api::user::Me, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/user");

        recv(self.get(URL.to_string())).await
    }

    pub async fn add_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: &str,
        department_ids: &[api::department::Id],
    ) -> Result<api::User, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/user");

        recv(self.post(URL.to_string()).json(&json!({
            "name": name,
            "email": email,
            "password": password,
            "role": role,
            "departmentIds": department_ids,
        })))
        .await
    }

    pub async fn delete_user(
        &self,
        id: api::user::Id,
    ) -> Result<(), StatusCode> {
        const URL: &str = concat!(BASE_URL, "/user");

        self.delete(format!("{URL}/{id}"))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))
            .map(drop)
    }

    pub async fn add_department(
        &self,
        name: &str,
        active: bool,
    ) -> Result<api::Department, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/department");

        recv(self.post(URL.to_string()).json(&json!({
            "name": name,
            "active": active,
        })))
        .await
    }

    pub async fn get_departments(
        &self,
    ) -> Result<Vec<api::Department>, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/department");

        recv(self.get(URL.to_string())).await
    }

    pub async fn add_ticket(
        &self,
        title: &str,
        description: &str,
        priority: &str,
        department: api::department::Id,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        recv(self.post(URL.to_string()).json(&json!({
            "title": title,
            "description": description,
            "priority": priority,
            "departmentId": department,
        })))
        .await
    }

    pub async fn get_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        recv(self.get(format!("{URL}/{id}"))).await
    }

    pub async fn get_tickets(&self) -> Result<Vec<api::Ticket>, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        recv(self.get(URL.to_string())).await
    }

    pub async fn search_tickets(
        &self,
        query: &[(&str, String)],
    ) -> Result<Vec<api::Ticket>, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket/search");

        recv(self.get(URL.to_string()).query(query)).await
    }

    pub async fn set_ticket_status(
        &self,
        id: api::ticket::Id,
        status: &str,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        recv(self.patch(format!("{URL}/{id}")).json(&json!({
            "op": "setStatus",
            "data": {
                "status": status,
            }
        })))
        .await
    }

    pub async fn assign_ticket(
        &self,
        id: api::ticket::Id,
        agent: api::user::Id,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        recv(self.patch(format!("{URL}/{id}")).json(&json!({
            "op": "assign",
            "data": {
                "agentId": agent,
            }
        })))
        .await
    }

    pub async fn assign_ticket_to_me(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        recv(self.patch(format!("{URL}/{id}")).json(&json!({
            "op": "assignToMe",
        })))
        .await
    }

    pub async fn change_ticket_department(
        &self,
        id: api::ticket::Id,
        department: api::department::Id,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        recv(self.patch(format!("{URL}/{id}")).json(&json!({
            "op": "changeDepartment",
            "data": {
                "departmentId": department,
            }
        })))
        .await
    }

    pub async fn claim_next_ticket(
        &self,
    ) -> Result<api::Ticket, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket/claim");

        recv(self.post(URL.to_string())).await
    }

    pub async fn get_ticket_history(
        &self,
        id: api::ticket::Id,
    ) -> Result<Vec<api::ticket::HistoryEntry>, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        recv(self.get(format!("{URL}/{id}/history"))).await
    }

    pub async fn get_messages(
        &self,
        id: api::ticket::Id,
    ) -> Result<Vec<api::ticket::Message>, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        recv(self.get(format!("{URL}/{id}/message"))).await
    }

    pub async fn add_message(
        &self,
        id: api::ticket::Id,
        content: &str,
    ) -> Result<api::ticket::Message, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        recv(self.post(format!("{URL}/{id}/message")).json(&json!({
            "content": content,
        })))
        .await
    }
}

async fn recv<T: serde::de::DeserializeOwned>(
    req: reqwest::RequestBuilder,
) -> Result<T, StatusCode> {
    Ok(req
        .send()
        .await
        .expect("failed to send a request")
        .error_for_status()
        .map_err(|e| e.status().expect("status error"))?
        .json::<T>()
        .await
        .expect("failed to get a response"))
}

/// A department of its own, one client and one agent, all freshly created,
/// so tests never step on each other's data.
pub struct Bootstrap {
    pub admin: Client,
    pub department: api::Department,
    pub client: Client,
    pub client_id: api::user::Id,
    pub agent: Client,
    pub agent_id: api::user::Id,
}

pub async fn bootstrap() -> Bootstrap {
    let admin = Client::new().auth(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let department = admin
        .add_department(&unique("Support"), true)
        .await
        .expect("failed to create a department");

    let client_email = unique_email("carol");
    let client_user = admin
        .add_user("Carol", &client_email, PASSWORD, "CLIENT", &[])
        .await
        .expect("failed to create a client");
    let client = Client::new().auth(&client_email, PASSWORD).await;

    let agent_email = unique_email("alice");
    let agent_user = admin
        .add_user("Alice", &agent_email, PASSWORD, "AGENT", &[department.id])
        .await
        .expect("failed to create an agent");
    let agent = Client::new().auth(&agent_email, PASSWORD).await;

    Bootstrap {
        admin,
        department,
        client,
        client_id: client_user.id,
        agent,
        agent_id: agent_user.id,
    }
}

impl Bootstrap {
    /// Another agent in the same department.
    pub async fn second_agent(&self) -> (Client, api::user::Id) {
        let email = unique_email("bob");
        let user = self
            .admin
            .add_user("Bob", &email, PASSWORD, "AGENT", &[self.department.id])
            .await
            .expect("failed to create an agent");
        (Client::new().auth(&email, PASSWORD).await, user.id)
    }

    /// Another client with no relation to the bootstrap ticket data.
    pub async fn second_client(&self) -> (Client, api::user::Id) {
        let email = unique_email("mallory");
        let user = self
            .admin
            .add_user("Mallory", &email, PASSWORD, "CLIENT", &[])
            .await
            .expect("failed to create a client");
        (Client::new().auth(&email, PASSWORD).await, user.id)
    }

    /// A second active department plus an agent working it.
    pub async fn other_department(
        &self,
    ) -> (api::Department, Client, api::user::Id) {
        let department = self
            .admin
            .add_department(&unique("Billing"), true)
            .await
            .expect("failed to create a department");
        let email = unique_email("eve");
        let user = self
            .admin
            .add_user("Eve", &email, PASSWORD, "AGENT", &[department.id])
            .await
            .expect("failed to create an agent");
        (
            department,
            Client::new().auth(&email, PASSWORD).await,
            user.id,
        )
    }
}
