use std::{error::Error, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, RequestPartsExt as _, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use derive_more::From;
use futures::{future::OptionFuture, FutureExt as _};
use itertools::Itertools as _;
use jsonwebtoken::{
    decode, encode, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::{fs, net, task};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use helpdesk::{api, config, core, db, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = fs::read_to_string("config.toml").await?;
    let config = toml::from_str::<Config>(&config)?;

    let (db_client, db_connection) = db::connect(config.db).await?;

    task::spawn(async move {
        if let Err(e) = db_connection.await {
            panic!("database connection failed: {e}");
        }
    });

    if config.seed.enabled {
        seed(&db_client, &config.seed).await?;
    }

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    for origin in &config.http.cors.allowed_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    let app = Router::new()
        .route("/auth", post(auth))
        .route("/user", get(get_user).post(create_user))
        .route("/user/agents", get(list_agents))
        .route("/user/:id", delete(delete_user))
        .route("/department", get(list_departments).post(add_department))
        .route("/ticket", get(list_tickets).post(add_ticket))
        .route("/ticket/claim", post(claim_ticket))
        .route("/ticket/search", get(search_tickets))
        .route("/ticket/:id", get(get_ticket).patch(edit_ticket))
        .route("/ticket/:id/history", get(get_ticket_history))
        .route("/ticket/:id/message", get(list_messages).post(add_message))
        .layer(cors)
        .with_state(Arc::new(AppState {
            core: core::Service::new(db_client),
            jwt_expiration_time: config.jwt.expiration_time,
            jwt_decoding_key: DecodingKey::from_secret(
                config.jwt.secret.as_bytes(),
            ),
            jwt_encoding_key: EncodingKey::from_secret(
                config.jwt.secret.as_bytes(),
            ),
        }));

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn seed(
    db_client: &db::Client,
    config: &config::Seed,
) -> Result<(), db::Error> {
    if db_client
        .get_user_by_email(&config.admin_email)
        .await?
        .is_some()
    {
        return Ok(());
    }

    db_client
        .write_user(&db::User {
            id: api::user::Id::new(),
            name: config.admin_name.clone(),
            email: config.admin_email.clone(),
            role: api::user::Role::Admin,
            departments: Vec::new(),
            password_hash: api::user::PasswordHash::new(
                &config.admin_password,
            ),
        })
        .await?;
    tracing::info!(email = %config.admin_email, "seeded admin account");

    Ok(())
}

#[derive(Deserialize)]
struct AuthInput {
    email: String,
    password: String,
}

async fn auth(
    State(state): State<SharedAppState>,
    Json(AuthInput { email, password }): Json<AuthInput>,
) -> Result<String, AuthError> {
    use AuthError as E;

    let password_hash = api::user::PasswordHash::new(&password);

    let user = state
        .db()
        .get_user_by_email(&email)
        .await?
        .filter(|u| u.password_hash == password_hash)
        .ok_or(E::WrongEmailOrPassword)?;

    let expires_at = OffsetDateTime::now_utc() + state.jwt_expiration_time;
    encode(
        &Header::default(),
        &AuthClaims {
            user_id: user.id,
            exp: expires_at.unix_timestamp(),
        },
        &state.jwt_encoding_key,
    )
    .map_err(|_| E::InvalidToken)
}

#[derive(Debug, From)]
pub enum AuthError {
    #[from]
    DbError(db::Error),
    InvalidToken,
    WrongEmailOrPassword,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::WrongEmailOrPassword => StatusCode::FORBIDDEN,
        }
        .into_response()
    }
}

async fn get_user(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
) -> Result<Json<api::user::Me>, GetUserError> {
    use GetUserError as E;

    let my = state
        .db()
        .get_user_by_id(auth_claims.user_id)
        .await?
        .ok_or(E::UserNotFound)?;

    Ok(Json(api::user::Me {
        id: my.id,
        name: my.name,
        email: my.email,
        role: my.role,
        departments: my.departments,
    }))
}

#[derive(Debug, From)]
pub enum GetUserError {
    #[from]
    DbError(db::Error),
    UserNotFound,
}

impl IntoResponse for GetUserError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) | Self::UserNotFound => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserInput {
    name: String,
    email: String,
    password: String,
    role: api::user::Role,
    #[serde(default)]
    department_ids: Vec<api::department::Id>,
}

async fn create_user(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Json(input): Json<CreateUserInput>,
) -> Result<Json<api::User>, UserAdminError> {
    use UserAdminError as E;

    let my = state
        .db()
        .get_user_by_id(auth_claims.user_id)
        .await?
        .ok_or(E::RequesterNotFound)?;
    if my.role != api::user::Role::Admin {
        return Err(E::AdminRequired);
    }
    if input.role == api::user::Role::Admin {
        return Err(E::AdminTargetForbidden);
    }
    if state.db().get_user_by_email(&input.email).await?.is_some() {
        return Err(E::EmailTaken);
    }
    for &department in &input.department_ids {
        state
            .db()
            .get_department_by_id(department)
            .await?
            .ok_or(E::DepartmentNotFound)?;
    }
    if input.role == api::user::Role::Agent && input.department_ids.is_empty()
    {
        return Err(E::AgentWithoutDepartment);
    }

    let user = db::User {
        id: api::user::Id::new(),
        name: input.name,
        email: input.email,
        role: input.role,
        departments: input.department_ids,
        password_hash: api::user::PasswordHash::new(&input.password),
    };
    state.db().write_user(&user).await?;

    Ok(Json(user_response(&user)))
}

async fn delete_user(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::user::Id>,
) -> Result<StatusCode, UserAdminError> {
    use UserAdminError as E;

    let my = state
        .db()
        .get_user_by_id(auth_claims.user_id)
        .await?
        .ok_or(E::RequesterNotFound)?;
    if my.role != api::user::Role::Admin {
        return Err(E::AdminRequired);
    }

    let target = state
        .db()
        .get_user_by_id(id)
        .await?
        .ok_or(E::UserNotFound)?;
    if target.role == api::user::Role::Admin {
        return Err(E::AdminTargetForbidden);
    }

    let created = state.db().get_tickets_count_created_by(id).await?;
    let assigned = state.db().get_tickets_count_assigned_to(id).await?;
    if created > 0 || assigned > 0 {
        return Err(E::UserHasTickets);
    }

    state.db().delete_user(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ListAgentsInput {
    department: Option<api::department::Id>,
}

async fn list_agents(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Query(ListAgentsInput { department }): Query<ListAgentsInput>,
) -> Result<Json<Vec<api::User>>, UserAdminError> {
    use UserAdminError as E;

    let my = state
        .db()
        .get_user_by_id(auth_claims.user_id)
        .await?
        .ok_or(E::RequesterNotFound)?;
    if my.role != api::user::Role::Admin {
        return Err(E::AdminRequired);
    }

    let agents = state.db().get_agents(department).await?;

    Ok(Json(agents.iter().map(user_response).collect()))
}

#[derive(Debug, From)]
pub enum UserAdminError {
    #[from]
    DbError(db::Error),
    AdminRequired,
    AdminTargetForbidden,
    AgentWithoutDepartment,
    DepartmentNotFound,
    EmailTaken,
    RequesterNotFound,
    UserHasTickets,
    UserNotFound,
}

impl IntoResponse for UserAdminError {
    fn into_response(self) -> Response {
        match self {
            Self::AdminRequired | Self::AdminTargetForbidden => {
                StatusCode::FORBIDDEN
            }
            Self::AgentWithoutDepartment | Self::UserHasTickets => {
                StatusCode::BAD_REQUEST
            }
            Self::DepartmentNotFound | Self::UserNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::DbError(_) | Self::RequesterNotFound => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

async fn list_departments(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
) -> Result<Json<Vec<api::Department>>, DepartmentError> {
    use DepartmentError as E;

    let my = state
        .db()
        .get_user_by_id(auth_claims.user_id)
        .await?
        .ok_or(E::RequesterNotFound)?;

    // Inactive departments are an administrative detail.
    let only_active = my.role != api::user::Role::Admin;
    let departments = state.db().get_departments(only_active).await?;

    Ok(Json(
        departments.into_iter().map(department_response).collect(),
    ))
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
struct AddDepartmentInput {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_active")]
    active: bool,
}

async fn add_department(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Json(input): Json<AddDepartmentInput>,
) -> Result<Json<api::Department>, DepartmentError> {
    use DepartmentError as E;

    let my = state
        .db()
        .get_user_by_id(auth_claims.user_id)
        .await?
        .ok_or(E::RequesterNotFound)?;
    if my.role != api::user::Role::Admin {
        return Err(E::AdminRequired);
    }

    if state
        .db()
        .get_department_by_name(&input.name)
        .await?
        .is_some()
    {
        return Err(E::NameTaken);
    }

    let department = db::Department {
        id: api::department::Id::new(),
        name: input.name,
        description: input.description,
        active: input.active,
    };
    state.db().write_department(&department).await?;

    Ok(Json(department_response(department)))
}

#[derive(Debug, From)]
pub enum DepartmentError {
    #[from]
    DbError(db::Error),
    AdminRequired,
    NameTaken,
    RequesterNotFound,
}

impl IntoResponse for DepartmentError {
    fn into_response(self) -> Response {
        match self {
            Self::AdminRequired => StatusCode::FORBIDDEN,
            Self::NameTaken => StatusCode::CONFLICT,
            Self::DbError(_) | Self::RequesterNotFound => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTicketInput {
    title: String,
    description: String,
    priority: api::ticket::Priority,
    department_id: api::department::Id,
}

async fn add_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Json(input): Json<AddTicketInput>,
) -> Result<Json<api::Ticket>, TicketError> {
    let ticket = state
        .core
        .create_ticket(
            core::NewTicket {
                title: input.title,
                description: input.description,
                priority: input.priority,
                department: input.department_id,
            },
            auth_claims.user_id,
        )
        .await?;

    Ok(Json(ticket_response(&state, ticket).await?))
}

async fn list_tickets(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
) -> Result<Json<Vec<api::Ticket>>, TicketError> {
    let tickets = state.core.list_for_user(auth_claims.user_id).await?;

    Ok(Json(tickets_response(&state, tickets).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchTicketsInput {
    status: Option<api::ticket::Status>,
    priority: Option<api::ticket::Priority>,
    created_by: Option<api::user::Id>,
    assigned_to: Option<api::user::Id>,
    department: Option<api::department::Id>,
    from: Option<time::Date>,
    to: Option<time::Date>,
}

async fn search_tickets(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Query(input): Query<SearchTicketsInput>,
) -> Result<Json<Vec<api::Ticket>>, TicketError> {
    let filter = core::search::Filter {
        status: input.status,
        priority: input.priority,
        created_by: input.created_by,
        assigned_to: input.assigned_to,
        department: input.department,
        departments: None,
        from: input.from,
        to: input.to,
    };
    let tickets = state.core.search(filter, auth_claims.user_id).await?;

    Ok(Json(tickets_response(&state, tickets).await?))
}

async fn get_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::Ticket>, TicketError> {
    let ticket = state.core.get_ticket(id, auth_claims.user_id).await?;

    Ok(Json(ticket_response(&state, ticket).await?))
}

#[derive(Deserialize)]
#[serde(content = "data", rename_all = "camelCase", tag = "op")]
enum EditTicketInput {
    #[serde(rename_all = "camelCase")]
    SetStatus { status: api::ticket::Status },
    #[serde(rename_all = "camelCase")]
    Assign { agent_id: api::user::Id },
    AssignToMe,
    #[serde(rename_all = "camelCase")]
    ChangeDepartment { department_id: api::department::Id },
}

async fn edit_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(op): Json<EditTicketInput>,
) -> Result<Json<api::Ticket>, TicketError> {
    use EditTicketInput as Op;

    let requester = auth_claims.user_id;
    let ticket = match op {
        Op::SetStatus { status } => {
            state.core.transition_status(id, status, requester).await?
        }
        Op::Assign { agent_id } => {
            state.core.assign(id, agent_id, requester).await?
        }
        Op::AssignToMe => state.core.assign(id, requester, requester).await?,
        Op::ChangeDepartment { department_id } => {
            state
                .core
                .change_department(id, department_id, requester)
                .await?
        }
    };

    Ok(Json(ticket_response(&state, ticket).await?))
}

async fn claim_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
) -> Result<Json<api::Ticket>, TicketError> {
    let ticket = state.core.claim_next(auth_claims.user_id).await?;

    Ok(Json(ticket_response(&state, ticket).await?))
}

async fn get_ticket_history(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<Vec<api::ticket::HistoryEntry>>, TicketError> {
    let entries = state.core.ticket_history(id, auth_claims.user_id).await?;

    let user_ids = entries
        .iter()
        .map(|entry| entry.performed_by)
        .unique()
        .collect::<Vec<_>>();
    let users = state.db().get_users_by_ids(&user_ids).await?;

    Ok(Json(
        entries
            .into_iter()
            .map(|entry| api::ticket::HistoryEntry {
                id: entry.id,
                action: entry.action,
                old_value: entry.old_value,
                new_value: entry.new_value,
                performed_by: users
                    .get(&entry.performed_by)
                    .map(user_response),
                timestamp: entry.timestamp,
            })
            .collect(),
    ))
}

async fn list_messages(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<Vec<api::ticket::Message>>, TicketError> {
    // Reading the thread follows the same visibility as the ticket itself.
    state.core.get_ticket(id, auth_claims.user_id).await?;

    let messages = state.db().get_ticket_messages(id).await?;
    let user_ids = messages
        .iter()
        .map(|message| message.author)
        .unique()
        .collect::<Vec<_>>();
    let users = state.db().get_users_by_ids(&user_ids).await?;

    Ok(Json(
        messages
            .into_iter()
            .map(|message| api::ticket::Message {
                id: message.id,
                author: users.get(&message.author).map(user_response),
                content: message.content,
                created_at: message.created_at,
            })
            .collect(),
    ))
}

const MAX_MESSAGE_LENGTH: usize = 1000;

#[derive(Deserialize)]
struct AddMessageInput {
    content: String,
}

async fn add_message(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(AddMessageInput { content }): Json<AddMessageInput>,
) -> Result<Json<api::ticket::Message>, TicketError> {
    use TicketError as E;

    if content.trim().is_empty() || content.chars().count() > MAX_MESSAGE_LENGTH
    {
        return Err(E::MessageRejected);
    }
    if !state
        .core
        .can_post_message(id, auth_claims.user_id)
        .await?
    {
        return Err(core::Error::InvalidState.into());
    }

    let author = state
        .db()
        .get_user_by_id(auth_claims.user_id)
        .await?
        .ok_or(E::UserNotFound(auth_claims.user_id))?;

    let message = db::Message {
        id: db::message::Id::new(),
        ticket: id,
        author: author.id,
        content,
        created_at: OffsetDateTime::now_utc(),
    };
    state.db().write_message(&message).await?;

    Ok(Json(api::ticket::Message {
        id: message.id,
        author: Some(user_response(&author)),
        content: message.content,
        created_at: message.created_at,
    }))
}

#[derive(Debug, From)]
pub enum TicketError {
    #[from]
    Core(core::Error),
    #[from]
    DbError(db::Error),
    MessageRejected,
    UserNotFound(api::user::Id),
}

impl IntoResponse for TicketError {
    fn into_response(self) -> Response {
        match self {
            Self::Core(e) => core_response(e),
            Self::MessageRejected => StatusCode::BAD_REQUEST.into_response(),
            Self::DbError(_) | Self::UserNotFound(_) => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Every core error kind keeps its own stable signal: the status code plus
/// a code string callers can branch on.
fn core_response(error: core::Error) -> Response {
    let (status, code) = match error {
        core::Error::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        core::Error::InvalidArgument => {
            (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT")
        }
        core::Error::InvalidState => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STATE")
        }
        core::Error::InvalidTransition => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_TRANSITION")
        }
        core::Error::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        core::Error::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
        core::Error::Db(_) => {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };
    (status, code).into_response()
}

fn user_response(user: &db::User) -> api::User {
    api::User {
        id: user.id,
        name: user.name.clone(),
        role: user.role,
    }
}

fn department_response(department: db::Department) -> api::Department {
    api::Department {
        id: department.id,
        name: department.name,
        description: department.description,
        active: department.active,
    }
}

async fn ticket_response(
    state: &AppState,
    ticket: db::Ticket,
) -> Result<api::Ticket, TicketError> {
    use TicketError as E;

    let created_by = state
        .db()
        .get_user_by_id(ticket.created_by)
        .await?
        .ok_or(E::UserNotFound(ticket.created_by))?;
    let assigned_to =
        OptionFuture::from(ticket.assigned_to.map(|id| async move {
            state
                .db()
                .get_user_by_id(id)
                .await?
                .ok_or(E::UserNotFound(id))
        }))
        .map(Option::transpose)
        .await?;

    Ok(api::Ticket {
        id: ticket.id,
        title: ticket.title,
        description: ticket.description,
        priority: ticket.priority,
        status: ticket.status,
        department: ticket.department,
        created_by: user_response(&created_by),
        assigned_to: assigned_to.as_ref().map(user_response),
        created_at: ticket.created_at,
        updated_at: ticket.updated_at,
    })
}

async fn tickets_response(
    state: &AppState,
    tickets: Vec<db::Ticket>,
) -> Result<Vec<api::Ticket>, TicketError> {
    use TicketError as E;

    let user_ids = tickets
        .iter()
        .map(|ticket| ticket.created_by)
        .chain(tickets.iter().filter_map(|ticket| ticket.assigned_to))
        .unique()
        .collect::<Vec<_>>();
    let users = state.db().get_users_by_ids(&user_ids).await?;

    tickets
        .into_iter()
        .map(|ticket| {
            let created_by = users
                .get(&ticket.created_by)
                .ok_or(E::UserNotFound(ticket.created_by))?;
            let assigned_to = ticket
                .assigned_to
                .map(|id| users.get(&id).ok_or(E::UserNotFound(id)))
                .transpose()?;
            Ok::<_, E>(api::Ticket {
                id: ticket.id,
                title: ticket.title,
                description: ticket.description,
                priority: ticket.priority,
                status: ticket.status,
                department: ticket.department,
                created_by: user_response(created_by),
                assigned_to: assigned_to.map(user_response),
                created_at: ticket.created_at,
                updated_at: ticket.updated_at,
            })
        })
        .collect()
}

type SharedAppState = Arc<AppState>;

struct AppState {
    core: core::Service<db::Client>,

    jwt_expiration_time: Duration,

    jwt_decoding_key: DecodingKey,

    jwt_encoding_key: EncodingKey,
}

impl AppState {
    fn db(&self) -> &db::Client {
        &self.core.store
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct AuthClaims {
    user_id: api::user::Id,
    exp: i64,
}

#[async_trait]
impl FromRequestParts<SharedAppState> for AuthClaims {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let token_data = decode::<Self>(
            bearer.token(),
            &state.jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}
