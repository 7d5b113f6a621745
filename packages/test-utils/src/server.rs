use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cambio_sdk::rates::NestedRates;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Transaction as the mock API stores and returns it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredTransaction {
    pub id: i64,
    pub user_id: i64,
    pub data_transacao: DateTime<Utc>,
    pub tipo: String,
    pub moeda_origem: String,
    pub moeda_destino: String,
    pub valor_origem: f64,
    pub valor_destino: f64,
    pub taxa_cambio: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct MockUser {
    id: i64,
    email: String,
    password: String,
    name: String,
}

impl MockUser {
    fn to_json(&self) -> serde_json::Value {
        json!({ "id": self.id, "email": self.email, "nome": self.name })
    }
}

#[derive(Default)]
struct Inner {
    users: Vec<MockUser>,
    tokens: HashMap<String, i64>,
    rates: NestedRates,
    transactions: Vec<StoredTransaction>,
    next_user_id: i64,
    next_transaction_id: i64,
    next_token: u64,

    fail_rates: bool,
    fail_health: bool,
    fail_logout: bool,
    reject_all: bool,
    transactions_disabled: bool,
    rates_delay: Option<Duration>,
    health_delay: Option<Duration>,
    bad_gateway: bool,

    hits: HashMap<String, usize>,
    last_authorization: Option<String>,
    last_query: Vec<(String, String)>,
}

/// Shared, inspectable state behind the mock API
///
/// Tests flip failure switches and read request counters through this handle
/// while the server is running.
#[derive(Clone, Default)]
pub struct MockState {
    inner: Arc<Mutex<Inner>>,
}

pub fn default_rates() -> NestedRates {
    let mut rates = NestedRates::new();
    rates.insert(
        "USD".to_string(),
        BTreeMap::from([
            ("EUR".to_string(), 0.9),
            ("BRL".to_string(), 5.0),
            ("GBP".to_string(), 0.79),
        ]),
    );
    rates.insert(
        "EUR".to_string(),
        BTreeMap::from([("USD".to_string(), 1.1), ("BRL".to_string(), 5.5)]),
    );
    rates.insert(
        "BRL".to_string(),
        BTreeMap::from([("USD".to_string(), 0.2), ("EUR".to_string(), 0.18)]),
    );
    rates
}

impl MockState {
    pub fn new() -> Self {
        let state = Self::default();
        state.lock().rates = default_rates();
        state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Knobs =====

    pub fn set_rates(&self, rates: NestedRates) {
        self.lock().rates = rates;
    }

    pub fn fail_rates(&self, fail: bool) {
        self.lock().fail_rates = fail;
    }

    pub fn fail_health(&self, fail: bool) {
        self.lock().fail_health = fail;
    }

    pub fn fail_logout(&self, fail: bool) {
        self.lock().fail_logout = fail;
    }

    /// Answer every request with 401, as an expired token would
    pub fn reject_all(&self, reject: bool) {
        self.lock().reject_all = reject;
    }

    /// Make the transaction routes answer 503
    pub fn disable_transactions(&self, disabled: bool) {
        self.lock().transactions_disabled = disabled;
    }

    pub fn set_rates_delay(&self, delay: Option<Duration>) {
        self.lock().rates_delay = delay;
    }

    pub fn set_health_delay(&self, delay: Option<Duration>) {
        self.lock().health_delay = delay;
    }

    /// Answer the transaction routes with an HTML 502 page, as a proxy in
    /// front of a dead upstream would
    pub fn bad_gateway(&self, enabled: bool) {
        self.lock().bad_gateway = enabled;
    }

    // ===== Seeding =====

    pub fn add_user(&self, email: &str, password: &str, name: &str) -> i64 {
        let mut inner = self.lock();
        inner.next_user_id += 1;
        let id = inner.next_user_id;
        inner.users.push(MockUser {
            id,
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        });
        id
    }

    /// Issue a valid token for an existing user without going through login
    pub fn issue_token(&self, user_id: i64) -> String {
        let mut inner = self.lock();
        issue_token(&mut inner, user_id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn seed_transaction(
        &self,
        user_id: i64,
        timestamp: DateTime<Utc>,
        kind: &str,
        from: &str,
        to: &str,
        amount: f64,
        rate: f64,
        status: &str,
    ) -> i64 {
        let mut inner = self.lock();
        inner.next_transaction_id += 1;
        let id = inner.next_transaction_id;
        inner.transactions.push(StoredTransaction {
            id,
            user_id,
            data_transacao: timestamp,
            tipo: kind.to_string(),
            moeda_origem: from.to_string(),
            moeda_destino: to.to_string(),
            valor_origem: amount,
            valor_destino: amount * rate,
            taxa_cambio: rate,
            status: status.to_string(),
            created_at: timestamp,
        });
        id
    }

    // ===== Inspection =====

    /// Number of requests seen for a route, keyed like `"GET /taxas"`
    pub fn hits(&self, route: &str) -> usize {
        self.lock().hits.get(route).copied().unwrap_or(0)
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.lock().last_authorization.clone()
    }

    pub fn last_query(&self) -> Vec<(String, String)> {
        self.lock().last_query.clone()
    }

    pub fn transactions(&self) -> Vec<StoredTransaction> {
        self.lock().transactions.clone()
    }

    pub fn active_tokens(&self) -> usize {
        self.lock().tokens.len()
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<i64, Response> {
        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| plain_error(StatusCode::UNAUTHORIZED, "Token não fornecido"))?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| plain_error(StatusCode::UNAUTHORIZED, "Formato de token inválido"))?;
        self.lock()
            .tokens
            .get(token)
            .copied()
            .ok_or_else(|| plain_error(StatusCode::UNAUTHORIZED, "Token inválido ou expirado"))
    }
}

fn issue_token(inner: &mut Inner, user_id: i64) -> String {
    inner.next_token += 1;
    let token = format!("mock-token-{}-{}", user_id, inner.next_token);
    inner.tokens.insert(token.clone(), user_id);
    token
}

/// Error body in the style of Go's `http.Error`
fn plain_error(status: StatusCode, message: &str) -> Response {
    (status, format!("{}\n", message)).into_response()
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn bad_gateway_page() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        [(header::CONTENT_TYPE, "text/html")],
        "<html><body>502 Bad Gateway</body></html>",
    )
        .into_response()
}

/// Failure shared by both transaction routes, checked before authentication
fn transactions_unavailable(state: &MockState) -> Option<Response> {
    let inner = state.lock();
    if inner.bad_gateway {
        return Some(bad_gateway_page());
    }
    inner.transactions_disabled.then(|| {
        json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Serviço de transações não configurado",
        )
    })
}

async fn track(State(state): State<MockState>, request: Request, next: Next) -> Response {
    let route = format!(
        "{} {}",
        request.method(),
        request.uri().path().trim_start_matches("/api")
    );
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let reject = {
        let mut inner = state.lock();
        *inner.hits.entry(route).or_default() += 1;
        inner.last_authorization = authorization;
        inner.reject_all
    };

    if reject {
        return plain_error(StatusCode::UNAUTHORIZED, "Token inválido ou expirado");
    }
    next.run(request).await
}

async fn health(State(state): State<MockState>) -> Response {
    let (delay, response) = {
        let inner = state.lock();
        let response = if inner.fail_health {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        } else {
            Json(json!({ "status": "ok", "service": "cambio-api" })).into_response()
        };
        (inner.health_delay, response)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    response
}

/// The answer is decided on arrival and only then delayed, so a slow response
/// carries the rates that were current when it was requested
async fn rates(State(state): State<MockState>) -> Response {
    let (delay, response) = {
        let inner = state.lock();
        let response = if inner.fail_rates {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "falha ao buscar taxas")
        } else {
            Json(json!({ "taxas": inner.rates, "status": "success" })).into_response()
        };
        (inner.rates_delay, response)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    response
}

#[derive(Deserialize)]
struct RegisterBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    nome: String,
}

async fn register(State(state): State<MockState>, Json(body): Json<RegisterBody>) -> Response {
    if body.email.is_empty() || body.password.is_empty() || body.nome.is_empty() {
        return plain_error(StatusCode::BAD_REQUEST, "Email, senha e nome são obrigatórios");
    }
    if body.password.len() < 6 {
        return plain_error(
            StatusCode::BAD_REQUEST,
            "A senha deve ter no mínimo 6 caracteres",
        );
    }
    if state.lock().users.iter().any(|u| u.email == body.email) {
        return plain_error(StatusCode::CONFLICT, "Email já cadastrado");
    }

    let id = state.add_user(&body.email, &body.password, &body.nome);
    let user = json!({ "id": id, "email": body.email, "nome": body.nome });
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Usuário criado com sucesso", "user": user })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn login(State(state): State<MockState>, Json(body): Json<LoginBody>) -> Response {
    let mut inner = state.lock();
    let user = inner
        .users
        .iter()
        .find(|u| u.email == body.email && u.password == body.password)
        .cloned();

    match user {
        Some(user) => {
            let token = issue_token(&mut inner, user.id);
            Json(json!({ "token": token, "user": user.to_json() })).into_response()
        }
        None => plain_error(StatusCode::UNAUTHORIZED, "Email ou senha inválidos"),
    }
}

async fn logout(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = state.authenticate(&headers) {
        return rejection;
    }
    if state.lock().fail_logout {
        return plain_error(StatusCode::INTERNAL_SERVER_ERROR, "Erro ao fazer logout");
    }
    Json(json!({ "message": "Logout realizado com sucesso" })).into_response()
}

async fn me(State(state): State<MockState>, headers: HeaderMap) -> Response {
    let user_id = match state.authenticate(&headers) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };
    let inner = state.lock();
    match inner.users.iter().find(|u| u.id == user_id) {
        Some(user) => Json(user.to_json()).into_response(),
        None => plain_error(StatusCode::NOT_FOUND, "Usuário não encontrado"),
    }
}

async fn list_transactions(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    if let Some(response) = transactions_unavailable(&state) {
        return response;
    }
    let user_id = match state.authenticate(&headers) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };

    let param = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    };
    let date =
        |name: &str| param(name).and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok());
    let start = date("data_inicio");
    let end = date("data_fim");
    let kind = param("tipo");
    let from = param("moeda_origem");

    let mut inner = state.lock();
    inner.last_query = params.clone();

    let mut found: Vec<StoredTransaction> = inner
        .transactions
        .iter()
        .filter(|t| t.user_id == user_id)
        .filter(|t| start.is_none_or(|d| t.data_transacao.date_naive() >= d))
        .filter(|t| end.is_none_or(|d| t.data_transacao.date_naive() <= d))
        .filter(|t| kind.is_none_or(|k| t.tipo == k))
        .filter(|t| from.is_none_or(|c| t.moeda_origem == c))
        .cloned()
        .collect();
    found.sort_by(|a, b| b.data_transacao.cmp(&a.data_transacao));

    let total = found.len();
    // An empty result is encoded as null, like a nil slice
    let transactions = if found.is_empty() {
        serde_json::Value::Null
    } else {
        json!(found)
    };
    Json(json!({
        "transactions": transactions,
        "total": total,
        "limit": 100,
        "offset": 0
    }))
    .into_response()
}

#[derive(Deserialize)]
struct CreateTransactionBody {
    #[serde(default)]
    tipo: String,
    #[serde(default)]
    moeda_origem: String,
    #[serde(default)]
    moeda_destino: String,
    #[serde(default)]
    valor_origem: f64,
}

async fn create_transaction(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<CreateTransactionBody>,
) -> Response {
    if let Some(response) = transactions_unavailable(&state) {
        return response;
    }
    let user_id = match state.authenticate(&headers) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };

    if body.tipo != "Compra" && body.tipo != "Venda" {
        return json_error(StatusCode::BAD_REQUEST, "tipo deve ser 'Compra' ou 'Venda'");
    }
    if body.moeda_origem.is_empty() || body.moeda_destino.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "moedas são obrigatórias");
    }
    if body.valor_origem <= 0.0 {
        return json_error(StatusCode::BAD_REQUEST, "valor deve ser maior que zero");
    }

    let rate = state
        .lock()
        .rates
        .get(&body.moeda_origem)
        .and_then(|targets| targets.get(&body.moeda_destino))
        .copied();
    let Some(rate) = rate else {
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!(
                "Erro ao calcular conversão: taxa não encontrada para {}/{}",
                body.moeda_origem, body.moeda_destino
            ),
        );
    };

    let id = state.seed_transaction(
        user_id,
        Utc::now(),
        &body.tipo,
        &body.moeda_origem,
        &body.moeda_destino,
        body.valor_origem,
        rate,
        "Concluído",
    );
    let inner = state.lock();
    match inner.transactions.iter().find(|t| t.id == id) {
        Some(transaction) => (StatusCode::CREATED, Json(transaction.clone())).into_response(),
        None => json_error(StatusCode::INTERNAL_SERVER_ERROR, "Erro ao salvar transação"),
    }
}

pub fn router(state: MockState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/taxas", get(rates))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route(
            "/api/transacoes",
            get(list_transactions).post(create_transaction),
        )
        .layer(middleware::from_fn_with_state(state.clone(), track))
        .with_state(state)
}

/// Handle to a running mock API server
pub struct TestServer {
    pub base_url: String,
    pub state: MockState,
    _shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    /// Start the mock API on a random available port with default rates
    ///
    /// The server runs in the background and shuts down when dropped.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(MockState::new()).await
    }

    pub async fn start_with(state: MockState) -> anyhow::Result<Self> {
        let app = router(state.clone());

        // Bind to random available port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let base_url = format!("http://{}", addr);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await;
            if let Err(e) = result {
                tracing::error!("Mock API server failed: {}", e);
            }
        });

        Ok(Self {
            base_url,
            state,
            _shutdown_tx: shutdown_tx,
        })
    }

    /// Build full HTTP URL for a path under `/api`
    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }
}
