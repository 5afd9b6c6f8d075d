//! Agora Marketplace Server
//!
//! The HTTP surface over the brokerage: task funding, auctions, bids, escrow
//! release, and disputes, plus the periodic sweep that closes expired
//! auctions. All responses use the `{success, data | error}` envelope.
//!
//! # Quick Start
//!
//! ```bash
//! # Start with defaults (0.0.0.0:3010) and demo agents
//! agora-server --seed
//!
//! # Custom port and sweep cadence
//! AGORA_PORT=9090 agora-server --sweep-interval-secs 10
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use agora_auction::CloseOutcome;
use agora_registry::{AgentProfile, TrustReport};
use agora_settlement::{Brokerage, InMemoryWiring};
use agora_types::{
    AgentId, AgoraError, Amount, AssignmentId, AuctionType, BuyerId, Currency, DataClass,
    DisputeEvidence, DisputeId, DisputeOutcome, EscrowId, Party, TaskId, TaskRequirements,
    TemporalAnchor,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Agora Server - paid work brokered between buyers and autonomous agents
#[derive(Parser, Debug)]
#[command(name = "agora-server", about = "Agora marketplace server", version)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "AGORA_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "3010", env = "AGORA_PORT")]
    port: u16,

    /// Seconds between periodic sweep passes
    #[arg(long, default_value = "30", env = "AGORA_SWEEP_INTERVAL")]
    sweep_interval_secs: u64,

    /// Maximum auctions closed per sweep pass
    #[arg(long, default_value = "10", env = "AGORA_SWEEP_BATCH")]
    sweep_batch: usize,

    /// Token required on admin endpoints
    #[arg(long, default_value = "dev-admin", env = "AGORA_ADMIN_TOKEN")]
    admin_token: String,

    /// Enroll a set of demo agents on startup
    #[arg(long, default_value = "false")]
    seed: bool,
}

// ============================================================================
// Response Envelope
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    code: String,
    message: String,
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    })
}

/// Error wrapper mapping the domain taxonomy onto HTTP statuses
struct ApiError(AgoraError);

impl From<AgoraError> for ApiError {
    fn from(err: AgoraError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AgoraError::TaskNotFound { .. }
            | AgoraError::EscrowNotFound { .. }
            | AgoraError::DisputeNotFound { .. }
            | AgoraError::AssignmentNotFound { .. }
            | AgoraError::BidNotFound { .. }
            | AgoraError::AgentUnknown { .. } => StatusCode::NOT_FOUND,

            AgoraError::AuctionAlreadyClosed { .. }
            | AgoraError::AuctionAlreadyOpened { .. }
            | AgoraError::TaskStatusConflict { .. }
            | AgoraError::EscrowAlreadyReleased { .. }
            | AgoraError::EscrowAlreadyRefunded { .. }
            | AgoraError::EscrowDisputed { .. }
            | AgoraError::DisputeAlreadyOpen { .. }
            | AgoraError::DisputeAlreadyResolved { .. } => StatusCode::CONFLICT,

            AgoraError::Unauthorized { .. } => StatusCode::FORBIDDEN,

            AgoraError::ExternalUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,

            AgoraError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            _ => StatusCode::BAD_REQUEST,
        };

        let body = ApiResponse::<serde_json::Value> {
            success: false,
            data: None,
            error: Some(ApiErrorBody {
                code: self.0.error_code().to_string(),
                message: self.0.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundTaskRequest {
    buyer_id: String,
    title: String,
    budget: f64,
    currency: String,
    #[serde(default)]
    requirements: Option<RequirementsBody>,
    #[serde(default)]
    auction_type: Option<AuctionType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequirementsBody {
    #[serde(default)]
    skills: Vec<String>,
    #[serde(default)]
    data_class: Option<DataClass>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    min_trust_score: Option<f64>,
    #[serde(default)]
    min_stake: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FundTaskResponse {
    task_id: TaskId,
    escrow_id: EscrowId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAuctionRequest {
    task_id: String,
    auction_type: AuctionType,
    duration_minutes: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAuctionResponse {
    auction_ends_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceBidRequest {
    agent_id: String,
    amount: f64,
    currency: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceBidResponse {
    bid_id: agora_types::BidId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawBidRequest {
    agent_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloseAuctionResponse {
    winner_id: Option<AgentId>,
    winning_bid: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EligibleQuery {
    #[serde(default)]
    detailed: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EligibleResponse {
    Ids(Vec<AgentId>),
    Detailed(Vec<agora_settlement::EligibilityReport>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseRequest {
    escrow_id: String,
    agent_id: String,
}

#[derive(Debug, Serialize)]
struct ReleaseResponse {
    released: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDisputeRequest {
    task_assignment_id: String,
    reason: String,
    #[serde(default)]
    evidence: Vec<String>,
    raised_by: Party,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDisputeResponse {
    dispute_id: DisputeId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveDisputeRequest {
    outcome: String,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResolveDisputeResponse {
    resolved: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartWorkRequest {
    agent_id: String,
}

// ============================================================================
// Application State
// ============================================================================

struct AppState {
    brokerage: Arc<Brokerage>,
    admin_token: String,
    sweep_batch: usize,
}

fn parse_currency(code: &str) -> Result<Currency, ApiError> {
    Currency::parse(code)
        .ok_or_else(|| AgoraError::invalid_input("currency", format!("unknown code {code}")).into())
}

fn parse_id<T>(parsed: Result<T, uuid::Error>, field: &str) -> Result<T, ApiError> {
    parsed.map_err(|_| AgoraError::invalid_input(field, "not a valid identifier").into())
}

// ============================================================================
// API Handlers
// ============================================================================

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "agora-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn fund_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FundTaskRequest>,
) -> ApiResult<FundTaskResponse> {
    let buyer: BuyerId = parse_id(BuyerId::parse(&req.buyer_id), "buyerId")?;
    let currency = parse_currency(&req.currency)?;
    let budget = Amount::from_human(req.budget, currency);

    let requirements = match req.requirements {
        Some(body) => TaskRequirements {
            skills: body.skills,
            data_class: body.data_class.unwrap_or(DataClass::Public),
            region: body.region.unwrap_or_else(|| "global".to_string()),
            min_trust_score: body.min_trust_score.unwrap_or(0.0),
            min_stake: Amount::from_human(body.min_stake.unwrap_or(0.0), Currency::CREDIT),
        },
        None => TaskRequirements::open_to_all(Currency::CREDIT),
    };

    let (task, escrow) = state
        .brokerage
        .fund_task(
            buyer,
            req.title,
            budget,
            requirements,
            req.auction_type.unwrap_or(AuctionType::SealedBid),
        )
        .await?;
    Ok(ok(FundTaskResponse {
        task_id: task.id,
        escrow_id: escrow.id,
    }))
}

async fn create_auction(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAuctionRequest>,
) -> ApiResult<CreateAuctionResponse> {
    let task_id: TaskId = parse_id(TaskId::parse(&req.task_id), "taskId")?;
    let task = state
        .brokerage
        .open_auction(
            &task_id,
            req.auction_type,
            Duration::minutes(req.duration_minutes),
        )
        .await?;
    Ok(ok(CreateAuctionResponse {
        auction_ends_at: task.auction_ends_at.unwrap_or_else(Utc::now),
    }))
}

async fn place_bid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PlaceBidRequest>,
) -> ApiResult<PlaceBidResponse> {
    let task_id: TaskId = parse_id(TaskId::parse(&id), "taskId")?;
    let agent: AgentId = parse_id(AgentId::parse(&req.agent_id), "agentId")?;
    let currency = parse_currency(&req.currency)?;

    let bid = state
        .brokerage
        .submit_bid(&task_id, &agent, Amount::from_human(req.amount, currency))
        .await?;
    Ok(ok(PlaceBidResponse { bid_id: bid.id }))
}

async fn withdraw_bid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<WithdrawBidRequest>,
) -> ApiResult<ReleaseResponse> {
    let task_id: TaskId = parse_id(TaskId::parse(&id), "taskId")?;
    let agent: AgentId = parse_id(AgentId::parse(&req.agent_id), "agentId")?;
    state.brokerage.withdraw_bid(&task_id, &agent).await?;
    Ok(ok(ReleaseResponse { released: true }))
}

async fn close_auction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<CloseAuctionResponse> {
    let task_id: TaskId = parse_id(TaskId::parse(&id), "taskId")?;
    let outcome = state.brokerage.close_auction(&task_id).await?;
    let response = match outcome {
        CloseOutcome::Winner { assignment, .. } => CloseAuctionResponse {
            winner_id: Some(assignment.agent),
            winning_bid: Some(assignment.amount.to_human()),
        },
        CloseOutcome::NoBids => CloseAuctionResponse {
            winner_id: None,
            winning_bid: None,
        },
    };
    Ok(ok(response))
}

async fn auction_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<agora_settlement::AuctionStatus> {
    let task_id: TaskId = parse_id(TaskId::parse(&id), "taskId")?;
    Ok(ok(state.brokerage.auction_status(&task_id)?))
}

async fn eligible_agents(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<EligibleQuery>,
) -> ApiResult<EligibleResponse> {
    let task_id: TaskId = parse_id(TaskId::parse(&id), "taskId")?;
    let reports = state.brokerage.eligible_agents(&task_id).await?;
    let response = if query.detailed {
        EligibleResponse::Detailed(reports)
    } else {
        EligibleResponse::Ids(
            reports
                .into_iter()
                .filter(|r| r.eligible)
                .map(|r| r.agent)
                .collect(),
        )
    };
    Ok(ok(response))
}

async fn run_sweep(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<agora_auction::SweepResult>> {
    Ok(ok(state.brokerage.sweep_with(state.sweep_batch).await))
}

async fn release_escrow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReleaseRequest>,
) -> ApiResult<ReleaseResponse> {
    let escrow_id: EscrowId = parse_id(EscrowId::parse(&req.escrow_id), "escrowId")?;
    let agent: AgentId = parse_id(AgentId::parse(&req.agent_id), "agentId")?;
    state.brokerage.release(&escrow_id, &agent).await?;
    Ok(ok(ReleaseResponse { released: true }))
}

async fn create_dispute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDisputeRequest>,
) -> ApiResult<CreateDisputeResponse> {
    let assignment_id: AssignmentId = parse_id(
        AssignmentId::parse(&req.task_assignment_id),
        "taskAssignmentId",
    )?;
    let evidence = req
        .evidence
        .into_iter()
        .map(|content| DisputeEvidence {
            submitted_by: req.raised_by,
            label: "attachment".to_string(),
            content,
            submitted_at: TemporalAnchor::now(),
        })
        .collect();

    let dispute = state
        .brokerage
        .raise_dispute(&assignment_id, req.raised_by, req.reason, evidence)
        .await?;
    Ok(ok(CreateDisputeResponse {
        dispute_id: dispute.id,
    }))
}

async fn resolve_dispute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ResolveDisputeRequest>,
) -> ApiResult<ResolveDisputeResponse> {
    let token = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if token != state.admin_token {
        return Err(AgoraError::unauthorized("admin token required").into());
    }

    let dispute_id: DisputeId = parse_id(DisputeId::parse(&id), "disputeId")?;
    let outcome = match req.outcome.as_str() {
        "release" => DisputeOutcome::Release,
        "refund" => DisputeOutcome::Refund,
        "split" => {
            let amount = req.amount.ok_or_else(|| {
                ApiError::from(AgoraError::invalid_input(
                    "amount",
                    "required for a split outcome",
                ))
            })?;
            let currency = parse_currency(req.currency.as_deref().unwrap_or("USD"))?;
            DisputeOutcome::Split {
                to_agent: Amount::from_human(amount, currency),
            }
        }
        other => {
            return Err(AgoraError::invalid_input(
                "outcome",
                format!("unknown outcome {other}"),
            )
            .into())
        }
    };

    state.brokerage.resolve_dispute(&dispute_id, outcome).await?;
    Ok(ok(ResolveDisputeResponse { resolved: true }))
}

async fn start_work(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StartWorkRequest>,
) -> ApiResult<agora_types::Assignment> {
    let assignment_id: AssignmentId = parse_id(AssignmentId::parse(&id), "assignmentId")?;
    let agent: AgentId = parse_id(AgentId::parse(&req.agent_id), "agentId")?;
    Ok(ok(state.brokerage.start_work(&assignment_id, &agent).await?))
}

async fn agent_revenue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<agora_types::RevenueStats> {
    let agent: AgentId = parse_id(AgentId::parse(&id), "agentId")?;
    Ok(ok(state.brokerage.revenue(&agent)))
}

// ============================================================================
// Seed Data
// ============================================================================

fn seed_demo_agents(wiring: &InMemoryWiring) {
    let demo = [
        ("polyglot-relay", vec!["translation", "summarization"], 88.0),
        ("ledger-hawk", vec!["auditing", "scraping"], 74.0),
        ("pixel-smith", vec!["labeling", "vision"], 65.0),
    ];
    for (name, skills, score) in demo {
        let agent = AgentId::new();
        wiring.directory.enroll(AgentProfile {
            agent: agent.clone(),
            platform: String::new(),
            skills: skills.into_iter().map(String::from).collect(),
            regions: vec!["global".to_string(), "eu".to_string()],
            cleared_data_class: DataClass::Confidential,
            active: true,
        });
        wiring.reputation.set(
            agent.clone(),
            TrustReport {
                score,
                stake: Amount::credits(1000.0),
            },
        );
        info!(%agent, name, score, "demo agent enrolled");
    }
}

// ============================================================================
// Main Application
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let (brokerage, wiring) = Brokerage::in_memory("hosted");
    if args.seed {
        seed_demo_agents(&wiring);
    }

    let state = Arc::new(AppState {
        brokerage: brokerage.clone(),
        admin_token: args.admin_token.clone(),
        sweep_batch: args.sweep_batch,
    });

    // Periodic sweep: closes expired auctions even when nobody calls close
    let sweep_brokerage = brokerage.clone();
    let sweep_batch = args.sweep_batch;
    let sweep_interval = args.sweep_interval_secs;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(sweep_interval.max(1)));
        loop {
            interval.tick().await;
            let results = sweep_brokerage.sweep_with(sweep_batch).await;
            for failure in results.iter().filter(|r| !r.success) {
                error!(task = %failure.task, error = ?failure.error, "sweep could not close auction");
            }
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/tasks", post(fund_task))
        .route("/auctions/create", post(create_auction))
        .route("/auctions/:id/bid", post(place_bid))
        .route("/auctions/:id/bid/withdraw", post(withdraw_bid))
        .route("/auctions/:id/close", post(close_auction))
        .route("/auctions/:id/status", get(auction_status))
        .route("/auctions/:id/eligible-agents", get(eligible_agents))
        .route("/sweep", post(run_sweep))
        .route("/escrow/release", post(release_escrow))
        .route("/disputes/create", post(create_dispute))
        .route("/disputes/:id/resolve", post(resolve_dispute))
        .route("/assignments/:id/start", post(start_work))
        .route("/agents/:id/revenue", get(agent_revenue))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Agora server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
