//! mentorpay — admin CLI for the mentor payout backend
//!
//! # Subcommands
//! - `signin`                          — verify credentials against the backend
//! - `status`                          — backend reachability probe
//! - `sessions [--page] [--size] [--status] [--mentor]` — paged session list
//! - `mentors`                         — mentor roster with bank readiness
//! - `payments`                        — payment history
//! - `approve --session <id>` / `reject --session <id>` — session review
//! - `payment-status --payment <id> --status <s>` — manual payment override
//! - `create-session --mentor <id> ...`   — record a session for a mentor
//! - `update-bank --user <id> ...`        — edit a mentor's bank details
//! - `pay --mentor <id> --sessions <ids>` — create a payout for approved sessions
//! - `confirm --payment <id> --txn <id>`  — finalize a created payment
//! - `report [--months <n>]`           — monthly payout totals and fee breakdown
//! - `watch`                           — reconcile on the configured interval
//!
//! Credentials come from `MENTORPAY_USERNAME` / `MENTORPAY_PASSWORD`
//! (a local `.env` file is honored).

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use mentorpay_client::gateway::decode_entity;
use mentorpay_client::payment::{generate_receipt, send_receipt};
use mentorpay_client::refresh::{fetch_mentors, fetch_payments, fetch_sessions};
use mentorpay_client::{
    run_refresh_loop, AdminActions, ApiClient, AuthSession, ListController, NewSession,
    PaymentFlow, Reconciler, RefreshTrigger, TokenStore,
};
use mentorpay_core::aggregate::{fee_breakdown, monthly_buckets, top_earners};
use mentorpay_core::models::{Payment, PaymentStatus, Session, User};
use mentorpay_core::MentorpayConfig;

const DEFAULT_CONFIG: &str = "mentorpay.toml";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "mentorpay",
    version,
    about = "Admin frontend for the mentor payout backend"
)]
struct Cli {
    /// Config file path
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: String,

    /// Backend base URL (overrides the config file)
    #[arg(long, env = "MENTORPAY_SERVER")]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Verify credentials and print the signed-in profile
    Signin,

    /// Probe backend reachability
    Status,

    /// List sessions, paged
    Sessions {
        #[arg(long, default_value_t = 0)]
        page: usize,

        /// Page size; falls back to the configured default
        #[arg(long)]
        size: Option<usize>,

        /// Filter by status (PENDING, APPROVED, PAID, REJECTED)
        #[arg(long)]
        status: Option<String>,

        /// Filter by mentor id
        #[arg(long)]
        mentor: Option<i64>,
    },

    /// List mentors with bank-detail readiness
    Mentors,

    /// Approve a pending session
    Approve {
        #[arg(long)]
        session: i64,
    },

    /// Reject a pending session
    Reject {
        #[arg(long)]
        session: i64,
    },

    /// Manually override a payment's status
    PaymentStatus {
        #[arg(long)]
        payment: i64,

        /// Target status (PENDING, COMPLETED, FAILED, CANCELLED)
        #[arg(long)]
        status: String,
    },

    /// Record a session on a mentor's behalf
    CreateSession {
        #[arg(long)]
        mentor: i64,

        #[arg(long, default_value = "ONE_ON_ONE")]
        session_type: String,

        /// Duration in minutes
        #[arg(long)]
        duration: i64,

        /// Hourly rate, e.g. 1500.00
        #[arg(long)]
        rate: String,

        /// Session start, e.g. 2024-07-01T10:00:00
        #[arg(long)]
        at: String,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Update a mentor's bank details (only the provided fields change)
    UpdateBank {
        #[arg(long)]
        user: i64,

        #[arg(long)]
        bank_name: Option<String>,

        #[arg(long)]
        account_number: Option<String>,

        #[arg(long)]
        account_holder: Option<String>,

        #[arg(long)]
        ifsc: Option<String>,
    },

    /// List payments
    Payments,

    /// Create a payout for a mentor's approved sessions
    Pay {
        #[arg(long)]
        mentor: i64,

        /// Session ids to pay, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        sessions: Vec<i64>,
    },

    /// Finalize a created payment with the provider transaction id
    Confirm {
        #[arg(long)]
        payment: i64,

        /// Provider transaction id (paymentIntentId)
        #[arg(long)]
        txn: String,

        /// Also generate and email the receipt after confirmation
        #[arg(long)]
        receipt: bool,
    },

    /// Monthly payout totals, fee breakdown and top earners
    Report {
        #[arg(long, default_value_t = 6)]
        months: usize,
    },

    /// Keep reconciling on the configured interval, printing a summary per
    /// cycle, until interrupted
    Watch,
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn signed_in(config: &MentorpayConfig) -> anyhow::Result<AuthSession> {
    let client = Arc::new(ApiClient::new(&config.api, TokenStore::new())?);
    let auth = AuthSession::new(client);

    let username = std::env::var("MENTORPAY_USERNAME")
        .context("MENTORPAY_USERNAME is not set (put it in .env or the environment)")?;
    let password = std::env::var("MENTORPAY_PASSWORD")
        .context("MENTORPAY_PASSWORD is not set (put it in .env or the environment)")?;

    auth.sign_in(&username, &password)
        .await
        .context("sign-in failed")?;
    Ok(auth)
}

async fn do_signin(config: &MentorpayConfig) -> anyhow::Result<()> {
    let auth = signed_in(config).await?;
    let profile = auth
        .client()
        .tokens()
        .profile()
        .context("backend returned no profile")?;
    println!("Signed in as {} (id {})", profile.display_name(), profile.id);
    Ok(())
}

async fn do_status(config: &MentorpayConfig) -> anyhow::Result<()> {
    let client = ApiClient::new(&config.api, TokenStore::new())?;
    match client.probe().await {
        Ok(()) => {
            println!("Backend reachable at {}", config.api.base_url);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, url = %config.api.base_url, "backend unreachable");
            std::process::exit(1);
        }
    }
}

async fn do_sessions(
    config: &MentorpayConfig,
    page: usize,
    size: Option<usize>,
    status: Option<String>,
    mentor: Option<i64>,
) -> anyhow::Result<()> {
    let auth = signed_in(config).await?;
    let size = size.unwrap_or(config.paging.default_size);

    let mut controller: ListController<Session> =
        ListController::new(auth, "/api/sessions", size);
    controller.set_page(page);
    controller.query_mut().status = status;
    controller.query_mut().mentor_id = mentor;

    let result = controller.load_current().await;
    println!(
        "Page {}/{} ({} sessions total)",
        result.page + 1,
        result.total_pages.max(1),
        result.total_items
    );
    for s in &result.items {
        println!(
            "  #{:<5} {:20} {:>8} min  {:>12}  {:10} {}",
            s.id,
            s.mentor.display_name(),
            s.duration_minutes().to_string(),
            s.final_payout_amount
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".into()),
            s.status.as_str(),
            s.session_date_time
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn do_mentors(config: &MentorpayConfig) -> anyhow::Result<()> {
    let auth = signed_in(config).await?;
    let mentors = auth
        .with_auth_retry(|| {
            let client = auth.client().clone();
            async move { fetch_mentors(&client).await }
        })
        .await?;

    for m in &mentors {
        let bank = if m.has_complete_bank_details() {
            "bank details complete".to_string()
        } else {
            format!("missing: {}", m.missing_bank_fields().join(", "))
        };
        println!("  #{:<5} {:24} {}", m.id, m.display_name(), bank);
    }
    println!("{} mentors", mentors.len());
    Ok(())
}

async fn do_session_review(
    config: &MentorpayConfig,
    session: i64,
    approve: bool,
) -> anyhow::Result<()> {
    let auth = signed_in(config).await?;
    let actions = AdminActions::new(auth, RefreshTrigger::new());
    let updated = if approve {
        actions.approve_session(session).await?
    } else {
        actions.reject_session(session).await?
    };
    println!(
        "Session #{} ({}) is now {}",
        updated.id,
        updated.mentor.display_name(),
        updated.status.as_str()
    );
    Ok(())
}

async fn do_payment_status(
    config: &MentorpayConfig,
    payment: i64,
    status: String,
) -> anyhow::Result<()> {
    let status: PaymentStatus = status.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let auth = signed_in(config).await?;
    let actions = AdminActions::new(auth, RefreshTrigger::new());
    let updated = actions.update_payment_status(payment, status).await?;
    println!("Payment #{} is now {}", updated.id, updated.status.as_str());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn do_create_session(
    config: &MentorpayConfig,
    mentor: i64,
    session_type: String,
    duration: i64,
    rate: String,
    at: String,
    notes: Option<String>,
) -> anyhow::Result<()> {
    let input = NewSession {
        mentor_id: mentor,
        session_type,
        duration_minutes: duration,
        hourly_rate: rate
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid --rate: {}", e))?,
        session_date_time: at
            .parse()
            .context("invalid --at (expected e.g. 2024-07-01T10:00:00)")?,
        notes,
    };
    let auth = signed_in(config).await?;
    let actions = AdminActions::new(auth, RefreshTrigger::new());
    let created = actions.create_session(&input).await?;
    println!(
        "Session #{} recorded for {} ({} min at {})",
        created.id,
        created.mentor.display_name(),
        created.duration_minutes(),
        created.hourly_rate
    );
    Ok(())
}

async fn do_update_bank(
    config: &MentorpayConfig,
    user_id: i64,
    bank_name: Option<String>,
    account_number: Option<String>,
    account_holder: Option<String>,
    ifsc: Option<String>,
) -> anyhow::Result<()> {
    let auth = signed_in(config).await?;

    let client = auth.client().clone();
    let path = format!("/api/users/{}", user_id);
    let value = auth
        .with_auth_retry(|| {
            let client = client.clone();
            let path = path.clone();
            async move { client.get(&path).await }
        })
        .await?;
    let mut profile: User = decode_entity(value, "user profile")?;

    if let Some(v) = bank_name {
        profile.bank_name = Some(v);
    }
    if let Some(v) = account_number {
        profile.account_number = Some(v);
    }
    if let Some(v) = account_holder {
        profile.account_holder_name = Some(v);
    }
    if let Some(v) = ifsc {
        profile.ifsc_code = Some(v);
    }

    let actions = AdminActions::new(auth, RefreshTrigger::new());
    let updated = actions.update_profile(&profile).await?;
    if updated.has_complete_bank_details() {
        println!("Bank details for {} are complete", updated.display_name());
    } else {
        println!(
            "Saved; still missing: {}",
            updated.missing_bank_fields().join(", ")
        );
    }
    Ok(())
}

async fn do_payments(config: &MentorpayConfig) -> anyhow::Result<()> {
    let auth = signed_in(config).await?;
    let fetch_size = config.paging.fetch_size;
    let payments = auth
        .with_auth_retry(|| {
            let client = auth.client().clone();
            async move { fetch_payments(&client, fetch_size).await }
        })
        .await?;

    for p in &payments {
        println!(
            "  #{:<5} {:20} {:>12}  {:10} {}  {}",
            p.id,
            p.mentor.display_name(),
            p.total_amount.to_string(),
            p.status.as_str(),
            p.payment_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".into()),
            p.session_summary()
        );
    }
    println!("{} payments", payments.len());
    Ok(())
}

async fn do_pay(
    config: &MentorpayConfig,
    mentor: i64,
    sessions: Vec<i64>,
) -> anyhow::Result<()> {
    let auth = signed_in(config).await?;
    let mentors = auth
        .with_auth_retry(|| {
            let client = auth.client().clone();
            async move { fetch_mentors(&client).await }
        })
        .await?;

    let mut flow = PaymentFlow::new(auth, RefreshTrigger::new());
    flow.set_mentor_list(mentors);
    flow.select_mentor(mentor).await?;
    flow.select_sessions(sessions)?;

    let created = flow.submit().await?;
    println!(
        "Payment #{} created, total {}",
        created.payment_id, created.total
    );
    match created.client_secret {
        Some(secret) => {
            println!("Provider confirmation required; client secret: {}", secret);
            println!(
                "Complete the card step, then run: mentorpay confirm --payment {} --txn <paymentIntentId>",
                created.payment_id
            );
        }
        None => println!(
            "No provider step required; run: mentorpay confirm --payment {} --txn <paymentIntentId>",
            created.payment_id
        ),
    }
    Ok(())
}

async fn do_confirm(
    config: &MentorpayConfig,
    payment: i64,
    txn: String,
    receipt: bool,
) -> anyhow::Result<()> {
    let auth = signed_in(config).await?;
    let mut flow = PaymentFlow::new(auth.clone(), RefreshTrigger::new());
    flow.resume(payment);
    flow.confirm_payment(&txn).await?;
    println!("Payment #{} confirmed", payment);

    if receipt {
        match generate_receipt(&auth, payment).await? {
            Some(url) => println!("Receipt generated: {}", url),
            None => println!("Receipt generated"),
        }
        send_receipt(&auth, payment).await?;
        println!("Receipt emailed to the mentor");
    }
    Ok(())
}

async fn do_report(config: &MentorpayConfig, months: usize) -> anyhow::Result<()> {
    let auth = signed_in(config).await?;
    let fetch_size = config.paging.fetch_size;

    let client = auth.client().clone();
    let sessions = auth.with_auth_retry(|| {
        let client = client.clone();
        async move { fetch_sessions(&client, fetch_size).await }
    });
    let payments = auth.with_auth_retry(|| {
        let client = client.clone();
        async move { fetch_payments(&client, fetch_size).await }
    });
    let (sessions, payments) = tokio::join!(sessions, payments);
    let (sessions, payments) = (sessions?, payments?);

    let today = chrono::Local::now().date_naive();
    let session_months = monthly_buckets(
        &sessions,
        |s: &Session| s.session_date_time,
        |s: &Session| s.final_payout_amount.unwrap_or_default(),
        months,
        today,
    );
    let payment_months = monthly_buckets(
        &payments,
        |p: &Payment| p.payment_date,
        |p: &Payment| p.total_amount,
        months,
        today,
    );

    println!("Month      Sessions    Session total    Payments    Paid total");
    for (s, p) in session_months.iter().zip(&payment_months) {
        println!(
            "{:8} {:>10} {:>16} {:>11} {:>13}",
            s.label, s.count, s.total, p.count, p.total
        );
    }

    let fees = fee_breakdown(&payments);
    println!();
    println!("GST collected:     {}", fees.total_gst);
    println!("Platform fees:     {}", fees.total_platform_fee);
    println!("Net paid out:      {}", fees.net_total);

    let earners = top_earners(&payments, 5);
    if !earners.is_empty() {
        println!();
        println!("Top earners:");
        for e in earners {
            println!("  {:24} {:>12}", e.name, e.total);
        }
    }
    Ok(())
}

async fn do_watch(config: &MentorpayConfig) -> anyhow::Result<()> {
    let auth = signed_in(config).await?;
    let reconciler = Reconciler::new(auth, config.paging.fetch_size);

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let loop_handle = tokio::spawn(run_refresh_loop(
        reconciler.clone(),
        config.refresh.interval_seconds,
        shutdown_rx,
    ));

    println!(
        "Reconciling every {}s; Ctrl-C to stop",
        config.refresh.interval_seconds
    );
    let mut last_seen = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {
                let count = {
                    let state = reconciler.state().read().unwrap_or_else(|e| e.into_inner());
                    if state.refresh_count == last_seen {
                        None
                    } else {
                        last_seen = state.refresh_count;
                        Some((state.sessions.len(), state.payments.len(), state.mentors.len()))
                    }
                };
                if let Some((sessions, payments, mentors)) = count {
                    println!(
                        "[{}] {} sessions, {} payments, {} mentors",
                        chrono::Local::now().format("%H:%M:%S"),
                        sessions, payments, mentors
                    );
                }
            }
        }
    }

    shutdown_tx.send(()).ok();
    loop_handle.await.ok();
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn load_config(path: &str, server_override: Option<String>) -> anyhow::Result<MentorpayConfig> {
    let mut config = if std::path::Path::new(path).exists() {
        MentorpayConfig::load(path).with_context(|| format!("failed to load {}", path))?
    } else if path == DEFAULT_CONFIG {
        MentorpayConfig::default()
    } else {
        anyhow::bail!("config file not found: {}", path);
    };
    if let Some(server) = server_override {
        config.api.base_url = server.trim_end_matches('/').to_string();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(&cli.config, cli.server)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Signin => do_signin(&config).await,
        Commands::Status => do_status(&config).await,
        Commands::Sessions { page, size, status, mentor } => {
            do_sessions(&config, page, size, status, mentor).await
        }
        Commands::Mentors => do_mentors(&config).await,
        Commands::Approve { session } => do_session_review(&config, session, true).await,
        Commands::Reject { session } => do_session_review(&config, session, false).await,
        Commands::PaymentStatus { payment, status } => {
            do_payment_status(&config, payment, status).await
        }
        Commands::CreateSession { mentor, session_type, duration, rate, at, notes } => {
            do_create_session(&config, mentor, session_type, duration, rate, at, notes).await
        }
        Commands::UpdateBank { user, bank_name, account_number, account_holder, ifsc } => {
            do_update_bank(&config, user, bank_name, account_number, account_holder, ifsc).await
        }
        Commands::Payments => do_payments(&config).await,
        Commands::Pay { mentor, sessions } => do_pay(&config, mentor, sessions).await,
        Commands::Confirm { payment, txn, receipt } => {
            do_confirm(&config, payment, txn, receipt).await
        }
        Commands::Report { months } => do_report(&config, months).await,
        Commands::Watch => do_watch(&config).await,
    }
}
