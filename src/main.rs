use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use meshhub_client::client::agents::AGENT_UNAVAILABLE_MESSAGE;
use meshhub_client::constants::{COMPLIANCE_AUDIT_KIND, DEMO_AGENT};
use meshhub_client::{
    build_state_from_config, load_or_init_config, ApiResponse, ClientState, FileKvStore,
};

#[derive(Debug, Parser)]
#[command(name = "meshhub", version, about = "MeshHubOS Lite command-line client")]
struct Cli {
    /// Client configuration file; written with defaults when missing.
    #[arg(long, global = true, default_value = "user-data/config.toml")]
    config: PathBuf,

    /// Durable storage for the quota counter and chat thread.
    #[arg(long, global = true, default_value = "user-data/client-storage.json")]
    storage: PathBuf,

    /// Overrides `api_base` from the config file.
    #[arg(long, global = true, env = "MESHHUB_API_BASE")]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe backend liveness.
    Health,
    /// Invoke an agent.
    Invoke {
        #[arg(long, default_value = DEMO_AGENT)]
        agent: String,
        /// Agent input as JSON; a bare string is sent as `{"prompt": ...}`.
        #[arg(long, default_value = "Hello MeshHubOS Lite")]
        input: String,
    },
    /// Ask the prediction model. `--input` is JSON; anything else is sent as a string.
    Predict {
        #[arg(long)]
        input: String,
    },
    /// Submit the contact form.
    Contact {
        /// Form field, `key=value`. Repeatable.
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },
    /// Place an order.
    Order {
        /// Form field, `key=value`. Repeatable.
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },
    /// Run a compliance audit and wait for its result.
    Audit {
        /// Form field, `key=value`. Repeatable.
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
        /// Print live task events while waiting.
        #[arg(long)]
        watch: bool,
    },
    /// Ask the compliance assistant a question.
    Ask { message: String },
    /// Forget the current chat thread.
    ClearChat,
    /// Show today's free question allowance.
    Quota,
}

fn parse_fields(fields: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for f in fields {
        let (k, v) = f
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid --field {f:?}, expected KEY=VALUE"))?;
        let k = k.trim();
        if k.is_empty() {
            return Err(anyhow!("invalid --field {f:?}, empty key"));
        }
        out.insert(k.to_string(), v.to_string());
    }
    Ok(out)
}

fn parse_agent_input(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| json!({ "prompt": raw }))
}

fn response_json(resp: ApiResponse) -> Value {
    match resp {
        ApiResponse::Json(v) => v,
        ApiResponse::Text(t) => json!({ "text": t }),
    }
}

fn print_json(v: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

async fn run_audit(
    state: &ClientState,
    fields: &[String],
    watch: bool,
) -> anyhow::Result<Value> {
    let form = parse_fields(fields)?;
    let id = state.tasks.submit(COMPLIANCE_AUDIT_KIND, &form).await?;
    // Submission leaves a live token cached, which the stream reuses.
    let _stream = if watch {
        state.events.subscribe(&id, |event| {
            eprintln!("event: {event}");
        })
    } else {
        None
    };
    let task = state.tasks.await_task(&id, state.tasks.options()).await?;
    Ok(serde_json::to_value(task)?)
}

async fn run(cli: Cli) -> anyhow::Result<Value> {
    let mut cfg = load_or_init_config(&cli.config)?;
    if let Some(base) = cli.api_base {
        cfg = cfg.with_api_base(base);
    }
    let store = FileKvStore::new(cli.storage.clone());
    let state = build_state_from_config(cfg, std::sync::Arc::new(store))?;

    match cli.command {
        Command::Health => {
            let status = state.api.health().await;
            Ok(match status {
                meshhub_client::HealthStatus::Up(body) => json!({ "status": "UP", "body": body }),
                meshhub_client::HealthStatus::Down => json!({ "status": "DOWN" }),
            })
        }
        Command::Invoke { agent, input } => {
            let input = parse_agent_input(&input);
            match state.agents.invoke(&agent, input).await {
                Ok(out) => Ok(serde_json::to_value(out)?),
                Err(e) => {
                    log::warn!("agent {agent} invocation failed: {e}");
                    Err(anyhow!(AGENT_UNAVAILABLE_MESSAGE))
                }
            }
        }
        Command::Predict { input } => {
            let input = serde_json::from_str(&input).unwrap_or(Value::String(input));
            Ok(response_json(state.site.predict(input).await?))
        }
        Command::Contact { fields } => {
            let payload = serde_json::to_value(parse_fields(&fields)?)?;
            Ok(response_json(state.site.contact(&payload).await?))
        }
        Command::Order { fields } => {
            let payload = serde_json::to_value(parse_fields(&fields)?)?;
            Ok(response_json(state.site.order(&payload).await?))
        }
        Command::Audit { fields, watch } => run_audit(&state, &fields, watch).await,
        Command::Ask { message } => match state.chat.ask(&message).await {
            Ok(reply) => {
                let mut out = serde_json::to_value(reply)?;
                out["counter"] = json!(state.quota.counter_label());
                Ok(out)
            }
            Err(e) if e.is_quota_exceeded() => Err(anyhow!(
                "{e}. Upgrade to keep asking today ({} free questions per day).",
                state.quota.daily_limit()
            )),
            Err(e) => Err(e).context("chat request failed"),
        },
        Command::ClearChat => {
            state.chat.clear();
            Ok(json!({ "cleared": true, "counter": state.quota.counter_label() }))
        }
        Command::Quota => {
            let record = state.quota.record();
            Ok(json!({
                "day": record.day,
                "used": record.used,
                "limit": state.quota.daily_limit(),
                "remaining": state.quota.remaining(),
                "thread_id": state.quota.get_thread(),
                "counter": state.quota.counter_label(),
            }))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match run(cli).await.and_then(|v| print_json(&v)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
