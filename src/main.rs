use std::{process, time::Duration};

use stampede::{
    cache::{CacheError, CacheWarmer, IdPrefix, KeyPrefix, NULL_MARKER},
    config::{self, Command, GetArgs, InspectIdArgs, InvalidateArgs, NextIdArgs, WarmArgs},
    error::AppError,
    id::IdComponents,
    infra::{runtime::Runtime, telemetry},
};
use time::format_description::well_known::Rfc3339;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    // inspect-id is pure arithmetic; skip connecting to the store
    if let Command::InspectId(args) = &cli_args.command {
        return run_inspect_id(args);
    }

    let runtime = Runtime::start(&settings).await?;
    let result = match cli_args.command {
        Command::NextId(args) => run_next_id(&runtime, args).await,
        Command::Get(args) => run_get(&runtime, args).await,
        Command::Warm(args) => run_warm(&runtime, args).await,
        Command::Invalidate(args) => run_invalidate(&runtime, args).await,
        Command::InspectId(args) => run_inspect_id(&args),
    };
    runtime.shutdown().await;

    result
}

async fn run_next_id(runtime: &Runtime, args: NextIdArgs) -> Result<(), AppError> {
    let prefix = IdPrefix::new(args.prefix)?;
    for _ in 0..args.count.get() {
        let id = runtime.ids().next_id(&prefix).await?;
        println!("{id}");
    }
    Ok(())
}

fn run_inspect_id(args: &InspectIdArgs) -> Result<(), AppError> {
    let parts = IdComponents::decode(args.id);
    let issued_at = parts
        .issued_at()
        .ok_or_else(|| AppError::validation(format!("id {} has no valid timestamp", args.id)))?
        .format(&Rfc3339)
        .map_err(|err| AppError::unexpected(err.to_string()))?;

    println!("id:               {}", args.id);
    println!("timestamp_offset: {}", parts.timestamp_offset);
    println!("sequence:         {}", parts.sequence);
    println!("issued_at:        {issued_at}");
    Ok(())
}

async fn run_get(runtime: &Runtime, args: GetArgs) -> Result<(), AppError> {
    let value = runtime
        .store()
        .get(&args.key)
        .await
        .map_err(CacheError::from)?;

    match value.as_deref() {
        None => println!("(nil)"),
        Some(NULL_MARKER) => println!("(null marker)"),
        Some(raw) => println!("{raw}"),
    }
    Ok(())
}

async fn run_warm(runtime: &Runtime, args: WarmArgs) -> Result<(), AppError> {
    let prefix = KeyPrefix::new(args.prefix)?;
    let value: serde_json::Value = serde_json::from_str(&args.json)
        .map_err(|err| AppError::validation(format!("JSON argument is not valid: {err}")))?;
    let logical_ttl = args
        .logical_ttl_seconds
        .map(Duration::from_secs)
        .unwrap_or(runtime.cache().config().default_ttl);

    let report = CacheWarmer::new(runtime.cache())
        .warm(
            &prefix,
            [args.id],
            move |_| {
                let value = value.clone();
                async move { Ok::<_, std::convert::Infallible>(Some(value)) }
            },
            logical_ttl,
        )
        .await?;

    info!(
        target = "stampede::warm",
        prefix = %prefix,
        warmed = report.warmed,
        logical_ttl_secs = logical_ttl.as_secs(),
        "entry seeded"
    );
    Ok(())
}

async fn run_invalidate(runtime: &Runtime, args: InvalidateArgs) -> Result<(), AppError> {
    let prefix = KeyPrefix::new(args.prefix)?;
    let removed = runtime.cache().invalidate(&prefix, &args.id).await?;
    println!("{}", if removed { "removed" } else { "absent" });
    Ok(())
}
