use std::{io::Write, path::Path, process};

use embodied::{
    application::{
        batch::MaterialQuery,
        error::AppError,
        service::{EnrichmentConfig, EnrichmentService},
    },
    config::{self, Command, EnrichArgs, FactorsArgs, ProjectsArgs},
    domain::regions::RegionDirectory,
    infra::{error::InfraError, regions::load_region_directory, telemetry},
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let regions = match &cli_args.command {
        Command::Enrich(_) => load_region_directory(&settings.regions.path).await?,
        Command::Factors(_) | Command::Projects(_) => RegionDirectory::default(),
    };
    let service = EnrichmentService::connect(EnrichmentConfig::from(&settings), regions)?;
    let sweeper = service.spawn_cache_sweeper();

    let result = match cli_args.command {
        Command::Enrich(args) => run_enrich(&service, args).await,
        Command::Factors(args) => run_factors(&service, args).await,
        Command::Projects(args) => run_projects(&service, args).await,
    };

    if let Some(handle) = sweeper {
        handle.abort();
    }
    result
}

async fn run_enrich(service: &EnrichmentService, args: EnrichArgs) -> Result<(), AppError> {
    let queries = read_queries(&args.file).await?;
    info!(queries = queries.len(), file = %args.file.display(), "Starting batch enrichment");

    let report = service.run_batch(&queries).await;
    info!(
        enriched = report.enriched().count(),
        failed = report.failures().count(),
        efficiency_ratio = report.stats.efficiency_ratio,
        cache_entries = service.cache_stats().size,
        "Batch enrichment finished"
    );
    print_json(&report, args.pretty)
}

async fn run_factors(service: &EnrichmentService, args: FactorsArgs) -> Result<(), AppError> {
    let table = service.emission_factors(args.region.trim()).await?;
    if table.used_fallback {
        info!(region_id = %table.region_id, version = %table.version, "Served fallback emission factors");
    }
    print_json(&table, true)
}

async fn run_projects(service: &EnrichmentService, args: ProjectsArgs) -> Result<(), AppError> {
    match args.id.as_deref() {
        Some(id) => print_json(&service.project(id).await?, true),
        None => print_json(&service.projects().await?, true),
    }
}

async fn read_queries(path: &Path) -> Result<Vec<MaterialQuery>, AppError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(InfraError::from)?;
    let queries: Vec<MaterialQuery> = serde_json::from_str(&contents).map_err(|err| {
        AppError::validation(format!(
            "queries file `{}` is not a JSON array of queries: {err}",
            path.display()
        ))
    })?;

    if let Some(position) = queries
        .iter()
        .position(|query| query.material_id.trim().is_empty() || query.region_id.trim().is_empty())
    {
        return Err(AppError::validation(format!(
            "query #{} in `{}` has an empty material or region id",
            position + 1,
            path.display()
        )));
    }
    Ok(queries)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), AppError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|err| AppError::unexpected(format!("failed to serialize output: {err}")))?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").map_err(InfraError::from)?;
    Ok(())
}
