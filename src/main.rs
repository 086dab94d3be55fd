/*
 * Arbview - Arbitrage Dashboard Client
 * Command line entry point rendering the dashboard views in the terminal
 */

use anyhow::{bail, Context};
use arbview::{
    analytics::OpportunityFilter,
    api::{
        BatchFilter, BatchPayload, CancelTaskPayload, LogQuery, OpportunityQuery, PriceComparisonQuery,
        ReportPayload, RunTemplatePayload, TaskListQuery,
    },
    config::{Config, LogFormat},
    models::{Direction, LoadState},
    settings::{self, ThemeMode, ThemeStore},
    table::{OpportunityTable, SortField, SortOrder, SortSpec},
    tasks::{TaskEntry, TaskStatus},
    utils::{format_duration, format_signed_usd, format_timestamp, format_usd, parse_time_arg},
    DashboardService,
};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "arbview", version, about = "Terminal views over the arbitrage dashboard backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sorted, paginated opportunity table with summary statistics
    Opportunities(OpportunityArgs),
    /// DEX vs CEX price series as a chart configuration
    Prices(PriceArgs),
    #[command(subcommand)]
    Tasks(TaskCommand),
    #[command(subcommand)]
    Templates(TemplateCommand),
    #[command(subcommand)]
    Batches(BatchCommand),
    #[command(subcommand)]
    Reports(ReportCommand),
    #[command(subcommand)]
    Experiments(ExperimentCommand),
    /// Run data-management tasks (all of them, in order, when no task is named)
    Pipeline(PipelineArgs),
    /// Show or change the theme preference
    Theme { mode: Option<ThemeMode> },
}

#[derive(Args)]
struct OpportunityArgs {
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value = "net_profit")]
    sort: SortField,
    #[arg(long, default_value = "desc")]
    order: SortOrder,
    #[arg(long)]
    start: Option<String>,
    #[arg(long)]
    end: Option<String>,
    #[arg(long)]
    task_id: Option<String>,
    #[arg(long)]
    direction: Option<Direction>,
    #[arg(long)]
    min_net: Option<f64>,
}

#[derive(Args)]
struct PriceArgs {
    #[arg(long)]
    start: String,
    #[arg(long)]
    end: String,
    #[arg(long)]
    task_id: Option<String>,
    /// Visible window in percent, e.g. 25:75
    #[arg(long)]
    zoom: Option<String>,
    /// Print the tooltip for the sample nearest this time
    #[arg(long)]
    at: Option<String>,
}

#[derive(Subcommand)]
enum TaskCommand {
    List {
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Show { task_id: String },
    Logs {
        task_id: String,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
    Cancel {
        task_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand)]
enum TemplateCommand {
    List,
    Run {
        id: u64,
        #[arg(long)]
        trigger: Option<String>,
    },
    Delete { id: u64 },
}

#[derive(Subcommand)]
enum BatchCommand {
    List,
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
enum ReportCommand {
    List {
        #[arg(long)]
        batch_id: Option<u64>,
    },
    Create {
        #[arg(long)]
        batch_id: u64,
        #[arg(long, default_value = "csv")]
        format: String,
        #[arg(long)]
        template_id: Option<u64>,
    },
    Delete { id: u64 },
}

#[derive(Subcommand)]
enum ExperimentCommand {
    List {
        #[arg(long)]
        batch_id: Option<u64>,
    },
    Show { id: u64 },
    Runs { id: u64 },
}

#[derive(Args)]
struct PipelineArgs {
    task: Option<String>,
    #[arg(long)]
    start: Option<i64>,
    #[arg(long)]
    end: Option<i64>,
    #[arg(long)]
    pool_address: Option<String>,
    #[arg(long)]
    csv_path: Option<String>,
    #[arg(long)]
    import_percentage: Option<u32>,
    #[arg(long)]
    chunk_size: Option<u32>,
    #[arg(long)]
    interval: Option<String>,
    #[arg(long)]
    profit_threshold: Option<f64>,
    #[arg(long)]
    batch_id: Option<u64>,
    /// Replace existing analysis results for the batch
    #[arg(long)]
    overwrite: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config);

    info!("Starting Arbview against {}", config.backend.base_url);

    let theme = settings::init_global(ThemeStore::new(&config.view.settings_path, config.view.prefers_dark))
        .map_err(|e| {
            error!("Failed to initialise theme settings: {}", e);
            e
        })?;

    let service = DashboardService::new(config)?;

    match cli.command {
        Command::Opportunities(args) => show_opportunities(&service, args).await,
        Command::Prices(args) => show_prices(&service, args).await,
        Command::Tasks(cmd) => tasks_command(&service, cmd).await,
        Command::Templates(cmd) => templates_command(&service, cmd).await,
        Command::Batches(cmd) => batches_command(&service, cmd).await,
        Command::Reports(cmd) => reports_command(&service, cmd).await,
        Command::Experiments(cmd) => experiments_command(&service, cmd).await,
        Command::Pipeline(args) => pipeline_command(&service, args).await,
        Command::Theme { mode } => {
            if let Some(mode) = mode {
                theme.set_mode(mode)?;
            }
            println!("theme: {} (dark: {})", theme.mode(), theme.is_dark());
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("arbview={}", config.logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn unix_arg(raw: Option<&str>) -> anyhow::Result<Option<i64>> {
    raw.map(|r| parse_time_arg(r).map(|t| t.timestamp()))
        .transpose()
        .map_err(Into::into)
}

/// Renders the view's empty and error states; returns the data when there is some.
fn settle<T>(state: LoadState<T>, empty_message: &str) -> anyhow::Result<Option<T>> {
    match state {
        LoadState::Loaded(value) => Ok(Some(value)),
        LoadState::Empty => {
            println!("{empty_message}");
            Ok(None)
        }
        LoadState::Failed(e) => bail!("{e}"),
    }
}

async fn show_opportunities(service: &DashboardService, args: OpportunityArgs) -> anyhow::Result<()> {
    let query = OpportunityQuery {
        sort_by: Some(args.sort),
        order: Some(args.order),
        start_time: unix_arg(args.start.as_deref())?,
        end_time: unix_arg(args.end.as_deref())?,
        task_id: args.task_id,
        ..Default::default()
    };
    let filter = OpportunityFilter {
        direction: args.direction,
        min_net_profit: args.min_net,
    };
    let state = service
        .load_opportunities(&query, SortSpec::new(args.sort, args.order), filter)
        .await;

    let Some(mut table) = settle(state, "No arbitrage opportunities found")? else {
        return Ok(());
    };
    table.go_to(args.page);
    print_table(&table);
    Ok(())
}

fn print_table(table: &OpportunityTable) {
    let stats = table.stats();
    println!(
        "Total: {}  Max: {}  Avg: {}  Sum: {}",
        stats.total_opportunities,
        format_usd(stats.max_profit),
        format_usd(stats.avg_profit),
        format_usd(stats.total_potential_profit)
    );
    println!(
        "{:<10} {:<22} {:<9} {:>10} {:>10} {:>9} {:>9} {:>10}",
        "ID", "Timestamp", "Direction", "DEX", "CEX", "Gross", "Fees", "Net"
    );

    let page = table.page();
    for opp in page.rows {
        println!(
            "{:<10} {:<22} {:<9} {:>10} {:>10} {:>9} {:>9} {:>10}",
            opp.id,
            opp.timestamp,
            opp.direction.label(),
            format_usd(opp.dex_price),
            format_usd(opp.cex_price),
            format_usd(opp.gross_profit),
            format_usd(opp.total_cost()),
            format_signed_usd(opp.net_profit)
        );
    }

    let (from, to) = page.bounds();
    println!(
        "Showing {} to {} of {} (page {}/{}, sorted by {} {})",
        from,
        to,
        page.total,
        page.number,
        page.page_count.max(1),
        table.sort().field,
        table.sort().order.as_query()
    );
}

async fn show_prices(service: &DashboardService, args: PriceArgs) -> anyhow::Result<()> {
    let query = PriceComparisonQuery {
        start_time: parse_time_arg(&args.start)?.timestamp(),
        end_time: parse_time_arg(&args.end)?.timestamp(),
        task_id: args.task_id,
    };

    let Some(mut chart) = settle(service.load_price_chart(&query).await, "No price data for this range")? else {
        return Ok(());
    };

    if let Some(zoom) = args.zoom {
        let (start, end) = zoom
            .split_once(':')
            .context("zoom must look like START:END")?;
        chart.zoom(start.trim().parse()?, end.trim().parse()?);
    }

    if let Some(at) = args.at {
        match chart.tooltip_at(parse_time_arg(&at)?) {
            Some(tip) => println!("{tip}"),
            None => println!("No sample near {at}"),
        }
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&chart.to_config())?);
    Ok(())
}

async fn tasks_command(service: &DashboardService, cmd: TaskCommand) -> anyhow::Result<()> {
    let client = service.client();
    match cmd {
        TaskCommand::List { page, limit } => {
            let Some(list) = settle(service.load_tasks(&TaskListQuery { page, limit }).await, "No tasks")? else {
                return Ok(());
            };
            for task in &list.items {
                println!("{:<38} {:<16} {:<10} {}", task.task_id, task.task_type, task.status, task.trigger);
            }
            let p = &list.pagination;
            println!("page {} / limit {} / total {}", p.page, p.limit, p.total);
        }
        TaskCommand::Show { task_id } => {
            let detail = client.get_task(&task_id).await?;
            println!("{}", serde_json::to_string_pretty(&detail.data)?);
        }
        TaskCommand::Logs { task_id, limit, offset } => {
            let state = service.load_task_logs(&task_id, &LogQuery { limit, offset }).await;
            let Some(logs) = settle(state, "No log entries")? else {
                return Ok(());
            };
            for entry in logs.items {
                println!("{} [{}] {}", format_timestamp(&entry.timestamp), entry.level, entry.message);
            }
        }
        TaskCommand::Cancel { task_id, reason } => {
            let payload = CancelTaskPayload { reason };
            let response = client.cancel_task(&task_id, Some(&payload)).await?;
            match response.data {
                Some(detail) => println!("{} -> {}", detail.task_id, detail.status),
                None => println!("{}", response.message),
            }
        }
    }
    Ok(())
}

async fn templates_command(service: &DashboardService, cmd: TemplateCommand) -> anyhow::Result<()> {
    let client = service.client();
    match cmd {
        TemplateCommand::List => {
            let templates = client.get_templates().await?.into_data().unwrap_or_default();
            if templates.is_empty() {
                println!("No templates");
            }
            for t in templates {
                println!("{:<6} {:<24} {:<16} {}", t.id, t.name, t.task_type, serde_json::Value::Object(t.config));
            }
        }
        TemplateCommand::Run { id, trigger } => {
            let payload = RunTemplatePayload {
                trigger: trigger.or_else(|| Some("cli".to_string())),
                ..Default::default()
            };
            let response = client.run_template(id, Some(&payload)).await?;
            if let Some(task) = response.data {
                println!("started {} ({})", task.task_id, task.status);
            }
        }
        TemplateCommand::Delete { id } => {
            client.delete_template(id).await?;
            println!("deleted template {id}");
        }
    }
    Ok(())
}

async fn batches_command(service: &DashboardService, cmd: BatchCommand) -> anyhow::Result<()> {
    let client = service.client();
    match cmd {
        BatchCommand::List => {
            let batches = client.get_batches().await?.into_data().unwrap_or_default();
            if batches.is_empty() {
                println!("No batches");
            }
            for b in batches {
                println!("{:<6} {:<24} {}", b.id, b.name, b.description);
            }
        }
        BatchCommand::Create { name, description } => {
            let payload = BatchPayload {
                name,
                description,
                refreshed: None,
            };
            if let Some(batch) = client.create_batch(&payload).await?.into_data() {
                println!("created batch {} ({})", batch.id, batch.name);
            }
        }
    }
    Ok(())
}

async fn reports_command(service: &DashboardService, cmd: ReportCommand) -> anyhow::Result<()> {
    let client = service.client();
    match cmd {
        ReportCommand::List { batch_id } => {
            let reports = client.get_reports(&BatchFilter { batch_id }).await?.into_data().unwrap_or_default();
            if reports.is_empty() {
                println!("No reports");
            }
            for r in reports {
                println!("{:<6} batch {:<6} {:<6} {:?} {}", r.id, r.batch_id, r.format, r.status, r.file_path);
            }
        }
        ReportCommand::Create {
            batch_id,
            format,
            template_id,
        } => {
            let payload = ReportPayload {
                batch_id,
                template_id,
                format,
                file_path: None,
            };
            if let Some(report) = client.create_report(&payload).await?.into_data() {
                println!("queued report {} ({:?})", report.id, report.status);
            }
        }
        ReportCommand::Delete { id } => {
            client.delete_report(id).await?;
            println!("deleted report {id}");
        }
    }
    Ok(())
}

async fn experiments_command(service: &DashboardService, cmd: ExperimentCommand) -> anyhow::Result<()> {
    let client = service.client();
    match cmd {
        ExperimentCommand::List { batch_id } => {
            let experiments = client
                .get_experiments(&BatchFilter { batch_id })
                .await?
                .into_data()
                .unwrap_or_default();
            if experiments.is_empty() {
                println!("No experiments");
            }
            for e in experiments {
                println!("{:<6} batch {:<6} {}", e.id, e.batch_id, e.description);
            }
        }
        ExperimentCommand::Show { id } => {
            let detail = client.get_experiment(id).await?;
            println!("{}", serde_json::to_string_pretty(&detail.data)?);
        }
        ExperimentCommand::Runs { id } => {
            let runs = client.get_experiment_runs(id).await?.into_data().unwrap_or_default();
            if runs.is_empty() {
                println!("No runs");
            }
            for run in runs {
                let metrics = run.metrics.map(serde_json::Value::Object).unwrap_or_default();
                println!("{:<6} template {:<6} task {:<6} {}", run.id, run.template_id, run.task_id, metrics);
            }
        }
    }
    Ok(())
}

async fn pipeline_command(service: &DashboardService, args: PipelineArgs) -> anyhow::Result<()> {
    let board = service.tasks();

    let mut params = board.params().await;
    if let Some(start) = args.start {
        params.start_timestamp = start;
    }
    if let Some(end) = args.end {
        params.end_timestamp = end;
    }
    if let Some(pool) = args.pool_address {
        params.pool_address = pool;
    }
    if let Some(path) = args.csv_path {
        params.csv_path = path;
    }
    if let Some(interval) = args.interval {
        params.aggregation_interval = interval;
    }
    if let Some(threshold) = args.profit_threshold {
        params.profit_threshold = threshold;
    }
    if let Some(percentage) = args.import_percentage {
        params.import_percentage = percentage;
    }
    if let Some(chunk_size) = args.chunk_size {
        params.chunk_size = chunk_size;
    }
    if args.batch_id.is_some() {
        params.batch_id = args.batch_id;
    }
    params.overwrite |= args.overwrite;
    board.set_params(params).await;

    let finished = match args.task {
        Some(task) => vec![board.run(&task).await?],
        None => board.run_pipeline().await?,
    };
    for entry in &finished {
        print_task(entry);
    }
    if finished.iter().any(|t| t.status == TaskStatus::Error) {
        bail!("pipeline finished with errors");
    }
    Ok(())
}

fn print_task(entry: &TaskEntry) {
    let last_run = entry.last_run.as_ref().map(format_timestamp).unwrap_or_default();
    let duration = entry.duration.map(format_duration).unwrap_or_default();
    println!(
        "{:<16} {:<8} {:<16} {:>6}  {}",
        entry.id,
        entry.status.label(),
        last_run,
        duration,
        entry.last_error.as_deref().unwrap_or(&entry.description)
    );
}
