use std::{process::ExitCode, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use stateset_uom::{
    config::{self, AppConfig},
    db::{self, DbPool},
    dto::uom::{
        ConversionRequest, ConvertRequest, CreateUnitRequest, InitialConversionRequest,
        UpdateUnitRequest,
    },
    repositories::SeaOrmUomRepository,
    seed, Conversion, ServiceError, Unit, UomCategory, UomService,
};
use tracing::debug;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ServiceError>() {
                Some(service_err) if json => {
                    let _ = print_json(&service_err.details());
                }
                _ => eprintln!("error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.pool).await?;
            if !cli.json {
                println!("Migrations applied");
            }
        }
        Commands::Seed => {
            let report = seed::seed_standard_catalog(&context.service).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "Units: {} created, {} already present",
                    report.units_created, report.units_existing
                );
                println!(
                    "Conversions: {} written, {} unchanged",
                    report.conversions_written, report.conversions_unchanged
                );
            }
        }
        Commands::Units(command) => handle_units_command(&context, command, cli.json).await?,
        Commands::Conversions(command) => {
            handle_conversions_command(&context, command, cli.json).await?
        }
        Commands::Convert(args) => handle_convert(&context, args, cli.json).await?,
    }

    db::close_pool(context.pool).await?;
    Ok(())
}

#[derive(Parser)]
#[command(name = "uom-admin", about = "Manage units of measure and conversions", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Load the standard unit catalog (idempotent)
    Seed,
    #[command(subcommand)]
    Units(UnitsCommands),
    #[command(subcommand)]
    Conversions(ConversionsCommands),
    /// Convert an amount between two units
    Convert(ConvertArgs),
}

#[derive(Subcommand)]
enum UnitsCommands {
    List(UnitsListArgs),
    Options(UnitsOptionsArgs),
    Get(UnitCodeArgs),
    Create(UnitsCreateArgs),
    Update(UnitsUpdateArgs),
    Deactivate(UnitCodeArgs),
}

#[derive(Args)]
struct UnitsListArgs {
    #[arg(long, help = "Only units in this category")]
    category: Option<String>,
    #[arg(long, action = ArgAction::SetTrue, help = "Include deactivated units")]
    include_inactive: bool,
}

#[derive(Args)]
struct UnitsOptionsArgs {
    #[arg(long, help = "Only units in this category")]
    category: Option<String>,
}

#[derive(Args)]
struct UnitCodeArgs {
    code: String,
}

#[derive(Args)]
struct UnitsCreateArgs {
    #[arg(long)]
    code: String,
    #[arg(long)]
    name: String,
    #[arg(long, help = "si, imperial, us_customary, unece, ansi_x12 or custom")]
    system: String,
    #[arg(long, help = "count, mass, volume, length, area or time")]
    category: String,
    #[arg(long, action = ArgAction::SetTrue)]
    packaging: bool,
    #[arg(
        long = "conversion",
        value_name = "TO=FACTOR",
        help = "Edge from the new unit, e.g. --conversion kg=0.001 (repeatable)"
    )]
    conversions: Vec<String>,
}

#[derive(Args)]
struct UnitsUpdateArgs {
    code: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    system: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    packaging: Option<bool>,
    #[arg(long, help = "Set to true to reactivate a unit")]
    active: Option<bool>,
}

#[derive(Subcommand)]
enum ConversionsCommands {
    /// Store `1 FROM = FACTOR TO`, replacing any existing factor
    Add(ConversionArgs),
    /// Change the factor of an existing edge
    Update(ConversionArgs),
    /// Edges touching a unit; incoming ones shown as derived reciprocals
    List(UnitCodeArgs),
}

#[derive(Args)]
struct ConversionArgs {
    from_uom: String,
    to_uom: String,
    factor: String,
}

#[derive(Args)]
struct ConvertArgs {
    amount: String,
    from_uom: String,
    to_uom: String,
}

struct CliContext {
    pool: DbPool,
    service: UomService,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let app_config: AppConfig = config::load_config().context("failed to load configuration")?;
        config::init_tracing(app_config.log_level(), app_config.log_json);

        let pool = db::establish_connection_from_app_config(&app_config)
            .await
            .context("failed to connect to database")?;
        if app_config.auto_migrate {
            db::run_migrations(&pool).await?;
        }

        let repo = Arc::new(SeaOrmUomRepository::new(Arc::new(pool.clone())));
        let service = UomService::from_config(repo, &app_config);
        debug!(environment = %app_config.environment, "CLI context ready");
        Ok(Self { pool, service })
    }
}

async fn handle_units_command(context: &CliContext, command: UnitsCommands, json: bool) -> Result<()> {
    let service = &context.service;
    match command {
        UnitsCommands::List(args) => {
            let units = match parse_category(args.category.as_deref())? {
                Some(category) => {
                    service
                        .list_units_by_category(category, args.include_inactive)
                        .await?
                }
                None => service.list_units(args.include_inactive).await?,
            };
            if json {
                print_json(&units.to_vec())?;
            } else {
                for unit in &units {
                    println!(
                        "{:<8} {:<20} {:<8} {:<13} {}{}",
                        unit.code,
                        unit.name,
                        unit.category,
                        unit.system,
                        if unit.is_packaging { "packaging " } else { "" },
                        if unit.is_active { "" } else { "(inactive)" }
                    );
                }
            }
        }
        UnitsCommands::Options(args) => {
            let options = service
                .list_unit_options(parse_category(args.category.as_deref())?)
                .await?;
            if json {
                print_json(&options)?;
            } else {
                for option in options {
                    println!("{:<8} {}", option.code, option.name);
                }
            }
        }
        UnitsCommands::Get(args) => {
            let unit = service.get_unit(&args.code).await?;
            print_unit(&unit, json)?;
        }
        UnitsCommands::Create(args) => {
            let conversions = args
                .conversions
                .iter()
                .map(|raw| parse_initial_conversion(raw.as_str()))
                .collect::<Result<Vec<_>>>()?;
            let request = CreateUnitRequest {
                code: args.code,
                name: args.name,
                system: args.system,
                category: args.category,
                is_packaging: args.packaging,
                conversions,
            };
            let unit = service.create_unit(&request).await?;
            print_unit(&unit, json)?;
        }
        UnitsCommands::Update(args) => {
            let request = UpdateUnitRequest {
                name: args.name,
                system: args.system,
                category: args.category,
                is_packaging: args.packaging,
                is_active: args.active,
            };
            let unit = service.update_unit(&args.code, &request).await?;
            print_unit(&unit, json)?;
        }
        UnitsCommands::Deactivate(args) => {
            let unit = service.deactivate_unit(&args.code).await?;
            print_unit(&unit, json)?;
        }
    }
    Ok(())
}

async fn handle_conversions_command(
    context: &CliContext,
    command: ConversionsCommands,
    json: bool,
) -> Result<()> {
    let service = &context.service;
    match command {
        ConversionsCommands::Add(args) => {
            let (from, to, factor) = conversion_request(args).parse()?;
            let edge = service.add_conversion(&from, &to, factor).await?;
            print_edge(&edge, json)?;
        }
        ConversionsCommands::Update(args) => {
            let (from, to, factor) = conversion_request(args).parse()?;
            let edge = service.update_conversion(&from, &to, factor).await?;
            print_edge(&edge, json)?;
        }
        ConversionsCommands::List(args) => {
            let views = service.list_conversions_for_unit(&args.code).await?;
            if json {
                print_json(&views)?;
            } else {
                for view in &views {
                    println!(
                        "1 {} = {} {}{}",
                        view.from_uom,
                        view.factor,
                        view.to_uom,
                        if view.derived { "  (derived)" } else { "" }
                    );
                }
            }
        }
    }
    Ok(())
}

async fn handle_convert(context: &CliContext, args: ConvertArgs, json: bool) -> Result<()> {
    let request = ConvertRequest {
        amount: args.amount,
        from_uom: args.from_uom,
        to_uom: args.to_uom,
    };
    let (amount, from, to) = request.parse()?;
    let result = context.service.convert(amount, &from, &to).await?;

    if json {
        print_json(&result)?;
    } else {
        println!("{} {} = {} {}", amount, from, result.amount, to);
        if result.path.len() > 2 {
            println!("via {}", result.path.join(" -> "));
        }
    }
    Ok(())
}

fn conversion_request(args: ConversionArgs) -> ConversionRequest {
    ConversionRequest {
        from_uom: args.from_uom,
        to_uom: args.to_uom,
        factor: args.factor,
    }
}

fn parse_category(raw: Option<&str>) -> Result<Option<UomCategory>> {
    Ok(raw.map(UomCategory::parse).transpose()?)
}

fn parse_initial_conversion(raw: &str) -> Result<InitialConversionRequest> {
    let (to_uom, factor) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected TO=FACTOR, got '{}'", raw))?;
    Ok(InitialConversionRequest {
        to_uom: to_uom.trim().to_string(),
        factor: factor.trim().to_string(),
    })
}

fn print_unit(unit: &Unit, json: bool) -> Result<()> {
    if json {
        print_json(unit)
    } else {
        println!(
            "{} ({}) category={} system={} packaging={} active={} version={}",
            unit.code,
            unit.name,
            unit.category,
            unit.system,
            unit.is_packaging,
            unit.is_active,
            unit.version
        );
        Ok(())
    }
}

fn print_edge(edge: &Conversion, json: bool) -> Result<()> {
    if json {
        print_json(edge)
    } else {
        println!(
            "1 {} = {} {} (version {})",
            edge.from_uom, edge.factor, edge.to_uom, edge.version
        );
        Ok(())
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{}", rendered);
    Ok(())
}
