use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fieldplan::TeamId;
use fieldplan::balance::report::{locality_detail, select_team, summarize};
use fieldplan::blocks::{load_blocks, select_blocks};
use fieldplan::export::{
    blocks_to_geojson, to_geojson, write_csv, write_geojson, write_locality_detail,
};
use fieldplan::ingest::{
    CoordinateColumns, SampleSchema, ZoneLayer, ZoneSchema, join_sample, load_csv, load_geojson,
    load_sample,
};
use fieldplan::projection::DEFAULT_UTM_ZONE;
use fieldplan::session::{CredentialStore, Credentials, Session, hash_password};
use fieldplan::{BalancedAssigner, EngineConfig};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Balanced zone planning for field brigades", long_about = None)]
struct Args {
    /// Log engine stages at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assign zones to teams and write the plan.
    Plan(PlanArgs),
    /// Print a credentials-file line for a user.
    HashPassword {
        #[arg(long)]
        user: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(clap::Args, Debug)]
struct PlanArgs {
    /// Zones as CSV or GeoJSON (by extension).
    #[arg(long, env = "FIELDPLAN_ZONES")]
    zones: PathBuf,

    /// Number of brigades.
    #[arg(long, env = "FIELDPLAN_TEAMS", default_value_t = 4)]
    teams: usize,

    /// Surveyors available, for the per-person workload figure.
    #[arg(long, env = "FIELDPLAN_SURVEYORS")]
    surveyors: Option<usize>,

    /// Numeric attribute summed as each team's workload (e.g. survey target).
    #[arg(long, env = "FIELDPLAN_WORKLOAD_COLUMN")]
    workload_column: Option<String>,

    #[arg(long, env = "FIELDPLAN_ID_COLUMN", default_value = "id")]
    id_column: String,

    /// First coordinate column: x (projected) or longitude (with --lon-lat).
    #[arg(long, default_value = "x")]
    x_column: String,

    /// Second coordinate column: y (projected) or latitude (with --lon-lat).
    #[arg(long, default_value = "y")]
    y_column: String,

    /// Input coordinates are WGS84 degrees; reproject to UTM before planning.
    #[arg(long)]
    lon_lat: bool,

    #[arg(long, env = "FIELDPLAN_UTM_ZONE", default_value_t = DEFAULT_UTM_ZONE)]
    utm_zone: u8,

    /// Column holding pre-assigned teams; used as-is when every zone has one.
    #[arg(long)]
    fixed_team_column: Option<String>,

    /// Text stored for empty attribute cells instead of null.
    #[arg(long)]
    missing_attribute: Option<String>,

    #[arg(long, env = "FIELDPLAN_SEED", default_value_t = 42)]
    seed: u64,

    #[arg(long, env = "FIELDPLAN_RESTARTS", default_value_t = 20)]
    restarts: usize,

    /// Report and export only this team's zones.
    #[arg(long)]
    team: Option<TeamId>,

    /// Survey sample CSV; only its sections are planned.
    #[arg(long, env = "FIELDPLAN_SAMPLE")]
    sample: Option<PathBuf>,

    #[arg(long, default_value = "seccion")]
    sample_section_column: String,

    /// Surveys per locality; summed onto each section and used as workload.
    #[arg(long, default_value = "encuestas_totales")]
    sample_surveys_column: String,

    #[arg(long, default_value = "localidad")]
    sample_locality_column: String,

    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    geojson_output: Option<PathBuf>,

    /// Per-locality detail CSV (team, section, locality, surveys). Needs --sample.
    #[arg(long)]
    detail_output: Option<PathBuf>,

    /// Block polygons (GeoJSON) to select under the planned sections.
    #[arg(long, requires = "blocks_output")]
    blocks: Option<PathBuf>,

    #[arg(long, requires = "blocks")]
    blocks_output: Option<PathBuf>,

    /// CSV of `user,hash`; when set, --user and --password must log in.
    #[arg(long, env = "FIELDPLAN_CREDENTIALS")]
    credentials: Option<PathBuf>,

    #[arg(long, env = "FIELDPLAN_USER")]
    user: Option<String>,

    #[arg(long, env = "FIELDPLAN_PASSWORD")]
    password: Option<String>,
}

impl PlanArgs {
    fn schema(&self) -> ZoneSchema {
        let coordinates = if self.lon_lat {
            CoordinateColumns::Geographic {
                lon: self.x_column.clone(),
                lat: self.y_column.clone(),
                utm_zone: self.utm_zone,
            }
        } else {
            CoordinateColumns::Projected {
                x: self.x_column.clone(),
                y: self.y_column.clone(),
            }
        };
        ZoneSchema {
            id_column: self.id_column.clone(),
            coordinates,
            fixed_team_column: self.fixed_team_column.clone(),
            missing_attribute: self.missing_attribute.clone(),
        }
    }

    fn sample_schema(&self) -> SampleSchema {
        SampleSchema {
            section_column: self.sample_section_column.clone(),
            surveys_column: self.sample_surveys_column.clone(),
            locality_column: Some(self.sample_locality_column.clone()),
        }
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            seed: self.seed,
            restarts: self.restarts,
            ..EngineConfig::default()
        }
    }
}

fn is_geojson(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("geojson") || e.eq_ignore_ascii_case("json"))
}

fn load_zones(path: &Path, schema: &ZoneSchema) -> Result<ZoneLayer> {
    if is_geojson(path) {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(load_geojson(&text, schema)?)
    } else {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(ZoneLayer {
            zones: load_csv(BufReader::new(file), schema)?,
            ..ZoneLayer::default()
        })
    }
}

fn authenticate(args: &PlanArgs) -> Result<Session> {
    let Some(path) = &args.credentials else {
        return Ok(Session::Anonymous);
    };
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let store = CredentialStore::from_csv_reader(BufReader::new(file))?;

    let (Some(user), Some(password)) = (&args.user, &args.password) else {
        bail!("--user and --password are required when --credentials is set");
    };
    let session = Session::default().login(
        &store,
        &Credentials {
            user: user.clone(),
            password: password.clone(),
        },
    );
    session.require_user()?;
    Ok(session)
}

fn run_plan(args: PlanArgs) -> Result<()> {
    let session = authenticate(&args)?;
    if let Session::Authenticated { user } = &session {
        tracing::info!(user = %user, "planning as authenticated user");
    }

    if args.detail_output.is_some() && args.sample.is_none() {
        bail!("--detail-output needs --sample");
    }

    let mut layer = load_zones(&args.zones, &args.schema())?;
    let sample_schema = args.sample_schema();
    let sample = match &args.sample {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
            let records = load_sample(BufReader::new(file), &sample_schema)?;
            layer = join_sample(layer, &records, &sample_schema);
            records
        }
        None => Vec::new(),
    };
    let workload_column = args
        .workload_column
        .clone()
        .or_else(|| args.sample.is_some().then(|| sample_schema.surveys_column.clone()));

    let assigner = BalancedAssigner::new(args.engine_config());
    let plan = assigner.plan(layer.zones, args.teams)?;
    let zones = select_team(plan.zones, args.team);
    if let Some(team) = args.team {
        tracing::info!(team, zones = zones.len(), "restricted to one team");
    }

    let summary = summarize(&zones, workload_column.as_deref());
    tracing::info!(
        mode = ?plan.mode,
        zones = summary.total_zones,
        teams = summary.team_count(),
        spread = summary.total_spread(),
        "plan ready"
    );
    for team in &summary.teams {
        tracing::info!(
            team = team.team_id,
            zones = team.zone_count,
            spread_m = %format!("{:.0}", team.spread),
            workload = team.workload,
            "team"
        );
    }
    if let Some(per_person) = args
        .surveyors
        .and_then(|s| summary.workload_per_surveyor(s))
    {
        tracing::info!(per_person = %format!("{per_person:.1}"), "workload per surveyor");
    }

    match &args.output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            write_csv(BufWriter::new(file), &zones)?;
            tracing::info!(path = %path.display(), "wrote CSV plan");
        }
        None => write_csv(std::io::stdout().lock(), &zones)?,
    }

    if let Some(path) = &args.geojson_output {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        write_geojson(
            BufWriter::new(file),
            &to_geojson(&zones, &layer.geometries, args.utm_zone),
        )?;
        tracing::info!(path = %path.display(), "wrote GeoJSON plan");
    }

    if let Some(path) = &args.detail_output {
        let detail = locality_detail(&zones, &sample);
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        write_locality_detail(BufWriter::new(file), &detail)?;
        tracing::info!(path = %path.display(), rows = detail.len(), "wrote locality detail");
    }

    if let (Some(blocks_path), Some(path)) = (&args.blocks, &args.blocks_output) {
        let text = std::fs::read_to_string(blocks_path)
            .with_context(|| format!("Failed to read {}", blocks_path.display()))?;
        let blocks = load_blocks(&text)?;
        let selected = select_blocks(&blocks, &zones, &layer.geometries)?;
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        write_geojson(BufWriter::new(file), &blocks_to_geojson(&selected))?;
        tracing::info!(path = %path.display(), blocks = selected.len(), "wrote selected blocks");
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Plan(plan_args) => run_plan(plan_args),
        Command::HashPassword { user, password } => {
            let hash = hash_password(&password)?;
            let mut wtr = csv::Writer::from_writer(std::io::stdout().lock());
            wtr.write_record([user.as_str(), hash.as_str()])?;
            wtr.flush()?;
            Ok(())
        }
    }
}
